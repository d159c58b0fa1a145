use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Source, media_type_for};
use crate::files::{InputFile, basename};
use anyhow::{Result, bail};

/// Generic Content-Type values that say nothing about the payload
const UNSPECIFIC_MEDIA_TYPES: &[&str] = &["application/octet-stream", "binary/octet-stream"];

/// Input downloaded with a single HTTP GET
pub struct HttpSource {
    url: String,
    name: String,
    max_retry: u32,
}

impl HttpSource {
    /// The input is named after the URL's last path segment.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let path = url.split(['?', '#']).next().unwrap_or_default();
        let name = basename(path).to_string();
        Self {
            url,
            name,
            max_retry: 10,
        }
    }

    /// Content-Type from the response, or the URL extension when the server
    /// sent nothing useful.
    fn media_type(&self, content_type: Option<&str>) -> Option<String> {
        match content_type {
            Some(value)
                if !UNSPECIFIC_MEDIA_TYPES
                    .iter()
                    .any(|t| value.trim().starts_with(t)) =>
            {
                Some(value.to_string())
            }
            _ => media_type_for(&self.name).map(str::to_string),
        }
    }
}

#[async_trait]
impl Source for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<InputFile> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let mut retry_count = 0;

        loop {
            match client.get(&self.url).send().await {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        bail!("{}: HTTP request failed with status: {}", self.url, resp.status());
                    }

                    let content_type = resp
                        .headers()
                        .get(CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let bytes = resp.bytes().await?.to_vec();
                    debug!(url = %self.url, bytes = bytes.len(), ?content_type, "downloaded");

                    let input = InputFile::new(self.name.clone(), bytes);
                    return Ok(match self.media_type(content_type.as_deref()) {
                        Some(media_type) => input.with_media_type(media_type),
                        None => input,
                    });
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        bail!("{}: max retries exceeded", self.url);
                    }
                    warn!(
                        url = %self.url,
                        error = %e,
                        "connection error, retry {}/{}",
                        retry_count,
                        self.max_retry
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_ignores_query_and_fragment() {
        assert_eq!(HttpSource::new("https://h/a/b/c.zip?sig=1#x").name(), "c.zip");
        assert_eq!(HttpSource::new("http://h/style.xsl").name(), "style.xsl");
    }

    #[test]
    fn media_type_prefers_header() {
        let source = HttpSource::new("https://h/bundle.zip");
        assert_eq!(
            source.media_type(Some("application/x-zip-compressed")).as_deref(),
            Some("application/x-zip-compressed")
        );
        assert_eq!(
            source.media_type(Some("application/octet-stream")).as_deref(),
            Some("application/zip")
        );
        assert_eq!(source.media_type(None).as_deref(), Some("application/zip"));
        assert_eq!(HttpSource::new("https://h/a.xml").media_type(None), None);
    }
}
