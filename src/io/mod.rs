//! Input sources: local files and HTTP(S) URLs loaded into [`InputFile`]s.

mod http;
mod local;

pub use http::HttpSource;
pub use local::LocalFile;

use anyhow::Result;
use async_trait::async_trait;

use crate::files::{InputFile, basename};

/// Media type given to inputs whose name ends in `.zip`.
pub const ZIP_MEDIA_TYPE: &str = "application/zip";

/// A named blob that can be loaded as pipeline input
#[async_trait]
pub trait Source: Send + Sync {
    /// Name the loaded input will carry
    fn name(&self) -> &str;

    /// Read the whole content and attach a media type
    async fn load(&self) -> Result<InputFile>;
}

/// Pick the source for a command-line location.
pub fn open(location: &str) -> Box<dyn Source> {
    if is_http_url(location) {
        Box::new(HttpSource::new(location))
    } else {
        Box::new(LocalFile::new(location))
    }
}

pub fn is_http_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Media type implied by a file name, if any.
pub fn media_type_for(name: &str) -> Option<&'static str> {
    basename(name)
        .to_ascii_lowercase()
        .ends_with(".zip")
        .then_some(ZIP_MEDIA_TYPE)
}
