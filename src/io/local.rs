use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

use super::{Source, media_type_for};
use crate::files::{InputFile, basename};

/// Input read from the local filesystem
pub struct LocalFile {
    path: PathBuf,
    name: String,
}

impl LocalFile {
    /// The input is named after the path's final segment.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = basename(&path.to_string_lossy()).to_string();
        Self { path, name }
    }
}

#[async_trait]
impl Source for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<InputFile> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "read local file");

        let input = InputFile::new(self.name.clone(), bytes);
        Ok(match media_type_for(&self.name) {
            Some(media_type) => input.with_media_type(media_type),
            None => input,
        })
    }
}
