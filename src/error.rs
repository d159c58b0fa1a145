//! Error types shared by the archive, document and transform stages.

use thiserror::Error;

/// Errors produced while expanding archives, parsing documents or running transforms.
///
/// Every variant names the file it belongs to, so a caller running in isolated
/// mode can attach the error to the right output slot.
#[derive(Debug, Error)]
pub enum Error {
    /// Structural problem in a ZIP stream. Only raised in strict scanning mode;
    /// the lenient walker ends the scan instead.
    #[error("{archive}: invalid archive at offset {offset}: {reason}")]
    ArchiveFormat {
        archive: String,
        offset: usize,
        reason: String,
    },

    /// Corrupt, truncated or unsupported entry data.
    #[error("{entry}: decompression failed: {reason}")]
    Decompression { entry: String, reason: String },

    /// Malformed XML or XSL content.
    #[error("{name}: parse error: {reason}")]
    Parse { name: String, reason: String },

    /// The stylesheet could not be compiled or failed while running.
    #[error("{name}: transform failed: {reason}")]
    Transform { name: String, reason: String },
}

impl Error {
    /// Name of the file (archive, entry or document) the error belongs to.
    pub fn file_name(&self) -> &str {
        match self {
            Error::ArchiveFormat { archive, .. } => archive,
            Error::Decompression { entry, .. } => entry,
            Error::Parse { name, .. } | Error::Transform { name, .. } => name,
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;
