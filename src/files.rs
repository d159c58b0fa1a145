//! Named byte blobs flowing into the pipeline.

/// Media types that mark an input as a ZIP archive to expand.
pub const ARCHIVE_MEDIA_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-zip",
];

/// Extension of documents that are transformed and reported.
pub const DOCUMENT_EXTENSION: &str = ".xml";

/// Extension of stylesheets that are only registered.
pub const STYLESHEET_EXTENSION: &str = ".xsl";

/// One input as handed to the pipeline.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    /// Declared container type, e.g. `application/zip`
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: None,
            bytes,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Whether the declared media type asks for ZIP expansion.
    pub fn is_archive(&self) -> bool {
        self.media_type.as_deref().is_some_and(|media_type| {
            // Content-Type headers may carry parameters
            let essence = media_type.split(';').next().unwrap_or_default().trim();
            ARCHIVE_MEDIA_TYPES
                .iter()
                .any(|t| t.eq_ignore_ascii_case(essence))
        })
    }
}

/// A file with its final name and uncompressed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl From<InputFile> for RawFile {
    fn from(input: InputFile) -> Self {
        Self {
            name: input.name,
            bytes: input.bytes,
        }
    }
}

/// `.xml` files are transformed; case-sensitive.
pub fn is_document(name: &str) -> bool {
    name.ends_with(DOCUMENT_EXTENSION)
}

/// `.xsl` files are registered as stylesheets; case-sensitive.
pub fn is_stylesheet(name: &str) -> bool {
    name.ends_with(STYLESHEET_EXTENSION)
}

/// Files that take part in the registry at all.
pub fn is_candidate(name: &str) -> bool {
    is_document(name) || is_stylesheet(name)
}

/// Final path segment, `/` and `\` both treated as separators.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
