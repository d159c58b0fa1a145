use futures::future::{join_all, try_join_all};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::files::RawFile;

use super::inflate::inflate;
use super::structures::{ArchiveEntry, CompressionMethod};
use super::walker::ArchiveWalker;

/// Pre-allocation is capped; header sizes are untrusted.
const MAX_SIZE_HINT: usize = 16 * 1024 * 1024;

/// Expands one in-memory ZIP archive into named files.
///
/// Entries are found with [`ArchiveWalker`]; every non-directory entry is then
/// decompressed as its own task and the results are reassembled in entry order.
pub struct ZipExtractor<'a> {
    name: &'a str,
    data: &'a [u8],
    strict: bool,
}

impl<'a> ZipExtractor<'a> {
    pub fn new(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            strict: false,
        }
    }

    /// Fail on malformed archive structure instead of ending the scan.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// List all entries in the archive, directories included
    pub fn list_files(&self) -> Result<Vec<ArchiveEntry>> {
        ArchiveWalker::new(self.name, self.data)
            .strict(self.strict)
            .walk()
    }

    /// Decompress every file entry; the first failure fails the whole archive.
    pub async fn extract_all(&self) -> Result<Vec<RawFile>> {
        let entries = self.list_files()?;
        let tasks = file_entries(&entries).map(|entry| self.extract_to_memory(entry));
        try_join_all(tasks).await
    }

    /// Decompress every file entry, keeping each entry's outcome separate.
    ///
    /// Only a structural error (strict mode) fails the archive as a whole.
    pub async fn extract_settled(&self) -> Result<Vec<(String, Result<RawFile>)>> {
        let entries = self.list_files()?;
        let tasks = file_entries(&entries).map(|entry| async move {
            (
                entry.file_name().to_string(),
                self.extract_to_memory(entry).await,
            )
        });
        Ok(join_all(tasks).await)
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(&self, entry: &ArchiveEntry) -> Result<RawFile> {
        let name = entry.file_name().to_string();

        // Check compression method
        if entry.compression_method != CompressionMethod::Deflate {
            return Err(Error::Decompression {
                entry: name,
                reason: format!(
                    "unsupported compression method {} (only deflate is supported)",
                    entry.compression_method.as_u16()
                ),
            });
        }

        let range = entry.data.clone().unwrap_or_default();
        let hint = (entry.uncompressed_size as usize).min(MAX_SIZE_HINT);
        let bytes = inflate(&name, &self.data[range], hint).await?;

        if bytes.len() as u64 != entry.uncompressed_size {
            warn!(
                archive = self.name,
                entry = %entry.path,
                declared = entry.uncompressed_size,
                actual = bytes.len(),
                "uncompressed size differs from header"
            );
        }
        debug!(archive = self.name, entry = %entry.path, size = bytes.len(), "extracted");

        Ok(RawFile { name, bytes })
    }
}

/// Entries that carry data; directories never produce files.
fn file_entries(entries: &[ArchiveEntry]) -> impl Iterator<Item = &ArchiveEntry> {
    entries.iter().filter(|e| !e.is_directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::structures::{DATA_DESCRIPTOR_SIGNATURE, LFH_SIGNATURE};
    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    fn streamed_entry(name: &str, method: u16, payload: &[u8]) -> Vec<u8> {
        let body = if method == 8 {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(payload).unwrap();
            encoder.finish().unwrap()
        } else {
            payload.to_vec()
        };

        let mut buf = Vec::new();
        buf.extend_from_slice(&LFH_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&20u16.to_le_bytes());
        buf.extend_from_slice(&0x0008u16.to_le_bytes());
        buf.extend_from_slice(&method.to_le_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(&body);
        buf.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf
    }

    #[tokio::test]
    async fn extracts_streamed_entries_in_order() {
        let mut archive = streamed_entry("docs/", 0, b"");
        archive.extend(streamed_entry("docs/a.xml", 8, b"<a>first</a>"));
        archive.extend(streamed_entry("docs/xsl/b.xsl", 8, b"<b>second</b>"));

        let files = ZipExtractor::new("t.zip", &archive).extract_all().await.unwrap();
        assert_eq!(
            files,
            vec![
                RawFile {
                    name: "a.xml".into(),
                    bytes: b"<a>first</a>".to_vec()
                },
                RawFile {
                    name: "b.xsl".into(),
                    bytes: b"<b>second</b>".to_vec()
                },
            ]
        );
    }

    #[tokio::test]
    async fn stored_entries_are_rejected() {
        let mut archive = streamed_entry("a.xml", 8, b"<a/>");
        archive.extend(streamed_entry("b.xml", 0, b"<b/>"));

        let err = ZipExtractor::new("t.zip", &archive)
            .extract_all()
            .await
            .unwrap_err();
        assert_eq!(err.file_name(), "b.xml");

        let settled = ZipExtractor::new("t.zip", &archive)
            .extract_settled()
            .await
            .unwrap();
        assert_eq!(settled.len(), 2);
        assert!(settled[0].1.is_ok());
        assert_eq!(settled[1].0, "b.xml");
        assert!(settled[1].1.is_err());
    }
}
