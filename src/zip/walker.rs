//! Forward-only scanner over local file headers.
//!
//! The walker never looks at the central directory. It starts at offset 0 and
//! hops from one local file header to the next, which is the only way to read
//! archives written by streaming producers: those write each entry before they
//! know its size, set bit 3 of the general purpose flag, leave the size fields
//! at zero and append a data descriptor after the compressed data.
//!
//! For such entries the walker scans forward byte by byte for the descriptor
//! signature and takes the authoritative sizes from there.
//!
//! ## Leniency
//!
//! By default anything that does not look like another local header ends the
//! scan without an error, including truncated headers and missing descriptors.
//! [`ArchiveWalker::strict`] turns those conditions into
//! [`Error::ArchiveFormat`].

use std::ops::Range;

use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::structures::*;

/// Sequential local-file-header scanner over a borrowed archive buffer.
pub struct ArchiveWalker<'a> {
    /// Archive name, used in errors and logs
    archive: &'a str,
    data: &'a [u8],
    strict: bool,
}

/// Where the data of one entry lives and where the next header starts.
struct EntryLayout {
    data: Range<usize>,
    uncompressed_size: u64,
    crc32: u32,
    next: usize,
    /// The claimed data ran past the buffer; no further headers can follow
    truncated: bool,
}

impl<'a> ArchiveWalker<'a> {
    pub fn new(archive: &'a str, data: &'a [u8]) -> Self {
        Self {
            archive,
            data,
            strict: false,
        }
    }

    /// Raise [`Error::ArchiveFormat`] instead of ending the scan quietly.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Scan the whole buffer and return the entries in header order.
    pub fn walk(&self) -> Result<Vec<ArchiveEntry>> {
        let mut entries = Vec::new();
        let mut cursor = 0usize;

        loop {
            let Some(signature) = read_u32_at(self.data, cursor) else {
                if cursor < self.data.len() {
                    self.stop(cursor, "trailing bytes after last entry")?;
                }
                break;
            };

            if signature != LFH_SIGNATURE {
                if self.strict && signature != CDFH_SIGNATURE && signature != EOCD_SIGNATURE {
                    return Err(self.format_error(
                        cursor,
                        format!("unexpected signature 0x{signature:08X}"),
                    ));
                }
                debug!(archive = self.archive, offset = cursor, "end of local entries");
                break;
            }

            let Some(header) = LocalFileHeader::from_bytes(&self.data[cursor..]) else {
                self.stop(cursor, "truncated local file header")?;
                break;
            };

            let name_start = cursor + LFH_SIZE;
            let name_end = name_start + header.file_name_length as usize;
            let Some(name_bytes) = self.data.get(name_start..name_end) else {
                self.stop(cursor, "file name runs past end of archive")?;
                break;
            };
            let path = String::from_utf8_lossy(name_bytes).into_owned();

            let data_start = cursor + header.header_len();
            if data_start > self.data.len() {
                self.stop(cursor, "extra field runs past end of archive")?;
                break;
            }

            let layout = if header.has_data_descriptor() {
                match self.descriptor_layout(cursor, data_start)? {
                    Some(layout) => layout,
                    None => break,
                }
            } else {
                self.sized_layout(&header, cursor, data_start)?
            };

            let is_directory = path.ends_with('/');
            debug!(
                archive = self.archive,
                offset = cursor,
                path = %path,
                compressed = layout.data.len(),
                descriptor = header.has_data_descriptor(),
                "local entry"
            );

            entries.push(ArchiveEntry {
                path,
                is_directory,
                data: (!is_directory).then_some(layout.data),
                compression_method: CompressionMethod::from_u16(header.compression_method),
                crc32: layout.crc32,
                uncompressed_size: layout.uncompressed_size,
                header_offset: cursor,
                has_descriptor: header.has_data_descriptor(),
            });

            if layout.truncated {
                break;
            }
            cursor = layout.next;
        }

        Ok(entries)
    }

    /// Sizes come straight from the header.
    fn sized_layout(
        &self,
        header: &LocalFileHeader,
        offset: usize,
        data_start: usize,
    ) -> Result<EntryLayout> {
        let end = data_start + header.compressed_size as usize;
        let truncated = end > self.data.len();
        if truncated {
            self.stop(offset, "entry data runs past end of archive")?;
        }

        Ok(EntryLayout {
            data: data_start..end.min(self.data.len()),
            uncompressed_size: header.uncompressed_size as u64,
            crc32: header.crc32,
            next: end,
            truncated,
        })
    }

    /// Sizes come from the first data descriptor after `data_start`.
    ///
    /// Returns `Ok(None)` when no descriptor can be found in lenient mode.
    fn descriptor_layout(&self, offset: usize, data_start: usize) -> Result<Option<EntryLayout>> {
        let Some(position) = find_descriptor(self.data, data_start) else {
            self.stop(offset, "data descriptor not found")?;
            return Ok(None);
        };

        let Some(descriptor) = DataDescriptor::from_bytes(&self.data[position..]) else {
            self.stop(position, "truncated data descriptor")?;
            return Ok(None);
        };

        let end = data_start + descriptor.compressed_size as usize;
        if end > position {
            if self.strict {
                return Err(self.format_error(
                    position,
                    format!(
                        "descriptor size {} overlaps the descriptor itself",
                        descriptor.compressed_size
                    ),
                ));
            }
            warn!(
                archive = self.archive,
                offset = position,
                "descriptor size overlaps descriptor; clamping"
            );
        }

        Ok(Some(EntryLayout {
            data: data_start..end.min(position),
            uncompressed_size: descriptor.uncompressed_size as u64,
            crc32: descriptor.crc32,
            next: position + DATA_DESCRIPTOR_SIZE,
            truncated: false,
        }))
    }

    /// End the scan: an error in strict mode, a warning otherwise.
    fn stop(&self, offset: usize, reason: &str) -> Result<()> {
        if self.strict {
            return Err(self.format_error(offset, reason.to_string()));
        }
        warn!(archive = self.archive, offset, "{reason}; ending scan");
        Ok(())
    }

    fn format_error(&self, offset: usize, reason: String) -> Error {
        Error::ArchiveFormat {
            archive: self.archive.to_string(),
            offset,
            reason,
        }
    }
}

/// Offset of the first data descriptor signature at or after `from`.
pub fn find_descriptor(data: &[u8], from: usize) -> Option<usize> {
    let magic = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes();
    data.get(from..)?
        .windows(magic.len())
        .position(|window| window == magic)
        .map(|pos| from + pos)
}
