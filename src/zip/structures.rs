use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::ops::Range;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: u32 = 0x04034B50;
pub const LFH_SIZE: usize = 30;

/// Data descriptor - signature, crc32, compressed size, uncompressed size
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074B50;
pub const DATA_DESCRIPTOR_SIZE: usize = 16;

/// Records that may legitimately follow the last local entry
pub const CDFH_SIGNATURE: u32 = 0x02014B50;
pub const EOCD_SIGNATURE: u32 = 0x06054B50;

/// General purpose flag bit 3: sizes live in a trailing data descriptor
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Read a little-endian u32 at `offset`, if the buffer is long enough.
pub fn read_u32_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Fixed part of a local file header.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub flags: u16,
    pub compression_method: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    /// Parse the fixed 30-byte header. Returns `None` if `data` is too short
    /// or does not start with the LFH signature.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < LFH_SIZE || read_u32_at(data, 0)? != LFH_SIGNATURE {
            return None;
        }

        let mut cursor = Cursor::new(&data[4..LFH_SIZE]);

        let _version_needed = cursor.read_u16::<LittleEndian>().ok()?;
        let flags = cursor.read_u16::<LittleEndian>().ok()?;
        let compression_method = cursor.read_u16::<LittleEndian>().ok()?;
        let _last_mod_time = cursor.read_u16::<LittleEndian>().ok()?;
        let _last_mod_date = cursor.read_u16::<LittleEndian>().ok()?;
        let crc32 = cursor.read_u32::<LittleEndian>().ok()?;
        let compressed_size = cursor.read_u32::<LittleEndian>().ok()?;
        let uncompressed_size = cursor.read_u32::<LittleEndian>().ok()?;
        let file_name_length = cursor.read_u16::<LittleEndian>().ok()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>().ok()?;

        Some(Self {
            flags,
            compression_method,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
        })
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Bytes between the start of this header and the start of the entry data.
    pub fn header_len(&self) -> usize {
        LFH_SIZE + self.file_name_length as usize + self.extra_field_length as usize
    }
}

/// Trailing record written after the data of a streamed entry.
#[derive(Debug, Clone)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    /// Parse a descriptor starting at its signature.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < DATA_DESCRIPTOR_SIZE || read_u32_at(data, 0)? != DATA_DESCRIPTOR_SIGNATURE
        {
            return None;
        }

        let mut cursor = Cursor::new(&data[4..DATA_DESCRIPTOR_SIZE]);

        Some(Self {
            crc32: cursor.read_u32::<LittleEndian>().ok()?,
            compressed_size: cursor.read_u32::<LittleEndian>().ok()?,
            uncompressed_size: cursor.read_u32::<LittleEndian>().ok()?,
        })
    }
}

/// One entry reconstructed from a local file header.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Full path as stored in the header
    pub path: String,
    pub is_directory: bool,
    /// Compressed byte range inside the archive buffer; `None` for directories
    pub data: Option<Range<usize>>,
    pub compression_method: CompressionMethod,
    pub crc32: u32,
    pub uncompressed_size: u64,
    /// Offset of the local file header
    pub header_offset: usize,
    pub has_descriptor: bool,
}

impl ArchiveEntry {
    /// Final path segment, used as the extracted file's name
    pub fn file_name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.path)
    }

    pub fn compressed_size(&self) -> usize {
        self.data.as_ref().map_or(0, |r| r.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_strips_directories() {
        let entry = ArchiveEntry {
            path: "docs/xml/a.xml".to_string(),
            is_directory: false,
            data: Some(10..20),
            compression_method: CompressionMethod::Deflate,
            crc32: 0,
            uncompressed_size: 0,
            header_offset: 0,
            has_descriptor: false,
        };
        assert_eq!(entry.file_name(), "a.xml");
        assert_eq!(entry.compressed_size(), 10);
    }

    #[test]
    fn header_rejects_wrong_signature() {
        let mut buf = vec![0u8; LFH_SIZE];
        buf[..4].copy_from_slice(&CDFH_SIGNATURE.to_le_bytes());
        assert!(LocalFileHeader::from_bytes(&buf).is_none());
        assert!(LocalFileHeader::from_bytes(&buf[..12]).is_none());
    }

    #[test]
    fn descriptor_fields() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());
        buf.extend_from_slice(&42u32.to_le_bytes());
        buf.extend_from_slice(&100u32.to_le_bytes());
        let dd = DataDescriptor::from_bytes(&buf).unwrap();
        assert_eq!(dd.crc32, 0xDEADBEEF);
        assert_eq!(dd.compressed_size, 42);
        assert_eq!(dd.uncompressed_size, 100);
    }
}
