//! Archive builders and fixtures shared by the integration tests.
#![allow(dead_code)]

use std::io::{Cursor, Write};

use flate2::Compression;
use flate2::write::DeflateEncoder;
use xslview::InputFile;

const LFH_SIGNATURE: u32 = 0x04034B50;
const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074B50;
const EOCD_SIGNATURE: u32 = 0x06054B50;

pub const UPPERCASE_XSL: &str = r#"<?xml version="1.0"?>
<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/">
    <ROOT><xsl:value-of select="translate(root, 'abcdefghijklmnopqrstuvwxyz', 'ABCDEFGHIJKLMNOPQRSTUVWXYZ')"/></ROOT>
  </xsl:template>
</xsl:stylesheet>
"#;

/// Copies elements and upper-cases every text node on the way.
pub const UPPERCASE_TEXT_XSL: &str = r#"<?xml version="1.0"?>
<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="*">
    <xsl:copy><xsl:copy-of select="@*"/><xsl:apply-templates/></xsl:copy>
  </xsl:template>
  <xsl:template match="text()">
    <xsl:value-of select="translate(., 'abcdefghijklmnopqrstuvwxyz', 'ABCDEFGHIJKLMNOPQRSTUVWXYZ')"/>
  </xsl:template>
</xsl:stylesheet>
"#;

/// Calls itself until the engine gives up.
pub const RUNAWAY_XSL: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/"><xsl:call-template name="loop"/></xsl:template>
  <xsl:template name="loop"><xsl:call-template name="loop"/></xsl:template>
</xsl:stylesheet>
"#;

pub const DOCUMENT_XML: &str = r#"<?xml version="1.0"?>
<?xml-stylesheet type="text/xsl" href="style.xsl"?>
<root>hi</root>
"#;

pub fn deflate(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Writes local file headers by hand, the way a streaming producer would.
#[derive(Default)]
pub struct ArchiveBuilder {
    buf: Vec<u8>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deflate entry with its sizes in the local header.
    pub fn file(mut self, name: &str, content: &[u8]) -> Self {
        let compressed = deflate(content);
        self.header(name, 0, 8, compressed.len() as u32, content.len() as u32);
        self.buf.extend_from_slice(&compressed);
        self
    }

    /// Deflate entry with zero header sizes and a trailing data descriptor.
    pub fn streamed(mut self, name: &str, content: &[u8]) -> Self {
        let compressed = deflate(content);
        self.header(name, 1 << 3, 8, 0, 0);
        self.buf.extend_from_slice(&compressed);
        self.descriptor(compressed.len() as u32, content.len() as u32);
        self
    }

    /// Entry whose header claims `method` and whose data is `raw` as given.
    pub fn raw(mut self, name: &str, method: u16, raw: &[u8]) -> Self {
        self.header(name, 0, method, raw.len() as u32, raw.len() as u32);
        self.buf.extend_from_slice(raw);
        self
    }

    /// Directory entry written by a streaming producer: flag set, empty
    /// descriptor.
    pub fn directory(mut self, name: &str) -> Self {
        self.header(name, 1 << 3, 0, 0, 0);
        self.descriptor(0, 0);
        self
    }

    /// Current length, i.e. the offset the next record will start at.
    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    /// Append an end-of-central-directory record and return the bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.extend_from_slice(&EOCD_SIGNATURE.to_le_bytes());
        self.buf.extend_from_slice(&[0u8; 18]);
        self.buf
    }

    /// The bytes written so far, without a trailer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn header(&mut self, name: &str, flags: u16, method: u16, compressed: u32, uncompressed: u32) {
        let buf = &mut self.buf;
        buf.extend_from_slice(&LFH_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&20u16.to_le_bytes());
        buf.extend_from_slice(&flags.to_le_bytes());
        buf.extend_from_slice(&method.to_le_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&compressed.to_le_bytes());
        buf.extend_from_slice(&uncompressed.to_le_bytes());
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
    }

    fn descriptor(&mut self, compressed: u32, uncompressed: u32) {
        self.buf.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        self.buf.extend_from_slice(&0u32.to_le_bytes());
        self.buf.extend_from_slice(&compressed.to_le_bytes());
        self.buf.extend_from_slice(&uncompressed.to_le_bytes());
    }
}

/// Archive produced by the `zip` crate writer, all entries deflated.
pub fn zip_crate_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = || {
        zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
    };
    for (name, content) in files {
        if name.ends_with('/') {
            writer.add_directory(*name, options()).unwrap();
        } else {
            writer.start_file(*name, options()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

/// `depth` nested `<n>` elements around a single text node.
pub fn nested(depth: usize) -> String {
    format!("{}x{}", "<n>".repeat(depth), "</n>".repeat(depth))
}

pub fn input(name: &str, content: &str) -> InputFile {
    InputFile::new(name, content.as_bytes().to_vec())
}

pub fn archive(name: &str, bytes: Vec<u8>) -> InputFile {
    InputFile::new(name, bytes).with_media_type("application/zip")
}

/// Deterministic, poorly compressible bytes.
pub fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545F491u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}
