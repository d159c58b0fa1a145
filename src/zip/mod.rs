//! ZIP archive scanning and extraction.
//!
//! This module reads archives the way a streaming consumer would: front to
//! back, from local file headers only. The central directory is never used,
//! so archives whose writer could not seek back (and therefore stored sizes
//! in trailing data descriptors) are handled the same as regular ones.
//!
//! ## Architecture
//!
//! - [`structures`]: Fixed-layout records (local file header, data descriptor)
//!   and the [`ArchiveEntry`] they produce
//! - [`walker`]: Cursor-based scan that turns a byte buffer into entries
//! - [`inflate`]: Raw deflate decompression of one entry's byte range
//! - [`extractor`]: Expands a whole archive into named files, one
//!   decompression task per entry, results kept in entry order
//!
//! ## Local File Header Layout
//!
//! ```text
//! offset  size  field
//!      0     4  signature 0x04034B50
//!      6     2  general purpose flag (bit 3: data descriptor follows)
//!      8     2  compression method (8 = deflate)
//!     18     4  compressed size (0 when bit 3 is set)
//!     26     2  file name length
//!     28     2  extra field length
//!     30     n  file name, then extra field, then data
//! ```
//!
//! ## Limitations
//!
//! - Only DEFLATE entries can be extracted
//! - No encryption, multi-disk or ZIP64 support

mod extractor;
mod inflate;
mod structures;
mod walker;

pub use extractor::ZipExtractor;
pub use inflate::inflate;
pub use structures::*;
pub use walker::{ArchiveWalker, find_descriptor};
