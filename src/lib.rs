//! # xslview
//!
//! Batch XSLT rendering for XML documents that declare their own stylesheets.
//!
//! A batch is a list of named inputs: loose `.xml` and `.xsl` files and ZIP
//! archives holding more of them. Archives are read front to back from their
//! local file headers, so streamed archives with trailing data descriptors
//! work without a central directory. Every `.xml` document is transformed with
//! the stylesheets its `<?xml-stylesheet href="..."?>` instructions name,
//! looked up by file name among the files of the same batch.
//!
//! ## Features
//!
//! - Forward-only ZIP scanning with data descriptor recovery
//! - Raw deflate decompression, one task per entry
//! - Stylesheet references resolved across the whole batch, in any order
//! - Built-in XSLT 1.0 subset engine behind the [`Transformer`] trait
//! - Fail-fast or per-document failure reporting
//!
//! ## Example
//!
//! ```no_run
//! use xslview::{InputFile, Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let inputs = vec![
//!         InputFile::new("a.xml", br#"<?xml-stylesheet href="style.xsl"?><root>hi</root>"#.to_vec()),
//!         InputFile::new("style.xsl", std::fs::read("style.xsl")?),
//!     ];
//!
//!     let pipeline = Pipeline::new(PipelineConfig::default());
//!     for result in pipeline.run(inputs).await? {
//!         println!("{}: {}", result.name, result.markup);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod files;
pub mod io;
pub mod pipeline;
pub mod registry;
pub mod xml;
pub mod xslt;
pub mod zip;

pub use cli::Cli;
pub use error::{Error, Result};
pub use files::{InputFile, RawFile};
pub use pipeline::{FailurePolicy, FileOutcome, Pipeline, PipelineConfig, TransformResult};
pub use registry::{ParsedDocument, Registry, StylesheetAssociation};
pub use xslt::{Transformer, Xslt, XsltError};
pub use crate::zip::{ArchiveEntry, ZipExtractor};
