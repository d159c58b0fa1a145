//! Owned XML tree with a quick-xml based parser and serializer.

mod node;
pub mod pi;
mod reader;
mod writer;

pub use node::{Document, Element, Node, ProcessingInstruction, local_name};
pub use reader::{MAX_NESTING, parse};
pub use writer::to_markup;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("invalid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("{0}")]
    Structure(String),

    #[error("write error: {0}")]
    Write(#[from] quick_xml::Error),

    #[error("serialized output is not UTF-8: {0}")]
    Output(#[from] std::string::FromUtf8Error),
}
