//! XSLT transformation
//!
//! This module applies a chain of stylesheets to a parsed document.
//!
//! ## Architecture
//!
//! The [`Transformer`] trait is the seam the pipeline calls. [`Xslt`] is the
//! built-in engine behind it:
//!
//! 1. Each stylesheet document is compiled into templates ([`stylesheet`])
//! 2. The source document is flattened into an indexed tree ([`tree`])
//! 3. Templates are matched against tree nodes by pattern ([`pattern`]) and
//!    their bodies executed, evaluating XPath expressions ([`xpath`], [`eval`])
//!
//! Stylesheets associated with one document are combined as if each later
//! one imported the ones before it: on a conflict the later stylesheet wins.
//!
//! ## Limitations
//!
//! - XSLT 1.0 subset: no `xsl:key`, `xsl:number`, `xsl:import`/`xsl:include`,
//!   `xsl:output` or extension functions
//! - Namespaces are compared by qualified name, not by URI
//! - Template calls nest at most [`MAX_DEPTH`] deep. Transforms run on a
//!   dedicated thread with [`TRANSFORM_STACK_SIZE`] bytes of stack so that
//!   limit is reached before the stack runs out

mod eval;
mod pattern;
mod processor;
mod stylesheet;
mod tree;
mod xpath;

use std::thread;

use thiserror::Error;
use tracing::debug;

use crate::xml::Document;

pub use processor::MAX_DEPTH;
use processor::Processor;
use stylesheet::Stylesheet;
use tree::Tree;

#[derive(Debug, Error)]
pub enum XsltError {
    #[error("stylesheet error: {0}")]
    Compile(String),

    #[error("invalid XPath expression '{expr}': {message}")]
    XPath { expr: String, message: String },

    #[error("{0}")]
    Runtime(String),

    #[error("terminated by xsl:message: {0}")]
    Terminated(String),
}

/// Stack size of the thread a transform runs on.
pub const TRANSFORM_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Run `f` to completion on a scoped thread with [`TRANSFORM_STACK_SIZE`]
/// bytes of stack.
///
/// Tree walks over transform input and output recurse once per level, so
/// anything that builds, serializes or drops a result tree belongs in here.
pub fn with_transform_stack<T: Send>(f: impl FnOnce() -> T + Send) -> Result<T, XsltError> {
    thread::scope(|scope| -> Result<T, XsltError> {
        let handle = thread::Builder::new()
            .name("xslt".to_string())
            .stack_size(TRANSFORM_STACK_SIZE)
            .spawn_scoped(scope, f)
            .map_err(|e| XsltError::Runtime(format!("cannot start transform thread: {e}")))?;
        handle
            .join()
            .map_err(|_| XsltError::Runtime("transform thread panicked".to_string()))
    })
}

/// Applies stylesheets to documents.
pub trait Transformer: Send + Sync {
    /// Transform `source` with `stylesheets`, in association order.
    ///
    /// With no stylesheets only the built-in rules apply, which yields the
    /// document's text content.
    fn transform(&self, source: &Document, stylesheets: &[&Document])
    -> Result<Document, XsltError>;
}

/// The built-in XSLT 1.0 subset engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xslt;

impl Transformer for Xslt {
    fn transform(
        &self,
        source: &Document,
        stylesheets: &[&Document],
    ) -> Result<Document, XsltError> {
        with_transform_stack(|| -> Result<Document, XsltError> {
            let compiled = stylesheets
                .iter()
                .map(|document| Stylesheet::compile(document))
                .collect::<Result<Vec<_>, _>>()?;
            debug!(
                stylesheets = compiled.len(),
                templates = compiled.iter().map(|s| s.templates.len()).sum::<usize>(),
                "compiled stylesheets"
            );

            let tree = Tree::from_document(source);
            let processor = Processor::new(&tree, &compiled)?;
            Ok(Document::new(processor.run()?))
        })?
    }
}
