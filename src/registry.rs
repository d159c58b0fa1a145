//! Document registry and stylesheet resolution.
//!
//! Every parsed `.xml` and `.xsl` file is indexed by basename. Once the
//! registry is complete, each document's `xml-stylesheet` processing
//! instructions are resolved against it. Because lookups only happen after
//! the whole batch is indexed, documents may reference each other in any
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::files::{RawFile, basename};
use crate::xml::pi::{STYLESHEET_TARGET, stylesheet_href};
use crate::xml::{self, Document};

/// A successfully parsed `.xml` or `.xsl` file.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub name: String,
    pub document: Document,
}

impl ParsedDocument {
    /// Parse a raw file as XML.
    ///
    /// # Arguments
    ///
    /// * `file` - The file to parse; its name is kept for error reporting
    ///
    /// # Returns
    ///
    /// The parsed document, or [`Error::Parse`] naming the file.
    pub fn parse(file: &RawFile) -> Result<Self> {
        let document = xml::parse(&file.bytes).map_err(|e| Error::Parse {
            name: file.name.clone(),
            reason: e.to_string(),
        })?;
        debug!(name = %file.name, "parsed document");
        Ok(Self {
            name: file.name.clone(),
            document,
        })
    }
}

/// Stylesheet references declared by one document, in encounter order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetAssociation {
    pub document_name: String,
    pub hrefs: Vec<String>,
}

impl StylesheetAssociation {
    /// Collect the `href` of every top-level `xml-stylesheet` instruction.
    ///
    /// Instructions without a usable `href` contribute nothing.
    pub fn of(document: &ParsedDocument) -> Self {
        let hrefs = document
            .document
            .processing_instructions()
            .filter(|pi| pi.target == STYLESHEET_TARGET)
            .filter_map(|pi| stylesheet_href(&pi.data).map(|href| href.into_owned()))
            .collect();
        Self {
            document_name: document.name.clone(),
            hrefs,
        }
    }
}

/// Parsed documents by basename.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    documents: HashMap<String, Arc<ParsedDocument>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a document under its basename. A later insert with the same
    /// basename replaces the earlier one, which is returned.
    pub fn insert(&mut self, document: Arc<ParsedDocument>) -> Option<Arc<ParsedDocument>> {
        let key = basename(&document.name).to_string();
        let previous = self.documents.insert(key, document);
        if let Some(previous) = &previous {
            debug!(name = %previous.name, "replaced by a later file with the same name");
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ParsedDocument>> {
        self.documents.get(name)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Look up each href by its final path segment. Hrefs that name no
    /// registered document are dropped.
    pub fn resolve(&self, association: &StylesheetAssociation) -> Vec<Arc<ParsedDocument>> {
        association
            .hrefs
            .iter()
            .filter_map(|href| {
                let found = self.get(basename(href)).cloned();
                if found.is_none() {
                    debug!(
                        document = %association.document_name,
                        %href,
                        "stylesheet not found in batch; skipped"
                    );
                }
                found
            })
            .collect()
    }
}

impl FromIterator<Arc<ParsedDocument>> for Registry {
    fn from_iter<I: IntoIterator<Item = Arc<ParsedDocument>>>(iter: I) -> Self {
        let mut registry = Registry::new();
        for document in iter {
            registry.insert(document);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str, markup: &str) -> Arc<ParsedDocument> {
        Arc::new(ParsedDocument::parse(&RawFile::new(name, markup.as_bytes().to_vec())).unwrap())
    }

    #[test]
    fn parse_error_names_the_file() {
        let err = ParsedDocument::parse(&RawFile::new("bad.xml", b"<a><b></a>".to_vec()))
            .unwrap_err();
        assert!(matches!(&err, Error::Parse { name, .. } if name == "bad.xml"));
    }

    #[test]
    fn collects_hrefs_in_order() {
        let a = doc(
            "a.xml",
            r#"<?xml version="1.0"?>
<?xml-stylesheet type="text/xsl" href="one.xsl"?>
<?xml-stylesheet title="no href"?>
<?other href="ignored.xsl"?>
<?xml-stylesheet href='dir/two.xsl'?>
<a/>"#,
        );
        let association = StylesheetAssociation::of(&a);
        assert_eq!(association.document_name, "a.xml");
        assert_eq!(association.hrefs, vec!["one.xsl", "dir/two.xsl"]);
    }

    #[test]
    fn resolves_by_basename_and_drops_misses() {
        let registry: Registry = [
            doc("one.xsl", "<s/>"),
            doc("nested/two.xsl", "<t/>"),
        ]
        .into_iter()
        .collect();
        let association = StylesheetAssociation {
            document_name: "a.xml".into(),
            hrefs: vec![
                "https://example.com/styles/two.xsl".into(),
                "missing.xsl".into(),
                r"C:\styles\one.xsl".into(),
            ],
        };
        let names: Vec<_> = registry
            .resolve(&association)
            .iter()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, vec!["nested/two.xsl", "one.xsl"]);
    }

    #[test]
    fn later_duplicate_wins() {
        let mut registry = Registry::new();
        assert!(registry.insert(doc("s.xsl", "<first/>")).is_none());
        let previous = registry.insert(doc("dir/s.xsl", "<second/>")).unwrap();
        assert_eq!(previous.name, "s.xsl");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("s.xsl").unwrap().name, "dir/s.xsl");
    }

    #[test]
    fn mutual_references_resolve_in_any_order() {
        let a = doc("a.xml", r#"<?xml-stylesheet href="b.xml"?><a/>"#);
        let b = doc("b.xml", r#"<?xml-stylesheet href="a.xml"?><b/>"#);

        for batch in [vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]] {
            let registry: Registry = batch.into_iter().collect();
            let from_a = registry.resolve(&StylesheetAssociation::of(&a));
            let from_b = registry.resolve(&StylesheetAssociation::of(&b));
            assert!(Arc::ptr_eq(&from_a[0], &b));
            assert!(Arc::ptr_eq(&from_b[0], &a));
        }
    }
}
