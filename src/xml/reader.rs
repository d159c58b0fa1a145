//! Build a [`Document`] from quick-xml events.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::node::{Document, Element, Node, ProcessingInstruction};
use super::XmlError;

/// Parse UTF-8 XML bytes into an owned tree.
///
/// The XML declaration and DOCTYPE are dropped, CDATA sections become text and
/// whitespace between top-level nodes is discarded. The document must contain
/// exactly one root element.
pub fn parse(bytes: &[u8]) -> Result<Document, XmlError> {
    let text = std::str::from_utf8(bytes)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = Reader::from_str(text);
    reader.expand_empty_elements(true);

    let mut builder = TreeBuilder::default();

    loop {
        let position = reader.buffer_position();
        let event = reader.read_event().map_err(|e| XmlError::Syntax {
            position,
            message: e.to_string(),
        })?;
        let syntax = |message: String| XmlError::Syntax { position, message };

        match event {
            Event::Start(start) => {
                let element = element_from(&start).map_err(syntax)?;
                builder.open(element, position)?;
            }
            Event::Empty(start) => {
                let element = element_from(&start).map_err(syntax)?;
                builder.push(Node::Element(element), position)?;
            }
            Event::End(_) => {
                let element = builder
                    .open
                    .pop()
                    .ok_or_else(|| syntax("end tag without start tag".to_string()))?;
                builder.push(Node::Element(element), position)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| syntax(e.to_string()))?;
                builder.push_text(&text, position)?;
            }
            Event::CData(cdata) => {
                let text = std::str::from_utf8(&cdata)?;
                builder.push_text(text, position)?;
            }
            Event::Comment(comment) => {
                let text = std::str::from_utf8(&comment)?.to_string();
                builder.push(Node::Comment(text), position)?;
            }
            Event::PI(pi) => {
                let content = std::str::from_utf8(&pi)?;
                builder.push(
                    Node::ProcessingInstruction(split_instruction(content)),
                    position,
                )?;
            }
            Event::Decl(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    builder.finish()
}

/// Split `target data` at the first whitespace.
fn split_instruction(content: &str) -> ProcessingInstruction {
    match content.find(char::is_whitespace) {
        Some(index) => ProcessingInstruction {
            target: content[..index].to_string(),
            data: content[index..].trim_start().to_string(),
        },
        None => ProcessingInstruction {
            target: content.to_string(),
            data: String::new(),
        },
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<Element, String> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| e.to_string())?
        .to_string();
    let mut element = Element::new(name);

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| e.to_string())?;
        let key = std::str::from_utf8(attribute.key.as_ref()).map_err(|e| e.to_string())?;
        let value = attribute.unescape_value().map_err(|e| e.to_string())?;
        element
            .attributes
            .push((key.to_string(), value.into_owned()));
    }

    Ok(element)
}

/// Elements may nest at most this deep.
pub const MAX_NESTING: usize = 2048;

#[derive(Default)]
struct TreeBuilder {
    /// Elements whose end tag has not been seen yet
    open: Vec<Element>,
    top: Vec<Node>,
}

impl TreeBuilder {
    fn open(&mut self, element: Element, position: usize) -> Result<(), XmlError> {
        if self.open.len() >= MAX_NESTING {
            return Err(XmlError::Structure(format!(
                "elements nested deeper than {MAX_NESTING} at position {position}"
            )));
        }
        self.open.push(element);
        Ok(())
    }

    fn push(&mut self, node: Node, position: usize) -> Result<(), XmlError> {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => {
                if matches!(node, Node::Element(_))
                    && self.top.iter().any(|n| matches!(n, Node::Element(_)))
                {
                    return Err(XmlError::Structure(format!(
                        "second root element at position {position}"
                    )));
                }
                self.top.push(node);
            }
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str, position: usize) -> Result<(), XmlError> {
        let Some(parent) = self.open.last_mut() else {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(XmlError::Structure(format!(
                "text outside the root element at position {position}"
            )));
        };

        if let Some(Node::Text(previous)) = parent.children.last_mut() {
            previous.push_str(text);
        } else if !text.is_empty() {
            parent.children.push(Node::text(text));
        }
        Ok(())
    }

    fn finish(self) -> Result<Document, XmlError> {
        if let Some(element) = self.open.last() {
            return Err(XmlError::Structure(format!(
                "unclosed element <{}>",
                element.name
            )));
        }
        if !self.top.iter().any(|n| matches!(n, Node::Element(_))) {
            return Err(XmlError::Structure("no root element".to_string()));
        }
        Ok(Document::new(self.top))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_prolog_instructions() {
        let doc = parse(
            br#"<?xml version="1.0"?>
<?xml-stylesheet type="text/xsl" href="style.xsl"?>
<!-- note -->
<root a="1 &amp; 2"><child>x &lt; y</child><![CDATA[<raw>]]></root>"#,
        )
        .unwrap();

        let pis: Vec<_> = doc.processing_instructions().collect();
        assert_eq!(pis.len(), 1);
        assert_eq!(pis[0].target, "xml-stylesheet");
        assert_eq!(pis[0].data, r#"type="text/xsl" href="style.xsl""#);
        assert!(matches!(doc.children[1], Node::Comment(ref c) if c == " note "));

        let root = doc.root_element().unwrap();
        assert_eq!(root.attribute("a"), Some("1 & 2"));
        assert_eq!(doc.text_content(), "x < y<raw>");
    }

    #[test]
    fn expands_empty_elements() {
        let doc = parse(b"<a><b/><c x='1'/></a>").unwrap();
        let root = doc.root_element().unwrap();
        let names: Vec<_> = root.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b", "c"]);
        assert_eq!(root.child_elements().nth(1).unwrap().attribute("x"), Some("1"));
    }

    #[test]
    fn strips_byte_order_mark() {
        let mut bytes = "\u{feff}".as_bytes().to_vec();
        bytes.extend_from_slice(b"<a/>");
        assert_eq!(parse(&bytes).unwrap().root_element().unwrap().name, "a");
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(parse(b"<a><b></a>").is_err());
        assert!(parse(b"<a>").is_err());
        assert!(parse(b"<a/><b/>").is_err());
        assert!(parse(b"just text").is_err());
        assert!(parse(b"").is_err());
        assert!(parse(b"<a>&bogus;</a>").is_err());
        assert!(matches!(parse(&[0x3C, 0xFF, 0x3E]), Err(XmlError::Encoding(_))));
    }

    fn nested(depth: usize) -> String {
        format!("{}x{}", "<n>".repeat(depth), "</n>".repeat(depth))
    }

    #[test]
    fn limits_nesting_depth() {
        let doc = parse(nested(MAX_NESTING).as_bytes()).unwrap();
        assert_eq!(doc.root_element().unwrap().name, "n");

        let err = parse(nested(MAX_NESTING + 1).as_bytes()).unwrap_err();
        assert!(matches!(err, XmlError::Structure(ref m) if m.contains("nested deeper")));
        assert!(parse(nested(10_000).as_bytes()).is_err());
    }
}
