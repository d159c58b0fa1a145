//! Serialize a [`Document`] back to markup.

use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use super::XmlError;
use super::node::{Document, Element, Node};

/// Serialize without an XML declaration. Childless elements are written as
/// `<name/>`.
pub fn to_markup(document: &Document) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    for node in &document.children {
        write_node(&mut writer, node)?;
    }
    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<(), XmlError> {
    match node {
        Node::Element(element) => write_element(writer, element)?,
        Node::Text(text) => {
            writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?
        }
        Node::Comment(text) => writer.write_event(Event::Comment(BytesText::from_escaped(
            text.as_str(),
        )))?,
        Node::ProcessingInstruction(pi) => {
            let content = if pi.data.is_empty() {
                pi.target.clone()
            } else {
                format!("{} {}", pi.target, pi.data)
            };
            writer.write_event(Event::PI(BytesText::from_escaped(content)))?
        }
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), XmlError> {
    let start = BytesStart::new(element.name.as_str()).with_attributes(
        element
            .attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str())),
    );

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
