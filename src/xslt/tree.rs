//! Read-only, index-addressed view of a source document.
//!
//! XPath needs parent and sibling navigation and a document order; the owned
//! [`Document`] has neither, so the processor flattens it into an arena.
//! Nodes are numbered in document order (an element, then its attributes,
//! then its children), so sorting by id sorts by document order.

use crate::xml::{Document, Element, Node, ProcessingInstruction};

pub type NodeId = usize;

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root,
    Element { name: String },
    Attribute { name: String, value: String },
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attributes: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<TreeNode>,
}

impl Tree {
    pub const ROOT: NodeId = 0;

    pub fn from_document(document: &Document) -> Self {
        let mut tree = Tree {
            nodes: vec![TreeNode {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
                attributes: Vec::new(),
            }],
        };
        for child in &document.children {
            tree.add(Self::ROOT, child);
        }
        tree
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            attributes: Vec::new(),
        });
        id
    }

    fn add(&mut self, parent: NodeId, node: &Node) {
        let id = match node {
            Node::Element(element) => {
                let id = self.push(
                    parent,
                    NodeKind::Element {
                        name: element.name.clone(),
                    },
                );
                for (name, value) in &element.attributes {
                    let attribute = self.push(
                        id,
                        NodeKind::Attribute {
                            name: name.clone(),
                            value: value.clone(),
                        },
                    );
                    self.nodes[id].attributes.push(attribute);
                }
                for child in &element.children {
                    self.add(id, child);
                }
                id
            }
            Node::Text(text) => self.push(parent, NodeKind::Text(text.clone())),
            Node::Comment(text) => self.push(parent, NodeKind::Comment(text.clone())),
            Node::ProcessingInstruction(pi) => self.push(
                parent,
                NodeKind::ProcessingInstruction {
                    target: pi.target.clone(),
                    data: pi.data.clone(),
                },
            ),
        };
        self.nodes[parent].children.push(id);
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].attributes
    }

    pub fn is_attribute(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Attribute { .. })
    }

    /// Qualified name for elements and attributes, target for PIs, else empty.
    pub fn name(&self, id: NodeId) -> &str {
        match self.kind(id) {
            NodeKind::Element { name } | NodeKind::Attribute { name, .. } => name,
            NodeKind::ProcessingInstruction { target, .. } => target,
            _ => "",
        }
    }

    /// Siblings of a node on its parent's child list (attributes have none).
    pub fn siblings(&self, id: NodeId) -> &[NodeId] {
        match self.parent(id) {
            Some(parent) if !self.is_attribute(id) => self.children(parent),
            _ => &[],
        }
    }

    /// Descendants in document order, excluding attributes and `id` itself.
    pub fn descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in self.children(id) {
            out.push(child);
            self.descendants(child, out);
        }
    }

    pub fn string_value(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Root | NodeKind::Element { .. } => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
            NodeKind::Attribute { value, .. } => value.clone(),
            NodeKind::Text(text) | NodeKind::Comment(text) => text.clone(),
            NodeKind::ProcessingInstruction { data, .. } => data.clone(),
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::Text(text) => out.push_str(text),
                NodeKind::Element { .. } => self.collect_text(child, out),
                _ => {}
            }
        }
    }

    /// Deep copy of a node back into the owned model.
    ///
    /// Returns `None` for the root and attributes, which have no standalone
    /// node form.
    pub fn to_node(&self, id: NodeId) -> Option<Node> {
        match self.kind(id) {
            NodeKind::Root | NodeKind::Attribute { .. } => None,
            NodeKind::Element { name } => {
                let mut element = Element::new(name.clone());
                for &attribute in self.attributes(id) {
                    if let NodeKind::Attribute { name, value } = self.kind(attribute) {
                        element.attributes.push((name.clone(), value.clone()));
                    }
                }
                element.children = self
                    .children(id)
                    .iter()
                    .filter_map(|&child| self.to_node(child))
                    .collect();
                Some(Node::Element(element))
            }
            NodeKind::Text(text) => Some(Node::Text(text.clone())),
            NodeKind::Comment(text) => Some(Node::Comment(text.clone())),
            NodeKind::ProcessingInstruction { target, data } => {
                Some(Node::ProcessingInstruction(ProcessingInstruction {
                    target: target.clone(),
                    data: data.clone(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    #[test]
    fn ids_follow_document_order() {
        let doc = parse(br#"<?pi x?><a k="v"><b>one</b>two</a>"#).unwrap();
        let tree = Tree::from_document(&doc);

        // root, pi, a, @k, b, "one", "two"
        assert_eq!(tree.children(Tree::ROOT), &[1, 2]);
        assert_eq!(tree.name(1), "pi");
        assert_eq!(tree.name(2), "a");
        assert_eq!(tree.attributes(2), &[3]);
        assert_eq!(tree.children(2), &[4, 6]);
        assert_eq!(tree.parent(3), Some(2));
        assert_eq!(tree.string_value(2), "onetwo");
        assert_eq!(tree.string_value(3), "v");

        let mut all = Vec::new();
        tree.descendants(Tree::ROOT, &mut all);
        assert_eq!(all, vec![1, 2, 4, 5, 6]);
    }

    #[test]
    fn to_node_round_trips_elements() {
        let doc = parse(br#"<a k="v"><b>one</b><!--c--></a>"#).unwrap();
        let tree = Tree::from_document(&doc);
        assert_eq!(tree.to_node(1), Some(doc.children[0].clone()));
        assert_eq!(tree.to_node(Tree::ROOT), None);
    }
}
