//! Runs compiled stylesheets against a source tree.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{info, warn};

use crate::xml::{Element, Node, ProcessingInstruction};

use super::XsltError;
use super::eval::{Context, Scope, Value, string_to_number};
use super::stylesheet::{
    Avt, AvtPart, Binding, BindingValue, Instruction, Sort, Stylesheet, Template,
};
use super::tree::{NodeId, NodeKind, Tree};

/// Template calls nested deeper than this abort the transform.
pub const MAX_DEPTH: usize = 3000;

/// Result nodes under construction, plus attributes for the enclosing element.
#[derive(Debug, Default)]
struct Output {
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Output {
    fn push(&mut self, node: Node) {
        match node {
            Node::Text(text) => self.push_text(&text),
            other => self.children.push(other),
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.children.last_mut() {
            Some(Node::Text(previous)) => previous.push_str(text),
            _ => self.children.push(Node::text(text)),
        }
    }

    fn set_attribute(&mut self, name: String, value: String) {
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            node.collect_text(&mut out);
        }
        out
    }
}

/// Where an instruction runs: the context node and its position in the
/// current node list.
#[derive(Clone, Copy)]
struct Focus {
    node: NodeId,
    position: usize,
    size: usize,
}

/// A template together with the import precedence of its stylesheet.
struct Rule<'s> {
    template: &'s Template,
    precedence: usize,
    order: usize,
}

pub struct Processor<'a> {
    tree: &'a Tree,
    rules: Vec<Rule<'a>>,
    named: HashMap<&'a str, &'a Template>,
    globals: Vec<(String, Value)>,
    depth: Cell<usize>,
}

impl<'a> Processor<'a> {
    /// Combine stylesheets in import order: later stylesheets take precedence.
    pub fn new(tree: &'a Tree, stylesheets: &'a [Stylesheet]) -> Result<Self, XsltError> {
        let mut rules = Vec::new();
        let mut named = HashMap::new();
        for (precedence, stylesheet) in stylesheets.iter().enumerate() {
            for template in &stylesheet.templates {
                if let Some(name) = &template.name {
                    named.insert(name.as_str(), template);
                }
                if !template.patterns.is_empty() {
                    rules.push(Rule {
                        template,
                        precedence,
                        order: rules.len(),
                    });
                }
            }
        }

        let mut processor = Self {
            tree,
            rules,
            named,
            globals: Vec::new(),
            depth: Cell::new(0),
        };

        // Globals see the root as context and every earlier global
        let root = Focus {
            node: Tree::ROOT,
            position: 1,
            size: 1,
        };
        for stylesheet in stylesheets {
            for binding in &stylesheet.globals {
                let value = processor.bind(binding, root, &[])?;
                processor.globals.push((binding.name.clone(), value));
            }
        }

        Ok(processor)
    }

    /// Apply templates to the root and return the result nodes.
    pub fn run(&self) -> Result<Vec<Node>, XsltError> {
        let mut out = Output::default();
        self.apply_templates(&[Tree::ROOT], None, &[], &mut out)?;
        Ok(out.children)
    }

    fn context<'c>(&'c self, focus: Focus, scope: &'c Scope) -> Context<'c> {
        Context {
            tree: self.tree,
            node: focus.node,
            position: focus.position,
            size: focus.size,
            current: focus.node,
            scope,
            globals: &self.globals,
        }
    }

    fn apply_templates(
        &self,
        nodes: &[NodeId],
        mode: Option<&str>,
        params: &[(String, Value)],
        out: &mut Output,
    ) -> Result<(), XsltError> {
        let size = nodes.len();
        for (index, &node) in nodes.iter().enumerate() {
            let focus = Focus {
                node,
                position: index + 1,
                size,
            };
            match self.find_rule(node, mode)? {
                Some(template) => self.invoke(template, focus, params, out)?,
                None => self.built_in(focus, mode, out)?,
            }
        }
        Ok(())
    }

    /// Highest precedence, then highest priority, then last declared.
    fn find_rule(&self, node: NodeId, mode: Option<&str>) -> Result<Option<&'a Template>, XsltError> {
        let mut best: Option<((usize, f64, usize), &'a Template)> = None;
        for rule in &self.rules {
            if rule.template.mode.as_deref() != mode {
                continue;
            }
            for (pattern, priority) in &rule.template.patterns {
                let key = (rule.precedence, *priority, rule.order);
                let better = best
                    .as_ref()
                    .is_none_or(|(current, _)| key.partial_cmp(current) == Some(Ordering::Greater));
                if better && pattern.matches(self.tree, node, &self.globals)? {
                    best = Some((key, rule.template));
                }
            }
        }
        Ok(best.map(|(_, template)| template))
    }

    fn built_in(&self, focus: Focus, mode: Option<&str>, out: &mut Output) -> Result<(), XsltError> {
        match self.tree.kind(focus.node) {
            NodeKind::Root | NodeKind::Element { .. } => {
                self.apply_templates(self.tree.children(focus.node), mode, &[], out)
            }
            NodeKind::Text(text) => {
                out.push_text(text);
                Ok(())
            }
            NodeKind::Attribute { value, .. } => {
                out.push_text(value);
                Ok(())
            }
            NodeKind::Comment(_) | NodeKind::ProcessingInstruction { .. } => Ok(()),
        }
    }

    fn invoke(
        &self,
        template: &Template,
        focus: Focus,
        params: &[(String, Value)],
        out: &mut Output,
    ) -> Result<(), XsltError> {
        let depth = self.depth.get();
        if depth >= MAX_DEPTH {
            return Err(XsltError::Runtime(format!(
                "template recursion deeper than {MAX_DEPTH}"
            )));
        }
        self.depth.set(depth + 1);

        let mut scope = Vec::with_capacity(template.params.len());
        let result = (|| {
            for param in &template.params {
                let value = match params.iter().rev().find(|(name, _)| *name == param.name) {
                    Some((_, value)) => value.clone(),
                    None => self.bind(param, focus, &scope)?,
                };
                scope.push((param.name.clone(), value));
            }
            self.execute(&template.body, focus, &mut scope, out)
        })();

        self.depth.set(depth);
        result
    }

    fn bind(&self, binding: &Binding, focus: Focus, scope: &Scope) -> Result<Value, XsltError> {
        match &binding.value {
            BindingValue::Select(expr) => self.context(focus, scope).evaluate(expr),
            BindingValue::Empty => Ok(Value::String(String::new())),
            BindingValue::Content(body) => {
                let mut fragment = Output::default();
                let mut inner = scope.to_vec();
                self.execute(body, focus, &mut inner, &mut fragment)?;
                Ok(Value::Fragment(fragment.children))
            }
        }
    }

    fn bind_params(
        &self,
        params: &[Binding],
        focus: Focus,
        scope: &Scope,
    ) -> Result<Vec<(String, Value)>, XsltError> {
        params
            .iter()
            .map(|param| Ok((param.name.clone(), self.bind(param, focus, scope)?)))
            .collect()
    }

    fn avt(&self, avt: &Avt, focus: Focus, scope: &Scope) -> Result<String, XsltError> {
        let mut out = String::new();
        for part in avt {
            match part {
                AvtPart::Literal(text) => out.push_str(text),
                AvtPart::Expr(expr) => {
                    out.push_str(&self.context(focus, scope).evaluate_string(expr)?)
                }
            }
        }
        Ok(out)
    }

    fn sort(
        &self,
        nodes: Vec<NodeId>,
        sorts: &[Sort],
        scope: &Scope,
    ) -> Result<Vec<NodeId>, XsltError> {
        if sorts.is_empty() {
            return Ok(nodes);
        }

        let size = nodes.len();
        let mut keyed = Vec::with_capacity(size);
        for (index, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: index + 1,
                size,
            };
            let keys = sorts
                .iter()
                .map(|sort| self.context(focus, scope).evaluate_string(&sort.select))
                .collect::<Result<Vec<_>, _>>()?;
            keyed.push((node, keys));
        }

        keyed.sort_by(|(_, a), (_, b)| {
            for (sort, (a, b)) in sorts.iter().zip(a.iter().zip(b)) {
                let ordering = if sort.numeric {
                    compare_numbers(string_to_number(a), string_to_number(b))
                } else {
                    a.cmp(b)
                };
                let ordering = if sort.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        Ok(keyed.into_iter().map(|(node, _)| node).collect())
    }

    fn execute(
        &self,
        body: &[Instruction],
        focus: Focus,
        scope: &mut Vec<(String, Value)>,
        out: &mut Output,
    ) -> Result<(), XsltError> {
        let mark = scope.len();
        for instruction in body {
            self.instruction(instruction, focus, scope, out)?;
        }
        scope.truncate(mark);
        Ok(())
    }

    fn instruction(
        &self,
        instruction: &Instruction,
        focus: Focus,
        scope: &mut Vec<(String, Value)>,
        out: &mut Output,
    ) -> Result<(), XsltError> {
        match instruction {
            Instruction::Text(text) => out.push_text(text),
            Instruction::LiteralElement {
                name,
                attributes,
                body,
            } => {
                let mut inner = Output::default();
                for (key, value) in attributes {
                    let value = self.avt(value, focus, scope)?;
                    inner.set_attribute(key.clone(), value);
                }
                self.execute(body, focus, scope, &mut inner)?;
                out.push(element(name.clone(), inner));
            }
            Instruction::ApplyTemplates {
                select,
                mode,
                params,
                sorts,
            } => {
                let nodes = match select {
                    Some(expr) => self.context(focus, scope).evaluate_nodes(expr)?,
                    None => self.tree.children(focus.node).to_vec(),
                };
                let nodes = self.sort(nodes, sorts, scope)?;
                let params = self.bind_params(params, focus, scope)?;
                self.apply_templates(&nodes, mode.as_deref(), &params, out)?;
            }
            Instruction::CallTemplate { name, params } => {
                let template = self.named.get(name.as_str()).ok_or_else(|| {
                    XsltError::Runtime(format!("no template named '{name}'"))
                })?;
                let params = self.bind_params(params, focus, scope)?;
                self.invoke(template, focus, &params, out)?;
            }
            Instruction::ValueOf(expr) => {
                let text = self.context(focus, scope).evaluate_string(expr)?;
                out.push_text(&text);
            }
            Instruction::Element { name, body } => {
                let name = self.avt(name, focus, scope)?;
                let mut inner = Output::default();
                self.execute(body, focus, scope, &mut inner)?;
                out.push(element(name, inner));
            }
            Instruction::Attribute { name, body } => {
                let name = self.avt(name, focus, scope)?;
                let mut inner = Output::default();
                self.execute(body, focus, scope, &mut inner)?;
                out.set_attribute(name, inner.text());
            }
            Instruction::Copy(body) => self.copy(focus, body, scope, out)?,
            Instruction::CopyOf(expr) => {
                match self.context(focus, scope).evaluate(expr)? {
                    Value::Nodes(nodes) => {
                        for node in nodes {
                            self.copy_of(node, out);
                        }
                    }
                    Value::Fragment(nodes) => {
                        for node in nodes {
                            out.push(node);
                        }
                    }
                    other => out.push_text(&other.to_string_value(self.tree)),
                }
            }
            Instruction::ForEach { select, sorts, body } => {
                let nodes = self.context(focus, scope).evaluate_nodes(select)?;
                let nodes = self.sort(nodes, sorts, scope)?;
                let size = nodes.len();
                for (index, node) in nodes.into_iter().enumerate() {
                    let inner = Focus {
                        node,
                        position: index + 1,
                        size,
                    };
                    self.execute(body, inner, scope, out)?;
                }
            }
            Instruction::If { test, body } => {
                if self.context(focus, scope).evaluate(test)?.to_boolean() {
                    self.execute(body, focus, scope, out)?;
                }
            }
            Instruction::Choose {
                branches,
                otherwise,
            } => {
                let mut chosen = otherwise;
                for (test, body) in branches {
                    if self.context(focus, scope).evaluate(test)?.to_boolean() {
                        chosen = body;
                        break;
                    }
                }
                self.execute(chosen, focus, scope, out)?;
            }
            Instruction::Variable(binding) => {
                let value = self.bind(binding, focus, scope)?;
                scope.push((binding.name.clone(), value));
            }
            Instruction::Comment(body) => {
                let mut inner = Output::default();
                self.execute(body, focus, scope, &mut inner)?;
                out.push(Node::Comment(inner.text()));
            }
            Instruction::Message { body, terminate } => {
                let mut inner = Output::default();
                self.execute(body, focus, scope, &mut inner)?;
                let message = inner.text();
                if *terminate {
                    warn!(%message, "xsl:message terminated the transform");
                    return Err(XsltError::Terminated(message));
                }
                info!(%message, "xsl:message");
            }
        }
        Ok(())
    }

    /// `xsl:copy`: shallow copy of the context node.
    fn copy(
        &self,
        focus: Focus,
        body: &[Instruction],
        scope: &mut Vec<(String, Value)>,
        out: &mut Output,
    ) -> Result<(), XsltError> {
        match self.tree.kind(focus.node) {
            NodeKind::Root => self.execute(body, focus, scope, out)?,
            NodeKind::Element { name } => {
                let mut inner = Output::default();
                self.execute(body, focus, scope, &mut inner)?;
                out.push(element(name.clone(), inner));
            }
            NodeKind::Attribute { name, value } => {
                out.set_attribute(name.clone(), value.clone());
            }
            NodeKind::Text(text) => out.push_text(text),
            NodeKind::Comment(text) => out.push(Node::Comment(text.clone())),
            NodeKind::ProcessingInstruction { target, data } => {
                out.push(Node::ProcessingInstruction(ProcessingInstruction {
                    target: target.clone(),
                    data: data.clone(),
                }));
            }
        }
        Ok(())
    }

    /// `xsl:copy-of` of one node: deep copy.
    fn copy_of(&self, node: NodeId, out: &mut Output) {
        match self.tree.kind(node) {
            NodeKind::Root => {
                for &child in self.tree.children(node) {
                    self.copy_of(child, out);
                }
            }
            NodeKind::Attribute { name, value } => {
                out.set_attribute(name.clone(), value.clone());
            }
            _ => {
                if let Some(copy) = self.tree.to_node(node) {
                    out.push(copy);
                }
            }
        }
    }
}

fn element(name: String, content: Output) -> Node {
    Node::Element(Element {
        name,
        attributes: content.attributes,
        children: content.children,
    })
}

/// Number sort order: NaN first, then ascending.
fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}
