//! XPath evaluation against a [`Tree`].

use std::cmp::Ordering;

use crate::xml::{Node, local_name};

use super::XsltError;
use super::tree::{NodeId, NodeKind, Tree};
use super::xpath::{Axis, BinaryOp, Expr, NodeTest, Step};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Sorted in document order, no duplicates
    Nodes(Vec<NodeId>),
    String(String),
    Number(f64),
    Boolean(bool),
    /// Result tree fragment built by a variable body
    Fragment(Vec<Node>),
}

impl Value {
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
            Value::Fragment(_) => true,
        }
    }

    pub fn to_number(&self, tree: &Tree) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            other => string_to_number(&other.to_string_value(tree)),
        }
    }

    pub fn to_string_value(&self, tree: &Tree) -> String {
        match self {
            Value::Nodes(nodes) => nodes
                .first()
                .map(|&n| tree.string_value(n))
                .unwrap_or_default(),
            Value::String(s) => s.clone(),
            Value::Number(n) => number_to_string(*n),
            Value::Boolean(b) => b.to_string(),
            Value::Fragment(nodes) => {
                let mut out = String::new();
                for node in nodes {
                    node.collect_text(&mut out);
                }
                out
            }
        }
    }

    pub fn into_nodes(self) -> Result<Vec<NodeId>, XsltError> {
        match self {
            Value::Nodes(nodes) => Ok(nodes),
            other => Err(XsltError::Runtime(format!(
                "expected a node-set, found {}",
                other.type_name()
            ))),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Nodes(_) => "node-set",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Fragment(_) => "result tree fragment",
        }
    }
}

/// XPath `string()` of a number.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// XPath `number()` of a string: optional minus, digits and one dot, else NaN.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1
        && digits != ".";
    if valid {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// Variables visible to an expression, innermost binding last.
pub type Scope = [(String, Value)];

/// Evaluation context of one expression.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub tree: &'a Tree,
    pub node: NodeId,
    pub position: usize,
    pub size: usize,
    /// Node being processed by the enclosing template or for-each
    pub current: NodeId,
    pub scope: &'a Scope,
    /// Top-level bindings, consulted after `scope`
    pub globals: &'a Scope,
}

impl<'a> Context<'a> {
    pub fn new(tree: &'a Tree, node: NodeId, scope: &'a Scope) -> Self {
        Self {
            tree,
            node,
            position: 1,
            size: 1,
            current: node,
            scope,
            globals: &[],
        }
    }

    fn at(&self, node: NodeId, position: usize, size: usize) -> Self {
        Self {
            node,
            position,
            size,
            ..*self
        }
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Value, XsltError> {
        match expr {
            Expr::Literal(s) => Ok(Value::String(s.clone())),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Variable(name) => self
                .scope
                .iter()
                .rev()
                .chain(self.globals.iter().rev())
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| XsltError::Runtime(format!("undefined variable ${name}"))),
            Expr::Function(name, args) => self.call(name, args),
            Expr::Negate(inner) => Ok(Value::Number(-self.evaluate(inner)?.to_number(self.tree))),
            Expr::Binary(left, op, right) => self.binary(left, *op, right),
            Expr::Union(left, right) => {
                let mut nodes = self.evaluate(left)?.into_nodes()?;
                nodes.extend(self.evaluate(right)?.into_nodes()?);
                nodes.sort_unstable();
                nodes.dedup();
                Ok(Value::Nodes(nodes))
            }
            Expr::Path(path) => {
                let start = if path.absolute { Tree::ROOT } else { self.node };
                Ok(Value::Nodes(self.steps(vec![start], &path.steps)?))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let value = self.evaluate(primary)?;
                if predicates.is_empty() && steps.is_empty() {
                    return Ok(value);
                }
                let mut nodes = value.into_nodes()?;
                for predicate in predicates {
                    nodes = self.filter(nodes, predicate)?;
                }
                Ok(Value::Nodes(self.steps(nodes, steps)?))
            }
        }
    }

    pub fn evaluate_string(&self, expr: &Expr) -> Result<String, XsltError> {
        Ok(self.evaluate(expr)?.to_string_value(self.tree))
    }

    pub fn evaluate_nodes(&self, expr: &Expr) -> Result<Vec<NodeId>, XsltError> {
        self.evaluate(expr)?.into_nodes()
    }

    fn binary(&self, left: &Expr, op: BinaryOp, right: &Expr) -> Result<Value, XsltError> {
        match op {
            BinaryOp::Or => Ok(Value::Boolean(
                self.evaluate(left)?.to_boolean() || self.evaluate(right)?.to_boolean(),
            )),
            BinaryOp::And => Ok(Value::Boolean(
                self.evaluate(left)?.to_boolean() && self.evaluate(right)?.to_boolean(),
            )),
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(Value::Boolean(compare(self.tree, &left, op, &right)))
            }
            _ => {
                let l = self.evaluate(left)?.to_number(self.tree);
                let r = self.evaluate(right)?.to_number(self.tree);
                Ok(Value::Number(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    _ => l % r,
                }))
            }
        }
    }

    /// Apply location steps to every node of `input`.
    fn steps(&self, mut nodes: Vec<NodeId>, steps: &[Step]) -> Result<Vec<NodeId>, XsltError> {
        for step in steps {
            let mut next = Vec::new();
            for &node in &nodes {
                let mut selected: Vec<NodeId> = axis_nodes(self.tree, node, step.axis)
                    .into_iter()
                    .filter(|&n| node_test(self.tree, n, &step.test, step.axis))
                    .collect();
                for predicate in &step.predicates {
                    selected = self.filter(selected, predicate)?;
                }
                next.extend(selected);
            }
            next.sort_unstable();
            next.dedup();
            nodes = next;
        }
        Ok(nodes)
    }

    /// Keep the nodes for which `predicate` holds, positions in `nodes` order.
    pub fn filter(&self, nodes: Vec<NodeId>, predicate: &Expr) -> Result<Vec<NodeId>, XsltError> {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (index, node) in nodes.into_iter().enumerate() {
            let context = self.at(node, index + 1, size);
            let keep = match context.evaluate(predicate)? {
                Value::Number(n) => n == (index + 1) as f64,
                other => other.to_boolean(),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn call(&self, name: &str, args: &[Expr]) -> Result<Value, XsltError> {
        let arity = |min: usize, max: usize| {
            if args.len() < min || args.len() > max {
                Err(XsltError::Runtime(format!(
                    "{name}() takes {min}..={max} arguments, got {}",
                    args.len()
                )))
            } else {
                Ok(())
            }
        };
        let string_arg = |i: usize| -> Result<String, XsltError> {
            match args.get(i) {
                Some(arg) => self.evaluate_string(arg),
                None => Ok(self.tree.string_value(self.node)),
            }
        };
        let number_arg = |i: usize| -> Result<f64, XsltError> {
            Ok(self.evaluate(&args[i])?.to_number(self.tree))
        };
        // Optional node-set argument defaulting to the context node
        let first_node = |i: usize| -> Result<Option<NodeId>, XsltError> {
            match args.get(i) {
                Some(arg) => Ok(self.evaluate_nodes(arg)?.first().copied()),
                None => Ok(Some(self.node)),
            }
        };

        let value = match name {
            "last" => {
                arity(0, 0)?;
                Value::Number(self.size as f64)
            }
            "position" => {
                arity(0, 0)?;
                Value::Number(self.position as f64)
            }
            "count" => {
                arity(1, 1)?;
                Value::Number(self.evaluate_nodes(&args[0])?.len() as f64)
            }
            "current" => {
                arity(0, 0)?;
                Value::Nodes(vec![self.current])
            }
            "generate-id" => {
                arity(0, 1)?;
                Value::String(first_node(0)?.map(|n| format!("id{n}")).unwrap_or_default())
            }
            "name" | "local-name" => {
                arity(0, 1)?;
                let qname = first_node(0)?.map(|n| self.tree.name(n)).unwrap_or_default();
                let result = if name == "name" { qname } else { local_name(qname) };
                Value::String(result.to_string())
            }
            "string" => {
                arity(0, 1)?;
                Value::String(string_arg(0)?)
            }
            "concat" => {
                if args.len() < 2 {
                    return Err(XsltError::Runtime("concat() needs two arguments".into()));
                }
                let mut out = String::new();
                for arg in args {
                    out.push_str(&self.evaluate_string(arg)?);
                }
                Value::String(out)
            }
            "contains" => {
                arity(2, 2)?;
                Value::Boolean(string_arg(0)?.contains(&string_arg(1)?))
            }
            "starts-with" => {
                arity(2, 2)?;
                Value::Boolean(string_arg(0)?.starts_with(&string_arg(1)?))
            }
            "substring-before" => {
                arity(2, 2)?;
                let (s, pattern) = (string_arg(0)?, string_arg(1)?);
                Value::String(
                    s.find(&pattern)
                        .map(|i| s[..i].to_string())
                        .unwrap_or_default(),
                )
            }
            "substring-after" => {
                arity(2, 2)?;
                let (s, pattern) = (string_arg(0)?, string_arg(1)?);
                Value::String(
                    s.find(&pattern)
                        .map(|i| s[i + pattern.len()..].to_string())
                        .unwrap_or_default(),
                )
            }
            "substring" => {
                arity(2, 3)?;
                let s = string_arg(0)?;
                let start = round(number_arg(1)?);
                let end = match args.get(2) {
                    Some(_) => start + round(number_arg(2)?),
                    None => f64::INFINITY,
                };
                Value::String(
                    s.chars()
                        .enumerate()
                        .filter(|&(i, _)| {
                            let p = (i + 1) as f64;
                            p >= start && p < end
                        })
                        .map(|(_, c)| c)
                        .collect(),
                )
            }
            "string-length" => {
                arity(0, 1)?;
                Value::Number(string_arg(0)?.chars().count() as f64)
            }
            "normalize-space" => {
                arity(0, 1)?;
                Value::String(
                    string_arg(0)?
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" "),
                )
            }
            "translate" => {
                arity(3, 3)?;
                let s = string_arg(0)?;
                let from: Vec<char> = string_arg(1)?.chars().collect();
                let to: Vec<char> = string_arg(2)?.chars().collect();
                Value::String(
                    s.chars()
                        .filter_map(|c| match from.iter().position(|&f| f == c) {
                            Some(i) => to.get(i).copied(),
                            None => Some(c),
                        })
                        .collect(),
                )
            }
            "boolean" => {
                arity(1, 1)?;
                Value::Boolean(self.evaluate(&args[0])?.to_boolean())
            }
            "not" => {
                arity(1, 1)?;
                Value::Boolean(!self.evaluate(&args[0])?.to_boolean())
            }
            "true" => {
                arity(0, 0)?;
                Value::Boolean(true)
            }
            "false" => {
                arity(0, 0)?;
                Value::Boolean(false)
            }
            "number" => {
                arity(0, 1)?;
                match args.first() {
                    Some(_) => Value::Number(number_arg(0)?),
                    None => Value::Number(string_to_number(&self.tree.string_value(self.node))),
                }
            }
            "sum" => {
                arity(1, 1)?;
                let nodes = self.evaluate_nodes(&args[0])?;
                Value::Number(
                    nodes
                        .iter()
                        .map(|&n| string_to_number(&self.tree.string_value(n)))
                        .sum(),
                )
            }
            "floor" => {
                arity(1, 1)?;
                Value::Number(number_arg(0)?.floor())
            }
            "ceiling" => {
                arity(1, 1)?;
                Value::Number(number_arg(0)?.ceil())
            }
            "round" => {
                arity(1, 1)?;
                Value::Number(round(number_arg(0)?))
            }
            other => {
                return Err(XsltError::Runtime(format!("unsupported function {other}()")));
            }
        };
        Ok(value)
    }
}

/// XPath `round()`: halves round towards positive infinity.
fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

/// Nodes on `axis` from `node`, in axis order (reverse axes nearest first).
fn axis_nodes(tree: &Tree, node: NodeId, axis: Axis) -> Vec<NodeId> {
    let mut out = Vec::new();
    match axis {
        Axis::Child => out.extend_from_slice(tree.children(node)),
        Axis::Attribute => out.extend_from_slice(tree.attributes(node)),
        Axis::SelfAxis => out.push(node),
        Axis::Descendant => tree.descendants(node, &mut out),
        Axis::DescendantOrSelf => {
            out.push(node);
            tree.descendants(node, &mut out);
        }
        Axis::Parent => out.extend(tree.parent(node)),
        Axis::Ancestor | Axis::AncestorOrSelf => {
            if axis == Axis::AncestorOrSelf {
                out.push(node);
            }
            let mut current = tree.parent(node);
            while let Some(parent) = current {
                out.push(parent);
                current = tree.parent(parent);
            }
        }
        Axis::FollowingSibling | Axis::PrecedingSibling => {
            let siblings = tree.siblings(node);
            if let Some(index) = siblings.iter().position(|&s| s == node) {
                if axis == Axis::FollowingSibling {
                    out.extend_from_slice(&siblings[index + 1..]);
                } else {
                    out.extend(siblings[..index].iter().rev());
                }
            }
        }
    }
    out
}

/// Whether `node` passes `test` on `axis`. Name tests select the axis'
/// principal node type: attributes on the attribute axis, elements elsewhere.
pub fn node_test(tree: &Tree, node: NodeId, test: &NodeTest, axis: Axis) -> bool {
    let kind = tree.kind(node);
    let principal = match axis {
        Axis::Attribute => matches!(kind, NodeKind::Attribute { .. }),
        _ => matches!(kind, NodeKind::Element { .. }),
    };
    match test {
        NodeTest::Node => true,
        NodeTest::Any => principal,
        NodeTest::Name(name) => principal && tree.name(node) == name,
        NodeTest::Prefix(prefix) => {
            principal
                && tree
                    .name(node)
                    .split_once(':')
                    .is_some_and(|(p, _)| p == prefix)
        }
        NodeTest::Text => matches!(kind, NodeKind::Text(_)),
        NodeTest::Comment => matches!(kind, NodeKind::Comment(_)),
        NodeTest::ProcessingInstruction => {
            matches!(kind, NodeKind::ProcessingInstruction { .. })
        }
    }
}

/// XPath 1.0 comparison, including the existential node-set rules.
fn compare(tree: &Tree, left: &Value, op: BinaryOp, right: &Value) -> bool {
    match (left, right) {
        (Value::Nodes(l), Value::Nodes(r)) => {
            let right_strings: Vec<String> = r.iter().map(|&n| tree.string_value(n)).collect();
            l.iter().any(|&a| {
                let a = tree.string_value(a);
                right_strings
                    .iter()
                    .any(|b| compare_atoms(tree, &Value::String(a.clone()), op, &Value::String(b.clone())))
            })
        }
        (Value::Nodes(nodes), other) => nodes
            .iter()
            .any(|&n| compare_atoms(tree, &node_as(tree, n, other), op, other)),
        (other, Value::Nodes(nodes)) => nodes
            .iter()
            .any(|&n| compare_atoms(tree, other, op, &node_as(tree, n, other))),
        _ => compare_atoms(tree, left, op, right),
    }
}

/// A node converted to the type of the value it is compared with.
fn node_as(tree: &Tree, node: NodeId, other: &Value) -> Value {
    let s = tree.string_value(node);
    match other {
        Value::Number(_) => Value::Number(string_to_number(&s)),
        Value::Boolean(_) => Value::Boolean(true),
        _ => Value::String(s),
    }
}

fn compare_atoms(tree: &Tree, left: &Value, op: BinaryOp, right: &Value) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (left, right) {
                (Value::Boolean(_), _) | (_, Value::Boolean(_)) => {
                    left.to_boolean() == right.to_boolean()
                }
                (Value::Number(_), _) | (_, Value::Number(_)) => {
                    left.to_number(tree) == right.to_number(tree)
                }
                _ => left.to_string_value(tree) == right.to_string_value(tree),
            };
            equal == (op == BinaryOp::Eq)
        }
        _ => {
            let ordering = left.to_number(tree).partial_cmp(&right.to_number(tree));
            match (op, ordering) {
                (_, None) => false,
                (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
                (BinaryOp::Le, Some(o)) => o != Ordering::Greater,
                (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;
    use crate::xslt::xpath::parse_expr;

    const DOC: &str = r#"<library>
<book id="1" year="1999"><title>Alpha</title><price>10</price></book>
<book id="2" year="2005"><title>Beta</title><price>20.5</price></book>
<book id="3" year="2010"><title>Gamma</title><price>5</price></book>
</library>"#;

    fn eval(xpath: &str) -> (Tree, Value) {
        let tree = Tree::from_document(&parse(DOC.as_bytes()).unwrap());
        let expr = parse_expr(xpath).unwrap();
        let value = Context::new(&tree, Tree::ROOT, &[]).evaluate(&expr).unwrap();
        (tree, value)
    }

    fn string(xpath: &str) -> String {
        let (tree, value) = eval(xpath);
        value.to_string_value(&tree)
    }

    #[test]
    fn paths_and_predicates() {
        assert_eq!(string("/library/book[2]/title"), "Beta");
        assert_eq!(string("//book[@year > 2000][last()]/title"), "Gamma");
        assert_eq!(string("count(//title)"), "3");
        assert_eq!(string("//title[. = 'Gamma']/../@id"), "3");
        assert_eq!(string("//book[3]/preceding-sibling::book[1]/@id"), "2");
        assert_eq!(string("name(//price/ancestor::*[last()])"), "library");
        assert_eq!(string("count(//book/@* | //book/@id)"), "6");
    }

    #[test]
    fn functions() {
        assert_eq!(string("sum(//price)"), "35.5");
        assert_eq!(string("translate('hello', 'elo', 'ELO')"), "hELLO");
        assert_eq!(string("translate('abc', 'b', '')"), "ac");
        assert_eq!(string("substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(string("substring('12345', 0, 3)"), "12");
        assert_eq!(string("substring-after('a=b=c', '=')"), "b=c");
        assert_eq!(string("normalize-space('  a   b ')"), "a b");
        assert_eq!(string("concat(1 div 0, ' ', 0 div 0, ' ', -3 mod 2)"), "Infinity NaN -1");
        assert_eq!(string("round(-2.5)"), "-2");
        assert_eq!(string("string-length('héllo')"), "5");
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("//price > 15").1, Value::Boolean(true));
        assert_eq!(eval("//price > 25").1, Value::Boolean(false));
        assert_eq!(eval("//title = 'Beta'").1, Value::Boolean(true));
        assert_eq!(eval("//title != 'Beta'").1, Value::Boolean(true));
        assert_eq!(eval("'10' = 10.0").1, Value::Boolean(true));
        assert_eq!(eval("not(//missing)").1, Value::Boolean(true));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.25), "0.25");
        assert!(string_to_number("abc").is_nan());
        assert!(string_to_number("1e3").is_nan());
        assert_eq!(string_to_number(" -4.5 "), -4.5);
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let tree = Tree::from_document(&parse(b"<a/>").unwrap());
        let expr = parse_expr("$nope").unwrap();
        assert!(Context::new(&tree, Tree::ROOT, &[]).evaluate(&expr).is_err());

        let scope = vec![("nope".to_string(), Value::Number(1.0))];
        let value = Context::new(&tree, Tree::ROOT, &scope).evaluate(&expr).unwrap();
        assert_eq!(value, Value::Number(1.0));
    }
}
