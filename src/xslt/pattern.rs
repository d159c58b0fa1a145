//! Template match patterns.
//!
//! A pattern is parsed with the XPath parser and then restricted to the
//! pattern subset: unions of location paths using only the child and
//! attribute axes, joined by `/` or `//`. Matching walks the steps right to
//! left, up the ancestor chain of the candidate node.

use super::XsltError;
use super::eval::{Context, Scope, node_test};
use super::tree::{NodeId, NodeKind, Tree};
use super::xpath::{Axis, Expr, LocationPath, NodeTest, Step, parse_expr};

/// One alternative of a (possibly `|`-separated) pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    /// Starts with `/`: the first step must be a child of the root
    anchored: bool,
    steps: Vec<PatternStep>,
}

#[derive(Debug, Clone)]
struct PatternStep {
    attribute: bool,
    test: NodeTest,
    predicates: Vec<Expr>,
    /// Joined to the previous step by `//` instead of `/`
    descendant: bool,
}

/// Parse a `match` attribute into its alternatives.
pub fn parse_pattern(source: &str) -> Result<Vec<PathPattern>, XsltError> {
    let invalid = |message: &str| XsltError::Compile(format!("invalid pattern '{source}': {message}"));

    let mut alternatives = Vec::new();
    let mut pending = vec![parse_expr(source)?];
    while let Some(expr) = pending.pop() {
        match expr {
            Expr::Union(left, right) => {
                pending.push(*right);
                pending.push(*left);
            }
            Expr::Path(path) => alternatives.push(PathPattern::from_path(path).map_err(invalid)?),
            _ => return Err(invalid("only location paths are allowed")),
        }
    }
    Ok(alternatives)
}

impl PathPattern {
    fn from_path(path: LocationPath) -> Result<Self, &'static str> {
        let mut steps = Vec::new();
        let mut descendant = false;
        for Step {
            axis,
            test,
            predicates,
        } in path.steps
        {
            match axis {
                Axis::DescendantOrSelf if test == NodeTest::Node && predicates.is_empty() => {
                    descendant = true;
                    continue;
                }
                Axis::Child | Axis::Attribute => steps.push(PatternStep {
                    attribute: axis == Axis::Attribute,
                    test,
                    predicates,
                    descendant,
                }),
                _ => return Err("only child and attribute axes are allowed"),
            }
            descendant = false;
        }
        if descendant {
            return Err("pattern cannot end with '//'");
        }

        // A leading `//` matches anywhere, same as a relative pattern
        let anchored = path.absolute && steps.first().is_some_and(|s| !s.descendant);
        Ok(Self { anchored, steps })
    }

    /// Priority used when the template has no `priority` attribute.
    pub fn default_priority(&self) -> f64 {
        match self.steps.as_slice() {
            [] => -0.5,
            [step] if step.predicates.is_empty() && !self.anchored => match step.test {
                NodeTest::Name(_) => 0.0,
                NodeTest::Prefix(_) => -0.25,
                _ => -0.5,
            },
            _ => 0.5,
        }
    }

    pub fn matches(&self, tree: &Tree, node: NodeId, scope: &Scope) -> Result<bool, XsltError> {
        if self.steps.is_empty() {
            return Ok(matches!(tree.kind(node), NodeKind::Root));
        }
        self.matches_from(tree, node, self.steps.len() - 1, scope)
    }

    fn matches_from(
        &self,
        tree: &Tree,
        node: NodeId,
        index: usize,
        scope: &Scope,
    ) -> Result<bool, XsltError> {
        let step = &self.steps[index];
        if !step_matches(tree, node, step, scope)? {
            return Ok(false);
        }

        let Some(parent) = tree.parent(node) else {
            return Ok(false);
        };

        if index == 0 {
            return Ok(!self.anchored || parent == Tree::ROOT);
        }

        if !step.descendant {
            return self.matches_from(tree, parent, index - 1, scope);
        }

        let mut ancestor = Some(parent);
        while let Some(candidate) = ancestor {
            if self.matches_from(tree, candidate, index - 1, scope)? {
                return Ok(true);
            }
            ancestor = tree.parent(candidate);
        }
        Ok(false)
    }
}

fn step_matches(
    tree: &Tree,
    node: NodeId,
    step: &PatternStep,
    scope: &Scope,
) -> Result<bool, XsltError> {
    let kind = tree.kind(node);
    if matches!(kind, NodeKind::Root) || tree.is_attribute(node) != step.attribute {
        return Ok(false);
    }
    let axis = if step.attribute {
        Axis::Attribute
    } else {
        Axis::Child
    };
    if !node_test(tree, node, &step.test, axis) {
        return Ok(false);
    }
    if step.predicates.is_empty() {
        return Ok(true);
    }

    // Predicates see the node's position among like siblings
    let Some(parent) = tree.parent(node) else {
        return Ok(false);
    };
    let siblings = if step.attribute {
        tree.attributes(parent)
    } else {
        tree.children(parent)
    };
    let mut candidates: Vec<NodeId> = siblings
        .iter()
        .copied()
        .filter(|&n| node_test(tree, n, &step.test, axis))
        .collect();

    let context = Context::new(tree, node, scope);
    for predicate in &step.predicates {
        candidates = context.filter(candidates, predicate)?;
    }
    Ok(candidates.contains(&node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    fn find(tree: &Tree, name: &str) -> Vec<NodeId> {
        let mut all = Vec::new();
        tree.descendants(Tree::ROOT, &mut all);
        let mut with_attrs = Vec::new();
        for n in all {
            with_attrs.push(n);
            with_attrs.extend_from_slice(tree.attributes(n));
        }
        with_attrs
            .into_iter()
            .filter(|&n| tree.name(n) == name)
            .collect()
    }

    fn matches(pattern: &str, tree: &Tree, node: NodeId) -> bool {
        parse_pattern(pattern)
            .unwrap()
            .iter()
            .any(|p| p.matches(tree, node, &[]).unwrap())
    }

    #[test]
    fn matches_paths_right_to_left() {
        let doc = parse(br#"<doc><sec><p k="1">a</p><p>b</p></sec><p>c</p></doc>"#).unwrap();
        let tree = Tree::from_document(&doc);
        let ps = find(&tree, "p");
        let attr = find(&tree, "k")[0];

        assert!(matches("p", &tree, ps[0]));
        assert!(matches("sec/p", &tree, ps[0]));
        assert!(!matches("sec/p", &tree, ps[2]));
        assert!(matches("doc//p", &tree, ps[1]));
        assert!(matches("/doc/p", &tree, ps[2]));
        assert!(!matches("/p", &tree, ps[2]));
        assert!(matches("//p", &tree, ps[2]));
        assert!(matches("p[2]", &tree, ps[1]));
        assert!(!matches("p[2]", &tree, ps[2]));
        assert!(matches("p[@k]", &tree, ps[0]));
        assert!(matches("@k", &tree, attr));
        assert!(matches("p/@*", &tree, attr));
        assert!(!matches("*", &tree, attr));
        assert!(matches("/", &tree, Tree::ROOT));
        assert!(!matches("node()", &tree, Tree::ROOT));
        assert!(matches("text() | comment()", &tree, tree.children(ps[0])[0]));
    }

    #[test]
    fn default_priorities() {
        let priority = |p: &str| parse_pattern(p).unwrap()[0].default_priority();
        assert_eq!(priority("p"), 0.0);
        assert_eq!(priority("@k"), 0.0);
        assert_eq!(priority("h:*"), -0.25);
        assert_eq!(priority("*"), -0.5);
        assert_eq!(priority("text()"), -0.5);
        assert_eq!(priority("/"), -0.5);
        assert_eq!(priority("sec/p"), 0.5);
        assert_eq!(priority("p[1]"), 0.5);
    }

    #[test]
    fn rejects_non_patterns() {
        assert!(parse_pattern("ancestor::p").is_err());
        assert!(parse_pattern("count(p)").is_err());
        assert!(parse_pattern("p//").is_err());
    }
}
