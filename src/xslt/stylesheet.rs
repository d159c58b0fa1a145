//! Compile a stylesheet document into templates and instructions.

use tracing::warn;

use crate::xml::{Document, Element, Node};

use super::XsltError;
use super::pattern::{PathPattern, parse_pattern};
use super::xpath::{Expr, parse_expr};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// A compiled stylesheet.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    pub templates: Vec<Template>,
    /// Top-level variables and params, in document order
    pub globals: Vec<Binding>,
}

#[derive(Debug, Clone)]
pub struct Template {
    /// Alternatives of the `match` pattern with their effective priorities
    pub patterns: Vec<(PathPattern, f64)>,
    pub name: Option<String>,
    pub mode: Option<String>,
    pub params: Vec<Binding>,
    pub body: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub value: BindingValue,
}

#[derive(Debug, Clone)]
pub enum BindingValue {
    Select(Expr),
    Content(Vec<Instruction>),
    Empty,
}

#[derive(Debug, Clone)]
pub struct Sort {
    pub select: Expr,
    pub descending: bool,
    pub numeric: bool,
}

/// Attribute value template: literal text with `{expr}` holes.
#[derive(Debug, Clone)]
pub enum AvtPart {
    Literal(String),
    Expr(Expr),
}

pub type Avt = Vec<AvtPart>;

#[derive(Debug, Clone)]
pub enum Instruction {
    Text(String),
    LiteralElement {
        name: String,
        attributes: Vec<(String, Avt)>,
        body: Vec<Instruction>,
    },
    ApplyTemplates {
        select: Option<Expr>,
        mode: Option<String>,
        params: Vec<Binding>,
        sorts: Vec<Sort>,
    },
    CallTemplate {
        name: String,
        params: Vec<Binding>,
    },
    ValueOf(Expr),
    Element {
        name: Avt,
        body: Vec<Instruction>,
    },
    Attribute {
        name: Avt,
        body: Vec<Instruction>,
    },
    Copy(Vec<Instruction>),
    CopyOf(Expr),
    ForEach {
        select: Expr,
        sorts: Vec<Sort>,
        body: Vec<Instruction>,
    },
    If {
        test: Expr,
        body: Vec<Instruction>,
    },
    Choose {
        branches: Vec<(Expr, Vec<Instruction>)>,
        otherwise: Vec<Instruction>,
    },
    Variable(Binding),
    Comment(Vec<Instruction>),
    Message {
        body: Vec<Instruction>,
        terminate: bool,
    },
}

/// In-scope namespace declarations while walking the stylesheet.
#[derive(Debug, Clone, Default)]
struct Namespaces {
    /// `(prefix, uri)`, empty prefix for the default namespace
    bindings: Vec<(String, String)>,
    /// Prefixes listed in `exclude-result-prefixes`
    excluded: Vec<String>,
}

impl Namespaces {
    fn enter(&self, element: &Element) -> Self {
        let mut scope = self.clone();
        for (key, value) in &element.attributes {
            if key == "xmlns" {
                scope.bindings.push((String::new(), value.clone()));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.bindings.push((prefix.to_string(), value.clone()));
            }
        }
        scope
    }

    fn uri(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Local name of `element` if it is in the XSLT namespace.
    fn xsl_name<'e>(&self, element: &'e Element) -> Option<&'e str> {
        let prefix = element.prefix().unwrap_or_default();
        (self.uri(prefix) == Some(XSLT_NAMESPACE)).then(|| element.local_name())
    }

    fn is_xsl_attribute(&self, key: &str) -> bool {
        key.split_once(':')
            .is_some_and(|(prefix, _)| prefix != "xmlns" && self.uri(prefix) == Some(XSLT_NAMESPACE))
    }

    /// Whether a namespace declaration should be copied to the result.
    fn emits_declaration(&self, prefix: &str, uri: &str) -> bool {
        uri != XSLT_NAMESPACE && !self.excluded.iter().any(|p| p == prefix)
    }

    /// Declarations in scope, innermost binding per prefix, as attributes.
    fn declarations(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        for (prefix, uri) in self.bindings.iter().rev() {
            let key = if prefix.is_empty() {
                "xmlns".to_string()
            } else {
                format!("xmlns:{prefix}")
            };
            if !out.iter().any(|(k, _)| *k == key) && self.emits_declaration(prefix, uri) {
                out.push((key, uri.clone()));
            }
        }
        out.reverse();
        out
    }
}

impl Stylesheet {
    /// Compile a parsed stylesheet document.
    pub fn compile(document: &Document) -> Result<Self, XsltError> {
        let root = document
            .root_element()
            .ok_or_else(|| XsltError::Compile("stylesheet has no root element".into()))?;
        let scope = Namespaces::default().enter(root);

        match scope.xsl_name(root) {
            Some("stylesheet" | "transform") => {
                let mut scope = scope;
                if let Some(prefixes) = root.attribute("exclude-result-prefixes") {
                    scope.excluded = prefixes
                        .split_whitespace()
                        .map(|p| if p == "#default" { "" } else { p }.to_string())
                        .collect();
                }
                Self::compile_top_level(root, &scope)
            }
            Some(other) => Err(XsltError::Compile(format!(
                "xsl:{other} cannot be the root of a stylesheet"
            ))),
            None if root.attributes.iter().any(|(k, _)| scope.is_xsl_attribute(k) && k.ends_with(":version")) => {
                // Literal result element used as the whole stylesheet
                let body = vec![compile_literal(root, &Namespaces::default(), true)?];
                Ok(Stylesheet {
                    templates: vec![Template {
                        patterns: vec![(parse_pattern("/")?.remove(0), 0.0)],
                        name: None,
                        mode: None,
                        params: Vec::new(),
                        body,
                    }],
                    globals: Vec::new(),
                })
            }
            None => Err(XsltError::Compile(format!(
                "<{}> is not an XSLT stylesheet",
                root.name
            ))),
        }
    }

    fn compile_top_level(root: &Element, scope: &Namespaces) -> Result<Self, XsltError> {
        let mut stylesheet = Stylesheet::default();

        for child in root.child_elements() {
            let scope = scope.enter(child);
            match scope.xsl_name(child) {
                Some("template") => stylesheet.templates.push(compile_template(child, &scope)?),
                Some("variable" | "param") => {
                    stylesheet.globals.push(compile_binding(child, &scope)?)
                }
                Some(name @ ("import" | "include")) => {
                    warn!(
                        href = child.attribute("href").unwrap_or_default(),
                        "xsl:{name} is not supported; ignored"
                    );
                }
                // output, strip-space, preserve-space, key, ... have no effect here
                Some(_) => {}
                // Top-level elements in other namespaces are ignored
                None => {}
            }
        }

        Ok(stylesheet)
    }
}

fn required<'e>(element: &'e Element, attribute: &str) -> Result<&'e str, XsltError> {
    element.attribute(attribute).ok_or_else(|| {
        XsltError::Compile(format!(
            "<{}> is missing the '{attribute}' attribute",
            element.name
        ))
    })
}

fn compile_template(element: &Element, scope: &Namespaces) -> Result<Template, XsltError> {
    let name = element.attribute("name").map(str::to_string);
    let explicit_priority = element
        .attribute("priority")
        .map(|p| {
            p.trim()
                .parse::<f64>()
                .map_err(|_| XsltError::Compile(format!("invalid priority '{p}'")))
        })
        .transpose()?;

    let patterns = match element.attribute("match") {
        Some(source) => parse_pattern(source)?
            .into_iter()
            .map(|pattern| {
                let priority = explicit_priority.unwrap_or_else(|| pattern.default_priority());
                (pattern, priority)
            })
            .collect(),
        None if name.is_some() => Vec::new(),
        None => {
            return Err(XsltError::Compile(
                "xsl:template needs a 'match' or 'name' attribute".into(),
            ));
        }
    };

    // Leading xsl:param children declare the template's parameters
    let mut params = Vec::new();
    let mut rest = Vec::new();
    for child in &element.children {
        let leading = rest
            .iter()
            .all(|n| matches!(n, Node::Text(t) if t.trim().is_empty()));
        match child {
            Node::Element(e) if leading && scope.enter(e).xsl_name(e) == Some("param") => {
                params.push(compile_binding(e, &scope.enter(e))?);
            }
            other => rest.push(other.clone()),
        }
    }

    Ok(Template {
        patterns,
        name,
        mode: element.attribute("mode").map(str::to_string),
        params,
        body: compile_body(&rest, scope)?,
    })
}

fn compile_binding(element: &Element, scope: &Namespaces) -> Result<Binding, XsltError> {
    let name = required(element, "name")?.to_string();
    let value = match element.attribute("select") {
        Some(select) => BindingValue::Select(parse_expr(select)?),
        None if element.children.is_empty() => BindingValue::Empty,
        None => BindingValue::Content(compile_body(&element.children, scope)?),
    };
    Ok(Binding { name, value })
}

fn compile_params(element: &Element, scope: &Namespaces) -> Result<Vec<Binding>, XsltError> {
    let mut params = Vec::new();
    for child in element.child_elements() {
        let inner = scope.enter(child);
        if inner.xsl_name(child) == Some("with-param") {
            params.push(compile_binding(child, &inner)?);
        }
    }
    Ok(params)
}

fn compile_sorts(element: &Element, scope: &Namespaces) -> Result<Vec<Sort>, XsltError> {
    let mut sorts = Vec::new();
    for child in element.child_elements() {
        if scope.enter(child).xsl_name(child) == Some("sort") {
            sorts.push(Sort {
                select: parse_expr(child.attribute("select").unwrap_or("."))?,
                descending: child.attribute("order") == Some("descending"),
                numeric: child.attribute("data-type") == Some("number"),
            });
        }
    }
    Ok(sorts)
}

/// Compile a sequence of stylesheet nodes. Whitespace-only text is dropped.
fn compile_body(nodes: &[Node], scope: &Namespaces) -> Result<Vec<Instruction>, XsltError> {
    let mut body = Vec::new();
    for node in nodes {
        match node {
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Text(text) => body.push(Instruction::Text(text.clone())),
            Node::Element(element) => {
                let inner = scope.enter(element);
                let instruction = match inner.xsl_name(element) {
                    Some(name) => compile_instruction(name, element, &inner)?,
                    None => Some(compile_literal(element, scope, true)?),
                };
                if let Some(instruction) = instruction {
                    body.push(instruction);
                }
            }
            Node::Comment(_) | Node::ProcessingInstruction(_) => {}
        }
    }
    Ok(body)
}

/// `Ok(None)` for elements that only decorate their parent (`sort`,
/// `with-param`, `fallback`); their parent compiles them.
fn compile_instruction(
    name: &str,
    element: &Element,
    scope: &Namespaces,
) -> Result<Option<Instruction>, XsltError> {
    let body = || compile_body(&element.children, scope);
    let select = || -> Result<Expr, XsltError> { parse_expr(required(element, "select")?) };

    let instruction = match name {
        "apply-templates" => Instruction::ApplyTemplates {
            select: element.attribute("select").map(parse_expr).transpose()?,
            mode: element.attribute("mode").map(str::to_string),
            params: compile_params(element, scope)?,
            sorts: compile_sorts(element, scope)?,
        },
        "call-template" => Instruction::CallTemplate {
            name: required(element, "name")?.to_string(),
            params: compile_params(element, scope)?,
        },
        "value-of" => Instruction::ValueOf(select()?),
        "text" => {
            let mut text = String::new();
            for child in &element.children {
                child.collect_text(&mut text);
            }
            Instruction::Text(text)
        }
        "element" => Instruction::Element {
            name: parse_avt(required(element, "name")?)?,
            body: body()?,
        },
        "attribute" => Instruction::Attribute {
            name: parse_avt(required(element, "name")?)?,
            body: body()?,
        },
        "copy" => Instruction::Copy(body()?),
        "copy-of" => Instruction::CopyOf(select()?),
        "for-each" => Instruction::ForEach {
            select: select()?,
            sorts: compile_sorts(element, scope)?,
            body: body()?,
        },
        "if" => Instruction::If {
            test: parse_expr(required(element, "test")?)?,
            body: body()?,
        },
        "choose" => {
            let mut branches = Vec::new();
            let mut otherwise = Vec::new();
            for child in element.child_elements() {
                let inner = scope.enter(child);
                match inner.xsl_name(child) {
                    Some("when") => branches.push((
                        parse_expr(required(child, "test")?)?,
                        compile_body(&child.children, &inner)?,
                    )),
                    Some("otherwise") => otherwise = compile_body(&child.children, &inner)?,
                    _ => {
                        return Err(XsltError::Compile(format!(
                            "<{}> is not allowed in xsl:choose",
                            child.name
                        )));
                    }
                }
            }
            Instruction::Choose {
                branches,
                otherwise,
            }
        }
        "variable" | "param" => Instruction::Variable(compile_binding(element, scope)?),
        "comment" => Instruction::Comment(body()?),
        "message" => Instruction::Message {
            body: body()?,
            terminate: element.attribute("terminate") == Some("yes"),
        },
        "sort" | "with-param" | "fallback" => return Ok(None),
        other => {
            return Err(XsltError::Compile(format!(
                "unsupported instruction xsl:{other}"
            )));
        }
    };
    Ok(Some(instruction))
}

/// A literal result element. The outermost one also carries the namespace
/// declarations in scope in the stylesheet.
fn compile_literal(
    element: &Element,
    outer: &Namespaces,
    outermost: bool,
) -> Result<Instruction, XsltError> {
    let scope = outer.enter(element);
    let mut attributes: Vec<(String, Avt)> = Vec::new();

    let declarations = if outermost {
        scope.declarations()
    } else {
        element
            .attributes
            .iter()
            .filter_map(|(key, uri)| {
                let prefix = match key.as_str() {
                    "xmlns" => "",
                    other => other.strip_prefix("xmlns:")?,
                };
                scope
                    .emits_declaration(prefix, uri)
                    .then(|| (key.clone(), uri.clone()))
            })
            .collect()
    };
    for (key, uri) in declarations {
        attributes.push((key, vec![AvtPart::Literal(uri)]));
    }

    for (key, value) in &element.attributes {
        if key == "xmlns" || key.starts_with("xmlns:") || scope.is_xsl_attribute(key) {
            continue;
        }
        attributes.push((key.clone(), parse_avt(value)?));
    }

    let mut body = Vec::new();
    for child in &element.children {
        match child {
            Node::Element(e) if scope.enter(e).xsl_name(e).is_none() => {
                body.push(compile_literal(e, &scope, false)?);
            }
            other => body.extend(compile_body(std::slice::from_ref(other), &scope)?),
        }
    }

    Ok(Instruction::LiteralElement {
        name: element.name.clone(),
        attributes,
        body,
    })
}

/// Split an attribute value template into literal and expression parts.
pub fn parse_avt(source: &str) -> Result<Avt, XsltError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        match c {
            '{' if chars.peek().map(|&(_, n)| n) == Some('{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek().map(|&(_, n)| n) == Some('}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let start = index + 1;
                let mut quote = None;
                let mut end = None;
                for (i, c) in chars.by_ref() {
                    match (quote, c) {
                        (Some(q), c) if c == q => quote = None,
                        (Some(_), _) => {}
                        (None, '"' | '\'') => quote = Some(c),
                        (None, '}') => {
                            end = Some(i);
                            break;
                        }
                        _ => {}
                    }
                }
                let end = end.ok_or_else(|| {
                    XsltError::Compile(format!("unterminated '{{' in attribute value '{source}'"))
                })?;
                if !literal.is_empty() {
                    parts.push(AvtPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(AvtPart::Expr(parse_expr(&source[start..end])?));
            }
            '}' => {
                return Err(XsltError::Compile(format!(
                    "unescaped '}}' in attribute value '{source}'"
                )));
            }
            c => literal.push(c),
        }
    }

    if !literal.is_empty() {
        parts.push(AvtPart::Literal(literal));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    fn compile(source: &str) -> Result<Stylesheet, XsltError> {
        Stylesheet::compile(&parse(source.as_bytes()).unwrap())
    }

    #[test]
    fn compiles_templates_and_globals() {
        let sheet = compile(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:output method="xml"/>
  <xsl:variable name="upper" select="'ABC'"/>
  <xsl:template match="a | b" priority="3"><x/></xsl:template>
  <xsl:template name="named">
    <xsl:param name="p" select="1"/>
    <xsl:value-of select="$p"/>
  </xsl:template>
</xsl:stylesheet>"#,
        )
        .unwrap();

        assert_eq!(sheet.globals.len(), 1);
        assert_eq!(sheet.templates.len(), 2);
        assert_eq!(sheet.templates[0].patterns.len(), 2);
        assert!(sheet.templates[0].patterns.iter().all(|(_, p)| *p == 3.0));
        assert_eq!(sheet.templates[1].name.as_deref(), Some("named"));
        assert_eq!(sheet.templates[1].params.len(), 1);
        assert_eq!(sheet.templates[1].body.len(), 1);
    }

    #[test]
    fn any_prefix_bound_to_the_namespace_works() {
        let sheet = compile(
            r#"<t:transform version="1.0" xmlns:t="http://www.w3.org/1999/XSL/Transform">
  <t:template match="/"><t:text>ok</t:text></t:template>
</t:transform>"#,
        )
        .unwrap();
        assert!(matches!(sheet.templates[0].body[0], Instruction::Text(ref t) if t == "ok"));
    }

    #[test]
    fn literal_result_elements_drop_xsl_namespace() {
        let sheet = compile(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:h="urn:h">
  <xsl:template match="/"><h:p class="{name()}-x"/></xsl:template>
</xsl:stylesheet>"#,
        )
        .unwrap();
        match &sheet.templates[0].body[0] {
            Instruction::LiteralElement { name, attributes, .. } => {
                assert_eq!(name, "h:p");
                let keys: Vec<_> = attributes.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, ["xmlns:h", "class"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn simplified_stylesheet() {
        let sheet = compile(
            r#"<html xsl:version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:value-of select="/doc"/></html>"#,
        )
        .unwrap();
        assert_eq!(sheet.templates.len(), 1);
        assert!(matches!(sheet.templates[0].body[0], Instruction::LiteralElement { ref name, .. } if name == "html"));
    }

    #[test]
    fn compile_errors() {
        assert!(compile("<root/>").is_err());
        assert!(compile(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:template/></xsl:stylesheet>"#
        )
        .is_err());
        assert!(compile(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:template match="/"><xsl:bogus/></xsl:template></xsl:stylesheet>"#
        )
        .is_err());
        assert!(compile(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:template match="/"><xsl:value-of/></xsl:template></xsl:stylesheet>"#
        )
        .is_err());
    }

    #[test]
    fn attribute_value_templates() {
        let avt = parse_avt("a{{b}}{concat('}', name())}c").unwrap();
        assert_eq!(avt.len(), 3);
        assert!(matches!(avt[0], AvtPart::Literal(ref s) if s == "a{b}"));
        assert!(matches!(avt[1], AvtPart::Expr(Expr::Function(ref f, _)) if f == "concat"));
        assert!(matches!(avt[2], AvtPart::Literal(ref s) if s == "c"));

        assert!(parse_avt("{open").is_err());
        assert!(parse_avt("close}").is_err());
        assert!(parse_avt("").unwrap().is_empty());
    }
}
