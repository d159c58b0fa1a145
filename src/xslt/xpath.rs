//! XPath 1.0 expression syntax: tokenizer, AST and recursive descent parser.

use super::XsltError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(String),
    Number(f64),
    Variable(String),
    Function(String, Vec<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Path(LocationPath),
    /// `primary[predicates]/steps`
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    SelfAxis,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "self" => Axis::SelfAxis,
            "attribute" => Axis::Attribute,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// Qualified name, compared literally
    Name(String),
    /// `prefix:*`
    Prefix(String),
    /// `*`
    Any,
    Text,
    Node,
    Comment,
    ProcessingInstruction,
}

impl Step {
    fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }

    /// `descendant-or-self::node()`, the expansion of `//`
    pub fn descendant_or_self() -> Self {
        Self::new(Axis::DescendantOrSelf, NodeTest::Node)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Number(f64),
    Name(String),
    Variable(String),
    Star,
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Pipe,
    Plus,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    DoubleColon,
    /// `*`, `and`, `or`, `div`, `mod` in operator position
    Operator(BinaryOp),
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    // A `*` or operator name is an operator when it follows something that
    // can end an operand.
    let operator_position = |tokens: &[Token]| match tokens.last() {
        None => false,
        Some(t) => !matches!(
            t,
            Token::At
                | Token::DoubleColon
                | Token::LParen
                | Token::LBracket
                | Token::Comma
                | Token::Slash
                | Token::DoubleSlash
                | Token::Pipe
                | Token::Plus
                | Token::Minus
                | Token::Eq
                | Token::Ne
                | Token::Lt
                | Token::Le
                | Token::Gt
                | Token::Ge
                | Token::Operator(_)
        ),
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or("unterminated string literal")?;
                let literal: String = chars[i + 1..i + 1 + end].iter().collect();
                i += end + 2;
                tokens.push(Token::Literal(literal));
                continue;
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse().map_err(|_| format!("bad number '{text}'"))?;
                tokens.push(Token::Number(number));
                continue;
            }
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse().map_err(|_| format!("bad number '{text}'"))?;
                tokens.push(Token::Number(number));
                continue;
            }
            '.' if next == Some('.') => {
                i += 2;
                Token::DotDot
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '/' if next == Some('/') => {
                i += 2;
                Token::DoubleSlash
            }
            '/' => {
                i += 1;
                Token::Slash
            }
            ':' if next == Some(':') => {
                i += 2;
                Token::DoubleColon
            }
            '!' if next == Some('=') => {
                i += 2;
                Token::Ne
            }
            '<' if next == Some('=') => {
                i += 2;
                Token::Le
            }
            '>' if next == Some('=') => {
                i += 2;
                Token::Ge
            }
            '*' => {
                i += 1;
                if operator_position(&tokens) {
                    Token::Operator(BinaryOp::Mul)
                } else {
                    Token::Star
                }
            }
            '$' => {
                i += 1;
                let (name, len) = read_name(&chars[i..]).ok_or("expected variable name")?;
                i += len;
                Token::Variable(name)
            }
            c if is_name_start(c) => {
                let (name, len) = read_name(&chars[i..]).ok_or("bad name")?;
                i += len;
                let op = match name.as_str() {
                    "and" => Some(BinaryOp::And),
                    "or" => Some(BinaryOp::Or),
                    "div" => Some(BinaryOp::Div),
                    "mod" => Some(BinaryOp::Mod),
                    _ => None,
                };
                match op {
                    Some(op) if operator_position(&tokens) => Token::Operator(op),
                    _ => Token::Name(name),
                }
            }
            _ => {
                i += 1;
                match c {
                    '@' => Token::At,
                    ',' => Token::Comma,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    '|' => Token::Pipe,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '=' => Token::Eq,
                    '<' => Token::Lt,
                    '>' => Token::Gt,
                    other => return Err(format!("unexpected character '{other}'")),
                }
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Read an NCName, optionally followed by `:local` or `:*`.
fn read_name(chars: &[char]) -> Option<(String, usize)> {
    if !chars.first().copied().is_some_and(is_name_start) {
        return None;
    }
    let mut len = 1;
    while len < chars.len() && is_name_char(chars[len]) {
        len += 1;
    }
    if chars.get(len) == Some(&':') && chars.get(len + 1) != Some(&':') {
        match chars.get(len + 1) {
            Some('*') => len += 2,
            Some(&c) if is_name_start(c) => {
                len += 2;
                while len < chars.len() && is_name_char(chars[len]) {
                    len += 1;
                }
            }
            _ => {}
        }
    }
    Some((chars[..len].iter().collect(), len))
}

/// Parse an XPath expression.
pub fn parse_expr(source: &str) -> Result<Expr, XsltError> {
    let error = |message: String| XsltError::XPath {
        expr: source.to_string(),
        message,
    };
    let tokens = tokenize(source).map_err(error)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr().map_err(error)?;
    if let Some(token) = parser.peek() {
        return Err(error(format!("unexpected {token:?}")));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type ParseResult<T> = Result<T, String>;

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> ParseResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected {token:?}, found {:?}", self.peek()))
        }
    }

    fn binary_level(
        &mut self,
        operand: fn(&mut Self) -> ParseResult<Expr>,
        operator: fn(&Token) -> Option<BinaryOp>,
    ) -> ParseResult<Expr> {
        let mut left = operand(self)?;
        while let Some(op) = self.peek().and_then(operator) {
            self.pos += 1;
            let right = operand(self)?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn or_expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::and_expr, |t| match t {
            Token::Operator(BinaryOp::Or) => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn and_expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::equality_expr, |t| match t {
            Token::Operator(BinaryOp::And) => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn equality_expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::relational_expr, |t| match t {
            Token::Eq => Some(BinaryOp::Eq),
            Token::Ne => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn relational_expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::additive_expr, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn additive_expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::multiplicative_expr, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn multiplicative_expr(&mut self) -> ParseResult<Expr> {
        self.binary_level(Self::unary_expr, |t| match t {
            Token::Operator(op @ (BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod)) => Some(*op),
            _ => None,
        })
    }

    fn unary_expr(&mut self) -> ParseResult<Expr> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.unary_expr()?)));
        }
        self.union_expr()
    }

    fn union_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.path_expr()?;
        while self.eat(&Token::Pipe) {
            let right = self.path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_filter_expr(&self) -> bool {
        match self.peek() {
            Some(Token::Variable(_) | Token::LParen | Token::Literal(_) | Token::Number(_)) => {
                true
            }
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen) && !is_node_type(name)
            }
            _ => false,
        }
    }

    fn path_expr(&mut self) -> ParseResult<Expr> {
        if !self.starts_filter_expr() {
            return Ok(Expr::Path(self.location_path()?));
        }

        let primary = self.primary_expr()?;
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            predicates.push(self.predicate()?);
        }

        let mut steps = Vec::new();
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.step()?);
            } else {
                break;
            }
        }

        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn primary_expr(&mut self) -> ParseResult<Expr> {
        match self.next() {
            Some(Token::Variable(name)) => Ok(Expr::Variable(name)),
            Some(Token::Literal(text)) => Ok(Expr::Literal(text)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let expr = self.or_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Name(name)) => {
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.or_expr()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Function(name, args))
            }
            other => Err(format!("unexpected {other:?}")),
        }
    }

    fn predicate(&mut self) -> ParseResult<Expr> {
        self.expect(&Token::LBracket)?;
        let expr = self.or_expr()?;
        self.expect(&Token::RBracket)?;
        Ok(expr)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_) | Token::Star | Token::Dot | Token::DotDot | Token::At)
        )
    }

    fn location_path(&mut self) -> ParseResult<LocationPath> {
        let mut path = LocationPath {
            absolute: false,
            steps: Vec::new(),
        };

        if self.eat(&Token::Slash) {
            path.absolute = true;
            if !self.starts_step() {
                return Ok(path);
            }
        } else if self.eat(&Token::DoubleSlash) {
            path.absolute = true;
            path.steps.push(Step::descendant_or_self());
        }

        path.steps.push(self.step()?);
        loop {
            if self.eat(&Token::Slash) {
                path.steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                path.steps.push(Step::descendant_or_self());
                path.steps.push(self.step()?);
            } else {
                break;
            }
        }
        Ok(path)
    }

    fn step(&mut self) -> ParseResult<Step> {
        if self.eat(&Token::Dot) {
            return Ok(Step::new(Axis::SelfAxis, NodeTest::Node));
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step::new(Axis::Parent, NodeTest::Node));
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::DoubleColon)) =
            (self.peek(), self.peek_at(1))
        {
            let axis = Axis::from_name(name).ok_or_else(|| format!("unknown axis '{name}'"))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let mut step = Step::new(axis, self.node_test()?);
        while self.peek() == Some(&Token::LBracket) {
            step.predicates.push(self.predicate()?);
        }
        Ok(step)
    }

    fn node_test(&mut self) -> ParseResult<NodeTest> {
        match self.next() {
            Some(Token::Star) => Ok(NodeTest::Any),
            Some(Token::Name(name)) => {
                if is_node_type(&name) && self.eat(&Token::LParen) {
                    // processing-instruction('target') is accepted, target ignored
                    if let Some(Token::Literal(_)) = self.peek() {
                        self.pos += 1;
                    }
                    self.expect(&Token::RParen)?;
                    return Ok(match name.as_str() {
                        "text" => NodeTest::Text,
                        "node" => NodeTest::Node,
                        "comment" => NodeTest::Comment,
                        _ => NodeTest::ProcessingInstruction,
                    });
                }
                match name.strip_suffix(":*") {
                    Some(prefix) => Ok(NodeTest::Prefix(prefix.to_string())),
                    None => Ok(NodeTest::Name(name)),
                }
            }
            other => Err(format!("expected node test, found {other:?}")),
        }
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "text" | "node" | "comment" | "processing-instruction")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(expr: &Expr) -> &LocationPath {
        match expr {
            Expr::Path(path) => path,
            other => panic!("not a path: {other:?}"),
        }
    }

    #[test]
    fn abbreviated_paths() {
        let expr = parse_expr("//item[@id='2']/name").unwrap();
        let p = path(&expr);
        assert!(p.absolute);
        assert_eq!(p.steps.len(), 3);
        assert_eq!(p.steps[0], Step::descendant_or_self());
        assert_eq!(p.steps[1].test, NodeTest::Name("item".into()));
        assert_eq!(p.steps[1].predicates.len(), 1);
        assert_eq!(p.steps[2].axis, Axis::Child);

        let root = parse_expr("/").unwrap();
        assert!(path(&root).absolute && path(&root).steps.is_empty());

        let dots = parse_expr("../@*").unwrap();
        assert_eq!(path(&dots).steps[0].axis, Axis::Parent);
        assert_eq!(path(&dots).steps[1].axis, Axis::Attribute);
        assert_eq!(path(&dots).steps[1].test, NodeTest::Any);
    }

    #[test]
    fn star_and_names_as_operators() {
        let expr = parse_expr("2 * 3 div 4 mod 5").unwrap();
        assert!(matches!(expr, Expr::Binary(_, BinaryOp::Mod, _)));

        let expr = parse_expr("div * mod").unwrap();
        match expr {
            Expr::Binary(left, BinaryOp::Mul, right) => {
                assert_eq!(path(&left).steps[0].test, NodeTest::Name("div".into()));
                assert_eq!(path(&right).steps[0].test, NodeTest::Name("mod".into()));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            parse_expr("a and not(b) or c").unwrap(),
            Expr::Binary(_, BinaryOp::Or, _)
        ));
    }

    #[test]
    fn functions_and_filters() {
        let expr = parse_expr("translate(local-name(), 'ab', 'AB')").unwrap();
        match expr {
            Expr::Function(name, args) => {
                assert_eq!(name, "translate");
                assert_eq!(args.len(), 3);
                assert_eq!(args[0], Expr::Function("local-name".into(), vec![]));
            }
            other => panic!("unexpected {other:?}"),
        }

        let expr = parse_expr("$items[1]/title").unwrap();
        assert!(matches!(expr, Expr::Filter { ref predicates, ref steps, .. }
            if predicates.len() == 1 && steps.len() == 1));

        assert!(matches!(parse_expr("-1 - -2").unwrap(), Expr::Binary(_, BinaryOp::Sub, _)));
        assert!(matches!(parse_expr("text() | @x").unwrap(), Expr::Union(..)));
    }

    #[test]
    fn explicit_axes_and_prefixes() {
        let expr = parse_expr("ancestor-or-self::xsl:*/following-sibling::h:p").unwrap();
        let p = path(&expr);
        assert_eq!(p.steps[0].axis, Axis::AncestorOrSelf);
        assert_eq!(p.steps[0].test, NodeTest::Prefix("xsl".into()));
        assert_eq!(p.steps[1].axis, Axis::FollowingSibling);
        assert_eq!(p.steps[1].test, NodeTest::Name("h:p".into()));
    }

    #[test]
    fn syntax_errors() {
        assert!(parse_expr("'open").is_err());
        assert!(parse_expr("a[").is_err());
        assert!(parse_expr("bogus::a").is_err());
        assert!(parse_expr("a b").is_err());
        assert!(parse_expr("f(1,)").is_err());
    }
}
