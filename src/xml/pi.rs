//! Tokenizer for the pseudo-attributes of `<?xml-stylesheet ...?>`.
//!
//! The instruction data is a whitespace separated list of `name="value"` or
//! `name='value'` pairs. Values may contain the predefined entities.

use std::borrow::Cow;

use quick_xml::escape::unescape;

/// Target of the processing instruction that links a stylesheet.
pub const STYLESHEET_TARGET: &str = "xml-stylesheet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PseudoAttribute<'a> {
    pub name: &'a str,
    pub value: Cow<'a, str>,
}

/// Syntax error inside the instruction data, with the byte offset it occurred at.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct PseudoAttributeError {
    pub offset: usize,
    pub message: &'static str,
}

/// Iterator over the pseudo-attributes of an instruction's data.
///
/// Stops after yielding an error until [`PseudoAttributes::recover`] is called.
pub struct PseudoAttributes<'a> {
    data: &'a str,
    position: usize,
    /// Where the pair being read started
    token_start: usize,
    failed: bool,
}

impl<'a> PseudoAttributes<'a> {
    pub fn new(data: &'a str) -> Self {
        Self {
            data,
            position: 0,
            token_start: 0,
            failed: false,
        }
    }

    /// Resume after an error at the next token boundary.
    ///
    /// If the malformed pair already ended at whitespace, reading continues
    /// right there. Otherwise the rest of the malformed token is skipped.
    pub fn recover(&mut self) {
        let at_boundary = self.position > self.token_start
            && self.data[..self.position].ends_with(char::is_whitespace);
        if !at_boundary {
            let rest = &self.data[self.position..];
            self.position += rest.find(char::is_whitespace).unwrap_or(rest.len());
        }
        self.failed = false;
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.data[self.position..];
        self.position += rest.len() - rest.trim_start().len();
    }

    fn error(&mut self, message: &'static str) -> PseudoAttributeError {
        self.failed = true;
        PseudoAttributeError {
            offset: self.position,
            message,
        }
    }

    fn next_attribute(&mut self) -> Result<PseudoAttribute<'a>, PseudoAttributeError> {
        let data = self.data;
        self.token_start = self.position;
        let rest = &data[self.position..];

        let name_len = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        if name_len == 0 {
            return Err(self.error("expected pseudo-attribute name"));
        }
        let name = &rest[..name_len];
        self.position += name_len;

        self.skip_whitespace();
        if !data[self.position..].starts_with('=') {
            return Err(self.error("expected '='"));
        }
        self.position += 1;
        self.skip_whitespace();

        let quote = match data[self.position..].chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected quoted value")),
        };
        let value_start = self.position + 1;
        let Some(value_len) = data[value_start..].find(quote) else {
            return Err(self.error("unterminated value"));
        };
        let raw = &data[value_start..value_start + value_len];
        self.position = value_start + value_len + 1;

        let value = unescape(raw).map_err(|_| self.error("invalid entity in value"))?;

        let next = data[self.position..].chars().next();
        if next.is_some_and(|c| !c.is_whitespace()) {
            return Err(self.error("expected whitespace between pseudo-attributes"));
        }

        Ok(PseudoAttribute { name, value })
    }
}

impl<'a> Iterator for PseudoAttributes<'a> {
    type Item = Result<PseudoAttribute<'a>, PseudoAttributeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.skip_whitespace();
        if self.position >= self.data.len() {
            return None;
        }
        Some(self.next_attribute())
    }
}

/// Value of the first well-formed `href` pseudo-attribute.
///
/// Malformed pairs before it are skipped.
pub fn stylesheet_href(data: &str) -> Option<Cow<'_, str>> {
    let mut attributes = PseudoAttributes::new(data);
    while let Some(attribute) = attributes.next() {
        match attribute {
            Ok(attribute) if attribute.name == "href" => return Some(attribute.value),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(data, error = %e, "skipping malformed xml-stylesheet pair");
                attributes.recover();
            }
        }
    }
    None
}
