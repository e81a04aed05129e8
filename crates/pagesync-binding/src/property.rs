#![forbid(unsafe_code)]

//! Token templates: `"Hello {name}"`, `"{!busy}"`, `"{price:F2}"`,
//! `"eval({count} > 0)"`.
//!
//! A [`PropertyValue`] is parsed once against a [`BindingContext`] and
//! expanded many times against the current [`Document`].
//!
//! # Token syntax
//!
//! `{[^][!]path[:format]}`
//!
//! | Prefix | Meaning |
//! |--------|---------|
//! | `^` | One-time: resolved and cloned at parse time, never re-read |
//! | `!` | Negate the boolean coercion of the value |
//!
//! `^` is stripped before `!`, so `{^!path}` is a negated one-time token.
//! `{{` and `}}` are literal braces and never start a token.
//!
//! # Expansion
//!
//! - `eval(...)` templates evaluate the body as an [`Expression`] with the
//!   tokens bound to `var0`, `var1`, ... and return the typed result.
//! - A template that is exactly one unformatted token returns the token's
//!   value with its JSON type intact.
//! - Anything else interpolates every token as text and returns a string.

use pagesync_json::Document;
use serde_json::Value;

use crate::coerce::{display_string, to_boolean};
use crate::context::BindingContext;
use crate::expr::{ExprValue, Expression};
use crate::format::format_value;

/// One `{...}` placeholder bound to a context.
#[derive(Debug, Clone)]
pub struct BoundToken {
    context: BindingContext,
    one_time: bool,
    negated: bool,
    format_spec: Option<String>,
    captured: Option<Value>,
}

impl BoundToken {
    fn parse(group: &str, parent: &BindingContext, doc: &Document) -> Self {
        let (path, format_spec) = match group.split_once(':') {
            Some((path, spec)) => (path, Some(spec.trim().to_owned())),
            None => (group, None),
        };
        let mut path = path.trim();
        let one_time = path.starts_with('^');
        if one_time {
            path = &path[1..];
        }
        let negated = path.starts_with('!');
        if negated {
            path = &path[1..];
        }

        let mut token = Self {
            context: parent.select(path),
            one_time,
            negated,
            format_spec: format_spec.filter(|spec| !spec.is_empty()),
            captured: None,
        };
        if one_time {
            token.captured = token.read(doc);
        }
        token
    }

    fn read(&self, doc: &Document) -> Option<Value> {
        let value = self.context.get_value(doc);
        if self.negated {
            Some(Value::Bool(!to_boolean(value.as_ref())))
        } else {
            value
        }
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &BindingContext {
        &self.context
    }

    #[inline]
    #[must_use]
    pub const fn is_one_time(&self) -> bool {
        self.one_time
    }

    #[inline]
    #[must_use]
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    #[must_use]
    pub fn format_spec(&self) -> Option<&str> {
        self.format_spec.as_deref()
    }

    /// The token's current value: the captured value for one-time tokens,
    /// otherwise a fresh read (negated if requested).
    #[must_use]
    pub fn resolved_value(&self, doc: &Document) -> Option<Value> {
        if self.one_time {
            self.captured.clone()
        } else {
            self.read(doc)
        }
    }

    /// The value as display text, applying the format spec when it
    /// succeeds.
    #[must_use]
    pub fn resolved_value_as_string(&self, doc: &Document) -> String {
        let Some(value) = self.resolved_value(doc) else {
            return String::new();
        };
        self.format_spec
            .as_deref()
            .and_then(|spec| format_value(&value, spec))
            .unwrap_or_else(|| display_string(&value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Token(usize),
}

#[derive(Debug, Clone)]
enum Body {
    Template(Vec<Segment>),
    /// `None` when the expression failed to parse.
    Expression(Option<Expression>),
}

enum Piece<'a> {
    Text(char),
    Group(&'a str),
}

/// Split a template into literal characters and `{...}` groups.
///
/// A group directly followed by another `}` (as in `{a}}`) is not a group;
/// its characters stay literal, with `}}` still collapsing to `}`.
fn scan(source: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = source;
    while let Some(ch) = rest.chars().next() {
        match ch {
            '{' if rest.starts_with("{{") => {
                pieces.push(Piece::Text('{'));
                rest = &rest[2..];
            }
            '}' if rest.starts_with("}}") => {
                pieces.push(Piece::Text('}'));
                rest = &rest[2..];
            }
            '{' => {
                let group = rest[1..]
                    .find(['{', '}'])
                    .filter(|&end| {
                        rest[1 + end..].starts_with('}') && !rest[2 + end..].starts_with('}')
                    });
                match group {
                    Some(end) => {
                        pieces.push(Piece::Group(&rest[1..1 + end]));
                        rest = &rest[end + 2..];
                    }
                    None => {
                        pieces.push(Piece::Text('{'));
                        rest = &rest[1..];
                    }
                }
            }
            other => {
                pieces.push(Piece::Text(other));
                rest = &rest[other.len_utf8()..];
            }
        }
    }
    pieces
}

fn expression_body(source: &str) -> Option<&str> {
    source
        .trim()
        .strip_prefix("eval(")
        .and_then(|body| body.strip_suffix(')'))
}

/// A parsed token template.
#[derive(Debug, Clone)]
pub struct PropertyValue {
    source: String,
    body: Body,
    tokens: Vec<BoundToken>,
}

impl PropertyValue {
    /// Parse `source` with token paths relative to `context`. One-time
    /// tokens are captured from `doc` immediately.
    #[must_use]
    pub fn parse(source: &str, context: &BindingContext, doc: &Document) -> Self {
        let mut tokens = Vec::new();

        if let Some(inner) = expression_body(source) {
            let mut text = String::with_capacity(inner.len());
            for piece in scan(inner) {
                match piece {
                    Piece::Text(ch) => text.push(ch),
                    Piece::Group(group) => {
                        text.push_str(&format!("var{}", tokens.len()));
                        tokens.push(BoundToken::parse(group, context, doc));
                    }
                }
            }
            let expression = match Expression::parse(&text) {
                Ok(expression) => Some(expression),
                Err(err) => {
                    tracing::warn!(template = source, %err, "invalid eval expression");
                    None
                }
            };
            return Self {
                source: source.to_owned(),
                body: Body::Expression(expression),
                tokens,
            };
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        for piece in scan(source) {
            match piece {
                Piece::Text(ch) => literal.push(ch),
                Piece::Group(group) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Token(tokens.len()));
                    tokens.push(BoundToken::parse(group, context, doc));
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: source.to_owned(),
            body: Body::Template(segments),
            tokens,
        }
    }

    /// Whether `source` holds at least one binding token. Cheap enough to
    /// call before deciding whether to build a [`PropertyValue`] at all.
    #[must_use]
    pub fn contains_binding_tokens(source: &str) -> bool {
        source.contains('{') && scan(source).iter().any(|p| matches!(p, Piece::Group(_)))
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    #[must_use]
    pub fn tokens(&self) -> &[BoundToken] {
        &self.tokens
    }

    #[must_use]
    pub fn is_expression(&self) -> bool {
        matches!(self.body, Body::Expression(_))
    }

    /// Whether any token reads the document at expansion time.
    #[must_use]
    pub fn has_live_tokens(&self) -> bool {
        self.tokens.iter().any(|t| !t.one_time)
    }

    /// Expand against the current document.
    #[must_use]
    pub fn expand(&self, doc: &Document) -> Option<Value> {
        match &self.body {
            Body::Expression(None) => None,
            Body::Expression(Some(expression)) => {
                let vars: Vec<ExprValue> = self
                    .tokens
                    .iter()
                    .map(|t| ExprValue::from_json(t.resolved_value(doc).as_ref()))
                    .collect();
                match expression.evaluate(&vars) {
                    Ok(result) => Some(result.into_json()),
                    Err(err) => {
                        tracing::warn!(template = %self.source, %err, "eval expression failed");
                        None
                    }
                }
            }
            Body::Template(segments) => match segments.as_slice() {
                [Segment::Token(index)] => {
                    let token = &self.tokens[*index];
                    if token.format_spec.is_some() {
                        Some(Value::String(token.resolved_value_as_string(doc)))
                    } else {
                        token.resolved_value(doc)
                    }
                }
                _ => {
                    let mut out = String::new();
                    for segment in segments {
                        match segment {
                            Segment::Literal(text) => out.push_str(text),
                            Segment::Token(index) => {
                                out.push_str(&self.tokens[*index].resolved_value_as_string(doc));
                            }
                        }
                    }
                    Some(Value::String(out))
                }
            },
        }
    }

    /// Re-resolve every token's context.
    pub fn rebind(&self, doc: &Document) {
        for token in &self.tokens {
            token.context.rebind(doc);
        }
    }
}
