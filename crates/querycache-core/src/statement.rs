//! Statement values handed to the cache by the interception boundary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A value bound to a positional `?` placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl BoundValue {
    /// Parse a command-line style literal: null, true/false, integer, float, else text
    pub fn parse_literal(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() {
                return Self::Float(f);
            }
        }
        Self::Text(raw.to_string())
    }

    /// Whether the value renders as a bare number inside SQL text
    pub fn is_numeric(&self) -> bool {
        match self {
            Self::Int(_) | Self::Float(_) => true,
            Self::Text(s) => looks_numeric(s),
            Self::Null | Self::Bool(_) => false,
        }
    }
}

impl fmt::Display for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for BoundValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for BoundValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for BoundValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for BoundValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for BoundValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for BoundValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<BoundValue>> From<Option<T>> for BoundValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Decimal number check: optional sign, digits, optional fraction and exponent.
pub(crate) fn looks_numeric(s: &str) -> bool {
    let s = s.trim();
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    if body.is_empty() || !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return false;
    }
    body.parse::<f64>().map(|f| f.is_finite()).unwrap_or(false)
}

/// The statement text after leading whitespace and comments.
///
/// An unterminated block comment swallows the rest of the text.
fn skip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(line) = rest.strip_prefix("--") {
            rest = line.split_once('\n').map_or("", |(_, after)| after).trim_start();
        } else if let Some(block) = rest.strip_prefix("/*") {
            rest = block.split_once("*/").map_or("", |(_, after)| after).trim_start();
        } else {
            return rest;
        }
    }
}

/// Coarse statement classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Read,
    Write,
    Other,
}

const WRITE_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "replace", "merge", "upsert", "truncate", "alter", "drop",
];

impl StatementKind {
    /// Classify a statement by its leading keyword, skipping leading comments
    pub fn classify(sql: &str) -> Self {
        let mut words = skip_leading_comments(sql)
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty())
            .map(|w| w.to_ascii_lowercase());

        match words.next().as_deref() {
            Some("select") | Some("values") => Self::Read,
            Some("with") => {
                if words.any(|w| matches!(w.as_str(), "insert" | "update" | "delete")) {
                    Self::Write
                } else {
                    Self::Read
                }
            }
            Some(word) if WRITE_KEYWORDS.contains(&word) => Self::Write,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Immutable statement as seen by the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Raw SQL text with positional `?` placeholders
    pub sql: String,
    /// Values bound to the placeholders, in order
    pub bindings: Vec<BoundValue>,
    /// Statement kind
    pub kind: StatementKind,
}

impl Statement {
    /// Create a statement, classifying its kind from the text
    pub fn new(sql: impl Into<String>, bindings: Vec<BoundValue>) -> Self {
        let sql = sql.into();
        let kind = StatementKind::classify(&sql);
        Self {
            sql,
            bindings,
            kind,
        }
    }

    /// Create a statement with an explicit kind
    pub fn with_kind(sql: impl Into<String>, bindings: Vec<BoundValue>, kind: StatementKind) -> Self {
        Self {
            sql: sql.into(),
            bindings,
            kind,
        }
    }

    /// Wrap the statement for interception without a cache directive
    pub fn intercept(self) -> InterceptedStatement {
        InterceptedStatement::new(self)
    }

    /// Mark the statement cacheable with the default TTL
    pub fn cache(self) -> InterceptedStatement {
        self.intercept().cache()
    }

    /// Mark the statement cacheable with an explicit TTL
    pub fn cache_for(self, ttl: Duration) -> InterceptedStatement {
        self.intercept().cache_for(ttl)
    }

    /// Opt the statement out of caching
    pub fn no_cache(self) -> InterceptedStatement {
        self.intercept().no_cache()
    }
}

/// Per-statement cache override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDirective {
    /// Whether the statement opts in (`true`) or out (`false`)
    pub enabled: bool,
    /// TTL override; the configured default applies when absent
    pub ttl: Option<Duration>,
}

impl CacheDirective {
    pub fn cache() -> Self {
        Self {
            enabled: true,
            ttl: None,
        }
    }

    pub fn cache_for(ttl: Duration) -> Self {
        Self {
            enabled: true,
            ttl: Some(ttl),
        }
    }

    pub fn no_cache() -> Self {
        Self {
            enabled: false,
            ttl: None,
        }
    }
}

/// What the interception boundary hands to the coordinator for one statement
#[derive(Debug, Clone, PartialEq)]
pub struct InterceptedStatement {
    pub statement: Statement,
    pub directive: Option<CacheDirective>,
    /// Identity of the connection the statement was issued on
    pub connection: Option<String>,
}

impl InterceptedStatement {
    pub fn new(statement: Statement) -> Self {
        Self {
            statement,
            directive: None,
            connection: None,
        }
    }

    pub fn cache(self) -> Self {
        self.with_directive(CacheDirective::cache())
    }

    pub fn cache_for(self, ttl: Duration) -> Self {
        self.with_directive(CacheDirective::cache_for(ttl))
    }

    pub fn no_cache(self) -> Self {
        self.with_directive(CacheDirective::no_cache())
    }

    pub fn with_directive(self, directive: CacheDirective) -> Self {
        Self {
            directive: Some(directive),
            ..self
        }
    }

    pub fn on_connection(self, connection: impl Into<String>) -> Self {
        Self {
            connection: Some(connection.into()),
            ..self
        }
    }
}

impl From<Statement> for InterceptedStatement {
    fn from(statement: Statement) -> Self {
        Self::new(statement)
    }
}
