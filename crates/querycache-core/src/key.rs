//! Cache key derivation
//!
//! A key is the SHA-256 digest of the fully materialized statement: every
//! positional placeholder replaced by its bound value rendered as a literal.
//! Parameterized and literal spellings of the same query therefore share a key.

use crate::error::{QueryCacheError, QueryCacheResult};
use crate::statement::{BoundValue, Statement};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Namespace prefix of every derived key
pub const KEY_NAMESPACE: &str = "query_cache:";

/// Opaque, fixed-length cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for an already materialized statement text
    pub fn for_materialized(materialized: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(materialized.as_bytes());
        Self(format!("{}{:x}", KEY_NAMESPACE, hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives cache keys from statements
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyDeriver;

impl KeyDeriver {
    pub fn new() -> Self {
        Self
    }

    /// Derive the key for a statement
    pub fn derive(&self, statement: &Statement) -> QueryCacheResult<CacheKey> {
        self.derive_key(&statement.sql, &statement.bindings)
    }

    /// Derive the key for raw text and bound values
    pub fn derive_key(&self, sql: &str, bindings: &[BoundValue]) -> QueryCacheResult<CacheKey> {
        let materialized = self.materialize(sql, bindings)?;
        Ok(CacheKey::for_materialized(&materialized))
    }

    /// Substitute placeholders and normalize whitespace outside quoted text.
    ///
    /// Fails with `FormatMismatch` when the number of `?` placeholders differs
    /// from the number of bound values.
    pub fn materialize(&self, sql: &str, bindings: &[BoundValue]) -> QueryCacheResult<String> {
        let placeholders = count_placeholders(sql);
        if placeholders != bindings.len() {
            return Err(QueryCacheError::format_mismatch(placeholders, bindings.len()));
        }

        let mut out = String::with_capacity(sql.len() + bindings.len() * 8);
        let mut values = bindings.iter();
        let mut quote: Option<char> = None;
        let mut pending_space = false;

        for c in sql.trim().chars() {
            if let Some(q) = quote {
                out.push(c);
                if c == q {
                    quote = None;
                }
                continue;
            }

            if c.is_whitespace() {
                pending_space = true;
                continue;
            }
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;

            match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => match values.next() {
                    Some(value) => render_literal(value, &mut out),
                    None => return Err(QueryCacheError::format_mismatch(placeholders, bindings.len())),
                },
                _ => out.push(c),
            }
        }

        while out.ends_with(';') {
            out.pop();
            while out.ends_with(' ') {
                out.pop();
            }
        }

        Ok(out)
    }
}

/// Count `?` placeholders that sit outside quoted literals and identifiers.
pub fn count_placeholders(sql: &str) -> usize {
    let mut quote: Option<char> = None;
    let mut count = 0;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '?' => count += 1,
                _ => {}
            },
        }
    }
    count
}

fn render_literal(value: &BoundValue, out: &mut String) {
    match value {
        BoundValue::Null => out.push_str("NULL"),
        BoundValue::Bool(b) => out.push_str(if *b { "'1'" } else { "'0'" }),
        BoundValue::Int(i) => out.push_str(&i.to_string()),
        BoundValue::Float(f) => out.push_str(&f.to_string()),
        BoundValue::Text(s) if value.is_numeric() => out.push_str(s.trim()),
        BoundValue::Text(s) => {
            out.push('\'');
            out.push_str(&s.replace('\'', "''"));
            out.push('\'');
        }
    }
}
