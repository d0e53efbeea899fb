//! Dependency tags
//!
//! Every cached read is labelled with the data it depends on; every write is
//! turned into the set of labels whose entries it may have made stale.
//!
//! ## Tag shapes
//!
//! - `query-cache`: carried by every entry, flushing it empties the cache
//! - `table:<t>`: every entry reading `<t>`
//! - `where:<c>:<v>`: entries whose WHERE clause pins column `<c>` to `<v>`
//! - `column:<t>:<c>`: fully scoped entries constraining column `<c>`
//! - `scan:<t>`: entries on `<t>` that are not fully scoped
//!
//! A scoped write (UPDATE/DELETE on one table whose WHERE is only equalities)
//! flushes its `where:` tags, `scan:<t>` and, for UPDATE, `column:<t>:<c>` of
//! each assigned column. It then sweeps every live `column:<t>:<c>` tag whose
//! column it does not filter on: a scoped read that pins none of the write's
//! columns may cover the changed rows. A scoped read that pins one of them to
//! another value cannot, and survives. Every other write flushes `table:<t>`
//! for each table it names.

mod lexer;
mod parser;

#[cfg(test)]
mod tests;

pub use lexer::{LexError, Token, tokenize};
pub use parser::{Operation, Predicate, StatementShape};

use crate::statement::{BoundValue, Statement, StatementKind};
use once_cell::sync::Lazy;
use parser::{Parser, canonical_name};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Tag carried by every cache entry
pub const BASE_TAG: &str = "query-cache";

/// A dependency label attached to cache entries
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn base() -> Self {
        Self(BASE_TAG.to_string())
    }

    pub fn table(table: &str) -> Self {
        Self(format!("table:{}", table))
    }

    pub fn predicate(column: &str, value: &str) -> Self {
        Self(format!("where:{}:{}", column, value))
    }

    pub fn column(table: &str, column: &str) -> Self {
        Self(format!("column:{}:{}", table, column))
    }

    pub fn scan(table: &str) -> Self {
        Self(format!("scan:{}", table))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// De-duplicated, ordered tag collection
pub type TagSet = BTreeSet<Tag>;

static TABLE_FALLBACK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(from|join|into|update|table)\s+([A-Za-z0-9_$."`\[\]]+)"#)
        .expect("table fallback pattern is valid")
});

/// Derives storage and invalidation tags from statements
#[derive(Debug, Clone, Copy)]
pub struct TagExtractor {
    scoped_invalidation: bool,
}

impl Default for TagExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TagExtractor {
    /// `scoped_invalidation = false` makes every write flush its whole table.
    pub fn new(scoped_invalidation: bool) -> Self {
        Self {
            scoped_invalidation,
        }
    }

    /// Parse the statement structure relevant to tagging.
    ///
    /// Never fails: unparseable input yields a shape with `degraded` set and
    /// whatever table names the fallback pattern could recover.
    pub fn analyze(&self, sql: &str, bindings: &[BoundValue], kind: StatementKind) -> StatementShape {
        let tokens = match tokenize(sql) {
            Ok(tokens) => tokens,
            Err(err) => {
                let operation = match kind {
                    StatementKind::Read => Operation::Select,
                    _ => Operation::Unknown,
                };
                return StatementShape::degraded(kind, operation, fallback_tables(sql, kind), err.to_string());
            }
        };

        let mut shape = Parser::new(&tokens, bindings).parse(kind);
        if shape.degraded.is_some() {
            for table in fallback_tables(sql, kind) {
                if !shape.tables.contains(&table) {
                    shape.tables.push(table);
                }
            }
        }
        shape
    }

    /// Tags for a statement: storage tags for reads, invalidation tags for
    /// writes, only the base tag otherwise.
    pub fn extract_tags(&self, sql: &str, bindings: &[BoundValue], kind: StatementKind) -> TagSet {
        match kind {
            StatementKind::Read => self.storage_tags(&self.analyze(sql, bindings, kind)),
            StatementKind::Write => self.invalidation_tags(&self.analyze(sql, bindings, kind)),
            StatementKind::Other => TagSet::from([Tag::base()]),
        }
    }

    /// Convenience wrapper over [`extract_tags`](Self::extract_tags)
    pub fn extract(&self, statement: &Statement) -> TagSet {
        self.extract_tags(&statement.sql, &statement.bindings, statement.kind)
    }

    /// Tags attached to a cached read result
    pub fn storage_tags(&self, shape: &StatementShape) -> TagSet {
        let mut tags = TagSet::from([Tag::base()]);
        for table in &shape.tables {
            tags.insert(Tag::table(table));
        }

        if shape.degraded.is_some() || shape.multi_table {
            tags.extend(shape.tables.iter().map(|t| Tag::scan(t)));
            return tags;
        }

        tags.extend(shape.predicates.iter().map(|p| Tag::predicate(&p.column, &p.value)));
        match shape.target_table() {
            Some(table) if shape.fully_scoped => {
                tags.extend(shape.predicates.iter().map(|p| Tag::column(table, &p.column)));
            }
            Some(table) => {
                tags.insert(Tag::scan(table));
            }
            None => {}
        }
        tags
    }

    /// Tags whose invalidation must stop a concurrent read of this shape
    /// from being stored: its storage tags plus `scan:<t>` of each table,
    /// which every scoped write on `<t>` flushes.
    pub fn guard_tags(&self, shape: &StatementShape) -> TagSet {
        let mut tags = self.storage_tags(shape);
        tags.extend(shape.tables.iter().map(|t| Tag::scan(t)));
        tags
    }

    /// Tags to flush after a write
    pub fn invalidation_tags(&self, shape: &StatementShape) -> TagSet {
        let Some(table) = shape.target_table() else {
            // Unknown target: only a full flush is safe.
            return TagSet::from([Tag::base()]);
        };

        if shape.multi_table || shape.degraded.is_some() {
            return shape.tables.iter().map(|t| Tag::table(t)).collect();
        }
        if !self.is_scoped_write(shape) {
            return TagSet::from([Tag::table(table)]);
        }

        let mut tags: TagSet = shape
            .predicates
            .iter()
            .map(|p| Tag::predicate(&p.column, &p.value))
            .collect();
        tags.insert(Tag::scan(table));
        if let Some(columns) = &shape.set_columns {
            tags.extend(columns.iter().map(|c| Tag::column(table, c)));
        }
        tags
    }

    /// Column tags a scoped write must sweep on top of its invalidation tags
    pub fn column_sweep(&self, shape: &StatementShape) -> Option<ColumnSweep> {
        if !self.is_scoped_write(shape) {
            return None;
        }
        Some(ColumnSweep {
            table: shape.target_table()?.to_string(),
            keep: shape.predicates.iter().map(|p| p.column.clone()).collect(),
        })
    }

    fn is_scoped_write(&self, shape: &StatementShape) -> bool {
        self.scoped_invalidation
            && shape.degraded.is_none()
            && !shape.multi_table
            && shape.fully_scoped
            && match shape.operation {
                Operation::Delete => true,
                Operation::Update => shape.set_columns.is_some(),
                _ => false,
            }
    }
}

/// The `column:<t>:<c>` tags of one table, minus the columns a scoped write
/// filters on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSweep {
    table: String,
    keep: Vec<String>,
}

impl ColumnSweep {
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Prefix shared by every column tag of the table
    pub fn prefix(&self) -> String {
        format!("column:{}:", self.table)
    }

    /// Whether a live tag has to be flushed
    pub fn covers(&self, tag: &Tag) -> bool {
        tag.as_str()
            .strip_prefix(&self.prefix())
            .is_some_and(|column| !self.keep.iter().any(|k| k == column))
    }
}

/// Table names recovered by pattern matching when tokenizing fails.
///
/// A write keeps every name it mentions, so a degraded multi-table write
/// still flushes all of them.
fn fallback_tables(sql: &str, kind: StatementKind) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for captures in TABLE_FALLBACK.captures_iter(sql) {
        let keyword = captures[1].to_ascii_lowercase();
        if kind == StatementKind::Read && keyword != "from" && keyword != "join" {
            continue;
        }

        let raw = captures[2].rsplit('.').next().unwrap_or(&captures[2]);
        let name = canonical_name(raw.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']')));
        if !name.is_empty() && !tables.contains(&name) {
            tables.push(name);
        }
    }
    tables
}
