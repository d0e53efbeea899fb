//! Predicate-focused statement parser
//!
//! Extracts only what tagging needs: the tables a statement depends on, the
//! top-level equality conjuncts of its WHERE clause and, for UPDATE, the
//! columns it assigns. Anything else is skipped rather than rejected.

use super::lexer::Token;
use crate::error::QueryCacheError;
use crate::statement::{BoundValue, StatementKind, looks_numeric};
use serde::Serialize;

/// What a statement does to its target table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Replace,
    Truncate,
    Schema,
    Unknown,
}

/// A `column = value` conjunct with its value in canonical tag form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Predicate {
    pub column: String,
    pub value: String,
}

/// Structure recovered from a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementShape {
    pub kind: StatementKind,
    pub operation: Operation,
    /// Dependency tables, the target or primary table first
    pub tables: Vec<String>,
    /// Supported equality conjuncts of the top-level WHERE clause
    pub predicates: Vec<Predicate>,
    /// WHERE present and made only of supported equality conjuncts
    pub fully_scoped: bool,
    /// Several tables or a nested SELECT are involved
    pub multi_table: bool,
    /// Columns assigned by an UPDATE; `None` when they could not be read
    pub set_columns: Option<Vec<String>>,
    /// Why parsing fell back to table granularity
    pub degraded: Option<String>,
}

impl StatementShape {
    pub fn target_table(&self) -> Option<&str> {
        self.tables.first().map(String::as_str)
    }

    /// Why tagging fell back to table granularity, with `sql` as context
    pub fn degradation(&self, sql: &str) -> Option<QueryCacheError> {
        self.degraded
            .as_ref()
            .map(|reason| QueryCacheError::parse_degraded_with_context(reason.clone(), sql))
    }

    pub(crate) fn degraded(
        kind: StatementKind,
        operation: Operation,
        tables: Vec<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation,
            tables,
            predicates: Vec::new(),
            fully_scoped: false,
            multi_table: false,
            set_columns: None,
            degraded: Some(reason.into()),
        }
    }
}

const RESERVED: &[&str] = &[
    "select", "from", "where", "and", "or", "not", "null", "true", "false", "case", "when", "then",
    "else", "end", "exists", "in", "is", "like", "between", "as", "on", "using", "join", "inner",
    "left", "right", "full", "cross", "outer", "natural", "lateral", "group", "order", "by",
    "limit", "offset", "having", "union", "intersect", "except", "set", "values", "returning",
    "for", "window", "fetch", "into", "distinct", "all", "any", "some", "with", "straight_join",
];

const CLAUSE_END: &[&str] = &[
    "group", "order", "limit", "having", "offset", "returning", "union", "intersect", "except",
    "window", "for", "fetch",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

pub(crate) fn canonical_name(raw: &str) -> String {
    raw.to_lowercase()
}

/// Canonical tag form of a value: numbers normalized, text lowercased.
pub(crate) fn canonical_value(raw: &str) -> String {
    if looks_numeric(raw) {
        let trimmed = raw.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return i.to_string();
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return f.to_string();
        }
    }
    raw.trim_end().to_lowercase()
}

pub(crate) fn canonical_bound(value: &BoundValue) -> Option<String> {
    match value {
        BoundValue::Null => None,
        BoundValue::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        BoundValue::Int(i) => Some(i.to_string()),
        BoundValue::Float(f) => Some(canonical_value(&f.to_string())),
        BoundValue::Text(s) => Some(canonical_value(s)),
    }
}

pub(crate) struct Parser<'a> {
    tokens: &'a [Token],
    depths: Vec<usize>,
    balanced: bool,
    bindings: &'a [BoundValue],
}

impl<'a> Parser<'a> {
    pub(crate) fn new(tokens: &'a [Token], bindings: &'a [BoundValue]) -> Self {
        let mut depths = Vec::with_capacity(tokens.len());
        let mut depth: usize = 0;
        let mut balanced = true;
        for token in tokens {
            if token.is_symbol(")") {
                if depth == 0 {
                    balanced = false;
                } else {
                    depth -= 1;
                }
            }
            depths.push(depth);
            if token.is_symbol("(") {
                depth += 1;
            }
        }
        if depth != 0 {
            balanced = false;
        }
        Self {
            tokens,
            depths,
            balanced,
            bindings,
        }
    }

    pub(crate) fn parse(&self, kind: StatementKind) -> StatementShape {
        match kind {
            StatementKind::Read => self.parse_read(),
            StatementKind::Write => self.parse_write(),
            StatementKind::Other => StatementShape {
                kind,
                operation: Operation::Unknown,
                tables: Vec::new(),
                predicates: Vec::new(),
                fully_scoped: false,
                multi_table: false,
                set_columns: None,
                degraded: None,
            },
        }
    }

    fn parse_read(&self) -> StatementShape {
        let (tables, nested) = self.read_tables();
        if !self.balanced {
            return StatementShape::degraded(
                StatementKind::Read,
                Operation::Select,
                tables,
                "unbalanced parentheses",
            );
        }

        let multi_table = nested || tables.len() > 1;
        let mut shape = StatementShape {
            kind: StatementKind::Read,
            operation: Operation::Select,
            tables,
            predicates: Vec::new(),
            fully_scoped: false,
            multi_table,
            set_columns: None,
            degraded: None,
        };
        if multi_table || shape.tables.is_empty() {
            return shape;
        }

        let Some(from) = self.top_level_index("from", 0) else {
            return shape;
        };
        if let Err(reason) = self.apply_where(&mut shape, from) {
            return StatementShape::degraded(
                StatementKind::Read,
                Operation::Select,
                shape.tables,
                reason,
            );
        }
        shape
    }

    fn parse_write(&self) -> StatementShape {
        let Some((operation, keyword_at, table, after_name)) = self.write_target() else {
            return StatementShape::degraded(
                StatementKind::Write,
                Operation::Unknown,
                Vec::new(),
                "no target table",
            );
        };
        let tables = vec![table];
        if !self.balanced {
            return StatementShape::degraded(
                StatementKind::Write,
                operation,
                tables,
                "unbalanced parentheses",
            );
        }

        let mut shape = StatementShape {
            kind: StatementKind::Write,
            operation,
            tables,
            predicates: Vec::new(),
            fully_scoped: false,
            multi_table: false,
            set_columns: None,
            degraded: None,
        };

        // Data-modifying CTEs may write several tables; never scoped.
        if self.tokens.first().is_some_and(|t| t.is_keyword("with")) {
            for target in self.cte_write_targets() {
                if !shape.tables.contains(&target) {
                    shape.tables.push(target);
                }
            }
            shape.multi_table = shape.tables.len() > 1;
            return shape;
        }
        if self.depths[keyword_at] != 0 || !matches!(operation, Operation::Update | Operation::Delete) {
            return shape;
        }

        if self.writes_several_tables(operation, after_name) {
            let mut tables = self.named_tables(operation, keyword_at);
            if operation == Operation::Update || tables.is_empty() {
                if let Some(target) = shape.tables.first() {
                    if !tables.contains(target) {
                        tables.insert(0, target.clone());
                    }
                }
            }
            shape.tables = tables;
            shape.multi_table = true;
            return shape;
        }

        if operation == Operation::Update {
            shape.set_columns = self.set_columns(after_name);
        }
        if let Err(reason) = self.apply_where(&mut shape, after_name) {
            return StatementShape::degraded(StatementKind::Write, operation, shape.tables, reason);
        }
        shape
    }

    /// Fill predicates from the first top-level WHERE at or after `from`.
    fn apply_where(&self, shape: &mut StatementShape, from: usize) -> Result<(), String> {
        let Some(start) = self.top_level_index("where", from) else {
            return Ok(());
        };
        let end = (start + 1..self.tokens.len())
            .find(|&i| self.depths[i] == 0 && self.ends_clause(&self.tokens[i]))
            .unwrap_or(self.tokens.len());

        let Some(conjuncts) = self.conjuncts(start + 1, end) else {
            return Ok(());
        };

        let mut all_supported = !conjuncts.is_empty();
        for conjunct in conjuncts {
            match self.equality(conjunct)? {
                Some(predicate) => {
                    if !shape.predicates.contains(&predicate) {
                        shape.predicates.push(predicate);
                    }
                }
                None => all_supported = false,
            }
        }
        shape.fully_scoped = all_supported;
        Ok(())
    }

    fn ends_clause(&self, token: &Token) -> bool {
        token.is_symbol(";") || CLAUSE_END.iter().any(|k| token.is_keyword(k))
    }

    fn top_level_index(&self, keyword: &str, from: usize) -> Option<usize> {
        (from..self.tokens.len()).find(|&i| self.depths[i] == 0 && self.tokens[i].is_keyword(keyword))
    }

    /// Split `[start, end)` at top-level AND. `None` when a top-level OR makes
    /// the clause a disjunction.
    fn conjuncts(&self, start: usize, end: usize) -> Option<Vec<&'a [Token]>> {
        let mut parts = Vec::new();
        let mut part_start = start;
        let mut open_between = false;

        for i in start..end {
            if self.depths[i] != 0 {
                continue;
            }
            let token = &self.tokens[i];
            if token.is_keyword("or") {
                return None;
            }
            if token.is_keyword("between") {
                open_between = true;
            } else if token.is_keyword("and") {
                if open_between {
                    open_between = false;
                } else {
                    parts.push(&self.tokens[part_start..i]);
                    part_start = i + 1;
                }
            }
        }
        parts.push(&self.tokens[part_start..end]);
        Some(parts)
    }

    /// Recognize `column = value`. `Err` when a placeholder has no bound value.
    fn equality(&self, conjunct: &[Token]) -> Result<Option<Predicate>, String> {
        let Some((column, next)) = name_at(conjunct, 0) else {
            return Ok(None);
        };
        if !conjunct.get(next).is_some_and(|t| t.is_symbol("=")) {
            return Ok(None);
        }

        let rest = &conjunct[next + 1..];
        let value = match rest {
            [Token::Placeholder(n)] => match self.bindings.get(*n) {
                Some(bound) => canonical_bound(bound),
                None => return Err(format!("placeholder {} has no bound value", n + 1)),
            },
            [Token::Str(s)] => Some(canonical_value(s)),
            [Token::Number(n)] => Some(canonical_value(n)),
            [Token::Symbol(sign), Token::Number(n)] if sign == "-" || sign == "+" => {
                Some(canonical_value(&format!("{}{}", sign, n)))
            }
            [word] if word.is_keyword("true") => Some("1".to_string()),
            [word] if word.is_keyword("false") => Some("0".to_string()),
            _ => None,
        };

        Ok(value.map(|value| Predicate { column, value }))
    }

    /// Tables after FROM/JOIN at any depth; primary (first top-level FROM) first.
    fn read_tables(&self) -> (Vec<String>, bool) {
        let mut nested = false;
        let mut primary: Option<String> = None;
        let mut others: Vec<String> = Vec::new();

        for i in 0..self.tokens.len() {
            let token = &self.tokens[i];
            if token.is_keyword("select") && self.depths[i] > 0 {
                nested = true;
            }
            let is_from = token.is_keyword("from");
            if !is_from && !token.is_keyword("join") {
                continue;
            }

            let mut j = i + 1;
            while let Some((name, next)) = name_at(self.tokens, j) {
                if is_from && self.depths[i] == 0 && primary.is_none() {
                    primary = Some(name);
                } else if primary.as_ref() != Some(&name) && !others.contains(&name) {
                    others.push(name);
                }
                j = skip_alias(self.tokens, next);
                if !(is_from && self.tokens.get(j).is_some_and(|t| t.is_symbol(","))) {
                    break;
                }
                j += 1;
            }
        }

        let mut tables: Vec<String> = primary.into_iter().collect();
        for name in others {
            if !tables.contains(&name) {
                tables.push(name);
            }
        }
        (tables, nested)
    }

    /// Locate the write verb and its target table.
    /// Returns (operation, verb index, table, index after the table name).
    fn write_target(&self) -> Option<(Operation, usize, String, usize)> {
        if self.tokens.first().is_some_and(|t| t.is_keyword("with")) {
            return (0..self.tokens.len())
                .find_map(|i| self.target_at(i).map(|(op, table, next)| (op, i, table, next)));
        }
        self.target_at(0).map(|(op, table, next)| (op, 0, table, next))
    }

    /// Targets of every write verb in a WITH statement
    fn cte_write_targets(&self) -> Vec<String> {
        (0..self.tokens.len())
            .filter_map(|i| self.target_at(i))
            .filter(|(op, _, _)| !matches!(op, Operation::Schema | Operation::Truncate))
            .map(|(_, table, _)| table)
            .collect()
    }

    /// Write verb at `i` and the table it targets.
    fn target_at(&self, i: usize) -> Option<(Operation, String, usize)> {
        let Token::Word(word) = self.tokens.get(i)? else {
            return None;
        };
        let operation = match word.to_ascii_lowercase().as_str() {
            "update" => Operation::Update,
            "insert" | "upsert" | "merge" => Operation::Insert,
            "replace" => Operation::Replace,
            "delete" => Operation::Delete,
            "truncate" => Operation::Truncate,
            "alter" | "drop" => Operation::Schema,
            _ => return None,
        };

        let mut j = i + 1;
        while let Some(t) = self.tokens.get(j) {
            let skippable = match operation {
                Operation::Update => {
                    ["only", "low_priority", "ignore"].iter().any(|k| t.is_keyword(k))
                }
                Operation::Insert | Operation::Replace => [
                    "into", "ignore", "low_priority", "delayed", "high_priority", "or",
                    "replace", "rollback", "abort", "fail",
                ]
                .iter()
                .any(|k| t.is_keyword(k)),
                Operation::Delete => ["from", "low_priority", "quick", "ignore", "only"]
                    .iter()
                    .any(|k| t.is_keyword(k)),
                Operation::Truncate => ["table", "only"].iter().any(|k| t.is_keyword(k)),
                Operation::Schema => {
                    ["table", "if", "exists", "only"].iter().any(|k| t.is_keyword(k))
                }
                _ => false,
            };
            if !skippable {
                break;
            }
            j += 1;
        }

        if operation == Operation::Schema
            && !self.tokens[i + 1..j].iter().any(|t| t.is_keyword("table"))
        {
            return None;
        }

        name_at(self.tokens, j).map(|(table, next)| (operation, table, next))
    }

    /// Whether a top-level UPDATE/DELETE names more than its single target:
    /// a JOIN, a table list, `UPDATE ... SET ... FROM`, `DELETE <list> FROM`
    /// or `DELETE ... USING`.
    fn writes_several_tables(&self, operation: Operation, after_name: usize) -> bool {
        let clause_end = (after_name..self.tokens.len())
            .find(|&i| {
                self.depths[i] == 0
                    && (self.tokens[i].is_keyword("where") || self.ends_clause(&self.tokens[i]))
            })
            .unwrap_or(self.tokens.len());
        let set_at = match operation {
            Operation::Update => self.top_level_index("set", after_name).filter(|&i| i < clause_end),
            _ => None,
        };

        (after_name..clause_end).any(|i| {
            if self.depths[i] != 0 {
                return false;
            }
            let token = &self.tokens[i];
            let before_set = set_at.is_none_or(|set| i < set);
            match operation {
                Operation::Update if before_set => token.is_keyword("join") || token.is_symbol(","),
                Operation::Update => token.is_keyword("from"),
                _ => {
                    token.is_keyword("from")
                        || token.is_keyword("using")
                        || token.is_keyword("join")
                        || token.is_symbol(",")
                }
            }
        })
    }

    /// Every table named by the UPDATE target list, FROM, JOIN or USING.
    fn named_tables(&self, operation: Operation, keyword_at: usize) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for i in keyword_at..self.tokens.len() {
            let token = &self.tokens[i];
            let is_verb = i == keyword_at && operation == Operation::Update;
            let lists = is_verb || token.is_keyword("from") || token.is_keyword("using");
            if !lists && !token.is_keyword("join") {
                continue;
            }

            let mut j = i + 1;
            while is_verb
                && self.tokens.get(j).is_some_and(|t| {
                    ["only", "low_priority", "ignore"].iter().any(|k| t.is_keyword(k))
                })
            {
                j += 1;
            }
            while let Some((name, next)) = name_at(self.tokens, j) {
                if !tables.contains(&name) {
                    tables.push(name);
                }
                j = skip_alias(self.tokens, next);
                if !(lists && self.tokens.get(j).is_some_and(|t| t.is_symbol(","))) {
                    break;
                }
                j += 1;
            }
        }
        tables
    }

    /// Columns assigned by `SET a = ..., b = ...`; `None` for shapes not understood.
    fn set_columns(&self, from: usize) -> Option<Vec<String>> {
        let set = self.top_level_index("set", from)?;
        let end = (set + 1..self.tokens.len())
            .find(|&i| {
                self.depths[i] == 0
                    && (self.tokens[i].is_keyword("where")
                        || self.tokens[i].is_keyword("from")
                        || self.ends_clause(&self.tokens[i]))
            })
            .unwrap_or(self.tokens.len());

        let mut columns = Vec::new();
        let mut expect_column = true;
        let mut i = set + 1;
        while i < end {
            if expect_column {
                let (column, next) = name_at(self.tokens, i)?;
                if !self.tokens.get(next).is_some_and(|t| t.is_symbol("=")) {
                    return None;
                }
                if !columns.contains(&column) {
                    columns.push(column);
                }
                expect_column = false;
                i = next + 1;
            } else {
                if self.depths[i] == 0 && self.tokens[i].is_symbol(",") {
                    expect_column = true;
                }
                i += 1;
            }
        }
        if columns.is_empty() { None } else { Some(columns) }
    }
}

/// Read a possibly qualified identifier at `i`; yields its last segment.
fn name_at(tokens: &[Token], i: usize) -> Option<(String, usize)> {
    let mut name = match tokens.get(i)? {
        Token::Word(w) if !is_reserved(w) => w.clone(),
        Token::QuotedIdent(q) => q.clone(),
        _ => return None,
    };
    let mut j = i + 1;
    while tokens.get(j).is_some_and(|t| t.is_symbol(".")) {
        match tokens.get(j + 1) {
            Some(Token::Word(w)) if !is_reserved(w) => name = w.clone(),
            Some(Token::QuotedIdent(q)) => name = q.clone(),
            _ => break,
        }
        j += 2;
    }
    Some((canonical_name(&name), j))
}

fn skip_alias(tokens: &[Token], i: usize) -> usize {
    match tokens.get(i) {
        Some(t) if t.is_keyword("as") => {
            if name_at(tokens, i + 1).is_some() { i + 2 } else { i + 1 }
        }
        Some(Token::Word(w)) if !is_reserved(w) => i + 1,
        Some(Token::QuotedIdent(_)) => i + 1,
        _ => i,
    }
}
