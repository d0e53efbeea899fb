//! CLI commands

pub mod config;
pub mod inspect;
pub mod replay;

use crate::args::StatementArgs;
use querycache_core::{BoundValue, Statement};

/// Build a statement from command-line text and `-b` values
pub(crate) fn statement_from(args: &StatementArgs) -> Statement {
    let bindings = args
        .bindings
        .iter()
        .map(|raw| BoundValue::parse_literal(raw))
        .collect();
    Statement::new(args.sql.clone(), bindings)
}
