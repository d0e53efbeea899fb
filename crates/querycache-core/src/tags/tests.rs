//! Tag extraction tests

use super::*;
use crate::error::UnifiedError;
use crate::statement::BoundValue;

fn tags(items: &[&str]) -> TagSet {
    items.iter().map(|t| Tag::new(*t)).collect()
}

fn read(sql: &str, bindings: &[BoundValue]) -> TagSet {
    TagExtractor::default().extract_tags(sql, bindings, StatementKind::Read)
}

fn write(sql: &str, bindings: &[BoundValue]) -> TagSet {
    TagExtractor::default().extract_tags(sql, bindings, StatementKind::Write)
}

#[test]
fn test_scoped_read_tags() {
    let got = read("select * from \"users\" where \"active\" = ?", &[BoundValue::Bool(true)]);
    assert_eq!(
        got,
        tags(&["query-cache", "table:users", "where:active:1", "column:users:active"])
    );
}

#[test]
fn test_multiple_equality_conditions() {
    let got = read(
        "SELECT * FROM users WHERE active = ? AND email = ?",
        &[BoundValue::Bool(true), BoundValue::Text("Test@Example.com".into())],
    );
    assert!(got.contains(&Tag::predicate("active", "1")));
    assert!(got.contains(&Tag::predicate("email", "test@example.com")));
    assert!(!got.contains(&Tag::scan("users")));
}

#[test]
fn test_literal_and_bound_values_match() {
    let literal = read("select * from users where active = 1", &[]);
    let bound = read("select * from users where active = ?", &[BoundValue::Int(1)]);
    let boolean = read("select * from users where active = true", &[]);
    assert_eq!(literal, bound);
    assert_eq!(literal, boolean);

    let float = read("select * from items where price = 2.0", &[]);
    assert!(float.contains(&Tag::predicate("price", "2")));
}

#[test]
fn test_unfiltered_read_is_a_scan() {
    let got = read("select id, name from users order by id limit 10", &[]);
    assert_eq!(got, tags(&["query-cache", "table:users", "scan:users"]));
}

#[test]
fn test_unsupported_conjuncts_are_skipped() {
    let got = read(
        "select * from users where active = ? and created_at > ? and name like ?",
        &[
            BoundValue::Int(1),
            BoundValue::Text("2024-01-01".into()),
            BoundValue::Text("a%".into()),
        ],
    );
    assert!(got.contains(&Tag::predicate("active", "1")));
    assert!(got.contains(&Tag::scan("users")));
    assert!(!got.contains(&Tag::column("users", "active")));
}

#[test]
fn test_or_predicates_produce_no_where_tags() {
    let got = read("select * from users where active = 1 or id = 2", &[]);
    assert_eq!(got, tags(&["query-cache", "table:users", "scan:users"]));
}

#[test]
fn test_between_does_not_split_conjuncts() {
    let shape = TagExtractor::default().analyze(
        "select * from users where age between 1 and 9 and team = 'red'",
        &[],
        StatementKind::Read,
    );
    assert_eq!(
        shape.predicates,
        vec![Predicate {
            column: "team".into(),
            value: "red".into()
        }]
    );
    assert!(!shape.fully_scoped);
}

#[test]
fn test_joins_tag_every_table() {
    let got = read(
        "select u.* from users u join posts p on p.user_id = u.id where u.active = 1",
        &[],
    );
    assert!(got.contains(&Tag::table("users")));
    assert!(got.contains(&Tag::table("posts")));
    assert!(got.contains(&Tag::scan("users")));
    assert!(got.contains(&Tag::scan("posts")));
    assert!(!got.iter().any(|t| t.as_str().starts_with("where:")));
}

#[test]
fn test_subquery_tables_are_dependencies() {
    let got = read(
        "select * from users where id in (select user_id from orders where total = 5)",
        &[],
    );
    assert!(got.contains(&Tag::table("orders")));
    assert!(got.contains(&Tag::scan("users")));
}

#[test]
fn test_comma_joined_and_qualified_tables() {
    let shape = TagExtractor::default().analyze(
        "select * from public.users as u, \"Teams\" t where u.team_id = t.id",
        &[],
        StatementKind::Read,
    );
    assert_eq!(shape.tables, vec!["users".to_string(), "teams".to_string()]);
    assert!(shape.multi_table);
}

#[test]
fn test_scoped_update_invalidation() {
    let got = write(
        "update users set name = ? where active = ?",
        &[BoundValue::Text("John".into()), BoundValue::Bool(true)],
    );
    assert_eq!(
        got,
        tags(&["where:active:1", "scan:users", "column:users:name"])
    );
}

#[test]
fn test_scoped_delete_invalidation() {
    let got = write("DELETE FROM users WHERE id = ?", &[BoundValue::Int(9)]);
    assert_eq!(got, tags(&["where:id:9", "scan:users"]));
}

#[test]
fn test_unscoped_writes_flush_the_table() {
    assert_eq!(
        write("insert into users (name) values (?)", &[BoundValue::Text("a".into())]),
        tags(&["table:users"])
    );
    assert_eq!(
        write("update users set active = 0 where last_login < ?", &[BoundValue::Int(5)]),
        tags(&["table:users"])
    );
    assert_eq!(write("delete from users", &[]), tags(&["table:users"]));
    assert_eq!(write("TRUNCATE TABLE sessions", &[]), tags(&["table:sessions"]));
    assert_eq!(
        write("INSERT OR REPLACE INTO `cache` (k) VALUES (1)", &[]),
        tags(&["table:cache"])
    );
}

#[test]
fn test_table_scoped_mode_disables_predicate_invalidation() {
    let extractor = TagExtractor::new(false);
    let got = extractor.extract_tags(
        "update users set name = 'x' where active = 1",
        &[],
        StatementKind::Write,
    );
    assert_eq!(got, tags(&["table:users"]));
}

#[test]
fn test_placeholder_ordinals_skip_set_clause() {
    let shape = TagExtractor::default().analyze(
        "update users set name = ?, email = ? where id = ?",
        &[
            BoundValue::Text("a".into()),
            BoundValue::Text("b".into()),
            BoundValue::Int(3),
        ],
        StatementKind::Write,
    );
    assert_eq!(shape.predicates[0].value, "3");
    assert_eq!(
        shape.set_columns,
        Some(vec!["name".to_string(), "email".to_string()])
    );
}

#[test]
fn test_degraded_read_keeps_table_tag() {
    let extractor = TagExtractor::default();
    let shape = extractor.analyze("select * from users where name = 'oops", &[], StatementKind::Read);
    assert!(shape.degraded.is_some());
    assert_eq!(
        extractor.storage_tags(&shape),
        tags(&["query-cache", "table:users", "scan:users"])
    );
}

#[test]
fn test_missing_binding_degrades() {
    let shape = TagExtractor::default().analyze(
        "select * from users where id = ?",
        &[],
        StatementKind::Read,
    );
    assert!(shape.degraded.as_deref().unwrap().contains("no bound value"));
    assert_eq!(shape.tables, vec!["users".to_string()]);
}

#[test]
fn test_unbalanced_write_flushes_table() {
    assert_eq!(
        write("update users set a = (1 where id = 1", &[]),
        tags(&["table:users"])
    );
}

#[test]
fn test_unknown_write_target_flushes_everything() {
    assert_eq!(write("drop index idx_users_email", &[]), tags(&["query-cache"]));
}

#[test]
fn test_degraded_write_uses_fallback_table() {
    assert_eq!(
        write("update users set name = 'broken where id = 1", &[]),
        tags(&["table:users"])
    );
}

#[test]
fn test_read_without_table() {
    assert_eq!(read("select 1", &[]), tags(&["query-cache"]));
}

#[test]
fn test_other_statements_only_carry_base_tag() {
    let got = TagExtractor::default().extract_tags("BEGIN", &[], StatementKind::Other);
    assert_eq!(got, tags(&["query-cache"]));
}

#[test]
fn test_read_and_write_tags_are_symmetric() {
    let extractor = TagExtractor::default();
    let stored = extractor.extract_tags(
        "select * from users where email = ?",
        &[BoundValue::Text("A@x.io".into())],
        StatementKind::Read,
    );
    let flushed = extractor.extract_tags(
        "delete from users where email = 'a@x.io'",
        &[],
        StatementKind::Write,
    );
    assert!(stored.intersection(&flushed).next().is_some());
}

#[test]
fn test_column_sweep_skips_write_predicate_columns() {
    let extractor = TagExtractor::default();
    let shape = extractor.analyze(
        "update users set name = ? where active = ?",
        &[BoundValue::Text("zed".into()), BoundValue::Int(1)],
        StatementKind::Write,
    );
    let sweep = extractor.column_sweep(&shape).unwrap();

    assert_eq!(sweep.table(), "users");
    assert_eq!(sweep.prefix(), "column:users:");
    assert!(sweep.covers(&Tag::column("users", "id")));
    assert!(sweep.covers(&Tag::column("users", "email")));
    assert!(!sweep.covers(&Tag::column("users", "active")));
    assert!(!sweep.covers(&Tag::column("posts", "id")));
    assert!(!sweep.covers(&Tag::table("users")));
}

#[test]
fn test_table_writes_need_no_column_sweep() {
    let extractor = TagExtractor::default();
    for sql in [
        "insert into users (name) values ('a')",
        "update users set active = 0 where last_login < 5",
        "delete from users",
    ] {
        let shape = extractor.analyze(sql, &[], StatementKind::Write);
        assert!(extractor.column_sweep(&shape).is_none(), "{}", sql);
    }

    let table_mode = TagExtractor::new(false);
    let shape = table_mode.analyze("delete from users where id = 1", &[], StatementKind::Write);
    assert!(table_mode.column_sweep(&shape).is_none());
}

#[test]
fn test_guard_tags_add_scan_per_table() {
    let extractor = TagExtractor::default();
    let shape = extractor.analyze(
        "select * from users u join posts p on p.user_id = u.id where u.id = 1",
        &[],
        StatementKind::Read,
    );
    let guard = extractor.guard_tags(&shape);
    assert!(guard.contains(&Tag::scan("users")));
    assert!(guard.contains(&Tag::scan("posts")));
    assert!(extractor.storage_tags(&shape).is_subset(&guard));
}

#[test]
fn test_update_join_flushes_every_table() {
    let extractor = TagExtractor::default();
    let shape = extractor.analyze(
        "UPDATE users u JOIN orders o ON o.user_id = u.id SET o.status = ? WHERE u.id = ?",
        &[BoundValue::Text("void".into()), BoundValue::Int(5)],
        StatementKind::Write,
    );
    assert!(shape.multi_table);
    assert!(!shape.fully_scoped);
    assert_eq!(shape.tables, vec!["users".to_string(), "orders".to_string()]);
    assert_eq!(
        extractor.invalidation_tags(&shape),
        tags(&["table:users", "table:orders"])
    );
    assert!(extractor.column_sweep(&shape).is_none());
}

#[test]
fn test_multi_table_write_forms() {
    assert_eq!(
        write(
            "DELETE u, o FROM users u JOIN orders o ON o.user_id = u.id WHERE u.id = ?",
            &[BoundValue::Int(5)],
        ),
        tags(&["table:users", "table:orders"])
    );
    assert_eq!(
        write("update users, orders set orders.total = 0 where users.id = orders.user_id", &[]),
        tags(&["table:users", "table:orders"])
    );
    assert_eq!(
        write(
            "update orders set status = 'void' from users where users.id = orders.user_id and users.id = 1",
            &[],
        ),
        tags(&["table:orders", "table:users"])
    );
    assert_eq!(
        write("delete from orders using users where users.id = orders.user_id and users.id = 1", &[]),
        tags(&["table:orders", "table:users"])
    );
    assert_eq!(
        write(
            "with moved as (delete from carts where id = 1 returning *) insert into orders select * from moved",
            &[],
        ),
        tags(&["table:carts", "table:orders"])
    );
}

#[test]
fn test_degradation_carries_code_and_statement() {
    let sql = "select * from users where id = ?";
    let shape = TagExtractor::default().analyze(sql, &[], StatementKind::Read);
    let err = shape.degradation(sql).unwrap();

    assert_eq!(err.error_code(), "QC_PARSE_DEGRADED");
    assert_eq!(err.context(), Some(sql));
    assert!(err.message().contains("no bound value"));

    let clean = TagExtractor::default().analyze("select * from users", &[], StatementKind::Read);
    assert!(clean.degradation("select * from users").is_none());
}
