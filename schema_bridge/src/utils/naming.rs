//! Naming utilities for SchemaBridge
//!
//! This module provides identifier quoting for each SQL dialect and the
//! name transformations used when turning tables into Rust structs.

use inflector::Inflector;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::schema::types::Dialect;

static IDENTIFIER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

fn matches_identifier(name: &str) -> bool {
    IDENTIFIER.as_ref().map_or(false, |re| re.is_match(name))
}

/// Sanitize identifiers so they only contain ASCII letters, digits and underscores
pub fn sanitize_identifier(name: &str) -> String {
    // Remove or replace characters not allowed in identifiers
    let mut sanitized = name.replace(|c: char| !c.is_ascii_alphanumeric() && c != '_', "_");

    // Ensure identifier doesn't start with a number
    if sanitized.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        sanitized = format!("_{}", sanitized);
    }

    sanitized
}

/// Find the first pair of identifiers that collide
///
/// Returns the positions of the earlier and the later name.
pub fn find_identifier_conflict(names: &[String], ignore_case: bool) -> Option<(usize, usize)> {
    let mut seen = HashMap::<String, usize>::new();

    for (i, name) in names.iter().enumerate() {
        let key = if ignore_case { name.to_lowercase() } else { name.clone() };

        if let Some(&existing) = seen.get(&key) {
            return Some((existing, i));
        }
        seen.insert(key, i);
    }

    None
}

/// Check whether `name` is a bare identifier that needs no quoting by shape alone
pub fn is_plain_identifier(name: &str) -> bool {
    matches_identifier(name)
}

/// Check whether `name` is a valid Rust identifier token
pub fn is_valid_rust_identifier(name: &str) -> bool {
    matches_identifier(name) && name != "_" && !is_rust_keyword(name)
}

/// Check if a name is a reserved Rust keyword
pub fn is_rust_keyword(name: &str) -> bool {
    const RUST_KEYWORDS: &[&str] = &[
        "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else",
        "enum", "extern", "false", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match",
        "mod", "move", "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super",
        "trait", "true", "try", "type", "unsafe", "use", "where", "while", "yield", "abstract",
        "become", "do", "final", "macro", "override", "priv", "typeof", "unsized", "virtual",
    ];

    RUST_KEYWORDS.contains(&name)
}

/// Check if a name is a reserved SQL keyword in the given dialect
pub fn is_sql_keyword(name: &str, dialect: Dialect) -> bool {
    // Reserved in every supported dialect
    const SQL_KEYWORDS: &[&str] = &[
        "add", "all", "alter", "and", "any", "as", "asc", "between", "by", "case", "check",
        "column", "constraint", "create", "cross", "default", "delete", "desc", "distinct",
        "drop", "else", "end", "except", "exists", "foreign", "from", "full", "group", "having",
        "in", "index", "inner", "insert", "intersect", "into", "is", "join", "key", "left",
        "like", "not", "null", "on", "or", "order", "outer", "primary", "references", "right",
        "select", "set", "table", "then", "to", "union", "unique", "update", "values", "when",
        "where", "with",
    ];
    const SQLITE_KEYWORDS: &[&str] = &[
        "autoincrement", "collate", "commit", "escape", "glob", "indexed", "isnull", "limit",
        "notnull", "offset", "pragma", "raise", "regexp", "transaction", "vacuum",
    ];
    const POSTGRES_KEYWORDS: &[&str] = &[
        "analyse", "analyze", "array", "asymmetric", "both", "cast", "collate", "current_date",
        "current_role", "current_time", "current_timestamp", "current_user", "deferrable", "do",
        "false", "fetch", "for", "grant", "initially", "lateral", "leading", "limit", "localtime",
        "offset", "only", "placing", "returning", "session_user", "some", "symmetric", "true",
        "trailing", "user", "using", "variadic", "window",
    ];
    const MSSQL_KEYWORDS: &[&str] = &[
        "backup", "begin", "browse", "bulk", "cascade", "clustered", "commit", "compute",
        "contains", "current_user", "database", "dbcc", "deny", "exec", "execute", "file",
        "fillfactor", "function", "go", "goto", "grant", "identity", "kill", "load", "merge",
        "national", "nocheck", "nonclustered", "of", "off", "open", "option", "over", "percent",
        "pivot", "plan", "print", "proc", "procedure", "public", "read", "return", "rule",
        "schema", "session_user", "system_user", "top", "tran", "transaction", "trigger",
        "truncate", "user", "view", "waitfor", "while",
    ];
    const MYSQL_KEYWORDS: &[&str] = &[
        "accessible", "change", "condition", "database", "databases", "div", "dual", "explain",
        "fulltext", "interval", "keys", "kill", "limit", "lines", "load", "lock", "long",
        "match", "mod", "option", "range", "read", "regexp", "rename", "replace", "require",
        "rlike", "schema", "show", "spatial", "sql", "ssl", "straight_join", "terminated",
        "usage", "use", "using", "write", "xor", "zerofill",
    ];

    let lower = name.to_lowercase();
    let extra = match dialect {
        Dialect::Sqlite => SQLITE_KEYWORDS,
        Dialect::Postgres => POSTGRES_KEYWORDS,
        Dialect::MsSql => MSSQL_KEYWORDS,
        Dialect::MySql => MYSQL_KEYWORDS,
    };

    SQL_KEYWORDS.contains(&lower.as_str()) || extra.contains(&lower.as_str())
}

/// Format SQL identifier according to the dialect's quoting style
pub fn format_sql_identifier(name: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
        Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        Dialect::MsSql => format!("[{}]", name.replace(']', "]]")),
    }
}

/// Quote an identifier only when the dialect requires it
///
/// Quoting is applied to reserved words, to names that are not plain
/// identifiers, and on PostgreSQL to names with upper-case letters (which
/// would otherwise be folded to lower case).
pub fn quote_identifier(name: &str, dialect: Dialect) -> String {
    let needs_quotes = !is_plain_identifier(name)
        || is_sql_keyword(name, dialect)
        || (dialect == Dialect::Postgres && name.chars().any(|c| c.is_ascii_uppercase()));

    if needs_quotes {
        format_sql_identifier(name, dialect)
    } else {
        name.to_string()
    }
}

/// Rust struct name for a table: PascalCase plus a `Row` suffix
pub fn struct_name_for_table(table: &str) -> String {
    let base = sanitize_identifier(table).to_pascal_case();
    let base = if base.is_empty() { "Table".to_string() } else { base };
    let base = if base.chars().next().map_or(false, |c| c.is_ascii_digit()) {
        format!("T{}", base)
    } else {
        base
    };
    format!("{}Row", base)
}

/// Rust field name for a column: snake_case, keywords suffixed with `_`
pub fn field_name_for_column(column: &str) -> String {
    let mut name = sanitize_identifier(column).to_snake_case();
    if name.is_empty() {
        name = "column".to_string();
    }
    if name.chars().next().map_or(false, |c| c.is_ascii_digit()) {
        name = format!("_{}", name);
    }
    if !is_valid_rust_identifier(&name) {
        name.push('_');
    }
    name
}
