//! Mapping between semantic types and dialect SQL type names
//!
//! Every `(SemanticType, Dialect)` pair has exactly one canonical spelling
//! used when generating DDL. The reverse direction accepts the common aliases
//! each database reports, after normalising case, whitespace and size
//! arguments. A name that is not in the alias table is an error; callers that
//! want a fallback (the parser and introspector) decide that themselves.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::schema::types::{Dialect, SemanticType};

/// Canonical SQL type name for a semantic type in a dialect
pub fn to_sql_type(semantic_type: SemanticType, dialect: Dialect) -> &'static str {
    use SemanticType::*;

    match dialect {
        Dialect::Sqlite => match semantic_type {
            Integer => "INTEGER",
            Float => "REAL",
            Text => "TEXT",
            Boolean => "BOOLEAN",
            Date => "DATE",
            DateTime => "DATETIME",
            Binary => "BLOB",
        },
        Dialect::Postgres => match semantic_type {
            Integer => "BIGINT",
            Float => "DOUBLE PRECISION",
            Text => "TEXT",
            Boolean => "BOOLEAN",
            Date => "DATE",
            DateTime => "TIMESTAMP",
            Binary => "BYTEA",
        },
        Dialect::MsSql => match semantic_type {
            Integer => "BIGINT",
            Float => "FLOAT",
            Text => "NVARCHAR(255)",
            Boolean => "BIT",
            Date => "DATE",
            DateTime => "DATETIME2",
            Binary => "VARBINARY(MAX)",
        },
        Dialect::MySql => match semantic_type {
            Integer => "BIGINT",
            Float => "DOUBLE",
            Text => "VARCHAR(255)",
            Boolean => "BOOLEAN",
            Date => "DATE",
            DateTime => "DATETIME",
            Binary => "BLOB",
        },
    }
}

type AliasTable = HashMap<&'static str, SemanticType>;

fn alias_table(entries: &[(&'static str, SemanticType)]) -> AliasTable {
    entries.iter().copied().collect()
}

static SQLITE_ALIASES: Lazy<AliasTable> = Lazy::new(|| {
    use SemanticType::*;
    alias_table(&[
        ("int", Integer),
        ("integer", Integer),
        ("tinyint", Integer),
        ("smallint", Integer),
        ("mediumint", Integer),
        ("bigint", Integer),
        ("int2", Integer),
        ("int4", Integer),
        ("int8", Integer),
        ("real", Float),
        ("double", Float),
        ("double precision", Float),
        ("float", Float),
        ("numeric", Float),
        ("decimal", Float),
        ("text", Text),
        ("varchar", Text),
        ("varying character", Text),
        ("character", Text),
        ("char", Text),
        ("nchar", Text),
        ("native character", Text),
        ("nvarchar", Text),
        ("clob", Text),
        ("boolean", Boolean),
        ("bool", Boolean),
        ("date", Date),
        ("datetime", DateTime),
        ("timestamp", DateTime),
        ("blob", Binary),
    ])
});

static POSTGRES_ALIASES: Lazy<AliasTable> = Lazy::new(|| {
    use SemanticType::*;
    alias_table(&[
        ("smallint", Integer),
        ("integer", Integer),
        ("int", Integer),
        ("bigint", Integer),
        ("int2", Integer),
        ("int4", Integer),
        ("int8", Integer),
        ("smallserial", Integer),
        ("serial", Integer),
        ("bigserial", Integer),
        ("serial2", Integer),
        ("serial4", Integer),
        ("serial8", Integer),
        ("real", Float),
        ("float", Float),
        ("float4", Float),
        ("float8", Float),
        ("double precision", Float),
        ("numeric", Float),
        ("decimal", Float),
        ("text", Text),
        ("varchar", Text),
        ("character varying", Text),
        ("char", Text),
        ("character", Text),
        ("bpchar", Text),
        ("citext", Text),
        ("name", Text),
        ("boolean", Boolean),
        ("bool", Boolean),
        ("date", Date),
        ("timestamp", DateTime),
        ("timestamp without time zone", DateTime),
        ("timestamp with time zone", DateTime),
        ("timestamptz", DateTime),
        ("bytea", Binary),
    ])
});

static MSSQL_ALIASES: Lazy<AliasTable> = Lazy::new(|| {
    use SemanticType::*;
    alias_table(&[
        ("tinyint", Integer),
        ("smallint", Integer),
        ("int", Integer),
        ("integer", Integer),
        ("bigint", Integer),
        ("float", Float),
        ("real", Float),
        ("double precision", Float),
        ("decimal", Float),
        ("numeric", Float),
        ("money", Float),
        ("smallmoney", Float),
        ("nvarchar", Text),
        ("varchar", Text),
        ("nchar", Text),
        ("char", Text),
        ("ntext", Text),
        ("text", Text),
        ("sysname", Text),
        ("uniqueidentifier", Text),
        ("bit", Boolean),
        ("date", Date),
        ("datetime", DateTime),
        ("datetime2", DateTime),
        ("smalldatetime", DateTime),
        ("datetimeoffset", DateTime),
        ("varbinary", Binary),
        ("binary", Binary),
        ("image", Binary),
    ])
});

static MYSQL_ALIASES: Lazy<AliasTable> = Lazy::new(|| {
    use SemanticType::*;
    alias_table(&[
        ("tinyint", Integer),
        ("smallint", Integer),
        ("mediumint", Integer),
        ("int", Integer),
        ("integer", Integer),
        ("bigint", Integer),
        ("float", Float),
        ("double", Float),
        ("double precision", Float),
        ("real", Float),
        ("decimal", Float),
        ("numeric", Float),
        ("varchar", Text),
        ("char", Text),
        ("text", Text),
        ("tinytext", Text),
        ("mediumtext", Text),
        ("longtext", Text),
        ("enum", Text),
        ("boolean", Boolean),
        ("bool", Boolean),
        ("date", Date),
        ("datetime", DateTime),
        ("timestamp", DateTime),
        ("blob", Binary),
        ("tinyblob", Binary),
        ("mediumblob", Binary),
        ("longblob", Binary),
        ("binary", Binary),
        ("varbinary", Binary),
    ])
});

fn aliases(dialect: Dialect) -> &'static AliasTable {
    match dialect {
        Dialect::Sqlite => &SQLITE_ALIASES,
        Dialect::Postgres => &POSTGRES_ALIASES,
        Dialect::MsSql => &MSSQL_ALIASES,
        Dialect::MySql => &MYSQL_ALIASES,
    }
}

/// Normalise a raw SQL type name for lookup
///
/// Lower-cases, strips parenthesised arguments, drops sign and zero-fill
/// modifiers, and collapses whitespace. Returns the normalised name together
/// with the argument text (without parentheses) if there was any.
pub fn normalize_type_name(raw: &str) -> (String, Option<String>) {
    let lower = raw.trim().to_lowercase();
    let mut base = String::with_capacity(lower.len());
    let mut args = String::new();
    let mut depth = 0usize;
    let mut saw_args = false;

    for c in lower.chars() {
        match c {
            '(' => {
                if depth > 0 {
                    args.push(c);
                }
                depth += 1;
                saw_args = true;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                if depth > 0 {
                    args.push(c);
                }
            }
            _ if depth > 0 => args.push(c),
            _ => base.push(c),
        }
    }

    let words: Vec<&str> = base
        .split_whitespace()
        .filter(|w| !matches!(*w, "unsigned" | "signed" | "zerofill"))
        .collect();

    let args = if saw_args {
        Some(args.split_whitespace().collect::<Vec<_>>().join(" "))
    } else {
        None
    };

    (words.join(" "), args)
}

/// Semantic type for a raw SQL type name in a dialect
pub fn from_sql_type(raw: &str, dialect: Dialect) -> Result<SemanticType> {
    let (name, args) = normalize_type_name(raw);

    // Single-bit integers are how MySQL spells booleans
    if dialect == Dialect::MySql
        && matches!(name.as_str(), "tinyint" | "bit")
        && args.as_deref() == Some("1")
    {
        return Ok(SemanticType::Boolean);
    }

    aliases(dialect)
        .get(name.as_str())
        .copied()
        .ok_or_else(|| Error::UnsupportedType {
            type_name: raw.trim().to_string(),
            dialect,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_canonical_names_round_trip() {
        for dialect in Dialect::ALL {
            for semantic_type in SemanticType::ALL {
                let sql = to_sql_type(semantic_type, dialect);
                assert_eq!(
                    from_sql_type(sql, dialect).unwrap(),
                    semantic_type,
                    "{} in {}",
                    sql,
                    dialect
                );
            }
        }
    }

    #[rstest]
    #[case("INT", Dialect::Sqlite, SemanticType::Integer)]
    #[case("varchar(100)", Dialect::Sqlite, SemanticType::Text)]
    #[case("DECIMAL(10, 2)", Dialect::Sqlite, SemanticType::Float)]
    #[case("character varying(64)", Dialect::Postgres, SemanticType::Text)]
    #[case("timestamp  with time zone", Dialect::Postgres, SemanticType::DateTime)]
    #[case("int UNSIGNED", Dialect::MySql, SemanticType::Integer)]
    #[case("tinyint(1)", Dialect::MySql, SemanticType::Boolean)]
    #[case("tinyint(4)", Dialect::MySql, SemanticType::Integer)]
    #[case("bit(1)", Dialect::MySql, SemanticType::Boolean)]
    #[case("NVARCHAR(MAX)", Dialect::MsSql, SemanticType::Text)]
    #[case("uniqueidentifier", Dialect::MsSql, SemanticType::Text)]
    fn test_aliases(#[case] raw: &str, #[case] dialect: Dialect, #[case] expected: SemanticType) {
        assert_eq!(from_sql_type(raw, dialect).unwrap(), expected);
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        match from_sql_type("GEOGRAPHY", Dialect::MsSql) {
            Err(Error::UnsupportedType { type_name, dialect }) => {
                assert_eq!(type_name, "GEOGRAPHY");
                assert_eq!(dialect, Dialect::MsSql);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        // Aliases are per dialect
        assert!(from_sql_type("bytea", Dialect::MySql).is_err());
    }

    #[test]
    fn test_normalize_type_name() {
        assert_eq!(
            normalize_type_name(" Numeric( 10 , 2 ) "),
            ("numeric".to_string(), Some("10 , 2".to_string()))
        );
        assert_eq!(normalize_type_name("BIGINT"), ("bigint".to_string(), None));
    }
}
