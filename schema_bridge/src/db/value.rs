//! Dialect-neutral column values
//!
//! `SqlValue` is what crosses the connection boundary in both directions:
//! bound parameters going in, decoded cells coming out.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::schema::types::SemanticType;

/// A single column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Binary(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Semantic type of a non-null value
    pub fn semantic_type(&self) -> Option<SemanticType> {
        match self {
            SqlValue::Null => None,
            SqlValue::Integer(_) => Some(SemanticType::Integer),
            SqlValue::Float(_) => Some(SemanticType::Float),
            SqlValue::Text(_) => Some(SemanticType::Text),
            SqlValue::Boolean(_) => Some(SemanticType::Boolean),
            SqlValue::Date(_) => Some(SemanticType::Date),
            SqlValue::DateTime(_) => Some(SemanticType::DateTime),
            SqlValue::Binary(_) => Some(SemanticType::Binary),
        }
    }

    /// Interpret a catalog flag column
    ///
    /// Catalogs disagree on how they spell yes and no: `'YES'`/`'NO'`
    /// strings, `0`/`1` integers, or real booleans.
    pub fn as_flag(&self) -> bool {
        match self {
            SqlValue::Boolean(b) => *b,
            SqlValue::Integer(i) => *i != 0,
            SqlValue::Float(f) => *f != 0.0,
            SqlValue::Text(s) => matches!(
                s.trim().to_ascii_uppercase().as_str(),
                "YES" | "Y" | "TRUE" | "T" | "1"
            ),
            _ => false,
        }
    }

    /// Text content of a value, if it has a natural text form
    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Binary(bytes) => String::from_utf8(bytes.clone()).ok(),
            other => Some(other.to_string()),
        }
    }

    /// Stable key used to compare values across reads and writes
    pub(crate) fn key_repr(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Binary(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
            SqlValue::Boolean(b) => (*b as i64).to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Float(x) => write!(f, "{}", x),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Boolean(b) => write!(f, "{}", b),
            SqlValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Conversion of a Rust value into a bindable `SqlValue`
pub trait ToSqlValue {
    fn to_sql_value(&self) -> SqlValue;
}

/// Conversion of a decoded `SqlValue` back into a Rust value
pub trait FromSqlValue: Sized {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self>;
}

fn mismatch(column: &str, expected: &str) -> Error {
    Error::DecodeError {
        column: column.to_string(),
        expected: expected.to_string(),
    }
}

macro_rules! integer_value {
    ($($ty:ty),*) => {
        $(
            impl ToSqlValue for $ty {
                fn to_sql_value(&self) -> SqlValue {
                    SqlValue::Integer(*self as i64)
                }
            }

            impl FromSqlValue for $ty {
                fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self> {
                    let wide = match value {
                        SqlValue::Integer(i) => *i,
                        SqlValue::Boolean(b) => *b as i64,
                        SqlValue::Text(s) => s.trim().parse::<i64>().map_err(|_| mismatch(column, stringify!($ty)))?,
                        _ => return Err(mismatch(column, stringify!($ty))),
                    };
                    <$ty>::try_from(wide).map_err(|_| mismatch(column, stringify!($ty)))
                }
            }
        )*
    };
}

integer_value!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! float_value {
    ($($ty:ty),*) => {
        $(
            impl ToSqlValue for $ty {
                fn to_sql_value(&self) -> SqlValue {
                    SqlValue::Float(*self as f64)
                }
            }

            impl FromSqlValue for $ty {
                fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self> {
                    match value {
                        SqlValue::Float(x) => Ok(*x as $ty),
                        SqlValue::Integer(i) => Ok(*i as $ty),
                        SqlValue::Text(s) => s.trim().parse::<$ty>().map_err(|_| mismatch(column, stringify!($ty))),
                        _ => Err(mismatch(column, stringify!($ty))),
                    }
                }
            }
        )*
    };
}

float_value!(f32, f64);

impl ToSqlValue for String {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Text(self.clone())
    }
}

impl FromSqlValue for String {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Null => Err(mismatch(column, "String")),
            other => other.as_text().ok_or_else(|| mismatch(column, "String")),
        }
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Text(self.to_string())
    }
}

impl ToSqlValue for bool {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Boolean(*self)
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Boolean(b) => Ok(*b),
            // SQLite and MySQL store booleans as integers
            SqlValue::Integer(i) => Ok(*i != 0),
            SqlValue::Text(_) => Ok(value.as_flag()),
            _ => Err(mismatch(column, "bool")),
        }
    }
}

impl ToSqlValue for NaiveDate {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Date(*self)
    }
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Date(d) => Ok(*d),
            SqlValue::DateTime(dt) => Ok(dt.date()),
            SqlValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|_| mismatch(column, "NaiveDate")),
            _ => Err(mismatch(column, "NaiveDate")),
        }
    }
}

impl ToSqlValue for NaiveDateTime {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::DateTime(*self)
    }
}

impl FromSqlValue for NaiveDateTime {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self> {
        const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

        match value {
            SqlValue::DateTime(dt) => Ok(*dt),
            SqlValue::Date(d) => d.and_hms_opt(0, 0, 0).ok_or_else(|| mismatch(column, "NaiveDateTime")),
            SqlValue::Text(s) => FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(s.trim(), format).ok())
                .ok_or_else(|| mismatch(column, "NaiveDateTime")),
            _ => Err(mismatch(column, "NaiveDateTime")),
        }
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(&self) -> SqlValue {
        SqlValue::Binary(self.clone())
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Binary(bytes) => Ok(bytes.clone()),
            SqlValue::Text(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(mismatch(column, "Vec<u8>")),
        }
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(&self) -> SqlValue {
        match self {
            Some(value) => value.to_sql_value(),
            None => SqlValue::Null,
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(column: &str, value: &SqlValue) -> Result<Self> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(column, other).map(Some),
        }
    }
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(&self) -> SqlValue {
        self.clone()
    }
}

impl FromSqlValue for SqlValue {
    fn from_sql_value(_column: &str, value: &SqlValue) -> Result<Self> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_flags() {
        assert!(SqlValue::Text("YES".to_string()).as_flag());
        assert!(!SqlValue::Text("NO".to_string()).as_flag());
        assert!(SqlValue::Integer(1).as_flag());
        assert!(!SqlValue::Integer(0).as_flag());
        assert!(SqlValue::Boolean(true).as_flag());
        assert!(!SqlValue::Null.as_flag());
    }

    #[test]
    fn test_decoding_across_storage_classes() {
        assert!(bool::from_sql_value("paid", &SqlValue::Integer(1)).unwrap());
        assert_eq!(i32::from_sql_value("n", &SqlValue::Integer(42)).unwrap(), 42);
        assert!(u8::from_sql_value("n", &SqlValue::Integer(-1)).is_err());
        assert_eq!(
            NaiveDate::from_sql_value("d", &SqlValue::Text("2024-02-29".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert_eq!(
            Option::<String>::from_sql_value("name", &SqlValue::Null).unwrap(),
            None
        );
        assert!(String::from_sql_value("name", &SqlValue::Null).is_err());
    }

    #[test]
    fn test_key_repr() {
        assert_eq!(SqlValue::Boolean(true).key_repr(), "1");
        assert_eq!(SqlValue::Binary(vec![0xde, 0xad]).key_repr(), "dead");
        assert_eq!(SqlValue::Text("a".to_string()).key_repr(), "a");
    }
}
