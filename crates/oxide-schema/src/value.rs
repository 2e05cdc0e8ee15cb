//! Value types shared by fields, defaults and the row-level boundary.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Logical kind of the values a column holds, derived from its SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Whole numbers.
    Integer,
    /// Character data.
    Text,
    /// Floating point and decimal numbers.
    Real,
    /// Raw bytes.
    Blob,
    /// Booleans (stored as 0/1).
    Boolean,
    /// Calendar dates, stored as ISO-8601 text.
    Date,
    /// Date and time, stored as ISO-8601 text.
    DateTime,
    /// Any type name not recognized above.
    Unknown,
}

impl ValueKind {
    /// Classifies a SQL type name (case-insensitive).
    ///
    /// Length or precision arguments are ignored, so `VARCHAR(255)` is text.
    /// Unrecognized names map to [`ValueKind::Unknown`].
    #[must_use]
    pub fn from_sql_type(sql_type: &str) -> Self {
        let base = sql_type
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_uppercase();
        match base.as_str() {
            "INT" | "INTEGER" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT" => Self::Integer,
            "TEXT" | "VARCHAR" | "CHAR" | "CLOB" => Self::Text,
            "REAL" | "DOUBLE" | "FLOAT" | "NUMERIC" | "DECIMAL" => Self::Real,
            "BLOB" => Self::Blob,
            "BOOLEAN" => Self::Boolean,
            "DATE" => Self::Date,
            "DATETIME" | "TIMESTAMP" => Self::DateTime,
            _ => Self::Unknown,
        }
    }

    /// Returns whether a runtime value of this kind may be stored.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Unknown, _)
                | (_, Value::Null)
                | (Self::Integer, Value::Integer(_))
                | (Self::Text, Value::Text(_))
                | (Self::Real, Value::Real(_) | Value::Integer(_))
                | (Self::Blob, Value::Blob(_))
                | (Self::Boolean, Value::Bool(_))
                | (Self::Date, Value::Date(_))
                | (Self::DateTime, Value::DateTime(_))
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Real => "real",
            Self::Blob => "blob",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A runtime column value, as exchanged with the row-level layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Integer(i64),
    /// Double precision float.
    Real(f64),
    /// Text.
    Text(String),
    /// Bytes.
    Blob(Vec<u8>),
    /// Calendar date.
    Date(NaiveDate),
    /// Date and time without timezone.
    DateTime(NaiveDateTime),
}

impl Value {
    /// Returns a short name of the value's runtime kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
        }
    }
}

/// SQL keywords evaluated by the database when a row is inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalKeyword {
    /// `CURRENT_TIMESTAMP`
    CurrentTimestamp,
    /// `CURRENT_DATE`
    CurrentDate,
    /// `CURRENT_TIME`
    CurrentTime,
}

impl TemporalKeyword {
    /// Returns the SQL keyword.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::CurrentTimestamp => "CURRENT_TIMESTAMP",
            Self::CurrentDate => "CURRENT_DATE",
            Self::CurrentTime => "CURRENT_TIME",
        }
    }

    /// Matches a keyword exactly (keywords are case-sensitive here).
    #[must_use]
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "CURRENT_TIMESTAMP" => Some(Self::CurrentTimestamp),
            "CURRENT_DATE" => Some(Self::CurrentDate),
            "CURRENT_TIME" => Some(Self::CurrentTime),
            _ => None,
        }
    }
}

/// Default value of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default, rendered as 1/0.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Real(f64),
    /// String literal. Strings equal to a temporal keyword or wrapped in
    /// parentheses are rendered verbatim.
    String(String),
    /// Raw SQL expression, rendered verbatim.
    Expression(String),
    /// `CURRENT_TIMESTAMP`, `CURRENT_DATE` or `CURRENT_TIME`.
    Temporal(TemporalKeyword),
}

impl DefaultValue {
    /// Returns the SQL text following `DEFAULT`.
    ///
    /// Keywords win over every other interpretation, then booleans, numbers,
    /// parenthesized expressions and finally quoted string literals.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Temporal(keyword) => keyword.as_sql().to_string(),
            Self::String(s) if TemporalKeyword::from_keyword(s).is_some() => s.clone(),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Real(f) if f.is_nan() => "NULL".to_string(),
            Self::Real(f) if f.is_infinite() => {
                // SQLite reads an overflowing literal as +/-Inf.
                if f.is_sign_positive() { "9e999" } else { "-9e999" }.to_string()
            }
            Self::Real(f) => f.to_string(),
            Self::String(s) if s.starts_with('(') && s.ends_with(')') => s.clone(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Null => "NULL".to_string(),
            Self::Expression(expr) => expr.clone(),
        }
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<TemporalKeyword> for DefaultValue {
    fn from(value: TemporalKeyword) -> Self {
        Self::Temporal(value)
    }
}
