//! Column definitions.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::value::{DefaultValue, Value, ValueKind};

const PRIMARY_KEY_TOKEN: &str = "PRIMARY KEY";
const UNIQUE_TOKEN: &str = "UNIQUE";
const NOT_NULL_TOKEN: &str = "NOT NULL";

/// Text format used for datetimes handed to the database.
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Schema definition for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Declared SQL type, kept verbatim.
    pub sql_type: String,
    /// Field-level primary key.
    pub primary_key: bool,
    /// Whether the column has a UNIQUE constraint.
    pub unique: bool,
    /// Whether the column rejects NULL.
    pub not_null: bool,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Check constraint expression.
    pub check: Option<String>,
}

impl Field {
    /// Creates a new nullable field without constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            primary_key: false,
            unique: false,
            not_null: false,
            default: None,
            check: None,
        }
    }

    /// Marks the field as the table's primary key. Implies NOT NULL.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Sets the field as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the field as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets a check constraint.
    #[must_use]
    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check = Some(expr.into());
        self
    }

    /// Whether NULL is rejected, taking the primary key into account.
    #[must_use]
    pub fn is_not_null(&self) -> bool {
        self.not_null || self.primary_key
    }

    /// Returns the column definition used in `CREATE TABLE` and
    /// `ALTER TABLE ... ADD COLUMN`.
    #[must_use]
    pub fn column_definition(&self) -> String {
        let mut parts = vec![self.name.clone(), self.sql_type.clone()];

        if self.primary_key {
            parts.push(PRIMARY_KEY_TOKEN.to_string());
        }
        if self.unique {
            parts.push(UNIQUE_TOKEN.to_string());
        }
        if self.is_not_null() {
            parts.push(NOT_NULL_TOKEN.to_string());
        }
        if let Some(default) = &self.default {
            parts.push(format!("DEFAULT {}", default.to_sql()));
        }
        if let Some(check) = &self.check {
            parts.push(format!("CHECK ({check})"));
        }

        parts.join(" ")
    }

    /// Returns the logical kind of the values this field holds.
    #[must_use]
    pub fn value_kind(&self) -> ValueKind {
        ValueKind::from_sql_type(&self.sql_type)
    }

    /// Checks a value before it is written to this column.
    ///
    /// The check expression itself is evaluated by the database, not here.
    pub fn validate_value(&self, value: &Value) -> Result<()> {
        if matches!(value, Value::Null) {
            if self.is_not_null() {
                return Err(SchemaError::NullValue(self.name.clone()));
            }
            return Ok(());
        }

        let expected = self.value_kind();
        if !expected.accepts(value) {
            return Err(SchemaError::ValueKindMismatch {
                field: self.name.clone(),
                expected,
                actual: value.kind_name(),
            });
        }
        Ok(())
    }

    /// Converts a value into its stored representation.
    ///
    /// Dates and datetimes become ISO-8601 text, booleans become 0/1.
    #[must_use]
    pub fn encode(&self, value: Value) -> Value {
        match value {
            Value::Date(date) => Value::Text(date.format("%Y-%m-%d").to_string()),
            Value::DateTime(datetime) => Value::Text(datetime.format(DATETIME_FORMAT).to_string()),
            Value::Bool(b) => Value::Integer(i64::from(b)),
            other => other,
        }
    }

    /// Converts a stored value back into its logical representation.
    pub fn decode(&self, value: Value) -> Result<Value> {
        match (self.value_kind(), value) {
            (ValueKind::Date, Value::Text(text)) => text
                .parse::<NaiveDate>()
                .map(Value::Date)
                .map_err(|e| self.invalid_value(&text, &e)),
            (ValueKind::DateTime, Value::Text(text)) => text
                .parse::<NaiveDateTime>()
                .or_else(|_| NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f"))
                .map(Value::DateTime)
                .map_err(|e| self.invalid_value(&text, &e)),
            (ValueKind::Boolean, Value::Integer(i)) => Ok(Value::Bool(i != 0)),
            (_, other) => Ok(other),
        }
    }

    fn invalid_value(&self, text: &str, err: &dyn std::fmt::Display) -> SchemaError {
        SchemaError::InvalidValue {
            field: self.name.clone(),
            value: text.to_string(),
            message: err.to_string(),
        }
    }
}
