//! Table-level constraints and indexes.
//!
//! Each type renders its own DDL fragment; the owning [`Table`](crate::table::Table)
//! is responsible for checking that the referenced columns exist.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Where a primary key was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryKeyOrigin {
    /// Declared on a field; rendered inline in the column definition.
    Column,
    /// Declared on the table; rendered as a `PRIMARY KEY (...)` clause.
    Table,
}

impl PrimaryKeyOrigin {
    /// Returns the origin as a lowercase word.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Column => "column",
            Self::Table => "table",
        }
    }
}

/// Primary key of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKeyConstraint {
    /// Columns in key order.
    pub columns: Vec<String>,
    /// Where the key was declared.
    pub origin: PrimaryKeyOrigin,
}

impl PrimaryKeyConstraint {
    /// Returns the table-level clause, or `None` for a field-level key.
    #[must_use]
    pub fn to_sql(&self) -> Option<String> {
        match self.origin {
            PrimaryKeyOrigin::Column => None,
            PrimaryKeyOrigin::Table => Some(format!("PRIMARY KEY ({})", self.columns.join(", "))),
        }
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql())
    }
}

impl FromStr for ForeignKeyAction {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "NO ACTION" => Ok(Self::NoAction),
            "RESTRICT" => Ok(Self::Restrict),
            "CASCADE" => Ok(Self::Cascade),
            "SET NULL" => Ok(Self::SetNull),
            "SET DEFAULT" => Ok(Self::SetDefault),
            _ => Err(SchemaError::InvalidDescription(format!(
                "unknown foreign key action '{s}'"
            ))),
        }
    }
}

/// Table-level foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Columns in the referencing table.
    pub columns: Vec<String>,
    /// Referenced table name.
    pub ref_table: String,
    /// Referenced columns, same length as `columns`.
    pub ref_columns: Vec<String>,
    /// Action on delete.
    pub on_delete: Option<ForeignKeyAction>,
    /// Action on update.
    pub on_update: Option<ForeignKeyAction>,
}

impl ForeignKey {
    /// Creates a foreign key without actions.
    #[must_use]
    pub fn new(
        columns: Vec<String>,
        ref_table: impl Into<String>,
        ref_columns: Vec<String>,
    ) -> Self {
        Self {
            columns,
            ref_table: ref_table.into(),
            ref_columns,
            on_delete: None,
            on_update: None,
        }
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = Some(action);
        self
    }

    /// Returns the `FOREIGN KEY ... REFERENCES ...` clause.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "FOREIGN KEY ({}) REFERENCES {}({})",
            self.columns.join(", "),
            self.ref_table,
            self.ref_columns.join(", ")
        );
        if let Some(action) = self.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.to_sql());
        }
        if let Some(action) = self.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.to_sql());
        }
        sql
    }
}

/// Table-level unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Columns that form the unique constraint.
    pub columns: Vec<String>,
    /// Optional constraint name.
    pub name: Option<String>,
}

impl UniqueConstraint {
    /// Returns the `[CONSTRAINT name] UNIQUE (...)` clause.
    #[must_use]
    pub fn to_sql(&self) -> String {
        format!(
            "{}UNIQUE ({})",
            constraint_prefix(self.name.as_deref()),
            self.columns.join(", ")
        )
    }
}

/// Table-level check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckConstraint {
    /// Boolean SQL expression.
    pub expression: String,
    /// Optional constraint name.
    pub name: Option<String>,
}

impl CheckConstraint {
    /// Returns the `[CONSTRAINT name] CHECK (...)` clause.
    #[must_use]
    pub fn to_sql(&self) -> String {
        format!(
            "{}CHECK ({})",
            constraint_prefix(self.name.as_deref()),
            self.expression
        )
    }
}

fn constraint_prefix(name: Option<&str>) -> String {
    name.map(|n| format!("CONSTRAINT {n} ")).unwrap_or_default()
}

/// Index on one or more columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Columns included in the index.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    pub unique: bool,
    /// Explicit name; derived from the table and columns when absent.
    pub name: Option<String>,
}

impl Index {
    /// Creates a non-unique index without an explicit name.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            unique: false,
            name: None,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets an explicit index name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the index name, deriving `idx_<table>_<columns>` when no
    /// explicit name was given. The derivation only depends on the table
    /// name and column list, so it never changes for a given index.
    #[must_use]
    pub fn resolved_name(&self, table: &str) -> Cow<'_, str> {
        match &self.name {
            Some(name) => Cow::Borrowed(name),
            None => {
                let columns: Vec<String> =
                    self.columns.iter().map(|c| c.replace(' ', "_")).collect();
                Cow::Owned(format!("idx_{}_{}", table, columns.join("_")))
            }
        }
    }

    /// Returns the `CREATE [UNIQUE] INDEX IF NOT EXISTS` statement.
    #[must_use]
    pub fn create_sql(&self, table: &str) -> String {
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {}({});",
            if self.unique { "UNIQUE " } else { "" },
            self.resolved_name(table),
            table,
            self.columns.join(", ")
        )
    }

    /// Returns the `DROP INDEX IF EXISTS` statement.
    #[must_use]
    pub fn drop_sql(&self, table: &str) -> String {
        format!("DROP INDEX IF EXISTS {};", self.resolved_name(table))
    }
}
