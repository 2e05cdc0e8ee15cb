//! Additive auto-migration planning.
//!
//! [`plan_migration`] compares a declared [`Database`] with a [`LiveSchema`]
//! and returns the statements that bring the live database up to date,
//! without touching it. Only missing tables and missing columns are acted
//! upon; every other difference becomes a [`SchemaWarning`].

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::database::Database;
use crate::introspect::{LiveSchema, LiveTable, is_internal_table};
use crate::table::Table;

/// A difference the planner reports but never acts upon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaWarning {
    /// A column's live type differs from the declared one.
    TypeMismatch {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Declared type.
        declared: String,
        /// Live type.
        live: String,
    },
    /// A live table is absent from the declared structure.
    DeprecatedTable {
        /// Table name.
        table: String,
    },
    /// A live column is absent from the declared table.
    UnsupportedColumnRemoval {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// The declared foreign keys differ from the live ones.
    UnsupportedForeignKeyChange {
        /// Table name.
        table: String,
    },
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch {
                table,
                column,
                declared,
                live,
            } => write!(
                f,
                "Type mismatch for column '{column}' in table '{table}': declared {declared}, found {live}"
            ),
            Self::DeprecatedTable { table } => {
                write!(f, "Table '{table}' exists in the database but not in the structure")
            }
            Self::UnsupportedColumnRemoval { table, column } => write!(
                f,
                "Column '{column}' of table '{table}' is not declared; column removal is not supported"
            ),
            Self::UnsupportedForeignKeyChange { table } => write!(
                f,
                "Foreign keys of table '{table}' changed; foreign key migration is not supported"
            ),
        }
    }
}

/// One unit of work. Each step is applied atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MigrationStep {
    /// Create a missing table and its indexes.
    CreateTable {
        /// Table name.
        table: String,
        /// `CREATE TABLE` followed by the `CREATE INDEX` statements.
        statements: Vec<String>,
    },
    /// Add a missing column.
    AddColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// `ALTER TABLE ... ADD COLUMN` statement.
        sql: String,
    },
}

impl MigrationStep {
    /// Name of the table this step modifies.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. } | Self::AddColumn { table, .. } => table,
        }
    }

    /// Statements to execute, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<&str> {
        match self {
            Self::CreateTable { statements, .. } => statements.iter().map(String::as_str).collect(),
            Self::AddColumn { sql, .. } => vec![sql.as_str()],
        }
    }
}

/// Result of [`plan_migration`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    /// Steps in table creation order.
    pub steps: Vec<MigrationStep>,
    /// Differences left untouched.
    pub warnings: Vec<SchemaWarning>,
}

impl MigrationPlan {
    /// Whether the plan has nothing to execute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All statements of all steps, in order.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().flat_map(MigrationStep::statements)
    }
}

/// What a migration run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Statements that were executed successfully.
    pub statements: Vec<String>,
    /// Differences left untouched.
    pub warnings: Vec<SchemaWarning>,
    /// Tables that were created.
    pub created_tables: Vec<String>,
    /// `(table, column)` pairs that were added.
    pub added_columns: Vec<(String, String)>,
    /// `(table, error)` pairs for steps that failed and were rolled back.
    pub failed_tables: Vec<(String, String)>,
}

impl MigrationReport {
    /// Whether nothing was executed and nothing was reported.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.statements.is_empty() && self.warnings.is_empty() && self.failed_tables.is_empty()
    }
}

/// Uppercases and collapses whitespace so `varchar( 255 )` and
/// `VARCHAR(255)` compare equal.
fn normalize_type(sql_type: &str) -> String {
    sql_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace("( ", "(")
        .replace(" )", ")")
        .replace(" (", "(")
        .replace(", ", ",")
        .to_ascii_uppercase()
}

/// Plans the additive migration of `live` towards `declared`.
#[must_use]
pub fn plan_migration(declared: &Database, live: &LiveSchema) -> MigrationPlan {
    let mut plan = MigrationPlan::default();

    for table in declared.creation_order() {
        match live.table(table.name()) {
            None => {
                let mut statements = vec![table.create_table_sql()];
                statements.extend(table.create_index_sqls());
                plan.steps.push(MigrationStep::CreateTable {
                    table: table.name().to_string(),
                    statements,
                });
            }
            Some(live_table) => diff_table(table, live_table, &mut plan),
        }
    }

    for name in live.tables.keys() {
        if declared.table(name).is_none() && !is_internal_table(name) {
            plan.warnings.push(SchemaWarning::DeprecatedTable {
                table: name.clone(),
            });
        }
    }

    plan
}

fn diff_table(table: &Table, live: &LiveTable, plan: &mut MigrationPlan) {
    for field in table.fields() {
        match live.column(&field.name) {
            None => plan.steps.push(MigrationStep::AddColumn {
                table: table.name().to_string(),
                column: field.name.clone(),
                sql: table.add_column_sql(field),
            }),
            Some(column) if normalize_type(&column.sql_type) != normalize_type(&field.sql_type) => {
                plan.warnings.push(SchemaWarning::TypeMismatch {
                    table: table.name().to_string(),
                    column: field.name.clone(),
                    declared: field.sql_type.clone(),
                    live: column.sql_type.clone(),
                });
            }
            Some(_) => {}
        }
    }

    for column in &live.columns {
        if table.field(&column.name).is_none() {
            plan.warnings.push(SchemaWarning::UnsupportedColumnRemoval {
                table: table.name().to_string(),
                column: column.name.clone(),
            });
        }
    }

    let declared_fks: HashSet<(Vec<&str>, &str)> = table
        .foreign_keys()
        .iter()
        .map(|fk| (fk.columns.iter().map(String::as_str).collect(), fk.ref_table.as_str()))
        .collect();
    let live_fks: HashSet<(Vec<&str>, &str)> = live
        .foreign_keys
        .iter()
        .map(|fk| (fk.columns.iter().map(String::as_str).collect(), fk.ref_table.as_str()))
        .collect();
    if declared_fks != live_fks {
        plan.warnings.push(SchemaWarning::UnsupportedForeignKeyChange {
            table: table.name().to_string(),
        });
    }
}
