//! Live SQLite schema introspection.
//!
//! Reads `sqlite_master` and the `table_info`, `foreign_key_list`,
//! `index_list` and `index_info` pragmas into a [`LiveSchema`]. Check
//! constraints are not exposed by SQLite's pragmas and are not recovered.

use indexmap::IndexMap;
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;

use crate::constraint::{ForeignKey, ForeignKeyAction, Index};
use crate::database::Database;
use crate::description::parse_default_sql;
use crate::error::{Result, SchemaError};
use crate::field::Field;
use crate::table::Table;

/// A column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveColumn {
    /// Column name.
    pub name: String,
    /// Declared type, verbatim.
    pub sql_type: String,
    /// Whether the column is NOT NULL.
    pub not_null: bool,
    /// Default value SQL text.
    pub default: Option<String>,
    /// 1-based position in the primary key, 0 when not part of it.
    pub pk_position: i64,
}

/// A foreign key as reported by `PRAGMA foreign_key_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveForeignKey {
    /// Local columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub ref_table: String,
    /// Referenced columns. `None` means the referenced table's primary key.
    pub ref_columns: Vec<Option<String>>,
    /// ON UPDATE action as reported.
    pub on_update: String,
    /// ON DELETE action as reported.
    pub on_delete: String,
}

/// An index as reported by `PRAGMA index_list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveIndex {
    /// Index name.
    pub name: String,
    /// Whether the index is unique.
    pub unique: bool,
    /// `c` for CREATE INDEX, `u` for UNIQUE constraints, `pk` for primary keys.
    pub origin: String,
    /// Indexed columns. Empty for expression indexes.
    pub columns: Vec<String>,
}

/// A live table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveTable {
    /// Table name.
    pub name: String,
    /// Columns in table order.
    pub columns: Vec<LiveColumn>,
    /// Foreign keys, grouped by constraint.
    pub foreign_keys: Vec<LiveForeignKey>,
    /// Indexes.
    pub indexes: Vec<LiveIndex>,
}

impl LiveTable {
    /// Gets a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key columns in key order.
    #[must_use]
    pub fn primary_key_columns(&self) -> Vec<&str> {
        let mut pk: Vec<&LiveColumn> = self.columns.iter().filter(|c| c.pk_position > 0).collect();
        pk.sort_by_key(|c| c.pk_position);
        pk.into_iter().map(|c| c.name.as_str()).collect()
    }
}

/// The structure of a live database, tables sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LiveSchema {
    /// Tables keyed by name.
    pub tables: IndexMap<String, LiveTable>,
}

impl LiveSchema {
    /// Gets a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&LiveTable> {
        self.tables.get(name)
    }

    /// Rebuilds a [`Database`] from the live structure.
    ///
    /// A single-column primary key becomes a field-level key, a composite one
    /// a table-level key. Single-column unique indexes coming from constraints
    /// become field flags. The result is not validated: a live database may
    /// hold dangling references.
    pub fn to_database(&self) -> Result<Database> {
        let mut db = Database::new();
        for live in self.tables.values() {
            db.add_table(self.to_table(live)?)?;
        }
        Ok(db)
    }

    fn to_table(&self, live: &LiveTable) -> Result<Table> {
        let mut table = Table::new(&live.name);
        let pk = live.primary_key_columns();

        let unique_columns: Vec<&str> = live
            .indexes
            .iter()
            .filter(|idx| idx.origin == "u" && idx.columns.len() == 1)
            .map(|idx| idx.columns[0].as_str())
            .collect();

        for column in &live.columns {
            let mut field = Field::new(&column.name, &column.sql_type);
            if pk.len() == 1 && pk[0] == column.name {
                field = field.primary_key();
            }
            field.not_null |= column.not_null;
            field.unique = unique_columns.contains(&column.name.as_str());
            field.default = column.default.as_deref().map(parse_default_sql);
            table.add_field(field)?;
        }

        if pk.len() > 1 {
            table.set_primary_key(pk)?;
        }

        for fk in &live.foreign_keys {
            let ref_columns = self.resolve_ref_columns(live, fk)?;
            let mut foreign_key = ForeignKey::new(fk.columns.clone(), &fk.ref_table, ref_columns);
            foreign_key.on_delete = declared_action(&fk.on_delete)?;
            foreign_key.on_update = declared_action(&fk.on_update)?;
            table.add_foreign_key(foreign_key)?;
        }

        for idx in &live.indexes {
            if idx.columns.is_empty() || idx.origin == "pk" {
                continue;
            }
            if idx.origin == "u" {
                if idx.columns.len() > 1 {
                    table.add_unique_constraint(idx.columns.clone(), None)?;
                }
                continue;
            }
            let mut index = Index::new(idx.columns.clone()).named(&idx.name);
            index.unique = idx.unique;
            table.add_index(index)?;
        }

        Ok(table)
    }

    fn resolve_ref_columns(&self, live: &LiveTable, fk: &LiveForeignKey) -> Result<Vec<String>> {
        if fk.ref_columns.iter().all(Option::is_some) {
            return Ok(fk.ref_columns.iter().flatten().cloned().collect());
        }
        let parent_pk: Vec<String> = self
            .table(&fk.ref_table)
            .map(|t| t.primary_key_columns().into_iter().map(String::from).collect())
            .unwrap_or_default();
        if parent_pk.len() != fk.columns.len() {
            return Err(SchemaError::DanglingForeignKey {
                table: live.name.clone(),
                ref_table: fk.ref_table.clone(),
            });
        }
        Ok(parent_pk)
    }
}

/// `NO ACTION` is SQLite's implicit default and maps to no clause.
fn declared_action(action: &str) -> Result<Option<ForeignKeyAction>> {
    match action.parse::<ForeignKeyAction>()? {
        ForeignKeyAction::NoAction => Ok(None),
        other => Ok(Some(other)),
    }
}

fn pragma(name: &str, target: &str) -> String {
    format!("PRAGMA {name}(\"{}\")", target.replace('"', "\"\""))
}

/// Whether `name` is reserved for SQLite's own tables.
///
/// Matched literally: in `LIKE`, `_` is a wildcard and would also hide
/// user tables such as `sqliteconfig`.
pub fn is_internal_table(name: &str) -> bool {
    name.starts_with("sqlite_")
}

/// Lists user tables, sorted by name.
pub async fn live_table_names(conn: &mut SqliteConnection) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(&mut *conn)
            .await?;
    Ok(rows
        .into_iter()
        .map(|(name,)| name)
        .filter(|name| !is_internal_table(name))
        .collect())
}

/// Reads one table, or `None` if it does not exist.
pub async fn read_live_table(conn: &mut SqliteConnection, name: &str) -> Result<Option<LiveTable>> {
    let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
        sqlx::query_as(&pragma("table_info", name))
            .fetch_all(&mut *conn)
            .await?;
    if rows.is_empty() {
        return Ok(None);
    }

    let columns = rows
        .into_iter()
        .map(|(_cid, name, sql_type, not_null, default, pk_position)| LiveColumn {
            name,
            sql_type,
            not_null: not_null != 0,
            default,
            pk_position,
        })
        .collect();

    Ok(Some(LiveTable {
        name: name.to_string(),
        columns,
        foreign_keys: read_foreign_keys(conn, name).await?,
        indexes: read_indexes(conn, name).await?,
    }))
}

async fn read_foreign_keys(conn: &mut SqliteConnection, table: &str) -> Result<Vec<LiveForeignKey>> {
    #[allow(clippy::type_complexity)]
    let rows: Vec<(i64, i64, String, String, Option<String>, String, String, String)> =
        sqlx::query_as(&pragma("foreign_key_list", table))
            .fetch_all(&mut *conn)
            .await?;

    // Rows of one constraint share an id and are ordered by seq.
    let mut grouped: IndexMap<i64, LiveForeignKey> = IndexMap::new();
    for (id, _seq, ref_table, from, to, on_update, on_delete, _match) in rows {
        let fk = grouped.entry(id).or_insert_with(|| LiveForeignKey {
            columns: Vec::new(),
            ref_table,
            ref_columns: Vec::new(),
            on_update,
            on_delete,
        });
        fk.columns.push(from);
        fk.ref_columns.push(to);
    }

    // SQLite lists foreign keys last-declared first.
    let mut foreign_keys: Vec<LiveForeignKey> = grouped.into_values().collect();
    foreign_keys.sort_by_key(|fk| fk.columns.clone());
    Ok(foreign_keys)
}

async fn read_indexes(conn: &mut SqliteConnection, table: &str) -> Result<Vec<LiveIndex>> {
    let rows: Vec<(i64, String, i64, String, i64)> =
        sqlx::query_as(&pragma("index_list", table))
            .fetch_all(&mut *conn)
            .await?;

    let mut indexes = Vec::with_capacity(rows.len());
    for (_seq, name, unique, origin, _partial) in rows {
        let info: Vec<(i64, i64, Option<String>)> = sqlx::query_as(&pragma("index_info", &name))
            .fetch_all(&mut *conn)
            .await?;
        let columns: Option<Vec<String>> = info.into_iter().map(|(_, _, column)| column).collect();
        indexes.push(LiveIndex {
            name,
            unique: unique != 0,
            origin,
            columns: columns.unwrap_or_default(),
        });
    }
    indexes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(indexes)
}

/// Reads every user table of the database.
pub async fn read_live_schema(conn: &mut SqliteConnection) -> Result<LiveSchema> {
    let mut tables = IndexMap::new();
    for name in live_table_names(conn).await? {
        if let Some(table) = read_live_table(conn, &name).await? {
            tables.insert(name, table);
        }
    }
    Ok(LiveSchema { tables })
}
