//! SQLite schema model and additive auto-migrations.
//!
//! `oxide-schema` describes a database as plain Rust values, checks it, and
//! keeps a live SQLite file in line with it:
//! - [`Field`], [`Table`] and [`Database`] enforce their invariants on every
//!   mutation (duplicate names, unknown columns, a single primary key)
//! - [`Database`] orders tables by their foreign keys and rejects cycles and
//!   dangling references before any DDL is rendered
//! - [`Connector`] creates new databases from the generated script and adds
//!   missing tables and columns to existing ones
//!
//! # Architecture
//!
//! - **Model** - `field`, `constraint`, `table`, `database`
//! - **Description** - JSON front-ends (current and legacy layouts)
//! - **Introspection** - reading a live database back into the model
//! - **Planner** - `migrate::plan_migration`, a pure diff of declared vs live
//! - **Connector** - executes plans over one sqlx connection
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_schema::prelude::*;
//!
//! struct User;
//!
//! impl SchemaModel for User {
//!     const TABLE: &'static str = "users";
//!
//!     fn fields() -> Vec<Field> {
//!         vec![
//!             Field::new("id", "INTEGER").primary_key(),
//!             Field::new("username", "TEXT").not_null().unique(),
//!             Field::new("created_at", "DATETIME").default(TemporalKeyword::CurrentTimestamp),
//!         ]
//!     }
//! }
//!
//! let mut db = Database::new();
//! db.add_model::<User>()?;
//!
//! let mut connector = Connector::new("app.db", db);
//! connector.connect().await?;
//! let report = connector.validate().await?;
//! connector.close().await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the DDL script of a description
//! oxide-schema sql schema.json
//!
//! # Create or auto-migrate a database file
//! oxide-schema --database app.db migrate schema.json
//!
//! # Print the structure of a live database
//! oxide-schema --database app.db inspect
//! ```

pub mod connector;
pub mod constraint;
pub mod database;
pub mod description;
pub mod error;
pub mod field;
pub mod introspect;
pub mod migrate;
pub mod table;
pub mod value;

pub use connector::Connector;
pub use database::Database;
pub use field::Field;
pub use table::Table;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::connector::{ConnectionState, Connector, ConnectorOptions};
    pub use crate::constraint::{
        CheckConstraint, ForeignKey, ForeignKeyAction, Index, PrimaryKeyConstraint,
        PrimaryKeyOrigin, UniqueConstraint,
    };
    pub use crate::database::Database;
    pub use crate::description::{SchemaDescription, TableDescription, parse_field};
    pub use crate::error::{Result, SchemaError};
    pub use crate::field::Field;
    pub use crate::introspect::{LiveSchema, LiveTable};
    pub use crate::migrate::{MigrationPlan, MigrationReport, SchemaWarning, plan_migration};
    pub use crate::table::Table;
    pub use crate::value::{DefaultValue, TemporalKeyword, Value, ValueKind};
    pub use crate::SchemaModel;
}

/// A Rust type mapped to a table.
///
/// Implemented by hand (or by a macro) in place of runtime reflection.
pub trait SchemaModel {
    /// Table name.
    const TABLE: &'static str;

    /// Fields in column order.
    fn fields() -> Vec<field::Field>;

    /// Adds table-level constraints and indexes.
    fn configure(_table: &mut table::Table) -> error::Result<()> {
        Ok(())
    }

    /// Builds the table.
    fn table() -> error::Result<table::Table> {
        let mut table = table::Table::new(Self::TABLE);
        for field in Self::fields() {
            table.add_field(field)?;
        }
        Self::configure(&mut table)?;
        Ok(table)
    }
}

impl database::Database {
    /// Adds the table of a [`SchemaModel`].
    pub fn add_model<M: SchemaModel>(&mut self) -> error::Result<()> {
        self.add_table(M::table()?)
    }
}
