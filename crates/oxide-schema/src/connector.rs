//! SQLite connector and auto-migration executor.
//!
//! A [`Connector`] owns one connection and the validated [`Database`] it
//! serves. Connecting to a database that does not exist yet runs the full
//! DDL script; connecting to an existing one runs nothing until
//! [`Connector::validate`] is called.
//!
//! The connection always has an explicit transaction open. Work becomes
//! durable through [`Connector::commit`] or [`Connector::close`]. Dropping
//! a connected [`Connector`] without closing it rolls pending work back,
//! whatever `commit_on_close` says.
//!
//! Statements take positional `?` parameters as [`Value`]s and query rows
//! come back as `Vec<Value>` in their stored representation; pair them with
//! [`Field::encode`](crate::field::Field::encode) and
//! [`Field::decode`](crate::field::Field::decode) for logical values.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row, TypeInfo, ValueRef};
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::database::Database;
use crate::error::{Result, SchemaError};
use crate::introspect::read_live_schema;
use crate::migrate::{MigrationReport, MigrationStep, plan_migration};
use crate::table::Table;
use crate::value::Value;

const MEMORY_PATH: &str = ":memory:";
const STEP_SAVEPOINT: &str = "oxide_schema_step";

/// Connector configuration.
#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    /// Commit pending work on [`Connector::close`] (rolled back otherwise).
    ///
    /// Only `close` honors this. A connector dropped while connected
    /// always rolls back.
    pub commit_on_close: bool,
    /// Enforce foreign keys on the connection.
    pub foreign_keys: bool,
    /// Record a failing migration step and carry on with the next one.
    pub continue_on_table_error: bool,
    /// Span every connector operation runs in.
    pub span: Option<Span>,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            commit_on_close: true,
            foreign_keys: true,
            continue_on_table_error: false,
            span: None,
        }
    }
}

impl ConnectorOptions {
    /// Creates the default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether `close` commits.
    #[must_use]
    pub fn commit_on_close(mut self, enabled: bool) -> Self {
        self.commit_on_close = enabled;
        self
    }

    /// Sets foreign key enforcement.
    #[must_use]
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Sets whether a failing step aborts `validate`.
    #[must_use]
    pub fn continue_on_table_error(mut self, enabled: bool) -> Self {
        self.continue_on_table_error = enabled;
        self
    }

    /// Sets the span operations are recorded in.
    #[must_use]
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// Lifecycle of a [`Connector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// `connect` has not been called.
    Disconnected,
    /// Connected. `created` is true when the database was initialized by
    /// this connector.
    Connected {
        /// Whether the DDL script ran on connect.
        created: bool,
    },
    /// `close` was called. Terminal.
    Closed,
}

/// Owner of one SQLite connection and its declared structure.
pub struct Connector {
    path: PathBuf,
    structure: Database,
    options: ConnectorOptions,
    span: Span,
    conn: Option<SqliteConnection>,
    state: ConnectionState,
}

impl Connector {
    /// Creates a disconnected connector. `":memory:"` opens an in-memory
    /// database.
    pub fn new(path: impl Into<PathBuf>, structure: Database) -> Self {
        Self::with_options(path, structure, ConnectorOptions::default())
    }

    /// Creates a disconnected connector with custom options.
    pub fn with_options(
        path: impl Into<PathBuf>,
        structure: Database,
        mut options: ConnectorOptions,
    ) -> Self {
        let path = path.into();
        let span = options
            .span
            .take()
            .unwrap_or_else(|| info_span!("sqlite_connector", path = %path.display()));
        Self {
            path,
            structure,
            options,
            span,
            conn: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// Database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The active structure.
    #[must_use]
    pub fn structure(&self) -> &Database {
        &self.structure
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether this connector created the database on connect.
    #[must_use]
    pub fn is_new_database(&self) -> bool {
        matches!(self.state, ConnectionState::Connected { created: true })
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    /// Opens the connection, running the DDL script on a new database.
    ///
    /// The structure is validated first; connecting twice is a no-op.
    pub async fn connect(&mut self) -> Result<()> {
        let span = self.span.clone();
        self.connect_inner().instrument(span).await
    }

    async fn connect_inner(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Connected { .. } => return Ok(()),
            ConnectionState::Closed => {
                return Err(SchemaError::ConnectionUnavailable("connector is closed"))
            }
            ConnectionState::Disconnected => {}
        }

        self.structure.validate_structure()?;

        let exists = !self.is_memory() && self.path.exists();
        let options = if self.is_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(true)
        };
        let options = options.foreign_keys(self.options.foreign_keys);

        let mut conn = options.connect().await?;
        sqlx::query("BEGIN").execute(&mut conn).await?;

        if exists {
            info!("Connected to existing database");
        } else {
            // The initial script is committed on its own, all or nothing.
            let script = self.structure.generate_ddl_script()?;
            if !script.is_empty() {
                debug!(sql = %script, "Executing DDL script");
                sqlx::raw_sql(&script).execute(&mut conn).await?;
            }
            sqlx::query("COMMIT").execute(&mut conn).await?;
            sqlx::query("BEGIN").execute(&mut conn).await?;
            info!(tables = self.structure.len(), "Created new database");
        }

        self.conn = Some(conn);
        self.state = ConnectionState::Connected { created: !exists };
        Ok(())
    }

    fn connection(&mut self) -> Result<&mut SqliteConnection> {
        match self.state {
            ConnectionState::Disconnected => {
                Err(SchemaError::ConnectionUnavailable("connector is not connected"))
            }
            ConnectionState::Closed => Err(SchemaError::ConnectionUnavailable("connector is closed")),
            ConnectionState::Connected { .. } => self
                .conn
                .as_mut()
                .ok_or(SchemaError::ConnectionUnavailable("connection was lost")),
        }
    }

    /// Brings the live database up to date with the structure.
    ///
    /// Missing tables are created and missing columns added. Type
    /// mismatches, extra tables and columns, and foreign key changes are
    /// only reported. Each step runs in its own savepoint; a failing step
    /// is rolled back and either aborts the run or, with
    /// `continue_on_table_error`, is recorded in the report.
    pub async fn validate(&mut self) -> Result<MigrationReport> {
        let span = self.span.clone();
        self.validate_inner().instrument(span).await
    }

    async fn validate_inner(&mut self) -> Result<MigrationReport> {
        let continue_on_error = self.options.continue_on_table_error;
        let conn = self.connection()?;
        let live = read_live_schema(conn).await?;
        let plan = plan_migration(&self.structure, &live);

        let conn = self.connection()?;
        let mut report = MigrationReport {
            warnings: plan.warnings,
            ..MigrationReport::default()
        };
        for warning in &report.warnings {
            warn!("{warning}");
        }

        for step in &plan.steps {
            let statements = step.statements();
            match run_step(conn, &statements).await {
                Ok(()) => {
                    report
                        .statements
                        .extend(statements.iter().map(ToString::to_string));
                    match step {
                        MigrationStep::CreateTable { table, .. } => {
                            info!(table = %table, "Created table");
                            report.created_tables.push(table.clone());
                        }
                        MigrationStep::AddColumn { table, column, .. } => {
                            info!(table = %table, column = %column, "Added column");
                            report.added_columns.push((table.clone(), column.clone()));
                        }
                    }
                }
                Err(source) => {
                    error!(table = %step.table(), error = %source, "Migration step failed");
                    if !continue_on_error {
                        return Err(SchemaError::DdlExecution {
                            table: step.table().to_string(),
                            source,
                        });
                    }
                    report
                        .failed_tables
                        .push((step.table().to_string(), source.to_string()));
                }
            }
        }

        info!(
            statements = report.statements.len(),
            warnings = report.warnings.len(),
            failed = report.failed_tables.len(),
            "Validation finished"
        );
        Ok(report)
    }

    /// Adds a table to the structure and creates it.
    ///
    /// The structure is only updated when the table was created.
    pub async fn add_table(&mut self, table: Table) -> Result<()> {
        let span = self.span.clone();
        self.add_table_inner(table).instrument(span).await
    }

    async fn add_table_inner(&mut self, table: Table) -> Result<()> {
        let mut next = self.structure.clone();
        let name = table.name().to_string();
        let mut statements = vec![table.create_table_sql()];
        statements.extend(table.create_index_sqls());
        next.add_table(table)?;
        next.validate_structure()?;

        let conn = self.connection()?;
        let statements: Vec<&str> = statements.iter().map(String::as_str).collect();
        run_step(conn, &statements)
            .await
            .map_err(|source| SchemaError::DdlExecution {
                table: name.clone(),
                source,
            })?;

        info!(table = %name, "Created table");
        self.structure = next;
        Ok(())
    }

    /// Rebuilds a [`Database`] from the live database.
    pub async fn load_structure(&mut self) -> Result<Database> {
        let span = self.span.clone();
        self.load_structure_inner().instrument(span).await
    }

    async fn load_structure_inner(&mut self) -> Result<Database> {
        let conn = self.connection()?;
        read_live_schema(conn).await?.to_database()
    }

    /// Executes one statement and returns the number of rows affected.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.execute_with(sql, &[]).await
    }

    /// Executes one statement with positional parameters and returns the
    /// number of rows affected.
    pub async fn execute_with(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let span = self.span.clone();
        self.execute_inner(sql, params).instrument(span).await
    }

    async fn execute_inner(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let conn = self.connection()?;
        debug!(sql = %sql, params = params.len(), "Executing SQL");
        let result = bind_values(sqlx::query(sql), params)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Executes one statement once per parameter set and returns the total
    /// number of rows affected.
    ///
    /// The batch runs in a savepoint: when one execution fails, none of
    /// them take effect.
    pub async fn execute_many(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
        let span = self.span.clone();
        self.execute_many_inner(sql, rows).instrument(span).await
    }

    async fn execute_many_inner(&mut self, sql: &str, rows: &[Vec<Value>]) -> Result<u64> {
        let conn = self.connection()?;
        debug!(sql = %sql, rows = rows.len(), "Executing batch");
        savepoint(conn, "SAVEPOINT").await?;

        let mut affected = 0;
        for params in rows {
            match bind_values(sqlx::query(sql), params)
                .execute(&mut *conn)
                .await
            {
                Ok(result) => affected += result.rows_affected(),
                Err(err) => {
                    savepoint(conn, "ROLLBACK TO SAVEPOINT").await?;
                    savepoint(conn, "RELEASE SAVEPOINT").await?;
                    return Err(err.into());
                }
            }
        }

        savepoint(conn, "RELEASE SAVEPOINT").await?;
        Ok(affected)
    }

    /// Runs a query with positional parameters and returns every row.
    ///
    /// Values keep their storage class: integers, reals, text, blobs and
    /// NULL. Dates and booleans are decoded by their [`Field`](crate::field::Field).
    pub async fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        let span = self.span.clone();
        self.fetch_all_inner(sql, params).instrument(span).await
    }

    async fn fetch_all_inner(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        let conn = self.connection()?;
        debug!(sql = %sql, params = params.len(), "Fetching rows");
        let rows = bind_values(sqlx::query(sql), params)
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(row_values).collect()
    }

    /// Commits pending work and opens the next transaction.
    pub async fn commit(&mut self) -> Result<()> {
        let span = self.span.clone();
        self.end_transaction("COMMIT").instrument(span).await
    }

    /// Discards pending work and opens the next transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        let span = self.span.clone();
        self.end_transaction("ROLLBACK").instrument(span).await
    }

    async fn end_transaction(&mut self, statement: &'static str) -> Result<()> {
        let conn = self.connection()?;
        sqlx::query(statement).execute(&mut *conn).await?;
        sqlx::query("BEGIN").execute(&mut *conn).await?;
        debug!(statement, "Transaction ended");
        Ok(())
    }

    /// Ends the transaction according to `commit_on_close` and closes the
    /// connection. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let span = self.span.clone();
        self.close_inner().instrument(span).await
    }

    async fn close_inner(&mut self) -> Result<()> {
        self.state = ConnectionState::Closed;
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let statement = if self.options.commit_on_close {
            "COMMIT"
        } else {
            "ROLLBACK"
        };
        sqlx::query(statement).execute(&mut conn).await?;
        conn.close().await?;
        info!(statement, "Connection closed");
        Ok(())
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if self.conn.is_some() {
            let _entered = self.span.enter();
            warn!("Connector dropped without close; pending work is rolled back");
        }
    }
}

async fn savepoint(
    conn: &mut SqliteConnection,
    command: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(&format!("{command} {STEP_SAVEPOINT}"))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Runs the statements of one step inside a savepoint.
async fn run_step(
    conn: &mut SqliteConnection,
    statements: &[&str],
) -> std::result::Result<(), sqlx::Error> {
    savepoint(conn, "SAVEPOINT").await?;

    for sql in statements {
        debug!(sql = %sql, "Executing SQL");
        if let Err(err) = sqlx::query(sql).execute(&mut *conn).await {
            savepoint(conn, "ROLLBACK TO SAVEPOINT").await?;
            savepoint(conn, "RELEASE SAVEPOINT").await?;
            return Err(err);
        }
    }

    savepoint(conn, "RELEASE SAVEPOINT").await
}

fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<i64>),
            Value::Bool(b) => query.bind(*b),
            Value::Integer(i) => query.bind(*i),
            Value::Real(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Blob(bytes) => query.bind(bytes.as_slice()),
            Value::Date(date) => query.bind(*date),
            Value::DateTime(datetime) => query.bind(*datetime),
        };
    }
    query
}

/// Reads a row by each value's storage class.
fn row_values(row: &SqliteRow) -> Result<Vec<Value>> {
    (0..row.len())
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let value = match raw.type_info().name() {
                "INTEGER" => Value::Integer(row.try_get(i)?),
                "REAL" => Value::Real(row.try_get(i)?),
                "BLOB" => Value::Blob(row.try_get(i)?),
                _ => Value::Text(row.try_get(i)?),
            };
            Ok(value)
        })
        .collect()
}
