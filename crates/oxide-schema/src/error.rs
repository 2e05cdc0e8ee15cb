//! Error types for the schema model and migration engine.

/// Errors that can occur while building, validating or applying a schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// A field with the same name already exists in the table.
    #[error("Field '{field}' already exists in table '{table}'")]
    DuplicateField {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
    },

    /// A table with the same name already exists in the database.
    #[error("Table '{0}' already exists in database")]
    DuplicateTable(String),

    /// An index with the same (explicit or derived) name already exists.
    #[error("Index '{index}' of table '{table}' reuses an existing index name")]
    DuplicateIndexName {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },

    /// A second primary key declaration was attempted.
    #[error("Primary key already exists in table '{table}' (declared {origin})")]
    PrimaryKeyConflict {
        /// Table name.
        table: String,
        /// Origin of the existing primary key ("column" or "table").
        origin: &'static str,
    },

    /// A constraint or index references a column that does not exist.
    #[error("Column '{column}' doesn't exist in table '{table}'")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Local and referenced column counts of a foreign key differ.
    #[error("Foreign key in table '{table}' has {local} local column(s) but {referenced} referenced column(s)")]
    ColumnCountMismatch {
        /// Table name.
        table: String,
        /// Number of local columns.
        local: usize,
        /// Number of referenced columns.
        referenced: usize,
    },

    /// The foreign key graph contains a cycle.
    #[error("Foreign key cycle detected: {}", .tables.join(" -> "))]
    ForeignKeyCycle {
        /// Tables along the cycle, first table repeated at the end.
        tables: Vec<String>,
    },

    /// A foreign key references a table missing from the database.
    #[error("Foreign key in table '{table}' references non-existent table '{ref_table}'")]
    DanglingForeignKey {
        /// Referencing table.
        table: String,
        /// Referenced table.
        ref_table: String,
    },

    /// An inline field definition could not be parsed.
    #[error("Invalid field definition '{definition}': {message}")]
    InvalidFieldSyntax {
        /// The offending definition.
        definition: String,
        /// What went wrong.
        message: String,
    },

    /// A table-level constraint is malformed.
    #[error("Invalid constraint in table '{table}': {message}")]
    InvalidConstraint {
        /// Table name.
        table: String,
        /// What went wrong.
        message: String,
    },

    /// The declarative description is malformed.
    #[error("Invalid schema description: {0}")]
    InvalidDescription(String),

    /// NULL was given for a NOT NULL field.
    #[error("Field '{0}' cannot be null")]
    NullValue(String),

    /// A value's runtime kind disagrees with the field's declared type.
    #[error("Invalid type for field '{field}': expected {expected}, got {actual}")]
    ValueKindMismatch {
        /// Field name.
        field: String,
        /// Expected value kind.
        expected: crate::value::ValueKind,
        /// Kind of the value that was given.
        actual: &'static str,
    },

    /// A stored value could not be decoded.
    #[error("Error parsing '{field}' value '{value}': {message}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// The raw value.
        value: String,
        /// What went wrong.
        message: String,
    },

    /// The connector is not connected.
    #[error("Database connection unavailable ({0})")]
    ConnectionUnavailable(&'static str),

    /// DDL execution failed while creating or altering a table.
    #[error("Failed to execute DDL for table '{table}': {source}")]
    DdlExecution {
        /// Table name.
        table: String,
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },

    /// Database error outside of table DDL.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading description files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchemaError {
    pub(crate) fn field_syntax(definition: &str, message: impl Into<String>) -> Self {
        Self::InvalidFieldSyntax {
            definition: definition.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
