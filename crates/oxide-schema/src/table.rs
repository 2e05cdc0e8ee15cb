//! Table definitions.
//!
//! A [`Table`] checks its structural invariants when it is mutated: every
//! mutating method validates first and only changes the table on success.

use serde::Serialize;

use crate::constraint::{
    CheckConstraint, ForeignKey, Index, PrimaryKeyConstraint, PrimaryKeyOrigin, UniqueConstraint,
};
use crate::error::{Result, SchemaError};
use crate::field::Field;

/// Complete definition of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    name: String,
    fields: Vec<Field>,
    primary_key: Option<PrimaryKeyConstraint>,
    foreign_keys: Vec<ForeignKey>,
    unique_constraints: Vec<UniqueConstraint>,
    check_constraints: Vec<CheckConstraint>,
    indexes: Vec<Index>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            primary_key: None,
            foreign_keys: Vec::new(),
            unique_constraints: Vec::new(),
            check_constraints: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Gets a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Primary key, whichever way it was declared.
    #[must_use]
    pub fn primary_key(&self) -> Option<&PrimaryKeyConstraint> {
        self.primary_key.as_ref()
    }

    /// Foreign keys in declaration order.
    #[must_use]
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Table-level unique constraints.
    #[must_use]
    pub fn unique_constraints(&self) -> &[UniqueConstraint] {
        &self.unique_constraints
    }

    /// Table-level check constraints.
    #[must_use]
    pub fn check_constraints(&self) -> &[CheckConstraint] {
        &self.check_constraints
    }

    /// Indexes in declaration order.
    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Primary key columns (empty when the table has no primary key).
    #[must_use]
    pub fn primary_key_columns(&self) -> &[String] {
        self.primary_key
            .as_ref()
            .map(|pk| pk.columns.as_slice())
            .unwrap_or_default()
    }

    /// Adds a field.
    ///
    /// A field-level primary key becomes the table's primary key; adding one
    /// when a primary key already exists is an error.
    pub fn add_field(&mut self, field: Field) -> Result<()> {
        if self.field(&field.name).is_some() {
            return Err(SchemaError::DuplicateField {
                table: self.name.clone(),
                field: field.name,
            });
        }

        if field.primary_key {
            self.ensure_no_primary_key()?;
            self.primary_key = Some(PrimaryKeyConstraint {
                columns: vec![field.name.clone()],
                origin: PrimaryKeyOrigin::Column,
            });
        }

        self.fields.push(field);
        Ok(())
    }

    /// Sets a table-level primary key over existing columns.
    pub fn set_primary_key<I, S>(&mut self, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.ensure_no_primary_key()?;
        self.ensure_columns(&columns)?;

        self.primary_key = Some(PrimaryKeyConstraint {
            columns,
            origin: PrimaryKeyOrigin::Table,
        });
        Ok(())
    }

    /// Adds a foreign key.
    ///
    /// The referenced table is not checked here so tables can be declared in
    /// any order; [`Database::validate_structure`](crate::database::Database::validate_structure)
    /// resolves it.
    pub fn add_foreign_key(&mut self, foreign_key: ForeignKey) -> Result<()> {
        if foreign_key.columns.len() != foreign_key.ref_columns.len() {
            return Err(SchemaError::ColumnCountMismatch {
                table: self.name.clone(),
                local: foreign_key.columns.len(),
                referenced: foreign_key.ref_columns.len(),
            });
        }
        self.ensure_columns(&foreign_key.columns)?;

        self.foreign_keys.push(foreign_key);
        Ok(())
    }

    /// Adds a table-level unique constraint.
    pub fn add_unique_constraint<I, S>(&mut self, columns: I, name: Option<String>) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.ensure_columns(&columns)?;

        self.unique_constraints
            .push(UniqueConstraint { columns, name });
        Ok(())
    }

    /// Adds a table-level check constraint.
    pub fn add_check_constraint(
        &mut self,
        expression: impl Into<String>,
        name: Option<String>,
    ) -> Result<()> {
        let expression = expression.into();
        if expression.trim().is_empty() {
            return Err(SchemaError::InvalidConstraint {
                table: self.name.clone(),
                message: "check constraint expression cannot be empty".to_string(),
            });
        }

        self.check_constraints
            .push(CheckConstraint { expression, name });
        Ok(())
    }

    /// Adds an index. Explicit and derived names must be unique per table.
    pub fn add_index(&mut self, index: Index) -> Result<()> {
        self.ensure_columns(&index.columns)?;

        let name = index.resolved_name(&self.name);
        if self
            .indexes
            .iter()
            .any(|existing| existing.resolved_name(&self.name) == name)
        {
            return Err(SchemaError::DuplicateIndexName {
                table: self.name.clone(),
                index: name.into_owned(),
            });
        }

        self.indexes.push(index);
        Ok(())
    }

    /// Returns the `CREATE TABLE IF NOT EXISTS` statement.
    ///
    /// Column definitions come first, then the table-level primary key,
    /// unique constraints, foreign keys and check constraints.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        let mut definitions: Vec<String> =
            self.fields.iter().map(Field::column_definition).collect();

        if let Some(pk) = self.primary_key.as_ref().and_then(PrimaryKeyConstraint::to_sql) {
            definitions.push(pk);
        }
        definitions.extend(self.unique_constraints.iter().map(UniqueConstraint::to_sql));
        definitions.extend(self.foreign_keys.iter().map(ForeignKey::to_sql));
        definitions.extend(self.check_constraints.iter().map(CheckConstraint::to_sql));

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n);",
            self.name,
            definitions.join(",\n  ")
        )
    }

    /// Returns one `CREATE INDEX` statement per index.
    #[must_use]
    pub fn create_index_sqls(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|idx| idx.create_sql(&self.name))
            .collect()
    }

    /// Returns the `DROP TABLE IF EXISTS` statement.
    #[must_use]
    pub fn drop_table_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {};", self.name)
    }

    /// Returns one `DROP INDEX` statement per index.
    #[must_use]
    pub fn drop_index_sqls(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|idx| idx.drop_sql(&self.name))
            .collect()
    }

    /// Returns the `ALTER TABLE ... ADD COLUMN` statement for a field.
    #[must_use]
    pub fn add_column_sql(&self, field: &Field) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {};",
            self.name,
            field.column_definition()
        )
    }

    fn ensure_no_primary_key(&self) -> Result<()> {
        match &self.primary_key {
            Some(existing) => Err(SchemaError::PrimaryKeyConflict {
                table: self.name.clone(),
                origin: existing.origin.as_str(),
            }),
            None => Ok(()),
        }
    }

    fn ensure_columns(&self, columns: &[String]) -> Result<()> {
        if columns.is_empty() {
            return Err(SchemaError::InvalidConstraint {
                table: self.name.clone(),
                message: "constraint must name at least one column".to_string(),
            });
        }
        match columns.iter().find(|c| self.field(c).is_none()) {
            Some(missing) => Err(SchemaError::UnknownColumn {
                table: self.name.clone(),
                column: missing.clone(),
            }),
            None => Ok(()),
        }
    }
}
