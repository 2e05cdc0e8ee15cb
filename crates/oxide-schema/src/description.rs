//! Declarative schema descriptions.
//!
//! Two front-ends converge on the same constructors:
//!
//! ```json
//! {
//!   "users": {
//!     "fields": {
//!       "id": "INTEGER PRIMARY KEY",
//!       "username": "TEXT NOT NULL UNIQUE",
//!       "created_at": "DATETIME DEFAULT CURRENT_TIMESTAMP"
//!     },
//!     "constraints": {
//!       "foreign_keys": [
//!         {"columns": "group_id", "ref_table": "groups", "ref_columns": "id", "on_delete": "SET NULL"}
//!       ],
//!       "unique_constraints": [{"columns": ["email", "phone"], "name": "unique_contact"}],
//!       "check_constraints": [{"expression": "age >= 18", "name": "check_adult"}]
//!     },
//!     "indexes": [{"columns": ["email"], "unique": true}]
//!   }
//! }
//! ```
//!
//! and the legacy layout, `{"users": {"field_definition": {...}, "primary_keys": "id"}}`.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constraint::{ForeignKey, ForeignKeyAction, Index};
use crate::database::Database;
use crate::error::{Result, SchemaError};
use crate::field::Field;
use crate::table::Table;
use crate::value::{DefaultValue, TemporalKeyword};

/// One column name or a list of column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Columns {
    /// A single column.
    One(String),
    /// Several columns, in order.
    Many(Vec<String>),
}

impl Columns {
    /// Returns the column names as a list.
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(column) => vec![column.clone()],
            Self::Many(columns) => columns.clone(),
        }
    }
}

/// Description of a whole database, keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaDescription {
    /// Tables in declaration order.
    pub tables: IndexMap<String, TableDescription>,
}

/// Description of one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDescription {
    /// Column name -> inline definition (`"TEXT NOT NULL DEFAULT 'x'"`).
    pub fields: IndexMap<String, String>,
    /// Table-level constraints.
    #[serde(default)]
    pub constraints: ConstraintsDescription,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDescription>,
}

/// Table-level constraints section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConstraintsDescription {
    /// Table-level primary key.
    pub primary_key: Option<Columns>,
    /// Foreign keys.
    pub foreign_keys: Vec<ForeignKeyDescription>,
    /// Unique constraints.
    pub unique_constraints: Vec<UniqueDescription>,
    /// Check constraints.
    pub check_constraints: Vec<CheckDescription>,
}

/// A foreign key entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForeignKeyDescription {
    /// Local columns.
    pub columns: Columns,
    /// Referenced table.
    pub ref_table: String,
    /// Referenced columns.
    pub ref_columns: Columns,
    /// `CASCADE`, `SET NULL`, `SET DEFAULT`, `RESTRICT` or `NO ACTION`.
    #[serde(default)]
    pub on_delete: Option<String>,
    /// Same values as `on_delete`.
    #[serde(default)]
    pub on_update: Option<String>,
}

/// A unique constraint entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UniqueDescription {
    /// Columns.
    pub columns: Columns,
    /// Optional constraint name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A check constraint entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckDescription {
    /// Boolean SQL expression.
    pub expression: String,
    /// Optional constraint name.
    #[serde(default)]
    pub name: Option<String>,
}

/// An index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDescription {
    /// Columns.
    pub columns: Columns,
    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,
    /// Optional index name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Legacy description of a whole database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LegacySchemaDescription {
    /// Tables in declaration order.
    pub tables: IndexMap<String, LegacyTableDescription>,
}

/// Legacy description of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacyTableDescription {
    /// Column name -> inline definition.
    pub field_definition: IndexMap<String, String>,
    /// Table-level primary key.
    #[serde(default)]
    pub primary_keys: Option<Columns>,
}

impl From<LegacySchemaDescription> for SchemaDescription {
    fn from(legacy: LegacySchemaDescription) -> Self {
        let tables = legacy
            .tables
            .into_iter()
            .map(|(name, table)| {
                let converted = TableDescription {
                    fields: table.field_definition,
                    constraints: ConstraintsDescription {
                        primary_key: table.primary_keys,
                        ..ConstraintsDescription::default()
                    },
                    indexes: Vec::new(),
                };
                (name, converted)
            })
            .collect();
        Self { tables }
    }
}

impl SchemaDescription {
    /// Parses a description from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses a legacy description from JSON and converts it.
    pub fn from_legacy_json(json: &str) -> Result<Self> {
        let legacy: LegacySchemaDescription = serde_json::from_str(json)?;
        Ok(legacy.into())
    }

    /// Reads a description file.
    pub fn from_path(path: impl AsRef<Path>, legacy: bool) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        if legacy {
            Self::from_legacy_json(&json)
        } else {
            Self::from_json(&json)
        }
    }
}

impl Table {
    /// Builds a table from its description.
    ///
    /// Fields are added first, then the primary key, foreign keys, unique
    /// constraints, check constraints and indexes, each through the regular
    /// mutation methods.
    pub fn from_description(name: &str, def: &TableDescription) -> Result<Self> {
        let mut table = Self::new(name);

        for (field_name, definition) in &def.fields {
            table.add_field(parse_field(field_name, definition)?)?;
        }

        let constraints = &def.constraints;
        if let Some(pk) = &constraints.primary_key {
            table.set_primary_key(pk.to_vec())?;
        }

        for fk in &constraints.foreign_keys {
            let mut foreign_key =
                ForeignKey::new(fk.columns.to_vec(), &fk.ref_table, fk.ref_columns.to_vec());
            foreign_key.on_delete = fk
                .on_delete
                .as_deref()
                .map(str::parse::<ForeignKeyAction>)
                .transpose()?;
            foreign_key.on_update = fk
                .on_update
                .as_deref()
                .map(str::parse::<ForeignKeyAction>)
                .transpose()?;
            table.add_foreign_key(foreign_key)?;
        }

        for uc in &constraints.unique_constraints {
            table.add_unique_constraint(uc.columns.to_vec(), uc.name.clone())?;
        }

        for cc in &constraints.check_constraints {
            table.add_check_constraint(cc.expression.clone(), cc.name.clone())?;
        }

        for idx in &def.indexes {
            table.add_index(Index {
                columns: idx.columns.to_vec(),
                unique: idx.unique,
                name: idx.name.clone(),
            })?;
        }

        Ok(table)
    }
}

impl Database {
    /// Builds and validates a database from its description.
    pub fn from_description(description: &SchemaDescription) -> Result<Self> {
        let mut db = Self::new();
        for (name, def) in &description.tables {
            db.add_table(Table::from_description(name, def)?)?;
        }
        db.validate_structure()?;
        Ok(db)
    }

    /// Builds a database from a JSON description.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_description(&SchemaDescription::from_json(json)?)
    }

    /// Builds a database from a legacy JSON description.
    pub fn from_legacy_json(json: &str) -> Result<Self> {
        Self::from_description(&SchemaDescription::from_legacy_json(json)?)
    }
}

/// Parses an inline field definition such as `"TEXT NOT NULL DEFAULT 'x'"`.
///
/// The SQL type is everything before the first constraint keyword. Quoted
/// strings and parenthesized groups are read as single tokens, so a default
/// value containing `NOT NULL` or `UNIQUE` never sets a flag.
pub fn parse_field(name: &str, definition: &str) -> Result<Field> {
    let tokens = tokenize(definition)?;

    let type_len = tokens
        .iter()
        .position(|t| t.kind == TokenKind::Word && is_keyword(t.text))
        .unwrap_or(tokens.len());
    if type_len == 0 || tokens[0].kind != TokenKind::Word {
        return Err(SchemaError::field_syntax(definition, "missing data type"));
    }

    let sql_type = &definition[tokens[0].start..tokens[type_len - 1].end];
    let mut field = Field::new(name, sql_type);

    let mut rest = tokens[type_len..].iter();
    while let Some(token) = rest.next() {
        let keyword = token.text.to_ascii_uppercase();
        if token.kind != TokenKind::Word {
            return Err(SchemaError::field_syntax(
                definition,
                format!("unexpected '{}'", token.text),
            ));
        }
        match keyword.as_str() {
            "PRIMARY" => {
                expect_word(&mut rest, "KEY", definition)?;
                field.primary_key = true;
                field.not_null = true;
            }
            "NOT" => {
                expect_word(&mut rest, "NULL", definition)?;
                field.not_null = true;
            }
            "NULL" => {}
            "UNIQUE" => field.unique = true,
            "AUTOINCREMENT" => {
                return Err(SchemaError::field_syntax(
                    definition,
                    "AUTOINCREMENT is not supported, declare the primary key instead",
                ));
            }
            "DEFAULT" => {
                let value = rest.next().ok_or_else(|| {
                    SchemaError::field_syntax(definition, "DEFAULT requires a value")
                })?;
                if field.default.is_some() {
                    return Err(SchemaError::field_syntax(definition, "duplicate DEFAULT"));
                }
                field.default = Some(parse_default(value));
            }
            "CHECK" => {
                let group = rest
                    .next()
                    .filter(|t| t.kind == TokenKind::Group)
                    .ok_or_else(|| {
                        SchemaError::field_syntax(definition, "CHECK requires a parenthesized expression")
                    })?;
                if field.check.is_some() {
                    return Err(SchemaError::field_syntax(definition, "duplicate CHECK"));
                }
                field.check = Some(group.text[1..group.text.len() - 1].trim().to_string());
            }
            _ => {
                return Err(SchemaError::field_syntax(
                    definition,
                    format!("unrecognized token '{}'", token.text),
                ));
            }
        }
    }

    Ok(field)
}

const KEYWORDS: &[&str] = &[
    "PRIMARY",
    "NOT",
    "NULL",
    "UNIQUE",
    "DEFAULT",
    "CHECK",
    "AUTOINCREMENT",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn expect_word<'a, 'b: 'a>(
    rest: &mut impl Iterator<Item = &'a Token<'b>>,
    expected: &str,
    definition: &str,
) -> Result<()> {
    match rest.next() {
        Some(t) if t.kind == TokenKind::Word && t.text.eq_ignore_ascii_case(expected) => Ok(()),
        _ => Err(SchemaError::field_syntax(
            definition,
            format!("expected '{expected}'"),
        )),
    }
}

/// Types a default value read back from the database (`PRAGMA table_info`).
pub(crate) fn parse_default_sql(text: &str) -> DefaultValue {
    match tokenize(text) {
        Ok(tokens) if tokens.len() == 1 => parse_default(&tokens[0]),
        _ => DefaultValue::Expression(text.to_string()),
    }
}

fn parse_default(token: &Token<'_>) -> DefaultValue {
    match token.kind {
        TokenKind::Quoted => {
            let inner = token.text[1..token.text.len() - 1].replace("''", "'");
            let literal = DefaultValue::String(inner);
            // Strings that would render unquoted are kept exactly as written.
            if literal.to_sql() == token.text {
                literal
            } else {
                DefaultValue::Expression(token.text.to_string())
            }
        }
        TokenKind::Group => DefaultValue::Expression(token.text.to_string()),
        TokenKind::Word => {
            let upper = token.text.to_ascii_uppercase();
            if let Some(keyword) = TemporalKeyword::from_keyword(&upper) {
                return DefaultValue::Temporal(keyword);
            }
            match upper.as_str() {
                "TRUE" => DefaultValue::Bool(true),
                "FALSE" => DefaultValue::Bool(false),
                "NULL" => DefaultValue::Null,
                _ => parse_number(token.text)
                    .unwrap_or_else(|| DefaultValue::Expression(token.text.to_string())),
            }
        }
    }
}

fn parse_number(text: &str) -> Option<DefaultValue> {
    if !text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }
    if let Ok(i) = text.parse::<i64>() {
        return Some(DefaultValue::Integer(i));
    }
    // Out-of-range literals such as `1e999` stay as written.
    text.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(DefaultValue::Real)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Quoted,
    Group,
}

#[derive(Debug)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    start: usize,
    end: usize,
}

fn tokenize(definition: &str) -> Result<Vec<Token<'_>>> {
    let bytes = definition.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let start = pos;
        let kind = match c {
            b'\'' => {
                pos = skip_quoted(bytes, pos)
                    .ok_or_else(|| SchemaError::field_syntax(definition, "unterminated string"))?;
                TokenKind::Quoted
            }
            b'(' => {
                pos = skip_group(bytes, pos)
                    .ok_or_else(|| SchemaError::field_syntax(definition, "unbalanced parentheses"))?;
                TokenKind::Group
            }
            b')' => return Err(SchemaError::field_syntax(definition, "unbalanced parentheses")),
            _ => {
                while pos < bytes.len()
                    && !bytes[pos].is_ascii_whitespace()
                    && !matches!(bytes[pos], b'(' | b')' | b'\'')
                {
                    pos += 1;
                }
                TokenKind::Word
            }
        };
        tokens.push(Token {
            kind,
            text: &definition[start..pos],
            start,
            end: pos,
        });
    }

    Ok(tokens)
}

/// Returns the position after the closing quote; `''` is an escaped quote.
fn skip_quoted(bytes: &[u8], start: usize) -> Option<usize> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == b'\'' {
            if bytes.get(pos + 1) == Some(&b'\'') {
                pos += 2;
                continue;
            }
            return Some(pos + 1);
        }
        pos += 1;
    }
    None
}

/// Returns the position after the matching closing parenthesis.
fn skip_group(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = start;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\'' => {
                pos = skip_quoted(bytes, pos)?;
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos + 1);
                }
            }
            _ => {}
        }
        pos += 1;
    }
    None
}
