//! Tests for building databases from JSON descriptions.
//!
//! These tests go through the public API only:
//! - description parsing (current and legacy layouts)
//! - structural validation (cycles, dangling references)
//! - creation order and DDL script output

use std::collections::HashMap;

use oxide_schema::prelude::*;

const COMPANY: &str = r#"{
    "employees": {
        "fields": {
            "emp_id": "INTEGER",
            "first_name": "TEXT NOT NULL",
            "last_name": "TEXT NOT NULL",
            "salary": "REAL DEFAULT 0",
            "dept_id": "INTEGER",
            "hired": "DATE DEFAULT CURRENT_DATE"
        },
        "constraints": {
            "primary_key": "emp_id",
            "unique_constraints": [{"columns": ["first_name", "last_name"], "name": "uq_full_name"}],
            "foreign_keys": [
                {"columns": "dept_id", "ref_table": "departments", "ref_columns": "dept_id", "on_delete": "SET NULL"}
            ],
            "check_constraints": [{"expression": "salary >= 0", "name": "chk_salary"}]
        },
        "indexes": [{"columns": ["last_name"], "name": "idx_employees_lastname"}]
    },
    "departments": {
        "fields": {
            "dept_id": "INTEGER PRIMARY KEY",
            "name": "TEXT NOT NULL UNIQUE",
            "location": "TEXT DEFAULT 'HQ'"
        }
    },
    "projects": {
        "fields": {
            "id": "INTEGER PRIMARY KEY",
            "lead_id": "INTEGER",
            "dept_id": "INTEGER"
        },
        "constraints": {
            "foreign_keys": [
                {"columns": "lead_id", "ref_table": "employees", "ref_columns": "emp_id"},
                {"columns": ["dept_id"], "ref_table": "departments", "ref_columns": ["dept_id"]}
            ]
        }
    }
}"#;

// =============================================================================
// Test: Creation order
// =============================================================================

#[test]
fn test_every_table_follows_its_dependencies() {
    let db = Database::from_json(COMPANY).unwrap();
    let order: Vec<&str> = db.creation_order().iter().map(|t| t.name()).collect();
    assert_eq!(order, vec!["departments", "employees", "projects"]);

    let position: HashMap<&str, usize> = order.iter().enumerate().map(|(i, n)| (*n, i)).collect();
    for (table, deps) in db.table_dependencies() {
        for dep in deps {
            assert!(position[dep] < position[table], "{dep} must precede {table}");
        }
    }
}

#[test]
fn test_order_is_independent_of_insertion_order() {
    let posts_first = r#"{
        "posts": {"fields": {"id": "INTEGER PRIMARY KEY", "author_id": "INTEGER"},
                  "constraints": {"foreign_keys": [{"columns": "author_id", "ref_table": "users", "ref_columns": "id"}]}},
        "users": {"fields": {"id": "INTEGER PRIMARY KEY"}}
    }"#;
    let db = Database::from_json(posts_first).unwrap();
    let order: Vec<&str> = db.creation_order().iter().map(|t| t.name()).collect();
    assert_eq!(order, vec!["users", "posts"]);
}

// =============================================================================
// Test: DDL script
// =============================================================================

#[test]
fn test_ddl_script() {
    let db = Database::from_json(COMPANY).unwrap();
    let script = db.generate_ddl_script().unwrap();

    let employees = "CREATE TABLE IF NOT EXISTS employees (
  emp_id INTEGER,
  first_name TEXT NOT NULL,
  last_name TEXT NOT NULL,
  salary REAL DEFAULT 0,
  dept_id INTEGER,
  hired DATE DEFAULT CURRENT_DATE,
  PRIMARY KEY (emp_id),
  CONSTRAINT uq_full_name UNIQUE (first_name, last_name),
  FOREIGN KEY (dept_id) REFERENCES departments(dept_id) ON DELETE SET NULL,
  CONSTRAINT chk_salary CHECK (salary >= 0)
);";
    assert!(script.contains(employees), "{script}");
    assert!(script.contains("  location TEXT DEFAULT 'HQ'\n"));
    assert!(script.ends_with(
        "CREATE INDEX IF NOT EXISTS idx_employees_lastname ON employees(last_name);"
    ));

    let departments = script.find("CREATE TABLE IF NOT EXISTS departments").unwrap();
    let employees = script.find("CREATE TABLE IF NOT EXISTS employees").unwrap();
    assert!(departments < employees);

    // Rendering is deterministic.
    assert_eq!(Database::from_json(COMPANY).unwrap().generate_ddl_script().unwrap(), script);
}

#[test]
fn test_drop_statements() {
    let db = Database::from_json(COMPANY).unwrap();
    let employees = db.table("employees").unwrap();
    assert_eq!(employees.drop_table_sql(), "DROP TABLE IF EXISTS employees;");
    assert_eq!(
        employees.drop_index_sqls(),
        vec!["DROP INDEX IF EXISTS idx_employees_lastname;"]
    );
}

// =============================================================================
// Test: Validation
// =============================================================================

#[test]
fn test_cycle_is_rejected() {
    let cyclic = r#"{
        "table_a": {"fields": {"id": "INTEGER PRIMARY KEY", "b_id": "INTEGER"},
                    "constraints": {"foreign_keys": [{"columns": "b_id", "ref_table": "table_b", "ref_columns": "id"}]}},
        "table_b": {"fields": {"id": "INTEGER PRIMARY KEY", "a_id": "INTEGER"},
                    "constraints": {"foreign_keys": [{"columns": "a_id", "ref_table": "table_a", "ref_columns": "id"}]}}
    }"#;
    assert!(matches!(
        Database::from_json(cyclic),
        Err(SchemaError::ForeignKeyCycle { .. })
    ));
}

#[test]
fn test_dangling_reference_is_rejected() {
    let dangling = r#"{
        "posts": {"fields": {"id": "INTEGER PRIMARY KEY", "author_id": "INTEGER"},
                  "constraints": {"foreign_keys": [{"columns": "author_id", "ref_table": "users", "ref_columns": "id"}]}}
    }"#;
    assert!(matches!(
        Database::from_json(dangling),
        Err(SchemaError::DanglingForeignKey { table, ref_table }) if table == "posts" && ref_table == "users"
    ));
}

#[test]
fn test_unknown_column_in_constraint() {
    let json = r#"{"t": {"fields": {"a": "INTEGER"}, "indexes": [{"columns": ["b"]}]}}"#;
    assert!(matches!(
        Database::from_json(json),
        Err(SchemaError::UnknownColumn { column, .. }) if column == "b"
    ));
}

#[test]
fn test_autoincrement_is_rejected() {
    let json = r#"{"t": {"fields": {"id": "INTEGER PRIMARY KEY AUTOINCREMENT"}}}"#;
    assert!(matches!(
        Database::from_json(json),
        Err(SchemaError::InvalidFieldSyntax { .. })
    ));
}

// =============================================================================
// Test: Legacy layout
// =============================================================================

#[test]
fn test_legacy_layout() {
    let legacy = r#"{
        "users": {
            "field_definition": {
                "id": "INTEGER NOT NULL",
                "username": "TEXT NOT NULL",
                "password": "TEXT NOT NULL",
                "created_at": "DATETIME DEFAULT CURRENT_TIMESTAMP"
            },
            "primary_keys": "id"
        }
    }"#;
    let db = Database::from_legacy_json(legacy).unwrap();
    let users = db.table("users").unwrap();
    assert_eq!(users.primary_key_columns(), ["id"]);
    assert_eq!(
        users.primary_key().unwrap().origin,
        PrimaryKeyOrigin::Table
    );
    assert!(db
        .generate_ddl_script()
        .unwrap()
        .contains("  created_at DATETIME DEFAULT CURRENT_TIMESTAMP,\n  PRIMARY KEY (id)\n);"));
}

// =============================================================================
// Test: Row boundary
// =============================================================================

#[test]
fn test_row_boundary() {
    let db = Database::from_json(COMPANY).unwrap();
    let employees = db.table("employees").unwrap();

    assert_eq!(
        employees.column_names().collect::<Vec<_>>(),
        vec!["emp_id", "first_name", "last_name", "salary", "dept_id", "hired"]
    );

    let hired = employees.field("hired").unwrap();
    assert_eq!(hired.value_kind(), ValueKind::Date);
    let date = chrono::NaiveDate::from_ymd_opt(2021, 6, 1).unwrap();
    let stored = hired.encode(Value::Date(date));
    assert_eq!(stored, Value::Text("2021-06-01".into()));
    assert_eq!(hired.decode(stored).unwrap(), Value::Date(date));

    let first_name = employees.field("first_name").unwrap();
    assert!(matches!(
        first_name.validate_value(&Value::Null),
        Err(SchemaError::NullValue(_))
    ));
}
