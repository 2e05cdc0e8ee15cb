//! End-to-end tests for the connector against SQLite files.

use oxide_schema::prelude::*;
use tempfile::TempDir;

const V1: &str = r#"{
    "users": {
        "fields": {
            "id": "INTEGER PRIMARY KEY",
            "username": "TEXT NOT NULL UNIQUE",
            "created_at": "DATETIME DEFAULT CURRENT_TIMESTAMP"
        }
    },
    "posts": {
        "fields": {
            "id": "INTEGER PRIMARY KEY",
            "author_id": "INTEGER NOT NULL",
            "title": "TEXT NOT NULL"
        },
        "constraints": {
            "foreign_keys": [{"columns": "author_id", "ref_table": "users", "ref_columns": "id", "on_delete": "CASCADE"}]
        },
        "indexes": [{"columns": "author_id"}]
    }
}"#;

const V2: &str = r#"{
    "users": {
        "fields": {
            "id": "INTEGER PRIMARY KEY",
            "username": "TEXT NOT NULL UNIQUE",
            "created_at": "DATETIME DEFAULT CURRENT_TIMESTAMP",
            "karma": "INTEGER NOT NULL DEFAULT 0"
        }
    },
    "posts": {
        "fields": {
            "id": "INTEGER PRIMARY KEY",
            "author_id": "INTEGER NOT NULL",
            "title": "TEXT NOT NULL"
        },
        "constraints": {
            "foreign_keys": [{"columns": "author_id", "ref_table": "users", "ref_columns": "id", "on_delete": "CASCADE"}]
        },
        "indexes": [{"columns": "author_id"}]
    },
    "tags": {
        "fields": {
            "post_id": "INTEGER NOT NULL",
            "label": "TEXT NOT NULL"
        },
        "constraints": {
            "primary_key": ["post_id", "label"],
            "foreign_keys": [{"columns": "post_id", "ref_table": "posts", "ref_columns": "id"}]
        }
    }
}"#;

#[tokio::test]
async fn test_create_then_evolve() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blog.db");

    let mut connector = Connector::new(&path, Database::from_json(V1).unwrap());
    connector.connect().await.unwrap();
    assert!(connector.is_new_database());
    connector
        .execute("INSERT INTO users (id, username) VALUES (1, 'ada')")
        .await
        .unwrap();
    connector.close().await.unwrap();

    let mut connector = Connector::new(&path, Database::from_json(V2).unwrap());
    connector.connect().await.unwrap();
    assert!(!connector.is_new_database());

    let report = connector.validate().await.unwrap();
    assert_eq!(
        report.added_columns,
        vec![("users".to_string(), "karma".to_string())]
    );
    assert_eq!(report.created_tables, vec!["tags"]);
    assert_eq!(
        report.statements[0],
        "ALTER TABLE users ADD COLUMN karma INTEGER NOT NULL DEFAULT 0;"
    );
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    connector.close().await.unwrap();

    // The live structure now matches the second revision.
    let mut connector = Connector::new(&path, Database::from_json(V2).unwrap());
    connector.connect().await.unwrap();
    assert!(connector.validate().await.unwrap().is_clean());

    let live = connector.load_structure().await.unwrap();
    assert_eq!(
        live.table("tags").unwrap().primary_key_columns(),
        ["post_id", "label"]
    );
    assert_eq!(
        live.table("users")
            .unwrap()
            .column_names()
            .collect::<Vec<_>>(),
        vec!["id", "username", "created_at", "karma"]
    );

    // Existing rows got the column default.
    assert_eq!(
        connector
            .execute("UPDATE users SET username = 'ada' WHERE karma = 0")
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_foreign_keys_are_enforced() {
    let mut connector = Connector::new(":memory:", Database::from_json(V1).unwrap());
    connector.connect().await.unwrap();

    let orphan = connector
        .execute("INSERT INTO posts (id, author_id, title) VALUES (1, 42, 'orphan')")
        .await;
    assert!(matches!(orphan, Err(SchemaError::Database(_))));

    connector
        .execute("INSERT INTO users (id, username) VALUES (42, 'grace')")
        .await
        .unwrap();
    connector
        .execute("INSERT INTO posts (id, author_id, title) VALUES (1, 42, 'hello')")
        .await
        .unwrap();
    assert_eq!(
        connector.execute("DELETE FROM users WHERE id = 42").await.unwrap(),
        1
    );
    // ON DELETE CASCADE removed the post.
    assert_eq!(connector.execute("DELETE FROM posts").await.unwrap(), 0);
}

#[tokio::test]
async fn test_live_structure_round_trips_through_ddl() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("copy.db");

    let mut source = Connector::new(":memory:", Database::from_json(V2).unwrap());
    source.connect().await.unwrap();
    let live = source.load_structure().await.unwrap();

    let mut copy = Connector::new(&path, live.clone());
    copy.connect().await.unwrap();
    assert!(copy.is_new_database());
    assert_eq!(copy.load_structure().await.unwrap(), live);
}

#[tokio::test]
async fn test_table_with_sqlite_like_name_is_migrated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.db");

    let v1 = r#"{"sqliteconfig": {"fields": {"id": "INTEGER PRIMARY KEY"}}}"#;
    let v2 = r#"{"sqliteconfig": {"fields": {"id": "INTEGER PRIMARY KEY", "note": "TEXT"}}}"#;

    let mut connector = Connector::new(&path, Database::from_json(v1).unwrap());
    connector.connect().await.unwrap();
    connector.close().await.unwrap();

    let mut connector = Connector::new(&path, Database::from_json(v2).unwrap());
    connector.connect().await.unwrap();
    let report = connector.validate().await.unwrap();
    assert!(report.created_tables.is_empty());
    assert_eq!(
        report.added_columns,
        vec![("sqliteconfig".to_string(), "note".to_string())]
    );

    let live = connector.load_structure().await.unwrap();
    assert_eq!(live.table_names().collect::<Vec<_>>(), vec!["sqliteconfig"]);
    connector.close().await.unwrap();
}
