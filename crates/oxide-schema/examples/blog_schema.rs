//! Example: Blog Application Schema
//!
//! This example declares a blog schema with users, posts and comments,
//! creates it in a temporary database, then evolves it with a new column
//! and table through the auto-migration.
//!
//! Run with: cargo run --example blog_schema -p oxide-schema

use oxide_schema::prelude::*;

// =============================================================================
// Model Definitions
// =============================================================================

struct User;

impl SchemaModel for User {
    const TABLE: &'static str = "users";

    fn fields() -> Vec<Field> {
        vec![
            Field::new("id", "INTEGER").primary_key(),
            Field::new("username", "VARCHAR(100)").not_null().unique(),
            Field::new("email", "VARCHAR(255)").not_null(),
            Field::new("is_active", "BOOLEAN").not_null().default(true),
            Field::new("created_at", "DATETIME")
                .not_null()
                .default(TemporalKeyword::CurrentTimestamp),
        ]
    }
}

struct Post;

impl SchemaModel for Post {
    const TABLE: &'static str = "posts";

    fn fields() -> Vec<Field> {
        vec![
            Field::new("id", "INTEGER").primary_key(),
            Field::new("author_id", "INTEGER").not_null(),
            Field::new("title", "VARCHAR(200)").not_null(),
            Field::new("status", "TEXT")
                .not_null()
                .default("draft")
                .check("status IN ('draft', 'published')"),
        ]
    }

    fn configure(table: &mut Table) -> Result<()> {
        table.add_foreign_key(
            ForeignKey::new(vec!["author_id".into()], "users", vec!["id".into()])
                .on_delete(ForeignKeyAction::Cascade),
        )?;
        table.add_index(Index::new(vec!["author_id".into(), "status".into()]))
    }
}

/// Second revision: comments reference both users and posts.
const COMMENTS: &str = r#"{
    "comments": {
        "fields": {
            "id": "INTEGER PRIMARY KEY",
            "post_id": "INTEGER NOT NULL",
            "author_id": "INTEGER NOT NULL",
            "body": "TEXT NOT NULL CHECK (length(body) > 0)"
        },
        "constraints": {
            "foreign_keys": [
                {"columns": "post_id", "ref_table": "posts", "ref_columns": "id", "on_delete": "CASCADE"},
                {"columns": "author_id", "ref_table": "users", "ref_columns": "id"}
            ]
        },
        "indexes": [{"columns": "post_id"}]
    }
}"#;

fn first_revision() -> Result<Database> {
    let mut db = Database::new();
    db.add_model::<Post>()?;
    db.add_model::<User>()?;
    Ok(db)
}

fn second_revision() -> Result<Database> {
    let mut users = User::table()?;
    users.add_field(Field::new("bio", "TEXT"))?;

    let mut db = Database::new();
    db.add_table(users)?;
    db.add_model::<Post>()?;

    let description = SchemaDescription::from_json(COMMENTS)?;
    for (name, def) in &description.tables {
        db.add_table(Table::from_description(name, def)?)?;
    }
    db.validate_structure()?;
    Ok(db)
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!(" OXIDE-SCHEMA: Blog Application Example");
    println!("{}", "=".repeat(70));
    println!();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("blog.db");

    // First revision: a new database gets the full script
    let db = first_revision()?;
    println!("[1] Creation order:");
    for table in db.creation_order() {
        println!("    - {}", table.name());
    }
    println!();

    println!("[2] DDL script:");
    println!("{}", "-".repeat(70));
    println!("{}", db.generate_ddl_script()?);
    println!("{}", "-".repeat(70));
    println!();

    let mut connector = Connector::new(&path, db);
    connector.connect().await?;
    println!(
        "[3] Created {} (new database: {})\n",
        path.display(),
        connector.is_new_database()
    );
    connector.close().await?;

    // Second revision: the existing database is migrated
    println!("[4] Migrating to the second revision...");
    let mut connector = Connector::new(&path, second_revision()?);
    connector.connect().await?;
    let report = connector.validate().await?;
    for sql in &report.statements {
        println!("    {}", sql.replace('\n', "\n    "));
    }
    for warning in &report.warnings {
        println!("    warning: {warning}");
    }
    connector.close().await?;
    println!();

    println!("{}", "=".repeat(70));
    println!(" Example completed successfully!");
    println!("{}", "=".repeat(70));

    Ok(())
}
