//! Database structure: tables plus the foreign key dependency graph.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Result, SchemaError};
use crate::table::Table;

/// Ordered collection of tables.
///
/// The structure is assembled once, validated, and then only read. Foreign
/// keys may reference tables that are added later; references are resolved
/// by [`Database::validate_structure`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Database {
    tables: IndexMap<String, Table>,
    /// Referenced table -> tables holding a foreign key to it, one entry
    /// per foreign key.
    #[serde(skip)]
    foreign_key_graph: IndexMap<String, Vec<String>>,
}

impl Database {
    /// Creates an empty database structure.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table and records its foreign key edges.
    pub fn add_table(&mut self, table: Table) -> Result<()> {
        if self.tables.contains_key(table.name()) {
            return Err(SchemaError::DuplicateTable(table.name().to_string()));
        }

        for fk in table.foreign_keys() {
            self.foreign_key_graph
                .entry(fk.ref_table.clone())
                .or_default()
                .push(table.name().to_string());
        }
        self.tables.insert(table.name().to_string(), table);
        Ok(())
    }

    /// Gets a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Tables in insertion order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Table names in insertion order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the structure has no tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables holding a foreign key to `table_name`.
    #[must_use]
    pub fn referencing_tables(&self, table_name: &str) -> &[String] {
        self.foreign_key_graph
            .get(table_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// For every table, the distinct tables it references.
    #[must_use]
    pub fn table_dependencies(&self) -> IndexMap<&str, Vec<&str>> {
        self.tables
            .values()
            .map(|table| {
                let mut deps: Vec<&str> = Vec::new();
                for fk in table.foreign_keys() {
                    if !deps.contains(&fk.ref_table.as_str()) {
                        deps.push(&fk.ref_table);
                    }
                }
                (table.name(), deps)
            })
            .collect()
    }

    /// Returns whether the foreign key graph contains a cycle, including a
    /// table referencing itself.
    #[must_use]
    pub fn check_foreign_key_cycles(&self) -> bool {
        self.find_foreign_key_cycle().is_some()
    }

    /// Returns the tables along the first cycle found, the first table
    /// repeated at the end.
    #[must_use]
    pub fn find_foreign_key_cycle(&self) -> Option<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();

        for name in self.tables.keys() {
            if !visited.contains(name.as_str()) {
                if let Some(cycle) = self.dfs(name, &mut visited, &mut stack) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs<'a>(
        &'a self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(name);
        stack.push(name);

        for neighbor in self.referencing_tables(name) {
            if let Some(pos) = stack.iter().position(|s| *s == neighbor.as_str()) {
                let mut cycle: Vec<String> = stack[pos..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(neighbor.clone());
                return Some(cycle);
            }
            if !visited.contains(neighbor.as_str()) {
                if let Some(cycle) = self.dfs(neighbor, visited, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        None
    }

    /// Orders tables so that every table comes after the tables it
    /// references (Kahn's algorithm).
    ///
    /// A table's in-degree is the number of foreign keys it declares. Among
    /// tables that are ready at the same time the earliest inserted wins.
    /// Tables the sort cannot reach (only possible for an invalid structure)
    /// are appended in insertion order.
    #[must_use]
    pub fn creation_order(&self) -> Vec<&Table> {
        let mut in_degree: Vec<usize> = self
            .tables
            .values()
            .map(|t| t.foreign_keys().len())
            .collect();
        let positions: HashMap<&str, usize> = self
            .tables
            .keys()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(i, _)| i)
            .collect();
        let mut placed = vec![false; self.tables.len()];
        let mut order = Vec::with_capacity(self.tables.len());

        while let Some(current) = ready.pop_first() {
            placed[current] = true;
            let Some((name, table)) = self.tables.get_index(current) else {
                continue;
            };
            order.push(table);

            for dependent in self.referencing_tables(name) {
                let Some(&pos) = positions.get(dependent.as_str()) else {
                    continue;
                };
                if placed[pos] || in_degree[pos] == 0 {
                    continue;
                }
                in_degree[pos] -= 1;
                if in_degree[pos] == 0 {
                    ready.insert(pos);
                }
            }
        }

        order.extend(
            self.tables
                .values()
                .enumerate()
                .filter(|(i, _)| !placed[*i])
                .map(|(_, t)| t),
        );
        order
    }

    /// Validates the whole structure.
    ///
    /// Fails on a foreign key cycle, on a foreign key naming a table that is
    /// not part of the database, on referenced columns that do not exist,
    /// and on index names shared by two tables.
    pub fn validate_structure(&self) -> Result<()> {
        if let Some(tables) = self.find_foreign_key_cycle() {
            return Err(SchemaError::ForeignKeyCycle { tables });
        }

        // Index names are global to an SQLite database.
        let mut index_names = HashSet::new();
        for table in self.tables.values() {
            for index in table.indexes() {
                let name = index.resolved_name(table.name());
                if !index_names.insert(name.clone()) {
                    return Err(SchemaError::DuplicateIndexName {
                        table: table.name().to_string(),
                        index: name.into_owned(),
                    });
                }
            }
        }

        for table in self.tables.values() {
            for fk in table.foreign_keys() {
                let Some(referenced) = self.tables.get(&fk.ref_table) else {
                    return Err(SchemaError::DanglingForeignKey {
                        table: table.name().to_string(),
                        ref_table: fk.ref_table.clone(),
                    });
                };
                if let Some(missing) = fk
                    .ref_columns
                    .iter()
                    .find(|c| referenced.field(c).is_none())
                {
                    return Err(SchemaError::UnknownColumn {
                        table: referenced.name().to_string(),
                        column: missing.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Generates the DDL script creating every table (in creation order)
    /// followed by every index. Fails instead of emitting SQL for an invalid
    /// structure.
    pub fn generate_ddl_script(&self) -> Result<String> {
        self.validate_structure()?;

        let order = self.creation_order();
        let mut statements: Vec<String> = order.iter().map(|t| t.create_table_sql()).collect();
        statements.extend(order.iter().flat_map(|t| t.create_index_sqls()));

        Ok(statements.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{ForeignKey, Index};
    use crate::field::Field;

    fn table(name: &str, refs: &[&str]) -> Table {
        let mut table = Table::new(name);
        table.add_field(Field::new("id", "INTEGER").primary_key()).unwrap();
        for r in refs {
            let column = format!("{r}_id");
            table.add_field(Field::new(column.clone(), "INTEGER")).unwrap();
            table
                .add_foreign_key(ForeignKey::new(
                    vec![column],
                    *r,
                    vec!["id".to_string()],
                ))
                .unwrap();
        }
        table
    }

    fn database(tables: Vec<Table>) -> Database {
        let mut db = Database::new();
        for t in tables {
            db.add_table(t).unwrap();
        }
        db
    }

    fn names<'a>(tables: &[&'a Table]) -> Vec<&'a str> {
        tables.iter().map(|t| t.name()).collect()
    }

    #[test]
    fn test_duplicate_table() {
        let mut db = database(vec![table("users", &[])]);
        let err = db.add_table(table("users", &[])).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTable(name) if name == "users"));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_creation_order_respects_dependencies() {
        let db = database(vec![table("posts", &["users"]), table("users", &[])]);
        assert_eq!(names(&db.creation_order()), vec!["users", "posts"]);
    }

    #[test]
    fn test_creation_order_is_stable() {
        let db = database(vec![
            table("comments", &["posts", "users"]),
            table("tags", &[]),
            table("posts", &["users"]),
            table("audit", &[]),
            table("users", &[]),
        ]);
        assert_eq!(
            names(&db.creation_order()),
            vec!["tags", "audit", "users", "posts", "comments"]
        );
    }

    #[test]
    fn test_every_table_after_its_dependencies() {
        let db = database(vec![
            table("d", &["b", "c"]),
            table("c", &["a"]),
            table("b", &["a"]),
            table("a", &[]),
            table("e", &["d", "a"]),
        ]);
        db.validate_structure().unwrap();

        let order = names(&db.creation_order());
        assert_eq!(order.len(), 5);
        for (name, deps) in db.table_dependencies() {
            let pos = order.iter().position(|n| *n == name).unwrap();
            for dep in deps {
                let dep_pos = order.iter().position(|n| *n == dep).unwrap();
                assert!(dep_pos < pos, "{dep} must come before {name}");
            }
        }
    }

    #[test]
    fn test_cycle_detection() {
        let db = database(vec![table("tableA", &["tableB"]), table("tableB", &["tableA"])]);
        assert!(db.check_foreign_key_cycles());
        assert!(matches!(
            db.validate_structure(),
            Err(SchemaError::ForeignKeyCycle { .. })
        ));
        assert!(matches!(
            db.generate_ddl_script(),
            Err(SchemaError::ForeignKeyCycle { .. })
        ));

        // Unreachable tables are still returned.
        assert_eq!(db.creation_order().len(), 2);
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let db = database(vec![table("other", &[]), table("nodes", &["nodes"])]);
        assert!(db.check_foreign_key_cycles());
        assert_eq!(
            db.find_foreign_key_cycle(),
            Some(vec!["nodes".to_string(), "nodes".to_string()])
        );
    }

    #[test]
    fn test_cycle_in_disconnected_component() {
        let db = database(vec![
            table("a", &[]),
            table("b", &["a"]),
            table("x", &["z"]),
            table("y", &["x"]),
            table("z", &["y"]),
        ]);
        assert!(db.check_foreign_key_cycles());
        let acyclic = database(vec![table("a", &[]), table("b", &["a"])]);
        assert!(!acyclic.check_foreign_key_cycles());
    }

    #[test]
    fn test_dangling_foreign_key() {
        let db = database(vec![table("posts", &["users"])]);
        let err = db.validate_structure().unwrap_err();
        assert!(matches!(
            err,
            SchemaError::DanglingForeignKey { ref table, ref ref_table }
                if table == "posts" && ref_table == "users"
        ));
        assert!(db.generate_ddl_script().is_err());
    }

    #[test]
    fn test_unknown_referenced_column() {
        let mut posts = Table::new("posts");
        posts.add_field(Field::new("author", "TEXT")).unwrap();
        posts
            .add_foreign_key(ForeignKey::new(
                vec!["author".into()],
                "users",
                vec!["name".into()],
            ))
            .unwrap();
        let db = database(vec![table("users", &[]), posts]);

        assert!(matches!(
            db.validate_structure(),
            Err(SchemaError::UnknownColumn { ref table, ref column }) if table == "users" && column == "name"
        ));
    }

    #[test]
    fn test_dependency_queries() {
        let mut messages = Table::new("messages");
        messages.add_field(Field::new("sender", "INTEGER")).unwrap();
        messages.add_field(Field::new("recipient", "INTEGER")).unwrap();
        for column in ["sender", "recipient"] {
            messages
                .add_foreign_key(ForeignKey::new(
                    vec![column.into()],
                    "users",
                    vec!["id".into()],
                ))
                .unwrap();
        }
        let db = database(vec![
            table("users", &[]),
            table("posts", &["users"]),
            table("likes", &["users", "posts"]),
            messages,
        ]);
        assert_eq!(
            db.referencing_tables("users"),
            ["posts", "likes", "messages", "messages"]
        );
        assert!(db.referencing_tables("likes").is_empty());

        let deps = db.table_dependencies();
        assert_eq!(deps["likes"], vec!["users", "posts"]);
        assert_eq!(deps["messages"], vec!["users"]);
        assert!(deps["users"].is_empty());

        // Both foreign keys of `messages` count towards its in-degree.
        let order = names(&db.creation_order());
        assert_eq!(order, vec!["users", "posts", "likes", "messages"]);
    }

    #[test]
    fn test_generate_ddl_script() {
        let mut users = table("users", &[]);
        users.add_field(Field::new("email", "TEXT")).unwrap();
        users
            .add_index(Index::new(vec!["email".into()]).unique())
            .unwrap();
        let db = database(vec![table("posts", &["users"]), users]);

        let script = db.generate_ddl_script().unwrap();
        let users_pos = script.find("CREATE TABLE IF NOT EXISTS users").unwrap();
        let posts_pos = script.find("CREATE TABLE IF NOT EXISTS posts").unwrap();
        let index_pos = script.find("CREATE UNIQUE INDEX").unwrap();
        assert!(users_pos < posts_pos);
        assert!(posts_pos < index_pos);
        assert_eq!(script, db.generate_ddl_script().unwrap());
    }

    #[test]
    fn test_derived_index_names_collide_across_tables() {
        let mut a_b = Table::new("a_b");
        a_b.add_field(Field::new("c", "TEXT")).unwrap();
        a_b.add_index(Index::new(vec!["c".into()])).unwrap();

        let mut a = Table::new("a");
        a.add_field(Field::new("b_c", "TEXT")).unwrap();
        a.add_index(Index::new(vec!["b_c".into()]).unique()).unwrap();

        let db = database(vec![a_b, a]);
        assert!(matches!(
            db.validate_structure(),
            Err(SchemaError::DuplicateIndexName { ref table, ref index })
                if table == "a" && index == "idx_a_b_c"
        ));
        assert!(db.generate_ddl_script().is_err());

        // An explicit name resolves the clash.
        let mut renamed = Table::new("a");
        renamed.add_field(Field::new("b_c", "TEXT")).unwrap();
        renamed
            .add_index(Index::new(vec!["b_c".into()]).unique().named("uq_a_b_c"))
            .unwrap();
        let mut a_b = Table::new("a_b");
        a_b.add_field(Field::new("c", "TEXT")).unwrap();
        a_b.add_index(Index::new(vec!["c".into()])).unwrap();
        assert!(database(vec![a_b, renamed]).validate_structure().is_ok());
    }
}
