//! SurrealStore - NodeStore Implementation for SurrealDB
//!
//! Persists tree nodes as documents of a SCHEMALESS `content` table in an embedded
//! SurrealDB (RocksDB engine). Filters are translated to SurrealQL `WHERE` clauses
//! with bound parameters; `update_many` becomes a single `UPDATE ... SET f += $d`
//! statement, so each call is atomic on its own.
//!
//! Enabled with the `surrealdb` cargo feature.
//!
//! # Examples
//!
//! ```rust,no_run
//! use foldertree_core::db::SurrealStore;
//! use foldertree_core::{TreeConfig, TreeService};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SurrealStore::new(PathBuf::from("./data/tree.db")).await?);
//!     let tree = TreeService::new(store, TreeConfig::default()).await?;
//!     let root = tree.ensure_root().await?;
//!     println!("root: {}", root.id);
//!     Ok(())
//! }
//! ```

use crate::db::{DatabaseError, NodeStore};
use crate::models::{FieldIncrements, Node, NodeFilter, NodeRecord, OrderBy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use surrealdb::engine::local::{Db, RocksDb};
use surrealdb::Surreal;
use uuid::Uuid;

const TABLE: &str = "content";

/// Internal struct matching the stored document, keyed by the `uuid` field
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SurrealNode {
    uuid: String,
    title: String,
    left: i64,
    right: i64,
    level: i64,
    properties: Value,
    created_at: String,
}

impl From<SurrealNode> for Node {
    fn from(sn: SurrealNode) -> Self {
        let created_at = DateTime::parse_from_rfc3339(&sn.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|e| {
                tracing::warn!(
                    "Node {} has unreadable created_at '{}' ({}), using current time",
                    sn.uuid,
                    sn.created_at,
                    e
                );
                Utc::now()
            });

        Node {
            id: sn.uuid,
            title: sn.title,
            left: sn.left,
            right: sn.right,
            level: sn.level,
            properties: sn.properties,
            created_at,
        }
    }
}

/// SurrealQL fragment plus the parameters it references
struct WhereClause {
    sql: String,
    strings: Vec<(String, String)>,
    ints: Vec<(String, i64)>,
}

impl WhereClause {
    fn from_filter(filter: &NodeFilter) -> Self {
        let mut conditions = Vec::new();
        let mut strings = Vec::new();
        let mut ints = Vec::new();

        if let Some(id) = &filter.id {
            conditions.push("uuid = $id".to_string());
            strings.push(("id".to_string(), id.clone()));
        }

        if let Some(title) = &filter.title {
            conditions.push("title = $title".to_string());
            strings.push(("title".to_string(), title.clone()));
        }

        for (i, predicate) in filter.predicates().iter().enumerate() {
            let param = format!("b{}", i);
            conditions.push(format!(
                "`{}` {} ${}",
                predicate.field.as_str(),
                predicate.operator.symbol(),
                param
            ));
            ints.push((param, predicate.value));
        }

        let sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        Self { sql, strings, ints }
    }
}

fn order_clause(order_by: Option<OrderBy>) -> &'static str {
    match order_by {
        Some(OrderBy::LeftAsc) => " ORDER BY `left` ASC",
        Some(OrderBy::LeftDesc) => " ORDER BY `left` DESC",
        None => "",
    }
}

/// SurrealStore implements NodeStore for an embedded SurrealDB backend
pub struct SurrealStore {
    db: Arc<Surreal<Db>>,
}

impl SurrealStore {
    /// Open (or create) an embedded RocksDB-backed store at `db_path`
    ///
    /// # Errors
    ///
    /// `DatabaseError::InitializationFailed` if the database cannot be opened or
    /// the schema setup fails
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        let db = Surreal::new::<RocksDb>(db_path.clone())
            .await
            .map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "cannot open RocksDB store at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        db.use_ns("foldertree").use_db("tree").await.map_err(|e| {
            DatabaseError::initialization_failed(format!("cannot select namespace: {}", e))
        })?;

        let db = Arc::new(db);
        Self::initialize_schema(&db).await.map_err(|e| {
            DatabaseError::initialization_failed(format!("schema setup failed: {:#}", e))
        })?;

        Ok(Self { db })
    }

    /// Create the content table and the indexes the range queries rely on
    async fn initialize_schema(db: &Surreal<Db>) -> Result<()> {
        db.query(
            "
            DEFINE TABLE IF NOT EXISTS content SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS content_uuid ON TABLE content COLUMNS uuid UNIQUE;
            DEFINE INDEX IF NOT EXISTS content_left ON TABLE content COLUMNS `left`;
            DEFINE INDEX IF NOT EXISTS content_right ON TABLE content COLUMNS `right`;
            ",
        )
        .await
        .context("Failed to create content table")?;

        Ok(())
    }

    async fn select(&self, filter: &NodeFilter, suffix: &str) -> Result<Vec<Node>> {
        let clause = WhereClause::from_filter(filter);
        let sql = format!("SELECT * FROM {}{}{};", TABLE, clause.sql, suffix);

        let mut query = self.db.query(sql);
        for binding in clause.strings {
            query = query.bind(binding);
        }
        for binding in clause.ints {
            query = query.bind(binding);
        }

        let mut response = query.await.context("Failed to query content")?;
        let nodes: Vec<SurrealNode> = response
            .take(0)
            .context("Failed to extract nodes from query response")?;
        Ok(nodes.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl NodeStore for SurrealStore {
    async fn find(&self, filter: &NodeFilter, order_by: Option<OrderBy>) -> Result<Vec<Node>> {
        self.select(filter, order_clause(order_by)).await
    }

    async fn update_many(&self, filter: &NodeFilter, increments: FieldIncrements) -> Result<u64> {
        let entries = increments.entries();
        if entries.is_empty() {
            return Ok(0);
        }

        let clause = WhereClause::from_filter(filter);
        let assignments: Vec<String> = entries
            .iter()
            .map(|(field, _)| format!("`{0}` += $inc_{0}", field.as_str()))
            .collect();
        let sql = format!(
            "UPDATE {} SET {}{} RETURN VALUE uuid;",
            TABLE,
            assignments.join(", "),
            clause.sql
        );

        let mut query = self.db.query(sql);
        for binding in clause.strings {
            query = query.bind(binding);
        }
        for binding in clause.ints {
            query = query.bind(binding);
        }
        for (field, delta) in entries {
            query = query.bind((format!("inc_{}", field.as_str()), delta));
        }

        let mut response = query.await.context("Failed to update content bounds")?;
        let updated: Vec<String> = response
            .take(0)
            .context("Failed to extract updated ids")?;
        Ok(updated.len() as u64)
    }

    async fn insert_one(&self, record: NodeRecord) -> Result<String> {
        let uuid = Uuid::new_v4().to_string();

        self.db
            .query(
                "
                CREATE type::thing($table, $uuid) CONTENT {
                    uuid: $uuid,
                    title: $title,
                    left: $left,
                    right: $right,
                    level: $level,
                    properties: $properties,
                    created_at: $created_at
                };
                ",
            )
            .bind(("table", TABLE))
            .bind(("uuid", uuid.clone()))
            .bind(("title", record.title))
            .bind(("left", record.left))
            .bind(("right", record.right))
            .bind(("level", record.level))
            .bind(("properties", record.properties))
            .bind(("created_at", record.created_at.to_rfc3339()))
            .await
            .context("Failed to create content record")?
            .check()
            .context("Content record was rejected")?;

        Ok(uuid)
    }

    async fn delete_many(&self, filter: &NodeFilter) -> Result<u64> {
        let clause = WhereClause::from_filter(filter);
        let sql = format!("DELETE {}{} RETURN BEFORE;", TABLE, clause.sql);

        let mut query = self.db.query(sql);
        for binding in clause.strings {
            query = query.bind(binding);
        }
        for binding in clause.ints {
            query = query.bind(binding);
        }

        let mut response = query.await.context("Failed to delete content")?;
        let deleted: Vec<SurrealNode> = response
            .take(0)
            .context("Failed to extract deleted records")?;
        Ok(deleted.len() as u64)
    }

    async fn find_one(&self, filter: &NodeFilter) -> Result<Option<Node>> {
        let nodes = self.select(filter, " ORDER BY `left` ASC LIMIT 1").await?;
        Ok(nodes.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewNode;
    use tempfile::TempDir;

    async fn create_test_store() -> Result<(SurrealStore, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test_surreal.db");
        let store = SurrealStore::new(db_path).await?;
        Ok((store, temp_dir))
    }

    #[test]
    fn test_where_clause_translation() {
        let filter = NodeFilter::new().with_title("a").left_gt(2).right_lt(9);
        let clause = WhereClause::from_filter(&filter);
        assert_eq!(
            clause.sql,
            " WHERE title = $title AND `left` > $b0 AND `right` < $b1"
        );
        assert_eq!(clause.ints, vec![("b0".to_string(), 2), ("b1".to_string(), 9)]);
    }

    #[test]
    fn test_unreadable_created_at_falls_back_to_now() {
        let before = Utc::now();
        let node: Node = SurrealNode {
            uuid: "n-1".to_string(),
            title: "a".to_string(),
            left: 2,
            right: 3,
            level: 1,
            properties: Value::Null,
            created_at: "yesterday".to_string(),
        }
        .into();

        assert_eq!(node.id, "n-1");
        assert!(node.created_at >= before);
    }

    #[tokio::test]
    async fn test_unusable_path_is_an_initialization_failure() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("not_a_directory");
        std::fs::write(&db_path, b"plain file")?;

        let err = SurrealStore::new(db_path)
            .await
            .err()
            .expect("opening a store over a plain file should fail");
        assert!(matches!(
            err.downcast_ref::<DatabaseError>(),
            Some(DatabaseError::InitializationFailed(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_shift_and_delete() -> Result<()> {
        let (store, _temp_dir) = create_test_store().await?;

        let root = NodeRecord::from_new_node(NewNode::new("root"), 1, 4, 0);
        let child = NodeRecord::from_new_node(NewNode::new("a"), 2, 3, 1);
        let root_id = store.insert_one(root).await?;
        store.insert_one(child).await?;

        let updated = store
            .update_many(&NodeFilter::new().right_gte(4), FieldIncrements::right(2))
            .await?;
        assert_eq!(updated, 1);

        let root = store
            .find_one(&NodeFilter::by_id(&root_id))
            .await?
            .expect("root should exist");
        assert_eq!(root.right, 6);

        let deleted = store.delete_many(&NodeFilter::new().level_eq(1)).await?;
        assert_eq!(deleted, 1);

        let remaining = store.find(&NodeFilter::new(), Some(OrderBy::LeftAsc)).await?;
        assert_eq!(remaining.len(), 1);

        Ok(())
    }
}
