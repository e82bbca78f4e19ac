//! InMemoryStore - NodeStore Implementation Backed by a HashMap
//!
//! Process-local document store used by the test suites and by embedders that
//! want a tree without an external database. Each call takes the map lock once, so
//! individual operations are atomic, but (like a real document store) nothing
//! spans several calls.

use crate::db::NodeStore;
use crate::models::{FieldIncrements, Node, NodeFilter, NodeRecord, OrderBy};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory `NodeStore`
#[derive(Debug, Default)]
pub struct InMemoryStore {
    nodes: RwLock<HashMap<String, Node>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with existing nodes (ids are kept)
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Copy of every stored node in pre-order
    pub async fn snapshot(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.read().await.values().cloned().collect();
        OrderBy::LeftAsc.sort(&mut nodes);
        nodes
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

#[async_trait]
impl NodeStore for InMemoryStore {
    async fn find(&self, filter: &NodeFilter, order_by: Option<OrderBy>) -> Result<Vec<Node>> {
        let nodes = self.nodes.read().await;
        let mut matched: Vec<Node> = nodes
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect();

        if let Some(order) = order_by {
            order.sort(&mut matched);
        }

        Ok(matched)
    }

    async fn update_many(&self, filter: &NodeFilter, increments: FieldIncrements) -> Result<u64> {
        let mut nodes = self.nodes.write().await;
        let mut updated = 0u64;

        for node in nodes.values_mut() {
            if filter.matches(node) {
                increments.apply(node);
                updated += 1;
            }
        }

        Ok(updated)
    }

    async fn insert_one(&self, record: NodeRecord) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let node = record.into_node(id.clone());
        self.nodes.write().await.insert(id.clone(), node);
        Ok(id)
    }

    async fn delete_many(&self, filter: &NodeFilter) -> Result<u64> {
        let mut nodes = self.nodes.write().await;
        let before = nodes.len();
        nodes.retain(|_, n| !filter.matches(n));
        Ok((before - nodes.len()) as u64)
    }

    async fn find_one(&self, filter: &NodeFilter) -> Result<Option<Node>> {
        // Direct lookup when the filter names an id
        let nodes = self.nodes.read().await;
        if let Some(id) = &filter.id {
            return Ok(nodes.get(id).filter(|n| filter.matches(n)).cloned());
        }

        Ok(nodes
            .values()
            .filter(|n| filter.matches(n))
            .min_by_key(|n| n.left)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewNode;

    fn record(title: &str, left: i64, right: i64, level: i64) -> NodeRecord {
        NodeRecord::from_new_node(NewNode::new(title), left, right, level)
    }

    async fn sample_store() -> Result<InMemoryStore> {
        let store = InMemoryStore::new();
        store.insert_one(record("root", 1, 10, 0)).await?;
        store.insert_one(record("A", 2, 5, 1)).await?;
        store.insert_one(record("A1", 3, 4, 2)).await?;
        store.insert_one(record("B", 6, 9, 1)).await?;
        Ok(store)
    }

    #[tokio::test]
    async fn test_insert_assigns_unique_ids() -> Result<()> {
        let store = InMemoryStore::new();
        let a = store.insert_one(record("a", 1, 2, 0)).await?;
        let b = store.insert_one(record("b", 3, 4, 0)).await?;
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_sorted_by_left() -> Result<()> {
        let store = sample_store().await?;
        let nodes = store
            .find(&NodeFilter::new().level_eq(1), Some(OrderBy::LeftAsc))
            .await?;
        let titles: Vec<&str> = nodes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);

        let nodes = store.find(&NodeFilter::new(), Some(OrderBy::LeftDesc)).await?;
        assert_eq!(nodes[0].title, "B");
        Ok(())
    }

    #[tokio::test]
    async fn test_update_many_evaluates_filter_before_update() -> Result<()> {
        let store = sample_store().await?;

        // Without pre-evaluation a node pushed past the threshold would be hit twice
        let updated = store
            .update_many(&NodeFilter::new().right_gte(9), FieldIncrements::right(2))
            .await?;
        assert_eq!(updated, 2);

        let rights: Vec<i64> = store.snapshot().await.iter().map(|n| n.right).collect();
        assert_eq!(rights, vec![12, 5, 4, 11]);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_many_counts() -> Result<()> {
        let store = sample_store().await?;
        let deleted = store
            .delete_many(&NodeFilter::new().left_gte(2).right_lte(5))
            .await?;
        assert_eq!(deleted, 2);
        assert_eq!(store.len().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_one_by_id_and_filter() -> Result<()> {
        let store = sample_store().await?;
        let b = store
            .find_one(&NodeFilter::new().with_title("B"))
            .await?
            .expect("B should exist");

        let same = store.find_one(&NodeFilter::by_id(&b.id)).await?;
        assert_eq!(same.as_ref().map(|n| n.title.as_str()), Some("B"));

        let mismatch = store
            .find_one(&NodeFilter::by_id(&b.id).level_eq(0))
            .await?;
        assert!(mismatch.is_none());

        let first = store.find_one(&NodeFilter::new()).await?;
        assert_eq!(first.map(|n| n.title), Some("root".to_string()));
        Ok(())
    }
}
