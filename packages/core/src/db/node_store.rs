//! NodeStore Trait - Document Store Abstraction
//!
//! This module defines the `NodeStore` trait: the complete set of operations the
//! tree engine needs from a document store. Any backend that supports range
//! predicates and batch conditional increments can implement it (document stores,
//! key-value stores with secondary indexes, relational tables).
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async to support both embedded and network
//!    backends
//! 2. **No tree semantics**: The store knows nothing about nesting. Bound
//!    re-numbering is expressed as plain range updates by `TreeService`
//! 3. **Error Handling**: Uses `anyhow::Result` for flexible backend context; the
//!    service layer converts failures into `DatabaseError`
//! 4. **No transactions**: Each call stands alone. Multi-call atomicity is handled by
//!    the service's single-writer lock and mutation journal
//!
//! # Examples
//!
//! ```rust
//! use foldertree_core::db::{InMemoryStore, NodeStore};
//! use foldertree_core::models::{NewNode, NodeFilter, NodeRecord, OrderBy};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let store = InMemoryStore::new();
//! let id = store
//!     .insert_one(NodeRecord::from_new_node(NewNode::new("root"), 1, 2, 0))
//!     .await?;
//!
//! let roots = store
//!     .find(&NodeFilter::new().level_eq(0), Some(OrderBy::LeftAsc))
//!     .await?;
//! assert_eq!(roots[0].id, id);
//! # Ok(())
//! # }
//! ```

use crate::models::{FieldIncrements, Node, NodeFilter, NodeRecord, OrderBy};
use anyhow::Result;
use async_trait::async_trait;

/// Abstraction layer for node persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so one store can back a `TreeService`
/// shared across tasks.
///
/// # Method Categories
///
/// - **Reads**: `find`, `find_one`
/// - **Writes**: `update_many`, `insert_one`, `delete_many`
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Find every node matching `filter`
    ///
    /// # Arguments
    ///
    /// * `filter` - Conjunction of equality/range predicates (empty = all nodes)
    /// * `order_by` - Optional sort order; unspecified order when `None`
    async fn find(&self, filter: &NodeFilter, order_by: Option<OrderBy>) -> Result<Vec<Node>>;

    /// Apply additive increments to every node matching `filter`
    ///
    /// The filter is evaluated against the values before the update, and each
    /// matching record is incremented exactly once.
    ///
    /// # Returns
    ///
    /// Number of records updated
    async fn update_many(&self, filter: &NodeFilter, increments: FieldIncrements) -> Result<u64>;

    /// Persist a new record
    ///
    /// # Returns
    ///
    /// The identifier assigned by the store
    async fn insert_one(&self, record: NodeRecord) -> Result<String>;

    /// Delete every node matching `filter`
    ///
    /// # Returns
    ///
    /// Number of records deleted
    async fn delete_many(&self, filter: &NodeFilter) -> Result<u64>;

    /// Find a single node matching `filter`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(node))` if a node matches (the first one if several do)
    /// - `Ok(None)` if nothing matches (not an error)
    async fn find_one(&self, filter: &NodeFilter) -> Result<Option<Node>>;
}
