//! TimedStore - Deadline and Error Mapping Around a NodeStore
//!
//! Every store call made by the tree services goes through `TimedStore`, which
//! applies the configured timeout and turns backend failures into `DatabaseError`.
//! A timed-out write has an unknown outcome; callers must treat it that way.

use crate::db::{DatabaseError, NodeStore};
use crate::models::{FieldIncrements, Node, NodeFilter, NodeRecord, OrderBy};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a store with an optional per-call deadline
#[derive(Clone)]
pub struct TimedStore {
    inner: Arc<dyn NodeStore>,
    timeout: Option<Duration>,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn NodeStore>, timeout: Option<Duration>) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, DatabaseError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Store call '{}' timed out after {:?}", operation, limit);
                    return Err(DatabaseError::timeout(operation, limit));
                }
            },
            None => fut.await,
        };

        result.map_err(|e| {
            tracing::warn!("Store call '{}' failed: {:#}", operation, e);
            DatabaseError::operation_failed(operation, e)
        })
    }

    pub async fn find(
        &self,
        filter: &NodeFilter,
        order_by: Option<OrderBy>,
    ) -> Result<Vec<Node>, DatabaseError> {
        self.run("find", self.inner.find(filter, order_by)).await
    }

    pub async fn find_one(&self, filter: &NodeFilter) -> Result<Option<Node>, DatabaseError> {
        self.run("find_one", self.inner.find_one(filter)).await
    }

    pub async fn update_many(
        &self,
        filter: &NodeFilter,
        increments: FieldIncrements,
    ) -> Result<u64, DatabaseError> {
        self.run("update_many", self.inner.update_many(filter, increments))
            .await
    }

    pub async fn insert_one(&self, record: NodeRecord) -> Result<String, DatabaseError> {
        self.run("insert_one", self.inner.insert_one(record)).await
    }

    pub async fn delete_many(&self, filter: &NodeFilter) -> Result<u64, DatabaseError> {
        self.run("delete_many", self.inner.delete_many(filter)).await
    }
}
