//! Shared helpers for the integration tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use foldertree_core::db::{InMemoryStore, NodeStore};
use foldertree_core::models::{FieldIncrements, NewNode, Node, NodeFilter, NodeRecord, OrderBy};
use foldertree_core::{TreeConfig, TreeService};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, Once};

static TRACING: Once = Once::new();

/// Install an env-filtered subscriber once per test binary (`RUST_LOG=debug`)
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Node with `id == title`, for seeding stores with known bounds
pub fn seeded(title: &str, left: i64, right: i64, level: i64) -> Node {
    NodeRecord::from_new_node(NewNode::new(title), left, right, level).into_node(title)
}

/// Seed node whose id differs from its title
pub fn seeded_as(id: &str, title: &str, left: i64, right: i64, level: i64) -> Node {
    NodeRecord::from_new_node(NewNode::new(title), left, right, level).into_node(id)
}

/// `Root(1,10)`, `A(2,5)`, `A1(3,4)`, `B(6,9)`
pub fn sample_nodes() -> Vec<Node> {
    vec![
        seeded("Root", 1, 10, 0),
        seeded("A", 2, 5, 1),
        seeded("A1", 3, 4, 2),
        seeded("B", 6, 9, 1),
    ]
}

pub async fn tree_over(store: Arc<dyn NodeStore>, config: TreeConfig) -> Result<TreeService> {
    init_test_tracing();
    Ok(TreeService::new(store, config).await?)
}

/// (title, left, right, level) of every node in pre-order
pub fn bounds(nodes: &[Node]) -> Vec<(String, i64, i64, i64)> {
    nodes
        .iter()
        .map(|n| (n.title.clone(), n.left, n.right, n.level))
        .collect()
}

pub fn row(title: &str, left: i64, right: i64, level: i64) -> (String, i64, i64, i64) {
    (title.to_string(), left, right, level)
}

/// Every (ancestor id, descendant id) pair implied by the bounds
pub fn ancestry(nodes: &[Node]) -> BTreeSet<(String, String)> {
    let mut pairs = BTreeSet::new();
    for outer in nodes {
        for inner in nodes {
            if outer.contains(inner) {
                pairs.insert((outer.id.clone(), inner.id.clone()));
            }
        }
    }
    pairs
}

/// Ancestry pairs restricted to nodes whose ids are in `keep`
pub fn ancestry_among(nodes: &[Node], keep: &BTreeSet<String>) -> BTreeSet<(String, String)> {
    ancestry(nodes)
        .into_iter()
        .filter(|(a, d)| keep.contains(a) && keep.contains(d))
        .collect()
}

/// What the next matching write should do
#[derive(Debug, Clone, Copy)]
enum Fault {
    Fail,
    Stall,
}

/// Store wrapper that lets a number of writes through, then breaks the next one
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    plan: Mutex<Option<(usize, Fault)>>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            plan: Mutex::new(None),
        }
    }

    /// Let `successes` writes through, then fail the next one with an error
    pub fn fail_after(&self, successes: usize) {
        *self.plan.lock().unwrap() = Some((successes, Fault::Fail));
    }

    /// Let `successes` writes through, then never answer the next one
    pub fn stall_after(&self, successes: usize) {
        *self.plan.lock().unwrap() = Some((successes, Fault::Stall));
    }

    pub fn heal(&self) {
        *self.plan.lock().unwrap() = None;
    }

    pub async fn snapshot(&self) -> Vec<Node> {
        self.inner.snapshot().await
    }

    fn next_fault(&self) -> Option<Fault> {
        let mut plan = self.plan.lock().unwrap();
        match plan.as_mut() {
            Some((0, fault)) => {
                let fault = *fault;
                *plan = None;
                Some(fault)
            }
            Some((remaining, _)) => {
                *remaining -= 1;
                None
            }
            None => None,
        }
    }

    async fn guard_write(&self, operation: &str) -> Result<()> {
        match self.next_fault() {
            Some(Fault::Fail) => Err(anyhow::anyhow!("injected failure in {}", operation)),
            Some(Fault::Stall) => std::future::pending().await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NodeStore for FlakyStore {
    async fn find(&self, filter: &NodeFilter, order_by: Option<OrderBy>) -> Result<Vec<Node>> {
        self.inner.find(filter, order_by).await
    }

    async fn update_many(&self, filter: &NodeFilter, increments: FieldIncrements) -> Result<u64> {
        self.guard_write("update_many").await?;
        self.inner.update_many(filter, increments).await
    }

    async fn insert_one(&self, record: NodeRecord) -> Result<String> {
        self.guard_write("insert_one").await?;
        self.inner.insert_one(record).await
    }

    async fn delete_many(&self, filter: &NodeFilter) -> Result<u64> {
        self.guard_write("delete_many").await?;
        self.inner.delete_many(filter).await
    }

    async fn find_one(&self, filter: &NodeFilter) -> Result<Option<Node>> {
        self.inner.find_one(filter).await
    }
}
