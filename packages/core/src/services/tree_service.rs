//! TreeService - Interval Tree Mutation Engine
//!
//! Owns one nested-set tree stored through a `NodeStore` and performs every
//! mutation as a fixed sequence of range updates:
//!
//! - **Insert**: open a two-number slot at the parent's right bound
//! - **Remove**: delete the subtree interval, then close the gap by its full width
//! - **Move**: widen the destination, translate the subtree into it, compact the
//!   vacated region
//!
//! # Concurrency
//!
//! A single `RwLock<()>` serialises mutations against each other and against
//! readers. Mutations hold the write guard for their whole duration, so no reader
//! ever sees half-shifted bounds. Multi-step reads go through a `TreeReader`,
//! which holds one read guard for its lifetime.
//!
//! # Failure Handling
//!
//! The store has no transactions. Every mutation is journaled (see
//! `MutationJournal`) before its first write. A store failure after that point
//! taints the tree: mutations are refused with `ConsistencyViolation` until
//! `recover` (or a clean `verify_integrity`) resolves it. Reads keep working.

use crate::config::TreeConfig;
use crate::db::{DomainEvent, NodeStore, TimedStore};
use crate::models::{
    validate_title, FieldIncrements, NewNode, Node, NodeFilter, NodeRecord, OrderBy,
};
use crate::services::error::TreeServiceError;
use crate::services::integrity::{self, IntegrityReport};
use crate::services::journal::{
    AppliedPhase, EntryStatus, JournalEntry, JournalPhase, MutationJournal, MutationKind,
    RecoveryAction,
};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock, RwLockReadGuard};

/// Result of `remove_node`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveOutcome {
    /// The node itself plus all of its descendants
    pub removed_count: u64,
}

/// Result of `recover`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryOutcome {
    pub action: RecoveryAction,
    /// Journal entries that were resolved
    pub entries: Vec<String>,
    /// Store writes issued while resolving them
    pub phases_applied: usize,
    /// Integrity scan taken after recovery
    pub report: IntegrityReport,
}

/// Nested-set tree engine over a document store
///
/// # Examples
///
/// ```rust
/// use foldertree_core::db::InMemoryStore;
/// use foldertree_core::models::NewNode;
/// use foldertree_core::{TreeConfig, TreeService};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let tree = TreeService::new(Arc::new(InMemoryStore::new()), TreeConfig::default()).await?;
/// let root = tree.ensure_root().await?;
/// let docs = tree.insert_node(&root, NewNode::new("docs")).await?;
///
/// assert_eq!((docs.left, docs.right, docs.level), (2, 3, 1));
/// assert_eq!(tree.get_children(&root.id).await?.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct TreeService {
    store: TimedStore,
    config: TreeConfig,

    /// Writers: mutations and recovery. Readers: queries and path resolution.
    lock: RwLock<()>,

    journal: MutationJournal,

    event_tx: broadcast::Sender<DomainEvent>,

    /// Set while an interrupted mutation is unresolved
    tainted: AtomicBool,
}

impl TreeService {
    /// Create a service for the tree held by `store`
    ///
    /// Opens the journal file when `config.journal_path` is set. If the journal
    /// holds unfinished mutations the service starts tainted.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty path separator or an unusable root title
    /// - `JournalError` when the journal file cannot be read or created
    pub async fn new(
        store: Arc<dyn NodeStore>,
        config: TreeConfig,
    ) -> Result<Self, TreeServiceError> {
        if config.path_separator.is_empty() {
            return Err(TreeServiceError::invalid_argument(
                "path separator must not be empty",
            ));
        }
        validate_title(&config.root_title, &config.path_separator)?;

        let journal = match &config.journal_path {
            Some(path) => MutationJournal::open(path.clone()).await?,
            None => MutationJournal::in_memory(),
        };

        let tainted = journal.has_open_entries().await;
        if tainted {
            tracing::warn!("Tree starts tainted: unfinished mutations found in the journal");
        }

        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Ok(Self {
            store: TimedStore::new(store, config.store_timeout),
            config,
            lock: RwLock::new(()),
            journal,
            event_tx,
            tainted: AtomicBool::new(tainted),
        })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// True while an interrupted mutation blocks further mutations
    pub fn is_tainted(&self) -> bool {
        self.tainted.load(Ordering::SeqCst)
    }

    /// Journal entries of mutations that never completed
    pub async fn pending_mutations(&self) -> Vec<JournalEntry> {
        self.journal.open_entries().await
    }

    /// Subscribe to domain events
    ///
    /// Events are sent after a mutation completes, after recovery, and whenever a
    /// consistency violation is detected.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<DomainEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores errors if no subscribers
    fn emit_event(&self, event: DomainEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Log and broadcast a violation, returning the matching error
    pub(crate) fn consistency_violation(&self, detail: impl Into<String>) -> TreeServiceError {
        let detail = detail.into();
        tracing::error!("Consistency violation: {}", detail);
        self.emit_event(DomainEvent::ConsistencyViolation {
            detail: detail.clone(),
        });
        TreeServiceError::consistency_violation(detail)
    }

    fn ensure_untainted(&self) -> Result<(), TreeServiceError> {
        if self.is_tainted() {
            return Err(self.consistency_violation(
                "an interrupted mutation is unresolved; run recover before mutating the tree",
            ));
        }
        Ok(())
    }

    /// Take a read snapshot of the tree
    ///
    /// The tree cannot change while the returned reader is alive, so it is the
    /// right tool for reads made of several store calls.
    pub async fn reader(&self) -> TreeReader<'_> {
        TreeReader {
            service: self,
            _guard: self.lock.read().await,
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Bootstrap an empty tree with a root at `(1, 2)`
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the tree already has nodes or the title is unusable.
    pub async fn create_root(&self, attrs: NewNode) -> Result<Node, TreeServiceError> {
        attrs.validate(&self.config.path_separator)?;

        let _guard = self.lock.write().await;
        self.ensure_untainted()?;
        self.create_root_locked(attrs).await
    }

    /// Return the root, creating it with the configured root title if the tree is
    /// empty
    pub async fn ensure_root(&self) -> Result<Node, TreeServiceError> {
        let _guard = self.lock.write().await;

        if let Some(root) = self.find_root().await? {
            return Ok(root);
        }

        self.ensure_untainted()?;
        self.create_root_locked(NewNode::new(self.config.root_title.clone()))
            .await
    }

    async fn create_root_locked(&self, attrs: NewNode) -> Result<Node, TreeServiceError> {
        if self.store.find_one(&NodeFilter::new()).await?.is_some() {
            return Err(TreeServiceError::invalid_argument(
                "tree already has a root",
            ));
        }

        let record = NodeRecord::from_new_node(attrs, 1, 2, 0);
        let phases = vec![JournalPhase::Insert {
            record: record.clone(),
        }];
        let applied = self.execute(MutationKind::CreateRoot, None, phases).await?;
        let root = record.into_node(self.inserted_id(&applied)?);

        tracing::info!("Created root {} ('{}')", root.id, root.title);
        self.emit_event(DomainEvent::NodeCreated { node: root.clone() });
        Ok(root)
    }

    /// Insert a new node as the last child of `parent`
    ///
    /// `parent` is re-read by id; its bounds on the caller's copy may be stale.
    /// Every bound at or after the parent's right bound moves up by two, then the
    /// new node takes `(parent.right, parent.right + 1)`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a blank title, a title containing the separator, or a
    ///   title already used by a child of `parent`
    /// - `Conflict` if `parent` no longer exists
    /// - `ConsistencyViolation` if the tree is tainted
    /// - `StoreUnavailable` if a store call fails (the tree becomes tainted when the
    ///   failure happens after the first write started)
    pub async fn insert_node(
        &self,
        parent: &Node,
        attrs: NewNode,
    ) -> Result<Node, TreeServiceError> {
        attrs.validate(&self.config.path_separator)?;

        let _guard = self.lock.write().await;
        self.ensure_untainted()?;

        let current = match self.store.find_one(&NodeFilter::by_id(&parent.id)).await? {
            Some(node) => node,
            None => return Err(TreeServiceError::conflict(parent.id.clone())),
        };
        self.ensure_title_free(&current, &attrs.title, None).await?;

        let pr = current.right;
        let record = NodeRecord::from_new_node(attrs, pr, pr + 1, current.level + 1);
        let phases = vec![
            JournalPhase::shift(NodeFilter::new().right_gte(pr), FieldIncrements::right(2)),
            JournalPhase::shift(NodeFilter::new().left_gte(pr), FieldIncrements::left(2)),
            JournalPhase::Insert {
                record: record.clone(),
            },
        ];
        let applied = self
            .execute(MutationKind::Insert, Some(&current.id), phases)
            .await?;
        let node = record.into_node(self.inserted_id(&applied)?);

        self.check_after_mutation().await?;

        tracing::info!(
            "Inserted node {} ('{}') under {} at ({}, {})",
            node.id,
            node.title,
            current.id,
            node.left,
            node.right
        );
        self.emit_event(DomainEvent::NodeCreated { node: node.clone() });
        Ok(node)
    }

    /// Remove a node together with its whole subtree
    ///
    /// Bounds after the removed interval shift down by the interval's full width.
    /// Removing the root empties the tree.
    pub async fn remove_node(&self, node_id: &str) -> Result<RemoveOutcome, TreeServiceError> {
        let _guard = self.lock.write().await;
        self.ensure_untainted()?;

        let node = self
            .store
            .find_one(&NodeFilter::by_id(node_id))
            .await?
            .ok_or_else(|| TreeServiceError::node_not_found(node_id))?;

        let width = node.width() + 1;
        let phases = vec![
            JournalPhase::Delete {
                filter: NodeFilter::subtree_of(&node),
            },
            JournalPhase::shift(
                NodeFilter::new().right_gt(node.right),
                FieldIncrements::right(-width),
            ),
            JournalPhase::shift(
                NodeFilter::new().left_gt(node.right),
                FieldIncrements::left(-width),
            ),
        ];
        let applied = self
            .execute(MutationKind::Remove, Some(&node.id), phases)
            .await?;
        let removed_count = applied.first().map(|a| a.affected).unwrap_or(0);

        self.check_after_mutation().await?;

        tracing::info!(
            "Removed node {} ('{}') and {} descendant(s)",
            node.id,
            node.title,
            removed_count.saturating_sub(1)
        );
        self.emit_event(DomainEvent::NodeRemoved {
            id: node.id,
            removed_count,
        });
        Ok(RemoveOutcome { removed_count })
    }

    /// Move a node and its subtree to become the last child of `new_parent_id`
    ///
    /// Four steps: measure the subtree, widen the destination by the subtree width,
    /// translate the subtree into the gap (adjusting levels), and compact the
    /// vacated region. The subtree's bounds are re-read after widening and must
    /// match the prediction.
    ///
    /// # Errors
    ///
    /// - `NotFound` if either node is missing
    /// - `InvalidArgument` if `new_parent_id` is the node itself or one of its
    ///   descendants (this also rules out moving the root), or if the destination
    ///   already has a child with the same title
    /// - `ConsistencyViolation` if the re-read does not match the predicted bounds
    pub async fn move_node(
        &self,
        node_id: &str,
        new_parent_id: &str,
    ) -> Result<Node, TreeServiceError> {
        let _guard = self.lock.write().await;
        self.ensure_untainted()?;

        let node = self
            .store
            .find_one(&NodeFilter::by_id(node_id))
            .await?
            .ok_or_else(|| TreeServiceError::node_not_found(node_id))?;
        let new_parent = self
            .store
            .find_one(&NodeFilter::by_id(new_parent_id))
            .await?
            .ok_or_else(|| TreeServiceError::node_not_found(new_parent_id))?;

        if new_parent.id == node.id || node.contains(&new_parent) {
            return Err(TreeServiceError::invalid_argument(format!(
                "cannot move {} under itself or its descendant {}",
                node.id, new_parent.id
            )));
        }
        self.ensure_title_free(&new_parent, &node.title, Some(&node.id))
            .await?;

        let width = node.width();
        let span = width + 1;
        let pr = new_parent.right;
        let new_left = if node.left >= pr { node.left + span } else { node.left };
        let new_right = new_left + width;
        let level_delta = new_parent.level + 1 - node.level;

        let phases = vec![
            JournalPhase::shift(NodeFilter::new().right_gte(pr), FieldIncrements::right(span)),
            JournalPhase::shift(NodeFilter::new().left_gte(pr), FieldIncrements::left(span)),
            JournalPhase::shift(
                NodeFilter::new().left_gte(new_left).right_lte(new_right),
                FieldIncrements::translate(pr - new_left, level_delta),
            ),
            JournalPhase::shift(
                NodeFilter::new().right_gt(new_right),
                FieldIncrements::right(-span),
            ),
            JournalPhase::shift(
                NodeFilter::new().left_gt(new_right),
                FieldIncrements::left(-span),
            ),
        ];

        let entry_id = self
            .journal
            .begin(MutationKind::Move, Some(node.id.clone()), phases.clone())
            .await?;
        let mut applied = Vec::with_capacity(phases.len());
        self.run_phases(&entry_id, &phases, 0..2, &mut applied)
            .await?;

        let widened = match self.store.find_one(&NodeFilter::by_id(&node.id)).await {
            Ok(widened) => widened,
            Err(err) => {
                self.interrupt(&entry_id, 2, &err.to_string()).await;
                return Err(err.into());
            }
        };
        match widened {
            Some(n) if n.left == new_left && n.right == new_right => {}
            other => {
                let detail = match other {
                    Some(n) => format!(
                        "node {} expected at ({}, {}) after widening, found ({}, {})",
                        node.id, new_left, new_right, n.left, n.right
                    ),
                    None => format!("node {} disappeared while being moved", node.id),
                };
                self.interrupt(&entry_id, 2, &detail).await;
                return Err(self.consistency_violation(detail));
            }
        }

        self.run_phases(&entry_id, &phases, 2..phases.len(), &mut applied)
            .await?;
        self.complete(&entry_id).await;

        let moved = self
            .store
            .find_one(&NodeFilter::by_id(&node.id))
            .await?
            .ok_or_else(|| {
                self.consistency_violation(format!("node {} missing after move", node.id))
            })?;

        self.check_after_mutation().await?;

        tracing::info!(
            "Moved node {} ('{}') under {}: ({}, {}) -> ({}, {})",
            moved.id,
            moved.title,
            new_parent.id,
            node.left,
            node.right,
            moved.left,
            moved.right
        );
        self.emit_event(DomainEvent::NodeMoved {
            node: moved.clone(),
            new_parent_id: new_parent.id,
        });
        Ok(moved)
    }

    async fn ensure_title_free(
        &self,
        parent: &Node,
        title: &str,
        moving: Option<&str>,
    ) -> Result<(), TreeServiceError> {
        let clashes = self
            .store
            .find(&NodeFilter::children_of(parent).with_title(title), None)
            .await?;

        if clashes.iter().any(|n| Some(n.id.as_str()) != moving) {
            return Err(TreeServiceError::invalid_argument(format!(
                "'{}' already has a child titled '{}'",
                parent.title, title
            )));
        }
        Ok(())
    }

    fn inserted_id(&self, applied: &[AppliedPhase]) -> Result<String, TreeServiceError> {
        applied
            .iter()
            .rev()
            .find_map(|a| a.inserted_id.clone())
            .ok_or_else(|| self.consistency_violation("store returned no id for inserted node"))
    }

    async fn check_after_mutation(&self) -> Result<(), TreeServiceError> {
        if !self.config.verify_after_mutation {
            return Ok(());
        }

        let report = self.scan().await?;
        if !report.is_consistent() {
            self.tainted.store(true, Ordering::SeqCst);
            return Err(self.consistency_violation(report.summary()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase execution
    // ------------------------------------------------------------------

    /// Journal and apply every phase of a mutation
    async fn execute(
        &self,
        kind: MutationKind,
        target: Option<&str>,
        phases: Vec<JournalPhase>,
    ) -> Result<Vec<AppliedPhase>, TreeServiceError> {
        let entry_id = self
            .journal
            .begin(kind, target.map(str::to_string), phases.clone())
            .await?;

        let mut applied = Vec::with_capacity(phases.len());
        self.run_phases(&entry_id, &phases, 0..phases.len(), &mut applied)
            .await?;
        self.complete(&entry_id).await;

        Ok(applied)
    }

    async fn run_phases(
        &self,
        entry_id: &str,
        phases: &[JournalPhase],
        range: Range<usize>,
        applied: &mut Vec<AppliedPhase>,
    ) -> Result<(), TreeServiceError> {
        let total = phases.len();

        for (index, phase) in phases
            .iter()
            .enumerate()
            .take(range.end)
            .skip(range.start)
        {
            tracing::debug!("{} phase {}/{}: {}", entry_id, index + 1, total, phase);

            let outcome = match self.apply_phase(index, phase).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.interrupt(entry_id, index, &err.to_string()).await;
                    return Err(err.into());
                }
            };

            if let Err(err) = self.journal.mark_applied(entry_id, outcome.clone()).await {
                self.interrupt(entry_id, index + 1, &err.to_string()).await;
                return Err(err);
            }
            applied.push(outcome);
        }

        Ok(())
    }

    async fn apply_phase(
        &self,
        index: usize,
        phase: &JournalPhase,
    ) -> Result<AppliedPhase, crate::db::DatabaseError> {
        let (affected, inserted_id) = match phase {
            JournalPhase::Shift { filter, increments } => {
                (self.store.update_many(filter, *increments).await?, None)
            }
            JournalPhase::Insert { record } => {
                (1, Some(self.store.insert_one(record.clone()).await?))
            }
            JournalPhase::Delete { filter } => (self.store.delete_many(filter).await?, None),
        };

        Ok(AppliedPhase {
            index,
            affected,
            inserted_id,
        })
    }

    async fn interrupt(&self, entry_id: &str, next_phase: usize, reason: &str) {
        self.tainted.store(true, Ordering::SeqCst);
        tracing::error!(
            "Mutation {} stopped before phase {}: {}. Tree is tainted until recovered",
            entry_id,
            next_phase + 1,
            reason
        );

        if let Err(e) = self
            .journal
            .mark_interrupted(entry_id, next_phase, reason)
            .await
        {
            tracing::error!("Failed to journal interruption of {}: {}", entry_id, e);
        }
    }

    async fn complete(&self, entry_id: &str) {
        if let Err(e) = self.journal.finish(entry_id, EntryStatus::Completed).await {
            tracing::warn!("Mutation {} applied but not closed in journal: {}", entry_id, e);
        }
    }

    // ------------------------------------------------------------------
    // Integrity and recovery
    // ------------------------------------------------------------------

    async fn scan(&self) -> Result<IntegrityReport, TreeServiceError> {
        let nodes = self
            .store
            .find(&NodeFilter::new(), Some(OrderBy::LeftAsc))
            .await?;
        Ok(integrity::check_tree(&nodes))
    }

    /// Scan the whole tree and check every nested-set invariant
    ///
    /// A clean scan clears the taint and dismisses unfinished journal entries. A
    /// failed scan taints the tree, logs and broadcasts the violations, and returns
    /// the report (not an error) so the caller can inspect it.
    pub async fn verify_integrity(&self) -> Result<IntegrityReport, TreeServiceError> {
        let _guard = self.lock.write().await;
        let report = self.scan().await?;

        if report.is_consistent() {
            if self.tainted.swap(false, Ordering::SeqCst) {
                for entry in self.journal.open_entries().await {
                    self.journal.finish(&entry.id, EntryStatus::Dismissed).await?;
                }
                tracing::info!(
                    "Tree verified with {} node(s); taint cleared",
                    report.node_count
                );
            }
        } else {
            self.tainted.store(true, Ordering::SeqCst);
            let _ = self.consistency_violation(report.summary());
        }

        Ok(report)
    }

    /// Resolve interrupted mutations recorded in the journal
    ///
    /// `RollForward` replays every phase not known to be applied. `RollBack`
    /// applies exact inverses of the applied phases, newest first; it is refused
    /// when one of them has no inverse (deleted records, or an insert whose id was
    /// never confirmed). Either way the tree is verified
    /// afterwards and the taint is only cleared if the scan is clean.
    ///
    /// If the store did apply the phase that was left unconfirmed, neither action
    /// restores a consistent tree; verification reports it and manual repair is
    /// needed.
    pub async fn recover(
        &self,
        action: RecoveryAction,
    ) -> Result<RecoveryOutcome, TreeServiceError> {
        let _guard = self.lock.write().await;
        let mut entries = self.journal.open_entries().await;

        if action == RecoveryAction::RollBack {
            if let Some(entry) = entries.iter().find(|e| e.has_irreversible_phase()) {
                return Err(TreeServiceError::invalid_argument(format!(
                    "{} mutation {} applied a phase that cannot be undone; roll forward instead",
                    entry.kind, entry.id
                )));
            }
            entries.reverse();
        }

        let mut phases_applied = 0;
        let mut resolved = Vec::with_capacity(entries.len());

        for entry in &entries {
            tracing::info!(
                "Recovering {} mutation {} ({:?}, {}/{} phases applied)",
                entry.kind,
                entry.id,
                action,
                entry.next_phase(),
                entry.phases.len()
            );

            phases_applied += match action {
                RecoveryAction::RollForward => self.roll_forward(entry).await?,
                RecoveryAction::RollBack => self.roll_back(entry).await?,
            };
            resolved.push(entry.id.clone());
        }

        let report = self.scan().await?;
        if !report.is_consistent() {
            self.tainted.store(true, Ordering::SeqCst);
            return Err(self.consistency_violation(format!(
                "tree is still inconsistent after {:?}: {}",
                action,
                report.summary()
            )));
        }

        self.tainted.store(false, Ordering::SeqCst);
        for entry_id in &resolved {
            self.emit_event(DomainEvent::TreeRecovered {
                entry_id: entry_id.clone(),
            });
        }
        tracing::info!(
            "Recovery finished: {} entr(ies), {} phase(s) applied",
            resolved.len(),
            phases_applied
        );

        Ok(RecoveryOutcome {
            action,
            entries: resolved,
            phases_applied,
            report,
        })
    }

    async fn roll_forward(&self, entry: &JournalEntry) -> Result<usize, TreeServiceError> {
        let start = entry.next_phase();
        let mut applied = entry.applied.clone();

        self.run_phases(&entry.id, &entry.phases, start..entry.phases.len(), &mut applied)
            .await?;
        self.journal
            .finish(&entry.id, EntryStatus::RolledForward)
            .await?;

        Ok(entry.phases.len() - start)
    }

    /// Undo through a compensating entry so an interrupted rollback can itself be
    /// rolled forward
    async fn roll_back(&self, entry: &JournalEntry) -> Result<usize, TreeServiceError> {
        let confirmed = entry.applied_phases();
        let mut inverses = Vec::with_capacity(confirmed.len());
        for applied in confirmed.iter().rev() {
            let inverse = entry
                .phases
                .get(applied.index)
                .and_then(|phase| phase.inverse(applied))
                .ok_or_else(|| {
                    TreeServiceError::invalid_argument(format!(
                        "phase {} of {} cannot be undone",
                        applied.index + 1,
                        entry.id
                    ))
                })?;
            inverses.push(inverse);
        }

        let compensation = self
            .journal
            .begin(MutationKind::Rollback, Some(entry.id.clone()), inverses.clone())
            .await?;
        self.journal.finish(&entry.id, EntryStatus::RolledBack).await?;

        let mut applied = Vec::with_capacity(inverses.len());
        self.run_phases(&compensation, &inverses, 0..inverses.len(), &mut applied)
            .await?;
        self.complete(&compensation).await;

        Ok(inverses.len())
    }

    // ------------------------------------------------------------------
    // Read queries
    // ------------------------------------------------------------------

    pub async fn get_node(&self, id: &str) -> Result<Node, TreeServiceError> {
        self.reader().await.get_node(id).await
    }

    pub async fn get_root(&self) -> Result<Option<Node>, TreeServiceError> {
        self.reader().await.get_root().await
    }

    pub async fn get_parent(&self, id: &str) -> Result<Option<Node>, TreeServiceError> {
        self.reader().await.get_parent(id).await
    }

    /// Every ancestor of the node, root first
    pub async fn get_ancestors(&self, id: &str) -> Result<Vec<Node>, TreeServiceError> {
        self.reader().await.get_ancestors(id).await
    }

    /// Every descendant of the node in pre-order
    pub async fn get_descendants(&self, id: &str) -> Result<Vec<Node>, TreeServiceError> {
        self.reader().await.get_descendants(id).await
    }

    /// Direct children of the node, in sibling order
    pub async fn get_children(&self, id: &str) -> Result<Vec<Node>, TreeServiceError> {
        self.reader().await.get_children(id).await
    }

    pub async fn count_nodes(&self) -> Result<usize, TreeServiceError> {
        self.reader().await.count_nodes().await
    }

    /// Root lookup without taking the lock (caller holds it)
    async fn find_root(&self) -> Result<Option<Node>, TreeServiceError> {
        let mut roots = self
            .store
            .find(&NodeFilter::new().level_eq(0), Some(OrderBy::LeftAsc))
            .await?;

        if roots.len() > 1 {
            let ids: Vec<&str> = roots.iter().map(|n| n.id.as_str()).collect();
            return Err(self.consistency_violation(format!(
                "multiple roots: {}",
                ids.join(", ")
            )));
        }
        Ok(roots.pop())
    }
}

/// Read snapshot of a tree
///
/// Holds the service's read guard, so no mutation can interleave with the reads
/// made through it. Drop it promptly: writers wait for it.
pub struct TreeReader<'a> {
    service: &'a TreeService,
    _guard: RwLockReadGuard<'a, ()>,
}

impl TreeReader<'_> {
    pub fn config(&self) -> &TreeConfig {
        &self.service.config
    }

    pub async fn find_node(&self, id: &str) -> Result<Option<Node>, TreeServiceError> {
        Ok(self.service.store.find_one(&NodeFilter::by_id(id)).await?)
    }

    /// # Errors
    ///
    /// `NotFound` if no node has this id
    pub async fn get_node(&self, id: &str) -> Result<Node, TreeServiceError> {
        self.find_node(id)
            .await?
            .ok_or_else(|| TreeServiceError::node_not_found(id))
    }

    /// The level-0 node, `None` for an empty tree
    pub async fn get_root(&self) -> Result<Option<Node>, TreeServiceError> {
        self.service.find_root().await
    }

    /// Nearest enclosing node one level up (`None` for the root)
    pub async fn get_parent(&self, id: &str) -> Result<Option<Node>, TreeServiceError> {
        let node = self.get_node(id).await?;
        if node.is_root() {
            return Ok(None);
        }

        let mut parents = self
            .service
            .store
            .find(&NodeFilter::ancestors_of(&node).level_eq(node.level - 1), None)
            .await?;

        match parents.len() {
            1 => Ok(parents.pop()),
            0 => Err(self
                .service
                .consistency_violation(format!("node {} has no parent", node.id))),
            n => Err(self
                .service
                .consistency_violation(format!("node {} has {} parents", node.id, n))),
        }
    }

    pub async fn get_ancestors(&self, id: &str) -> Result<Vec<Node>, TreeServiceError> {
        let node = self.get_node(id).await?;
        self.ancestors_of(&node).await
    }

    pub async fn get_descendants(&self, id: &str) -> Result<Vec<Node>, TreeServiceError> {
        let node = self.get_node(id).await?;
        self.descendants_of(&node).await
    }

    pub async fn get_children(&self, id: &str) -> Result<Vec<Node>, TreeServiceError> {
        let node = self.get_node(id).await?;
        self.children_of(&node).await
    }

    /// Ancestors of an already-read node, root first
    pub async fn ancestors_of(&self, node: &Node) -> Result<Vec<Node>, TreeServiceError> {
        self.find_ordered(&NodeFilter::ancestors_of(node)).await
    }

    pub async fn descendants_of(&self, node: &Node) -> Result<Vec<Node>, TreeServiceError> {
        self.find_ordered(&NodeFilter::descendants_of(node)).await
    }

    pub async fn children_of(&self, node: &Node) -> Result<Vec<Node>, TreeServiceError> {
        self.find_ordered(&NodeFilter::children_of(node)).await
    }

    /// Direct children of `node` carrying `title`
    pub async fn children_titled(
        &self,
        node: &Node,
        title: &str,
    ) -> Result<Vec<Node>, TreeServiceError> {
        self.find_ordered(&NodeFilter::children_of(node).with_title(title))
            .await
    }

    pub async fn count_nodes(&self) -> Result<usize, TreeServiceError> {
        Ok(self.service.store.find(&NodeFilter::new(), None).await?.len())
    }

    pub(crate) fn violation(&self, detail: impl Into<String>) -> TreeServiceError {
        self.service.consistency_violation(detail)
    }

    async fn find_ordered(&self, filter: &NodeFilter) -> Result<Vec<Node>, TreeServiceError> {
        Ok(self
            .service
            .store
            .find(filter, Some(OrderBy::LeftAsc))
            .await?)
    }
}
