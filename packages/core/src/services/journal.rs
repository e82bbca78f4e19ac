//! Mutation Journal
//!
//! Compensating log for tree mutations. Before its first write, every mutation
//! records the exact store calls it is about to make (its *phases*). Each phase is
//! confirmed once the store acknowledges it, and the entry is closed when the
//! mutation completes.
//!
//! An entry left open means a mutation stopped part-way: the tree may hold
//! half-shifted bounds. `TreeService::recover` uses the recorded phases to either
//! replay the rest (roll forward) or apply exact inverses of the confirmed ones
//! (roll back).
//!
//! # Persistence
//!
//! With a journal path configured, every state change is appended to a JSON-lines
//! file and flushed before the next store call. On start-up the file is replayed
//! and compacted down to the entries that are still open, and it is truncated
//! whenever the last open entry is closed.
//!
//! ```text
//! {"event":"begin","entry":{...}}
//! {"event":"phaseApplied","entryId":"...","phase":{"index":0,"affected":3}}
//! {"event":"interrupted","entryId":"...","nextPhase":1,"reason":"..."}
//! {"event":"finished","entryId":"...","status":{"state":"completed"}}
//! ```

use crate::models::{FieldIncrements, NodeFilter, NodeRecord};
use crate::services::error::TreeServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Mutation recorded by a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationKind {
    CreateRoot,
    Insert,
    Remove,
    Move,
    /// Compensating entry written by a roll-back
    Rollback,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::CreateRoot => "create_root",
            MutationKind::Insert => "insert",
            MutationKind::Remove => "remove",
            MutationKind::Move => "move",
            MutationKind::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// One store write of a mutation, with every argument fixed in advance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum JournalPhase {
    /// `update_many(filter, increments)`
    Shift {
        filter: NodeFilter,
        increments: FieldIncrements,
    },
    /// `insert_one(record)`
    Insert { record: NodeRecord },
    /// `delete_many(filter)`
    Delete { filter: NodeFilter },
}

impl JournalPhase {
    pub fn shift(filter: NodeFilter, increments: FieldIncrements) -> Self {
        JournalPhase::Shift { filter, increments }
    }

    /// Phase that undoes this one, given what the store reported when it ran
    ///
    /// A shift is undone by the negated increment over the thresholds moved by the
    /// increment. This is exact because every shift threshold sits on an occupied
    /// bound, so no untouched record lies in the range the thresholds cross.
    /// Deleted records cannot be restored under their original ids, so a delete
    /// has no inverse.
    pub fn inverse(&self, applied: &AppliedPhase) -> Option<JournalPhase> {
        match self {
            JournalPhase::Shift { filter, increments } => Some(JournalPhase::Shift {
                filter: filter.translated(increments),
                increments: increments.negated(),
            }),
            JournalPhase::Insert { .. } => applied.inserted_id.as_ref().map(|id| {
                JournalPhase::Delete {
                    filter: NodeFilter::by_id(id),
                }
            }),
            JournalPhase::Delete { .. } => None,
        }
    }
}

impl fmt::Display for JournalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalPhase::Shift { filter, increments } => {
                write!(f, "shift [{}] by {}", filter, increments)
            }
            JournalPhase::Insert { record } => write!(
                f,
                "insert '{}' at ({}, {})",
                record.title, record.left, record.right
            ),
            JournalPhase::Delete { filter } => write!(f, "delete [{}]", filter),
        }
    }
}

/// Store acknowledgement for one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedPhase {
    pub index: usize,
    /// Records updated or deleted (1 for an insert)
    pub affected: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_id: Option<String>,
}

/// Lifecycle of a journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum EntryStatus {
    /// Phases are being applied
    InProgress,
    /// Stopped before `next_phase` was confirmed; its outcome is unknown
    #[serde(rename_all = "camelCase")]
    Interrupted { next_phase: usize, reason: String },
    Completed,
    RolledForward,
    RolledBack,
    /// Closed without replay because the tree verified as consistent
    Dismissed,
}

impl EntryStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, EntryStatus::InProgress | EntryStatus::Interrupted { .. })
    }
}

/// Journal record of one mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub kind: MutationKind,
    /// Node the mutation was addressed to (parent for inserts)
    pub target: Option<String>,
    pub phases: Vec<JournalPhase>,
    #[serde(default)]
    pub applied: Vec<AppliedPhase>,
    pub status: EntryStatus,
    pub started_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Index of the first phase not known to have reached the store
    ///
    /// An interruption recorded after a store acknowledgement whose confirmation
    /// line was lost still counts: its `next_phase` may be ahead of `applied`.
    pub fn next_phase(&self) -> usize {
        let confirmed = self.applied.last().map_or(0, |a| a.index + 1);
        match self.status {
            EntryStatus::Interrupted { next_phase, .. } => confirmed.max(next_phase),
            _ => confirmed,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.next_phase() >= self.phases.len()
    }

    /// Every phase known to be applied, in order
    ///
    /// Phases acknowledged by the store but never confirmed in the journal carry
    /// no store report (no affected count, no inserted id).
    pub fn applied_phases(&self) -> Vec<AppliedPhase> {
        (0..self.next_phase())
            .map(|index| {
                self.applied
                    .iter()
                    .find(|a| a.index == index)
                    .cloned()
                    .unwrap_or(AppliedPhase {
                        index,
                        affected: 0,
                        inserted_id: None,
                    })
            })
            .collect()
    }

    /// True when an applied phase cannot be inverted
    pub fn has_irreversible_phase(&self) -> bool {
        self.applied_phases().iter().any(|a| {
            self.phases
                .get(a.index)
                .is_some_and(|phase| phase.inverse(a).is_none())
        })
    }
}

/// Direction in which `recover` resolves an interrupted mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryAction {
    /// Re-apply every phase that was not confirmed
    RollForward,
    /// Undo the confirmed phases in reverse order
    RollBack,
}

/// One line of the journal file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
enum JournalLine {
    Begin {
        entry: JournalEntry,
    },
    #[serde(rename_all = "camelCase")]
    PhaseApplied {
        entry_id: String,
        phase: AppliedPhase,
    },
    #[serde(rename_all = "camelCase")]
    Interrupted {
        entry_id: String,
        next_phase: usize,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Finished {
        entry_id: String,
        status: EntryStatus,
    },
}

#[derive(Debug, Default)]
struct JournalState {
    open: Vec<JournalEntry>,
    file: Option<File>,
}

impl JournalState {
    fn entry_mut(&mut self, entry_id: &str) -> Result<&mut JournalEntry, TreeServiceError> {
        self.open
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| {
                TreeServiceError::journal_error(format!("no open journal entry {}", entry_id))
            })
    }

    fn apply(&mut self, line: JournalLine) {
        match line {
            JournalLine::Begin { entry } => {
                self.open.retain(|e| e.id != entry.id);
                self.open.push(entry);
            }
            JournalLine::PhaseApplied { entry_id, phase } => {
                if let Ok(entry) = self.entry_mut(&entry_id) {
                    if phase.index == entry.next_phase() {
                        entry.applied.push(phase);
                    }
                }
            }
            JournalLine::Interrupted {
                entry_id,
                next_phase,
                reason,
            } => {
                if let Ok(entry) = self.entry_mut(&entry_id) {
                    entry.status = EntryStatus::Interrupted { next_phase, reason };
                }
            }
            JournalLine::Finished { entry_id, .. } => {
                self.open.retain(|e| e.id != entry_id);
            }
        }
    }
}

/// In-memory journal with optional JSON-lines persistence
#[derive(Debug)]
pub struct MutationJournal {
    path: Option<PathBuf>,
    state: Mutex<JournalState>,
}

impl MutationJournal {
    /// Journal that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(JournalState::default()),
        }
    }

    /// Open the journal file at `path`, replaying and compacting what it holds
    ///
    /// A missing file starts an empty journal. Lines that do not parse (typically
    /// a torn final write) are skipped with a warning.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, TreeServiceError> {
        let path = path.into();
        let mut state = JournalState::default();

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                for (number, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JournalLine>(line) {
                        Ok(parsed) => state.apply(parsed),
                        Err(e) => tracing::warn!(
                            "Skipping unreadable journal line {} in {}: {}",
                            number + 1,
                            path.display(),
                            e
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(TreeServiceError::journal_error(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        Self::compact(&path, &state.open).await?;
        state.file = Some(Self::open_append(&path).await?);

        if !state.open.is_empty() {
            tracing::warn!(
                "Journal {} holds {} unfinished mutation(s)",
                path.display(),
                state.open.len()
            );
        }

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Rewrite the file so it only describes the open entries
    async fn compact(path: &Path, open: &[JournalEntry]) -> Result<(), TreeServiceError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_error("create journal directory", dir, e))?;
        }

        let mut contents = String::new();
        for entry in open {
            contents.push_str(&encode(&JournalLine::Begin {
                entry: entry.clone(),
            })?);
        }

        let tmp = path.with_extension("compacting");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| io_error("write", &tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| io_error("replace", path, e))
    }

    async fn open_append(path: &Path) -> Result<File, TreeServiceError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| io_error("open", path, e))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a mutation before its first write
    pub async fn begin(
        &self,
        kind: MutationKind,
        target: Option<String>,
        phases: Vec<JournalPhase>,
    ) -> Result<String, TreeServiceError> {
        let entry = JournalEntry {
            id: Uuid::new_v4().to_string(),
            kind,
            target,
            phases,
            applied: Vec::new(),
            status: EntryStatus::InProgress,
            started_at: Utc::now(),
        };
        let id = entry.id.clone();

        let mut state = self.state.lock().await;
        Self::append(&mut state, &JournalLine::Begin {
            entry: entry.clone(),
        })
        .await?;
        state.open.push(entry);

        Ok(id)
    }

    /// Confirm the next phase of an entry
    pub async fn mark_applied(
        &self,
        entry_id: &str,
        phase: AppliedPhase,
    ) -> Result<(), TreeServiceError> {
        let mut state = self.state.lock().await;
        let expected = state.entry_mut(entry_id)?.next_phase();
        if phase.index != expected {
            return Err(TreeServiceError::journal_error(format!(
                "phase {} confirmed out of order (expected {})",
                phase.index, expected
            )));
        }

        // Kept in memory even if the append below fails
        state.entry_mut(entry_id)?.applied.push(phase.clone());
        Self::append(&mut state, &JournalLine::PhaseApplied {
            entry_id: entry_id.to_string(),
            phase,
        })
        .await
    }

    /// Record that the entry stopped before `next_phase` was confirmed
    pub async fn mark_interrupted(
        &self,
        entry_id: &str,
        next_phase: usize,
        reason: impl Into<String>,
    ) -> Result<(), TreeServiceError> {
        let reason = reason.into();
        let mut state = self.state.lock().await;
        state.entry_mut(entry_id)?;

        Self::append(&mut state, &JournalLine::Interrupted {
            entry_id: entry_id.to_string(),
            next_phase,
            reason: reason.clone(),
        })
        .await?;
        state.entry_mut(entry_id)?.status = EntryStatus::Interrupted { next_phase, reason };
        Ok(())
    }

    /// Close an entry
    ///
    /// Once no entry is open the file is truncated, so it never holds more than
    /// the mutations in flight.
    pub async fn finish(
        &self,
        entry_id: &str,
        status: EntryStatus,
    ) -> Result<(), TreeServiceError> {
        let mut state = self.state.lock().await;
        state.entry_mut(entry_id)?;

        Self::append(&mut state, &JournalLine::Finished {
            entry_id: entry_id.to_string(),
            status,
        })
        .await?;
        state.open.retain(|e| e.id != entry_id);

        if state.open.is_empty() {
            if let Err(e) = Self::truncate(&mut state).await {
                tracing::warn!("Journal not truncated after closing {}: {}", entry_id, e);
            }
        }
        Ok(())
    }

    /// Entries that were never closed, oldest first
    pub async fn open_entries(&self) -> Vec<JournalEntry> {
        self.state.lock().await.open.clone()
    }

    pub async fn has_open_entries(&self) -> bool {
        !self.state.lock().await.open.is_empty()
    }

    async fn append(state: &mut JournalState, line: &JournalLine) -> Result<(), TreeServiceError> {
        let Some(file) = state.file.as_mut() else {
            return Ok(());
        };

        let encoded = encode(line)?;
        file.write_all(encoded.as_bytes())
            .await
            .map_err(|e| TreeServiceError::journal_error(format!("append failed: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| TreeServiceError::journal_error(format!("flush failed: {}", e)))?;
        file.sync_data()
            .await
            .map_err(|e| TreeServiceError::journal_error(format!("sync failed: {}", e)))
    }

    async fn truncate(state: &mut JournalState) -> Result<(), TreeServiceError> {
        let Some(file) = state.file.as_mut() else {
            return Ok(());
        };

        file.set_len(0)
            .await
            .map_err(|e| TreeServiceError::journal_error(format!("truncate failed: {}", e)))?;
        file.sync_data()
            .await
            .map_err(|e| TreeServiceError::journal_error(format!("sync failed: {}", e)))
    }
}

fn encode(line: &JournalLine) -> Result<String, TreeServiceError> {
    let mut encoded = serde_json::to_string(line)
        .map_err(|e| TreeServiceError::journal_error(format!("encode failed: {}", e)))?;
    encoded.push('\n');
    Ok(encoded)
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> TreeServiceError {
    TreeServiceError::journal_error(format!("failed to {} {}: {}", action, path.display(), err))
}
