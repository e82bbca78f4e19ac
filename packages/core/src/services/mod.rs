//! Tree Services
//!
//! This module contains the tree engine and everything built on it:
//!
//! - `TreeService` - nested-set mutations (insert, remove, move), read queries,
//!   integrity verification and recovery
//! - `PathResolver` - title paths to nodes and back
//! - `MutationJournal` - compensating log of in-flight mutations
//! - `integrity` - invariant checks over a full node scan
//!
//! Services sit on top of the `db` layer and never talk to a backend directly;
//! every store call goes through `TimedStore`.

pub mod error;
pub mod integrity;
pub mod journal;
pub mod path_resolver;
pub mod tree_service;

pub use error::TreeServiceError;
pub use integrity::{IntegrityReport, IntegrityViolation};
pub use journal::{
    AppliedPhase, EntryStatus, JournalEntry, JournalPhase, MutationJournal, MutationKind,
    RecoveryAction,
};
pub use path_resolver::PathResolver;
pub use tree_service::{RecoveryOutcome, RemoveOutcome, TreeReader, TreeService};
