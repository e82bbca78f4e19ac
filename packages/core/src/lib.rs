//! FolderTree Core
//!
//! A hierarchical folder/content namespace kept in a document store with the
//! nested-set interval model. Every node carries `(left, right, level)`; ancestry
//! is interval containment, so subtree and ancestor reads are single range queries
//! and mutations are batches of range updates.
//!
//! # Architecture
//!
//! - **Store-agnostic**: the engine only needs the five operations of `NodeStore`
//! - **Single writer per tree**: one lock serialises mutations against readers
//! - **Journaled mutations**: interrupted range shifts can be rolled forward or back
//!
//! # Modules
//!
//! - [`models`] - Nodes plus the filter/update language of the store interface
//! - [`db`] - `NodeStore` trait, in-memory and SurrealDB adapters, events
//! - [`services`] - `TreeService`, `PathResolver`, journal and integrity checks
//! - [`config`] - `TreeConfig`

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::TreeConfig;
pub use models::*;
pub use services::*;
