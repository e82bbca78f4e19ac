//! Database Layer
//!
//! This module handles every interaction with the document store:
//!
//! - The `NodeStore` trait: the five operations the tree engine consumes
//! - `InMemoryStore`: process-local reference backend
//! - `SurrealStore`: embedded SurrealDB backend (`surrealdb` feature)
//! - `TimedStore`: per-call deadlines and error mapping
//! - Domain events broadcast by the tree services
//!
//! # Architecture
//!
//! The store has no notion of nesting. It only evaluates equality/range predicates
//! and applies additive increments, which is all the nested-set engine needs.

mod error;
pub mod events;
mod memory_store;
mod node_store;
#[cfg(feature = "surrealdb")]
mod surreal_store;
mod timed_store;

pub use error::DatabaseError;
pub use events::DomainEvent;
pub use memory_store::InMemoryStore;
pub use node_store::NodeStore;
#[cfg(feature = "surrealdb")]
pub use surreal_store::SurrealStore;
pub use timed_store::TimedStore;
