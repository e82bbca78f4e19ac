//! Data Models
//!
//! This module contains the data structures shared by the store adapters and the
//! tree services:
//!
//! - `Node` / `NodeRecord` / `NewNode` - persisted, pending and caller-supplied nodes
//! - `NodeFilter` / `FieldIncrements` / `OrderBy` - the predicate and update language
//!   of the store interface

mod filter;
mod node;

pub use filter::{BoundField, BoundPredicate, FieldIncrements, FilterOperator, NodeFilter, OrderBy};
pub use node::{validate_title, NewNode, Node, NodeRecord, ValidationError};
