//! Domain Events for the Tree
//!
//! `TreeService` emits these events after each successful mutation and whenever
//! an invariant check fails. Subscribers (a protocol layer, a monitoring hook)
//! receive them through a tokio broadcast channel without coupling to the engine.
//!
//! # Event Flow
//!
//! 1. TreeService completes a mutation (or detects a violation)
//! 2. Domain event is emitted via broadcast channel
//! 3. All subscribers receive the event asynchronously

use crate::models::Node;
use serde::{Deserialize, Serialize};

/// Domain events emitted by TreeService
///
/// These represent tree-level changes, not individual store calls. Bound shifts on
/// untouched nodes are implied by the mutation and are not reported one by one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    /// A new node was inserted
    #[serde(rename = "node:created")]
    NodeCreated { node: Node },

    /// A node and its subtree were removed
    #[serde(rename = "node:removed", rename_all = "camelCase")]
    NodeRemoved { id: String, removed_count: u64 },

    /// A subtree was relocated under a new parent
    #[serde(rename = "node:moved", rename_all = "camelCase")]
    NodeMoved { node: Node, new_parent_id: String },

    /// An interrupted mutation was resolved from the journal
    #[serde(rename = "tree:recovered", rename_all = "camelCase")]
    TreeRecovered { entry_id: String },

    /// An invariant check failed
    #[serde(rename = "tree:consistencyViolation")]
    ConsistencyViolation { detail: String },
}

impl DomainEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            DomainEvent::NodeCreated { .. } => "node:created",
            DomainEvent::NodeRemoved { .. } => "node:removed",
            DomainEvent::NodeMoved { .. } => "node:moved",
            DomainEvent::TreeRecovered { .. } => "tree:recovered",
            DomainEvent::ConsistencyViolation { .. } => "tree:consistencyViolation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The `type` tag is flattened into the payload, not nested
    #[test]
    fn test_event_serialization_contract() {
        let event = DomainEvent::NodeRemoved {
            id: "node-123".to_string(),
            removed_count: 3,
        };

        let parsed: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed.get("type").unwrap(), "node:removed");
        assert_eq!(parsed.get("id").unwrap(), "node-123");
        assert_eq!(parsed.get("removedCount").unwrap(), 3);
        assert_eq!(event.event_type(), "node:removed");
    }

    #[test]
    fn test_violation_event_round_trip() {
        let event = DomainEvent::ConsistencyViolation {
            detail: "duplicate sibling title 'a'".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: DomainEvent = serde_json::from_str(&json).unwrap();

        match back {
            DomainEvent::ConsistencyViolation { detail } => {
                assert_eq!(detail, "duplicate sibling title 'a'")
            }
            other => panic!("Expected ConsistencyViolation, got {:?}", other),
        }
    }
}
