//! Event Emission Tests
//!
//! Each successful mutation emits exactly one domain event, after the store
//! writes complete. Refused mutations emit nothing except consistency violations.

mod common;

#[cfg(test)]
mod event_emission_tests {
    use super::common::{sample_nodes, tree_over};
    use anyhow::Result;
    use foldertree_core::db::{DomainEvent, InMemoryStore};
    use foldertree_core::models::NewNode;
    use foldertree_core::{TreeConfig, TreeService};
    use std::sync::Arc;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::broadcast::Receiver;
    use tokio::time::{timeout, Duration};

    async fn create_test_tree() -> Result<(TreeService, Arc<InMemoryStore>)> {
        let store = Arc::new(InMemoryStore::with_nodes(sample_nodes()));
        let tree = tree_over(store.clone(), TreeConfig::default()).await?;
        Ok((tree, store))
    }

    async fn next_event(rx: &mut Receiver<DomainEvent>) -> DomainEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event")
    }

    #[tokio::test]
    async fn test_insert_emits_node_created_event() -> Result<()> {
        let (tree, _store) = create_test_tree().await?;
        let mut rx = tree.subscribe_to_events();

        let b = tree.get_node("B").await?;
        let c = tree.insert_node(&b, NewNode::new("C")).await?;

        match next_event(&mut rx).await {
            DomainEvent::NodeCreated { node } => {
                assert_eq!(node.id, c.id);
                assert_eq!((node.left, node.right, node.level), (9, 10, 2));
            }
            event => panic!("Expected NodeCreated event, got {:?}", event),
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        Ok(())
    }

    #[tokio::test]
    async fn test_remove_emits_node_removed_event() -> Result<()> {
        let (tree, _store) = create_test_tree().await?;
        let mut rx = tree.subscribe_to_events();

        tree.remove_node("A").await?;

        match next_event(&mut rx).await {
            DomainEvent::NodeRemoved { id, removed_count } => {
                assert_eq!(id, "A");
                assert_eq!(removed_count, 2);
            }
            event => panic!("Expected NodeRemoved event, got {:?}", event),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_move_emits_node_moved_event() -> Result<()> {
        let (tree, _store) = create_test_tree().await?;
        let mut rx = tree.subscribe_to_events();

        let moved = tree.move_node("A1", "B").await?;

        match next_event(&mut rx).await {
            DomainEvent::NodeMoved {
                node,
                new_parent_id,
            } => {
                assert_eq!(node, moved);
                assert_eq!(new_parent_id, "B");
            }
            event => panic!("Expected NodeMoved event, got {:?}", event),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_move_emits_nothing() -> Result<()> {
        let (tree, _store) = create_test_tree().await?;
        let mut rx = tree.subscribe_to_events();

        assert!(tree.move_node("A", "A1").await.is_err());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        Ok(())
    }

    #[tokio::test]
    async fn test_event_json_matches_wire_names() -> Result<()> {
        let (tree, _store) = create_test_tree().await?;
        let mut rx = tree.subscribe_to_events();

        tree.move_node("A1", "B").await?;
        let json = serde_json::to_value(next_event(&mut rx).await)?;

        assert_eq!(json["type"], "node:moved");
        assert_eq!(json["newParentId"], "B");
        assert_eq!(json["node"]["level"], 2);
        Ok(())
    }
}
