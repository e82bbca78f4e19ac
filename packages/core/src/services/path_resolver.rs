//! PathResolver - Title Paths over the Tree
//!
//! Translates between node ids and separator-joined title paths such as
//! `root/projects/2024`. The first segment is always the root's title.
//!
//! Both directions run under a single `TreeReader`, so a path is resolved against
//! one consistent version of the bounds even while writers are queued.

use crate::models::Node;
use crate::services::error::TreeServiceError;
use crate::services::tree_service::TreeService;
use std::sync::Arc;

/// Resolves title paths against one tree
#[derive(Clone)]
pub struct PathResolver {
    tree: Arc<TreeService>,
}

impl PathResolver {
    pub fn new(tree: Arc<TreeService>) -> Self {
        Self { tree }
    }

    pub fn separator(&self) -> &str {
        &self.tree.config().path_separator
    }

    /// Build the path of a node: ancestor titles root first, then its own title
    ///
    /// # Errors
    ///
    /// `NotFound` if the node does not exist
    pub async fn get_path_to_node(&self, node_id: &str) -> Result<String, TreeServiceError> {
        let reader = self.tree.reader().await;
        let node = reader.get_node(node_id).await?;
        let ancestors = reader.ancestors_of(&node).await?;

        let titles: Vec<&str> = ancestors
            .iter()
            .chain(std::iter::once(&node))
            .map(|n| n.title.as_str())
            .collect();

        Ok(titles.join(self.separator()))
    }

    /// Resolve a path top-down, one level per segment
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty path or an empty segment
    /// - `NotFound` if the first segment is not the root's title or a segment has no
    ///   matching child
    /// - `ConsistencyViolation` if two siblings share the segment's title
    pub async fn get_node_by_path(&self, path: &str) -> Result<Node, TreeServiceError> {
        let segments = split_path(path, self.separator())?;

        let reader = self.tree.reader().await;
        let root = reader
            .get_root()
            .await?
            .ok_or_else(|| TreeServiceError::path_not_found(path))?;

        if root.title != segments[0] {
            return Err(TreeServiceError::path_not_found(path));
        }

        let mut current = root;
        for segment in &segments[1..] {
            let mut matches = reader.children_titled(&current, segment).await?;
            current = match matches.len() {
                0 => return Err(TreeServiceError::path_not_found(path)),
                1 => matches.remove(0),
                n => {
                    return Err(reader.violation(format!(
                        "{} children of {} are titled '{}'",
                        n, current.id, segment
                    )))
                }
            };
        }

        tracing::debug!("Resolved '{}' to {}", path, current.id);
        Ok(current)
    }
}

/// Split a path into its non-empty segments (at least one)
fn split_path<'a>(path: &'a str, separator: &str) -> Result<Vec<&'a str>, TreeServiceError> {
    if path.is_empty() {
        return Err(TreeServiceError::invalid_argument("path must not be empty"));
    }

    let segments: Vec<&str> = path.split(separator).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(TreeServiceError::invalid_argument(format!(
            "path '{}' contains an empty segment",
            path
        )));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::db::InMemoryStore;
    use crate::models::NewNode;

    async fn create_resolver(config: TreeConfig) -> (PathResolver, Arc<TreeService>) {
        let tree = Arc::new(
            TreeService::new(Arc::new(InMemoryStore::new()), config)
                .await
                .unwrap(),
        );
        (PathResolver::new(tree.clone()), tree)
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("root/a/b", "/").unwrap(), vec!["root", "a", "b"]);
        assert_eq!(split_path("root", "/").unwrap(), vec!["root"]);

        for bad in ["", "/root", "root/", "root//a"] {
            assert!(
                matches!(split_path(bad, "/"), Err(TreeServiceError::InvalidArgument(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_paths_resolve_both_ways() {
        let (resolver, tree) = create_resolver(TreeConfig::default()).await;
        let root = tree.ensure_root().await.unwrap();
        let a = tree.insert_node(&root, NewNode::new("A")).await.unwrap();
        let a1 = tree.insert_node(&a, NewNode::new("A1")).await.unwrap();

        assert_eq!(resolver.get_path_to_node(&root.id).await.unwrap(), "root");
        assert_eq!(resolver.get_path_to_node(&a1.id).await.unwrap(), "root/A/A1");
        assert_eq!(resolver.get_node_by_path("root/A/A1").await.unwrap().id, a1.id);
        assert_eq!(resolver.get_node_by_path("root").await.unwrap().id, root.id);
    }

    #[tokio::test]
    async fn test_unknown_segments_are_not_found() {
        let (resolver, tree) = create_resolver(TreeConfig::default()).await;
        let root = tree.ensure_root().await.unwrap();
        let a = tree.insert_node(&root, NewNode::new("A")).await.unwrap();
        tree.insert_node(&a, NewNode::new("A1")).await.unwrap();

        for path in ["other/A", "root/B", "root/A1", "root/A/A1/x"] {
            let err = resolver.get_node_by_path(path).await.unwrap_err();
            assert!(err.is_not_found(), "{} -> {:?}", path, err);
        }
    }

    #[tokio::test]
    async fn test_custom_separator() {
        let config = TreeConfig::default()
            .with_path_separator("::")
            .with_root_title("repo");
        let (resolver, tree) = create_resolver(config).await;
        let root = tree.ensure_root().await.unwrap();
        let docs = tree.insert_node(&root, NewNode::new("docs/v1")).await.unwrap();

        assert_eq!(resolver.get_path_to_node(&docs.id).await.unwrap(), "repo::docs/v1");
        assert_eq!(
            resolver.get_node_by_path("repo::docs/v1").await.unwrap().id,
            docs.id
        );
    }

    #[tokio::test]
    async fn test_empty_tree() {
        let (resolver, _tree) = create_resolver(TreeConfig::default()).await;
        assert!(resolver.get_node_by_path("root").await.unwrap_err().is_not_found());
        assert!(resolver.get_path_to_node("x").await.unwrap_err().is_not_found());
    }
}
