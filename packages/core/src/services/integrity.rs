//! Tree Integrity Checks
//!
//! A single pass over all nodes in pre-order that checks the nested-set
//! invariants: well-formed bounds, distinct bounds, proper nesting (no partial
//! overlaps), one root, consistent levels and unique sibling titles.
//!
//! Used by `TreeService::verify_integrity`, after journal recovery, and by tests.

use crate::models::Node;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// One failed invariant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IntegrityViolation {
    /// `left >= right` or a negative level
    InvalidBounds { id: String, left: i64, right: i64 },

    /// Two bounds share the same value
    DuplicateBound {
        value: i64,
        first: String,
        second: String,
    },

    /// Intervals intersect without one containing the other
    OverlappingIntervals { outer: String, inner: String },

    /// Level is not parent level + 1 (or not 0 for a top-level node)
    LevelMismatch {
        id: String,
        expected: i64,
        actual: i64,
    },

    /// More than one top-level node
    MultipleRoots { ids: Vec<String> },

    /// Non-empty tree without a level-0 node
    MissingRoot,

    /// Two direct children of the same parent share a title
    DuplicateSiblingTitle { parent_id: String, title: String },
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBounds { id, left, right } => {
                write!(f, "node {} has invalid bounds ({}, {})", id, left, right)
            }
            Self::DuplicateBound {
                value,
                first,
                second,
            } => write!(f, "bound {} used by both {} and {}", value, first, second),
            Self::OverlappingIntervals { outer, inner } => {
                write!(f, "intervals of {} and {} overlap", outer, inner)
            }
            Self::LevelMismatch {
                id,
                expected,
                actual,
            } => write!(
                f,
                "node {} has level {} but its position implies {}",
                id, actual, expected
            ),
            Self::MultipleRoots { ids } => write!(f, "multiple roots: {}", ids.join(", ")),
            Self::MissingRoot => f.write_str("tree has nodes but no root"),
            Self::DuplicateSiblingTitle { parent_id, title } => write!(
                f,
                "duplicate sibling title '{}' under {}",
                title, parent_id
            ),
        }
    }
}

/// Result of a full integrity scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub node_count: usize,
    pub violations: Vec<IntegrityViolation>,
}

impl IntegrityReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }

    /// One-line description of every violation, for logs and errors
    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Check every nested-set invariant over the full node set of one tree
pub fn check_tree(nodes: &[Node]) -> IntegrityReport {
    let mut violations = Vec::new();

    let mut valid: Vec<&Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if node.validate().is_err() {
            violations.push(IntegrityViolation::InvalidBounds {
                id: node.id.clone(),
                left: node.left,
                right: node.right,
            });
        } else {
            valid.push(node);
        }
    }

    let mut seen_bounds: HashMap<i64, &str> = HashMap::new();
    for node in &valid {
        for value in [node.left, node.right] {
            if let Some(first) = seen_bounds.insert(value, &node.id) {
                violations.push(IntegrityViolation::DuplicateBound {
                    value,
                    first: first.to_string(),
                    second: node.id.clone(),
                });
            }
        }
    }

    valid.sort_by_key(|n| n.left);

    let mut open: Vec<&Node> = Vec::new();
    let mut roots: Vec<String> = Vec::new();
    let mut sibling_titles: HashSet<(&str, &str)> = HashSet::new();
    let mut reported_titles: HashSet<(&str, &str)> = HashSet::new();

    for node in valid {
        while open.last().is_some_and(|top| top.right < node.left) {
            open.pop();
        }

        match open.last() {
            None => {
                if node.level != 0 {
                    violations.push(IntegrityViolation::LevelMismatch {
                        id: node.id.clone(),
                        expected: 0,
                        actual: node.level,
                    });
                }
                roots.push(node.id.clone());
            }
            Some(parent) => {
                if node.right > parent.right {
                    violations.push(IntegrityViolation::OverlappingIntervals {
                        outer: parent.id.clone(),
                        inner: node.id.clone(),
                    });
                } else if node.level != parent.level + 1 {
                    violations.push(IntegrityViolation::LevelMismatch {
                        id: node.id.clone(),
                        expected: parent.level + 1,
                        actual: node.level,
                    });
                }

                let key = (parent.id.as_str(), node.title.as_str());
                if !sibling_titles.insert(key) && reported_titles.insert(key) {
                    violations.push(IntegrityViolation::DuplicateSiblingTitle {
                        parent_id: parent.id.clone(),
                        title: node.title.clone(),
                    });
                }
            }
        }

        open.push(node);
    }

    if roots.len() > 1 {
        violations.push(IntegrityViolation::MultipleRoots { ids: roots });
    } else if roots.is_empty() && !nodes.is_empty() {
        violations.push(IntegrityViolation::MissingRoot);
    }

    IntegrityReport {
        node_count: nodes.len(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewNode, NodeRecord};

    fn node(id: &str, left: i64, right: i64, level: i64) -> Node {
        NodeRecord::from_new_node(NewNode::new(id), left, right, level).into_node(id)
    }

    fn titled(id: &str, title: &str, left: i64, right: i64, level: i64) -> Node {
        NodeRecord::from_new_node(NewNode::new(title), left, right, level).into_node(id)
    }

    fn sample() -> Vec<Node> {
        vec![
            node("root", 1, 10, 0),
            node("a", 2, 5, 1),
            node("a1", 3, 4, 2),
            node("b", 6, 9, 1),
        ]
    }

    #[test]
    fn test_consistent_tree() {
        let report = check_tree(&sample());
        assert!(report.is_consistent(), "{}", report.summary());
        assert_eq!(report.node_count, 4);
    }

    #[test]
    fn test_empty_tree_is_consistent() {
        assert!(check_tree(&[]).is_consistent());
    }

    #[test]
    fn test_gaps_between_bounds_are_allowed() {
        let nodes = vec![node("root", 1, 20, 0), node("a", 4, 7, 1), node("b", 11, 12, 1)];
        assert!(check_tree(&nodes).is_consistent());
    }

    #[test]
    fn test_detects_inverted_bounds() {
        let mut nodes = sample();
        nodes[2].right = 2;
        let report = check_tree(&nodes);
        assert!(report
            .violations
            .iter()
            .any(|v| matches!(v, IntegrityViolation::InvalidBounds { id, .. } if id == "a1")));
    }

    #[test]
    fn test_detects_overlap() {
        // a (2,7) and b (6,9) cross
        let nodes = vec![node("root", 1, 10, 0), node("a", 2, 7, 1), node("b", 6, 9, 1)];
        let report = check_tree(&nodes);
        assert!(report.violations.contains(&IntegrityViolation::OverlappingIntervals {
            outer: "a".to_string(),
            inner: "b".to_string(),
        }));
    }

    #[test]
    fn test_detects_level_skip() {
        let mut nodes = sample();
        nodes[2].level = 3;
        let report = check_tree(&nodes);
        assert_eq!(
            report.violations,
            vec![IntegrityViolation::LevelMismatch {
                id: "a1".to_string(),
                expected: 2,
                actual: 3,
            }]
        );
    }

    #[test]
    fn test_detects_duplicate_bounds() {
        let nodes = vec![node("root", 1, 6, 0), node("a", 2, 3, 1), node("b", 3, 4, 1)];
        let report = check_tree(&nodes);
        assert!(report
            .violations
            .iter()
            .any(|v| matches!(v, IntegrityViolation::DuplicateBound { value: 3, .. })));
    }

    #[test]
    fn test_detects_multiple_roots() {
        let nodes = vec![node("r1", 1, 2, 0), node("r2", 3, 4, 0)];
        let report = check_tree(&nodes);
        assert_eq!(
            report.violations,
            vec![IntegrityViolation::MultipleRoots {
                ids: vec!["r1".to_string(), "r2".to_string()],
            }]
        );
    }

    #[test]
    fn test_detects_duplicate_sibling_titles_once() {
        let nodes = vec![
            titled("root", "root", 1, 8, 0),
            titled("x1", "docs", 2, 3, 1),
            titled("x2", "docs", 4, 5, 1),
            titled("x3", "docs", 6, 7, 1),
        ];
        let report = check_tree(&nodes);
        assert_eq!(
            report.violations,
            vec![IntegrityViolation::DuplicateSiblingTitle {
                parent_id: "root".to_string(),
                title: "docs".to_string(),
            }]
        );
        assert!(report.summary().contains("docs"));
    }

    #[test]
    fn test_same_title_under_different_parents_is_fine() {
        let nodes = vec![
            titled("root", "root", 1, 10, 0),
            titled("a", "a", 2, 5, 1),
            titled("a-docs", "docs", 3, 4, 2),
            titled("b", "b", 6, 9, 1),
            titled("b-docs", "docs", 7, 8, 2),
        ];
        assert!(check_tree(&nodes).is_consistent());
    }
}
