//! Node Data Structures
//!
//! This module defines the `Node` struct stored by the tree and the types used to
//! create new nodes.
//!
//! # Nested-Set Model
//!
//! - **Bounds**: every node carries a `(left, right)` interval; a node is an ancestor
//!   of another exactly when its interval strictly contains the other's
//! - **Level**: depth below the root (root = 0)
//! - **No parent pointer**: the parent is the nearest enclosing interval at `level - 1`
//!
//! Bounds and levels are owned by `TreeService`. Callers read them but never write
//! them directly.
//!
//! # Examples
//!
//! ```rust
//! use foldertree_core::models::{NewNode, NodeRecord};
//! use serde_json::json;
//!
//! let attrs = NewNode::new("reports").with_properties(json!({ "owner": "ops" }));
//! let record = NodeRecord::from_new_node(attrs, 2, 3, 1);
//! assert_eq!((record.left, record.right, record.level), (2, 3, 1));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for node attributes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid title '{title}': {reason}")]
    InvalidTitle { title: String, reason: String },

    #[error("Invalid bounds ({left}, {right}): {reason}")]
    InvalidBounds {
        left: i64,
        right: i64,
        reason: String,
    },

    #[error("Properties validation failed: {0}")]
    InvalidProperties(String),
}

/// A persisted node of the tree.
///
/// # Fields
///
/// - `id`: Identifier assigned by the store on insert (immutable)
/// - `title`: Display name, unique among siblings
/// - `left` / `right`: Interval bounds, `left < right`
/// - `level`: Depth below the root
/// - `properties`: Attributes supplied on creation (JSON object)
/// - `created_at`: Creation timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Store-assigned identifier
    pub id: String,

    /// Display name (path segment)
    pub title: String,

    /// Opening bound
    pub left: i64,

    /// Closing bound
    pub right: i64,

    /// Depth below the root
    pub level: i64,

    /// Caller-supplied attributes
    #[serde(default = "empty_object")]
    pub properties: serde_json::Value,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Node {
    /// Numbering span covered by this node's interval (`right - left`)
    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    /// True when this node is the tree root
    pub fn is_root(&self) -> bool {
        self.level == 0
    }

    /// True when `other` lies strictly inside this node's interval
    ///
    /// ```rust
    /// # use foldertree_core::models::{NewNode, NodeRecord};
    /// let a = NodeRecord::from_new_node(NewNode::new("a"), 2, 5, 1).into_node("a");
    /// let a1 = NodeRecord::from_new_node(NewNode::new("a1"), 3, 4, 2).into_node("a1");
    /// assert!(a.contains(&a1));
    /// assert!(!a1.contains(&a));
    /// ```
    pub fn contains(&self, other: &Node) -> bool {
        self.left < other.left && other.right < self.right
    }

    /// True when `other` is a direct child of this node
    pub fn is_parent_of(&self, other: &Node) -> bool {
        self.contains(other) && other.level == self.level + 1
    }

    /// Check the structural fields of a single node
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::MissingField("id".to_string()));
        }

        if self.left >= self.right {
            return Err(ValidationError::InvalidBounds {
                left: self.left,
                right: self.right,
                reason: "left bound must be smaller than right bound".to_string(),
            });
        }

        if self.level < 0 {
            return Err(ValidationError::InvalidBounds {
                left: self.left,
                right: self.right,
                reason: format!("negative level {}", self.level),
            });
        }

        Ok(())
    }
}

/// A node that has not been persisted yet.
///
/// Passed to `NodeStore::insert_one`, which assigns the `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub title: String,
    pub left: i64,
    pub right: i64,
    pub level: i64,
    #[serde(default = "empty_object")]
    pub properties: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl NodeRecord {
    /// Build a record for the given slot from caller attributes
    pub fn from_new_node(attrs: NewNode, left: i64, right: i64, level: i64) -> Self {
        Self {
            title: attrs.title,
            left,
            right,
            level,
            properties: attrs.properties,
            created_at: Utc::now(),
        }
    }

    /// Attach the store-assigned identifier
    pub fn into_node(self, id: impl Into<String>) -> Node {
        Node {
            id: id.into(),
            title: self.title,
            left: self.left,
            right: self.right,
            level: self.level,
            properties: self.properties,
            created_at: self.created_at,
        }
    }
}

impl From<Node> for NodeRecord {
    fn from(node: Node) -> Self {
        Self {
            title: node.title,
            left: node.left,
            right: node.right,
            level: node.level,
            properties: node.properties,
            created_at: node.created_at,
        }
    }
}

/// Attributes for a node about to be inserted
///
/// # Examples
///
/// ```rust
/// # use foldertree_core::models::NewNode;
/// # use serde_json::json;
/// let folder = NewNode::new("invoices").with_properties(json!({ "kind": "folder" }));
/// assert!(folder.validate("/").is_ok());
/// assert!(NewNode::new("a/b").validate("/").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNode {
    /// Display name, unique among the new node's siblings
    pub title: String,
    /// Additional attributes as a JSON object
    #[serde(default = "empty_object")]
    pub properties: serde_json::Value,
}

impl NewNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            properties: empty_object(),
        }
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }

    /// Validate the title against the path separator and the properties shape
    pub fn validate(&self, separator: &str) -> Result<(), ValidationError> {
        validate_title(&self.title, separator)?;

        if !self.properties.is_object() {
            return Err(ValidationError::InvalidProperties(
                "properties must be a JSON object".to_string(),
            ));
        }

        Ok(())
    }
}

/// Titles double as path segments, so they cannot be blank or embed the separator
pub fn validate_title(title: &str, separator: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::InvalidTitle {
            title: title.to_string(),
            reason: "title must not be blank".to_string(),
        });
    }

    if !separator.is_empty() && title.contains(separator) {
        return Err(ValidationError::InvalidTitle {
            title: title.to_string(),
            reason: format!("title must not contain the path separator '{}'", separator),
        });
    }

    Ok(())
}
