//! Store Predicates and Updates
//!
//! The five store operations take a `NodeFilter` (a conjunction of equality and
//! range predicates) and, for `update_many`, a set of additive `FieldIncrements`.
//! Both are plain data so any backend can translate them into its own dialect
//! (SurrealQL, a Mongo filter document, SQL) or evaluate them in memory.
//!
//! # Examples
//!
//! ```rust
//! use foldertree_core::models::{FieldIncrements, NodeFilter};
//!
//! // Every node whose right bound is at or after 9 grows by two
//! let filter = NodeFilter::new().right_gte(9);
//! let increments = FieldIncrements::right(2);
//! assert_eq!(filter.predicates().len(), 1);
//! assert_eq!(increments.right, 2);
//! ```

use super::Node;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer fields the tree keeps on every node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BoundField {
    Left,
    Right,
    Level,
}

impl BoundField {
    /// Field name as stored in documents
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundField::Left => "left",
            BoundField::Right => "right",
            BoundField::Level => "level",
        }
    }

    fn read(&self, node: &Node) -> i64 {
        match self {
            BoundField::Left => node.left,
            BoundField::Right => node.right,
            BoundField::Level => node.level,
        }
    }
}

impl fmt::Display for BoundField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator for bound predicates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FilterOperator {
    /// Equality (=)
    Equals,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal (<=)
    LessThanOrEqual,
}

impl FilterOperator {
    /// Operator symbol shared by SQL-like dialects
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
        }
    }

    fn evaluate(&self, actual: i64, expected: i64) -> bool {
        match self {
            FilterOperator::Equals => actual == expected,
            FilterOperator::GreaterThan => actual > expected,
            FilterOperator::GreaterThanOrEqual => actual >= expected,
            FilterOperator::LessThan => actual < expected,
            FilterOperator::LessThanOrEqual => actual <= expected,
        }
    }
}

/// A single comparison against one bound field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundPredicate {
    pub field: BoundField,
    pub operator: FilterOperator,
    pub value: i64,
}

impl BoundPredicate {
    pub fn matches(&self, node: &Node) -> bool {
        self.operator.evaluate(self.field.read(node), self.value)
    }
}

impl fmt::Display for BoundPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator.symbol(), self.value)
    }
}

/// Conjunction of predicates over a node document
///
/// An empty filter matches every node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeFilter {
    /// Match a specific node ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Match a title exactly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Range/equality predicates on bound fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounds: Vec<BoundPredicate>,
}

impl NodeFilter {
    /// Create a new empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by node ID
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().with_id(id)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a predicate on a bound field (can be called multiple times)
    pub fn with_bound(mut self, field: BoundField, operator: FilterOperator, value: i64) -> Self {
        self.bounds.push(BoundPredicate {
            field,
            operator,
            value,
        });
        self
    }

    pub fn left_gt(self, value: i64) -> Self {
        self.with_bound(BoundField::Left, FilterOperator::GreaterThan, value)
    }

    pub fn left_gte(self, value: i64) -> Self {
        self.with_bound(BoundField::Left, FilterOperator::GreaterThanOrEqual, value)
    }

    pub fn left_lt(self, value: i64) -> Self {
        self.with_bound(BoundField::Left, FilterOperator::LessThan, value)
    }

    pub fn right_gt(self, value: i64) -> Self {
        self.with_bound(BoundField::Right, FilterOperator::GreaterThan, value)
    }

    pub fn right_gte(self, value: i64) -> Self {
        self.with_bound(BoundField::Right, FilterOperator::GreaterThanOrEqual, value)
    }

    pub fn right_lt(self, value: i64) -> Self {
        self.with_bound(BoundField::Right, FilterOperator::LessThan, value)
    }

    pub fn right_lte(self, value: i64) -> Self {
        self.with_bound(BoundField::Right, FilterOperator::LessThanOrEqual, value)
    }

    pub fn level_eq(self, value: i64) -> Self {
        self.with_bound(BoundField::Level, FilterOperator::Equals, value)
    }

    /// Nodes strictly inside `node`'s interval
    pub fn descendants_of(node: &Node) -> Self {
        Self::new().left_gt(node.left).right_lt(node.right)
    }

    /// Nodes whose interval strictly contains `node`'s interval
    pub fn ancestors_of(node: &Node) -> Self {
        Self::new().left_lt(node.left).right_gt(node.right)
    }

    /// Direct children of `node`
    pub fn children_of(node: &Node) -> Self {
        Self::descendants_of(node).level_eq(node.level + 1)
    }

    /// `node` together with all of its descendants
    pub fn subtree_of(node: &Node) -> Self {
        Self::new().left_gte(node.left).right_lte(node.right)
    }

    pub fn predicates(&self) -> &[BoundPredicate] {
        &self.bounds
    }

    /// Evaluate the filter against a node
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(id) = &self.id {
            if &node.id != id {
                return false;
            }
        }

        if let Some(title) = &self.title {
            if &node.title != title {
                return false;
            }
        }

        self.bounds.iter().all(|p| p.matches(node))
    }

    /// The same filter with every bound predicate moved by the increment applied to
    /// its field.
    ///
    /// After `update_many(filter, inc)`, `filter.translated(&inc)` selects the
    /// updated records as long as no untouched record holds a value in the range the
    /// thresholds moved across.
    pub fn translated(&self, increments: &FieldIncrements) -> Self {
        let mut filter = self.clone();
        for predicate in &mut filter.bounds {
            predicate.value += increments.get(predicate.field);
        }
        filter
    }
}

impl fmt::Display for NodeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = &self.id {
            parts.push(format!("id = {}", id));
        }
        if let Some(title) = &self.title {
            parts.push(format!("title = {:?}", title));
        }
        parts.extend(self.bounds.iter().map(|p| p.to_string()));

        if parts.is_empty() {
            f.write_str("*")
        } else {
            f.write_str(&parts.join(" AND "))
        }
    }
}

/// Additive deltas for `update_many`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldIncrements {
    #[serde(default)]
    pub left: i64,
    #[serde(default)]
    pub right: i64,
    #[serde(default)]
    pub level: i64,
}

impl FieldIncrements {
    pub fn left(delta: i64) -> Self {
        Self {
            left: delta,
            ..Default::default()
        }
    }

    pub fn right(delta: i64) -> Self {
        Self {
            right: delta,
            ..Default::default()
        }
    }

    /// Same delta on both bounds, with a separate level change
    pub fn translate(delta: i64, level: i64) -> Self {
        Self {
            left: delta,
            right: delta,
            level,
        }
    }

    pub fn get(&self, field: BoundField) -> i64 {
        match field {
            BoundField::Left => self.left,
            BoundField::Right => self.right,
            BoundField::Level => self.level,
        }
    }

    /// Non-zero deltas as (field, delta) pairs
    pub fn entries(&self) -> Vec<(BoundField, i64)> {
        [
            (BoundField::Left, self.left),
            (BoundField::Right, self.right),
            (BoundField::Level, self.level),
        ]
        .into_iter()
        .filter(|(_, delta)| *delta != 0)
        .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.left == 0 && self.right == 0 && self.level == 0
    }

    pub fn negated(&self) -> Self {
        Self {
            left: -self.left,
            right: -self.right,
            level: -self.level,
        }
    }

    /// Apply the deltas to a node in place
    pub fn apply(&self, node: &mut Node) {
        node.left += self.left;
        node.right += self.right;
        node.level += self.level;
    }
}

impl fmt::Display for FieldIncrements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries()
            .into_iter()
            .map(|(field, delta)| format!("{} {:+}", field, delta))
            .collect();
        if parts.is_empty() {
            f.write_str("noop")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Sort order for `find`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderBy {
    /// Pre-order (root first)
    LeftAsc,
    /// Reverse pre-order
    LeftDesc,
}

impl OrderBy {
    /// Sort nodes in place
    pub fn sort(&self, nodes: &mut [Node]) {
        match self {
            OrderBy::LeftAsc => nodes.sort_by_key(|n| n.left),
            OrderBy::LeftDesc => nodes.sort_by_key(|n| std::cmp::Reverse(n.left)),
        }
    }
}
