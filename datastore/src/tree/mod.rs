//! An immutable, hierarchical tree of values addressed by [Path].
//!
//! # Overview
//!
//! A tree is made of [Node]s. Each node is either a leaf holding a scalar [Value] or a container
//! mapping child segments to child nodes. Children are held behind [Arc], so a [Snapshot] produced
//! by [Snapshot::apply] shares every untouched subtree with the snapshot it was derived from and
//! only copies the nodes along the modified paths.
//!
//! Snapshots are never mutated. Applying a list of [Operation]s returns a new snapshot (with the
//! next version) together with the [Change]s the operations produced, which is what the
//! notification subsystem fans out to listeners.
//!
//! # Operations
//!
//! - _PUT_ replaces the subtree at a path, creating missing intermediate containers.
//! - _MERGE_ unions the supplied subtree into the existing one. Container keys union and leaf
//!   values overwrite.
//! - _DELETE_ removes the subtree at a path. Deleting an absent path does nothing.
//!
//! Operations in one call are applied in order, so the last write to a path wins.
//!
//! # Example
//!
//! ```rust
//! use commonware_datastore::tree::{Node, Operation, Path, Snapshot};
//!
//! let path = Path::parse("/outer/inner").unwrap();
//! let (snapshot, changes) = Snapshot::empty()
//!     .apply(&[Operation::put(path.clone(), 5)])
//!     .unwrap();
//! assert_eq!(snapshot.read(&path).as_deref(), Some(&Node::from(5)));
//! assert_eq!(changes.len(), 1);
//! ```

use std::{collections::BTreeMap, fmt, sync::Arc};

mod path;
pub use path::Path;
mod snapshot;
pub use snapshot::{Change, Operation, Snapshot};

/// A scalar stored at a leaf.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Integer(i64),
    String(String),
    Boolean(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Boolean(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

/// A node in the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Leaf(Value),
    Container(BTreeMap<String, Arc<Node>>),
}

impl Node {
    /// An empty container.
    pub fn container() -> Self {
        Node::Container(BTreeMap::new())
    }

    /// Builder-style helper that sets `child` under `segment`.
    ///
    /// A leaf is replaced by a container holding only `child`.
    pub fn with(self, segment: impl Into<String>, child: impl Into<Node>) -> Self {
        let mut children = match self {
            Node::Container(children) => children,
            Node::Leaf(_) => BTreeMap::new(),
        };
        children.insert(segment.into(), Arc::new(child.into()));
        Node::Container(children)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Node::Container(_))
    }

    /// The value held by a leaf.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Node::Leaf(value) => Some(value),
            Node::Container(_) => None,
        }
    }

    /// The children of a container.
    pub fn children(&self) -> Option<&BTreeMap<String, Arc<Node>>> {
        match self {
            Node::Leaf(_) => None,
            Node::Container(children) => Some(children),
        }
    }

    pub fn child(&self, segment: &str) -> Option<&Arc<Node>> {
        self.children()?.get(segment)
    }

    /// Number of children (zero for a leaf).
    pub fn len(&self) -> usize {
        self.children().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Descend through `segments`, returning `None` if any segment is missing or a leaf is hit
    /// before the last segment.
    pub fn descend<'a>(&'a self, segments: &[String]) -> Option<&'a Node> {
        let mut current = self;
        for segment in segments {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Like [Node::descend] but returns the shared handle of the final node.
    pub(crate) fn descend_shared(node: &Arc<Node>, segments: &[String]) -> Option<Arc<Node>> {
        let mut current = node;
        for segment in segments {
            current = current.child(segment)?;
        }
        Some(current.clone())
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::Leaf(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Leaf(value.into())
    }
}

impl From<i32> for Node {
    fn from(value: i32) -> Self {
        Node::Leaf(value.into())
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Leaf(value.into())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Leaf(value.into())
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Leaf(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let node = Node::container()
            .with("name", 1)
            .with("value", "Item-0-1")
            .with("nested", Node::container().with("flag", true));
        assert_eq!(node.len(), 3);
        assert_eq!(node.child("name").unwrap().value(), Some(&Value::Integer(1)));
        assert_eq!(
            node.descend(&["nested".to_string(), "flag".to_string()])
                .and_then(Node::value),
            Some(&Value::Boolean(true))
        );
    }

    #[test]
    fn test_leaf_with_becomes_container() {
        let node = Node::from(7).with("a", 1);
        assert!(node.is_container());
        assert_eq!(node.len(), 1);
    }

    #[test]
    fn test_descend_through_leaf() {
        let node = Node::container().with("a", 1);
        assert!(node.descend(&["a".to_string(), "b".to_string()]).is_none());
        assert!(node.descend(&["missing".to_string()]).is_none());
        assert_eq!(node.descend(&[]), Some(&node));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::from(5).to_string(), "5");
        assert_eq!(Value::from("x").to_string(), "\"x\"");
        assert_eq!(Value::from(false).to_string(), "false");
    }
}
