use super::{Node, Path};
use crate::Error;
use std::{collections::BTreeMap, sync::Arc};

/// A buffered mutation of the tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Replace the subtree at `path` with `node`.
    Put { path: Path, node: Arc<Node> },
    /// Union `node` into the subtree at `path`.
    Merge { path: Path, node: Arc<Node> },
    /// Remove the subtree at `path`.
    Delete { path: Path },
}

impl Operation {
    pub fn put(path: Path, node: impl Into<Node>) -> Self {
        Operation::Put {
            path,
            node: Arc::new(node.into()),
        }
    }

    pub fn merge(path: Path, node: impl Into<Node>) -> Self {
        Operation::Merge {
            path,
            node: Arc::new(node.into()),
        }
    }

    pub fn delete(path: Path) -> Self {
        Operation::Delete { path }
    }

    /// The path the operation targets.
    pub fn path(&self) -> &Path {
        match self {
            Operation::Put { path, .. } | Operation::Merge { path, .. } => path,
            Operation::Delete { path } => path,
        }
    }
}

/// The effect of a single operation: the subtree at `path` before and after it was applied.
///
/// `None` means the path was absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub path: Path,
    pub before: Option<Arc<Node>>,
    pub after: Option<Arc<Node>>,
}

impl Change {
    /// Restrict this change to the subtree rooted at `scope`.
    ///
    /// A change at or below `scope` is returned unchanged. A change above `scope` is projected
    /// onto `scope` and dropped if the projected subtree did not change. Changes to disjoint
    /// paths return `None`.
    pub fn restrict(&self, scope: &Path) -> Option<Change> {
        if scope.is_prefix_of(&self.path) {
            return Some(self.clone());
        }
        let relative = scope.strip_prefix(&self.path)?;
        let before = self
            .before
            .as_ref()
            .and_then(|node| Node::descend_shared(node, relative));
        let after = self
            .after
            .as_ref()
            .and_then(|node| Node::descend_shared(node, relative));
        let unchanged = match (&before, &after) {
            (None, None) => true,
            (Some(b), Some(a)) => Arc::ptr_eq(b, a) || b == a,
            _ => false,
        };
        if unchanged {
            return None;
        }
        Some(Change {
            path: scope.clone(),
            before,
            after,
        })
    }
}

/// An immutable, versioned view of a tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    version: u64,
    root: Arc<Node>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl Snapshot {
    /// A snapshot at version 0 whose root is an empty container.
    pub fn empty() -> Self {
        Self {
            version: 0,
            root: Arc::new(Node::container()),
        }
    }

    /// The number of applications since [Snapshot::empty] that changed the tree.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Read the subtree at `path`, returning `None` if it does not exist.
    pub fn read(&self, path: &Path) -> Option<Arc<Node>> {
        Node::descend_shared(&self.root, path.segments())
    }

    /// Apply `operations` in order, returning the resulting snapshot and the changes made.
    ///
    /// `self` is left untouched. If any operation fails, no snapshot is produced. If no operation
    /// changed anything (e.g. only absent paths were deleted), the result equals `self`.
    pub fn apply(&self, operations: &[Operation]) -> Result<(Snapshot, Vec<Change>), Error> {
        let mut root = self.root.clone();
        let mut changes = Vec::with_capacity(operations.len());
        for operation in operations {
            let path = operation.path();
            let before = Node::descend_shared(&root, path.segments());
            let after = match operation {
                Operation::Put { node, .. } => Some(node.clone()),
                Operation::Merge { node, .. } => Some(merge(before.as_ref(), node)),
                Operation::Delete { .. } => {
                    if before.is_none() {
                        continue;
                    }
                    None
                }
            };
            root = if path.is_root() {
                match &after {
                    Some(node) if !node.is_container() => return Err(Error::RootNotContainer),
                    Some(node) => node.clone(),
                    None => Arc::new(Node::container()),
                }
            } else {
                rewrite(&root, path.segments(), after.clone(), path)?
            };

            // Deleting the root leaves an empty container behind
            let after = if path.is_root() {
                Some(root.clone())
            } else {
                after
            };
            changes.push(Change {
                path: path.clone(),
                before,
                after,
            });
        }
        if changes.is_empty() {
            return Ok((self.clone(), changes));
        }
        Ok((
            Snapshot {
                version: self.version + 1,
                root,
            },
            changes,
        ))
    }
}

/// Copy the nodes along `segments`, setting (or removing) the final one.
///
/// Missing intermediate nodes are created as empty containers.
fn rewrite(
    node: &Arc<Node>,
    segments: &[String],
    replacement: Option<Arc<Node>>,
    path: &Path,
) -> Result<Arc<Node>, Error> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(replacement.unwrap_or_else(|| Arc::new(Node::container())));
    };
    let Node::Container(children) = node.as_ref() else {
        return Err(Error::LeafTraversal(path.clone()));
    };
    let mut children = children.clone();
    if rest.is_empty() {
        match replacement {
            Some(replacement) => {
                children.insert(head.clone(), replacement);
            }
            None => {
                children.remove(head);
            }
        }
    } else {
        let child = match children.get(head) {
            Some(child) => child.clone(),
            None => Arc::new(Node::container()),
        };
        let child = rewrite(&child, rest, replacement, path)?;
        children.insert(head.clone(), child);
    }
    Ok(Arc::new(Node::Container(children)))
}

/// Union `incoming` into `existing`.
fn merge(existing: Option<&Arc<Node>>, incoming: &Arc<Node>) -> Arc<Node> {
    let (Some(existing), Node::Container(additions)) = (existing, incoming.as_ref()) else {
        return incoming.clone();
    };
    let Node::Container(children) = existing.as_ref() else {
        return incoming.clone();
    };
    let mut merged: BTreeMap<String, Arc<Node>> = children.clone();
    for (segment, addition) in additions {
        let child = merge(children.get(segment), addition);
        merged.insert(segment.clone(), child);
    }
    Arc::new(Node::Container(merged))
}
