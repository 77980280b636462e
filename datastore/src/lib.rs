//! A sharded, transactional, in-memory tree store with change notifications.
//!
//! # Overview
//!
//! Data lives in an immutable [tree::Snapshot] per shard. A [transaction::Transaction] buffers
//! PUT/MERGE/DELETE operations against a base snapshot and, once submitted, is queued to the
//! serial commit sequencer of the single shard its paths route to. The sequencer validates the
//! transaction, applies it to produce the next snapshot, swaps that snapshot in atomically and
//! hands the resulting changes to the [notify::Notifier], which fans them out to registered
//! [notify::Listener]s through a bounded queue per listener.
//!
//! The [Datastore] ties these pieces together and the [benchmark] module drives load against it.
//!
//! # Example
//!
//! ```rust
//! use commonware_datastore::{Config, Datastore, tree::{Node, Path}};
//! use commonware_runtime::{deterministic, Runner};
//! use std::num::NonZeroUsize;
//!
//! let executor = deterministic::Runner::default();
//! executor.start(|context| async move {
//!     let store = Datastore::init(context, Config {
//!         shards: NonZeroUsize::new(1).unwrap(),
//!         namespace: vec![],
//!         mailbox_size: 1024,
//!         listener_queue_size: 1024,
//!     }).unwrap();
//!
//!     let path = Path::parse("/outer[0]/inner[0]").unwrap();
//!     let mut tx = store.begin();
//!     tx.put(path.clone(), 5).unwrap();
//!     tx.submit().await.unwrap().await.unwrap();
//!
//!     assert_eq!(store.read(&path).unwrap().as_deref(), Some(&Node::from(5)));
//! });
//! ```

pub mod benchmark;
mod datastore;
pub use datastore::{Config, Datastore};
pub mod notify;
pub mod shard;
pub mod transaction;
pub mod tree;

use shard::ShardId;
use thiserror::Error;
use transaction::State;
use tree::Path;

/// Errors that can occur when interacting with a [Datastore].
///
/// Reading an absent path is not an error (it returns `None`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("cannot descend through leaf: {0}")]
    LeafTraversal(Path),
    #[error("root must be a container")]
    RootNotContainer,
    #[error("transaction {0} is {1}")]
    InvalidState(u64, State),
    #[error("optimistic lock failure: based on version {expected}, current version {found}")]
    OptimisticLockFailure { expected: u64, found: u64 },
    #[error("transaction bound to shard {bound}, path routes to shard {found}")]
    CrossShard { bound: ShardId, found: ShardId },
    #[error("path does not route to a shard: {0}")]
    Unroutable(Path),
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    #[error("unknown shard: {0}")]
    UnknownShard(ShardId),
    #[error("store corruption on shard {0}")]
    StoreCorruption(ShardId),
    #[error("shard closed")]
    Closed,
}
