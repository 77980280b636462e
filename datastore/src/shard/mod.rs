//! Partition the tree across independently committed shards.
//!
//! # Overview
//!
//! A [Layout] splits the declared top-level namespace into disjoint ranges, one per shard, and
//! routes every path by its top-level segment. The layout is fixed when the store is created.
//!
//! Each shard owns one current [Snapshot] and one [Sequencer]. The sequencer is the only writer
//! of the current snapshot: it drains its mailbox one transaction at a time, so at most one apply
//! runs per shard while different shards commit in parallel. Readers load the current snapshot
//! through [Shard] without coordinating with the sequencer.

use crate::{
    tree::{Node, Path, Snapshot},
    Error,
};
use arc_swap::ArcSwap;
use std::{fmt, sync::Arc};

mod config;
pub use config::Config;
mod ingress;
pub use ingress::Mailbox;
pub(crate) use ingress::Submission;
mod layout;
pub use layout::Layout;
mod metrics;
mod sequencer;
pub use sequencer::Sequencer;

/// Identifier of a shard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardId(u32);

impl ShardId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a running shard.
#[derive(Clone)]
pub struct Shard {
    id: ShardId,
    pub(crate) current: Arc<ArcSwap<Snapshot>>,
    pub(crate) mailbox: Mailbox,
}

impl Shard {
    pub fn id(&self) -> ShardId {
        self.id
    }

    /// The latest committed snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Read `path` from the latest committed snapshot.
    pub fn read(&self, path: &Path) -> Option<Arc<Node>> {
        self.current.load().read(path)
    }
}

/// Routes paths to running shards.
pub(crate) struct Router {
    layout: Layout,
    shards: Vec<Shard>,
}

impl Router {
    pub(crate) fn new(layout: Layout, shards: Vec<Shard>) -> Self {
        Self { layout, shards }
    }

    pub(crate) fn layout(&self) -> &Layout {
        &self.layout
    }

    pub(crate) fn get(&self, id: ShardId) -> Result<&Shard, Error> {
        self.shards
            .get(id.get() as usize)
            .ok_or(Error::UnknownShard(id))
    }

    /// Return the shard owning `path`.
    pub(crate) fn route(&self, path: &Path) -> Result<&Shard, Error> {
        let id = self.layout.route(path)?;
        self.get(id)
    }

    pub(crate) fn shards(&self) -> &[Shard] {
        &self.shards
    }
}
