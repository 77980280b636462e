use crate::{
    notify::{Listener, Notifier, Registration},
    shard::{self, Layout, Router, Sequencer, Shard, ShardId},
    transaction::{Chain, Transaction},
    tree::{Node, Path, Snapshot},
    Error,
};
use commonware_runtime::{Metrics, Spawner};
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::info;

/// Configuration for a [Datastore].
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of shards to partition the namespace into.
    pub shards: NonZeroUsize,

    /// Top-level segments the shards are partitioned over.
    ///
    /// Must contain at least `shards` distinct segments when more than one shard is requested.
    pub namespace: Vec<String>,

    /// The maximum number of transactions queued on a shard's sequencer.
    pub mailbox_size: usize,

    /// The maximum number of notifications queued per listener before new ones are dropped.
    pub listener_queue_size: usize,
}

/// A sharded, transactional tree store.
///
/// Cloning returns another handle to the same store.
pub struct Datastore<E: Spawner + Metrics> {
    router: Arc<Router>,
    notifier: Arc<Notifier<E>>,
    ids: Arc<AtomicU64>,
}

impl<E: Spawner + Metrics> Clone for Datastore<E> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            notifier: self.notifier.clone(),
            ids: self.ids.clone(),
        }
    }
}

impl<E: Spawner + Metrics> Datastore<E> {
    /// Partition the namespace and start one sequencer per shard.
    pub fn init(context: E, cfg: Config) -> Result<Self, Error> {
        let layout = Layout::new(cfg.shards, &cfg.namespace)?;
        let notifier = Arc::new(Notifier::new(
            context.with_label("notifier"),
            cfg.listener_queue_size,
        ));
        let mut shards = Vec::with_capacity(layout.shards());
        for index in 0..layout.shards() {
            let id = ShardId::new(index as u32);
            let (sequencer, shard) = Sequencer::new(
                context.with_label(&format!("shard_{index}")),
                shard::Config {
                    id,
                    mailbox_size: cfg.mailbox_size,
                },
                notifier.clone(),
            );
            sequencer.start();
            shards.push(shard);
        }
        info!(shards = shards.len(), "initialized datastore");
        Ok(Self {
            router: Arc::new(Router::new(layout, shards)),
            notifier,
            ids: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Begin an independent transaction.
    pub fn begin(&self) -> Transaction {
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        Transaction::new(id, self.router.clone(), None)
    }

    /// Create a new transaction chain.
    pub fn chain(&self) -> Chain {
        Chain::new(self.router.clone(), self.ids.clone())
    }

    /// Read `path` from the latest committed snapshot of its shard.
    pub fn read(&self, path: &Path) -> Result<Option<Arc<Node>>, Error> {
        Ok(self.router.route(path)?.read(path))
    }

    /// Return the shard owning `path`.
    pub fn route(&self, path: &Path) -> Result<ShardId, Error> {
        self.router.layout().route(path)
    }

    pub fn layout(&self) -> &Layout {
        self.router.layout()
    }

    pub fn shard(&self, id: ShardId) -> Result<Shard, Error> {
        self.router.get(id).cloned()
    }

    pub fn shards(&self) -> &[Shard] {
        self.router.shards()
    }

    /// The latest committed snapshot of a shard.
    pub fn snapshot(&self, id: ShardId) -> Result<Arc<Snapshot>, Error> {
        Ok(self.router.get(id)?.current())
    }

    /// Register `listener` for changes at or below `path`.
    pub fn register<L: Listener>(&self, path: Path, listener: &Arc<L>) -> Registration {
        self.notifier.register(path, listener)
    }

    pub fn unregister(&self, registration: &Registration) -> bool {
        self.notifier.unregister(registration)
    }

    /// Number of active listener registrations.
    pub fn listeners(&self) -> usize {
        self.notifier.len()
    }

    /// Wait until every notification for commits observed so far has been delivered.
    pub async fn flush(&self) {
        self.notifier.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};

    #[test_traced]
    fn test_invalid_layout() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let result = Datastore::init(
                context,
                Config {
                    shards: NonZeroUsize::new(4).unwrap(),
                    namespace: vec!["a".into(), "b".into()],
                    mailbox_size: 16,
                    listener_queue_size: 16,
                },
            );
            assert!(matches!(result, Err(Error::InvalidLayout(_))));
        });
    }

    #[test_traced]
    fn test_shards_commit_independently() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let store = Datastore::init(
                context,
                Config {
                    shards: NonZeroUsize::new(3).unwrap(),
                    namespace: (0..3).map(|i| format!("outer-list[{i}]")).collect(),
                    mailbox_size: 16,
                    listener_queue_size: 16,
                },
            )
            .unwrap();
            assert_eq!(store.shards().len(), 3);

            // Independent transactions on different shards never conflict
            let mut transactions = Vec::new();
            for i in 0..3 {
                let mut tx = store.begin();
                tx.put(Path::parse(&format!("/outer-list[{i}]/x")).unwrap(), i)
                    .unwrap();
                transactions.push(tx);
            }
            let mut commits = Vec::new();
            for tx in transactions.iter_mut() {
                commits.push(tx.submit().await.unwrap());
            }
            for commit in commits {
                assert_eq!(commit.await.unwrap().version, Some(1));
            }
            for shard in store.shards() {
                assert_eq!(shard.current().version(), 1);
            }
            assert!(matches!(
                store.read(&Path::root()),
                Err(Error::Unroutable(_))
            ));
        });
    }
}
