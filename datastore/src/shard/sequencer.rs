use super::{
    ingress::{Message, Submission},
    metrics, Config, Mailbox, Shard, ShardId,
};
use crate::{
    notify::Notifier,
    transaction::{Committed, State},
    tree::Snapshot,
    Error,
};
use arc_swap::ArcSwap;
use commonware_runtime::{Handle, Metrics, Spawner};
use futures::{channel::mpsc, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Serial commit sequencer of a single shard.
///
/// It is responsible for:
/// - Validating submitted transactions against the current snapshot
/// - Applying them and atomically publishing the resulting snapshot
/// - Handing the resulting changes to the [Notifier]
pub struct Sequencer<E: Spawner + Metrics> {
    context: E,
    id: ShardId,

    mailbox: mpsc::Receiver<Message>,

    /// The snapshot this sequencer last published.
    snapshot: Arc<Snapshot>,
    /// Pointer shared with readers.
    current: Arc<ArcSwap<Snapshot>>,

    /// Set when the published pointer no longer matches `snapshot`. Once set, every
    /// remaining and future submission fails.
    corrupted: bool,

    notifier: Arc<Notifier<E>>,
    metrics: metrics::Metrics,
}

impl<E: Spawner + Metrics> Sequencer<E> {
    /// Creates a new sequencer with an empty snapshot.
    /// Returns the sequencer and a [Shard] handle for reading and submitting.
    pub fn new(context: E, cfg: Config, notifier: Arc<Notifier<E>>) -> (Self, Shard) {
        let (sender, receiver) = mpsc::channel(cfg.mailbox_size);
        let snapshot = Arc::new(Snapshot::empty());
        let current = Arc::new(ArcSwap::new(snapshot.clone()));
        let metrics = metrics::Metrics::init(context.clone());
        let shard = Shard {
            id: cfg.id,
            current: current.clone(),
            mailbox: Mailbox::new(sender),
        };
        let sequencer = Self {
            context,
            id: cfg.id,
            mailbox: receiver,
            snapshot,
            current,
            corrupted: false,
            notifier,
            metrics,
        };
        (sequencer, shard)
    }

    /// Starts the sequencer. It runs until every [Mailbox] is dropped.
    pub fn start(self) -> Handle<()> {
        let context = self.context.clone();
        context.spawn(|_| self.run())
    }

    async fn run(mut self) {
        while let Some(msg) = self.mailbox.next().await {
            match msg {
                Message::Submit {
                    submission,
                    responder,
                } => {
                    trace!(
                        shard = %self.id,
                        transaction = submission.transaction,
                        "mailbox: submit"
                    );
                    let result = self.commit(submission);
                    let _ = responder.send(result);
                }
            }
        }
        debug!(shard = %self.id, "mailbox closed");
    }

    /// Validate, apply and publish a single submission.
    fn commit(&mut self, submission: Submission) -> Result<Committed, Error> {
        let Submission {
            transaction,
            chained,
            base,
            operations,
            status,
        } = submission;

        if self.corrupted {
            status.set(State::Failed);
            self.metrics.failed.inc();
            return Err(Error::StoreCorruption(self.id));
        }

        // Independent transactions must be based on the current snapshot. Chained
        // transactions are serialized by their chain and are re-pointed instead.
        let found = self.snapshot.version();
        if !chained && base.version() != found {
            status.set(State::Failed);
            self.metrics.conflicts.inc();
            debug!(
                shard = %self.id,
                transaction,
                expected = base.version(),
                found,
                "optimistic lock failure"
            );
            return Err(Error::OptimisticLockFailure {
                expected: base.version(),
                found,
            });
        }

        let (next, changes) = match self.snapshot.apply(&operations) {
            Ok(result) => result,
            Err(err) => {
                status.set(State::Failed);
                self.metrics.failed.inc();
                debug!(shard = %self.id, transaction, ?err, "apply failed");
                return Err(err);
            }
        };

        // The sequencer is the only writer, so the pointer must still hold our snapshot
        let next = Arc::new(next);
        let previous = self.current.compare_and_swap(&self.snapshot, next.clone());
        if !Arc::ptr_eq(&*previous, &self.snapshot) {
            self.corrupted = true;
            status.set(State::Failed);
            self.metrics.failed.inc();
            error!(
                shard = %self.id,
                transaction,
                "current snapshot replaced outside of sequencer"
            );
            return Err(Error::StoreCorruption(self.id));
        }
        self.snapshot = next;
        let version = self.snapshot.version();
        status.set(State::Committed);
        self.metrics.committed.inc();
        self.metrics.changes.inc_by(changes.len() as u64);
        self.metrics.version.set(version as i64);
        debug!(shard = %self.id, transaction, version, changes = changes.len(), "committed");

        // Enqueue notifications before the submitter observes the commit
        self.notifier.publish(self.id, version, &changes);
        Ok(Committed {
            transaction,
            shard: Some(self.id),
            version: Some(version),
            changes,
        })
    }
}
