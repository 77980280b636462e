//! Buffer operations against a snapshot and commit them atomically.
//!
//! # Overview
//!
//! A [Transaction] is created `Open`. Operations are appended to it with [Transaction::put],
//! [Transaction::merge] and [Transaction::delete]. The first path touched binds the transaction to
//! the shard that path routes to and captures that shard's base snapshot. Every later path must
//! route to the same shard.
//!
//! [Transaction::submit] moves the transaction to `Submitted` and queues it on the shard's
//! sequencer, returning a [Commit] that resolves once the sequencer has either published the new
//! snapshot (`Committed`) or rejected the transaction (`Failed`).
//!
//! # Modes
//!
//! Independent transactions (from [crate::Datastore::begin]) are based on the latest committed
//! snapshot and fail with [Error::OptimisticLockFailure] if any other transaction commits on the
//! same shard between their base and their turn in the sequencer. The engine never retries them.
//!
//! Chained transactions (from [Chain::begin]) are based on the speculative result of the previous
//! transaction of the chain while that transaction is still in flight, which lets a producer keep
//! building while earlier submissions are pending. The sequencer re-points them onto the current
//! snapshot instead of failing them, so a chain always commits in submission order.

use crate::{
    shard::{Router, Shard, ShardId, Submission},
    tree::{Change, Node, Operation, Path, Snapshot},
    Error,
};
use futures::channel::oneshot;
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    task::{Context, Poll},
};
use tracing::trace;

mod chain;
pub use chain::Chain;

/// Lifecycle of a [Transaction].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    Open,
    Submitted,
    Committed,
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Open => "open",
            State::Submitted => "submitted",
            State::Committed => "committed",
            State::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// [State] shared between a transaction and the sequencer that resolves it.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: State) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> State {
        match self.0.load(Ordering::Acquire) {
            0 => State::Open,
            1 => State::Submitted,
            2 => State::Committed,
            _ => State::Failed,
        }
    }

    pub(crate) fn set(&self, state: State) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// The shard a transaction writes to and the snapshot its reads are based on.
struct Binding {
    shard: Shard,
    base: Arc<Snapshot>,
}

/// A buffered set of operations that commits atomically on a single shard.
///
/// A transaction is not safe for concurrent mutation. Share it behind a lock if more than one
/// producer appends to it.
pub struct Transaction {
    id: u64,
    router: Arc<Router>,
    chain: Option<Chain>,
    binding: Option<Binding>,
    operations: Vec<Operation>,
    state: Arc<StateCell>,
}

impl Transaction {
    pub(crate) fn new(id: u64, router: Arc<Router>, chain: Option<Chain>) -> Self {
        Self {
            id,
            router,
            chain,
            binding: None,
            operations: Vec::new(),
            state: Arc::new(StateCell::new(State::Open)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> State {
        self.state.get()
    }

    pub fn is_chained(&self) -> bool {
        self.chain.is_some()
    }

    /// The shard this transaction is bound to, if any operation has been added.
    pub fn shard(&self) -> Option<ShardId> {
        self.binding.as_ref().map(|binding| binding.shard.id())
    }

    /// Number of buffered operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Replace the subtree at `path` with `node`.
    pub fn put(&mut self, path: Path, node: impl Into<Node>) -> Result<(), Error> {
        self.push(Operation::put(path, node))
    }

    /// Union `node` into the subtree at `path`.
    pub fn merge(&mut self, path: Path, node: impl Into<Node>) -> Result<(), Error> {
        self.push(Operation::merge(path, node))
    }

    /// Remove the subtree at `path`.
    pub fn delete(&mut self, path: Path) -> Result<(), Error> {
        self.push(Operation::delete(path))
    }

    /// Read `path` as this transaction currently sees it: the base snapshot with all buffered
    /// operations applied.
    pub fn read(&mut self, path: &Path) -> Result<Option<Arc<Node>>, Error> {
        let base = self.bind(path)?;
        if self.operations.is_empty() {
            return Ok(base.read(path));
        }
        let (view, _) = base.apply(&self.operations)?;
        Ok(view.read(path))
    }

    fn push(&mut self, operation: Operation) -> Result<(), Error> {
        self.check_open()?;
        self.bind(operation.path())?;
        self.operations.push(operation);
        Ok(())
    }

    fn check_open(&self) -> Result<(), Error> {
        match self.state.get() {
            State::Open => Ok(()),
            state => Err(Error::InvalidState(self.id, state)),
        }
    }

    /// Bind to the shard owning `path` (on first use) and verify later paths route there too.
    ///
    /// Returns the base snapshot of the transaction.
    fn bind(&mut self, path: &Path) -> Result<Arc<Snapshot>, Error> {
        let router = self.router.clone();
        let shard = router.route(path)?;
        if let Some(binding) = &self.binding {
            if binding.shard.id() != shard.id() {
                return Err(Error::CrossShard {
                    bound: binding.shard.id(),
                    found: shard.id(),
                });
            }
            return Ok(binding.base.clone());
        }
        let base = match &self.chain {
            Some(chain) => chain.base(shard),
            None => shard.current(),
        };
        trace!(
            transaction = self.id,
            shard = %shard.id(),
            version = base.version(),
            "bound"
        );
        self.binding = Some(Binding {
            shard: shard.clone(),
            base: base.clone(),
        });
        Ok(base)
    }

    /// Queue the transaction on its shard's sequencer.
    ///
    /// Returns once the transaction is enqueued. The returned [Commit] resolves when the
    /// sequencer has committed or rejected it. A transaction without operations (even one that
    /// has read through a shard) commits immediately without involving any shard.
    pub async fn submit(&mut self) -> Result<Commit, Error> {
        self.check_open()?;
        self.state.set(State::Submitted);
        let binding = match &self.binding {
            Some(binding) if !self.operations.is_empty() => binding,
            _ => {
                self.state.set(State::Committed);
                return Ok(Commit::ready(Ok(Committed {
                    transaction: self.id,
                    shard: None,
                    version: None,
                    changes: Vec::new(),
                })));
            }
        };

        let operations = std::mem::take(&mut self.operations);
        if let Some(chain) = &self.chain {
            // The next transaction of the chain builds on our speculative result
            if let Ok((speculative, _)) = binding.base.apply(&operations) {
                chain.record(binding.shard.id(), Arc::new(speculative), self.state.clone());
            }
        }
        let submission = Submission {
            transaction: self.id,
            chained: self.chain.is_some(),
            base: binding.base.clone(),
            operations,
            status: self.state.clone(),
        };
        let mut mailbox = binding.shard.mailbox.clone();
        match mailbox.submit(submission).await {
            Ok(receiver) => Ok(Commit { receiver }),
            Err(err) => {
                self.state.set(State::Failed);
                Err(err)
            }
        }
    }
}

/// Outcome of a successful commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committed {
    pub transaction: u64,
    /// Shard the transaction committed on (`None` for an empty transaction).
    pub shard: Option<ShardId>,
    /// Version of the snapshot the transaction produced (`None` for an empty transaction).
    pub version: Option<u64>,
    pub changes: Vec<Change>,
}

/// Resolves to the outcome of a submitted [Transaction].
///
/// Await it to block until the sequencer has processed the transaction or poll it without
/// blocking via [Commit::check].
pub struct Commit {
    receiver: oneshot::Receiver<Result<Committed, Error>>,
}

impl Commit {
    fn ready(result: Result<Committed, Error>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(result);
        Self { receiver }
    }

    /// Return the outcome if the transaction has been processed, or `None` if it is still
    /// pending.
    ///
    /// Once an outcome has been returned, later calls fail with [Error::Closed].
    pub fn check(&mut self) -> Result<Option<Committed>, Error> {
        match self.receiver.try_recv() {
            Ok(Some(result)) => result.map(Some),
            Ok(None) => Ok(None),
            Err(_) => Err(Error::Closed),
        }
    }
}

impl Future for Commit {
    type Output = Result<Committed, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| Error::Closed).and_then(|result| result))
    }
}
