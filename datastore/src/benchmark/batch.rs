use super::Operation;
use crate::{
    transaction::{Chain, Commit, Committed, Transaction},
    tree::{Node, Path},
    Datastore, Error,
};
use commonware_runtime::{Metrics, Spawner};
use futures::future::join_all;
use std::mem;
use tracing::debug;

/// Count of committed and failed transactions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub ok: u64,
    pub error: u64,
}

impl Tally {
    pub fn record(&mut self, result: &Result<Committed, Error>) {
        match result {
            Ok(_) => self.ok += 1,
            Err(err) => {
                debug!(?err, "transaction failed");
                self.error += 1;
            }
        }
    }

    pub fn add(&mut self, other: Tally) {
        self.ok += other.ok;
        self.error += other.error;
    }
}

/// Groups writes to one store into transactions of a fixed size.
///
/// Without a chain, every transaction is independent and awaited before the next one is
/// started. With a chain, submissions are pipelined and awaited in [Batcher::finish].
pub struct Batcher<E: Spawner + Metrics> {
    store: Datastore<E>,
    chain: Option<Chain>,
    size: usize,
    current: Transaction,
    pending: Vec<Commit>,
    tally: Tally,
}

impl<E: Spawner + Metrics> Batcher<E> {
    pub fn new(store: Datastore<E>, chained: bool, size: usize) -> Self {
        let chain = chained.then(|| store.chain());
        let current = match &chain {
            Some(chain) => chain.begin(),
            None => store.begin(),
        };
        Self {
            store,
            chain,
            size: size.max(1),
            current,
            pending: Vec::new(),
            tally: Tally::default(),
        }
    }

    fn begin(&self) -> Transaction {
        match &self.chain {
            Some(chain) => chain.begin(),
            None => self.store.begin(),
        }
    }

    /// Buffer one write, submitting the transaction once it holds `size` operations.
    ///
    /// Reads are not batched.
    pub async fn write(&mut self, operation: Operation, path: Path, node: Node) {
        let result = match operation {
            Operation::Put => self.current.put(path, node),
            Operation::Merge => self.current.merge(path, node),
            Operation::Delete => self.current.delete(path),
            Operation::Read => return,
        };
        if let Err(err) = result {
            debug!(?err, "failed to buffer operation");
            self.tally.error += 1;
            return;
        }
        if self.current.len() >= self.size {
            self.submit().await;
        }
    }

    async fn submit(&mut self) {
        let next = self.begin();
        let mut tx = mem::replace(&mut self.current, next);
        match tx.submit().await {
            Ok(commit) if self.chain.is_some() => self.pending.push(commit),
            Ok(commit) => {
                let result = commit.await;
                self.tally.record(&result);
            }
            Err(err) => {
                debug!(?err, "failed to submit transaction");
                self.tally.error += 1;
            }
        }
    }

    /// Submit any remaining operations and wait for every outstanding commit.
    pub async fn finish(mut self) -> Tally {
        if !self.current.is_empty() {
            self.submit().await;
        }
        for result in join_all(mem::take(&mut self.pending)).await {
            self.tally.record(&result);
        }
        self.tally
    }
}
