use super::{
    Batcher, Counter, DataStore, Operation, Service, ShardTestInput, ShardTestOutput,
    ShardTestType, Status, Tally,
};
use crate::{
    tree::{Node, Path},
    Config as StoreConfig, Datastore, Error,
};
use commonware_runtime::{Clock, Metrics, Spawner};
use futures::future::join_all;
use std::{
    num::NonZeroUsize,
    sync::{atomic::Ordering, Arc},
};
use tracing::{info, warn};

/// Top-level segment owned by shard `s`.
fn shard_root(s: usize) -> String {
    format!("outer-list[{s}]")
}

/// Path of item `i` written to shard `s`.
fn item_path(s: usize, i: usize) -> Path {
    Path::root()
        .child(shard_root(s))
        .child("inner-list")
        .child(format!("inner-list[{i}]"))
}

fn item(s: usize, i: usize) -> Node {
    Node::container()
        .with("name", i as i64)
        .with("value", format!("Item-{s}-{i}"))
}

impl<E: Spawner + Metrics + Clock> Service<E> {
    /// Run a `shard-test` on a freshly created store.
    pub async fn shard_test(&self, input: ShardTestInput) -> ShardTestOutput {
        let Some(run) = self.guard.try_acquire() else {
            self.metrics.busy.inc();
            return ShardTestOutput::with_status(Status::TestInProgress);
        };
        self.metrics.runs.inc();
        info!(
            test_type = %input.test_type,
            data_store = %input.data_store,
            shards = input.shards,
            data_items = input.data_items,
            puts_per_tx = input.puts_per_tx,
            listeners = input.listeners,
            precreate_data = input.precreate_data,
            validate_data = input.validate_data,
            "starting shard test"
        );

        let output = match self.execute_shards(&input).await {
            Ok(output) => output,
            Err(err) => {
                warn!(?err, "shard test failed");
                ShardTestOutput::with_status(Status::Failed)
            }
        };
        if output.status == Status::Failed {
            self.metrics.failed.inc();
        }
        info!(
            status = %output.status,
            total_exec_time = ?output.total_exec_time,
            listener_events_ok = output.listener_events_ok,
            tx_ok = output.tx_ok,
            tx_error = output.tx_error,
            "shard test complete"
        );
        run.complete();
        output
    }

    async fn execute_shards(&self, input: &ShardTestInput) -> Result<ShardTestOutput, Error> {
        if input.data_store == DataStore::Both {
            return Err(Error::InvalidLayout(
                "shard test targets a single store".into(),
            ));
        }
        let shards = NonZeroUsize::new(input.shards)
            .ok_or_else(|| Error::InvalidLayout("shard test requires shards".into()))?;

        // Every run gets its own store (and metrics scope)
        let run = self.shard_runs.fetch_add(1, Ordering::Relaxed);
        let label = format!(
            "{}_shard_test_{run}",
            input.data_store.as_str().to_lowercase()
        );
        let store = Datastore::init(
            self.context.with_label(&label),
            StoreConfig {
                shards,
                namespace: (0..input.shards).map(shard_root).collect(),
                mailbox_size: self.cfg.mailbox_size,
                listener_queue_size: self.cfg.listener_queue_size,
            },
        )?;

        // Listeners observe the anchors as well as the items
        let listeners: Vec<Arc<Counter>> = (0..input.listeners)
            .map(|_| Arc::new(Counter::default()))
            .collect();
        for listener in &listeners {
            for s in 0..input.shards {
                store.register(Path::root().child(shard_root(s)), listener);
            }
        }

        // Anchor the list of every shard before writing items into it
        let mut commits = Vec::with_capacity(input.shards);
        for s in 0..input.shards {
            let mut tx = store.begin();
            tx.put(
                Path::root().child(shard_root(s)).child("inner-list"),
                Node::container(),
            )?;
            commits.push(tx.submit().await?);
        }
        for result in join_all(commits).await {
            result?;
        }

        let items = input.precreate_data.then(|| {
            (0..input.shards)
                .map(|s| (0..input.data_items).map(|i| item(s, i)).collect())
                .collect::<Vec<Vec<Node>>>()
        });
        let items = items.map(Arc::new);

        let start = self.context.current();
        let tally = match input.test_type {
            ShardTestType::RoundRobin => round_robin(&store, input, items.as_deref()).await,
            ShardTestType::MultiThreaded => {
                self.multi_threaded(&store, input, items).await?
            }
        };
        let total_exec_time = self.elapsed(start);

        store.flush().await;
        let listener_events_ok = listeners.iter().map(|l| l.notifications()).sum();

        let mut status = Status::Ok;
        if input.validate_data {
            let invalid = validate(&store, input);
            if invalid > 0 {
                warn!(invalid, "validation failed");
                status = Status::Failed;
            }
        }
        Ok(ShardTestOutput {
            status,
            total_exec_time,
            listener_events_ok,
            tx_ok: tally.ok,
            tx_error: tally.error,
        })
    }

    /// Write every shard's items from a dedicated task per shard.
    async fn multi_threaded(
        &self,
        store: &Datastore<E>,
        input: &ShardTestInput,
        items: Option<Arc<Vec<Vec<Node>>>>,
    ) -> Result<Tally, Error> {
        let mut handles = Vec::with_capacity(input.shards);
        for s in 0..input.shards {
            let mut batcher = Batcher::new(store.clone(), true, input.puts_per_tx);
            let items = items.clone();
            let data_items = input.data_items;
            let handle = self
                .context
                .with_label("producer")
                .spawn(move |_| async move {
                    for i in 0..data_items {
                        let node = match &items {
                            Some(items) => items[s][i].clone(),
                            None => item(s, i),
                        };
                        batcher.write(Operation::Put, item_path(s, i), node).await;
                    }
                    batcher.finish().await
                });
            handles.push(handle);
        }

        let mut tally = Tally::default();
        for result in join_all(handles).await {
            match result {
                Ok(producer) => tally.add(producer),
                Err(err) => {
                    warn!(?err, "producer failed");
                    return Err(Error::Closed);
                }
            }
        }
        Ok(tally)
    }
}

/// Write items to all shards from a single producer, one item per shard at a time.
async fn round_robin<E: Spawner + Metrics>(
    store: &Datastore<E>,
    input: &ShardTestInput,
    items: Option<&Vec<Vec<Node>>>,
) -> Tally {
    let mut batchers: Vec<Batcher<E>> = (0..input.shards)
        .map(|_| Batcher::new(store.clone(), true, input.puts_per_tx))
        .collect();
    for i in 0..input.data_items {
        for (s, batcher) in batchers.iter_mut().enumerate() {
            let node = match items {
                Some(items) => items[s][i].clone(),
                None => item(s, i),
            };
            batcher.write(Operation::Put, item_path(s, i), node).await;
        }
    }
    let mut tally = Tally::default();
    for batcher in batchers {
        tally.add(batcher.finish().await);
    }
    tally
}

/// Count the items that are missing or hold the wrong value.
fn validate<E: Spawner + Metrics>(store: &Datastore<E>, input: &ShardTestInput) -> usize {
    let mut invalid = 0;
    for s in 0..input.shards {
        for i in 0..input.data_items {
            let expected = item(s, i);
            match store.read(&item_path(s, i)) {
                Ok(Some(node)) if *node == expected => {}
                _ => invalid += 1,
            }
        }
    }
    invalid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::tests::service;
    use commonware_runtime::{deterministic, Runner};
    use test_case::test_case;

    fn input(test_type: ShardTestType, shards: usize, precreate_data: bool) -> ShardTestInput {
        ShardTestInput {
            test_type,
            data_store: DataStore::Config,
            shards,
            data_items: 25,
            puts_per_tx: 10,
            listeners: 2,
            precreate_data,
            validate_data: true,
        }
    }

    #[test_case(ShardTestType::RoundRobin, 1, false)]
    #[test_case(ShardTestType::RoundRobin, 4, true)]
    #[test_case(ShardTestType::MultiThreaded, 1, true)]
    #[test_case(ShardTestType::MultiThreaded, 4, false)]
    fn test_shard_test(test_type: ShardTestType, shards: usize, precreate_data: bool) {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let output = service
                .shard_test(input(test_type, shards, precreate_data))
                .await;
            assert_eq!(output.status, Status::Ok);

            // 25 items per shard in transactions of 10
            assert_eq!(output.tx_ok, 3 * shards as u64);
            assert_eq!(output.tx_error, 0);

            // Each listener is registered on every shard root and sees the anchor commit
            // plus every item commit
            assert_eq!(output.listener_events_ok, 2 * 4 * shards as u64);
            assert_eq!(service.test_status().tests_completed, 1);
        });
    }

    #[test_case(DataStore::Both, 2 ; "both stores")]
    #[test_case(DataStore::Config, 0 ; "no shards")]
    fn test_shard_test_rejected(data_store: DataStore, shards: usize) {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let output = service
                .shard_test(ShardTestInput {
                    data_store,
                    ..input(ShardTestType::RoundRobin, shards, false)
                })
                .await;
            assert_eq!(output.status, Status::Failed);
            assert_eq!(output.tx_ok, 0);
        });
    }

    #[test_case(ShardTestType::RoundRobin)]
    #[test_case(ShardTestType::MultiThreaded)]
    fn test_consecutive_runs(test_type: ShardTestType) {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            for _ in 0..3 {
                let output = service.shard_test(input(test_type, 2, false)).await;
                assert_eq!(output.status, Status::Ok);
                assert_eq!(output.tx_ok, 6);
                assert_eq!(output.listener_events_ok, 2 * 4 * 2);
            }
            assert_eq!(service.test_status().tests_completed, 3);
        });
    }
}
