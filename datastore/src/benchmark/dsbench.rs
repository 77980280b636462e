use super::{
    reset, Batcher, Counter, Operation, Service, StartTestInput, StartTestOutput, Status, Tally,
    TransactionType, TEST_ROOT,
};
use crate::{
    tree::{Node, Path},
    Datastore, Error,
};
use commonware_runtime::{Clock, Metrics, Spawner};
use futures::future::join_all;
use std::{ops::Range, sync::Arc, time::Duration};
use tracing::{info, warn};

/// Path of element `j` of the outer list.
pub(super) fn outer_path(j: usize) -> Path {
    Path::root()
        .child(TEST_ROOT)
        .child(format!("outer-list[{j}]"))
}

/// Element `j` of the outer list: an id and `inner` items named `0..inner`.
pub(super) fn outer_element(j: usize, inner: usize) -> Node {
    let mut list = Node::container();
    for i in 0..inner {
        list = list.with(
            format!("inner-list[{i}]"),
            Node::container()
                .with("name", i as i64)
                .with("value", format!("Item-{j}-{i}")),
        );
    }
    Node::container()
        .with("id", j as i64)
        .with("inner-list", list)
}

/// Returns true if `node` is a complete element with `inner` items.
fn is_complete(node: &Node, inner: usize) -> bool {
    node.child("inner-list")
        .is_some_and(|list| list.is_container() && list.len() == inner)
}

/// Elements owned by producer `thread`.
fn slice(input: &StartTestInput, thread: usize) -> Range<usize> {
    thread * input.outer_elements..(thread + 1) * input.outer_elements
}

/// Work done by a single producer.
struct Production {
    list_build_time: Duration,
    tally: Tally,
}

impl<E: Spawner + Metrics + Clock> Service<E> {
    /// Run a `start-test`.
    pub async fn start_test(&self, input: StartTestInput) -> StartTestOutput {
        let Some(run) = self.guard.try_acquire() else {
            self.metrics.busy.inc();
            return StartTestOutput::with_status(Status::TestInProgress);
        };
        self.metrics.runs.inc();
        info!(
            transaction_type = %input.transaction_type,
            operation = %input.operation,
            data_store = %input.data_store,
            outer = input.outer_elements,
            inner = input.inner_elements,
            puts_per_tx = input.puts_per_tx,
            listeners = input.listeners,
            threads = input.threads,
            "starting test"
        );

        let stores = self.stores(input.data_store);
        let output = match self.execute(&stores, &input).await {
            Ok(output) => output,
            Err(err) => {
                warn!(?err, "test failed");
                self.metrics.failed.inc();
                StartTestOutput::with_status(Status::Failed)
            }
        };
        info!(
            status = %output.status,
            list_build_time = ?output.list_build_time,
            exec_time = ?output.exec_time,
            tx_ok = output.tx_ok,
            tx_error = output.tx_error,
            ntf_ok = output.ntf_ok,
            ntf_dropped = output.ntf_dropped,
            "test complete"
        );
        run.complete();
        output
    }

    async fn execute(
        &self,
        stores: &[Datastore<E>],
        input: &StartTestInput,
    ) -> Result<StartTestOutput, Error> {
        for store in stores {
            reset(store).await?;
        }
        let threads = input.threads.max(1);

        // Deletes and reads need something to work on
        if matches!(input.operation, Operation::Delete | Operation::Read) {
            populate(stores, input, threads * input.outer_elements).await;
        }

        // Listeners only observe the timed phase
        let listeners: Vec<Arc<Counter>> = (0..input.listeners)
            .map(|_| Arc::new(Counter::default()))
            .collect();
        let mut registrations = Vec::new();
        for store in stores {
            for listener in &listeners {
                let registration = store.register(Path::root().child(TEST_ROOT), listener);
                registrations.push((store, registration));
            }
        }

        // Every producer builds and submits its own slice of the list
        let start = self.context.current();
        let mut handles = Vec::with_capacity(threads);
        for thread in 0..threads {
            let stores = stores.to_vec();
            let input = input.clone();
            let handle = self
                .context
                .with_label("producer")
                .spawn(move |context| async move {
                    produce(context, &stores, &input, thread).await
                });
            handles.push(handle);
        }
        let mut list_build_time = Duration::ZERO;
        let mut tally = Tally::default();
        for result in join_all(handles).await {
            match result {
                Ok(production) => {
                    list_build_time += production.list_build_time;
                    tally.add(production.tally);
                }
                Err(err) => {
                    warn!(?err, "producer failed");
                    return Err(Error::Closed);
                }
            }
        }
        let exec_time = self.elapsed(start);

        for store in stores {
            store.flush().await;
        }
        for (store, registration) in &registrations {
            store.unregister(registration);
        }

        Ok(StartTestOutput {
            status: Status::Ok,
            list_build_time,
            exec_time,
            tx_ok: tally.ok,
            tx_error: tally.error,
            ntf_ok: listeners.iter().map(|l| l.notifications()).sum(),
            ntf_dropped: listeners.iter().map(|l| l.dropped()).sum(),
        })
    }
}

/// Write the first `total` elements, element `j` to the store the timed phase uses for it.
async fn populate<E: Spawner + Metrics>(
    stores: &[Datastore<E>],
    input: &StartTestInput,
    total: usize,
) {
    let mut batchers: Vec<Batcher<E>> = stores
        .iter()
        .map(|store| Batcher::new(store.clone(), true, input.puts_per_tx))
        .collect();
    for j in 0..total {
        batchers[j % stores.len()]
            .write(
                Operation::Put,
                outer_path(j),
                outer_element(j, input.inner_elements),
            )
            .await;
    }
    for batcher in batchers {
        let tally = batcher.finish().await;
        if tally.error > 0 {
            warn!(errors = tally.error, "failed to populate store");
        }
    }
}

/// Build the slice owned by `thread` and apply the test operation to it.
async fn produce<E: Spawner + Metrics + Clock>(
    context: E,
    stores: &[Datastore<E>],
    input: &StartTestInput,
    thread: usize,
) -> Production {
    let start = context.current();
    let elements: Vec<(usize, Path, Node)> = slice(input, thread)
        .map(|j| (j, outer_path(j), outer_element(j, input.inner_elements)))
        .collect();
    let list_build_time = context
        .current()
        .duration_since(start)
        .unwrap_or_default();

    let tally = match input.operation {
        Operation::Read => read_elements(stores, input, &elements),
        operation => write_elements(stores, input, operation, elements).await,
    };
    Production {
        list_build_time,
        tally,
    }
}

/// Apply `operation` to every element, sending element `j` to store `j % stores.len()`.
async fn write_elements<E: Spawner + Metrics>(
    stores: &[Datastore<E>],
    input: &StartTestInput,
    operation: Operation,
    elements: Vec<(usize, Path, Node)>,
) -> Tally {
    let chained = input.transaction_type == TransactionType::Chaining;
    let mut batchers: Vec<Batcher<E>> = stores
        .iter()
        .map(|store| Batcher::new(store.clone(), chained, input.puts_per_tx))
        .collect();
    for (j, path, node) in elements {
        batchers[j % stores.len()].write(operation, path, node).await;
    }
    let mut tally = Tally::default();
    for batcher in batchers {
        tally.add(batcher.finish().await);
    }
    tally
}

/// Read every element back from its store, counting complete elements as successes.
fn read_elements<E: Spawner + Metrics>(
    stores: &[Datastore<E>],
    input: &StartTestInput,
    elements: &[(usize, Path, Node)],
) -> Tally {
    let chains: Vec<_> = stores.iter().map(Datastore::chain).collect();
    let mut tally = Tally::default();
    for (j, path, _) in elements {
        let index = j % stores.len();
        let mut tx = match input.transaction_type {
            TransactionType::Chaining => chains[index].begin(),
            TransactionType::Simple => stores[index].begin(),
        };
        match tx.read(path) {
            Ok(Some(node)) if is_complete(&node, input.inner_elements) => tally.ok += 1,
            _ => tally.error += 1,
        }
    }
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::{tests::service, DataStore, ExecState};
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};
    use test_case::test_case;

    fn input(
        transaction_type: TransactionType,
        operation: Operation,
        data_store: DataStore,
    ) -> StartTestInput {
        StartTestInput {
            transaction_type,
            operation,
            data_store,
            outer_elements: 20,
            inner_elements: 3,
            puts_per_tx: 5,
            listeners: 2,
            threads: 1,
        }
    }

    /// Count the elements `0..total` present in their owning store, asserting they are
    /// absent from every other store.
    fn present<E: Spawner + Metrics>(
        stores: &[Datastore<E>],
        total: usize,
        inner: usize,
    ) -> usize {
        let mut found = 0;
        for j in 0..total {
            for (index, store) in stores.iter().enumerate() {
                let node = store.read(&outer_path(j)).unwrap();
                if index != j % stores.len() {
                    assert!(node.is_none(), "element {j} in store {index}");
                    continue;
                }
                if let Some(node) = node {
                    assert!(is_complete(&node, inner));
                    found += 1;
                }
            }
        }
        found
    }

    #[test_case(TransactionType::Simple, DataStore::Config)]
    #[test_case(TransactionType::Simple, DataStore::Both)]
    #[test_case(TransactionType::Chaining, DataStore::Operational)]
    #[test_case(TransactionType::Chaining, DataStore::Both)]
    fn test_put(transaction_type: TransactionType, data_store: DataStore) {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let output = service
                .start_test(input(transaction_type, Operation::Put, data_store))
                .await;
            assert_eq!(output.status, Status::Ok);

            // 20 elements in transactions of 5, split across the targeted stores
            assert_eq!(output.tx_ok, 4);
            assert_eq!(output.tx_error, 0);

            // Both listeners see every commit on every targeted store
            assert_eq!(output.ntf_ok, 8);
            assert_eq!(output.ntf_dropped, 0);

            let stores = service.stores(data_store);
            assert_eq!(present(&stores, 20, 3), 20);
            for store in &stores {
                assert_eq!(store.listeners(), 0);
            }
            assert_eq!(service.test_status().tests_completed, 1);
        });
    }

    #[test_traced]
    fn test_merge_twice() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let cfg = input(TransactionType::Chaining, Operation::Merge, DataStore::Config);
            let first = service.start_test(cfg.clone()).await;
            let second = service.start_test(cfg).await;
            assert_eq!(first.status, Status::Ok);
            assert_eq!(second.status, Status::Ok);
            assert_eq!(second.tx_ok, 4);
            assert_eq!(service.test_status().tests_completed, 2);
        });
    }

    #[test_case(TransactionType::Simple, DataStore::Config)]
    #[test_case(TransactionType::Simple, DataStore::Both)]
    #[test_case(TransactionType::Chaining, DataStore::Both)]
    fn test_delete(transaction_type: TransactionType, data_store: DataStore) {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let output = service
                .start_test(input(transaction_type, Operation::Delete, data_store))
                .await;
            assert_eq!(output.status, Status::Ok);
            assert_eq!(output.tx_ok, 4);
            assert_eq!(output.tx_error, 0);

            // Nothing survives in any targeted store
            for store in service.stores(data_store) {
                for j in 0..20 {
                    assert!(store.read(&outer_path(j)).unwrap().is_none());
                }
            }
        });
    }

    #[test_case(TransactionType::Simple, DataStore::Config)]
    #[test_case(TransactionType::Simple, DataStore::Both)]
    #[test_case(TransactionType::Chaining, DataStore::Both)]
    fn test_read(transaction_type: TransactionType, data_store: DataStore) {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let output = service
                .start_test(input(transaction_type, Operation::Read, data_store))
                .await;
            assert_eq!(output.status, Status::Ok);

            // Every element was populated into the store it is read from
            assert_eq!(output.tx_ok, 20);
            assert_eq!(output.tx_error, 0);
            assert_eq!(output.ntf_ok, 0);
            assert_eq!(present(&service.stores(data_store), 20, 3), 20);
        });
    }

    #[test_case(DataStore::Config)]
    #[test_case(DataStore::Both)]
    fn test_concurrent_producers(data_store: DataStore) {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let output = service
                .start_test(StartTestInput {
                    outer_elements: 10,
                    threads: 2,
                    ..input(TransactionType::Chaining, Operation::Put, data_store)
                })
                .await;
            assert_eq!(output.status, Status::Ok);

            // Each producer writes 10 elements in transactions of 5
            assert_eq!(output.tx_ok, 4);
            assert_eq!(output.tx_error, 0);
            assert_eq!(output.ntf_ok, 8);

            // Producers own disjoint slices that together cover the list
            assert_eq!(present(&service.stores(data_store), 20, 3), 20);
            assert!(service.stores(data_store)[0]
                .read(&outer_path(20))
                .unwrap()
                .is_none());
        });
    }

    #[test_traced]
    fn test_concurrent_independent_producers() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let output = service
                .start_test(StartTestInput {
                    outer_elements: 10,
                    threads: 2,
                    ..input(TransactionType::Simple, Operation::Put, DataStore::Config)
                })
                .await;
            assert_eq!(output.status, Status::Ok);

            // Independent transactions on one shard may conflict but are all accounted for
            assert_eq!(output.tx_ok + output.tx_error, 4);
            assert!(output.tx_ok >= 1);
            assert_eq!(output.ntf_ok, 2 * output.tx_ok);
        });
    }

    #[test_traced]
    fn test_concurrent_read() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let output = service
                .start_test(StartTestInput {
                    outer_elements: 10,
                    threads: 3,
                    ..input(TransactionType::Simple, Operation::Read, DataStore::Both)
                })
                .await;
            assert_eq!(output.status, Status::Ok);
            assert_eq!(output.tx_ok, 30);
            assert_eq!(output.tx_error, 0);
        });
    }

    #[test_traced]
    fn test_single_put() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let output = service
                .start_test(StartTestInput {
                    transaction_type: TransactionType::Simple,
                    operation: Operation::Put,
                    data_store: DataStore::Config,
                    outer_elements: 1,
                    inner_elements: 1,
                    puts_per_tx: 1,
                    listeners: 1,
                    threads: 0,
                })
                .await;
            assert_eq!(output.status, Status::Ok);
            assert_eq!(output.tx_ok, 1);
            assert_eq!(output.tx_error, 0);
            assert_eq!(output.ntf_ok, 1);

            let store = &service.stores(DataStore::Config)[0];
            let item = Path::parse("/test-exec/outer-list[0]/inner-list/inner-list[0]/value")
                .unwrap();
            assert_eq!(
                store.read(&item).unwrap().as_deref(),
                Some(&Node::from("Item-0-0"))
            );
        });
    }

    #[test_traced]
    fn test_busy() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let service = service(context);
            let run = service.guard.try_acquire().unwrap();
            let output = service
                .start_test(input(
                    TransactionType::Simple,
                    Operation::Put,
                    DataStore::Config,
                ))
                .await;
            assert_eq!(output.status, Status::TestInProgress);
            assert_eq!(output.tx_ok, 0);
            drop(run);
            assert_eq!(service.test_status().state, ExecState::Idle);
            assert_eq!(service.test_status().tests_completed, 0);
        });
    }
}
