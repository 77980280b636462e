use commonware_datastore::tree::{Node, Operation, Path, Snapshot};
use criterion::{black_box, criterion_group, Criterion};

/// Build the operations that write `outer` lists of `inner` items each.
fn list_operations(outer: usize, inner: usize) -> Vec<Operation> {
    (0..outer)
        .map(|j| {
            let mut list = Node::container();
            for i in 0..inner {
                list = list.with(
                    format!("inner-list[{i}]"),
                    Node::container()
                        .with("name", i as i64)
                        .with("value", format!("Item-{j}-{i}")),
                );
            }
            Operation::put(
                Path::root()
                    .child("test-exec")
                    .child(format!("outer-list[{j}]")),
                list,
            )
        })
        .collect()
}

fn bench_apply(c: &mut Criterion) {
    for (outer, inner) in [(100, 10), (1_000, 10), (10_000, 1)] {
        let operations = list_operations(outer, inner);
        c.bench_function(
            &format!("{}/outer={} inner={}", module_path!(), outer, inner),
            |b| {
                b.iter(|| {
                    let (snapshot, changes) = Snapshot::empty().apply(&operations).unwrap();
                    black_box((snapshot, changes));
                })
            },
        );
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_apply
}
