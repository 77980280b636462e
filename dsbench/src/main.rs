//! Drive load against `commonware-datastore` from the command line.
//!
//! # Usage
//!
//! ```sh
//! cargo run --release --bin dsbench -- start-test --transaction-type TX-CHAINING --operation PUT --data-store BOTH --outer-elements 1000 --inner-elements 10 --puts-per-tx 100 --listeners 2
//! cargo run --release --bin dsbench -- shard-test --test-type MULTI-THREADED --data-store CONFIG --shards 4 --data-items 10000 --puts-per-tx 100 --listeners 1 --validate-data
//! cargo run --release --bin dsbench -- start-test --transaction-type SIMPLE-TX --operation READ --data-store CONFIG --outer-elements 250 --threads 4
//! ```
//!
//! Every test subcommand accepts `--runs` to repeat the same test against the same stores. The
//! stores live only as long as the process, so the execution state and number of completed tests
//! are logged once all runs finish.

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use commonware_datastore::benchmark::{
    Config, DataStore, Operation, Service, ShardTestInput, ShardTestType, StartTestInput, Status,
    TransactionType,
};
use commonware_runtime::{tokio, Runner};
use std::{process::ExitCode, str::FromStr};
use tracing::{error, info};

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

const START_TEST_CMD: &str = "start-test";
const SHARD_TEST_CMD: &str = "shard-test";

/// Flag for verbose output
const VERBOSE_FLAG: &str = "verbose";

fn count(name: &'static str, default: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .default_value(default)
        .help(help)
        .value_parser(value_parser!(usize))
}

fn runs() -> Arg {
    Arg::new("runs")
        .long("runs")
        .default_value("1")
        .help("Number of times to repeat the test (must be >= 1)")
        .value_parser(clap::builder::RangedU64ValueParser::<usize>::new().range(1..))
}

/// Parse a wire name (e.g. `TX-CHAINING`) into its enum.
fn wire<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    let value = matches
        .get_one::<String>(name)
        .ok_or_else(|| format!("missing --{name}"))?;
    value.parse().map_err(|e: T::Err| e.to_string())
}

fn start_test_input(matches: &ArgMatches) -> Result<StartTestInput, String> {
    Ok(StartTestInput {
        transaction_type: wire(matches, "transaction-type")?,
        operation: wire(matches, "operation")?,
        data_store: wire(matches, "data-store")?,
        outer_elements: *matches.get_one::<usize>("outer-elements").unwrap(),
        inner_elements: *matches.get_one::<usize>("inner-elements").unwrap(),
        puts_per_tx: *matches.get_one::<usize>("puts-per-tx").unwrap(),
        listeners: *matches.get_one::<usize>("listeners").unwrap(),
        threads: *matches.get_one::<usize>("threads").unwrap(),
    })
}

fn shard_test_input(matches: &ArgMatches) -> Result<ShardTestInput, String> {
    Ok(ShardTestInput {
        test_type: wire(matches, "test-type")?,
        data_store: wire(matches, "data-store")?,
        shards: *matches.get_one::<usize>("shards").unwrap(),
        data_items: *matches.get_one::<usize>("data-items").unwrap(),
        puts_per_tx: *matches.get_one::<usize>("puts-per-tx").unwrap(),
        listeners: *matches.get_one::<usize>("listeners").unwrap(),
        precreate_data: matches.get_flag("precreate-data"),
        validate_data: matches.get_flag("validate-data"),
    })
}

fn cli() -> Command {
    Command::new("dsbench")
        .version(crate_version())
        .about("Drive load against a sharded transactional datastore.")
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .action(ArgAction::SetTrue),
        )
        .arg(count(
            "mailbox-size",
            "1024",
            "Maximum transactions queued on each shard",
        ))
        .arg(count(
            "listener-queue-size",
            "1024",
            "Maximum notifications queued per listener before new ones are dropped",
        ))
        .subcommand_required(true)
        .subcommand(
            Command::new(START_TEST_CMD)
                .about("Write, merge, delete or read a two-level list in the config and/or operational store.")
                .arg(
                    Arg::new("transaction-type")
                        .long("transaction-type")
                        .default_value(TransactionType::Chaining.as_str())
                        .help("TX-CHAINING or SIMPLE-TX"),
                )
                .arg(
                    Arg::new("operation")
                        .long("operation")
                        .default_value(Operation::Put.as_str())
                        .help("PUT, MERGE, DELETE or READ"),
                )
                .arg(
                    Arg::new("data-store")
                        .long("data-store")
                        .default_value(DataStore::Config.as_str())
                        .help("CONFIG, OPERATIONAL or BOTH"),
                )
                .arg(count("outer-elements", "1000", "Elements in the outer list"))
                .arg(count("inner-elements", "10", "Items in each element's inner list"))
                .arg(count("puts-per-tx", "100", "Operations per transaction"))
                .arg(count("listeners", "1", "Listeners registered on the test subtree"))
                .arg(count("threads", "1", "Concurrent producers, each with its own slice"))
                .arg(runs()),
        )
        .subcommand(
            Command::new(SHARD_TEST_CMD)
                .about("Write items into a freshly created store with the requested number of shards.")
                .arg(
                    Arg::new("test-type")
                        .long("test-type")
                        .default_value(ShardTestType::RoundRobin.as_str())
                        .help("ROUND-ROBIN or MULTI-THREADED"),
                )
                .arg(
                    Arg::new("data-store")
                        .long("data-store")
                        .default_value(DataStore::Config.as_str())
                        .help("CONFIG or OPERATIONAL"),
                )
                .arg(count("shards", "4", "Number of shards"))
                .arg(count("data-items", "1000", "Items written to every shard"))
                .arg(count("puts-per-tx", "100", "Operations per transaction"))
                .arg(count("listeners", "1", "Listeners registered on every shard root"))
                .arg(
                    Arg::new("precreate-data")
                        .long("precreate-data")
                        .help("Build all items before the timed phase")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("validate-data")
                        .long("validate-data")
                        .help("Read every item back after the timed phase")
                        .action(ArgAction::SetTrue),
                )
                .arg(runs()),
        )
}

/// Entrypoint for the datastore benchmark CLI
fn main() -> ExitCode {
    let matches = cli().get_matches();

    // Create logger
    let level = if matches.get_flag(VERBOSE_FLAG) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let cfg = Config {
        mailbox_size: *matches.get_one::<usize>("mailbox-size").unwrap(),
        listener_queue_size: *matches.get_one::<usize>("listener-queue-size").unwrap(),
    };

    // Parse test inputs before starting the runtime
    let command = match matches.subcommand() {
        Some((START_TEST_CMD, matches)) => start_test_input(matches).map(|input| {
            let runs = *matches.get_one::<usize>("runs").unwrap();
            Request::StartTest(input, runs)
        }),
        Some((SHARD_TEST_CMD, matches)) => shard_test_input(matches).map(|input| {
            let runs = *matches.get_one::<usize>("runs").unwrap();
            Request::ShardTest(input, runs)
        }),
        _ => Err("unknown subcommand".to_string()),
    };
    let request = match command {
        Ok(request) => request,
        Err(err) => {
            error!(%err, "invalid arguments");
            return ExitCode::FAILURE;
        }
    };

    let executor = tokio::Runner::default();
    executor.start(|context| async move {
        let service = match Service::new(context, cfg) {
            Ok(service) => service,
            Err(err) => {
                error!(?err, "failed to create stores");
                return ExitCode::FAILURE;
            }
        };
        let mut failed = false;
        match request {
            Request::StartTest(input, runs) => {
                for run in 0..runs {
                    let output = service.start_test(input.clone()).await;
                    info!(
                        run,
                        status = %output.status,
                        list_build_time = ?output.list_build_time,
                        exec_time = ?output.exec_time,
                        tx_ok = output.tx_ok,
                        tx_error = output.tx_error,
                        ntf_ok = output.ntf_ok,
                        ntf_dropped = output.ntf_dropped,
                        "start-test"
                    );
                    failed |= output.status != Status::Ok;
                }
            }
            Request::ShardTest(input, runs) => {
                for run in 0..runs {
                    let output = service.shard_test(input.clone()).await;
                    info!(
                        run,
                        status = %output.status,
                        total_exec_time = ?output.total_exec_time,
                        listener_events_ok = output.listener_events_ok,
                        tx_ok = output.tx_ok,
                        tx_error = output.tx_error,
                        "shard-test"
                    );
                    failed |= output.status != Status::Ok;
                }
            }
        }
        let status = service.test_status();
        info!(
            state = %status.state,
            tests_completed = status.tests_completed,
            "status"
        );
        if failed {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    })
}

/// A parsed subcommand.
enum Request {
    StartTest(StartTestInput, usize),
    ShardTest(ShardTestInput, usize),
}
