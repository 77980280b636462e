use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;

/// Error returned when parsing an unknown wire name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseError {
    kind: &'static str,
    value: String,
}

macro_rules! define_wire_enum {
    ($(#[$meta:meta])* $name:ident, $kind:expr, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The name used on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(ParseError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

define_wire_enum!(
    /// How a test submits its transactions.
    TransactionType, "transaction type", {
        Chaining => "TX-CHAINING",
        Simple => "SIMPLE-TX",
    }
);

define_wire_enum!(
    /// Operation performed on every element of the test list.
    Operation, "operation", {
        Put => "PUT",
        Merge => "MERGE",
        Delete => "DELETE",
        Read => "READ",
    }
);

define_wire_enum!(
    /// Store(s) a test targets.
    DataStore, "data store", {
        Config => "CONFIG",
        Operational => "OPERATIONAL",
        Both => "BOTH",
    }
);

define_wire_enum!(
    /// Access pattern of a shard test.
    ShardTestType, "shard test type", {
        RoundRobin => "ROUND-ROBIN",
        MultiThreaded => "MULTI-THREADED",
    }
);

define_wire_enum!(
    /// Outcome of a test.
    Status, "status", {
        Ok => "OK",
        Failed => "FAILED",
        TestInProgress => "TEST-IN-PROGRESS",
    }
);

define_wire_enum!(
    /// Whether a test is currently running.
    ExecState, "execution state", {
        Idle => "IDLE",
        Executing => "EXECUTING",
    }
);

/// Parameters of a `start-test` run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartTestInput {
    pub transaction_type: TransactionType,
    pub operation: Operation,
    pub data_store: DataStore,
    /// Number of elements in the outer list.
    pub outer_elements: usize,
    /// Number of items in each element's inner list.
    pub inner_elements: usize,
    /// Number of operations submitted per transaction.
    pub puts_per_tx: usize,
    /// Number of listeners registered on the test subtree.
    pub listeners: usize,
    /// Number of concurrent producers. Producer `t` owns elements
    /// `t * outer_elements..(t + 1) * outer_elements`. Zero is treated as one.
    pub threads: usize,
}

/// Result of a `start-test` run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartTestOutput {
    pub status: Status,
    /// Time spent building the test list, summed over producers.
    pub list_build_time: Duration,
    /// Time spent executing the operations.
    pub exec_time: Duration,
    pub tx_ok: u64,
    pub tx_error: u64,
    /// Notifications received by all listeners.
    pub ntf_ok: u64,
    /// Notifications dropped because a listener fell behind.
    pub ntf_dropped: u64,
}

impl StartTestOutput {
    pub(super) fn with_status(status: Status) -> Self {
        Self {
            status,
            list_build_time: Duration::ZERO,
            exec_time: Duration::ZERO,
            tx_ok: 0,
            tx_error: 0,
            ntf_ok: 0,
            ntf_dropped: 0,
        }
    }
}

/// Parameters of a `shard-test` run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardTestInput {
    pub test_type: ShardTestType,
    /// Must be [DataStore::Config] or [DataStore::Operational].
    pub data_store: DataStore,
    pub shards: usize,
    /// Number of items written to every shard.
    pub data_items: usize,
    pub puts_per_tx: usize,
    /// Number of listeners, each registered on every shard root.
    pub listeners: usize,
    /// Build all items before the timed phase starts.
    pub precreate_data: bool,
    /// Read every item back once the timed phase completes.
    pub validate_data: bool,
}

/// Result of a `shard-test` run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardTestOutput {
    pub status: Status,
    pub total_exec_time: Duration,
    pub listener_events_ok: u64,
    pub tx_ok: u64,
    pub tx_error: u64,
}

impl ShardTestOutput {
    pub(super) fn with_status(status: Status) -> Self {
        Self {
            status,
            total_exec_time: Duration::ZERO,
            listener_events_ok: 0,
            tx_ok: 0,
            tx_error: 0,
        }
    }
}

/// Result of a `test-status` request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TestStatus {
    pub state: ExecState,
    pub tests_completed: u64,
}
