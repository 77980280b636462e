use super::ShardId;

/// Configuration for the [Sequencer](super::Sequencer).
pub struct Config {
    /// Identity of the shard the sequencer commits for.
    pub id: ShardId,

    /// The maximum size of the mailbox backlog.
    pub mailbox_size: usize,
}
