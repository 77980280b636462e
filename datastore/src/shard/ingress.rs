use crate::{
    transaction::{Committed, StateCell},
    tree::{Operation, Snapshot},
    Error,
};
use futures::{
    channel::{mpsc, oneshot},
    SinkExt,
};
use std::sync::Arc;

/// A transaction handed to the sequencer.
pub(crate) struct Submission {
    /// Identifier of the transaction.
    pub transaction: u64,

    /// Whether the transaction belongs to a chain (and may be re-pointed onto the current
    /// snapshot instead of failing the optimistic lock check).
    pub chained: bool,

    /// The snapshot the operations were buffered against.
    pub base: Arc<Snapshot>,

    /// Operations to apply, in order.
    pub operations: Vec<Operation>,

    /// State shared with the submitting transaction.
    pub status: Arc<StateCell>,
}

/// Message types that can be sent to the `Mailbox`
pub(crate) enum Message {
    /// Validate and commit a transaction.
    ///
    /// The responder is sent the outcome once the new snapshot is visible to readers.
    Submit {
        submission: Submission,
        responder: oneshot::Sender<Result<Committed, Error>>,
    },
}

/// Ingress mailbox for [`Sequencer`](super::Sequencer).
#[derive(Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Message>,
}

impl Mailbox {
    pub(super) fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    /// Queue a transaction for commit.
    pub(crate) async fn submit(
        &mut self,
        submission: Submission,
    ) -> Result<oneshot::Receiver<Result<Committed, Error>>, Error> {
        let (responder, receiver) = oneshot::channel();
        self.sender
            .send(Message::Submit {
                submission,
                responder,
            })
            .await
            .map_err(|_| Error::Closed)?;
        Ok(receiver)
    }
}
