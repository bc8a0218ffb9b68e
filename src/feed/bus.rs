//! Publish/subscribe channel for local edits.
//!
//! Actions such as liking or reposting publish a [`LocalChangeEvent`]; every
//! window holding a subscription picks it up the next time it syncs.

use crate::model::LocalChangeEvent;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use tracing::debug;

/// Fan-out of local change events to all live subscriptions.
#[derive(Debug, Default)]
pub struct LocalChangeBus {
    subscribers: Vec<Sender<LocalChangeEvent>>,
}

impl LocalChangeBus {
    /// Bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a subscription that receives every event published from now on.
    pub fn subscribe(&mut self) -> LocalChangeSubscription {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        LocalChangeSubscription { receiver }
    }

    /// Sends `event` to all subscriptions, forgetting dropped ones.
    pub fn publish(&mut self, event: LocalChangeEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        debug!(cid = %event.cid, kind = ?event.kind, subscribers = self.subscribers.len(), "Published local change");
    }

    /// Number of live subscriptions as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Receiving end of a [`LocalChangeBus`].
#[derive(Debug)]
pub struct LocalChangeSubscription {
    receiver: Receiver<LocalChangeEvent>,
}

impl LocalChangeSubscription {
    /// Takes all pending events without blocking.
    pub fn drain(&self) -> Vec<LocalChangeEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        events
    }
}
