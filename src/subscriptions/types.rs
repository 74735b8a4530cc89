//! Subscription types for live dataset updates.

use crate::delivery::Job;
use crate::error::SyncError;
use crate::query::Fingerprint;
use crate::transport::ChannelMessage;
use crate::types::{Document, SubscriberId};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use tracing::warn;

/// Lifecycle of a wire-level subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    /// Subscribe request sent, not yet acknowledged.
    Registering,
    Subscribed,
    /// Last subscriber left; retraction requested and retried until acknowledged.
    Unsubscribing,
}

/// The full dataset plus what changed since the previous notification.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    pub documents: Vec<Document>,
    pub added: Vec<Document>,
    pub updated: Vec<Document>,
    pub removed: Vec<Document>,
}

impl ChangeSet {
    /// A replay of an existing dataset: everything counts as added.
    pub fn replay(documents: Vec<Document>) -> Self {
        Self {
            added: documents.clone(),
            documents,
            updated: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// For single-document subscriptions: the current document, or a
    /// tombstone when the dataset is empty.
    pub fn single(&self, collection: &str, id: &str) -> Document {
        self.documents
            .last()
            .cloned()
            .unwrap_or_else(|| Document::removed(collection, id))
    }
}

/// Events delivered to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionEvent {
    /// The collection dataset changed (or was delivered for the first time).
    Changed(ChangeSet),

    /// A message arrived on a subscribed channel.
    Message(ChannelMessage),

    /// The subscription failed. Terminal: no further events follow.
    Failed(SyncError),
}

/// Callback invoked on the delivery executor.
pub type SubscriptionCallback = Arc<dyn Fn(SubscriptionEvent) + Send + Sync + 'static>;

/// Where a subscriber's events go.
#[derive(Clone)]
pub(crate) enum EventSink {
    /// Bounded queue read through a [`SubscriptionHandle`]. The underlying
    /// channel holds one slot more than `capacity`, kept for the terminal
    /// overflow failure.
    Channel {
        sender: Sender<SubscriptionEvent>,
        capacity: usize,
    },
    /// Run on the delivery executor once coordination locks are released.
    Callback(SubscriptionCallback),
}

impl EventSink {
    /// A channel sink buffering up to `capacity` undelivered events.
    pub(crate) fn bounded(capacity: usize) -> (Self, Receiver<SubscriptionEvent>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = crossbeam_channel::bounded(capacity + 1);
        (EventSink::Channel { sender, capacity }, receiver)
    }
}

/// Deliveries produced while a manager was locked.
///
/// Channel sinks are written immediately since `try_send` never blocks.
/// Callback jobs and dead subscribers are handled by the registry after the
/// guards drop.
#[derive(Default)]
pub(crate) struct Outbox {
    pub(crate) jobs: Vec<Job>,
    pub(crate) dead: Vec<SubscriberId>,
}

impl Outbox {
    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.dead.is_empty()
    }

    pub(crate) fn append(&mut self, mut other: Outbox) {
        self.jobs.append(&mut other.jobs);
        self.dead.append(&mut other.dead);
    }
}

/// One logical subscriber attached to a manager.
#[derive(Clone)]
pub(crate) struct Subscriber {
    pub(crate) id: SubscriberId,
    pub(crate) sink: EventSink,
}

impl Subscriber {
    /// Hand an event over without blocking.
    ///
    /// A dropped receiver or a full buffer marks the subscriber dead. On
    /// overflow the reserved slot carries a terminal failure.
    pub(crate) fn deliver(&self, event: SubscriptionEvent, outbox: &mut Outbox) {
        match &self.sink {
            EventSink::Channel { sender, capacity } => {
                if sender.len() >= *capacity {
                    warn!(subscriber = self.id.0, capacity, "subscriber buffer full, dropping");
                    let overflow = SyncError::BufferOverflow {
                        capacity: *capacity,
                    };
                    let _ = sender.try_send(SubscriptionEvent::Failed(overflow));
                    outbox.dead.push(self.id);
                    return;
                }
                match sender.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                        outbox.dead.push(self.id)
                    }
                }
            }
            EventSink::Callback(callback) => {
                let callback = Arc::clone(callback);
                outbox.jobs.push(Box::new(move || callback(event)));
            }
        }
    }
}

/// Handle to a channel-backed subscription.
///
/// Dropping the handle does not unsubscribe immediately; the subscriber is
/// detached on the next delivery attempt. A handle that stops draining is
/// detached once its buffer fills, and receives
/// [`SyncError::BufferOverflow`] as its last event.
pub struct SubscriptionHandle {
    pub id: SubscriberId,
    pub fingerprint: Fingerprint,
    /// Channel to receive events.
    pub receiver: Receiver<SubscriptionEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SubscriptionEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SubscriptionEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SubscriptionEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
