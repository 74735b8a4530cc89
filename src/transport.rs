//! Boundary with the transport layer.
//!
//! The transport owns the connection, wire encoding and timeouts. It
//! receives [`ClientRequest`]s through [`Transport::send`] and reports
//! decoded [`ServerEvent`]s back through `SyncClient::handle_event`.

use crate::error::SyncError;
use crate::query::SubscriptionTarget;
use crate::reconcile::Batch;
use crate::types::{DocumentBody, RequestId, SubscriptionId};
use serde::{Deserialize, Serialize};

/// Outgoing channel to the server.
///
/// `send` must not block on the server's answer. Implementations may call
/// back into the client synchronously; the client never holds a lock while
/// sending.
pub trait Transport: Send + Sync {
    fn send(&self, request: ClientRequest);
}

/// A request addressed to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub id: RequestId,
    pub kind: RequestKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    /// Register one wire-level subscription.
    Subscribe {
        subscription: SubscriptionId,
        target: SubscriptionTarget,
    },
    /// Retract a wire-level subscription.
    Unsubscribe { subscription: SubscriptionId },
    /// Send a message to every subscriber of a channel. Acknowledged or
    /// failed like any other request.
    Publish { channel: String, body: DocumentBody },
}

/// A message published to a channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Concrete channel name (relevant for prefix subscriptions).
    pub channel: String,
    pub body: DocumentBody,
}

/// Decoded events coming from the server.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    /// Dataset changes for a collection subscription.
    Batch {
        subscription: SubscriptionId,
        batch: Batch,
    },
    /// A message on a subscribed channel.
    ChannelMessage {
        subscription: SubscriptionId,
        message: ChannelMessage,
    },
    /// The server accepted a request.
    Acknowledged(RequestId),
    /// The server (or the transport, e.g. on timeout) rejected a request.
    Failed { request: RequestId, error: SyncError },
    /// The server dropped a subscription on its own, e.g. after permissions changed.
    SubscriptionCancelled { subscription: SubscriptionId },
    /// The connection is gone; every live subscription is lost.
    ConnectionTerminated,
}
