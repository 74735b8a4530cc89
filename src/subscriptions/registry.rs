//! Registry of live subscription managers.
//!
//! Logical subscriptions with the same fingerprint share one manager and one
//! wire-level subscription. Lock order is registry, then manager. Transport
//! sends, cache loads, callback jobs and publish completions all happen after
//! every lock is released.

use crate::cache::CacheStore;
use crate::delivery::DeliveryExecutor;
use crate::error::{Result, SyncError};
use crate::query::{ChannelId, Fingerprint, SubscriptionTarget};
use crate::reconcile::Batch;
use crate::transport::{ChannelMessage, ClientRequest, RequestKind, ServerEvent, Transport};
use crate::types::{Document, DocumentBody, RequestId, SubscriberId, SubscriptionId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::manager::{Detached, SubscriptionManager};
use super::types::{EventSink, Outbox, Subscriber, SubscriptionState};

type SharedManager = Arc<Mutex<SubscriptionManager>>;

/// Completion for a channel publish, run on the delivery executor.
pub(crate) type PublishCompletion = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// What an outstanding request was for.
enum PendingRequest {
    Subscribe(SubscriptionId),
    Unsubscribe(SubscriptionId),
    // Wrapped so the registry state stays `Sync` without requiring `Sync`
    // completions.
    Publish(Mutex<PublishCompletion>),
}

#[derive(Default)]
struct RegistryState {
    /// Fingerprint to the manager currently accepting subscribers.
    by_fingerprint: HashMap<Fingerprint, SubscriptionId>,
    /// Every manager the server may still talk about, including ones
    /// waiting for their unsubscribe acknowledgement.
    managers: HashMap<SubscriptionId, SharedManager>,
    /// Logical subscriber to its manager.
    subscribers: HashMap<SubscriberId, SubscriptionId>,
    pending: HashMap<RequestId, PendingRequest>,
}

/// Fans server events out to subscription managers and keeps the
/// fingerprint-to-manager mapping.
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
    /// Shared counter for subscriber, subscription and request ids.
    next_id: AtomicU64,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn CacheStore>>,
    executor: Arc<dyn DeliveryExecutor>,
}

impl SubscriptionRegistry {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Option<Arc<dyn CacheStore>>,
        executor: Arc<dyn DeliveryExecutor>,
    ) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            next_id: AtomicU64::new(1),
            transport,
            cache,
            executor,
        }
    }

    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Attach a logical subscriber to the manager for `target`, creating
    /// the manager (and the wire subscription) when none exists.
    pub(crate) fn subscribe(
        self: &Arc<Self>,
        target: SubscriptionTarget,
        sink: EventSink,
    ) -> Result<(SubscriberId, Fingerprint)> {
        target.validate()?;

        let fingerprint = target.fingerprint();
        let subscriber = Subscriber {
            id: SubscriberId(self.next()),
            sink,
        };
        let subscriber_id = subscriber.id;

        let mut state = self.state.write();

        let existing = state
            .by_fingerprint
            .get(&fingerprint)
            .and_then(|id| state.managers.get(id).map(|m| (*id, Arc::clone(m))));

        if let Some((subscription, manager)) = existing {
            state.subscribers.insert(subscriber_id, subscription);
            let outbox = manager.lock().register_subscriber(subscriber);
            drop(state);

            debug!(fingerprint = %fingerprint, subscription = %subscription, "joined existing subscription");
            self.flush(outbox);
            return Ok((subscriber_id, fingerprint));
        }

        let subscription = SubscriptionId(self.next());
        let request = RequestId(self.next());
        let manager = SubscriptionManager::new(
            subscription,
            target.clone(),
            subscriber,
            self.cache.clone(),
        );

        state
            .by_fingerprint
            .insert(fingerprint.clone(), subscription);
        state
            .managers
            .insert(subscription, Arc::new(Mutex::new(manager)));
        state.subscribers.insert(subscriber_id, subscription);
        state
            .pending
            .insert(request, PendingRequest::Subscribe(subscription));
        drop(state);

        info!(fingerprint = %fingerprint, subscription = %subscription, "subscribing");

        if matches!(target, SubscriptionTarget::Collection(_)) {
            self.load_cached(subscription, &fingerprint);
        }

        self.transport.send(ClientRequest {
            id: request,
            kind: RequestKind::Subscribe {
                subscription,
                target,
            },
        });

        Ok((subscriber_id, fingerprint))
    }

    /// Detach a logical subscriber. The last one out retracts the wire
    /// subscription.
    pub(crate) fn unsubscribe(&self, subscriber: SubscriberId) -> Result<()> {
        let mut state = self.state.write();

        let subscription = state
            .subscribers
            .remove(&subscriber)
            .ok_or(SyncError::SubscriptionNotFound(subscriber))?;

        let Some(manager) = state.managers.get(&subscription).cloned() else {
            return Ok(());
        };

        let mut guard = manager.lock();
        if guard.detach_subscriber(subscriber) != Detached::Last {
            return Ok(());
        }

        // Later subscribers with this fingerprint get a fresh manager
        if state.by_fingerprint.get(guard.fingerprint()) == Some(&subscription) {
            state.by_fingerprint.remove(guard.fingerprint());
        }
        drop(guard);

        let request = RequestId(self.next());
        state
            .pending
            .insert(request, PendingRequest::Unsubscribe(subscription));
        drop(state);

        self.transport.send(ClientRequest {
            id: request,
            kind: RequestKind::Unsubscribe { subscription },
        });
        Ok(())
    }

    /// Send a message to a channel. `completion` runs on the delivery
    /// executor once the server acknowledges or rejects it.
    pub(crate) fn publish(
        &self,
        channel: String,
        body: DocumentBody,
        completion: PublishCompletion,
    ) -> Result<()> {
        ChannelId::Name(channel.clone()).validate()?;

        let request = RequestId(self.next());
        self.state
            .write()
            .pending
            .insert(request, PendingRequest::Publish(Mutex::new(completion)));

        debug!(channel = %channel, request = ?request, "publishing");
        self.transport.send(ClientRequest {
            id: request,
            kind: RequestKind::Publish { channel, body },
        });
        Ok(())
    }

    /// Route one decoded server event.
    pub(crate) fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::Batch {
                subscription,
                batch,
            } => self.on_batch(subscription, batch),
            ServerEvent::ChannelMessage {
                subscription,
                message,
            } => self.on_channel_message(subscription, message),
            ServerEvent::Acknowledged(request) => self.on_acknowledged(request),
            ServerEvent::Failed { request, error } => self.on_request_failed(request, error),
            ServerEvent::SubscriptionCancelled { subscription } => self.fail_manager(
                subscription,
                SyncError::PermissionDenied("subscription cancelled by server".into()),
            ),
            ServerEvent::ConnectionTerminated => self.on_connection_terminated(),
        }
    }

    /// Number of logical subscribers sharing the subscription for `fingerprint`.
    pub fn subscriber_count(&self, fingerprint: &Fingerprint) -> usize {
        self.manager_for(fingerprint)
            .map(|m| m.lock().subscriber_count())
            .unwrap_or(0)
    }

    /// State of the subscription currently serving `fingerprint`.
    pub fn manager_state(&self, fingerprint: &Fingerprint) -> Option<SubscriptionState> {
        self.manager_for(fingerprint).map(|m| m.lock().state())
    }

    /// Last known dataset for `fingerprint`.
    pub fn document_set(&self, fingerprint: &Fingerprint) -> Option<Vec<Document>> {
        self.manager_for(fingerprint)
            .and_then(|m| m.lock().documents())
    }

    /// Number of wire-level subscriptions the registry still tracks.
    pub fn active_subscriptions(&self) -> usize {
        self.state.read().managers.len()
    }

    fn manager_for(&self, fingerprint: &Fingerprint) -> Option<SharedManager> {
        let state = self.state.read();
        state
            .by_fingerprint
            .get(fingerprint)
            .and_then(|id| state.managers.get(id))
            .cloned()
    }

    fn manager(&self, subscription: SubscriptionId) -> Option<SharedManager> {
        self.state.read().managers.get(&subscription).cloned()
    }

    fn load_cached(self: &Arc<Self>, subscription: SubscriptionId, fingerprint: &Fingerprint) {
        let Some(cache) = &self.cache else {
            return;
        };

        let registry = Arc::downgrade(self);
        cache.load(
            fingerprint,
            Box::new(move |cached| {
                let Some(documents) = cached else {
                    return;
                };
                // The client may be gone by the time the cache answers
                let Some(registry) = registry.upgrade() else {
                    return;
                };
                registry.apply_cached(subscription, documents);
            }),
        );
    }

    fn apply_cached(&self, subscription: SubscriptionId, documents: Vec<Document>) {
        let Some(manager) = self.manager(subscription) else {
            return;
        };
        debug!(subscription = %subscription, documents = documents.len(), "applying cached dataset");
        let outbox = manager.lock().apply_cached(documents);
        self.flush(outbox);
    }

    fn on_batch(&self, subscription: SubscriptionId, batch: Batch) {
        let Some(manager) = self.manager(subscription) else {
            debug!(subscription = %subscription, "batch for unknown subscription");
            return;
        };
        let outbox = manager.lock().on_batch(batch);
        self.flush(outbox);
    }

    fn on_channel_message(&self, subscription: SubscriptionId, message: ChannelMessage) {
        let Some(manager) = self.manager(subscription) else {
            debug!(subscription = %subscription, "message for unknown subscription");
            return;
        };
        let outbox = manager.lock().on_channel_message(message);
        self.flush(outbox);
    }

    fn on_acknowledged(&self, request: RequestId) {
        let mut state = self.state.write();
        let pending = state.pending.remove(&request);
        match pending {
            Some(PendingRequest::Subscribe(subscription)) => {
                if let Some(manager) = state.managers.get(&subscription) {
                    manager.lock().on_acknowledged();
                }
            }
            Some(PendingRequest::Unsubscribe(subscription)) => {
                if let Some(manager) = state.managers.remove(&subscription) {
                    manager.lock().on_unsubscribed();
                }
            }
            Some(PendingRequest::Publish(completion)) => {
                drop(state);
                debug!(request = ?request, "publish acknowledged");
                self.complete_publish(completion, Ok(()));
            }
            None => debug!(request = ?request, "acknowledgement for unknown request"),
        }
    }

    fn on_request_failed(&self, request: RequestId, error: SyncError) {
        let pending = self.state.write().pending.remove(&request);
        match pending {
            Some(PendingRequest::Subscribe(subscription)) => self.fail_manager(subscription, error),
            Some(PendingRequest::Unsubscribe(subscription)) => {
                self.retry_unsubscribe(subscription, error)
            }
            Some(PendingRequest::Publish(completion)) => {
                warn!(request = ?request, error = %error, "publish failed");
                self.complete_publish(completion, Err(error));
            }
            None => debug!(request = ?request, error = %error, "failure for unknown request"),
        }
    }

    fn complete_publish(&self, completion: Mutex<PublishCompletion>, result: Result<()>) {
        let completion = completion.into_inner();
        self.executor.execute(Box::new(move || completion(result)));
    }

    fn retry_unsubscribe(&self, subscription: SubscriptionId, error: SyncError) {
        let mut state = self.state.write();
        let Some(manager) = state.managers.get(&subscription).cloned() else {
            return;
        };
        if !manager.lock().should_retry_unsubscribe() {
            return;
        }

        warn!(subscription = %subscription, error = %error, "unsubscribe failed, retrying");
        let request = RequestId(self.next());
        state
            .pending
            .insert(request, PendingRequest::Unsubscribe(subscription));
        drop(state);

        self.transport.send(ClientRequest {
            id: request,
            kind: RequestKind::Unsubscribe { subscription },
        });
    }

    /// Forget a manager entirely and deliver the failure to its subscribers.
    fn fail_manager(&self, subscription: SubscriptionId, error: SyncError) {
        let manager = {
            let mut state = self.state.write();
            let Some(manager) = state.managers.remove(&subscription) else {
                return;
            };
            state.by_fingerprint.retain(|_, id| *id != subscription);
            state.subscribers.retain(|_, id| *id != subscription);
            state.pending.retain(|_, pending| match pending {
                PendingRequest::Subscribe(id) | PendingRequest::Unsubscribe(id) => {
                    *id != subscription
                }
                PendingRequest::Publish(_) => true,
            });
            manager
        };
        let outbox = manager.lock().on_failure(error);
        self.flush(outbox);
    }

    fn on_connection_terminated(&self) {
        let (managers, pending): (Vec<SharedManager>, Vec<PendingRequest>) = {
            let mut state = self.state.write();
            let managers = state.managers.drain().map(|(_, m)| m).collect();
            let pending = state.pending.drain().map(|(_, p)| p).collect();
            state.by_fingerprint.clear();
            state.subscribers.clear();
            (managers, pending)
        };

        warn!(subscriptions = managers.len(), "connection terminated, failing all subscriptions");
        let mut outbox = Outbox::default();
        for manager in managers {
            outbox.append(manager.lock().on_failure(SyncError::ConnectionTerminated));
        }
        self.flush(outbox);

        for request in pending {
            if let PendingRequest::Publish(completion) = request {
                self.complete_publish(completion, Err(SyncError::ConnectionTerminated));
            }
        }
    }

    /// Run deferred callback jobs, then detach subscribers that could not
    /// receive. Must be called with no registry or manager lock held.
    fn flush(&self, outbox: Outbox) {
        if outbox.is_empty() {
            return;
        }
        for job in outbox.jobs {
            self.executor.execute(job);
        }
        self.detach_dead(outbox.dead);
    }

    fn detach_dead(&self, dead: Vec<SubscriberId>) {
        for subscriber in dead {
            debug!(subscriber = subscriber.0, "subscriber unreachable, detaching");
            if let Err(e) = self.unsubscribe(subscriber) {
                debug!(error = %e, "subscriber already detached");
            }
        }
    }
}
