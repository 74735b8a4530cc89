//! Client facade tying subscriptions, delivery and execution together.

use crate::cache::CacheStore;
use crate::delivery::{DeliveryExecutor, InlineExecutor, ThreadExecutor};
use crate::error::{Result, SyncError};
use crate::execution::{
    self, DocumentBackend, ExecutionDecision, Mutation, MutationKind, Precondition, RetryPolicy,
};
use crate::query::{ChannelId, Fingerprint, Query, SubscriptionTarget};
use crate::subscriptions::{
    EventSink, SubscriptionCallback, SubscriptionEvent, SubscriptionHandle, SubscriptionRegistry,
    SubscriptionState,
};
use crate::transport::{ServerEvent, Transport};
use crate::types::{Document, DocumentBody, SubscriberId};
use std::sync::Arc;
use tracing::info;

/// Where subscriber callbacks and execution completions run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// On whichever thread produced the event, after the client's
    /// internal locks are released.
    Inline,
    /// On one dedicated thread.
    Dedicated { thread_name: String },
}

/// Configuration for a sync client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Conflict retry bounds for optimistic execution.
    pub retry: RetryPolicy,

    pub delivery: DeliveryMode,

    /// Events a [`SubscriptionHandle`] may hold undrained before its
    /// subscriber is dropped with [`SyncError::BufferOverflow`].
    pub buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            delivery: DeliveryMode::Dedicated {
                thread_name: "docsync-delivery".to_string(),
            },
            buffer_size: 1000,
        }
    }
}

/// Entry point for subscribing to collections and channels and for
/// optimistic writes.
///
/// The transport decodes server traffic and feeds it back through
/// [`SyncClient::handle_event`].
pub struct SyncClient {
    registry: Arc<SubscriptionRegistry>,
    backend: Arc<dyn DocumentBackend>,
    cache: Option<Arc<dyn CacheStore>>,
    executor: Arc<dyn DeliveryExecutor>,
    config: ClientConfig,
}

impl SyncClient {
    /// Create a client without a local cache.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        backend: Arc<dyn DocumentBackend>,
    ) -> Result<Self> {
        Self::build(config, transport, backend, None)
    }

    /// Create a client that warms subscriptions from, and writes back to,
    /// a local cache.
    pub fn with_cache(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        backend: Arc<dyn DocumentBackend>,
        cache: Arc<dyn CacheStore>,
    ) -> Result<Self> {
        Self::build(config, transport, backend, Some(cache))
    }

    fn build(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        backend: Arc<dyn DocumentBackend>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> Result<Self> {
        let executor: Arc<dyn DeliveryExecutor> = match &config.delivery {
            DeliveryMode::Inline => Arc::new(InlineExecutor),
            DeliveryMode::Dedicated { thread_name } => {
                Arc::new(ThreadExecutor::spawn(thread_name.clone())?)
            }
        };

        info!(
            delivery = ?config.delivery,
            buffer_size = config.buffer_size,
            cache = cache.is_some(),
            "sync client started"
        );

        Ok(Self {
            registry: Arc::new(SubscriptionRegistry::new(
                transport,
                cache.clone(),
                Arc::clone(&executor),
            )),
            backend,
            cache,
            executor,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Subscribe to a collection query. Events arrive on the returned handle.
    pub fn subscribe(&self, query: Query) -> Result<SubscriptionHandle> {
        self.subscribe_target(SubscriptionTarget::Collection(query))
    }

    /// Subscribe to a single document. The dataset holds at most that
    /// document; see [`ChangeSet::single`](crate::ChangeSet::single).
    pub fn subscribe_document(
        &self,
        collection: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<SubscriptionHandle> {
        self.subscribe(Query::document(collection, id))
    }

    /// Subscribe to messages on a channel.
    pub fn subscribe_channel(&self, channel: ChannelId) -> Result<SubscriptionHandle> {
        self.subscribe_target(SubscriptionTarget::Channel(channel))
    }

    /// Subscribe with a callback run on the delivery executor.
    pub fn subscribe_with<F>(&self, target: SubscriptionTarget, callback: F) -> Result<SubscriberId>
    where
        F: Fn(SubscriptionEvent) + Send + Sync + 'static,
    {
        let callback: SubscriptionCallback = Arc::new(callback);
        let (id, _) = self
            .registry
            .subscribe(target, EventSink::Callback(callback))?;
        Ok(id)
    }

    fn subscribe_target(&self, target: SubscriptionTarget) -> Result<SubscriptionHandle> {
        let (sink, receiver) = EventSink::bounded(self.config.buffer_size);
        let (id, fingerprint) = self.registry.subscribe(target, sink)?;
        Ok(SubscriptionHandle {
            id,
            fingerprint,
            receiver,
        })
    }

    /// Detach one subscriber.
    pub fn unsubscribe(&self, id: SubscriberId) -> Result<()> {
        self.registry.unsubscribe(id)
    }

    /// Feed a decoded server event into the client.
    pub fn handle_event(&self, event: ServerEvent) {
        self.registry.handle_event(event);
    }

    /// Publish a message to a channel. `completion` runs on the delivery
    /// executor once the server acknowledges or rejects it.
    pub fn publish<C>(
        &self,
        channel: impl Into<String>,
        body: DocumentBody,
        completion: C,
    ) -> Result<()>
    where
        C: FnOnce(Result<()>) + Send + 'static,
    {
        self.registry
            .publish(channel.into(), body, Box::new(completion))
    }

    /// Read a query once without subscribing.
    pub fn fetch(&self, query: &Query) -> Result<Vec<Document>> {
        execution::fetch(self.backend.as_ref(), self.cache.as_ref(), query)
    }

    /// Read one document once. A missing document comes back as a tombstone.
    pub fn fetch_document(&self, collection: &str, id: &str) -> Result<Document> {
        execution::fetch_document(self.backend.as_ref(), self.cache.as_ref(), collection, id)
    }

    /// Replace a document's body.
    pub fn mutate(
        &self,
        collection: &str,
        id: &str,
        body: DocumentBody,
        precondition: Precondition,
    ) -> Result<()> {
        self.apply(collection, id, MutationKind::Write(body), precondition)
    }

    /// Patch top-level keys of a document; `null` values remove keys.
    pub fn merge(
        &self,
        collection: &str,
        id: &str,
        patch: DocumentBody,
        precondition: Precondition,
    ) -> Result<()> {
        self.apply(collection, id, MutationKind::Merge(patch), precondition)
    }

    pub fn delete(&self, collection: &str, id: &str, precondition: Precondition) -> Result<()> {
        self.apply(collection, id, MutationKind::Delete, precondition)
    }

    fn apply(
        &self,
        collection: &str,
        id: &str,
        kind: MutationKind,
        precondition: Precondition,
    ) -> Result<()> {
        let mutation = Mutation {
            collection: collection.to_string(),
            document_id: id.to_string(),
            kind,
            precondition,
        };
        execution::apply(self.backend.as_ref(), self.cache.as_ref(), mutation)
    }

    /// Run the optimistic read-decide-write flow on the calling thread.
    pub fn execute<F>(&self, collection: &str, id: &str, decide: F) -> Result<()>
    where
        F: FnMut(&Document) -> ExecutionDecision,
    {
        execution::execute(
            self.backend.as_ref(),
            self.cache.as_ref(),
            &self.config.retry,
            collection,
            id,
            decide,
        )
    }

    /// Run the optimistic flow on a background thread and hand the result
    /// to `completion` on the delivery executor.
    pub fn execute_with_completion<F, C>(
        &self,
        collection: impl Into<String>,
        id: impl Into<String>,
        decide: F,
        completion: C,
    ) -> Result<()>
    where
        F: FnMut(&Document) -> ExecutionDecision + Send + 'static,
        C: FnOnce(Result<()>) + Send + 'static,
    {
        let collection = collection.into();
        let id = id.into();
        let backend = Arc::clone(&self.backend);
        let cache = self.cache.clone();
        let policy = self.config.retry.clone();
        let executor = Arc::clone(&self.executor);

        std::thread::Builder::new()
            .name("docsync-execute".to_string())
            .spawn(move || {
                let result = execution::execute(
                    backend.as_ref(),
                    cache.as_ref(),
                    &policy,
                    &collection,
                    &id,
                    decide,
                );
                executor.execute(Box::new(move || completion(result)));
            })
            .map_err(|e| SyncError::Executor(e.to_string()))?;

        Ok(())
    }

    /// Number of subscribers sharing the subscription for `fingerprint`.
    pub fn subscriber_count(&self, fingerprint: &Fingerprint) -> usize {
        self.registry.subscriber_count(fingerprint)
    }

    /// State of the subscription serving `fingerprint`, if any.
    pub fn manager_state(&self, fingerprint: &Fingerprint) -> Option<SubscriptionState> {
        self.registry.manager_state(fingerprint)
    }

    /// Last known dataset for `fingerprint`.
    pub fn document_set(&self, fingerprint: &Fingerprint) -> Option<Vec<Document>> {
        self.registry.document_set(fingerprint)
    }

    /// Wire-level subscriptions still tracked, including ones awaiting
    /// their unsubscribe acknowledgement.
    pub fn active_subscriptions(&self) -> usize {
        self.registry.active_subscriptions()
    }
}
