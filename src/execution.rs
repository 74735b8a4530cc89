//! Direct reads and writes against the backend: one-shot fetches,
//! conditional mutations, and optimistic read-decide-write with retry on
//! conflict.

use crate::cache::CacheStore;
use crate::documents::OrderedDocumentSet;
use crate::error::{Result, SyncError};
use crate::query::Query;
use crate::types::{Document, DocumentBody};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What the caller wants done with the document it was shown.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionDecision {
    /// Replace the document content.
    Write(DocumentBody),
    Delete,
    /// Stop without touching the document.
    Abort,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MutationKind {
    /// Replace the whole body.
    Write(DocumentBody),
    /// Patch top-level keys; a `null` value removes the key.
    Merge(DocumentBody),
    Delete,
}

/// Condition the server copy must meet for a mutation to apply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Precondition {
    #[default]
    Any,
    /// The server copy must still carry this token.
    Etag(String),
    /// The document must not exist.
    Absent,
}

impl Precondition {
    /// The precondition pinning the state a document was read in.
    pub fn matching(document: &Document) -> Self {
        match &document.etag {
            Some(etag) => Precondition::Etag(etag.clone()),
            None => Precondition::Absent,
        }
    }

    /// Whether a server copy with `current_etag` (`None` when missing)
    /// satisfies the condition.
    pub fn admits(&self, current_etag: Option<&str>) -> bool {
        match self {
            Precondition::Any => true,
            Precondition::Etag(expected) => current_etag == Some(expected.as_str()),
            Precondition::Absent => current_etag.is_none(),
        }
    }
}

/// A conditional mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct Mutation {
    pub collection: String,
    pub document_id: String,
    pub kind: MutationKind,
    pub precondition: Precondition,
}

/// Point reads, query reads and conditional writes against the server.
pub trait DocumentBackend: Send + Sync {
    /// Read one document directly, bypassing subscriptions.
    fn fetch(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Read the current result of a query once.
    fn fetch_query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Apply a mutation. Fails with [`SyncError::WriteConflict`] when the
    /// precondition no longer holds.
    fn mutate(&self, mutation: &Mutation) -> Result<()>;
}

/// Apply a merge patch to a body in place.
pub fn merge_body(body: &mut DocumentBody, patch: &DocumentBody) {
    for (key, value) in patch {
        if value.is_null() {
            body.remove(key);
        } else {
            body.insert(key.clone(), value.clone());
        }
    }
}

/// Bounds the conflict retry loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Pause after the given failed attempt (1-based): doubles each time,
    /// capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

/// Run the optimistic flow for one document.
///
/// `decide` is called with the freshly fetched document on every attempt;
/// a missing document is presented as a tombstone. Conflicts are retried
/// up to the policy's attempt limit. Any other error ends the flow.
pub fn execute<F>(
    backend: &dyn DocumentBackend,
    cache: Option<&Arc<dyn CacheStore>>,
    policy: &RetryPolicy,
    collection: &str,
    id: &str,
    mut decide: F,
) -> Result<()>
where
    F: FnMut(&Document) -> ExecutionDecision,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let current = backend
            .fetch(collection, id)?
            .unwrap_or_else(|| Document::removed(collection, id));

        let kind = match decide(&current) {
            ExecutionDecision::Write(body) => MutationKind::Write(body),
            ExecutionDecision::Delete => MutationKind::Delete,
            ExecutionDecision::Abort => {
                debug!(collection, id, "execution aborted");
                return Err(SyncError::ExecutionAborted);
            }
        };

        let mutation = Mutation {
            collection: collection.to_string(),
            document_id: id.to_string(),
            kind,
            precondition: Precondition::matching(&current),
        };

        match backend.mutate(&mutation) {
            Ok(()) => {
                debug!(collection, id, attempt, "execution committed");
                if let Some(cache) = cache {
                    refresh_cache(cache, mutation);
                }
                return Ok(());
            }
            Err(e) if e.is_write_conflict() => {
                if attempt >= max_attempts {
                    warn!(collection, id, attempts = attempt, "execution gave up on conflicts");
                    return Err(SyncError::RetriesExhausted { attempts: attempt });
                }
                debug!(collection, id, attempt, "write conflict, refetching");
                let pause = policy.backoff(attempt);
                if !pause.is_zero() {
                    std::thread::sleep(pause);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Apply one mutation as given and mirror it into the cache on success.
pub fn apply(
    backend: &dyn DocumentBackend,
    cache: Option<&Arc<dyn CacheStore>>,
    mutation: Mutation,
) -> Result<()> {
    if mutation.collection.is_empty() || mutation.document_id.is_empty() {
        return Err(SyncError::InvalidData("document reference is empty".into()));
    }

    if let Err(e) = backend.mutate(&mutation) {
        debug!(collection = %mutation.collection, id = %mutation.document_id, error = %e, "mutation rejected");
        return Err(e);
    }

    debug!(collection = %mutation.collection, id = %mutation.document_id, "mutation applied");
    if let Some(cache) = cache {
        refresh_cache(cache, mutation);
    }
    Ok(())
}

/// Read a query once. The result is ordered and capped like a
/// subscription dataset and replaces the cached dataset for the query's
/// fingerprint; a failed read empties it.
pub fn fetch(
    backend: &dyn DocumentBackend,
    cache: Option<&Arc<dyn CacheStore>>,
    query: &Query,
) -> Result<Vec<Document>> {
    query.validate()?;
    let fingerprint = query.fingerprint();

    match backend.fetch_query(query) {
        Ok(documents) => {
            let mut set = OrderedDocumentSet::from_documents(query.directions(), documents);
            if let Some(cap) = query.take() {
                set.truncate(cap);
            }
            debug!(fingerprint = %fingerprint, documents = set.len(), "fetched");
            if let Some(cache) = cache {
                cache.store(&fingerprint, set.as_slice());
            }
            Ok(set.into_vec())
        }
        Err(e) => {
            warn!(fingerprint = %fingerprint, error = %e, "fetch failed");
            if let Some(cache) = cache {
                cache.store(&fingerprint, &[]);
            }
            Err(e)
        }
    }
}

/// Read one document once. A missing document comes back as a tombstone.
pub fn fetch_document(
    backend: &dyn DocumentBackend,
    cache: Option<&Arc<dyn CacheStore>>,
    collection: &str,
    id: &str,
) -> Result<Document> {
    let query = Query::document(collection, id);
    query.validate()?;

    let fetched = backend.fetch(collection, id);
    let Some(cache) = cache else {
        return fetched.map(|doc| doc.unwrap_or_else(|| Document::removed(collection, id)));
    };

    let fingerprint = query.fingerprint();
    match fetched {
        Ok(Some(document)) => {
            cache.store(&fingerprint, std::slice::from_ref(&document));
            cache.store_object(&document);
            Ok(document)
        }
        Ok(None) => {
            cache.store(&fingerprint, &[]);
            cache.remove_object(collection, id);
            Ok(Document::removed(collection, id))
        }
        Err(e) => {
            cache.store(&fingerprint, &[]);
            Err(e)
        }
    }
}

/// Mirror a committed mutation into the cached copy of the document.
pub(crate) fn refresh_cache(cache: &Arc<dyn CacheStore>, mutation: Mutation) {
    let Mutation {
        collection,
        document_id,
        kind,
        ..
    } = mutation;

    let update: Box<dyn FnOnce(Document) -> Document + Send> = match kind {
        MutationKind::Delete => {
            cache.remove_object(&collection, &document_id);
            return;
        }
        MutationKind::Write(body) => Box::new(move |cached| cached.with_body(body)),
        MutationKind::Merge(patch) => Box::new(move |cached| {
            let mut body = cached.body.clone().unwrap_or_default();
            merge_body(&mut body, &patch);
            cached.with_body(body)
        }),
    };

    let store = Arc::clone(cache);
    cache.load_object(
        &collection,
        &document_id,
        Box::new(move |cached| {
            if let Some(cached) = cached {
                store.store_object(&update(cached));
            }
        }),
    );
}
