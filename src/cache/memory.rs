//! In-memory cache implementation.

use super::{CacheStore, DatasetCompletion, ObjectCompletion};
use crate::query::Fingerprint;
use crate::types::Document;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// LRU-bounded in-process cache. Completions run synchronously on the
/// calling thread.
pub struct MemoryCache {
    /// Datasets by subscription fingerprint.
    datasets: Mutex<LruCache<Fingerprint, Vec<Document>>>,

    /// Single documents by (collection, id).
    objects: Mutex<LruCache<(String, String), Document>>,
}

impl MemoryCache {
    /// Create a cache holding at most `capacity` datasets and
    /// `capacity` single documents.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            datasets: Mutex::new(LruCache::new(capacity)),
            objects: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Current dataset for a fingerprint, without touching recency.
    pub fn dataset(&self, fingerprint: &Fingerprint) -> Option<Vec<Document>> {
        self.datasets.lock().peek(fingerprint).cloned()
    }

    /// Current copy of one document, without touching recency.
    pub fn object(&self, group: &str, id: &str) -> Option<Document> {
        self.objects
            .lock()
            .peek(&(group.to_string(), id.to_string()))
            .cloned()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(128)
    }
}

impl CacheStore for MemoryCache {
    fn load(&self, fingerprint: &Fingerprint, completion: DatasetCompletion) {
        let cached = self.datasets.lock().get(fingerprint).cloned();
        completion(cached);
    }

    fn store(&self, fingerprint: &Fingerprint, documents: &[Document]) {
        {
            let mut objects = self.objects.lock();
            for document in documents {
                objects.put(
                    (document.collection.clone(), document.id.clone()),
                    document.clone(),
                );
            }
        }
        self.datasets
            .lock()
            .put(fingerprint.clone(), documents.to_vec());
    }

    fn load_object(&self, group: &str, id: &str, completion: ObjectCompletion) {
        let cached = self
            .objects
            .lock()
            .get(&(group.to_string(), id.to_string()))
            .cloned();
        completion(cached);
    }

    fn store_object(&self, document: &Document) {
        self.objects.lock().put(
            (document.collection.clone(), document.id.clone()),
            document.clone(),
        );
    }

    fn remove_object(&self, group: &str, id: &str) {
        self.objects.lock().pop(&(group.to_string(), id.to_string()));
    }
}
