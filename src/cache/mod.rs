//! Local cache of subscription datasets and single documents.
//!
//! The cache is best-effort: misses and failures surface as `None` and are
//! never reported to subscribers. Loads complete through a callback so an
//! implementation may answer from another thread.

mod memory;

pub use memory::MemoryCache;

use crate::query::Fingerprint;
use crate::types::Document;

/// Completion for an asynchronous dataset load.
pub type DatasetCompletion = Box<dyn FnOnce(Option<Vec<Document>>) + Send + 'static>;

/// Completion for an asynchronous single-document load.
pub type ObjectCompletion = Box<dyn FnOnce(Option<Document>) + Send + 'static>;

/// Storage for the last known dataset of each subscription.
pub trait CacheStore: Send + Sync {
    /// Load the dataset last stored for a fingerprint.
    fn load(&self, fingerprint: &Fingerprint, completion: DatasetCompletion);

    /// Remember the current dataset for a fingerprint.
    fn store(&self, fingerprint: &Fingerprint, documents: &[Document]);

    /// Load one document by collection (group) and identity.
    fn load_object(&self, group: &str, id: &str, completion: ObjectCompletion);

    fn store_object(&self, document: &Document);

    fn remove_object(&self, group: &str, id: &str);
}
