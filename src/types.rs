//! Core types for the sync engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Document content: a JSON object.
pub type DocumentBody = serde_json::Map<String, serde_json::Value>;

/// Identifies one logical subscriber (one `subscribe` call).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub u64);

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

/// Identifies one wire-level subscription (one manager).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Identifies a request sent through the transport, echoed back in
/// acknowledgements and failures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A document snapshot as delivered by the server.
///
/// A document without a body is a tombstone: it signals deletion and is
/// never part of a materialized result set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identity, unique within the collection.
    pub id: String,

    /// Collection the document belongs to.
    pub collection: String,

    /// Content. `None` marks a tombstone.
    pub body: Option<DocumentBody>,

    /// Concurrency token. Present only for documents that exist on the server.
    pub etag: Option<String>,

    pub created_at: Option<Timestamp>,

    pub modified_at: Option<Timestamp>,

    /// Server-computed keys, one per ordering clause of the subscription.
    #[serde(default)]
    pub(crate) sort_keys: Vec<String>,

    /// Server-computed creation-order key, the final tiebreaker.
    #[serde(default)]
    pub(crate) sort_value: String,
}

impl Document {
    /// A document that exists on the server.
    pub fn new(
        collection: impl Into<String>,
        id: impl Into<String>,
        etag: impl Into<String>,
        body: DocumentBody,
    ) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            body: Some(body),
            etag: Some(etag.into()),
            created_at: None,
            modified_at: None,
            sort_keys: Vec::new(),
            sort_value: String::new(),
        }
    }

    /// A tombstone for a removed (or never existing) document.
    pub fn removed(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            body: None,
            etag: None,
            created_at: None,
            modified_at: None,
            sort_keys: Vec::new(),
            sort_value: String::new(),
        }
    }

    /// Set the placement keys computed by the server.
    pub fn with_sort_keys(mut self, sort_keys: Vec<String>, sort_value: impl Into<String>) -> Self {
        self.sort_keys = sort_keys;
        self.sort_value = sort_value.into();
        self
    }

    /// Set creation and modification times.
    pub fn with_timestamps(mut self, created_at: Timestamp, modified_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self.modified_at = Some(modified_at);
        self
    }

    /// Copy of this document carrying a different body; metadata is kept.
    pub fn with_body(&self, body: DocumentBody) -> Self {
        Self {
            body: Some(body),
            ..self.clone()
        }
    }

    /// True when the document has no body.
    pub fn is_tombstone(&self) -> bool {
        self.body.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> DocumentBody {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_removed_is_tombstone() {
        let doc = Document::removed("posts", "a");
        assert!(doc.is_tombstone());
        assert!(doc.etag.is_none());
    }

    #[test]
    fn test_with_body_keeps_metadata() {
        let doc = Document::new("posts", "a", "3", body(json!({"title": "old"})))
            .with_sort_keys(vec!["k".into()], "0001");
        let updated = doc.with_body(body(json!({"title": "new"})));

        assert_eq!(updated.etag.as_deref(), Some("3"));
        assert_eq!(updated.sort_keys, vec!["k".to_string()]);
        assert_eq!(updated.body.unwrap()["title"], "new");
    }

    #[test]
    fn test_document_serde_defaults_sort_keys() {
        let doc: Document = serde_json::from_value(json!({
            "id": "a",
            "collection": "posts",
            "body": {"x": 1},
            "etag": "1",
            "created_at": null,
            "modified_at": null
        }))
        .unwrap();

        assert!(doc.sort_keys.is_empty());
        assert_eq!(doc.sort_value, "");
    }
}
