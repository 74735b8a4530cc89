//! Scaling tests with large datasets and many subscribers.
//!
//! Measures the hot paths of the engine:
//! - Initial snapshots of 10k documents
//! - Incremental batches against a large materialized set
//! - Fan-out to hundreds of coalesced subscribers
//! - Concurrent subscribe/unsubscribe while batches are applied

use docsync::{
    Batch, ClientConfig, ClientRequest, DeliveryMode, Document, DocumentBackend, Mutation,
    OrderBy, Query, RequestKind, Result, RetryPolicy, ServerEvent, SubscriptionEvent,
    SubscriptionId, SyncClient, Transport,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DOCUMENT_COUNT: usize = 10_000;

/// Timing helper
struct Timer {
    start: Instant,
    name: &'static str,
}

impl Timer {
    fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    fn report(&self) {
        println!("  {} took {:.2}ms", self.name, self.elapsed_ms());
    }
}

#[derive(Default)]
struct MockTransport {
    sent: Mutex<Vec<ClientRequest>>,
}

impl MockTransport {
    fn subscription(&self) -> SubscriptionId {
        self.sent
            .lock()
            .iter()
            .rev()
            .find_map(|r| match r.kind {
                RequestKind::Subscribe { subscription, .. } => Some(subscription),
                _ => None,
            })
            .unwrap()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: ClientRequest) {
        self.sent.lock().push(request);
    }
}

struct NoBackend;

impl DocumentBackend for NoBackend {
    fn fetch(&self, _collection: &str, _id: &str) -> Result<Option<Document>> {
        Ok(None)
    }

    fn fetch_query(&self, _query: &Query) -> Result<Vec<Document>> {
        Ok(Vec::new())
    }

    fn mutate(&self, _mutation: &Mutation) -> Result<()> {
        Ok(())
    }
}

fn client() -> (SyncClient, Arc<MockTransport>) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let transport = Arc::new(MockTransport::default());
    let client = SyncClient::new(
        ClientConfig {
            retry: RetryPolicy::immediate(1),
            delivery: DeliveryMode::Inline,
            buffer_size: 1000,
        },
        transport.clone(),
        Arc::new(NoBackend),
    )
    .unwrap();
    (client, transport)
}

fn doc(i: usize, etag: u32) -> Document {
    Document::new(
        "items",
        format!("item-{}", i),
        etag.to_string(),
        json!({"rank": i}).as_object().cloned().unwrap(),
    )
    .with_sort_keys(vec![format!("{:08}", i)], format!("{:08}", i))
}

fn ranked() -> Query {
    Query::new("items").order_by(OrderBy::ascending("rank"))
}

#[test]
fn test_scaling_large_snapshot_and_updates() {
    let (client, transport) = client();
    let handle = client.subscribe(ranked()).unwrap();
    let subscription = transport.subscription();

    // Deliver out of order to exercise sorting
    let snapshot: Vec<Document> = (0..DOCUMENT_COUNT).rev().map(|i| doc(i * 2, 1)).collect();

    let timer = Timer::new("initial snapshot");
    client.handle_event(ServerEvent::Batch {
        subscription,
        batch: Batch::snapshot(snapshot),
    });
    timer.report();

    match handle.try_recv().unwrap() {
        SubscriptionEvent::Changed(change) => {
            assert_eq!(change.documents.len(), DOCUMENT_COUNT);
            assert_eq!(change.documents[0].id, "item-0");
        }
        other => panic!("Expected Changed event, got {:?}", other),
    }

    // Odd ranks slot in between existing documents
    let updates: Vec<Document> = (0..1_000).map(|i| doc(i * 2 + 1, 1)).collect();
    let timer = Timer::new("1k inserts into 10k set");
    client.handle_event(ServerEvent::Batch {
        subscription,
        batch: Batch::updates(updates),
    });
    timer.report();

    match handle.try_recv().unwrap() {
        SubscriptionEvent::Changed(change) => {
            assert_eq!(change.added.len(), 1_000);
            assert_eq!(change.documents.len(), DOCUMENT_COUNT + 1_000);
            assert_eq!(change.documents[1].id, "item-1");
        }
        other => panic!("Expected Changed event, got {:?}", other),
    }

    let set = client.document_set(&handle.fingerprint).unwrap();
    assert!(set.windows(2).all(|w| w[0].id != w[1].id));
}

#[test]
fn test_scaling_fan_out() {
    let (client, transport) = client();

    let timer = Timer::new("500 coalesced subscribers");
    let handles: Vec<_> = (0..500).map(|_| client.subscribe(ranked()).unwrap()).collect();
    timer.report();

    assert_eq!(transport.sent.lock().len(), 1);
    assert_eq!(client.subscriber_count(&handles[0].fingerprint), 500);

    let timer = Timer::new("fan-out of 100 documents");
    client.handle_event(ServerEvent::Batch {
        subscription: transport.subscription(),
        batch: Batch::snapshot((0..100).map(|i| doc(i, 1)).collect()),
    });
    timer.report();

    for handle in &handles {
        match handle.try_recv().unwrap() {
            SubscriptionEvent::Changed(change) => assert_eq!(change.documents.len(), 100),
            other => panic!("Expected Changed event, got {:?}", other),
        }
    }
}

#[test]
fn test_scaling_concurrent_subscribers() {
    let (client, transport) = client();
    let client = Arc::new(client);
    let anchor = client.subscribe(ranked()).unwrap();
    let subscription = transport.subscription();

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let handle = client.subscribe(ranked()).unwrap();
                    client.unsubscribe(handle.id).unwrap();
                }
            })
        })
        .collect();

    for etag in 1..=50u32 {
        client.handle_event(ServerEvent::Batch {
            subscription,
            batch: Batch::updates(vec![doc(0, etag)]),
        });
    }

    for worker in workers {
        worker.join().unwrap();
    }

    // The anchor kept the wire subscription alive throughout
    assert_eq!(client.subscriber_count(&anchor.fingerprint), 1);
    let subscribes = transport
        .sent
        .lock()
        .iter()
        .filter(|r| matches!(r.kind, RequestKind::Subscribe { .. }))
        .count();
    assert_eq!(subscribes, 1);

    let mut received = 0;
    while anchor.recv_timeout(Duration::from_millis(10)).is_ok() {
        received += 1;
    }
    assert_eq!(received, 50);
}
