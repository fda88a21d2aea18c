//! Integration tests for the sync channel: owner isolation, empty-owner
//! refusal, and release of store listeners on every exit path.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use taskflow::backend::DocumentStore;
use taskflow::backend::memory::MemoryDocumentStore;
use taskflow::sync::{SnapshotSink, SyncChannel, SyncError};
use taskflow_proto::snapshot::Snapshot;
use taskflow_proto::task::{OwnerId, Priority, TaskFields, validate};

const TASKS: &str = "tasks";

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Sink that records every emission in order.
#[derive(Default)]
struct RecordingSink {
    emissions: Mutex<Vec<(OwnerId, Snapshot)>>,
    lost: Mutex<Vec<(OwnerId, SyncError)>>,
    changed: Notify,
}

impl RecordingSink {
    fn emission_count(&self) -> usize {
        self.emissions.lock().len()
    }

    fn emissions_since(&self, start: usize) -> Vec<(OwnerId, Snapshot)> {
        self.emissions.lock()[start..].to_vec()
    }

    /// Waits until `pred` holds over the recorded emissions.
    async fn wait_until(&self, pred: impl Fn(&[(OwnerId, Snapshot)]) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.changed.notified();
                if pred(&self.emissions.lock()) {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for emission");
    }
}

impl SnapshotSink for RecordingSink {
    fn publish(&self, owner: &OwnerId, snapshot: Snapshot) {
        self.emissions.lock().push((owner.clone(), snapshot));
        self.changed.notify_waiters();
    }

    fn sync_lost(&self, owner: &OwnerId, error: &SyncError) {
        self.lost.lock().push((owner.clone(), error.clone()));
        self.changed.notify_waiters();
    }
}

async fn insert(store: &MemoryDocumentStore, owner: &OwnerId, title: &str) {
    let fields = TaskFields::new(validate(title).unwrap(), Priority::Low, owner.clone());
    store.create_document(TASKS, &fields).await.unwrap();
}

fn setup() -> (
    Arc<MemoryDocumentStore>,
    Arc<RecordingSink>,
    SyncChannel<MemoryDocumentStore, RecordingSink>,
) {
    let store = Arc::new(MemoryDocumentStore::new());
    let sink = Arc::new(RecordingSink::default());
    let channel = SyncChannel::new(Arc::clone(&store), Arc::clone(&sink), TASKS);
    (store, sink, channel)
}

// ---------------------------------------------------------------------------
// Owner isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn switching_owner_stops_previous_owner_emissions() {
    let (store, sink, channel) = setup();
    let alice = OwnerId::new("alice");
    let bob = OwnerId::new("bob");
    insert(&store, &alice, "a1").await;
    insert(&store, &bob, "b1").await;

    channel.open(&alice).await;
    sink.wait_until(|e| e.iter().any(|(_, s)| s.len() == 1)).await;

    channel.open(&bob).await;
    let start = sink.emission_count();
    insert(&store, &alice, "a2").await;
    insert(&store, &bob, "b2").await;
    sink.wait_until(|e| e[start..].iter().any(|(_, s)| s.len() == 2)).await;

    for (owner, snapshot) in sink.emissions_since(start) {
        assert_eq!(owner, bob);
        assert!(snapshot.iter().all(|t| t.owner_id == bob));
    }
    assert_eq!(channel.active_owner(), Some(bob));
    assert_eq!(store.listener_count(), 1);
}

#[tokio::test]
async fn emissions_only_contain_the_subscribed_owner() {
    let (store, sink, channel) = setup();
    let alice = OwnerId::new("alice");
    let mallory = OwnerId::new("mallory");

    channel.open(&alice).await;
    insert(&store, &mallory, "not yours").await;
    insert(&store, &alice, "yours").await;
    sink.wait_until(|e| e.iter().any(|(_, s)| s.len() == 1)).await;

    for (owner, snapshot) in sink.emissions_since(0) {
        assert_eq!(owner, alice);
        assert!(snapshot.iter().all(|t| t.title != "not yours"));
    }
}

#[tokio::test]
async fn rapid_reopen_leaves_one_listener() {
    let (store, sink, channel) = setup();
    for i in 0..10 {
        channel.open(&OwnerId::new(format!("user-{i}"))).await;
    }
    assert_eq!(store.listener_count(), 1);
    assert_eq!(channel.active_owner(), Some(OwnerId::new("user-9")));

    let last = OwnerId::new("user-9");
    sink.wait_until(|e| e.iter().any(|(o, _)| *o == last)).await;
    let start = sink.emission_count();
    insert(&store, &OwnerId::new("user-3"), "stale owner").await;
    insert(&store, &last, "live owner").await;
    sink.wait_until(|e| e[start..].iter().any(|(_, s)| s.len() == 1)).await;
    assert!(sink.emissions_since(start).iter().all(|(o, _)| *o == last));
}

// ---------------------------------------------------------------------------
// Refusal and release
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_owner_never_subscribes() {
    let (store, sink, channel) = setup();
    insert(&store, &OwnerId::new("alice"), "someone's task").await;

    let handle = channel.open(&OwnerId::new("")).await;
    assert!(handle.is_detached());
    assert!(!channel.is_live(&handle));
    assert_eq!(store.listener_count(), 0);

    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(sink.emission_count(), 0);
}

#[tokio::test]
async fn empty_owner_closes_previous_subscription() {
    let (store, _sink, channel) = setup();
    channel.open(&OwnerId::new("alice")).await;
    assert_eq!(store.listener_count(), 1);

    channel.open(&OwnerId::default()).await;
    assert_eq!(store.listener_count(), 0);
    assert_eq!(channel.active_owner(), None);
}

#[tokio::test]
async fn no_emission_after_close_returns() {
    let (store, sink, channel) = setup();
    let alice = OwnerId::new("alice");
    let handle = channel.open(&alice).await;
    sink.wait_until(|e| !e.is_empty()).await;

    insert(&store, &alice, "queued before close").await;
    assert!(channel.close(&handle));
    let closed_at = sink.emission_count();

    insert(&store, &alice, "after close").await;
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    assert_eq!(sink.emission_count(), closed_at);
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
async fn malformed_documents_are_skipped() {
    let (store, sink, channel) = setup();
    let alice = OwnerId::new("alice");
    store.insert_raw(TASKS, &alice, vec![0xFF, 0xFF, 0xFF]);
    insert(&store, &alice, "valid").await;

    channel.open(&alice).await;
    sink.wait_until(|e| !e.is_empty()).await;
    let emissions = sink.emissions_since(0);
    let (_, snapshot) = &emissions[0];
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].title, "valid");
}
