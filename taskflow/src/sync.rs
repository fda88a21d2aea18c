//! Remote sync channel.
//!
//! Turns a [`DocumentStore`] push subscription for one owner into a stream
//! of fully sorted [`Snapshot`]s delivered to a [`SnapshotSink`].
//!
//! # Lifecycle
//!
//! ```text
//! open(A) ──► live(A, gen 1) ──open(B)──► live(B, gen 2) ──close──► idle
//!                  │                           │
//!                  └── pump task (gen 1) ──────┘ emissions tagged with
//!                                                their generation
//! ```
//!
//! At most one subscription is live per channel. Every open or close bumps
//! the generation; a pump only publishes while its generation is still the
//! live one, checked under the same lock that `close` takes. Once `close`
//! returns, nothing from the closed subscription reaches the sink.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use taskflow_proto::document::Document;
use taskflow_proto::snapshot::Snapshot;
use taskflow_proto::task::OwnerId;

use crate::backend::{DocumentStore, ListenerRegistration, PushUpdate, StoreError};

/// Errors that end or prevent a subscription.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// No owner identity; an unfiltered subscription is never opened.
    #[error("no owner identity, refusing to subscribe")]
    MissingOwner,

    /// The store rejected the subscription.
    #[error("subscription failed: {0}")]
    Subscribe(StoreError),

    /// The store terminated a live subscription.
    #[error("push stream failed: {0}")]
    Stream(StoreError),

    /// The store closed the push stream without an error.
    #[error("push stream closed by the store")]
    StreamClosed,
}

/// Consumer of sync channel emissions.
pub trait SnapshotSink: Send + Sync + 'static {
    /// A fresh snapshot for `owner`.
    fn publish(&self, owner: &OwnerId, snapshot: Snapshot);

    /// The live subscription for `owner` failed. The last snapshot is now
    /// stale.
    fn sync_lost(&self, owner: &OwnerId, error: &SyncError);
}

/// Identifies one `open` of a [`SyncChannel`].
///
/// A handle whose owner is `None` never had a live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    generation: u64,
    owner: Option<OwnerId>,
}

impl SubscriptionHandle {
    const fn detached() -> Self {
        Self {
            generation: 0,
            owner: None,
        }
    }

    /// Owner this subscription was opened for.
    #[must_use]
    pub const fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    /// `true` if this handle never had a live subscription.
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.owner.is_none()
    }
}

struct ActiveSubscription {
    generation: u64,
    owner: OwnerId,
    registration: Box<dyn ListenerRegistration>,
    pump: JoinHandle<()>,
}

impl ActiveSubscription {
    fn release(self) {
        self.registration.remove();
        self.pump.abort();
        tracing::debug!(owner = %self.owner, generation = self.generation, "subscription released");
    }
}

#[derive(Default)]
struct ChannelState {
    /// Bumped by every open and close.
    generation: u64,
    active: Option<ActiveSubscription>,
}

impl ChannelState {
    fn is_live(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| a.generation == generation)
    }

    /// Invalidates any in-flight open and detaches the live subscription.
    fn supersede(&mut self) -> Option<ActiveSubscription> {
        self.generation += 1;
        self.active.take()
    }
}

/// Owner-scoped push subscription with explicit open/close lifecycle.
pub struct SyncChannel<S: DocumentStore, K: SnapshotSink> {
    store: Arc<S>,
    sink: Arc<K>,
    collection: String,
    state: Arc<Mutex<ChannelState>>,
}

impl<S: DocumentStore, K: SnapshotSink> SyncChannel<S, K> {
    /// Creates an idle channel over `collection`.
    pub fn new(store: Arc<S>, sink: Arc<K>, collection: impl Into<String>) -> Self {
        Self {
            store,
            sink,
            collection: collection.into(),
            state: Arc::new(Mutex::new(ChannelState::default())),
        }
    }

    /// Opens a subscription for `owner`, closing any prior one first.
    ///
    /// Returns a detached handle (and subscribes to nothing) if `owner` is
    /// empty, if the store rejects the subscription, or if another
    /// `open`/`close` superseded this one while it was subscribing.
    /// Store failures are logged and reported through
    /// [`SnapshotSink::sync_lost`].
    pub async fn open(&self, owner: &OwnerId) -> SubscriptionHandle {
        let (generation, prior) = {
            let mut state = self.state.lock();
            let prior = state.supersede();
            (state.generation, prior)
        };
        if let Some(prior) = prior {
            tracing::debug!(prior = %prior.owner, next = %owner, "replacing live subscription");
            prior.release();
        }

        if owner.is_empty() {
            tracing::warn!(error = %SyncError::MissingOwner, "sync channel not opened");
            return SubscriptionHandle::detached();
        }

        let stream = match self.store.subscribe(&self.collection, owner).await {
            Ok(stream) => stream,
            Err(e) => {
                let err = SyncError::Subscribe(e);
                tracing::warn!(%owner, error = %err, "sync channel failed to open");
                let state = self.state.lock();
                if state.generation == generation {
                    self.sink.sync_lost(owner, &err);
                }
                return SubscriptionHandle::detached();
            }
        };
        let (updates, registration) = stream.into_parts();

        let mut state = self.state.lock();
        if state.generation != generation {
            drop(state);
            tracing::debug!(%owner, "open superseded while subscribing");
            registration.remove();
            return SubscriptionHandle::detached();
        }
        let pump = tokio::spawn(pump(
            updates,
            owner.clone(),
            generation,
            Arc::clone(&self.state),
            Arc::clone(&self.sink),
        ));
        state.active = Some(ActiveSubscription {
            generation,
            owner: owner.clone(),
            registration,
            pump,
        });
        drop(state);

        tracing::info!(%owner, generation, collection = %self.collection, "sync channel open");
        SubscriptionHandle {
            generation,
            owner: Some(owner.clone()),
        }
    }

    /// Closes the subscription identified by `handle`.
    ///
    /// Idempotent: closing a detached, already-closed or replaced handle is
    /// a no-op. Returns `true` if a live subscription was released.
    pub fn close(&self, handle: &SubscriptionHandle) -> bool {
        if handle.is_detached() {
            return false;
        }
        let released = {
            let mut state = self.state.lock();
            if state.generation != handle.generation {
                return false;
            }
            state.supersede()
        };
        released.is_some_and(|active| {
            active.release();
            true
        })
    }

    /// Closes whatever subscription is live and cancels any in-flight
    /// `open`. Returns `true` if a live subscription was released.
    pub fn close_current(&self) -> bool {
        let released = self.state.lock().supersede();
        released.is_some_and(|active| {
            active.release();
            true
        })
    }

    /// Whether `handle` is the live subscription.
    #[must_use]
    pub fn is_live(&self, handle: &SubscriptionHandle) -> bool {
        self.state.lock().is_live(handle.generation)
    }

    /// Owner of the live subscription, if any.
    #[must_use]
    pub fn active_owner(&self) -> Option<OwnerId> {
        self.state.lock().active.as_ref().map(|a| a.owner.clone())
    }
}

impl<S: DocumentStore, K: SnapshotSink> Drop for SyncChannel<S, K> {
    fn drop(&mut self) {
        self.close_current();
    }
}

/// Background task: turns pushes into snapshots while `generation` is live.
async fn pump<K: SnapshotSink>(
    mut updates: mpsc::UnboundedReceiver<PushUpdate>,
    owner: OwnerId,
    generation: u64,
    state: Arc<Mutex<ChannelState>>,
    sink: Arc<K>,
) {
    while let Some(update) = updates.recv().await {
        let guard = state.lock();
        if !guard.is_live(generation) {
            tracing::debug!(%owner, generation, "dropping push from superseded subscription");
            return;
        }
        match update {
            Ok(documents) => {
                let snapshot = snapshot_from_documents(&owner, &documents);
                tracing::trace!(%owner, tasks = snapshot.len(), "snapshot");
                sink.publish(&owner, snapshot);
            }
            Err(e) => {
                let err = SyncError::Stream(e);
                tracing::warn!(%owner, error = %err, "sync lost");
                sink.sync_lost(&owner, &err);
                return;
            }
        }
    }

    let guard = state.lock();
    if guard.is_live(generation) {
        tracing::warn!(%owner, error = %SyncError::StreamClosed, "sync lost");
        sink.sync_lost(&owner, &SyncError::StreamClosed);
    }
}

/// Builds a snapshot from one push, in arrival order.
///
/// Documents that fail to decode, or that belong to a different owner,
/// are dropped with a warning.
#[must_use]
pub fn snapshot_from_documents(owner: &OwnerId, documents: &[Document]) -> Snapshot {
    let tasks = documents
        .iter()
        .filter_map(|doc| match doc.to_task() {
            Ok(task) if task.owner_id == *owner => Some(task),
            Ok(task) => {
                tracing::warn!(id = %doc.id, expected = %owner, actual = %task.owner_id,
                    "dropping document owned by another identity");
                None
            }
            Err(e) => {
                tracing::warn!(id = %doc.id, error = %e, "dropping malformed document");
                None
            }
        })
        .collect();
    Snapshot::from_arrival(tasks)
}
