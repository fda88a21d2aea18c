//! In-process backend for the shell and for tests.
//!
//! [`MemoryDocumentStore`] keeps owner-indexed task documents in memory and
//! pushes the full matching set to every live listener whenever one of its
//! documents changes. [`MemoryIdentity`] keeps email/password accounts and
//! the signed-in identity. Both expose fault injection so failure paths can
//! be exercised without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use taskflow_proto::document::{Document, decode_fields, encode_fields};
use taskflow_proto::task::{FieldDelta, OwnerId, TaskFields, TaskId};

use super::{
    AuthError, DocumentStore, IdentityService, ListenerRegistration, PushStream, PushUpdate,
    StoreError,
};

/// Minimum password length accepted by [`MemoryIdentity::sign_up`].
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Clone)]
struct StoredDocument {
    id: TaskId,
    /// Indexed copy of the body's owner, used by the subscription filter.
    owner_id: OwnerId,
    body: Vec<u8>,
}

struct Listener {
    collection: String,
    owner: OwnerId,
    tx: mpsc::UnboundedSender<PushUpdate>,
}

#[derive(Default)]
struct StoreState {
    /// Collection name -> documents in insertion order.
    collections: HashMap<String, Vec<StoredDocument>>,
    listeners: HashMap<u64, Listener>,
    next_listener_id: u64,
    write_failure: Option<StoreError>,
    subscribe_failure: Option<StoreError>,
}

impl StoreState {
    fn matching(&self, collection: &str, owner: &OwnerId) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.owner_id == *owner)
                    .map(|d| Document {
                        id: d.id.clone(),
                        body: d.body.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pushes the current matching set to every listener on
    /// `(collection, owner)`, pruning listeners whose receiver is gone.
    fn push(&mut self, collection: &str, owner: &OwnerId) {
        let documents = self.matching(collection, owner);
        self.listeners.retain(|id, listener| {
            if listener.collection != collection || listener.owner != *owner {
                return true;
            }
            let delivered = listener.tx.send(Ok(documents.clone())).is_ok();
            if !delivered {
                tracing::debug!(listener = id, "pruning listener with dropped receiver");
            }
            delivered
        });
    }

    fn find_mut(&mut self, collection: &str, id: &TaskId) -> Option<&mut StoredDocument> {
        self.collections
            .get_mut(collection)?
            .iter_mut()
            .find(|d| d.id == *id)
    }
}

/// In-memory document store with realtime listeners.
///
/// Thread-safe via [`parking_lot::Mutex`]. Cloning yields another handle to
/// the same store.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live listeners across all collections.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Number of documents in a collection, across all owners.
    #[must_use]
    pub fn document_count(&self, collection: &str) -> usize {
        self.state.lock().collections.get(collection).map_or(0, Vec::len)
    }

    /// Decoded body of a document, if it exists and decodes.
    #[must_use]
    pub fn fields(&self, collection: &str, id: &TaskId) -> Option<TaskFields> {
        let state = self.state.lock();
        let doc = state.collections.get(collection)?.iter().find(|d| d.id == *id)?;
        decode_fields(&doc.body).ok()
    }

    /// Inserts a document with an arbitrary body, bypassing encoding.
    ///
    /// Used to simulate documents written by other clients, including
    /// malformed ones.
    pub fn insert_raw(&self, collection: &str, owner: &OwnerId, body: Vec<u8>) -> TaskId {
        let id = new_document_id();
        let mut state = self.state.lock();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                owner_id: owner.clone(),
                body,
            });
        state.push(collection, owner);
        id
    }

    /// Makes every create/update/delete fail with `error` until cleared.
    pub fn fail_writes(&self, error: Option<StoreError>) {
        self.state.lock().write_failure = error;
    }

    /// Makes every subscribe fail with `error` until cleared.
    pub fn fail_subscriptions(&self, error: Option<StoreError>) {
        self.state.lock().subscribe_failure = error;
    }

    /// Terminates every live listener with `error`.
    pub fn break_listeners(&self, error: &StoreError) {
        let mut state = self.state.lock();
        for (_, listener) in state.listeners.drain() {
            let _ = listener.tx.send(Err(error.clone()));
        }
    }
}

fn new_document_id() -> TaskId {
    TaskId::new(Uuid::now_v7().simple().to_string())
}

impl DocumentStore for MemoryDocumentStore {
    async fn subscribe(&self, collection: &str, owner: &OwnerId) -> Result<PushStream, StoreError> {
        if owner.is_empty() {
            return Err(StoreError::PermissionDenied(
                "subscription requires an owner filter".to_string(),
            ));
        }

        let mut state = self.state.lock();
        if let Some(err) = state.subscribe_failure.clone() {
            return Err(err);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // Initial push with the current matching set.
        let _ = tx.send(Ok(state.matching(collection, owner)));

        let listener_id = state.next_listener_id;
        state.next_listener_id += 1;
        state.listeners.insert(
            listener_id,
            Listener {
                collection: collection.to_string(),
                owner: owner.clone(),
                tx,
            },
        );
        drop(state);

        tracing::debug!(listener = listener_id, %owner, collection, "listener registered");
        let registration = MemoryRegistration {
            state: Arc::downgrade(&self.state),
            listener_id,
        };
        Ok(PushStream::new(rx, Box::new(registration)))
    }

    async fn create_document(
        &self,
        collection: &str,
        fields: &TaskFields,
    ) -> Result<TaskId, StoreError> {
        if fields.owner_id.is_empty() {
            return Err(StoreError::PermissionDenied(
                "document has no owner".to_string(),
            ));
        }
        let body = encode_fields(fields).map_err(|e| StoreError::Malformed(e.to_string()))?;

        let mut state = self.state.lock();
        if let Some(err) = state.write_failure.clone() {
            return Err(err);
        }
        let id = new_document_id();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                owner_id: fields.owner_id.clone(),
                body,
            });
        state.push(collection, &fields.owner_id);
        Ok(id)
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &TaskId,
        delta: &FieldDelta,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(err) = state.write_failure.clone() {
            return Err(err);
        }
        let doc = state
            .find_mut(collection, id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut fields =
            decode_fields(&doc.body).map_err(|e| StoreError::Malformed(e.to_string()))?;
        fields.apply(delta);
        doc.body = encode_fields(&fields).map_err(|e| StoreError::Malformed(e.to_string()))?;
        let owner = doc.owner_id.clone();
        state.push(collection, &owner);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &TaskId) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(err) = state.write_failure.clone() {
            return Err(err);
        }
        let Some(docs) = state.collections.get_mut(collection) else {
            return Ok(());
        };
        let Some(pos) = docs.iter().position(|d| d.id == *id) else {
            // Deleting a missing document is a no-op.
            return Ok(());
        };
        let removed = docs.remove(pos);
        state.push(collection, &removed.owner_id);
        Ok(())
    }
}

/// Registration for a [`MemoryDocumentStore`] listener.
struct MemoryRegistration {
    state: Weak<Mutex<StoreState>>,
    listener_id: u64,
}

impl ListenerRegistration for MemoryRegistration {
    fn remove(&self) {
        if let Some(state) = self.state.upgrade()
            && state.lock().listeners.remove(&self.listener_id).is_some()
        {
            tracing::debug!(listener = self.listener_id, "listener removed");
        }
    }
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    owner: OwnerId,
}

/// In-memory email/password identity service.
#[derive(Debug, Default)]
pub struct MemoryIdentity {
    /// Normalized email -> account.
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<OwnerId>>,
    unavailable: AtomicBool,
}

impl MemoryIdentity {
    /// Creates a service with no accounts and no signed-in user.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account directly, without strength checks or signing in.
    pub fn add_account(&self, email: &str, password: &str) -> OwnerId {
        let owner = OwnerId::new(Uuid::now_v7().simple().to_string());
        self.accounts.lock().insert(
            normalize_email(email),
            Account {
                password: password.to_string(),
                owner: owner.clone(),
            },
        );
        owner
    }

    /// Marks `owner` as signed in, as if restored from a previous run.
    pub fn restore_session(&self, owner: OwnerId) {
        *self.current.lock() = Some(owner);
    }

    /// Makes every sign-in and sign-up fail as unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AuthError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthError::Unavailable("network unreachable".to_string()));
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

impl IdentityService for MemoryIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<OwnerId, AuthError> {
        self.check_available()?;
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let owner = {
            let accounts = self.accounts.lock();
            match accounts.get(&normalize_email(email)) {
                Some(account) if account.password == password => account.owner.clone(),
                _ => return Err(AuthError::InvalidCredentials),
            }
        };
        *self.current.lock() = Some(owner.clone());
        Ok(owner)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<OwnerId, AuthError> {
        self.check_available()?;
        if email.trim().is_empty() || password.trim().is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword {
                min: MIN_PASSWORD_LENGTH,
            });
        }
        let key = normalize_email(email);
        let owner = OwnerId::new(Uuid::now_v7().simple().to_string());
        {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&key) {
                return Err(AuthError::EmailInUse);
            }
            accounts.insert(
                key,
                Account {
                    password: password.to_string(),
                    owner: owner.clone(),
                },
            );
        }
        *self.current.lock() = Some(owner.clone());
        Ok(owner)
    }

    fn sign_out(&self) {
        *self.current.lock() = None;
    }

    fn current_identity(&self) -> Option<OwnerId> {
        self.current.lock().clone()
    }
}
