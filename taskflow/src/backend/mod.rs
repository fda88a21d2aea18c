//! Interfaces to the managed backend.
//!
//! The core never talks to a concrete backend SDK. It consumes two
//! collaborator traits:
//! - [`IdentityService`]: sign-in, sign-up, sign-out, restored session
//! - [`DocumentStore`]: owner-filtered push subscriptions and document CRUD
//!
//! [`memory`] provides in-process implementations of both, used by the
//! interactive shell and by tests.

pub mod memory;

use std::fmt;

use tokio::sync::mpsc;

use taskflow_proto::document::Document;
use taskflow_proto::task::{FieldDelta, OwnerId, TaskFields, TaskId};

/// Errors reported by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Email or password did not match an account.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Email or password was blank.
    #[error("email and password are required")]
    MissingCredentials,

    /// An account already exists for this email.
    #[error("email already registered")]
    EmailInUse,

    /// Password does not meet the service's strength rule.
    #[error("password too weak (min {min} characters)")]
    WeakPassword {
        /// Minimum accepted length.
        min: usize,
    },

    /// The service answered with an empty identity.
    #[error("identity service returned an empty identity")]
    EmptyIdentity,

    /// The service could not be reached.
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

/// Errors reported by the document store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The caller is not allowed to read or write the target.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The document does not exist.
    #[error("document not found: {0}")]
    NotFound(TaskId),

    /// The document body could not be encoded or decoded.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether repeating the same request later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// One push from a live subscription: the full matching document set in
/// store order, or the error that terminated the stream.
pub type PushUpdate = Result<Vec<Document>, StoreError>;

/// Detaches a push listener from the store.
///
/// `remove` must be idempotent: calling it again after the listener is
/// gone is a no-op.
pub trait ListenerRegistration: Send + Sync {
    /// Stops the store from delivering further pushes to this listener.
    fn remove(&self);
}

/// A live push subscription handed out by [`DocumentStore::subscribe`].
pub struct PushStream {
    updates: mpsc::UnboundedReceiver<PushUpdate>,
    registration: Box<dyn ListenerRegistration>,
}

impl PushStream {
    /// Pairs a push receiver with the registration that detaches it.
    #[must_use]
    pub fn new(
        updates: mpsc::UnboundedReceiver<PushUpdate>,
        registration: Box<dyn ListenerRegistration>,
    ) -> Self {
        Self {
            updates,
            registration,
        }
    }

    /// Splits the stream into its receiver and registration.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedReceiver<PushUpdate>,
        Box<dyn ListenerRegistration>,
    ) {
        (self.updates, self.registration)
    }
}

impl fmt::Debug for PushStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushStream").finish_non_exhaustive()
    }
}

/// Hosted identity provider.
pub trait IdentityService: Send + Sync + 'static {
    /// Signs in with email and password, returning the account identity.
    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<OwnerId, AuthError>> + Send;

    /// Creates an account and signs it in, returning the new identity.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<OwnerId, AuthError>> + Send;

    /// Ends the current session. Never fails.
    fn sign_out(&self);

    /// Identity restored from a prior session, if any.
    fn current_identity(&self) -> Option<OwnerId>;
}

/// Remote document database with realtime listeners.
///
/// # Invariant
///
/// A subscription only ever delivers documents whose owner equals the
/// owner it was opened for.
pub trait DocumentStore: Send + Sync + 'static {
    /// Opens a push subscription for all documents in `collection` owned
    /// by `owner`. The store pushes the full matching set once on open and
    /// again after every insert, update or delete that touches it.
    fn subscribe(
        &self,
        collection: &str,
        owner: &OwnerId,
    ) -> impl std::future::Future<Output = Result<PushStream, StoreError>> + Send;

    /// Creates a document and returns its store-assigned id.
    fn create_document(
        &self,
        collection: &str,
        fields: &TaskFields,
    ) -> impl std::future::Future<Output = Result<TaskId, StoreError>> + Send;

    /// Applies a partial update to an existing document.
    fn update_document(
        &self,
        collection: &str,
        id: &TaskId,
        delta: &FieldDelta,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Deletes a document.
    fn delete_document(
        &self,
        collection: &str,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
