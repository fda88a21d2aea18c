//! Session-scoped state controller.
//!
//! Owns the login state machine and the observable [`SessionView`]:
//!
//! ```text
//!            login / register ok
//! LoggedOut ─────────────────────► LoggedIn(owner) ──► sync channel open
//!     ▲                                   │
//!     └──────────── logout ◄──────────────┘  channel closed, tasks emptied
//! ```
//!
//! The view is only written by sync channel emissions and by explicit
//! transitions. Mutations pass straight through to the
//! [`CommandDispatcher`]; their effect shows up in the next emission.

use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;

use taskflow_proto::snapshot::Snapshot;
use taskflow_proto::task::{OwnerId, Priority, Task, TaskId};

use crate::backend::{AuthError, DocumentStore, IdentityService};
use crate::commands::{Command, CommandDispatcher, MutationError};
use crate::notify::Notifier;
use crate::sync::{SnapshotSink, SyncChannel, SyncError};

/// Shown after any failed sign-in, whatever the cause.
pub const LOGIN_ERROR_MESSAGE: &str = "Login failed.";

/// Shown after any failed sign-up, whatever the cause.
pub const REGISTER_ERROR_MESSAGE: &str = "Registration failed.";

/// Default document collection for tasks.
pub const DEFAULT_COLLECTION: &str = "tasks";

/// Authentication state of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoginState {
    /// No authenticated identity.
    #[default]
    LoggedOut,
    /// Signed in as the given owner.
    LoggedIn(OwnerId),
}

impl LoginState {
    /// Whether an identity is signed in.
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        matches!(self, Self::LoggedIn(_))
    }

    /// The signed-in owner, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<&OwnerId> {
        match self {
            Self::LoggedIn(owner) => Some(owner),
            Self::LoggedOut => None,
        }
    }
}

/// Everything the UI layer observes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    /// Current login state.
    pub login: LoginState,
    /// Latest snapshot for the signed-in owner; empty while logged out.
    pub tasks: Snapshot,
    /// Last auth failure message; empty when there is none.
    pub login_error: String,
    /// Set when the live subscription failed and `tasks` is stale.
    pub sync_lost: bool,
}

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Document collection holding tasks.
    pub collection: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

/// Writes sync channel emissions into the observable view.
///
/// Emissions for any owner other than the signed-in one are discarded.
#[derive(Debug)]
pub struct ViewPublisher {
    tx: watch::Sender<SessionView>,
}

impl ViewPublisher {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionView::default());
        Self { tx }
    }
}

impl SnapshotSink for ViewPublisher {
    fn publish(&self, owner: &OwnerId, snapshot: Snapshot) {
        self.tx.send_if_modified(|view| {
            if view.login.owner() != Some(owner) {
                tracing::debug!(%owner, "discarding snapshot for inactive owner");
                return false;
            }
            let changed = view.tasks != snapshot || view.sync_lost;
            view.tasks = snapshot;
            view.sync_lost = false;
            changed
        });
    }

    fn sync_lost(&self, owner: &OwnerId, error: &SyncError) {
        self.tx.send_if_modified(|view| {
            if view.login.owner() != Some(owner) || view.sync_lost {
                return false;
            }
            tracing::warn!(%owner, %error, "task list is stale");
            view.sync_lost = true;
            true
        });
    }
}

/// Drives login state, the sync channel and task mutations for one user
/// session.
pub struct SessionController<I: IdentityService, S: DocumentStore, N: Notifier> {
    identity: Arc<I>,
    channel: SyncChannel<S, ViewPublisher>,
    dispatcher: Arc<CommandDispatcher<S, N>>,
    view: Arc<ViewPublisher>,
    /// Serializes login, register and logout.
    transition: AsyncMutex<()>,
}

impl<I: IdentityService, S: DocumentStore, N: Notifier> SessionController<I, S, N> {
    /// Builds a controller, restoring a prior session if the identity
    /// service still holds one.
    ///
    /// With a restored identity the controller starts `LoggedIn` and the
    /// sync channel is already open when this returns.
    pub async fn start(identity: Arc<I>, store: Arc<S>, notifier: N, config: SessionConfig) -> Self {
        let view = Arc::new(ViewPublisher::new());
        let channel = SyncChannel::new(Arc::clone(&store), Arc::clone(&view), &config.collection);
        let dispatcher = Arc::new(CommandDispatcher::new(store, notifier, config.collection));
        let controller = Self {
            identity,
            channel,
            dispatcher,
            view,
            transition: AsyncMutex::new(()),
        };

        match controller.identity.current_identity() {
            Some(owner) if !owner.is_empty() => {
                tracing::info!(%owner, "restored session");
                controller.enter(owner).await;
            }
            _ => tracing::info!("no session to restore"),
        }
        controller
    }

    /// Signs in and opens the sync channel for the returned identity.
    ///
    /// # Errors
    ///
    /// Returns the identity service's [`AuthError`]. The view's
    /// `login_error` is set to [`LOGIN_ERROR_MESSAGE`] and no channel is
    /// opened.
    pub async fn login(&self, email: &str, password: &str) -> Result<OwnerId, AuthError> {
        let _transition = self.transition.lock().await;
        self.set_login_error("");
        let result = self
            .identity
            .sign_in(email, password)
            .await
            .and_then(non_empty);
        self.complete_auth(result, LOGIN_ERROR_MESSAGE).await
    }

    /// Creates an account, signs it in and opens the sync channel.
    ///
    /// A blank email or password fails without contacting the identity
    /// service.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredentials`] for blank input, or the
    /// identity service's error. The view's `login_error` is set to
    /// [`REGISTER_ERROR_MESSAGE`].
    pub async fn register(&self, email: &str, password: &str) -> Result<OwnerId, AuthError> {
        let _transition = self.transition.lock().await;
        self.set_login_error("");
        let result = if email.trim().is_empty() || password.trim().is_empty() {
            Err(AuthError::MissingCredentials)
        } else {
            self.identity
                .sign_up(email, password)
                .await
                .and_then(non_empty)
        };
        self.complete_auth(result, REGISTER_ERROR_MESSAGE).await
    }

    async fn complete_auth(
        &self,
        result: Result<OwnerId, AuthError>,
        failure_message: &str,
    ) -> Result<OwnerId, AuthError> {
        match result {
            Ok(owner) => {
                tracing::info!(%owner, "signed in");
                self.enter(owner.clone()).await;
                Ok(owner)
            }
            Err(e) => {
                tracing::warn!(error = %e, "authentication failed");
                self.set_login_error(failure_message);
                Err(e)
            }
        }
    }

    /// Closes the sync channel, signs out and empties the task list.
    ///
    /// Once this returns the view shows no tasks, and no emission from the
    /// closed subscription will be published.
    pub async fn logout(&self) {
        let _transition = self.transition.lock().await;
        self.channel.close_current();
        self.identity.sign_out();
        self.view.tx.send_modify(|view| {
            view.login = LoginState::LoggedOut;
            view.tasks = Snapshot::empty();
            view.sync_lost = false;
        });
        tracing::info!("signed out");
    }

    /// Closes the sync channel. The controller stays in its current login
    /// state but receives no further emissions.
    pub fn shutdown(&self) {
        if self.channel.close_current() {
            tracing::debug!("session shut down");
        }
    }

    async fn enter(&self, owner: OwnerId) {
        self.view.tx.send_modify(|view| {
            view.login = LoginState::LoggedIn(owner.clone());
            view.tasks = Snapshot::empty();
            view.sync_lost = false;
        });
        self.channel.open(&owner).await;
    }

    fn set_login_error(&self, message: &str) {
        self.view.tx.send_if_modified(|view| {
            if view.login_error == message {
                return false;
            }
            view.login_error = message.to_string();
            true
        });
    }

    fn current_owner(&self) -> OwnerId {
        self.view
            .tx
            .borrow()
            .login
            .owner()
            .cloned()
            .unwrap_or_default()
    }

    // --- mutations ---

    /// Creates a task for the signed-in owner.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::add`]; fails with
    /// [`MutationError::NotAuthenticated`] while logged out.
    pub async fn add(&self, title: &str, priority: Priority) -> Result<TaskId, MutationError> {
        let owner = self.current_owner();
        self.dispatcher.add(&owner, title, priority).await
    }

    /// Flips a task's completion flag.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::toggle`].
    pub async fn toggle(&self, task: &Task) -> Result<(), MutationError> {
        self.dispatcher.toggle(task).await
    }

    /// Replaces a task's title.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::rename`].
    pub async fn rename(&self, task: &Task, title: &str) -> Result<(), MutationError> {
        self.dispatcher.rename(task, title).await
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// See [`CommandDispatcher::delete`].
    pub async fn delete(&self, task: &Task) -> Result<(), MutationError> {
        self.dispatcher.delete(task).await
    }

    /// Runs a command in the background on behalf of the signed-in owner.
    ///
    /// Dropping the returned handle makes the command fire-and-forget; the
    /// dispatcher logs failures either way.
    pub fn submit(&self, command: Command) -> JoinHandle<Result<(), MutationError>> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let owner = self.current_owner();
        tokio::spawn(async move { dispatcher.execute(&owner, command).await })
    }

    // --- observation ---

    /// Receiver notified on every view change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.tx.subscribe()
    }

    /// A copy of the current view.
    #[must_use]
    pub fn view(&self) -> SessionView {
        self.view.tx.borrow().clone()
    }

    /// The current ordered task list.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.view.tx.borrow().tasks.clone()
    }

    /// The current auth error message, empty if none.
    #[must_use]
    pub fn login_error(&self) -> String {
        self.view.tx.borrow().login_error.clone()
    }

    /// The current login state.
    #[must_use]
    pub fn login_state(&self) -> LoginState {
        self.view.tx.borrow().login.clone()
    }

    /// Whether an identity is signed in.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.view.tx.borrow().login.is_logged_in()
    }

    /// Whether the live subscription has failed.
    #[must_use]
    pub fn is_sync_lost(&self) -> bool {
        self.view.tx.borrow().sync_lost
    }
}

fn non_empty(owner: OwnerId) -> Result<OwnerId, AuthError> {
    if owner.is_empty() {
        Err(AuthError::EmptyIdentity)
    } else {
        Ok(owner)
    }
}
