//! Integration tests for the session controller: login, live snapshots,
//! mutations flowing back through the sync channel, and logout.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::similar_names)]

use std::sync::Arc;
use std::time::Duration;

use taskflow::backend::DocumentStore;
use taskflow::backend::memory::{MemoryDocumentStore, MemoryIdentity};
use taskflow::notify::RecordingNotifier;
use taskflow::session::{LOGIN_ERROR_MESSAGE, LoginState, SessionConfig, SessionController, SessionView};
use taskflow_proto::task::{OwnerId, Priority, TaskFields, validate};

const TASKS: &str = "tasks";

type Controller = SessionController<MemoryIdentity, MemoryDocumentStore, Arc<RecordingNotifier>>;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

struct World {
    identity: Arc<MemoryIdentity>,
    store: Arc<MemoryDocumentStore>,
    notifier: Arc<RecordingNotifier>,
}

impl World {
    fn new() -> Self {
        Self {
            identity: Arc::new(MemoryIdentity::new()),
            store: Arc::new(MemoryDocumentStore::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    async fn controller(&self) -> Controller {
        SessionController::start(
            Arc::clone(&self.identity),
            Arc::clone(&self.store),
            Arc::clone(&self.notifier),
            SessionConfig::default(),
        )
        .await
    }

    /// Writes a document straight into the store, as another device would.
    async fn remote_insert(&self, owner: &OwnerId, title: &str, priority: Priority) {
        let fields = TaskFields::new(validate(title).unwrap(), priority, owner.clone());
        self.store.create_document(TASKS, &fields).await.unwrap();
    }
}

/// Waits until the controller's view satisfies `pred`, returning it.
async fn wait_for_view(controller: &Controller, pred: impl FnMut(&SessionView) -> bool) -> SessionView {
    let mut rx = controller.subscribe();
    let view = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for view")
        .expect("view channel closed");
    view.clone()
}

fn titles(view: &SessionView) -> Vec<&str> {
    view.tasks.iter().map(|t| t.title.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Login and end-to-end flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_add_toggle_delete_round_trip() {
    let world = World::new();
    let owner = world.identity.add_account("u@example.com", "secret1");
    let controller = world.controller().await;

    let signed_in = controller.login("u@example.com", "secret1").await.unwrap();
    assert_eq!(signed_in, owner);
    assert_eq!(world.store.listener_count(), 1);

    world.remote_insert(&owner, "Buy milk", Priority::Medium).await;
    let view = wait_for_view(&controller, |v| v.tasks.len() == 1).await;
    let task = &view.tasks[0];
    assert_eq!(task.title, "Buy milk");
    assert!(!task.completed);
    assert_eq!(task.priority, Priority::Medium);
    assert_eq!(task.owner_id, owner);

    controller.toggle(task).await.unwrap();
    let view = wait_for_view(&controller, |v| v.tasks.first().is_some_and(|t| t.completed)).await;
    assert_eq!(view.tasks.len(), 1);
    assert_eq!(view.tasks[0].priority, Priority::Medium);

    controller.delete(&view.tasks[0]).await.unwrap();
    let view = wait_for_view(&controller, |v| v.tasks.is_empty()).await;
    assert!(view.login.is_logged_in());
}

#[tokio::test]
async fn snapshot_orders_by_priority_not_creation() {
    let world = World::new();
    world.identity.add_account("u@example.com", "secret1");
    let controller = world.controller().await;
    controller.login("u@example.com", "secret1").await.unwrap();

    controller.add("low", Priority::Low).await.unwrap();
    controller.add("high", Priority::High).await.unwrap();
    controller.add("medium", Priority::Medium).await.unwrap();

    let view = wait_for_view(&controller, |v| v.tasks.len() == 3).await;
    assert_eq!(titles(&view), vec!["high", "medium", "low"]);
}

#[tokio::test]
async fn equal_priorities_keep_arrival_order() {
    let world = World::new();
    world.identity.add_account("u@example.com", "secret1");
    let controller = world.controller().await;
    controller.login("u@example.com", "secret1").await.unwrap();

    for title in ["first", "second", "third"] {
        controller.add(title, Priority::High).await.unwrap();
    }
    controller.add("low", Priority::Low).await.unwrap();
    controller.add("fourth", Priority::High).await.unwrap();

    let view = wait_for_view(&controller, |v| v.tasks.len() == 5).await;
    assert_eq!(titles(&view), vec!["first", "second", "third", "fourth", "low"]);
}

#[tokio::test]
async fn failed_login_stays_logged_out() {
    let world = World::new();
    world.identity.add_account("u@example.com", "secret1");
    let controller = world.controller().await;

    assert!(controller.login("u@example.com", "nope").await.is_err());
    let view = controller.view();
    assert_eq!(view.login, LoginState::LoggedOut);
    assert_eq!(view.login_error, LOGIN_ERROR_MESSAGE);
    assert!(view.tasks.is_empty());
    assert_eq!(world.store.listener_count(), 0);
}

#[tokio::test]
async fn restored_session_shows_existing_tasks() {
    let world = World::new();
    let owner = world.identity.add_account("u@example.com", "secret1");
    world.remote_insert(&owner, "Existing", Priority::Low).await;
    world.identity.restore_session(owner.clone());

    let controller = world.controller().await;
    assert_eq!(controller.login_state(), LoginState::LoggedIn(owner));
    let view = wait_for_view(&controller, |v| v.tasks.len() == 1).await;
    assert_eq!(titles(&view), vec!["Existing"]);
}

// ---------------------------------------------------------------------------
// Logout and account switching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logout_clears_snapshot_and_ignores_later_pushes() {
    let world = World::new();
    let owner = world.identity.add_account("u@example.com", "secret1");
    let controller = world.controller().await;
    controller.login("u@example.com", "secret1").await.unwrap();

    world.remote_insert(&owner, "Mine", Priority::High).await;
    wait_for_view(&controller, |v| v.tasks.len() == 1).await;

    // Queue a push that the pump has not consumed yet, then log out.
    world.remote_insert(&owner, "In flight", Priority::High).await;
    controller.logout().await;
    assert!(controller.snapshot().is_empty());

    world.remote_insert(&owner, "After logout", Priority::High).await;
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    let view = controller.view();
    assert!(view.tasks.is_empty());
    assert_eq!(view.login, LoginState::LoggedOut);
    assert_eq!(world.store.listener_count(), 0);
}

#[tokio::test]
async fn switching_accounts_never_shows_previous_owner() {
    let world = World::new();
    let alice = world.identity.add_account("alice@example.com", "secret1");
    let bob = world.identity.add_account("bob@example.com", "secret2");
    world.remote_insert(&alice, "alice task", Priority::High).await;
    world.remote_insert(&bob, "bob task", Priority::Low).await;

    let controller = world.controller().await;
    controller.login("alice@example.com", "secret1").await.unwrap();
    wait_for_view(&controller, |v| v.tasks.len() == 1).await;

    let mut rx = controller.subscribe();
    controller.login("bob@example.com", "secret2").await.unwrap();
    world.remote_insert(&alice, "alice again", Priority::High).await;

    let view = tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|v| v.tasks.iter().any(|t| t.title == "bob task")),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();
    assert!(view.tasks.iter().all(|t| t.owner_id == bob));

    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    assert!(controller.snapshot().iter().all(|t| t.owner_id == bob));
    assert_eq!(world.store.listener_count(), 1);
}

#[tokio::test]
async fn register_then_add_notifies() {
    let world = World::new();
    let controller = world.controller().await;
    controller.register("new@example.com", "secret1").await.unwrap();

    controller.add("Ship it", Priority::High).await.unwrap();
    wait_for_view(&controller, |v| v.tasks.len() == 1).await;

    let sent = world.notifier.notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "New task");
    assert_eq!(sent[0].body, "Priority: high - Ship it");
}
