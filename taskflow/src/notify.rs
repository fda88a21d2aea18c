//! Local notification side effects.
//!
//! The core raises a local alert after a task is created. Delivery is
//! fire-and-forget and permission-gated: when the platform has not granted
//! notification permission the alert is dropped silently, never reported
//! as an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Title of the alert raised after a task is created.
pub const NEW_TASK_TITLE: &str = "New task";

/// Surfaces a local alert to the user.
pub trait Notifier: Send + Sync + 'static {
    /// Shows an alert. Must not block and must not fail.
    fn notify(&self, title: &str, body: &str);
}

impl<N: Notifier> Notifier for Arc<N> {
    fn notify(&self, title: &str, body: &str) {
        (**self).notify(title, body);
    }
}

/// Notifier that records alerts in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!(title, body, "notification");
    }
}

/// Wraps a notifier behind a permission flag.
///
/// While permission is not granted, [`notify`](Notifier::notify) is a
/// silent no-op.
#[derive(Debug)]
pub struct PermissionGated<N> {
    inner: N,
    granted: AtomicBool,
}

impl<N: Notifier> PermissionGated<N> {
    /// Wraps `inner` with the given initial permission.
    pub const fn new(inner: N, granted: bool) -> Self {
        Self {
            inner,
            granted: AtomicBool::new(granted),
        }
    }

    /// Grants or revokes notification permission.
    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// Whether notifications are currently delivered.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }
}

impl<N: Notifier> Notifier for PermissionGated<N> {
    fn notify(&self, title: &str, body: &str) {
        if !self.is_granted() {
            tracing::trace!(title, "notification suppressed: permission not granted");
            return;
        }
        self.inner.notify(title, body);
    }
}

/// A notification captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Alert title.
    pub title: String,
    /// Alert body.
    pub body: String,
}

/// Notifier that keeps every alert in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts received so far, oldest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, body: &str) {
        self.sent.lock().push(Notification {
            title: title.to_string(),
            body: body.to_string(),
        });
    }
}
