//! Ordered task snapshots.
//!
//! A [`Snapshot`] is the complete, priority-ordered view of one owner's
//! tasks at a point in time. It is rebuilt wholesale from every push
//! update and never patched in place.

use std::cmp::Reverse;
use std::ops::Deref;

use crate::task::Task;

/// A complete, ordered view of the tasks owned by one identity.
///
/// Ordering: priority descending (High, Medium, Low). Tasks of equal
/// priority keep the order in which the push update delivered them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot(Vec<Task>);

impl Snapshot {
    /// The empty snapshot.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Builds a snapshot from tasks in push-update arrival order.
    #[must_use]
    pub fn from_arrival(mut tasks: Vec<Task>) -> Self {
        // `sort_by_key` is stable, so ties keep arrival order.
        tasks.sort_by_key(|t| Reverse(t.priority.rank()));
        Self(tasks)
    }

    /// Consumes the snapshot, returning the ordered tasks.
    #[must_use]
    pub fn into_vec(self) -> Vec<Task> {
        self.0
    }
}

impl Deref for Snapshot {
    type Target = [Task];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
