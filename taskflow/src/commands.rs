//! Command dispatcher for task mutations.
//!
//! Validates mutation intents and forwards them to the [`DocumentStore`].
//! Nothing is merged into local state: the resulting change is observed
//! through the next push on the sync channel.
//!
//! Every failure is logged here. Callers get a [`MutationError`] they are
//! free to ignore (fire-and-forget) or act on via
//! [`MutationError::is_retryable`].

use std::sync::Arc;

use taskflow_proto::task::{
    FieldDelta, OwnerId, Priority, Task, TaskFields, TaskId, ValidationError, validate,
};

use crate::backend::{DocumentStore, StoreError};
use crate::notify::{NEW_TASK_TITLE, Notifier};

/// Errors that can occur when dispatching a mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// The intent failed validation; nothing was sent to the store.
    #[error("invalid task: {0}")]
    Validation(#[from] ValidationError),

    /// No signed-in owner to tag the new document with.
    #[error("not signed in")]
    NotAuthenticated,

    /// The store rejected or failed the request.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl MutationError {
    /// Whether reissuing the same command later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Validation(_) | Self::NotAuthenticated => false,
        }
    }
}

/// A mutation intent, for deferred or spawned dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a task.
    Add {
        /// Raw title as typed by the user.
        title: String,
        /// Requested priority.
        priority: Priority,
    },
    /// Flip a task's completion flag.
    Toggle(Task),
    /// Replace a task's title.
    Rename {
        /// Task as currently displayed.
        task: Task,
        /// Raw new title.
        title: String,
    },
    /// Delete a task.
    Delete(Task),
}

/// Forwards validated mutations to the document store.
pub struct CommandDispatcher<S: DocumentStore, N: Notifier> {
    store: Arc<S>,
    notifier: N,
    collection: String,
}

impl<S: DocumentStore, N: Notifier> CommandDispatcher<S, N> {
    /// Creates a dispatcher writing to `collection`.
    pub fn new(store: Arc<S>, notifier: N, collection: impl Into<String>) -> Self {
        Self {
            store,
            notifier,
            collection: collection.into(),
        }
    }

    /// Creates a task owned by `owner`, then raises a "new task" alert.
    ///
    /// Returns once the store has accepted the document; it does not wait
    /// for the sync channel to reflect it.
    ///
    /// # Errors
    ///
    /// - [`MutationError::Validation`] if the title is blank (nothing is
    ///   created and no alert is raised)
    /// - [`MutationError::NotAuthenticated`] if `owner` is empty
    /// - [`MutationError::Store`] if the store fails the create
    pub async fn add(
        &self,
        owner: &OwnerId,
        title: &str,
        priority: Priority,
    ) -> Result<TaskId, MutationError> {
        let title = validate(title).inspect_err(|e| {
            tracing::debug!(error = %e, "add dropped");
        })?;
        if owner.is_empty() {
            tracing::warn!("add rejected: no signed-in owner");
            return Err(MutationError::NotAuthenticated);
        }

        let body = format!("Priority: {priority} - {title}");
        let fields = TaskFields::new(title, priority, owner.clone());
        let id = self
            .store
            .create_document(&self.collection, &fields)
            .await
            .inspect_err(|e| tracing::warn!(%owner, error = %e, "create task failed"))?;

        tracing::info!(task_id = %id, %priority, "task created");
        self.notifier.notify(NEW_TASK_TITLE, &body);
        Ok(id)
    }

    /// Sets `completed` to the opposite of the value `task` carries.
    ///
    /// The target is written as an absolute value, so two toggles issued
    /// from the same displayed task converge instead of cancelling out.
    /// No-op if the task has no id yet.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Store`] if the store fails the update.
    pub async fn toggle(&self, task: &Task) -> Result<(), MutationError> {
        let Some(id) = &task.id else {
            tracing::debug!("toggle ignored: task not persisted");
            return Ok(());
        };
        let completed = !task.completed;
        self.store
            .update_document(&self.collection, id, &FieldDelta::Completed(completed))
            .await
            .inspect_err(|e| tracing::warn!(task_id = %id, error = %e, "toggle failed"))?;
        tracing::debug!(task_id = %id, completed, "task toggled");
        Ok(())
    }

    /// Replaces a task's title. No-op if the task has no id yet.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Validation`] for a blank title, or
    /// [`MutationError::Store`] if the store fails the update.
    pub async fn rename(&self, task: &Task, title: &str) -> Result<(), MutationError> {
        let title = validate(title)?;
        let Some(id) = &task.id else {
            tracing::debug!("rename ignored: task not persisted");
            return Ok(());
        };
        self.store
            .update_document(&self.collection, id, &FieldDelta::Title(title.into_inner()))
            .await
            .inspect_err(|e| tracing::warn!(task_id = %id, error = %e, "rename failed"))?;
        Ok(())
    }

    /// Deletes a task by id. No-op if the task has no id yet.
    ///
    /// # Errors
    ///
    /// Returns [`MutationError::Store`] if the store fails the delete.
    pub async fn delete(&self, task: &Task) -> Result<(), MutationError> {
        let Some(id) = &task.id else {
            tracing::debug!("delete ignored: task not persisted");
            return Ok(());
        };
        self.store
            .delete_document(&self.collection, id)
            .await
            .inspect_err(|e| tracing::warn!(task_id = %id, error = %e, "delete failed"))?;
        tracing::debug!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Dispatches a [`Command`] on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns whatever the underlying operation returns.
    pub async fn execute(&self, owner: &OwnerId, command: Command) -> Result<(), MutationError> {
        match command {
            Command::Add { title, priority } => self.add(owner, &title, priority).await.map(|_| ()),
            Command::Toggle(task) => self.toggle(&task).await,
            Command::Rename { task, title } => self.rename(&task, &title).await,
            Command::Delete(task) => self.delete(&task).await,
        }
    }
}
