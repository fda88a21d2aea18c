//! Task entity model for Taskflow.
//!
//! Defines the canonical task shape, its identity types, the priority
//! ordering used by snapshots, and title validation. Everything here is a
//! plain value: no I/O, no clocks, no shared state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identity of the authenticated user that owns a task.
///
/// An empty `OwnerId` stands for "no identity" and must never be used to
/// open a subscription or tag a new document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner identity from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this identity.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this identity is empty or whitespace only.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque document identifier assigned by the store when a task is created.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps a store-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority. Snapshots list higher priorities first.
///
/// Stored documents carry the numeric [`level`](Priority::level), not the
/// variant name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    /// Default priority.
    #[default]
    Low,
    /// Medium priority.
    Medium,
    /// Urgent.
    High,
}

impl Priority {
    /// Total order used for snapshot sorting: High=2, Medium=1, Low=0.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    /// The 1-based level shown by the priority selector (Low=1 .. High=3).
    #[must_use]
    pub const fn level(self) -> u8 {
        self.rank() + 1
    }

    /// Maps a 1-based selector level back to a priority.
    #[must_use]
    pub const fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.level()
    }
}

/// Error returned when a stored priority level is outside 1-3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid priority level: {0}")]
pub struct InvalidPriorityLevel(pub u8);

impl TryFrom<u8> for Priority {
    type Error = InvalidPriorityLevel;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_level(level).ok_or(InvalidPriorityLevel(level))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Error returned when a priority string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority: {0} (expected low, medium, high or 1-3)")]
pub struct ParsePriorityError(String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" | "1" => Ok(Self::Low),
            "medium" | "m" | "2" => Ok(Self::Medium),
            "high" | "h" | "3" => Ok(Self::High),
            other => Err(ParsePriorityError(other.to_string())),
        }
    }
}

/// Returns the sort rank of a priority. See [`Priority::rank`].
#[must_use]
pub const fn priority_rank(priority: Priority) -> u8 {
    priority.rank()
}

/// Errors produced by task validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Title is empty after trimming whitespace.
    #[error("task title cannot be empty")]
    TitleEmpty,
}

/// A task title that has passed validation (trimmed, non-empty).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedTitle(String);

impl NormalizedTitle {
    /// Returns the normalized title text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper, returning the title text.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validates a user-supplied title.
///
/// # Errors
///
/// Returns [`ValidationError::TitleEmpty`] if the title is empty after
/// trimming surrounding whitespace.
pub fn validate(title: &str) -> Result<NormalizedTitle, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    Ok(NormalizedTitle(trimmed.to_string()))
}

/// A task as observed by the client.
///
/// Tasks are value snapshots of server-confirmed state. `id` is `None`
/// only for a task that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Store-assigned identifier.
    pub id: Option<TaskId>,
    /// Task title.
    pub title: String,
    /// Whether the task has been completed.
    pub completed: bool,
    /// Task priority.
    pub priority: Priority,
    /// Identity of the owning user.
    pub owner_id: OwnerId,
}

impl Task {
    /// Builds a task from a stored document's identifier and body.
    #[must_use]
    pub fn from_document(id: TaskId, fields: TaskFields) -> Self {
        Self {
            id: Some(id),
            title: fields.title,
            completed: fields.completed,
            priority: fields.priority,
            owner_id: fields.owner_id,
        }
    }

    /// Returns the document body for this task.
    #[must_use]
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            title: self.title.clone(),
            completed: self.completed,
            priority: self.priority,
            owner_id: self.owner_id.clone(),
        }
    }
}

/// The stored body of a task document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFields {
    /// Task title.
    pub title: String,
    /// Completion flag.
    pub completed: bool,
    /// Task priority.
    pub priority: Priority,
    /// Owning identity, used by the store's subscription filter.
    pub owner_id: OwnerId,
}

impl TaskFields {
    /// Body for a freshly created task: not completed.
    #[must_use]
    pub fn new(title: NormalizedTitle, priority: Priority, owner_id: OwnerId) -> Self {
        Self {
            title: title.into_inner(),
            completed: false,
            priority,
            owner_id,
        }
    }

    /// Applies a partial update in place.
    pub fn apply(&mut self, delta: &FieldDelta) {
        match delta {
            FieldDelta::Completed(completed) => self.completed = *completed,
            FieldDelta::Title(title) => self.title.clone_from(title),
        }
    }
}

/// A partial update to a single field of a task document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldDelta {
    /// Set the completion flag.
    Completed(bool),
    /// Replace the title.
    Title(String),
}
