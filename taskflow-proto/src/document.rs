//! Document body codec.
//!
//! Task documents travel between the client and the document store as
//! postcard-encoded [`TaskFields`]. The store treats the body as opaque
//! bytes apart from the indexed owner field.

use crate::task::{Task, TaskFields, TaskId};

/// Error type for document encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A stored task document: store-assigned id plus encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Store-assigned identifier.
    pub id: TaskId,
    /// Postcard-encoded [`TaskFields`].
    pub body: Vec<u8>,
}

impl Document {
    /// Decodes the body into a [`Task`] carrying this document's id.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Serialization` if the body is malformed.
    pub fn to_task(&self) -> Result<Task, CodecError> {
        let fields = decode_fields(&self.body)?;
        Ok(Task::from_document(self.id.clone(), fields))
    }
}

/// Encodes a document body.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the fields cannot be serialized.
pub fn encode_fields(fields: &TaskFields) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(fields).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a document body.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode_fields(bytes: &[u8]) -> Result<TaskFields, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
