//! Task entity model, snapshot ordering and document codec for `Taskflow`.

pub mod document;
pub mod snapshot;
pub mod task;
