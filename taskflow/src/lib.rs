//! `Taskflow`: personal task list kept in sync with a managed document store.

pub mod backend;
pub mod commands;
pub mod config;
pub mod focus;
pub mod notify;
pub mod session;
pub mod shell;
pub mod sync;
