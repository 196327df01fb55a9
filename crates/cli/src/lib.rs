//! Wiring for the `handoff` binary.
//!
//! [`runtime`] turns an [`handoff_config::AppConfig`] into a ready
//! [`handoff_agent::AgentLoop`]; [`repl`] interprets lines typed into the
//! interactive shell. Both live in the library so integration tests can drive
//! the same stack the binary runs.

pub mod repl;
pub mod runtime;

pub use runtime::{Runtime, build_memory, build_runtime};
