//! Memory backends for handoff.

pub mod file_backend;
pub mod in_memory;
pub mod noop;
pub mod recall;

pub use file_backend::FileBackend;
pub use in_memory::InMemoryBackend;
pub use noop::NoopMemory;

/// How many entries a digest holds unless configured otherwise.
pub const DEFAULT_RECALL_LIMIT: usize = 5;
