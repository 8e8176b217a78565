//! Reference in-memory storage backend.
//!
//! # Modules
//!
//! - [`store`] - Records grouped by entity
//! - [`backend`] - Pipeline execution, generation and including hydration

pub mod backend;
pub mod store;

pub use backend::MemoryBackend;
pub use store::MemoryStore;
