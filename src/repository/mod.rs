//! Repository adapters bundled with the service

pub mod memory;

pub use memory::{GraphSnapshot, InMemoryRepository, RepositoryStats};
