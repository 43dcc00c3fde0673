//! Sproxyd Client - Backend storage clients
//!
//! This crate provides the [`BackendClient`] abstraction used by the DiskFile
//! layer, the sproxyd HTTP implementation and an in-memory implementation.

pub mod backend;
pub mod memory;
pub mod sproxyd;

// Re-exports
pub use backend::{BackendClient, ByteRange, ClientFactory};
pub use memory::{MemoryClient, MemoryClientFactory};
pub use sproxyd::{SproxydClient, SproxydClientFactory};
