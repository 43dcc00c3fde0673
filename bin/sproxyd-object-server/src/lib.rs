//! Sproxyd object server
//!
//! A Swift object server whose objects live in sproxyd rings. Every request
//! carries a storage policy index; the [`ClientRegistry`] maps it to a
//! backend client over that policy's endpoints and the [`ObjectGateway`]
//! hands out DiskFiles bound to that client.

pub mod async_update;
pub mod gateway;
pub mod registry;
pub mod server;

pub use async_update::{AsyncUpdateDispatcher, AsyncUpdateRequest};
pub use gateway::{ObjectGateway, SuffixHashes};
pub use registry::ClientRegistry;
pub use server::router;
