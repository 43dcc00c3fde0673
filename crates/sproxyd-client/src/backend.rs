//! Backend client abstraction
//!
//! A backend client is a handle over an ordered list of endpoint URLs that
//! stores objects under flat keys. Clients are built by a [`ClientFactory`]
//! and shared as `Arc<dyn BackendClient>`.

use async_trait::async_trait;
use bytes::Bytes;
use sproxyd_common::{BackendTimeouts, ObjectMetadata, PolicyIndex, Result};
use std::fmt;
use std::sync::Arc;

/// Inclusive byte range of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[must_use]
    pub const fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes={}-{}", self.start, self.end)
    }
}

/// Key/value operations against a storage backend
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Endpoints this client talks to, in the order they are tried
    fn endpoints(&self) -> &[String];

    /// Read an object, or part of it
    async fn get_object(&self, name: &str, range: Option<ByteRange>) -> Result<Bytes>;

    /// Store an object together with its metadata
    async fn put_object(&self, name: &str, data: Bytes, metadata: &ObjectMetadata) -> Result<()>;

    /// Read the metadata of an object, `None` if the object does not exist
    async fn get_meta(&self, name: &str) -> Result<Option<ObjectMetadata>>;

    /// Replace the metadata of an existing object
    async fn put_meta(&self, name: &str, metadata: &ObjectMetadata) -> Result<()>;

    /// Delete an object
    async fn delete_object(&self, name: &str) -> Result<()>;
}

/// Builds backend clients for a policy
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Create a client bound to `endpoints`, tried in the given order
    async fn create(
        &self,
        policy: PolicyIndex,
        endpoints: Vec<String>,
        timeouts: BackendTimeouts,
    ) -> Result<Arc<dyn BackendClient>>;
}
