//! In-memory backend client
//!
//! Keeps objects in a process-local map. Used for tests and for running the
//! object server without a sproxyd deployment.

use crate::backend::{BackendClient, ByteRange, ClientFactory};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sproxyd_common::{BackendTimeouts, Error, ObjectMetadata, PolicyIndex, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Backend client storing objects in memory
#[derive(Default)]
pub struct MemoryClient {
    endpoints: Vec<String>,
    objects: RwLock<HashMap<String, (Bytes, ObjectMetadata)>>,
}

impl MemoryClient {
    #[must_use]
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored objects
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }
}

#[async_trait]
impl BackendClient for MemoryClient {
    fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn get_object(&self, name: &str, range: Option<ByteRange>) -> Result<Bytes> {
        let objects = self.objects.read();
        let (data, _) = objects
            .get(name)
            .ok_or_else(|| Error::ObjectNotFound(name.to_string()))?;

        match range {
            None => Ok(data.clone()),
            Some(range) => {
                let len = data.len() as u64;
                if range.start > range.end || range.start >= len {
                    return Err(Error::invalid_request(format!(
                        "range {range} not satisfiable for {len} bytes"
                    )));
                }
                let end = range.end.min(len - 1);
                let (start, end) = (
                    usize::try_from(range.start).map_err(|e| Error::internal(e.to_string()))?,
                    usize::try_from(end).map_err(|e| Error::internal(e.to_string()))?,
                );
                Ok(data.slice(start..=end))
            }
        }
    }

    async fn put_object(&self, name: &str, data: Bytes, metadata: &ObjectMetadata) -> Result<()> {
        self.objects
            .write()
            .insert(name.to_string(), (data, metadata.clone()));
        Ok(())
    }

    async fn get_meta(&self, name: &str) -> Result<Option<ObjectMetadata>> {
        Ok(self.objects.read().get(name).map(|(_, meta)| meta.clone()))
    }

    async fn put_meta(&self, name: &str, metadata: &ObjectMetadata) -> Result<()> {
        let mut objects = self.objects.write();
        let (_, meta) = objects
            .get_mut(name)
            .ok_or_else(|| Error::ObjectNotFound(name.to_string()))?;
        *meta = metadata.clone();
        Ok(())
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        self.objects
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::ObjectNotFound(name.to_string()))
    }
}

/// Builds [`MemoryClient`]s and counts how many it built
#[derive(Debug, Default)]
pub struct MemoryClientFactory {
    created: AtomicUsize,
}

impl MemoryClientFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of clients built so far
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientFactory for MemoryClientFactory {
    async fn create(
        &self,
        _policy: PolicyIndex,
        endpoints: Vec<String>,
        _timeouts: BackendTimeouts,
    ) -> Result<Arc<dyn BackendClient>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryClient::new(endpoints)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_client() {
        let client = MemoryClient::new(vec!["mem://".into()]);
        let meta = ObjectMetadata::from([("k".to_string(), "v".to_string())]);

        client
            .put_object("o", Bytes::from_static(b"0123456789"), &meta)
            .await
            .unwrap();
        assert_eq!(client.object_count(), 1);
        assert_eq!(client.get_meta("o").await.unwrap(), Some(meta));
        assert_eq!(
            client.get_object("o", Some(ByteRange::new(8, 20))).await.unwrap(),
            Bytes::from_static(b"89")
        );
        assert!(
            client
                .get_object("o", Some(ByteRange::new(10, 12)))
                .await
                .is_err()
        );

        client.delete_object("o").await.unwrap();
        assert!(client.get_meta("o").await.unwrap().is_none());
        assert!(client.put_meta("o", &ObjectMetadata::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_factory_counts() {
        let factory = MemoryClientFactory::new();
        let client = factory
            .create(
                PolicyIndex::new(1),
                vec!["http://a/".into(), "http://b/".into()],
                BackendTimeouts::default(),
            )
            .await
            .unwrap();
        assert_eq!(factory.created(), 1);
        assert_eq!(client.endpoints(), ["http://a/", "http://b/"]);
    }
}
