//! Object gateway
//!
//! Entry point of the object server: resolves the backend client for a
//! request's storage policy and hands out DiskFiles bound to it.

use crate::async_update::{AsyncUpdateDispatcher, AsyncUpdateRequest};
use crate::registry::ClientRegistry;
use sproxyd_common::{PolicySelector, Result};
use sproxyd_diskfile::{DiskFile, DiskFileManager};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Suffix hashes answered to a `REPLICATE` request
pub type SuffixHashes = BTreeMap<String, String>;

pub struct ObjectGateway {
    registry: Arc<ClientRegistry>,
    diskfiles: DiskFileManager,
    updater: AsyncUpdateDispatcher,
}

impl ObjectGateway {
    pub fn new(registry: Arc<ClientRegistry>, updater: AsyncUpdateDispatcher) -> Self {
        Self {
            registry,
            diskfiles: DiskFileManager::new(),
            updater,
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Get a DiskFile for `/<account>/<container>/<obj>` under `policy`
    ///
    /// An unspecified policy means policy 0. Configuration and policy lookup
    /// failures are returned as is.
    pub async fn get_diskfile(
        &self,
        device: &str,
        partition: &str,
        account: &str,
        container: &str,
        obj: &str,
        policy: PolicySelector,
    ) -> Result<DiskFile> {
        let policy = policy.normalize();
        debug!(
            policy = %policy,
            "DiskFile for /{}/{}/{}/{}/{}",
            device, partition, account, container, obj
        );

        let client = self.registry.get_or_create(policy).await?;
        Ok(self
            .diskfiles
            .get_diskfile(client, account, container, obj))
    }

    /// Tell the container server about an object change; failures are only logged
    pub async fn async_update(&self, request: AsyncUpdateRequest) {
        self.updater.notify(request).await;
    }

    /// Replication is a no-op: objects live in sproxyd, not in local
    /// partitions, so there are never suffix hashes to report.
    #[must_use]
    pub fn replicate(
        &self,
        device: &str,
        partition: &str,
        suffixes: &[String],
        policy: PolicySelector,
    ) -> SuffixHashes {
        debug!(
            policy = %policy.normalize(),
            "Ignoring REPLICATE of {}/{} ({} suffixes)",
            device,
            partition,
            suffixes.len()
        );
        SuffixHashes::new()
    }
}
