//! Backend client registry
//!
//! Maps a storage policy index to the backend client serving it. Clients are
//! built on first use and then kept for the life of the process.

use dashmap::DashMap;
use sproxyd_client::{BackendClient, ClientFactory};
use sproxyd_common::{BackendTimeouts, Error, PolicyIndex, Result};
use sproxyd_policy::{Intent, PolicyConfiguration};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

type ClientCell = Arc<OnceCell<Arc<dyn BackendClient>>>;

/// Registry of backend clients, one per storage policy
///
/// Each policy gets its own once-cell, so concurrent first requests for a
/// policy share a single construction while constructions for different
/// policies run independently. A cell is only ever filled once; a failed
/// construction leaves it empty for the next request to retry.
pub struct ClientRegistry {
    factory: Arc<dyn ClientFactory>,
    /// Endpoints of policy 0, taken from the server configuration
    default_endpoints: Vec<String>,
    /// Parsed policy document, `None` if none was found at startup
    policies: Option<Arc<PolicyConfiguration>>,
    timeouts: BackendTimeouts,
    clients: DashMap<PolicyIndex, ClientCell>,
}

impl ClientRegistry {
    /// Create a registry
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        default_endpoints: Vec<String>,
        policies: Option<Arc<PolicyConfiguration>>,
        timeouts: BackendTimeouts,
    ) -> Self {
        if let Some(policies) = &policies {
            if policies.get_policy(PolicyIndex::DEFAULT).is_ok() {
                warn!("Policy 0 in the storage policy configuration is ignored, sproxyd_host serves it");
            }
        }

        Self {
            factory,
            default_endpoints,
            policies,
            timeouts,
            clients: DashMap::new(),
        }
    }

    /// Get the client for `policy`, building it on first use
    pub async fn get_or_create(&self, policy: PolicyIndex) -> Result<Arc<dyn BackendClient>> {
        // Fast path: client already built
        if let Some(client) = self.get(policy) {
            return Ok(client);
        }

        // Resolve before touching the map so unknown policies leave no entry
        let endpoints = self.endpoints_for(policy)?;
        let cell = self.clients.entry(policy).or_default().clone();
        cell.get_or_try_init(|| self.create(policy, endpoints))
            .await
            .cloned()
    }

    /// Get the client for `policy` if it has been built
    pub fn get(&self, policy: PolicyIndex) -> Option<Arc<dyn BackendClient>> {
        self.clients
            .get(&policy)
            .and_then(|cell| cell.get().cloned())
    }

    /// Endpoints a client for `policy` is bound to, in the order they are tried
    pub fn endpoints_for(&self, policy: PolicyIndex) -> Result<Vec<String>> {
        if policy.is_default() {
            return Ok(self.default_endpoints.clone());
        }

        let policies = self.policies.as_ref().ok_or_else(|| {
            Error::configuration(format!(
                "no storage policy configuration found, but request for policy {policy}"
            ))
        })?;

        // TODO: separate read and write clients, and pass location hints
        let groups = policies
            .get_policy(policy)?
            .lookup::<&str>(Intent::Write, &[]);
        Ok(groups.into_iter().flatten().collect())
    }

    /// Policies that currently have a client
    pub fn cached_policies(&self) -> Vec<PolicyIndex> {
        let mut policies: Vec<_> = self
            .clients
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| *entry.key())
            .collect();
        policies.sort_unstable();
        policies
    }

    async fn create(
        &self,
        policy: PolicyIndex,
        endpoints: Vec<String>,
    ) -> Result<Arc<dyn BackendClient>> {
        let count = endpoints.len();
        let client = self.factory.create(policy, endpoints, self.timeouts).await?;
        info!(policy = %policy, "Created backend client over {} endpoints", count);
        Ok(client)
    }
}
