//! DiskFile manager

use crate::diskfile::DiskFile;
use sproxyd_client::BackendClient;
use std::sync::Arc;

/// Hands out [`DiskFile`]s bound to a backend client
///
/// The manager holds no per-object state; the client passed in decides which
/// backend endpoints serve the object.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiskFileManager;

impl DiskFileManager {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Get a handle over `/<account>/<container>/<obj>` served by `client`
    #[must_use]
    pub fn get_diskfile(
        &self,
        client: Arc<dyn BackendClient>,
        account: &str,
        container: &str,
        obj: &str,
    ) -> DiskFile {
        DiskFile::new(client, account, container, obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diskfile::object_key;
    use sproxyd_client::MemoryClient;

    #[test]
    fn test_get_diskfile_binds_client() {
        let client: Arc<dyn BackendClient> = Arc::new(MemoryClient::new(vec!["mem://".into()]));
        let df = DiskFileManager::new().get_diskfile(client.clone(), "a", "c", "o");
        assert!(Arc::ptr_eq(df.client(), &client));
        assert_eq!(df.name(), object_key("a", "c", "o"));
    }
}
