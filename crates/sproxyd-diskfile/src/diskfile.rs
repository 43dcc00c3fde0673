//! DiskFile handles over a backend client

use bytes::Bytes;
use sha1::{Digest, Sha1};
use sproxyd_client::{BackendClient, ByteRange};
use sproxyd_common::{Error, ObjectMetadata, Result};
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Metadata key holding the expiry time (seconds since the epoch)
pub const DELETE_AT_KEY: &str = "X-Delete-At";
/// Metadata key holding the object timestamp
pub const TIMESTAMP_KEY: &str = "X-Timestamp";
/// Metadata key recording the backend key of the object
pub const NAME_KEY: &str = "name";

/// Backend key of an object: hex SHA-1 over account, container and object
///
/// Hashing keeps characters of the object path out of backend URLs.
#[must_use]
pub fn object_key(account: &str, container: &str, obj: &str) -> String {
    let mut hasher = Sha1::new();
    for part in [account, container, obj] {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Handle over one object stored through a backend client
pub struct DiskFile {
    client: Arc<dyn BackendClient>,
    account: String,
    container: String,
    obj: String,
    name: String,
    metadata: Option<ObjectMetadata>,
}

impl fmt::Debug for DiskFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskFile")
            .field("endpoints", &self.client.endpoints())
            .field("account", &self.account)
            .field("container", &self.container)
            .field("obj", &self.obj)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl DiskFile {
    pub(crate) fn new(client: Arc<dyn BackendClient>, account: &str, container: &str, obj: &str) -> Self {
        Self {
            name: object_key(account, container, obj),
            client,
            account: account.to_string(),
            container: container.to_string(),
            obj: obj.to_string(),
            metadata: None,
        }
    }

    /// Backend key of this object
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Client this handle performs its I/O through
    #[must_use]
    pub const fn client(&self) -> &Arc<dyn BackendClient> {
        &self.client
    }

    /// `/<account>/<container>/<object>`
    #[must_use]
    pub fn path(&self) -> String {
        format!("/{}/{}/{}", self.account, self.container, self.obj)
    }

    /// Open the object and load its metadata
    ///
    /// Fails with `DiskFileDeleted` if the object does not exist and with
    /// `DiskFileExpired` once its `X-Delete-At` has passed.
    pub async fn open(&mut self) -> Result<&ObjectMetadata> {
        let metadata = self
            .client
            .get_meta(&self.name)
            .await?
            .ok_or_else(|| Error::DiskFileDeleted(self.path()))?;

        if let Some(delete_at) = metadata.get(DELETE_AT_KEY) {
            match delete_at.trim().parse::<u64>() {
                Ok(delete_at) if delete_at <= unix_now() => {
                    return Err(Error::DiskFileExpired {
                        name: self.path(),
                        delete_at,
                    });
                }
                Ok(_) => {}
                Err(_) => warn!(
                    "Ignoring invalid {} {:?} on {}",
                    DELETE_AT_KEY,
                    delete_at,
                    self.path()
                ),
            }
        }

        Ok(&*self.metadata.insert(metadata))
    }

    /// Metadata loaded by [`open`](Self::open)
    pub fn metadata(&self) -> Result<&ObjectMetadata> {
        self.metadata.as_ref().ok_or(Error::DiskFileNotOpen)
    }

    /// Open the object and return a copy of its metadata
    pub async fn read_metadata(&mut self) -> Result<ObjectMetadata> {
        self.open().await.cloned()
    }

    /// `X-Timestamp` of the opened object
    pub fn timestamp(&self) -> Result<Option<&str>> {
        Ok(self.metadata()?.get(TIMESTAMP_KEY).map(String::as_str))
    }

    /// Read the object data, or an inclusive byte range of it
    pub async fn read(&self, range: Option<ByteRange>) -> Result<Bytes> {
        self.client.get_object(&self.name, range).await
    }

    /// Store the object data with its metadata
    pub async fn write(&self, data: Bytes, mut metadata: ObjectMetadata) -> Result<()> {
        metadata.insert(NAME_KEY.to_string(), self.name.clone());
        let size = data.len();
        self.client.put_object(&self.name, data, &metadata).await?;
        debug!("Wrote {} bytes for {} as {}", size, self.path(), self.name);
        Ok(())
    }

    /// Replace the metadata of the stored object
    pub async fn write_metadata(&self, metadata: &ObjectMetadata) -> Result<()> {
        self.client.put_meta(&self.name, metadata).await
    }

    /// Delete the stored object
    pub async fn delete(&self) -> Result<()> {
        self.client.delete_object(&self.name).await
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sproxyd_client::MemoryClient;

    fn diskfile(client: &Arc<MemoryClient>) -> DiskFile {
        let client: Arc<dyn BackendClient> = client.clone();
        DiskFile::new(client, "AUTH_test", "photos", "cat.jpg")
    }

    #[test]
    fn test_object_key() {
        // sha1("abc")
        assert_eq!(
            object_key("a", "b", "c"),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_ne!(object_key("a", "bc", ""), object_key("x", "b", "c"));
    }

    #[tokio::test]
    async fn test_open_missing_object() {
        let client = Arc::new(MemoryClient::default());
        let mut df = diskfile(&client);
        assert!(matches!(df.open().await, Err(Error::DiskFileDeleted(_))));
        assert!(matches!(df.metadata(), Err(Error::DiskFileNotOpen)));
    }

    #[tokio::test]
    async fn test_write_then_open() {
        let client = Arc::new(MemoryClient::default());
        let mut df = diskfile(&client);

        let metadata = ObjectMetadata::from([
            (TIMESTAMP_KEY.to_string(), "1400000000.00000".to_string()),
            ("Content-Type".to_string(), "image/jpeg".to_string()),
        ]);
        df.write(Bytes::from_static(b"meow"), metadata).await.unwrap();

        let opened = df.read_metadata().await.unwrap();
        assert_eq!(opened.get(NAME_KEY).map(String::as_str), Some(df.name()));
        assert_eq!(df.timestamp().unwrap(), Some("1400000000.00000"));
        assert_eq!(df.read(None).await.unwrap(), Bytes::from_static(b"meow"));
        assert_eq!(
            df.read(Some(ByteRange::new(1, 2))).await.unwrap(),
            Bytes::from_static(b"eo")
        );
        assert_eq!(df.path(), "/AUTH_test/photos/cat.jpg");
    }

    #[tokio::test]
    async fn test_expired_object() {
        let client = Arc::new(MemoryClient::default());
        let mut df = diskfile(&client);
        let metadata = ObjectMetadata::from([(DELETE_AT_KEY.to_string(), "1".to_string())]);
        df.write(Bytes::new(), metadata).await.unwrap();

        assert!(matches!(
            df.open().await,
            Err(Error::DiskFileExpired { delete_at: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_future_delete_at_and_metadata_update() {
        let client = Arc::new(MemoryClient::default());
        let mut df = diskfile(&client);
        let later = (unix_now() + 3600).to_string();
        let metadata = ObjectMetadata::from([(DELETE_AT_KEY.to_string(), later)]);
        df.write(Bytes::new(), metadata).await.unwrap();
        df.open().await.unwrap();

        let updated = ObjectMetadata::from([("X-Object-Meta-Mood".to_string(), "sleepy".to_string())]);
        df.write_metadata(&updated).await.unwrap();
        assert_eq!(df.read_metadata().await.unwrap(), updated);

        df.delete().await.unwrap();
        assert_eq!(client.object_count(), 0);
        assert!(matches!(df.open().await, Err(Error::DiskFileDeleted(_))));
    }
}
