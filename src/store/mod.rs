//! Object storage, published documents, the metadata row log and the error
//! channel.
//!
//! Everything here sits behind [`ObjectStore`], a thin wrapper over an
//! `opendal` operator, so the same code runs against a local directory, an
//! S3 bucket (feature `s3`) or an in-memory store in tests.

pub mod documents;
pub mod table;

pub use documents::{DocumentStore, GitHubDocumentStore, ObjectDocumentStore};
pub use table::{render_csv, MetadataTable, RowLogTable};

use opendal::{services, Operator};
use tracing::{debug, error, info};

/// Errors from the object-store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage initialization failed: {0}")]
    Init(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("storage backend error: {0}")]
    Backend(opendal::Error),
}

impl From<opendal::Error> for StoreError {
    fn from(err: opendal::Error) -> Self {
        use opendal::ErrorKind;

        match err.kind() {
            ErrorKind::NotFound => Self::NotFound(err.to_string()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            _ => Self::Backend(err),
        }
    }
}

/// Which backend the object store runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// A local directory; keys become relative paths below `root`.
    Fs { root: String },
    /// Process-local, for tests and dry runs.
    Memory,
    /// An S3 bucket.
    #[cfg(feature = "s3")]
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
    },
}

/// Key/value object storage.
#[derive(Clone)]
pub struct ObjectStore {
    operator: Operator,
    config: StoreConfig,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore").field("config", &self.config).finish()
    }
}

impl ObjectStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let operator = match &config {
            StoreConfig::Fs { root } => {
                Operator::new(services::Fs::default().root(root)).map(|op| op.finish())
            }
            StoreConfig::Memory => Operator::new(services::Memory::default()).map(|op| op.finish()),
            #[cfg(feature = "s3")]
            StoreConfig::S3 {
                bucket,
                region,
                endpoint,
            } => {
                let mut builder = services::S3::default().bucket(bucket);
                if let Some(region) = region {
                    builder = builder.region(region);
                }
                if let Some(endpoint) = endpoint {
                    builder = builder.endpoint(endpoint);
                }
                Operator::new(builder).map(|op| op.finish())
            }
        }
        .map_err(|e| StoreError::Init(e.to_string()))?;

        info!("Object store ready: {:?}", config);
        Ok(Self { operator, config })
    }

    /// An empty in-memory store.
    pub fn memory() -> Result<Self, StoreError> {
        Self::new(StoreConfig::Memory)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let data = self.operator.read(key).await?.to_vec();
        debug!("Read {} ({} bytes)", key, data.len());
        Ok(data)
    }

    pub async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), StoreError> {
        let len = data.len();
        self.operator.write(key, data).await?;
        debug!("Wrote {} ({} bytes)", key, len);
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.operator.exists(key).await?)
    }

    /// Keys of the objects directly below `prefix`, sorted.
    ///
    /// A missing prefix lists as empty.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        use futures::TryStreamExt;

        let dir = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };
        let entries: Vec<_> = match self.operator.lister(&dir).await {
            Ok(lister) => lister.try_collect().await?,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys: Vec<String> = entries
            .into_iter()
            .map(|e| e.path().trim_start_matches('/').to_string())
            .filter(|p| !p.ends_with('/'))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Human-readable location of `key`, used in statuses and logs.
    pub fn location(&self, key: &str) -> String {
        match &self.config {
            StoreConfig::Fs { root } => format!("{}/{}", root.trim_end_matches('/'), key),
            StoreConfig::Memory => format!("memory:///{key}"),
            #[cfg(feature = "s3")]
            StoreConfig::S3 { bucket, .. } => format!("s3://{bucket}/{key}"),
        }
    }
}

/// Writes one plain-text error record per failed object.
///
/// Records are named `<error namespace>/<base name>.txt`, so a rerun of the
/// same object overwrites the earlier record.
#[derive(Debug, Clone)]
pub struct ErrorChannel {
    store: ObjectStore,
    namespace: String,
}

impl ErrorChannel {
    pub fn new(store: ObjectStore, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Record `message` for the object `record_name` was derived from.
    ///
    /// Returns the record key, or `None` if even the record could not be
    /// written (logged; nothing else to fall back on).
    pub async fn record(&self, record_name: &str, message: &str) -> Option<String> {
        let key = crate::config::Namespaces::key(&self.namespace, &format!("{record_name}.txt"));
        match self.store.put(&key, message.as_bytes().to_vec()).await {
            Ok(()) => {
                info!("Error record written to {}", key);
                Some(key)
            }
            Err(e) => {
                error!("Failed to write error record {}: {}", key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_round_trip_and_listing() {
        let store = ObjectStore::memory().unwrap();
        store.put("rows/b.json", b"2".to_vec()).await.unwrap();
        store.put("rows/a.json", b"1".to_vec()).await.unwrap();
        store.put("other/c.json", b"3".to_vec()).await.unwrap();

        assert_eq!(store.get("rows/a.json").await.unwrap(), b"1");
        assert!(store.exists("rows/b.json").await.unwrap());
        assert_eq!(store.list("rows").await.unwrap(), vec!["rows/a.json", "rows/b.json"]);
        assert!(store.list("nothing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = ObjectStore::memory().unwrap();
        assert!(matches!(store.get("nope").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn fs_backend_writes_below_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let store = ObjectStore::new(StoreConfig::Fs { root: root.clone() }).unwrap();

        store.put("compressed/map.png", b"png".to_vec()).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("compressed/map.png")).unwrap(), b"png");
        assert_eq!(store.location("compressed/map.png"), format!("{root}/compressed/map.png"));
    }

    #[tokio::test]
    async fn error_records_overwrite_on_rerun() {
        let store = ObjectStore::memory().unwrap();
        let channel = ErrorChannel::new(store.clone(), "error");

        let key = channel.record("map 7", "first").await.unwrap();
        channel.record("map 7", "second").await.unwrap();
        assert_eq!(key, "error/map 7.txt");
        assert_eq!(store.get(&key).await.unwrap(), b"second");
        assert_eq!(store.list("error").await.unwrap().len(), 1);
    }
}
