//! Folder and file operations over a single bucket
//!
//! Folders do not exist in object storage. A folder is a key prefix ending
//! in `/`, optionally materialized by a zero-length marker object at that
//! key. Every operation here maps onto a handful of object calls:
//!
//! | Operation | Object calls |
//! |---|---|
//! | `create_folder` | put marker |
//! | `rename_folder` | list prefix, copy + delete per key, repeat until the prefix lists empty |
//! | `delete_folder` | list prefix, then delete per key |
//! | `upload_file` / `upload_bytes` | put |
//! | `list_folders` | list root with `/` delimiter |
//! | `list_files_in_folder` | list prefix |
//! | `get_file` | get |
//! | `rename_file` | copy + delete |
//! | `delete_file` | delete |
//!
//! Listings fetch a single page, so `list_*` and `delete_folder` see at most
//! the first 1000 keys. `rename_folder` keeps paging until nothing is left
//! under the old prefix. Multi-step operations run sequentially,
//! stop at the first failure and do not undo completed steps.
//!
//! Every failure is handed to the configured [`ErrorLogger`] and then
//! returned unchanged.

pub mod keys;

use crate::builder::ClientBuilder;
use crate::config::DEFAULT_SERVICE_URL;
use crate::error::{ConfigError, Error, Result};
use crate::logging::{ErrorLogger, NoopLogger};
use crate::s3::{ListObjectsResponse, ObjectBody, ObjectStore, ObjectStream};
use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub use keys::{folder_prefix, object_key, renamed_key};

/// Folder/file façade bound to one bucket
#[derive(Clone)]
pub struct StorageService {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    logger: Arc<dyn ErrorLogger>,
}

impl fmt::Debug for StorageService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageService")
            .field("bucket", &self.bucket)
            .field("logging", &self.logger.is_enabled())
            .finish_non_exhaustive()
    }
}

impl StorageService {
    /// Service over `store` with failure logging disabled.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            logger: Arc::new(NoopLogger),
        }
    }

    /// Service over the Cloud.ru endpoint.
    ///
    /// `access_key_id` is the combined `tenant:access` id. Settings go
    /// through the same validation as [`ClientBuilder::build`].
    pub fn connect(access_key_id: &str, secret_key: &str, bucket: &str) -> Result<Self> {
        Self::connect_to(access_key_id, secret_key, bucket, DEFAULT_SERVICE_URL)
    }

    /// Like [`connect`](Self::connect) with a different service URL.
    pub fn connect_to(
        access_key_id: &str,
        secret_key: &str,
        bucket: &str,
        service_url: &str,
    ) -> Result<Self> {
        if access_key_id.is_empty() {
            return Err(ConfigError::MissingField("access_key").into());
        }
        let (tenant_id, access_key) = access_key_id
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidAccessKeyId(access_key_id.to_string()))?;

        ClientBuilder::new()
            .with_tenant_id(tenant_id)
            .with_access_key(access_key)
            .with_secret_key(secret_key)
            .with_bucket_name(bucket)
            .with_service_url(service_url)
            .build()
    }

    pub fn with_logger(mut self, logger: Arc<dyn ErrorLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn logging_enabled(&self) -> bool {
        self.logger.is_enabled()
    }

    /// Create the marker object `name/`.
    pub async fn create_folder(&self, name: &str) -> Result<()> {
        self.logged(self.put_folder_marker(name), || {
            format!("failed to create folder {}", name)
        })
        .await
    }

    /// Move every object under `old_name/` to `new_name/`.
    ///
    /// Not atomic: a failure part-way leaves objects under both prefixes.
    pub async fn rename_folder(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.logged(self.migrate_folder(old_name, new_name), || {
            format!("failed to rename folder {} to {}", old_name, new_name)
        })
        .await
    }

    /// Delete every object under `name/`, one request per object.
    pub async fn delete_folder(&self, name: &str) -> Result<()> {
        self.logged(self.delete_prefix(name), || {
            format!("failed to delete folder {}", name)
        })
        .await
    }

    /// Upload a local file to `folder/<file name>`, replacing any existing
    /// object. Returns the object key.
    pub async fn upload_file(&self, folder: &str, file_path: impl AsRef<Path>) -> Result<String> {
        let file_path = file_path.as_ref();
        self.logged(self.put_file(folder, file_path), || {
            format!(
                "failed to upload file {} to folder {}",
                file_path.display(),
                folder
            )
        })
        .await
    }

    /// Upload an in-memory body to `folder/file_name`. Returns the object key.
    pub async fn upload_bytes(
        &self,
        folder: &str,
        file_name: &str,
        data: impl Into<Bytes>,
    ) -> Result<String> {
        let data = data.into();
        self.logged(self.put_bytes(folder, file_name, data), || {
            format!("failed to upload {} to folder {}", file_name, folder)
        })
        .await
    }

    /// Top-level folder names, without the trailing `/`, in listing order.
    pub async fn list_folders(&self) -> Result<Vec<String>> {
        self.logged(self.top_level_folders(), || "failed to list folders".to_string())
            .await
    }

    /// Full keys under `folder/`, including the folder marker itself when present.
    pub async fn list_files_in_folder(&self, folder: &str) -> Result<Vec<String>> {
        self.logged(self.list_folder_keys(folder), || {
            format!("failed to list files in folder {}", folder)
        })
        .await
    }

    /// Open `folder/file_name` for reading. Dropping the stream releases it.
    pub async fn get_file(&self, folder: &str, file_name: &str) -> Result<ObjectStream> {
        self.logged(self.open_object(folder, file_name), || {
            format!("failed to get file {} from folder {}", file_name, folder)
        })
        .await
    }

    /// Copy `old_key` to `new_key`, then delete `old_key`. Both keys are full
    /// object keys. Not atomic: if the delete fails both keys exist.
    pub async fn rename_file(&self, old_key: &str, new_key: &str) -> Result<()> {
        self.logged(self.move_object(old_key, new_key), || {
            format!("failed to rename file {} to {}", old_key, new_key)
        })
        .await
    }

    /// Delete `folder/file_name`. Deleting a missing object succeeds.
    pub async fn delete_file(&self, folder: &str, file_name: &str) -> Result<()> {
        let key = object_key(folder, file_name);
        self.logged(self.delete_key(&key), || {
            format!("failed to delete file {} from folder {}", file_name, folder)
        })
        .await
    }

    /// Await `operation`; on failure hand the error to the logger, then return it.
    async fn logged<T, F, M>(&self, operation: F, message: M) -> Result<T>
    where
        F: Future<Output = Result<T>>,
        M: FnOnce() -> String,
    {
        let result = operation.await;
        if let Err(err) = &result {
            if self.logger.is_enabled() {
                self.logger.error(&message(), err);
            }
        }
        result
    }

    async fn put_folder_marker(&self, name: &str) -> Result<()> {
        let prefix = folder_prefix(name)?;
        self.store
            .put_object(&self.bucket, &prefix, ObjectBody::empty())
            .await?;
        Ok(())
    }

    async fn migrate_folder(&self, old_name: &str, new_name: &str) -> Result<()> {
        let old_prefix = folder_prefix(old_name)?;
        let new_prefix = folder_prefix(new_name)?;
        if old_prefix == new_prefix {
            return Ok(());
        }
        if new_prefix.starts_with(&old_prefix) {
            return Err(Error::InvalidArgument(format!(
                "cannot move folder {} into its own subfolder {}",
                old_prefix, new_prefix
            )));
        }

        // Each pass moves one page; every listed key leaves the old prefix,
        // so the loop ends once a listing comes back empty.
        let mut moved = 0;
        loop {
            let keys = self.list_page(&old_prefix, None).await?.keys();
            if keys.is_empty() {
                break;
            }
            let mut pass = 0;
            for old_key in &keys {
                let Some(new_key) = renamed_key(old_key, &old_prefix, &new_prefix) else {
                    continue;
                };
                self.store
                    .copy_object(&self.bucket, old_key, &new_key)
                    .await?;
                self.store.delete_object(&self.bucket, old_key).await?;
                pass += 1;
            }
            if pass == 0 {
                break;
            }
            moved += pass;
        }
        debug!(
            bucket = %self.bucket,
            from = %old_prefix,
            to = %new_prefix,
            moved,
            "folder renamed"
        );
        Ok(())
    }

    async fn delete_prefix(&self, name: &str) -> Result<()> {
        let prefix = folder_prefix(name)?;
        let keys = self.list_keys(&prefix).await?;
        for key in &keys {
            self.store.delete_object(&self.bucket, key).await?;
        }
        debug!(bucket = %self.bucket, prefix = %prefix, deleted = keys.len(), "folder deleted");
        Ok(())
    }

    async fn put_file(&self, folder: &str, file_path: &Path) -> Result<String> {
        match tokio::fs::metadata(file_path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                return Err(Error::NotFound {
                    path: file_path.to_path_buf(),
                })
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound {
                    path: file_path.to_path_buf(),
                })
            }
            Err(err) => return Err(err.into()),
        }

        let file_name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "file name of {} is not valid UTF-8",
                    file_path.display()
                ))
            })?;

        let key = object_key(folder, file_name);
        self.store
            .put_object(&self.bucket, &key, ObjectBody::File(file_path.to_path_buf()))
            .await?;
        Ok(key)
    }

    async fn put_bytes(&self, folder: &str, file_name: &str, data: Bytes) -> Result<String> {
        if file_name.is_empty() {
            return Err(Error::InvalidArgument("file name is empty".to_string()));
        }
        let key = object_key(folder, file_name);
        self.store
            .put_object(&self.bucket, &key, ObjectBody::Bytes(data))
            .await?;
        Ok(key)
    }

    async fn top_level_folders(&self) -> Result<Vec<String>> {
        let response = self.list_page("", Some("/")).await?;
        if response.is_truncated {
            warn!(bucket = %self.bucket, "folder listing truncated to the first page");
        }
        Ok(response
            .common_prefixes
            .iter()
            .map(|prefix| prefix.trim_end_matches('/').to_string())
            .collect())
    }

    async fn list_folder_keys(&self, folder: &str) -> Result<Vec<String>> {
        let prefix = folder_prefix(folder)?;
        self.list_keys(&prefix).await
    }

    /// Keys of the first listing page under `prefix`
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let response = self.list_page(prefix, None).await?;
        if response.is_truncated {
            warn!(
                bucket = %self.bucket,
                prefix,
                "object listing truncated to the first page"
            );
        }
        Ok(response.keys())
    }

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<ListObjectsResponse> {
        let prefix = Some(prefix).filter(|p| !p.is_empty());
        Ok(self
            .store
            .list_objects_v2(&self.bucket, prefix, delimiter)
            .await?)
    }

    async fn open_object(&self, folder: &str, file_name: &str) -> Result<ObjectStream> {
        let key = object_key(folder, file_name);
        Ok(self.store.get_object(&self.bucket, &key).await?)
    }

    async fn move_object(&self, old_key: &str, new_key: &str) -> Result<()> {
        if old_key == new_key {
            return Ok(());
        }
        self.store
            .copy_object(&self.bucket, old_key, new_key)
            .await?;
        self.store.delete_object(&self.bucket, old_key).await?;
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<()> {
        Ok(self.store.delete_object(&self.bucket, key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::MemoryStore;

    fn service() -> (Arc<MemoryStore>, StorageService) {
        let store = Arc::new(MemoryStore::new().with_bucket("cards"));
        let service = StorageService::new(store.clone(), "cards");
        (store, service)
    }

    #[tokio::test]
    async fn test_create_folder_writes_single_marker() {
        let (store, service) = service();
        service.create_folder("photos//").await.unwrap();
        assert_eq!(store.keys("cards").await, vec!["photos/"]);
    }

    #[tokio::test]
    async fn test_rename_folder_onto_itself_is_noop() {
        let (store, service) = service();
        service.create_folder("photos").await.unwrap();
        service.upload_bytes("photos", "a.txt", "a").await.unwrap();

        service.rename_folder("photos", "photos/").await.unwrap();
        assert_eq!(store.keys("cards").await, vec!["photos/", "photos/a.txt"]);
    }

    #[tokio::test]
    async fn test_rename_folder_into_own_subfolder_is_rejected() {
        let (store, service) = service();
        service.upload_bytes("photos", "a.txt", "a").await.unwrap();

        let err = service.rename_folder("photos", "photos/old").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(store.keys("cards").await, vec!["photos/a.txt"]);
    }

    #[tokio::test]
    async fn test_rename_file_onto_itself_keeps_object() {
        let (store, service) = service();
        service.upload_bytes("docs", "a.txt", "a").await.unwrap();
        service.rename_file("docs/a.txt", "docs/a.txt").await.unwrap();
        assert_eq!(store.keys("cards").await, vec!["docs/a.txt"]);
    }

    #[test]
    fn test_debug_shows_bucket() {
        let (_store, service) = service();
        let rendered = format!("{:?}", service);
        assert!(rendered.contains("cards"));
        assert!(!service.logging_enabled());
    }
}
