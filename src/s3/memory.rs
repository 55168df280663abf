//! In-process object store with S3 listing semantics
//!
//! Keys are kept in byte order per bucket, so listings come back in the same
//! order an S3 service returns them. Pages hold at most [`MAX_KEYS`] entries
//! (objects plus common prefixes), like ListObjectsV2.

use crate::s3::client::{Result, S3Error};
use crate::s3::store::ObjectStore;
use crate::s3::types::{ListObjectsResponse, ObjectBody, ObjectStream, S3Object};
use async_trait::async_trait;
use bytes::Bytes;
use hyper::StatusCode;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

/// Page size of a ListObjectsV2 response
pub const MAX_KEYS: usize = 1000;

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Put,
    Get,
    List,
    Copy,
    Delete,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, Bytes>>>,
    /// (operation, key or list prefix) pairs that fail until cleared
    failures: RwLock<HashSet<(Operation, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty bucket
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.buckets.get_mut().entry(bucket.into()).or_default();
        self
    }

    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    /// All keys in `bucket`, in listing order, without paging
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make every `operation` on `key` fail with a 500 until
    /// [`clear_failures`](Self::clear_failures). For `List` the key is the
    /// requested prefix (empty for none); for `Copy` it is the source key.
    pub async fn fail_on(&self, operation: Operation, key: &str) {
        self.failures
            .write()
            .await
            .insert((operation, key.to_string()));
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    async fn check_failure(&self, operation: Operation, key: &str) -> Result<()> {
        if self
            .failures
            .read()
            .await
            .contains(&(operation, key.to_string()))
        {
            return Err(S3Error::S3Response {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "InternalError".to_string(),
                message: format!("injected {:?} failure for {}", operation, key),
            });
        }
        Ok(())
    }
}

fn no_such_bucket(bucket: &str) -> S3Error {
    S3Error::S3Response {
        status: StatusCode::NOT_FOUND,
        code: "NoSuchBucket".to_string(),
        message: format!("The specified bucket does not exist: {}", bucket),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, bucket: &str, key: &str, body: ObjectBody) -> Result<()> {
        self.check_failure(Operation::Put, key).await?;
        let data = match body {
            ObjectBody::Bytes(data) => data,
            ObjectBody::File(path) => Bytes::from(tokio::fs::read(&path).await?),
        };

        let mut buckets = self.buckets.write().await;
        let objects = buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream> {
        self.check_failure(Operation::Get, key).await?;
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let data = objects.get(key).ok_or_else(|| S3Error::NotFound {
            key: key.to_string(),
        })?;
        Ok(ObjectStream::from_bytes(data.clone()))
    }

    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListObjectsResponse> {
        let prefix = prefix.unwrap_or("");
        self.check_failure(Operation::List, prefix).await?;

        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let delimiter = delimiter.filter(|d| !d.is_empty());

        let mut response = ListObjectsResponse::new();
        let mut count = 0;
        let mut last_key: Option<&str> = None;

        for (key, data) in objects.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }

            // Keys sharing a rolled-up prefix are adjacent in byte order
            let rolled_up = delimiter.and_then(|d| {
                key[prefix.len()..]
                    .find(d)
                    .map(|pos| &key[..prefix.len() + pos + d.len()])
            });
            if let Some(common) = rolled_up {
                if response.common_prefixes.last().map(String::as_str) == Some(common) {
                    continue;
                }
            }

            if count == MAX_KEYS {
                response.is_truncated = true;
                response.next_continuation_token = last_key.map(str::to_string);
                break;
            }

            match rolled_up {
                Some(common) => response.common_prefixes.push(common.to_string()),
                None => response
                    .contents
                    .push(S3Object::new(key.clone(), data.len() as u64)),
            }
            count += 1;
            last_key = Some(key.as_str());
        }

        response.key_count = Some(count as u32);
        Ok(response)
    }

    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        destination_key: &str,
    ) -> Result<()> {
        self.check_failure(Operation::Copy, source_key).await?;
        let mut buckets = self.buckets.write().await;
        let objects = buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let data = objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| S3Error::NotFound {
                key: source_key.to_string(),
            })?;
        objects.insert(destination_key.to_string(), data);
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.check_failure(Operation::Delete, key).await?;
        let mut buckets = self.buckets.write().await;
        let objects = buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        objects.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(keys: &[&'static str]) -> MemoryStore {
        let store = MemoryStore::new().with_bucket("b");
        for key in keys {
            store
                .put_object("b", key, ObjectBody::from(*key))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_list_with_delimiter_rolls_up_prefixes() {
        let store = store_with(&["a-file", "a/", "a/x.txt", "a/y/z.txt", "b/", "root.txt"]).await;

        let response = store.list_objects_v2("b", None, Some("/")).await.unwrap();
        assert_eq!(response.common_prefixes, vec!["a/", "b/"]);
        assert_eq!(response.keys(), vec!["a-file", "root.txt"]);
        assert!(!response.is_truncated);
    }

    #[tokio::test]
    async fn test_list_with_prefix_returns_all_nested_keys() {
        let store = store_with(&["a/", "a/x.txt", "a/y/z.txt", "ab/c.txt"]).await;

        let response = store.list_objects_v2("b", Some("a/"), None).await.unwrap();
        assert_eq!(response.keys(), vec!["a/", "a/x.txt", "a/y/z.txt"]);
        assert_eq!(response.key_count, Some(3));
    }

    #[tokio::test]
    async fn test_list_is_single_page() {
        let store = MemoryStore::new().with_bucket("b");
        for i in 0..(MAX_KEYS + 5) {
            store
                .put_object("b", &format!("bulk/{:05}", i), ObjectBody::empty())
                .await
                .unwrap();
        }

        let response = store.list_objects_v2("b", Some("bulk/"), None).await.unwrap();
        assert_eq!(response.contents.len(), MAX_KEYS);
        assert!(response.is_truncated);
        assert_eq!(response.next_continuation_token.as_deref(), Some("bulk/00999"));
    }

    #[tokio::test]
    async fn test_get_missing_key_is_not_found() {
        let store = store_with(&[]).await;
        let err = store.get_object("b", "nope").await.unwrap_err();
        assert!(matches!(err, S3Error::NotFound { ref key } if key == "nope"));
    }

    #[tokio::test]
    async fn test_delete_missing_key_succeeds() {
        let store = store_with(&[]).await;
        store.delete_object("b", "nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_bucket() {
        let store = MemoryStore::new();
        let err = store.list_objects_v2("missing", None, None).await.unwrap_err();
        assert!(matches!(err, S3Error::S3Response { ref code, .. } if code == "NoSuchBucket"));
    }

    #[tokio::test]
    async fn test_injected_failure_until_cleared() {
        let store = store_with(&["a/x"]).await;
        store.fail_on(Operation::Delete, "a/x").await;
        assert!(store.delete_object("b", "a/x").await.is_err());

        store.clear_failures().await;
        store.delete_object("b", "a/x").await.unwrap();
        assert!(store.keys("b").await.is_empty());
    }
}
