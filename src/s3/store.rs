//! The object-level operations the storage service is built on

use async_trait::async_trait;

use crate::s3::client::Result;
use crate::s3::types::{ListObjectsResponse, ObjectBody, ObjectStream};

/// Minimal S3 surface: single-object put/get/copy/delete and one page of
/// ListObjectsV2. Implementations must be safe to share between tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` at `key`, replacing any existing object.
    async fn put_object(&self, bucket: &str, key: &str, body: ObjectBody) -> Result<()>;

    /// Open the object at `key` for reading.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream>;

    /// Fetch the first page of keys under `prefix`. With a `delimiter`, keys
    /// containing it past the prefix are rolled up into `common_prefixes`.
    async fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListObjectsResponse>;

    /// Server-side copy within `bucket`.
    async fn copy_object(&self, bucket: &str, source_key: &str, destination_key: &str)
        -> Result<()>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}
