//! Folder and file helpers for Cloud.ru Object Storage
//!
//! Object storage has buckets and keys, not directories. [`StorageService`]
//! emulates folders on top of key prefixes and exposes create/rename/delete
//! for folders, upload/download/rename/delete for files, and listings.
//! [`ClientBuilder`] wires it to the S3-compatible endpoint.

pub mod builder;
pub mod config;
pub mod error;
pub mod logging;
pub mod s3;
pub mod service;

pub use builder::ClientBuilder;
pub use config::{LogLevel, LoggerOptions, StorageConfig};
pub use error::{ConfigError, Error, Result};
pub use logging::{ErrorLogger, NoopLogger, TracingLogger};
pub use s3::{MemoryStore, ObjectBody, ObjectStore, ObjectStream, S3Client, S3Error};
pub use service::StorageService;
