//! Plain configuration values for building a storage service
//!
//! Nothing here reads files or environment variables; callers deserialize
//! [`StorageConfig`] from whatever source they use and pass it to
//! [`ClientBuilder::from_config`](crate::ClientBuilder::from_config).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cloud.ru Object Storage endpoint
pub const DEFAULT_SERVICE_URL: &str = "https://s3.cloud.ru";

/// Region used in the SigV4 credential scope
pub const SIGNING_REGION: &str = "ru-central-1";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Severity of failure records emitted by [`TracingLogger`](crate::TracingLogger)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Error,
    Warn,
}

/// Settings for failure logging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerOptions {
    /// Value of the `logger` field on every record
    #[serde(default = "default_logger_name")]
    pub name: String,

    #[serde(default)]
    pub level: LogLevel,

    /// Also record the error's `source()` chain
    #[serde(default = "default_include_sources")]
    pub include_sources: bool,
}

fn default_logger_name() -> String {
    "object-storage".to_string()
}

fn default_include_sources() -> bool {
    true
}

impl Default for LoggerOptions {
    fn default() -> Self {
        Self {
            name: default_logger_name(),
            level: LogLevel::default(),
            include_sources: default_include_sources(),
        }
    }
}

impl LoggerOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_sources(mut self, include_sources: bool) -> Self {
        self.include_sources = include_sources;
        self
    }
}

/// Everything needed to connect to one bucket
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub tenant_id: String,

    #[serde(default)]
    pub access_key: String,

    #[serde(default)]
    pub secret_key: String,

    #[serde(default)]
    pub bucket: String,

    #[serde(default = "default_service_url")]
    pub service_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Failure logging; disabled when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<LoggerOptions>,
}

fn default_service_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            service_url: default_service_url(),
            request_timeout_secs: default_request_timeout(),
            logger: None,
        }
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("tenant_id", &self.tenant_id)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("service_url", &self.service_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("logger", &self.logger)
            .finish()
    }
}
