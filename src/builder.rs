//! Fluent construction of a [`StorageService`] backed by [`S3Client`]

use crate::config::{
    LoggerOptions, StorageConfig, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SERVICE_URL,
    SIGNING_REGION,
};
use crate::error::{ConfigError, Result};
use crate::logging::{ErrorLogger, TracingLogger};
use crate::s3::{ClientOptions, S3Client};
use crate::service::StorageService;
use hyper::Uri;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Collects connection settings; [`build`](Self::build) validates them.
///
/// ```no_run
/// # fn main() -> cloudru_object_storage::Result<()> {
/// use cloudru_object_storage::{ClientBuilder, LoggerOptions};
///
/// let storage = ClientBuilder::new()
///     .with_tenant_id("tenant-id")
///     .with_access_key("access-key")
///     .with_secret_key("secret-key")
///     .with_bucket_name("my-bucket")
///     .with_logger(LoggerOptions::default())
///     .build()?;
/// # let _ = storage;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClientBuilder {
    tenant_id: String,
    access_key: String,
    secret_key: String,
    bucket_name: String,
    service_url: String,
    timeout: Duration,
    logger: Option<Arc<dyn ErrorLogger>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("tenant_id", &self.tenant_id)
            .field("access_key", &self.access_key)
            .field("bucket_name", &self.bucket_name)
            .field("service_url", &self.service_url)
            .field("timeout", &self.timeout)
            .field("logging", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            tenant_id: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            bucket_name: String::new(),
            service_url: DEFAULT_SERVICE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            logger: None,
        }
    }

    /// Seed a builder from deserialized configuration
    pub fn from_config(config: StorageConfig) -> Self {
        let builder = Self::new()
            .with_tenant_id(config.tenant_id)
            .with_access_key(config.access_key)
            .with_secret_key(config.secret_key)
            .with_bucket_name(config.bucket)
            .with_service_url(config.service_url)
            .with_timeout(Duration::from_secs(config.request_timeout_secs));
        match config.logger {
            Some(options) => builder.with_logger(options),
            None => builder,
        }
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = access_key.into();
        self
    }

    pub fn with_secret_key(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = secret_key.into();
        self
    }

    pub fn with_bucket_name(mut self, bucket_name: impl Into<String>) -> Self {
        self.bucket_name = bucket_name.into();
        self
    }

    /// Override the default `https://s3.cloud.ru` endpoint
    pub fn with_service_url(mut self, service_url: impl Into<String>) -> Self {
        self.service_url = service_url.into();
        self
    }

    /// Per-attempt request timeout (default 300s)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Log failed operations through `tracing`
    pub fn with_logger(self, options: LoggerOptions) -> Self {
        self.with_error_logger(Arc::new(TracingLogger::new(options)))
    }

    /// Log failed operations through a custom logger
    pub fn with_error_logger(mut self, logger: Arc<dyn ErrorLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        let required = [
            ("tenant_id", &self.tenant_id),
            ("access_key", &self.access_key),
            ("secret_key", &self.secret_key),
            ("bucket_name", &self.bucket_name),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(ConfigError::MissingField(*name));
        }

        let valid_url = self
            .service_url
            .parse::<Uri>()
            .map(|uri| {
                matches!(uri.scheme_str(), Some("http") | Some("https")) && uri.host().is_some()
            })
            .unwrap_or(false);
        if !valid_url {
            return Err(ConfigError::InvalidServiceUrl(self.service_url.clone()));
        }

        Ok(())
    }

    /// Validate the settings and assemble the service. No request is sent.
    pub fn build(self) -> Result<StorageService> {
        self.validate()?;

        let client = S3Client::new(ClientOptions {
            endpoint: self.service_url,
            region: SIGNING_REGION.to_string(),
            access_key: format!("{}:{}", self.tenant_id, self.access_key),
            secret_key: self.secret_key,
            timeout: self.timeout,
        })?;

        let service = StorageService::new(Arc::new(client), self.bucket_name);
        Ok(match self.logger {
            Some(logger) => service.with_logger(logger),
            None => service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> ClientBuilder {
        ClientBuilder::new()
            .with_tenant_id("tenant")
            .with_access_key("key")
            .with_secret_key("secret")
            .with_bucket_name("cards")
    }

    #[test]
    fn test_validate_reports_first_missing_field() {
        let err = ClientBuilder::new().validate().unwrap_err();
        assert_eq!(err, ConfigError::MissingField("tenant_id"));

        let err = complete().with_secret_key("").validate().unwrap_err();
        assert_eq!(err, ConfigError::MissingField("secret_key"));
    }

    #[test]
    fn test_validate_service_url() {
        assert!(complete().validate().is_ok());
        assert!(complete()
            .with_service_url("http://localhost:9000")
            .validate()
            .is_ok());
        assert_eq!(
            complete().with_service_url("s3.cloud.ru").validate(),
            Err(ConfigError::InvalidServiceUrl("s3.cloud.ru".to_string()))
        );
        assert!(complete().with_service_url("ftp://s3.cloud.ru").validate().is_err());
    }

    #[test]
    fn test_from_config_carries_logger() {
        let config = StorageConfig {
            tenant_id: "t".to_string(),
            access_key: "k".to_string(),
            secret_key: "s".to_string(),
            bucket: "b".to_string(),
            logger: Some(LoggerOptions::default()),
            ..StorageConfig::default()
        };
        let builder = ClientBuilder::from_config(config);
        assert!(builder.logger.is_some());
        assert_eq!(builder.service_url, DEFAULT_SERVICE_URL);
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn test_debug_omits_secret() {
        let rendered = format!("{:?}", complete().with_secret_key("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
