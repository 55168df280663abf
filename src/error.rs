//! Errors returned by the storage service and its builder

use crate::s3::S3Error;
use std::path::PathBuf;
use thiserror::Error;

/// Builder validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting `{0}` is missing or empty")]
    MissingField(&'static str),

    #[error("invalid service URL `{0}`: expected an absolute http(s) URL")]
    InvalidServiceUrl(String),

    #[error("access key id `{0}` is not of the form `tenant:access`")]
    InvalidAccessKeyId(String),
}

#[derive(Error, Debug)]
pub enum Error {
    /// Failure reported by the object store, passed through unchanged
    #[error(transparent)]
    Storage(#[from] S3Error),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Local upload source does not exist or is not a regular file
    #[error("local file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for a missing local file and for a missing object key.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. } | Error::Storage(S3Error::NotFound { .. })
        )
    }

    /// The object store's error, when this is one
    pub fn as_storage(&self) -> Option<&S3Error> {
        match self {
            Error::Storage(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
