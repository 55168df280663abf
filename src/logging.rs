//! Failure logging for storage operations
//!
//! The service reports each failed operation to an [`ErrorLogger`] before
//! returning the error. Records go through `tracing`; installing a
//! subscriber is left to the application.

use crate::config::{LogLevel, LoggerOptions};
use std::error::Error as StdError;
use std::fmt;

/// Receives one record per failed storage operation. Must not panic.
pub trait ErrorLogger: Send + Sync {
    fn error(&self, message: &str, error: &(dyn StdError + 'static));

    /// Whether records are actually emitted
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Discards every record
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl ErrorLogger for NoopLogger {
    fn error(&self, _message: &str, _error: &(dyn StdError + 'static)) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Emits failures as `tracing` events
#[derive(Debug, Clone)]
pub struct TracingLogger {
    options: LoggerOptions,
}

impl TracingLogger {
    pub fn new(options: LoggerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoggerOptions {
        &self.options
    }
}

impl ErrorLogger for TracingLogger {
    fn error(&self, message: &str, error: &(dyn StdError + 'static)) {
        let logger = self.options.name.as_str();
        let sources = if self.options.include_sources {
            SourceChain(error.source()).to_string()
        } else {
            String::new()
        };

        match self.options.level {
            LogLevel::Error => {
                tracing::error!(logger, error = %error, sources = %sources, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(logger, error = %error, sources = %sources, "{}", message)
            }
        }
    }
}

/// `a: b: c` rendering of an error's source chain
struct SourceChain<'a>(Option<&'a (dyn StdError + 'static)>);

impl fmt::Display for SourceChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut next = self.0;
        let mut first = true;
        while let Some(err) = next {
            if !first {
                f.write_str(": ")?;
            }
            write!(f, "{}", err)?;
            first = false;
            next = err.source();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug)]
    struct Outer(io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("outer failure")
        }
    }

    impl StdError for Outer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_source_chain_rendering() {
        let err = Outer(io::Error::new(io::ErrorKind::Other, "disk unplugged"));
        assert_eq!(SourceChain(err.source()).to_string(), "disk unplugged");
        assert_eq!(SourceChain(None).to_string(), "");
    }

    #[test]
    fn test_tracing_logger_does_not_panic_without_subscriber() {
        let logger = TracingLogger::new(LoggerOptions::default().with_level(LogLevel::Warn));
        let err = Outer(io::Error::new(io::ErrorKind::Other, "disk unplugged"));
        logger.error("upload failed", &err);
        assert!(logger.is_enabled());
        assert!(!NoopLogger.is_enabled());
    }
}
