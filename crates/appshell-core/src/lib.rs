//! # AppShell Core
//!
//! Shared foundation for the AppShell offline cache engine.
//!
//! ## Features
//!
//! - Unified error type covering cache, network, and lifecycle failures
//! - Logging configuration and setup
//! - Result extension traits

use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for AppShell.
#[derive(Error, Debug)]
pub enum AppShellError {
    /// Cache store errors (open, write, delete).
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network fetch errors.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Shell install failures. Fatal to the installing worker generation.
    #[error("Install error: {message}")]
    Install {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Registration-side failures (register, unregister, update check).
    #[error("Registration error: {message}")]
    Registration {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An operation was attempted in the wrong lifecycle state.
    #[error("Invalid lifecycle state: {0}")]
    State(String),

    /// Configuration errors.
    #[error("Config error: {0}")]
    Config(String),

    /// Resource not found (registration scope, cache namespace, entry).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid argument (unparseable URL, empty shell set).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal error (unexpected).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppShellError {
    /// Create a cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an install error.
    pub fn install(message: impl Into<String>) -> Self {
        Self::Install {
            message: message.into(),
            source: None,
        }
    }

    /// Create an install error with source.
    pub fn install_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Install {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a registration error.
    pub fn registration(message: impl Into<String>) -> Self {
        Self::Registration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a registration error with source.
    pub fn registration_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Registration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a lifecycle state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Whether retrying the failed operation could succeed.
    ///
    /// This layer itself never retries (install failures defer to the host's
    /// next-load attempt); the flag is metadata for embedders.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppShellError::Network { .. } | AppShellError::Registration { .. }
        )
    }

    /// Get the error category for metrics.
    pub fn category(&self) -> &'static str {
        match self {
            AppShellError::Cache { .. } => "cache",
            AppShellError::Network { .. } => "network",
            AppShellError::Install { .. } => "install",
            AppShellError::Registration { .. } => "registration",
            AppShellError::State(_) => "state",
            AppShellError::Config(_) => "config",
            AppShellError::NotFound(_) => "not_found",
            AppShellError::InvalidArgument(_) => "invalid_argument",
            AppShellError::Internal(_) => "internal",
        }
    }
}

/// Result type alias for AppShell operations.
pub type Result<T> = std::result::Result<T, AppShellError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Add context to an error, folding it into an internal error.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| AppShellError::Internal(format!("{}: {}", message.into(), e)))
    }
}

/// Extension trait for Option.
pub trait OptionExt<T> {
    /// Convert None to a NotFound error.
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, resource: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| AppShellError::NotFound(resource.into()))
    }
}
