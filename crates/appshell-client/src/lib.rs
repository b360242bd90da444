//! # AppShell Client
//!
//! The document-side half of the AppShell offline cache engine: decides per
//! serving host whether a cache worker should exist at all, and manages its
//! lifecycle from the page.
//!
//! ## Features
//!
//! - **Environment gate**: loopback and preview hosts get no caching
//! - **Registration**: install + promote a worker generation at a scope
//! - **Update polling**: long-lived tabs discover new cache versions
//! - **Teardown**: unregister everything and purge every namespace
//!
//! ## Architecture
//!
//! ```text
//! page load
//!     └── RegistrationController::on_load(hostname, shell)
//!             ├── Disabled ──→ unregister all + purge all namespaces
//!             └── Enabled ───→ WorkerRegistry::register(scope, shell)
//!                                  └── UpdatePoller (interval update checks)
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod controller;
pub mod registry;

pub use controller::{LoadOutcome, RegistrationController, UpdatePoller};
pub use registry::WorkerRegistry;

// ==================== Environment ====================

/// Whether offline caching is permitted on a serving host. Recomputed every
/// page load, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Production-like host: register the cache worker.
    Enabled,
    /// Local development or ephemeral preview host: tear caching down.
    Disabled,
}

/// Classify a serving hostname.
///
/// Loopback hosts and hosts under one of the preview-hosting suffixes are
/// disabled: preview builds rotate bundle hashes fast enough that a stale
/// worker cache serves mismatched script/document pairs, which is strictly
/// worse than no caching.
pub fn classify_host(hostname: &str, preview_suffixes: &[String]) -> Environment {
    let host = hostname.to_ascii_lowercase();

    let loopback = host == "localhost"
        || host.ends_with(".localhost")
        || host.starts_with("127.")
        || host == "::1"
        || host == "[::1]";
    if loopback {
        return Environment::Disabled;
    }

    if preview_suffixes
        .iter()
        .any(|suffix| host.ends_with(suffix.to_ascii_lowercase().as_str()))
    {
        return Environment::Disabled;
    }

    Environment::Enabled
}

// ==================== Config ====================

/// Controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Registration scope.
    pub scope: String,

    /// How often long-lived tabs check for a newer worker generation.
    pub update_interval: Duration,

    /// Hostname suffixes of the ephemeral preview-hosting domain family.
    pub preview_suffixes: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            scope: "/".to_string(),
            update_interval: Duration::from_secs(60),
            preview_suffixes: vec![".preview.app".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suffixes() -> Vec<String> {
        ControllerConfig::default().preview_suffixes
    }

    #[test]
    fn test_loopback_hosts_disabled() {
        assert_eq!(classify_host("localhost", &suffixes()), Environment::Disabled);
        assert_eq!(classify_host("app.localhost", &suffixes()), Environment::Disabled);
        assert_eq!(classify_host("127.0.0.1", &suffixes()), Environment::Disabled);
        assert_eq!(classify_host("::1", &suffixes()), Environment::Disabled);
    }

    #[test]
    fn test_preview_hosts_disabled() {
        assert_eq!(
            classify_host("feature-branch-42.preview.app", &suffixes()),
            Environment::Disabled
        );
        assert_eq!(
            classify_host("Feature-Branch.PREVIEW.APP", &suffixes()),
            Environment::Disabled
        );
    }

    #[test]
    fn test_production_hosts_enabled() {
        assert_eq!(classify_host("app.example.com", &suffixes()), Environment::Enabled);
        assert_eq!(classify_host("example.com", &suffixes()), Environment::Enabled);
        // Not a suffix match: the family name embedded elsewhere is fine.
        assert_eq!(
            classify_host("preview.app.example.com", &suffixes()),
            Environment::Enabled
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.scope, "/");
        assert_eq!(config.update_interval, Duration::from_secs(60));
        assert!(!config.preview_suffixes.is_empty());
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = ControllerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ControllerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.scope, config.scope);
        assert_eq!(back.update_interval, config.update_interval);
    }
}
