//! # AppShell Worker
//!
//! The cache manager half of the AppShell offline cache engine: one worker
//! generation owning one [`appshell_cache::CacheVersion`], intercepting
//! fetches and keeping the versioned snapshot store consistent.
//!
//! ## Features
//!
//! - **Lifecycle**: installing → installed → activating → activated, driven
//!   through explicit entry actions rather than host callbacks
//! - **Fetch interception**: network-first for documents,
//!   stale-while-revalidate for assets, passthrough for everything else
//! - **Control channel**: fire-and-forget skip-waiting signal
//! - **Clients**: claiming open documents on activation
//!
//! ## Architecture
//!
//! ```text
//! CacheManager (one per generation)
//!     ├── LifecycleState        install() / activate() entry actions
//!     ├── StrategyRouter ────── classify() ──→ NetworkFirst
//!     │                                        StaleWhileRevalidate
//!     ├── ControlChannel ────── SKIP_WAITING sentinel
//!     └── ClientRegistry ────── claim on activate
//! ```
//!
//! The "which generation am I" question is always answered by the explicit
//! version carried in the shell manifest, never by ambient context.

use std::sync::atomic::{AtomicU64, Ordering};

pub mod channel;
pub mod clients;
pub mod manager;
pub mod net;
pub mod scripted;
pub mod strategy;

pub use channel::{ControlChannel, ControlMessage, ControlReceiver, SKIP_WAITING};
pub use clients::{Client, ClientId, ClientRegistry};
pub use manager::{CacheManager, FetchOutcome};
pub use net::{FetchRequest, FetchResponse, Network};
pub use scripted::ScriptedNetwork;
pub use strategy::{
    classify, FetchStrategy, NetworkFirst, RequestClass, StaleWhileRevalidate, StrategyContext,
    StrategyRouter,
};

// ==================== Types ====================

/// Unique identifier for a worker generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Worker lifecycle state.
///
/// Owned by the manager and advanced only through its entry actions; the
/// state never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Populating the shell set into a fresh namespace.
    #[default]
    Installing,
    /// Installed, waiting to activate.
    Installed,
    /// Garbage-collecting stale namespaces and claiming clients.
    Activating,
    /// Active and handling fetches.
    Activated,
    /// Failed install or superseded by a newer generation.
    Redundant,
}

impl LifecycleState {
    /// Check if fetches are routed through this generation.
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Activated)
    }

    /// Check if the generation is done for good.
    pub fn is_redundant(&self) -> bool {
        matches!(self, LifecycleState::Redundant)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
            LifecycleState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_ids_are_unique() {
        let a = WorkerId::next();
        let b = WorkerId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_lifecycle_state_flags() {
        assert!(LifecycleState::Activated.is_active());
        assert!(!LifecycleState::Installed.is_active());
        assert!(LifecycleState::Redundant.is_redundant());
        assert!(!LifecycleState::Activating.is_redundant());
    }

    #[test]
    fn test_lifecycle_state_display() {
        assert_eq!(LifecycleState::Installing.to_string(), "installing");
        assert_eq!(LifecycleState::Activated.to_string(), "activated");
    }
}
