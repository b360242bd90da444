//! The document-side registration host.
//!
//! Models the browser's registration surface: one registration per scope
//! with waiting/active worker slots, installation, promotion, update checks
//! against the most recently published shell, and fire-and-forget message
//! delivery.

use appshell_cache::{CacheStorage, CacheVersion, ShellManifest};
use appshell_core::{AppShellError, Result};
use appshell_worker::{CacheManager, ClientRegistry, ControlMessage, Network};
use hashbrown::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

/// One scope's registration: at most one waiting and one active generation.
#[derive(Default)]
struct Registration {
    waiting: Option<Arc<CacheManager>>,
    active: Option<Arc<CacheManager>>,
}

/// Registration host for one origin.
pub struct WorkerRegistry {
    registrations: RwLock<HashMap<String, Registration>>,
    storage: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<ClientRegistry>>,
    network: Arc<dyn Network>,
    /// What a deploy most recently made available; update checks compare
    /// against this.
    published: RwLock<Option<ShellManifest>>,
}

impl WorkerRegistry {
    /// Create a registry over shared storage, clients, and network.
    pub fn new(
        storage: Arc<RwLock<CacheStorage>>,
        clients: Arc<RwLock<ClientRegistry>>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            registrations: RwLock::new(HashMap::new()),
            storage,
            clients,
            network,
            published: RwLock::new(None),
        }
    }

    /// Record the shell a deploy just made available.
    pub async fn publish(&self, shell: ShellManifest) {
        info!(version = %shell.version(), "published shell");
        *self.published.write().await = Some(shell);
    }

    /// Version of the most recently published shell.
    pub async fn published_version(&self) -> Option<CacheVersion> {
        self.published
            .read()
            .await
            .as_ref()
            .map(|shell| shell.version().clone())
    }

    /// Register a worker generation for `shell` at `scope`: install it, park
    /// it as waiting, and promote it immediately when it requested early
    /// activation (the install entry action always does).
    ///
    /// An install failure leaves the previous generation in place and
    /// propagates.
    pub async fn register(&self, scope: &str, shell: ShellManifest) -> Result<()> {
        let origin = Url::parse(shell.root()).map_err(|e| {
            AppShellError::registration(format!("shell root is not a valid origin: {e}"))
        })?;

        info!(scope, version = %shell.version(), "registering worker");
        let manager = Arc::new(CacheManager::new(
            origin,
            shell,
            Arc::clone(&self.storage),
            Arc::clone(&self.network),
            Arc::clone(&self.clients),
        ));

        manager.install().await?;

        let displaced = {
            let mut registrations = self.registrations.write().await;
            let registration = registrations.entry(scope.to_string()).or_default();
            registration.waiting.replace(Arc::clone(&manager))
        };
        if let Some(displaced) = displaced {
            displaced.make_redundant().await;
        }

        if manager.skip_waiting_requested() {
            self.promote(scope).await?;
        }
        Ok(())
    }

    /// Promote the waiting generation at `scope`: run its activate entry
    /// action, swap it into the active slot, and mark the displaced
    /// generation redundant. No-op when nothing is waiting.
    pub async fn promote(&self, scope: &str) -> Result<()> {
        let waiting = {
            let mut registrations = self.registrations.write().await;
            match registrations.get_mut(scope) {
                Some(registration) => registration.waiting.take(),
                None => return Err(AppShellError::NotFound(format!("registration {scope}"))),
            }
        };
        let Some(waiting) = waiting else {
            debug!(scope, "nothing waiting to promote");
            return Ok(());
        };

        waiting.activate().await?;

        let displaced = {
            let mut registrations = self.registrations.write().await;
            match registrations.get_mut(scope) {
                Some(registration) => registration.active.replace(waiting),
                None => None,
            }
        };
        if let Some(displaced) = displaced {
            displaced.make_redundant().await;
        }
        Ok(())
    }

    /// Check whether a newer generation has been published, and install +
    /// promote it if so. Returns whether a new generation was installed.
    pub async fn update(&self, scope: &str) -> Result<bool> {
        let published = self.published.read().await.clone();
        let Some(shell) = published else {
            debug!(scope, "update check: nothing published");
            return Ok(false);
        };

        let active = self.active_version(scope).await;
        if active.as_ref() == Some(shell.version()) {
            debug!(scope, version = %shell.version(), "update check: up to date");
            return Ok(false);
        }

        info!(scope, version = %shell.version(), "update check found a new generation");
        self.register(scope, shell).await?;
        Ok(true)
    }

    /// Deliver a control message to the live generation at `scope`, waiting
    /// worker first. Fire-and-forget: with no live worker the message is
    /// dropped silently. A recognized skip-waiting request promotes the
    /// waiting generation.
    pub async fn post_message(&self, scope: &str, message: ControlMessage) {
        let target = {
            let registrations = self.registrations.read().await;
            registrations.get(scope).and_then(|registration| {
                registration
                    .waiting
                    .clone()
                    .or_else(|| registration.active.clone())
            })
        };
        let Some(target) = target else {
            debug!(scope, "control message dropped, no live worker");
            return;
        };

        target.channel().post(message);
        target.drain_control().await;

        if target.skip_waiting_requested() {
            if let Err(err) = self.promote(scope).await {
                warn!(scope, error = %err, "promotion after skip-waiting failed");
            }
        }
    }

    /// All registered scopes.
    pub async fn registrations(&self) -> Vec<String> {
        self.registrations.read().await.keys().cloned().collect()
    }

    /// Version of the active generation at `scope`.
    pub async fn active_version(&self, scope: &str) -> Option<CacheVersion> {
        self.registrations
            .read()
            .await
            .get(scope)
            .and_then(|registration| registration.active.as_ref())
            .map(|manager| manager.version().clone())
    }

    /// The active generation at `scope`, for routing fetches.
    pub async fn active_worker(&self, scope: &str) -> Option<Arc<CacheManager>> {
        self.registrations
            .read()
            .await
            .get(scope)
            .and_then(|registration| registration.active.clone())
    }

    /// Remove the registration at `scope`, marking its generations
    /// redundant. Returns whether one existed.
    pub async fn unregister(&self, scope: &str) -> bool {
        let removed = self.registrations.write().await.remove(scope);
        match removed {
            Some(registration) => {
                if let Some(manager) = registration.waiting {
                    manager.make_redundant().await;
                }
                if let Some(manager) = registration.active {
                    manager.make_redundant().await;
                }
                info!(scope, "unregistered");
                true
            }
            None => false,
        }
    }

    /// Remove every registration. Returns how many were removed.
    pub async fn unregister_all(&self) -> usize {
        let scopes = self.registrations().await;
        let mut removed = 0;
        for scope in scopes {
            if self.unregister(&scope).await {
                removed += 1;
            }
        }
        removed
    }
}
