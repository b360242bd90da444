//! The registration controller: one decision per page load.

use crate::{classify_host, ControllerConfig, Environment, WorkerRegistry};
use appshell_cache::{CacheStorage, ShellManifest};
use appshell_core::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What `on_load` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Enabled host; the worker is registered and update polling runs.
    Registered,
    /// Disabled host; registrations and namespaces were torn down.
    CachingDisabled,
    /// Enabled host, but registration failed; the app runs without offline
    /// support.
    RegistrationFailed,
    /// A previous call already evaluated this page load.
    AlreadyEvaluated,
}

/// Handle on the background update poller. Aborts its task on drop.
#[derive(Debug)]
pub struct UpdatePoller {
    handle: JoinHandle<()>,
}

impl UpdatePoller {
    /// Stop polling.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for UpdatePoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Gates whether a cache worker exists at all, based on the serving host,
/// and manages it from the document side.
pub struct RegistrationController {
    registry: Arc<WorkerRegistry>,
    storage: Arc<RwLock<CacheStorage>>,
    config: ControllerConfig,
    evaluated: AtomicBool,
    poller: Mutex<Option<UpdatePoller>>,
}

impl RegistrationController {
    /// Create a controller over a registry and the shared cache storage.
    pub fn new(
        registry: Arc<WorkerRegistry>,
        storage: Arc<RwLock<CacheStorage>>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            registry,
            storage,
            config,
            evaluated: AtomicBool::new(false),
            poller: Mutex::new(None),
        }
    }

    /// Classify the serving host under this controller's config.
    pub fn classify(&self, hostname: &str) -> Environment {
        classify_host(hostname, &self.config.preview_suffixes)
    }

    /// Evaluate the environment once, after the document load event.
    ///
    /// Repeat calls within one page load are no-ops; both paths are
    /// best-effort and never fail the page.
    pub async fn on_load(&self, hostname: &str, shell: ShellManifest) -> LoadOutcome {
        if self.evaluated.swap(true, Ordering::SeqCst) {
            debug!("environment already evaluated this load");
            return LoadOutcome::AlreadyEvaluated;
        }

        match self.classify(hostname) {
            Environment::Disabled => {
                self.disable(hostname).await;
                LoadOutcome::CachingDisabled
            }
            Environment::Enabled => match self.enable(shell).await {
                Ok(()) => LoadOutcome::Registered,
                Err(err) => {
                    warn!(error = %err, "registration failed, continuing without offline support");
                    LoadOutcome::RegistrationFailed
                }
            },
        }
    }

    /// Tear down every registration and every cache namespace, best-effort.
    async fn disable(&self, hostname: &str) {
        let removed = self.registry.unregister_all().await;
        let purged = self.storage.write().await.purge_all();
        info!(
            hostname,
            registrations_removed = removed,
            namespaces_purged = purged,
            "offline caching disabled on this host"
        );
    }

    /// Register the shell's worker at the configured scope and start the
    /// update poller.
    async fn enable(&self, shell: ShellManifest) -> Result<()> {
        // The shell served with this page load is by definition what the
        // server currently publishes.
        self.registry.publish(shell.clone()).await;
        self.registry.register(&self.config.scope, shell).await?;

        let registry = Arc::clone(&self.registry);
        let scope = self.config.scope.clone();
        let interval = self.config.update_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; registration just happened.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match registry.update(&scope).await {
                    Ok(true) => info!(scope, "update check installed a new generation"),
                    Ok(false) => debug!(scope, "update check: nothing new"),
                    Err(err) => warn!(scope, error = %err, "update check failed"),
                }
            }
        });
        *self.poller.lock().await = Some(UpdatePoller { handle });
        Ok(())
    }

    /// Whether `on_load` has run this page load.
    pub fn has_evaluated(&self) -> bool {
        self.evaluated.load(Ordering::SeqCst)
    }

    /// Stop and drop the update poller.
    pub async fn stop_polling(&self) {
        if let Some(poller) = self.poller.lock().await.take() {
            poller.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appshell_cache::CacheVersion;
    use appshell_worker::{ClientRegistry, FetchResponse, ScriptedNetwork};

    const ROOT: &str = "https://app.example/";

    fn shell(version: &str) -> ShellManifest {
        ShellManifest::new(CacheVersion::new(version), vec![ROOT.to_string()]).unwrap()
    }

    struct Fixture {
        controller: RegistrationController,
        registry: Arc<WorkerRegistry>,
        storage: Arc<RwLock<CacheStorage>>,
        network: Arc<ScriptedNetwork>,
    }

    fn fixture(config: ControllerConfig) -> Fixture {
        let network = ScriptedNetwork::new();
        network.route(ROOT, FetchResponse::new(ROOT, 200, b"<html>".to_vec()));
        let network = Arc::new(network);

        let storage = Arc::new(RwLock::new(CacheStorage::new()));
        let registry = Arc::new(WorkerRegistry::new(
            Arc::clone(&storage),
            Arc::new(RwLock::new(ClientRegistry::new())),
            Arc::clone(&network) as Arc<dyn appshell_worker::Network>,
        ));
        let controller =
            RegistrationController::new(Arc::clone(&registry), Arc::clone(&storage), config);
        Fixture {
            controller,
            registry,
            storage,
            network,
        }
    }

    #[tokio::test]
    async fn test_on_load_runs_once() {
        let fixture = fixture(ControllerConfig::default());

        let first = fixture
            .controller
            .on_load("app.example.com", shell("v1"))
            .await;
        assert_eq!(first, LoadOutcome::Registered);
        assert!(fixture.controller.has_evaluated());

        let second = fixture
            .controller
            .on_load("app.example.com", shell("v1"))
            .await;
        assert_eq!(second, LoadOutcome::AlreadyEvaluated);

        fixture.controller.stop_polling().await;
    }

    #[tokio::test]
    async fn test_registration_failure_is_non_fatal() {
        let fixture = fixture(ControllerConfig::default());
        fixture.network.set_offline(true);

        let outcome = fixture
            .controller
            .on_load("app.example.com", shell("v1"))
            .await;
        assert_eq!(outcome, LoadOutcome::RegistrationFailed);
        assert!(fixture.registry.registrations().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_discovers_published_generation() {
        let fixture = fixture(ControllerConfig::default());

        let outcome = fixture
            .controller
            .on_load("app.example.com", shell("v1"))
            .await;
        assert_eq!(outcome, LoadOutcome::Registered);

        // A deploy publishes v2; the next poll discovers and promotes it.
        fixture.registry.publish(shell("v2")).await;
        tokio::time::sleep(std::time::Duration::from_secs(61)).await;

        assert_eq!(
            fixture.registry.active_version("/").await,
            Some(CacheVersion::new("v2"))
        );
        fixture.controller.stop_polling().await;
    }

    #[tokio::test]
    async fn test_disabled_host_purges_everything() {
        let fixture = fixture(ControllerConfig::default());

        // Leftovers from earlier sessions.
        fixture.registry.register("/", shell("v1")).await.unwrap();
        fixture
            .storage
            .write()
            .await
            .open(&CacheVersion::new("stale"));

        let outcome = fixture.controller.on_load("localhost", shell("v1")).await;
        assert_eq!(outcome, LoadOutcome::CachingDisabled);

        assert!(fixture.registry.registrations().await.is_empty());
        assert!(fixture.storage.read().await.names().is_empty());
    }
}
