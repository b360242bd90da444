//! The cache manager: one worker generation.

use crate::channel::{ControlChannel, ControlMessage, ControlReceiver};
use crate::clients::ClientRegistry;
use crate::net::{FetchRequest, FetchResponse, Network};
use crate::strategy::{classify, RequestClass, StrategyContext, StrategyRouter};
use crate::{LifecycleState, WorkerId};
use appshell_cache::{CacheStorage, CacheVersion, ShellManifest};
use appshell_core::{AppShellError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

/// What the interception layer decided for one request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the caller performs its default network behavior.
    Passthrough,
    /// Intercepted and answered.
    Respond(FetchResponse),
}

impl FetchOutcome {
    /// Check if the request was left untouched.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, FetchOutcome::Passthrough)
    }

    /// The response, if one was produced.
    pub fn into_response(self) -> Option<FetchResponse> {
        match self {
            FetchOutcome::Respond(response) => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }
}

/// One worker generation: owns one cache version, intercepts fetches for a
/// single origin, and reacts to lifecycle entry actions.
///
/// The state machine only moves through [`install`](CacheManager::install),
/// [`activate`](CacheManager::activate), and
/// [`make_redundant`](CacheManager::make_redundant), so tests drive
/// transitions directly and assert on namespace contents.
pub struct CacheManager {
    id: WorkerId,
    origin: Url,
    shell: ShellManifest,
    storage: Arc<RwLock<CacheStorage>>,
    network: Arc<dyn Network>,
    clients: Arc<RwLock<ClientRegistry>>,
    router: StrategyRouter,
    state: RwLock<LifecycleState>,
    skip_waiting: AtomicBool,
    control: ControlChannel,
    control_rx: Mutex<ControlReceiver>,
    revalidations: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl CacheManager {
    /// Create a generation in the installing state with the standard
    /// strategy routing.
    pub fn new(
        origin: Url,
        shell: ShellManifest,
        storage: Arc<RwLock<CacheStorage>>,
        network: Arc<dyn Network>,
        clients: Arc<RwLock<ClientRegistry>>,
    ) -> Self {
        let (control, control_rx) = ControlChannel::new();
        Self {
            id: WorkerId::next(),
            origin,
            shell,
            storage,
            network,
            clients,
            router: StrategyRouter::standard(),
            state: RwLock::new(LifecycleState::Installing),
            skip_waiting: AtomicBool::new(false),
            control,
            control_rx: Mutex::new(control_rx),
            revalidations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Swap the strategy routing.
    pub fn with_router(mut self, router: StrategyRouter) -> Self {
        self.router = router;
        self
    }

    /// This generation's ID.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// The cache version this generation owns.
    pub fn version(&self) -> &CacheVersion {
        self.shell.version()
    }

    /// The origin whose fetches this generation intercepts.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Document-side sender for control messages to this generation.
    pub fn channel(&self) -> ControlChannel {
        self.control.clone()
    }

    /// Whether early activation has been requested.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Relaxed)
    }

    async fn set_state(&self, to: LifecycleState) {
        let mut state = self.state.write().await;
        info!(worker = %self.id, from = %*state, to = %to, "lifecycle transition");
        *state = to;
    }

    /// Entry action of the installing state: open the namespace named by the
    /// current version and pre-fetch the whole shell set into it.
    ///
    /// Any shell fetch failure aborts the install; the generation becomes
    /// redundant and the error propagates so the previous generation stays
    /// active. Early activation is always requested up front, even though
    /// that can cut over an in-flight session.
    pub async fn install(&self) -> Result<()> {
        if self.state().await != LifecycleState::Installing {
            return Err(AppShellError::state(format!(
                "{} cannot install from state {}",
                self.id,
                self.state().await
            )));
        }

        self.skip_waiting.store(true, Ordering::Relaxed);

        {
            let mut storage = self.storage.write().await;
            storage.open(self.version());
        }

        for url in self.shell.urls() {
            let request = FetchRequest::get(url)?;
            let result = self.network.fetch(&request).await;
            let response = match result {
                Ok(response) if response.is_success() => response,
                Ok(response) => {
                    self.set_state(LifecycleState::Redundant).await;
                    warn!(worker = %self.id, url = %url, status = response.status, "shell fetch rejected");
                    return Err(AppShellError::install(format!(
                        "shell url {url} answered {}",
                        response.status
                    )));
                }
                Err(err) => {
                    self.set_state(LifecycleState::Redundant).await;
                    warn!(worker = %self.id, url = %url, error = %err, "shell fetch failed");
                    return Err(AppShellError::install_with_source(
                        format!("shell url {url} unreachable"),
                        err,
                    ));
                }
            };

            let mut storage = self.storage.write().await;
            storage
                .open(self.version())
                .put(request.key(), response.to_snapshot());
        }

        self.set_state(LifecycleState::Installed).await;
        info!(
            worker = %self.id,
            version = %self.version(),
            shell_urls = self.shell.urls().len(),
            "installed"
        );
        Ok(())
    }

    /// Entry action of the activating state: delete every namespace that is
    /// not the current version's, then claim all open clients. Both complete
    /// before the state reads activated.
    pub async fn activate(&self) -> Result<()> {
        if self.state().await != LifecycleState::Installed {
            return Err(AppShellError::state(format!(
                "{} cannot activate from state {}",
                self.id,
                self.state().await
            )));
        }
        self.set_state(LifecycleState::Activating).await;

        let mut deleted = 0;
        {
            let mut storage = self.storage.write().await;
            for name in storage.names() {
                if name != self.version().as_str() {
                    storage.delete(&name);
                    deleted += 1;
                }
            }
        }

        let claimed = self.clients.write().await.claim(self.id);

        self.set_state(LifecycleState::Activated).await;
        info!(
            worker = %self.id,
            version = %self.version(),
            stale_namespaces = deleted,
            claimed,
            "activated"
        );
        Ok(())
    }

    /// Mark this generation as superseded. In-flight revalidations are not
    /// cancelled; they run to natural completion.
    pub async fn make_redundant(&self) {
        if !self.state().await.is_redundant() {
            self.set_state(LifecycleState::Redundant).await;
        }
    }

    /// Intercept one outgoing request.
    ///
    /// Non-GET and cross-origin requests pass through untouched, as does
    /// everything while this generation is not the active one (the host
    /// never routes fetches through a non-activated worker).
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchOutcome> {
        if !self.state().await.is_active() {
            debug!(worker = %self.id, url = %request.url, "not active, passthrough");
            return Ok(FetchOutcome::Passthrough);
        }

        let class = classify(&self.origin, request);
        let strategy = match self.router.route(class) {
            Some(strategy) => strategy,
            None => {
                debug!(worker = %self.id, url = %request.url, ?class, "passthrough");
                return Ok(FetchOutcome::Passthrough);
            }
        };

        debug!(worker = %self.id, url = %request.url, strategy = strategy.name(), "intercepted");
        let cx = self.strategy_context();
        let response = strategy.fetch(&cx, request).await?;
        Ok(FetchOutcome::Respond(response))
    }

    /// React to a control message. Only the skip-waiting sentinel is
    /// recognized; every other payload is ignored silently.
    pub fn handle_message(&self, message: &ControlMessage) {
        if message.is_skip_waiting() {
            info!(worker = %self.id, "early activation requested");
            self.skip_waiting.store(true, Ordering::Relaxed);
        } else {
            debug!(worker = %self.id, "unrecognized control message ignored");
        }
    }

    /// Apply every queued control message.
    pub async fn drain_control(&self) {
        let mut rx = self.control_rx.lock().await;
        while let Some(message) = rx.try_recv() {
            self.handle_message(&message);
        }
    }

    /// Await every in-flight background revalidation.
    pub async fn settle(&self) {
        loop {
            let drained: Vec<JoinHandle<()>> = {
                let mut pending = self.revalidations.lock().await;
                pending.drain(..).collect()
            };
            if drained.is_empty() {
                break;
            }
            for handle in drained {
                let _ = handle.await;
            }
        }
    }

    fn strategy_context(&self) -> StrategyContext {
        StrategyContext {
            version: self.version().clone(),
            root_key: self.shell.root_key(),
            storage: Arc::clone(&self.storage),
            network: Arc::clone(&self.network),
            revalidations: Arc::clone(&self.revalidations),
        }
    }

    /// Classify a request against this generation's origin.
    pub fn classify(&self, request: &FetchRequest) -> RequestClass {
        classify(&self.origin, request)
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("id", &self.id)
            .field("version", self.version())
            .field("origin", &self.origin.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedNetwork;
    use appshell_cache::CacheVersion;
    use serde_json::json;

    fn shell(version: &str) -> ShellManifest {
        ShellManifest::new(
            CacheVersion::new(version),
            vec![
                "https://app.example/".to_string(),
                "https://app.example/manifest.json".to_string(),
                "https://app.example/favicon.ico".to_string(),
            ],
        )
        .unwrap()
    }

    fn manager(network: Arc<ScriptedNetwork>) -> CacheManager {
        CacheManager::new(
            Url::parse("https://app.example/").unwrap(),
            shell("v1"),
            Arc::new(RwLock::new(CacheStorage::new())),
            network,
            Arc::new(RwLock::new(ClientRegistry::new())),
        )
    }

    fn shell_network() -> Arc<ScriptedNetwork> {
        let network = ScriptedNetwork::new();
        network.route(
            "https://app.example/",
            FetchResponse::new("https://app.example/", 200, b"<html>".to_vec()),
        );
        network.route(
            "https://app.example/manifest.json",
            FetchResponse::new("https://app.example/manifest.json", 200, b"{}".to_vec()),
        );
        network.route(
            "https://app.example/favicon.ico",
            FetchResponse::new("https://app.example/favicon.ico", 200, b"ico".to_vec()),
        );
        Arc::new(network)
    }

    #[tokio::test]
    async fn test_install_populates_shell_and_requests_skip_waiting() {
        let manager = manager(shell_network());

        manager.install().await.unwrap();

        assert_eq!(manager.state().await, LifecycleState::Installed);
        assert!(manager.skip_waiting_requested());

        let storage = manager.storage.read().await;
        let ns = storage.get(manager.version()).unwrap();
        assert_eq!(ns.len(), 3);
    }

    #[tokio::test]
    async fn test_install_twice_is_a_state_error() {
        let manager = manager(shell_network());
        manager.install().await.unwrap();

        let err = manager.install().await.unwrap_err();
        assert_eq!(err.category(), "state");
    }

    #[tokio::test]
    async fn test_failed_install_makes_generation_redundant() {
        let network = shell_network();
        network.remove_route("https://app.example/favicon.ico");
        let manager = manager(network);

        let err = manager.install().await.unwrap_err();
        assert_eq!(err.category(), "install");
        assert!(manager.state().await.is_redundant());
    }

    #[tokio::test]
    async fn test_fetch_before_activation_is_passthrough() {
        let manager = manager(shell_network());
        manager.install().await.unwrap();

        let request = FetchRequest::get("https://app.example/assets/main.js").unwrap();
        let outcome = manager.handle_fetch(&request).await.unwrap();
        assert!(outcome.is_passthrough());
    }

    #[tokio::test]
    async fn test_skip_waiting_message_sets_flag() {
        let manager = manager(shell_network());
        assert!(!manager.skip_waiting_requested());

        let channel = manager.channel();
        channel.post(ControlMessage::skip_waiting());
        channel.post(ControlMessage::new(json!({ "type": "NOISE" })));
        manager.drain_control().await;

        assert!(manager.skip_waiting_requested());
    }

    #[tokio::test]
    async fn test_activate_requires_installed() {
        let manager = manager(shell_network());
        let err = manager.activate().await.unwrap_err();
        assert_eq!(err.category(), "state");
    }
}
