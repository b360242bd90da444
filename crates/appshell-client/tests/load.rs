//! Page-load scenarios across the controller, registry, and worker.

use appshell_cache::{CacheStorage, CacheVersion, ShellManifest};
use appshell_client::{
    ControllerConfig, LoadOutcome, RegistrationController, WorkerRegistry,
};
use appshell_worker::{
    ClientRegistry, FetchRequest, FetchResponse, Network, ScriptedNetwork,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

const ROOT: &str = "https://app.example/";
const MANIFEST: &str = "https://app.example/manifest.json";
const FAVICON: &str = "https://app.example/favicon.ico";

fn shell(version: &str) -> ShellManifest {
    ShellManifest::new(
        CacheVersion::new(version),
        vec![ROOT.to_string(), MANIFEST.to_string(), FAVICON.to_string()],
    )
    .unwrap()
}

struct Page {
    controller: RegistrationController,
    registry: Arc<WorkerRegistry>,
    storage: Arc<RwLock<CacheStorage>>,
    clients: Arc<RwLock<ClientRegistry>>,
    network: Arc<ScriptedNetwork>,
}

fn page() -> Page {
    let network = ScriptedNetwork::new();
    network.route(ROOT, FetchResponse::new(ROOT, 200, b"<html>v1</html>".to_vec()));
    network.route(MANIFEST, FetchResponse::new(MANIFEST, 200, b"{}".to_vec()));
    network.route(FAVICON, FetchResponse::new(FAVICON, 200, b"ico".to_vec()));
    let network = Arc::new(network);

    let storage = Arc::new(RwLock::new(CacheStorage::new()));
    let clients = Arc::new(RwLock::new(ClientRegistry::new()));
    let registry = Arc::new(WorkerRegistry::new(
        Arc::clone(&storage),
        Arc::clone(&clients),
        Arc::clone(&network) as Arc<dyn Network>,
    ));
    let controller = RegistrationController::new(
        Arc::clone(&registry),
        Arc::clone(&storage),
        ControllerConfig::default(),
    );
    Page {
        controller,
        registry,
        storage,
        clients,
        network,
    }
}

#[tokio::test(start_paused = true)]
async fn deploy_rollout_reaches_a_long_lived_tab() {
    let page = page();
    {
        let mut clients = page.clients.write().await;
        clients.add(Url::parse(ROOT).unwrap());
    }

    // First load on the production host: v1 installs and activates.
    let outcome = page.controller.on_load("app.example.com", shell("v1")).await;
    assert_eq!(outcome, LoadOutcome::Registered);
    assert_eq!(
        page.registry.active_version("/").await,
        Some(CacheVersion::new("v1"))
    );

    // A deploy ships v2 with fresh markup.
    page.network
        .route(ROOT, FetchResponse::new(ROOT, 200, b"<html>v2</html>".to_vec()));
    page.registry.publish(shell("v2")).await;

    // The tab stays open; the next update check rolls it forward.
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(
        page.registry.active_version("/").await,
        Some(CacheVersion::new("v2"))
    );

    // v2's activation garbage-collected v1 and claimed the open tab.
    assert_eq!(page.storage.read().await.names(), vec!["v2".to_string()]);
    let worker = page.registry.active_worker("/").await.unwrap();
    assert_eq!(
        page.clients.read().await.controlled_by(worker.id()).len(),
        1
    );

    // The install-time shell snapshot answers offline navigations.
    page.network.set_offline(true);
    let offline = worker
        .handle_fetch(&FetchRequest::navigation(ROOT).unwrap())
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert!(offline.served_from_cache);
    assert_eq!(offline.body, b"<html>v2</html>");

    page.controller.stop_polling().await;
}

#[tokio::test]
async fn preview_host_load_leaves_nothing_behind() {
    let page = page();

    // Leftover state from an earlier session on this origin.
    page.registry.register("/", shell("v1")).await.unwrap();
    {
        let mut storage = page.storage.write().await;
        storage.open(&CacheVersion::new("v0"));
        storage.open(&CacheVersion::new("other-app"));
    }

    let outcome = page
        .controller
        .on_load("pr-1234.preview.app", shell("v1"))
        .await;
    assert_eq!(outcome, LoadOutcome::CachingDisabled);

    // Property: zero registrations, zero namespaces, page load continues.
    assert!(page.registry.registrations().await.is_empty());
    assert!(page.storage.read().await.names().is_empty());
}

#[tokio::test]
async fn production_load_installs_the_shell_set() {
    let page = page();

    page.controller.on_load("app.example.com", shell("v1")).await;

    let storage = page.storage.read().await;
    let namespace = storage.get(&CacheVersion::new("v1")).unwrap();
    assert_eq!(namespace.len(), 3);

    drop(storage);
    page.controller.stop_polling().await;
}
