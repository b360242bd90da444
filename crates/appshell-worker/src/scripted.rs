//! Scripted in-memory network for tests and demos.
//!
//! Routes are keyed by URL; an offline switch makes every fetch fail the way
//! an unreachable network would. Calls are recorded so tests can assert on
//! background revalidation traffic.

use crate::net::{FetchRequest, FetchResponse, Network};
use appshell_core::{AppShellError, Result};
use async_trait::async_trait;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

/// A programmable [`Network`] implementation.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: RwLock<HashMap<String, FetchResponse>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    /// Create an online network with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for `url`. Replaces any previous route, which is how
    /// tests model a deploy changing content.
    pub fn route(&self, url: &str, response: FetchResponse) {
        self.routes
            .write()
            .expect("routes lock")
            .insert(url.to_string(), response);
    }

    /// Drop the route for `url`; subsequent fetches of it fail.
    pub fn remove_route(&self, url: &str) {
        self.routes.write().expect("routes lock").remove(url);
    }

    /// Toggle the offline switch.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Every URL fetched so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// How many times `url` was fetched.
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|c| c.as_str() == url)
            .count()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = request.url.to_string();
        self.calls.lock().expect("calls lock").push(url.clone());

        if self.offline.load(Ordering::Relaxed) {
            return Err(AppShellError::network(format!("offline: {url}")));
        }

        self.routes
            .read()
            .expect("routes lock")
            .get(&url)
            .cloned()
            .ok_or_else(|| AppShellError::network(format!("no route to {url}")))
    }
}
