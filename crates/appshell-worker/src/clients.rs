//! Open document contexts and worker control over them.

use crate::WorkerId;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use url::Url;

/// Unique identifier for an open document context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// An open document context.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: ClientId,

    /// Document URL.
    pub url: Url,

    /// The worker generation currently routing this client's fetches.
    pub controller: Option<WorkerId>,
}

/// All open in-scope document contexts.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, Client>,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open document. Starts uncontrolled.
    pub fn add(&mut self, url: Url) -> ClientId {
        let id = ClientId::next();
        self.clients.insert(
            id,
            Client {
                id,
                url,
                controller: None,
            },
        );
        id
    }

    /// Get a client by ID.
    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// Remove a closed document.
    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        self.clients.remove(&id)
    }

    /// Number of open documents.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether any documents are open.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Route every open document through the given generation immediately,
    /// without waiting for its next navigation. Returns how many clients
    /// changed controller.
    pub fn claim(&mut self, worker: WorkerId) -> usize {
        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if client.controller != Some(worker) {
                client.controller = Some(worker);
                claimed += 1;
            }
        }
        debug!(%worker, claimed, "claimed clients");
        claimed
    }

    /// IDs of clients controlled by the given generation.
    pub fn controlled_by(&self, worker: WorkerId) -> Vec<ClientId> {
        self.clients
            .values()
            .filter(|c| c.controller == Some(worker))
            .map(|c| c.id)
            .collect()
    }
}
