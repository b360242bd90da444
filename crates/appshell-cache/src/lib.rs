//! # AppShell Cache
//!
//! Versioned response-snapshot store for the AppShell offline cache engine.
//!
//! ## Features
//!
//! - **CacheVersion**: names one generation of the cache
//! - **CacheNamespace**: request-key → response-snapshot store for one version
//! - **CacheStorage**: all namespaces, any version
//! - **ShellManifest**: the app-shell URL set pre-fetched at install time
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage
//!     ├── CacheNamespace "v1"   (stale, deleted on activate)
//!     └── CacheNamespace "v2"   (current)
//!             └── RequestKey → CachedResponse
//! ```
//!
//! Exactly one version is current at any time. The store holds snapshots
//! only; which requests get stored (GET, same-origin) is enforced by the
//! worker layer.

use appshell_core::{AppShellError, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

// ==================== Version ====================

/// Identifier naming one generation of the offline cache.
///
/// Supplied as a build-time constant by the surrounding application and never
/// mutated at runtime; a deploy supersedes it with a new value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheVersion(String);

impl CacheVersion {
    /// Create a version from its tag (e.g., `"v2"`).
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag, which doubles as the namespace name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ==================== Request Key ====================

/// Method + absolute URL. Effectively GET-only here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    /// Request method, uppercase.
    pub method: String,

    /// Absolute request URL.
    pub url: String,
}

impl RequestKey {
    /// Key for a GET of the given URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
        }
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

// ==================== Cached Response ====================

/// How the response relates to the requesting origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Same-origin response with readable body and headers.
    #[default]
    Basic,
    /// Cross-origin response obtained with CORS.
    Cors,
    /// Cross-origin response with no readable payload.
    Opaque,
    /// Response to a redirected no-cors request.
    OpaqueRedirect,
}

/// A stored snapshot of one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Final URL the response was served from.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Body snapshot.
    pub body: Vec<u8>,

    /// Response kind.
    pub kind: ResponseKind,

    /// Whether the response went through a redirect.
    pub redirected: bool,

    /// Capture time (ms since epoch).
    pub captured_at: u64,
}

impl CachedResponse {
    /// Create a snapshot captured now.
    pub fn new(url: impl Into<String>, status: u16, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HashMap::new(),
            body,
            kind: ResponseKind::Basic,
            redirected: false,
            captured_at: now_ms(),
        }
    }

    /// Attach a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Get content-type from headers.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Check if the snapshot is a success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

// ==================== Namespace ====================

/// A durable key-value store of cached responses for one CacheVersion.
///
/// Created on install of its version, populated lazily (or pre-populated with
/// the shell set), deleted in bulk when a newer version activates or the
/// registration controller purges a disabled environment.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CacheNamespace {
    /// Namespace name; equals the version tag it belongs to.
    name: String,

    entries: HashMap<RequestKey, CachedResponse>,
}

impl CacheNamespace {
    /// Create an empty namespace for a version.
    pub fn new(version: &CacheVersion) -> Self {
        Self {
            name: version.as_str().to_string(),
            entries: HashMap::new(),
        }
    }

    /// Namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match a request key against this namespace.
    pub fn match_key(&self, key: &RequestKey) -> Option<&CachedResponse> {
        self.entries.get(key)
    }

    /// Store a snapshot under a key. Same-key writes are last-write-wins.
    pub fn put(&mut self, key: RequestKey, response: CachedResponse) {
        self.entries.insert(key, response);
    }

    /// Delete an entry.
    pub fn delete(&mut self, key: &RequestKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All stored keys.
    pub fn keys(&self) -> Vec<&RequestKey> {
        self.entries.keys().collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the namespace is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Storage ====================

/// The browser-level collection of cache namespaces, any version.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, CacheNamespace>,
}

impl CacheStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a namespace, creating it if absent.
    pub fn open(&mut self, version: &CacheVersion) -> &mut CacheNamespace {
        self.caches
            .entry(version.as_str().to_string())
            .or_insert_with(|| CacheNamespace::new(version))
    }

    /// Get a namespace by version without creating it.
    pub fn get(&self, version: &CacheVersion) -> Option<&CacheNamespace> {
        self.caches.get(version.as_str())
    }

    /// Check if a namespace exists by name.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a namespace by name.
    pub fn delete(&mut self, name: &str) -> bool {
        let removed = self.caches.remove(name).is_some();
        if removed {
            debug!(namespace = name, "deleted cache namespace");
        }
        removed
    }

    /// All namespace names.
    pub fn names(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }

    /// Match a key against every namespace. Used for the root-document
    /// fallback, which may be satisfied by a previous generation's snapshot.
    pub fn match_any(&self, key: &RequestKey) -> Option<&CachedResponse> {
        self.caches.values().find_map(|ns| ns.match_key(key))
    }

    /// Delete every namespace. Returns how many were removed.
    pub fn purge_all(&mut self) -> usize {
        let count = self.caches.len();
        self.caches.clear();
        if count > 0 {
            debug!(count, "purged all cache namespaces");
        }
        count
    }
}

// ==================== Shell Manifest ====================

/// The app-shell set: a CacheVersion plus the fixed ordered URLs guaranteed
/// available offline before any navigation occurs. The first URL is the
/// document root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellManifest {
    version: CacheVersion,
    urls: Vec<String>,
}

impl ShellManifest {
    /// Create a manifest. The URL list must be non-empty, absolute, and
    /// start with the document root. URLs are normalized so shell entries
    /// and later lookups agree on one key per resource.
    pub fn new(version: CacheVersion, urls: Vec<String>) -> Result<Self> {
        if urls.is_empty() {
            return Err(AppShellError::InvalidArgument(
                "shell manifest needs at least the document root".to_string(),
            ));
        }
        let mut normalized = Vec::with_capacity(urls.len());
        for url in &urls {
            let parsed = Url::parse(url).map_err(|e| {
                AppShellError::InvalidArgument(format!("invalid shell url {url}: {e}"))
            })?;
            normalized.push(parsed.to_string());
        }
        Ok(Self {
            version,
            urls: normalized,
        })
    }

    /// The cache version this shell belongs to.
    pub fn version(&self) -> &CacheVersion {
        &self.version
    }

    /// All shell URLs, root first.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// The document-root URL.
    pub fn root(&self) -> &str {
        &self.urls[0]
    }

    /// Request key of the document root, the last-resort navigation fallback.
    pub fn root_key(&self) -> RequestKey {
        RequestKey::get(self.root())
    }
}
