//! Fetch request/response types and the network seam.

use appshell_cache::{CachedResponse, RequestKey, ResponseKind};
use appshell_core::{AppShellError, Result};
use async_trait::async_trait;
use hashbrown::HashMap;
use url::Url;

/// An outgoing request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request method, uppercase.
    pub method: String,

    /// Absolute request URL.
    pub url: Url,

    /// Request headers.
    pub headers: HashMap<String, String>,

    /// Whether this is a document navigation (mode "navigate").
    pub is_navigation: bool,
}

impl FetchRequest {
    /// A plain GET for a subresource.
    pub fn get(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| AppShellError::InvalidArgument(format!("invalid url {url}: {e}")))?;
        Ok(Self {
            method: "GET".to_string(),
            url,
            headers: HashMap::new(),
            is_navigation: false,
        })
    }

    /// A document navigation request.
    pub fn navigation(url: &str) -> Result<Self> {
        let mut request = Self::get(url)?;
        request.is_navigation = true;
        request
            .headers
            .insert("accept".to_string(), "text/html".to_string());
        Ok(request)
    }

    /// Attach a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Use a different method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The Accept header, if any.
    pub fn accept(&self) -> Option<&str> {
        self.header("accept")
    }

    /// Check if this is a GET.
    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Check if the request targets the given origin.
    pub fn same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }

    /// The cache key for this request.
    pub fn key(&self) -> RequestKey {
        RequestKey {
            method: self.method.clone(),
            url: self.url.to_string(),
        }
    }
}

/// A response obtained from the network or the cache.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL the response was served from.
    pub url: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Response kind.
    pub kind: ResponseKind,

    /// Whether the response went through a redirect.
    pub redirected: bool,

    /// Whether this came out of a cache namespace rather than the network.
    pub served_from_cache: bool,
}

impl FetchResponse {
    /// A fresh network response.
    pub fn new(url: impl Into<String>, status: u16, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HashMap::new(),
            body,
            kind: ResponseKind::Basic,
            redirected: false,
            served_from_cache: false,
        }
    }

    /// Attach a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Mark as redirected.
    pub fn with_redirected(mut self, redirected: bool) -> Self {
        self.redirected = redirected;
        self
    }

    /// Set the response kind.
    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    /// Get a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Check if the response is a success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether a background refresh may overwrite the cached entry with this
    /// response: status 200, same-origin basic, and not redirected.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic && !self.redirected
    }

    /// Rehydrate a response from a stored snapshot.
    pub fn from_snapshot(snapshot: &CachedResponse) -> Self {
        Self {
            url: snapshot.url.clone(),
            status: snapshot.status,
            headers: snapshot.headers.clone(),
            body: snapshot.body.clone(),
            kind: snapshot.kind,
            redirected: snapshot.redirected,
            served_from_cache: true,
        }
    }

    /// Snapshot this response for storage.
    pub fn to_snapshot(&self) -> CachedResponse {
        let mut snapshot = CachedResponse::new(self.url.clone(), self.status, self.body.clone());
        snapshot.headers = self.headers.clone();
        snapshot.kind = self.kind;
        snapshot.redirected = self.redirected;
        snapshot
    }
}

/// The network seam: issue a request, obtain a response or a failure.
///
/// No timeouts are enforced at this layer; implementations inherit whatever
/// their underlying client provides.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_key_round_trip() {
        let request = FetchRequest::get("https://app.example/main.js").unwrap();
        let key = request.key();
        assert_eq!(key.method, "GET");
        assert_eq!(key.url, "https://app.example/main.js");
    }

    #[test]
    fn test_same_origin() {
        let origin = Url::parse("https://app.example/").unwrap();
        let same = FetchRequest::get("https://app.example/api/data").unwrap();
        let other = FetchRequest::get("https://cdn.example/lib.js").unwrap();

        assert!(same.same_origin(&origin));
        assert!(!other.same_origin(&origin));
    }

    #[test]
    fn test_navigation_request_accepts_html() {
        let request = FetchRequest::navigation("https://app.example/settings").unwrap();
        assert!(request.is_navigation);
        assert_eq!(request.accept(), Some("text/html"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = FetchRequest::get("not a url").unwrap_err();
        assert_eq!(err.category(), "invalid_argument");
    }

    #[test]
    fn test_cacheable_rules() {
        let ok = FetchResponse::new("https://app.example/a.js", 200, vec![]);
        assert!(ok.is_cacheable());

        let redirected = FetchResponse::new("https://app.example/a.js", 200, vec![])
            .with_redirected(true);
        assert!(!redirected.is_cacheable());

        let opaque = FetchResponse::new("https://cdn.example/a.js", 200, vec![])
            .with_kind(ResponseKind::Opaque);
        assert!(!opaque.is_cacheable());

        let created = FetchResponse::new("https://app.example/a.js", 201, vec![]);
        assert!(!created.is_cacheable());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let live = FetchResponse::new("https://app.example/", 200, b"<html>".to_vec())
            .with_header("content-type", "text/html");
        let snapshot = live.to_snapshot();
        let restored = FetchResponse::from_snapshot(&snapshot);

        assert_eq!(restored.body, live.body);
        assert_eq!(restored.header("content-type"), Some("text/html"));
        assert!(restored.served_from_cache);
        assert!(!live.served_from_cache);
    }
}
