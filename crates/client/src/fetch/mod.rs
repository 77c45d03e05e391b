//! HTTP fetch layer shared by the cache router, the lifecycle manager and the
//! story API.
//!
//! ### Network seam
//! - [`Network`] is the only way the core reaches the wire, so tests swap in
//!   scripted fakes.
//! - [`HttpNetwork`] is the reqwest-backed implementation.
//!
//! ### Failure model
//! - Transport failures (DNS, connect, reset, timeout) are `Error::Network`.
//! - Any HTTP status is a successful fetch; callers decide what a non-200 means.

pub mod url;

use bytes::Bytes;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use std::time::{Duration, Instant};
use storyline_core::{CachedResponse, Error};

pub use self::url::{UrlError, canonicalize, resolve_manifest, same_origin};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "storyline/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "storyline/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

impl From<&storyline_core::AppConfig> for FetchConfig {
    fn from(config: &storyline_core::AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// An outbound request as seen by the interception layer.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: None }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parse and canonicalize `url` into a GET request.
    pub fn get_str(url: &str) -> Result<Self, Error> {
        let url = canonicalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::get(url))
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A fully read response.
///
/// The body is a shared buffer: cloning a response for the cache leaves the
/// caller's copy intact.
#[derive(Debug, Clone)]
pub struct Response {
    /// The URL that produced this response (after redirects)
    pub url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body bytes
    pub body: Bytes,
}

impl Response {
    /// Whether this response may be written into a cache generation.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Capture this response for storage under `request`.
    pub fn to_cached(&self, request: &Request) -> CachedResponse {
        CachedResponse {
            method: request.method.as_str().to_string(),
            url: request.url.as_str().to_string(),
            status: self.status.as_u16(),
            headers: self
                .headers
                .iter()
                .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
                .collect(),
            body: self.body.to_vec(),
            cached_at: Utc::now(),
        }
    }

    /// Rebuild a response from a cache entry.
    pub fn from_cached(cached: CachedResponse) -> Result<Self, Error> {
        let url = Url::parse(&cached.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let status = StatusCode::from_u16(cached.status)
            .map_err(|e| Error::Serialization(format!("bad cached status {}: {e}", cached.status)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &cached.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }

        Ok(Self { url, status, headers, body: Bytes::from(cached.body) })
    }

    /// Content-Type header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Anything that can put a request on the wire.
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    /// Perform `request`, returning whatever status the server answered with.
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// reqwest-backed [`Network`].
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    http: Client,
    config: FetchConfig,
}

impl HttpNetwork {
    /// Create a new client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Underlying reqwest client, for multipart and JSON calls.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} {}: {e}", request.method, request.url)))?;

        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(Response { url, status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response(status: StatusCode, body: &'static [u8]) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("text/css"));
        Response {
            url: Url::parse("https://app.example/styles.css").unwrap(),
            status,
            headers,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "storyline/0.1");
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = storyline_core::AppConfig { timeout_ms: 1_500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.timeout, Duration::from_millis(1_500));
        assert_eq!(config.user_agent, app.user_agent);
    }

    #[test]
    fn test_only_ok_is_cacheable() {
        assert!(make_response(StatusCode::OK, b"").is_cacheable());
        assert!(!make_response(StatusCode::NOT_FOUND, b"").is_cacheable());
        assert!(!make_response(StatusCode::NO_CONTENT, b"").is_cacheable());
    }

    #[test]
    fn test_cached_conversion_keeps_body_and_headers() {
        let request = Request::get_str("https://app.example/styles.css").unwrap();
        let response = make_response(StatusCode::OK, b"body { }");

        let cached = response.to_cached(&request);
        assert_eq!(cached.method, "GET");
        assert_eq!(cached.status, 200);

        let rebuilt = Response::from_cached(cached).unwrap();
        assert_eq!(rebuilt.body, response.body);
        assert_eq!(rebuilt.content_type(), Some("text/css"));
        assert_eq!(rebuilt.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_http_network_new() {
        let network = HttpNetwork::new(FetchConfig::default());
        assert!(network.is_ok());
    }
}
