//! HTTP transport for the XML API.
//!
//! The executor and the quota tracker only see the `Transport` trait, so
//! tests can script responses without a network.

mod request;

pub use request::{RenderedRequest, SEARCH_PATH};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};

/// Default user agent sent with every request.
pub const USER_AGENT: &str = concat!("yandex-xml/", env!("CARGO_PKG_VERSION"));

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Loggable line describing the outbound request.
    pub debug: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail with `Error::Remote` unless the status is 2xx.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Remote {
                status: self.status,
                request: self.debug,
            })
        }
    }
}

/// Sends rendered requests. Implementations must be thread-safe.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET. Non-success statuses are returned, not raised; only
    /// failures that produce no status at all are errors.
    async fn send(&self, request: &RenderedRequest) -> Result<HttpResponse>;
}

/// Builder for constructing `HttpClient`.
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
}

impl HttpClientBuilder {
    /// Set the user agent string. Defaults to `yandex-xml/<version>`.
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let user_agent = self.user_agent.as_deref().unwrap_or(USER_AGENT);
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpClient { client })
    }
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a builder with the given request timeout.
    pub fn builder(timeout: Duration) -> HttpClientBuilder {
        HttpClientBuilder {
            timeout,
            user_agent: None,
        }
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: &RenderedRequest) -> Result<HttpResponse> {
        let url = request
            .url()
            .map_err(|e| Error::Configuration(format!("Invalid request URL: {}", e)))?;
        let line = request.debug_line();
        debug!("Request: {}", line);

        let started = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        debug!(
            "Response: {} ({} bytes in {:?})",
            status,
            body.len(),
            started.elapsed()
        );

        Ok(HttpResponse {
            status,
            body,
            debug: line,
        })
    }
}
