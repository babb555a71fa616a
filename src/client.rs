//! Client facade: quota information and search.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::http_client::{HttpClient, Transport};
use crate::models::{Account, SearchResponse, Server};
use crate::rate_limit::{PacingMode, QuotaSchedule, RateInfo};
use crate::search::{SearchExecutor, SearchQuery, SearchRequest};
use crate::store::SharedStore;

/// Yandex XML search client.
///
/// Cheap to clone; clones share the transport and the store.
///
/// ```no_run
/// # async fn run() -> yandex_xml::Result<()> {
/// use yandex_xml::{Config, SearchQuery, YandexXml};
///
/// let client = YandexXml::from_config(&Config::load().await).await?;
/// let response = client.search(&SearchQuery::new("rust").limit(10)).await?;
/// for record in &response.records {
///     println!("{}. {}", record.position, record.url);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct YandexXml {
    executor: SearchExecutor,
}

impl YandexXml {
    pub fn new(account: Account, transport: Arc<dyn Transport>, store: SharedStore) -> Self {
        Self {
            executor: SearchExecutor::new(Arc::new(account), transport, store),
        }
    }

    /// Build a client with a reqwest transport and the configured store.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let mut builder = HttpClient::builder(config.timeout());
        if let Some(ua) = &config.user_agent {
            builder = builder.user_agent(ua);
        }
        let transport = Arc::new(builder.build()?);
        let store = config.open_store().await?;

        info!(
            "Yandex XML client for {} ({:?} store, {:?} pacing)",
            config.server, config.store.backend, config.pacing
        );

        Ok(Self::new(config.account(), transport, store)
            .with_pacing(config.pacing)
            .with_cache_ttl(config.cache_ttl())
            .with_defaults(config.defaults.clone()))
    }

    pub fn with_pacing(mut self, pacing: PacingMode) -> Self {
        self.executor = self.executor.with_pacing(pacing);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.executor = self.executor.with_cache_ttl(ttl);
        self
    }

    pub fn with_defaults(mut self, defaults: SearchQuery) -> Self {
        self.executor = self.executor.with_defaults(defaults);
        self
    }

    pub fn server(&self) -> Server {
        self.executor.account().server
    }

    /// Current quota and the request cadence derived from it.
    pub async fn rate_info(&self) -> Result<RateInfo> {
        self.executor.tracker().rate_info().await
    }

    pub async fn schedule(&self) -> Result<QuotaSchedule> {
        self.executor.tracker().schedule().await
    }

    pub async fn hour_limit(&self) -> Result<u64> {
        self.executor.tracker().hour_limit().await
    }

    pub async fn rps_limit(&self) -> Result<f64> {
        self.executor.tracker().rps_limit().await
    }

    pub async fn request_delay(&self) -> Result<Duration> {
        self.executor.tracker().request_delay().await
    }

    /// Validate a query without sending it. The returned request fetches
    /// lazily and memoizes its response.
    pub fn request(&self, query: &SearchQuery) -> Result<SearchRequest> {
        self.executor.request(query)
    }

    /// Execute a search.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        self.executor.search(query).await
    }

    /// Execute a search, aborting the pacing wait or the call on `cancel`.
    pub async fn search_with_cancel(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        self.executor.search_with_cancel(query, cancel).await
    }
}
