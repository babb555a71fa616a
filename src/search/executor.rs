//! Paced, cached execution of search queries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::query::{validate, SearchQuery, ValidatedQuery};
use super::response::parse_search;
use crate::error::{Error, Result};
use crate::http_client::{RenderedRequest, Transport};
use crate::models::{Account, SearchRecord, SearchResponse};
use crate::rate_limit::{Pacer, PacingMode, QuotaTracker};
use crate::store::{self, SharedStore};

/// Default lifetime of a cached response.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(86400);

/// Runs validated queries against the API, pacing real calls and replaying
/// identical ones from the store.
#[derive(Clone)]
pub struct SearchExecutor {
    account: Arc<Account>,
    transport: Arc<dyn Transport>,
    store: SharedStore,
    tracker: QuotaTracker,
    pacing: PacingMode,
    cache_ttl: Duration,
    defaults: Arc<SearchQuery>,
}

impl SearchExecutor {
    pub fn new(account: Arc<Account>, transport: Arc<dyn Transport>, store: SharedStore) -> Self {
        let tracker = QuotaTracker::new(account.clone(), transport.clone(), store.clone());
        Self {
            account,
            transport,
            store,
            tracker,
            pacing: PacingMode::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            defaults: Arc::new(SearchQuery::default()),
        }
    }

    pub fn with_pacing(mut self, pacing: PacingMode) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Values applied to every query for fields it leaves unset.
    pub fn with_defaults(mut self, defaults: SearchQuery) -> Self {
        self.defaults = Arc::new(defaults);
        self
    }

    pub fn tracker(&self) -> &QuotaTracker {
        &self.tracker
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Validate a query and wrap it for lazy execution.
    pub fn request(&self, query: &SearchQuery) -> Result<SearchRequest> {
        let merged = query.with_defaults(&self.defaults);
        let validated = validate(&merged, self.account.server)?;
        Ok(SearchRequest {
            executor: self.clone(),
            query: validated,
            cancel: CancellationToken::new(),
            response: OnceCell::new(),
        })
    }

    /// Validate, execute and parse in one step.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        self.search_with_cancel(query, &CancellationToken::new())
            .await
    }

    pub async fn search_with_cancel(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let request = self.request(query)?;
        let body = self.fetch(&request.query, cancel).await?;
        parse_search(&body)
    }

    fn render(&self, query: &ValidatedQuery) -> Result<RenderedRequest> {
        let (login, api_key) = self.account.credentials()?;
        Ok(query.render(login, api_key))
    }

    /// Raw payload for a query, from the store or the network.
    pub async fn fetch(&self, query: &ValidatedQuery, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let (login, _) = self.account.credentials()?;
        let request = self.render(query)?;
        let cache_key = store::response_key(&request.signature());

        if let Some(body) = self.store.get(&cache_key).await? {
            debug!("Cache hit for {}", request.debug_line());
            return Ok(body);
        }

        let delay = self.tracker.request_delay().await?;
        let pacer = Pacer::new(self.store.clone(), login, self.pacing);
        pacer.acquire(delay, cancel).await?;

        let sent = tokio::select! {
            sent = self.transport.send(&request) => sent,
            _ = cancel.cancelled() => {
                // The request may already have reached the provider.
                pacer.record_sent().await?;
                return Err(Error::Cancelled);
            }
        };
        let response = sent?;
        pacer.record_sent().await?;

        let response = response.error_for_status()?;
        self.store
            .set(&cache_key, &response.body, Some(self.cache_ttl))
            .await?;
        debug!(
            "Cached {} bytes for {:?}",
            response.body.len(),
            self.cache_ttl
        );

        Ok(response.body)
    }
}

/// One validated query. The parsed response is computed on first access
/// and kept for the lifetime of this value.
pub struct SearchRequest {
    executor: SearchExecutor,
    query: ValidatedQuery,
    cancel: CancellationToken,
    response: OnceCell<SearchResponse>,
}

impl SearchRequest {
    /// Abort pending work when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn query(&self) -> &ValidatedQuery {
        &self.query
    }

    /// Transport parameters this request sends.
    pub fn rendered(&self) -> Result<RenderedRequest> {
        self.executor.render(&self.query)
    }

    /// Parsed response, fetched at most once.
    pub async fn response(&self) -> Result<&SearchResponse> {
        self.response
            .get_or_try_init(|| async {
                let body = self.executor.fetch(&self.query, &self.cancel).await?;
                parse_search(&body)
            })
            .await
    }

    pub async fn results(&self) -> Result<&[SearchRecord]> {
        Ok(&self.response().await?.records)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::time::Instant;

    use super::*;
    use crate::http_client::HttpResponse;
    use crate::models::Server;
    use crate::store::{MemoryStore, Store};

    /// Answers limits-info with a schedule covering now and echoes searches.
    struct FakeTransport {
        hour_limit: u64,
        search_status: u16,
        searches: AtomicUsize,
        limits: AtomicUsize,
    }

    impl FakeTransport {
        fn new(hour_limit: u64, search_status: u16) -> Arc<Self> {
            Arc::new(Self {
                hour_limit,
                search_status,
                searches: AtomicUsize::new(0),
                limits: AtomicUsize::new(0),
            })
        }

        fn searches(&self) -> usize {
            self.searches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: &RenderedRequest) -> Result<HttpResponse> {
            let body = if request.param("action") == Some("limits-info") {
                self.limits.fetch_add(1, Ordering::SeqCst);
                let now = Utc::now();
                let fmt = |t: chrono::DateTime<Utc>| t.format("%Y-%m-%d %H:%M:%S +0000").to_string();
                format!(
                    r#"<yandexsearch><response><limits><time-interval from="{}" to="{}">{}</time-interval></limits></response></yandexsearch>"#,
                    fmt(now - chrono::Duration::hours(1)),
                    fmt(now + chrono::Duration::hours(1)),
                    self.hour_limit
                )
            } else {
                self.searches.fetch_add(1, Ordering::SeqCst);
                format!(
                    r#"<yandexsearch><request><query>{}</query></request><response><results><grouping><group><doc><url>https://example.org/</url><domain>example.org</domain><title>Example</title><modtime></modtime></doc></group></grouping></results></response></yandexsearch>"#,
                    request.param("query").unwrap_or_default()
                )
            };
            let status = if request.param("action").is_some() {
                200
            } else {
                self.search_status
            };
            Ok(HttpResponse {
                status,
                body: body.into_bytes(),
                debug: request.debug_line(),
            })
        }
    }

    fn executor(server: Server, transport: Arc<FakeTransport>) -> (SearchExecutor, MemoryStore) {
        let store = MemoryStore::new();
        let executor = SearchExecutor::new(
            Arc::new(Account::new(server, "alice", "secret")),
            transport,
            Arc::new(store.clone()),
        );
        (executor, store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_queries_hit_network_once() {
        // 1000/hour gives 0.5 rps, a two second delay.
        let transport = FakeTransport::new(1000, 200);
        let (executor, _) = executor(Server::Ru, transport.clone());
        let query = SearchQuery::new("rust").limit(10);

        let first = executor.search(&query).await.unwrap();
        let started = Instant::now();
        let second = executor.search(&query).await.unwrap();

        assert_eq!(transport.searches(), 1);
        assert_eq!(first, second);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(second.records[0].url, "https://example.org/");
        assert_eq!(second.records[0].modified, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_real_call_is_paced() {
        let transport = FakeTransport::new(1000, 200);
        let (executor, _) = executor(Server::Ru, transport.clone());

        executor.search(&SearchQuery::new("first")).await.unwrap();
        let started = Instant::now();
        executor.search(&SearchQuery::new("second")).await.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed > Duration::from_millis(1900), "{:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(2100), "{:?}", elapsed);
        assert_eq!(transport.searches(), 2);
        // The schedule is fetched once and then served from the store.
        assert_eq!(transport.limits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_server_never_waits() {
        let transport = FakeTransport::new(1000, 200);
        let (executor, _) = executor(Server::Com, transport.clone());

        let started = Instant::now();
        executor.search(&SearchQuery::new("one")).await.unwrap();
        executor.search(&SearchQuery::new("two")).await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(transport.limits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_query_is_never_sent() {
        let transport = FakeTransport::new(1000, 200);
        let (executor, _) = executor(Server::Ru, transport.clone());

        let err = executor
            .search(&SearchQuery::new("q").lang("en"))
            .await
            .unwrap_err();
        assert!(err.field_errors().unwrap().has("lang"));
        assert_eq!(transport.searches(), 0);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let transport = FakeTransport::new(1000, 200);
        let executor = SearchExecutor::new(
            Arc::new(Account::default()),
            transport.clone(),
            Arc::new(MemoryStore::new()),
        );
        let request = executor.request(&SearchQuery::new("q")).unwrap();
        assert!(matches!(
            request.response().await,
            Err(Error::Configuration(_))
        ));
        assert_eq!(transport.searches(), 0);
    }

    #[tokio::test]
    async fn test_remote_error_is_not_cached() {
        let transport = FakeTransport::new(1000, 500);
        let (executor, store) = executor(Server::Com, transport.clone());
        let query = SearchQuery::new("q");

        assert!(matches!(
            executor.search(&query).await,
            Err(Error::Remote { status: 500, .. })
        ));
        assert!(executor.search(&query).await.is_err());
        assert_eq!(transport.searches(), 2);
        assert!(store.mark(&store::mark_key("alice")).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_pacing() {
        let transport = FakeTransport::new(1000, 200);
        let (executor, _) = executor(Server::Ru, transport.clone());
        executor.search(&SearchQuery::new("first")).await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let result = executor
            .search_with_cancel(&SearchQuery::new("second"), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(transport.searches(), 1);
    }

    #[tokio::test]
    async fn test_request_memoizes_response() {
        let transport = FakeTransport::new(1000, 200);
        let (executor, store) = executor(Server::Com, transport.clone());
        let request = executor.request(&SearchQuery::new("memo")).unwrap();

        let records = request.results().await.unwrap().to_vec();
        // Dropping the cache proves the second read never consults it.
        let key = store::response_key(&request.rendered().unwrap().signature());
        store.delete(&key).await.unwrap();

        assert_eq!(request.results().await.unwrap(), records.as_slice());
        assert_eq!(request.response().await.unwrap().query.as_deref(), Some("memo"));
        assert_eq!(transport.searches(), 1);
    }

    #[tokio::test]
    async fn test_defaults_fill_unset_fields() {
        let transport = FakeTransport::new(1000, 200);
        let (executor, _) = executor(Server::Ru, transport);
        let executor = executor.with_defaults(SearchQuery {
            limit: Some(10),
            filter: Some("strict".to_string()),
            ..Default::default()
        });

        let request = executor
            .request(&SearchQuery::new("q").filter("none"))
            .unwrap();
        let rendered = request.rendered().unwrap();
        assert_eq!(rendered.param("filter"), Some("none"));
        assert_eq!(
            rendered.param("groupby"),
            Some("attr=d.mode=deep.groups-on-page=10.docs-in-group=1")
        );
    }
}
