//! Definition lookups used to enrich the inbox.
//!
//! Lookups are best effort: a failed lookup is logged and appends nothing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use negotiator_core::{
    ContractOffer, DiscoveryMode, InboxEntry, InboxLog, NegotiationId, NegotiatorError,
    NegotiatorResult,
};

/// Service holding definition documents.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Definitions associated with a negotiation.
    async fn by_negotiation(&self, id: NegotiationId) -> NegotiatorResult<Vec<Value>>;

    /// Definitions whose content hash is one of the comma-separated `hashes`.
    async fn by_hashes(&self, hashes: &str) -> NegotiatorResult<Vec<Value>>;
}

/// Definitions service reached over HTTP.
///
/// Queries `GET {base}/definitions?id=<id>` and `GET {base}/definitions?hash=<csv>`,
/// both answering with a JSON array of documents.
#[derive(Debug, Clone)]
pub struct HttpDefinitionSource {
    client: reqwest::Client,
    definitions_url: String,
}

impl HttpDefinitionSource {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> NegotiatorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NegotiatorError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl AsRef<str>, client: reqwest::Client) -> Self {
        let base_url = base_url.as_ref().trim_end_matches('/');
        Self {
            client,
            definitions_url: format!("{}/definitions", base_url),
        }
    }

    async fn lookup(&self, key: &str, value: &str) -> NegotiatorResult<Vec<Value>> {
        let response = self
            .client
            .get(&self.definitions_url)
            .query(&[(key, value)])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| NegotiatorError::Transport(format!("Definitions request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NegotiatorError::Transport(format!(
                "Definitions service responded with {}",
                status
            )));
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| NegotiatorError::Transport(format!("Invalid definitions body: {}", e)))
    }
}

#[async_trait]
impl DefinitionSource for HttpDefinitionSource {
    async fn by_negotiation(&self, id: NegotiationId) -> NegotiatorResult<Vec<Value>> {
        self.lookup("id", &id.to_string()).await
    }

    async fn by_hashes(&self, hashes: &str) -> NegotiatorResult<Vec<Value>> {
        self.lookup("hash", hashes).await
    }
}

#[derive(Debug, Clone)]
enum Query {
    ById,
    ByHash(String),
}

/// Runs definition lookups as background tasks and appends what they find.
pub struct DefinitionFetcher {
    source: Arc<dyn DefinitionSource>,
    inbox: Arc<InboxLog>,
    runtime: Handle,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl DefinitionFetcher {
    pub fn new(source: Arc<dyn DefinitionSource>, inbox: Arc<InboxLog>, runtime: Handle) -> Self {
        Self {
            source,
            inbox,
            runtime,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Look up definitions for negotiation `id` in the background.
    pub fn spawn_by_id(&self, id: NegotiationId) {
        self.spawn(id, Query::ById);
    }

    /// Look up definitions referenced by hash in `offer` in the background.
    ///
    /// Returns `false` without issuing a query if the offer has no `:hash`
    /// arguments.
    pub fn spawn_by_hash(&self, id: NegotiationId, offer: &ContractOffer) -> bool {
        match offer.hash_query() {
            Some(hashes) => {
                self.spawn(id, Query::ByHash(hashes));
                true
            }
            None => false,
        }
    }

    /// Look up definitions for negotiation `id` and append them. Returns the
    /// number of entries appended.
    pub async fn collect_by_id(&self, id: NegotiationId) -> usize {
        collect(self.source.as_ref(), &self.inbox, id, Query::ById).await
    }

    /// Look up definitions referenced by hash in `offer` and append them.
    pub async fn collect_by_hash(&self, id: NegotiationId, offer: &ContractOffer) -> usize {
        match offer.hash_query() {
            Some(hashes) => collect(self.source.as_ref(), &self.inbox, id, Query::ByHash(hashes)).await,
            None => 0,
        }
    }

    /// Wait for every lookup started so far, including ones started while waiting.
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.in_flight.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!("Definition lookup task failed: {}", e);
                }
            }
        }
    }

    fn spawn(&self, id: NegotiationId, query: Query) {
        let source = Arc::clone(&self.source);
        let inbox = Arc::clone(&self.inbox);
        let handle = self.runtime.spawn(async move {
            collect(source.as_ref(), &inbox, id, query).await;
        });

        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }
}

async fn collect(
    source: &dyn DefinitionSource,
    inbox: &InboxLog,
    id: NegotiationId,
    query: Query,
) -> usize {
    if id <= 0 {
        tracing::warn!("Skipping definition lookup for negotiation {}: ids must be positive", id);
        return 0;
    }

    let (result, mode) = match &query {
        Query::ById => (source.by_negotiation(id).await, DiscoveryMode::ById),
        Query::ByHash(hashes) => (source.by_hashes(hashes).await, DiscoveryMode::ByHash),
    };

    match result {
        Ok(definitions) => {
            let mut count = 0;
            for definition in definitions {
                match InboxEntry::definition_found(id, mode, definition) {
                    Ok(entry) => {
                        inbox.append(entry);
                        count += 1;
                    }
                    Err(e) => tracing::warn!("{}", e),
                }
            }
            tracing::debug!("Found {} definitions for negotiation {} ({:?})", count, id, mode);
            count
        }
        Err(e) => {
            tracing::error!(
                "Failed to acquire definitions related to negotiation {} ({:?}): {}",
                id,
                query,
                e
            );
            0
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{extract::Query as QueryParams, routing::get, Json, Router};
    use negotiator_core::{EntryKind, TrustedContract};
    use serde_json::json;
    use std::collections::HashMap;

    /// In-memory definitions keyed by negotiation id and by hash.
    #[derive(Default)]
    pub(crate) struct StaticDefinitions {
        pub by_id: HashMap<NegotiationId, Vec<Value>>,
        pub by_hash: HashMap<String, Vec<Value>>,
        pub failing: bool,
    }

    #[async_trait]
    impl DefinitionSource for StaticDefinitions {
        async fn by_negotiation(&self, id: NegotiationId) -> NegotiatorResult<Vec<Value>> {
            if self.failing {
                return Err(NegotiatorError::Transport("unreachable".into()));
            }
            Ok(self.by_id.get(&id).cloned().unwrap_or_default())
        }

        async fn by_hashes(&self, hashes: &str) -> NegotiatorResult<Vec<Value>> {
            if self.failing {
                return Err(NegotiatorError::Transport("unreachable".into()));
            }
            Ok(self.by_hash.get(hashes).cloned().unwrap_or_default())
        }
    }

    fn offer_with(arguments: &[(&str, &str)]) -> ContractOffer {
        let contract = arguments
            .iter()
            .fold(TrustedContract::new("purchase.txt"), |c, (k, v)| {
                c.with_argument(*k, *v)
            });
        ContractOffer::new("buyer", "seller", chrono::Duration::minutes(3), vec![contract])
    }

    fn fetcher(source: StaticDefinitions) -> (DefinitionFetcher, Arc<InboxLog>) {
        let inbox = Arc::new(InboxLog::new());
        let fetcher = DefinitionFetcher::new(Arc::new(source), Arc::clone(&inbox), Handle::current());
        (fetcher, inbox)
    }

    #[tokio::test]
    async fn by_id_appends_positive_ids() {
        let mut source = StaticDefinitions::default();
        source.by_id.insert(42, vec![json!({"name": "a"}), json!({"name": "b"})]);
        let (fetcher, inbox) = fetcher(source);

        assert_eq!(fetcher.collect_by_id(42).await, 2);
        let entries = inbox.read_from(0);
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(entry.kind(), EntryKind::DefinitionFound);
            assert_eq!(entry.wire_negotiation_id(), 42);
        }
    }

    #[tokio::test]
    async fn by_hash_appends_negated_ids() {
        let mut source = StaticDefinitions::default();
        source.by_hash.insert("x,y".into(), vec![json!({"name": "terms"})]);
        let (fetcher, inbox) = fetcher(source);

        let offer = offer_with(&[("a:hash", "x"), ("b:hash", "y"), ("c", "z")]);
        assert_eq!(fetcher.collect_by_hash(42, &offer).await, 1);

        let entries = inbox.read_from(0);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].wire_negotiation_id(), -42);
        assert_eq!(entries[0].negotiation_id(), 42);
    }

    #[tokio::test]
    async fn non_positive_ids_are_skipped() {
        let mut source = StaticDefinitions::default();
        source.by_id.insert(0, vec![json!({"name": "a"})]);
        source.by_hash.insert("x".into(), vec![json!({"name": "terms"})]);
        let (fetcher, inbox) = fetcher(source);

        let offer = offer_with(&[("a:hash", "x")]);
        assert_eq!(fetcher.collect_by_id(0).await, 0);
        assert_eq!(fetcher.collect_by_hash(0, &offer).await, 0);
        assert_eq!(fetcher.collect_by_hash(i64::MIN, &offer).await, 0);

        fetcher.spawn_by_hash(i64::MIN, &offer);
        fetcher.settle().await;
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn no_hash_arguments_issue_no_query() {
        let (fetcher, inbox) = fetcher(StaticDefinitions {
            failing: true,
            ..Default::default()
        });

        assert!(!fetcher.spawn_by_hash(1, &offer_with(&[("c", "z")])));
        fetcher.settle().await;
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn failed_lookup_appends_nothing() {
        let (fetcher, inbox) = fetcher(StaticDefinitions {
            failing: true,
            ..Default::default()
        });

        fetcher.spawn_by_id(3);
        assert!(fetcher.spawn_by_hash(3, &offer_with(&[("a:hash", "x")])));
        fetcher.settle().await;
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn http_source_queries_definitions_endpoint() {
        async fn definitions(
            QueryParams(params): QueryParams<HashMap<String, String>>,
        ) -> Json<Vec<Value>> {
            match (params.get("id"), params.get("hash")) {
                (Some(id), _) => Json(vec![json!({"for": id})]),
                (_, Some(hashes)) => Json(
                    hashes
                        .split(',')
                        .map(|h| json!({"hash": h}))
                        .collect(),
                ),
                _ => Json(vec![]),
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/definitions", get(definitions));
        tokio::spawn(async move { axum::serve(listener, app).await });

        let source =
            HttpDefinitionSource::new(format!("http://{}/", addr), Duration::from_secs(5)).unwrap();

        let by_id = source.by_negotiation(42).await.unwrap();
        assert_eq!(by_id, vec![json!({"for": "42"})]);

        let by_hash = source.by_hashes("x,y").await.unwrap();
        assert_eq!(by_hash, vec![json!({"hash": "x"}), json!({"hash": "y"})]);
    }

    #[tokio::test]
    async fn http_source_reports_error_status() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/definitions",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await });

        let source =
            HttpDefinitionSource::new(format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        let result = source.by_negotiation(1).await;
        assert!(matches!(result, Err(NegotiatorError::Transport(_))));
    }
}
