//! Rate-limited search engine: returns a cached slice immediately and fans
//! background provider search out at most once per in-flight query hash.

use crate::aggregator::{aggregate, PrecedenceSource, SourcedPayload};
use crate::circuit::CircuitBreaker;
use crate::events::{SearchProgress, SearchResultsUpdated, SearchStage, SharedEventBus};
use crate::fetcher::TieredFetcher;
use crate::models::book::CanonicalBook;
use crate::providers::{ProviderAdapter, SearchOrder};
use crate::resolver::canonicalize_and_persist;
use crate::store::RelationalStore;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Computes a stable hash of the query and its filters using blake3, used
/// as the job registry key and the cached-slice lookup key.
pub fn compute_query_hash(query: &str, language: Option<&str>, order: SearchOrder) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(query.as_bytes());
    hasher.update(language.unwrap_or("").as_bytes());
    hasher.update(if order == SearchOrder::Newest { b"newest" } else { b"relevance" });
    hasher.finalize().to_hex().to_string()
}

/// The immediate cached slice plus a handle for the caller to keep listening
/// for `SearchResultsUpdated`/`SearchProgress`.
pub struct SearchResponse {
    pub query_hash: String,
    pub cached_books: Vec<CanonicalBook>,
    pub has_more: bool,
}

struct SearchJobHandle {
    cancellation: CancellationToken,
}

/// The search engine's job registry: at most one background job per query hash.
pub struct SearchEngine {
    fetcher: Arc<TieredFetcher>,
    store: Option<Arc<dyn RelationalStore>>,
    primary: Arc<dyn ProviderAdapter>,
    secondary: Arc<dyn ProviderAdapter>,
    circuit: Arc<CircuitBreaker>,
    events: SharedEventBus,
    jobs: DashMap<String, SearchJobHandle>,
    alternation_counter: AtomicU32,
}

impl SearchEngine {
    pub fn new(
        fetcher: Arc<TieredFetcher>,
        store: Option<Arc<dyn RelationalStore>>,
        primary: Arc<dyn ProviderAdapter>,
        secondary: Arc<dyn ProviderAdapter>,
        circuit: Arc<CircuitBreaker>,
        events: SharedEventBus,
    ) -> Self {
        Self {
            fetcher,
            store,
            primary,
            secondary,
            circuit,
            events,
            jobs: DashMap::new(),
            alternation_counter: AtomicU32::new(0),
        }
    }

    /// Computes the hash, returns the cached slice immediately, and launches
    /// a background job if none is already running for this hash.
    pub async fn search(self: &Arc<Self>, query: &str, limit: usize, language: Option<&str>) -> SearchResponse {
        let query_hash = compute_query_hash(query, language, SearchOrder::Relevance);
        self.events.publish_search_progress(SearchProgress {
            query_hash: query_hash.clone(),
            stage: SearchStage::Starting,
        });

        let cached_books = self
            .fetcher
            .search_books_cached(query, limit)
            .await
            .unwrap_or_default();

        if !self.jobs.contains_key(&query_hash) {
            self.launch_background_job(query_hash.clone(), query.to_string(), limit, language.map(str::to_string));
        }

        SearchResponse {
            query_hash,
            cached_books,
            has_more: true,
        }
    }

    /// Cooperative cancellation for a running background job.
    pub fn cancel(&self, query_hash: &str) {
        if let Some(job) = self.jobs.get(query_hash) {
            job.cancellation.cancel();
        }
    }

    fn launch_background_job(self: &Arc<Self>, query_hash: String, query: String, limit: usize, language: Option<String>) {
        let cancellation = CancellationToken::new();
        self.jobs.insert(
            query_hash.clone(),
            SearchJobHandle {
                cancellation: cancellation.clone(),
            },
        );

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_background_job(query_hash.clone(), query, limit, language, cancellation).await;
            engine.jobs.remove(&query_hash);
        });
    }

    async fn run_background_job(
        &self,
        query_hash: String,
        query: String,
        limit: usize,
        language: Option<String>,
        cancellation: CancellationToken,
    ) {
        let mut seen = HashSet::new();
        let mut cumulative_count = 0usize;

        let use_primary_first = self.alternation_counter.fetch_add(1, Ordering::Relaxed) % 2 == 0;
        let order = if use_primary_first {
            [(&self.primary, "primary"), (&self.secondary, "secondary")]
        } else {
            [(&self.secondary, "secondary"), (&self.primary, "primary")]
        };

        for (provider, stage_name) in order {
            if cancellation.is_cancelled() {
                break;
            }
            if cumulative_count >= limit {
                break;
            }

            self.events.publish_search_progress(SearchProgress {
                query_hash: query_hash.clone(),
                stage: if stage_name == "primary" {
                    SearchStage::SearchingPrimary
                } else {
                    SearchStage::SearchingSecondary
                },
            });

            if !self.circuit.is_allowed(provider.name()) {
                self.events.publish_search_progress(SearchProgress {
                    query_hash: query_hash.clone(),
                    stage: SearchStage::RateLimited,
                });
                continue;
            }

            let page = provider
                .search_volumes(&query, 0, SearchOrder::Relevance, language.as_deref(), false)
                .await;

            let page = match page {
                Ok(page) => {
                    self.circuit.report_success(provider.name());
                    page
                }
                Err(e) => {
                    if e.is_retryable() {
                        self.circuit.report_failure(provider.name());
                    }
                    self.events.publish_search_progress(SearchProgress {
                        query_hash: query_hash.clone(),
                        stage: SearchStage::Error(e.to_string()),
                    });
                    continue;
                }
            };

            let mut delta_ids = Vec::new();
            for item in page.items {
                if cancellation.is_cancelled() {
                    break;
                }
                let candidate_id = item
                    .json
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                if candidate_id.is_empty() || !seen.insert(candidate_id.clone()) {
                    continue;
                }

                if let Some(store) = &self.store {
                    let source = if stage_name == "primary" {
                        PrecedenceSource::UnauthenticatedPrimary
                    } else {
                        PrecedenceSource::Secondary
                    };
                    let normalized = provider.normalize(item.json);
                    let book = aggregate(Uuid::now_v7(), String::new(), vec![SourcedPayload { source, json: normalized }]);
                    match canonicalize_and_persist(store.as_ref(), book, provider.name(), Some(&candidate_id)).await {
                        Ok(persisted) => {
                            delta_ids.push(persisted.book_id);
                            cumulative_count += 1;
                        }
                        Err(e) => log::warn!("failed to persist search result {candidate_id}: {e}"),
                    }
                } else {
                    cumulative_count += 1;
                }
            }

            if !delta_ids.is_empty() {
                self.events.publish_search_results(SearchResultsUpdated {
                    query_hash: query_hash.clone(),
                    delta_book_ids: delta_ids,
                    source: stage_name.to_string(),
                    cumulative_count,
                });
            }
        }

        let final_stage = if cancellation.is_cancelled() {
            SearchStage::Error("cancelled".to_string())
        } else {
            SearchStage::Complete
        };
        self.events.publish_search_progress(SearchProgress {
            query_hash,
            stage: final_stage,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_hash_is_stable_for_same_inputs() {
        let a = compute_query_hash("dune", Some("en"), SearchOrder::Relevance);
        let b = compute_query_hash("dune", Some("en"), SearchOrder::Relevance);
        assert_eq!(a, b);
    }

    #[test]
    fn query_hash_differs_on_language() {
        let a = compute_query_hash("dune", Some("en"), SearchOrder::Relevance);
        let b = compute_query_hash("dune", Some("fr"), SearchOrder::Relevance);
        assert_ne!(a, b);
    }
}
