//! Scheduler hooks.
//!
//! A plain `tokio::time::interval` timer loop per maintenance task, spawned
//! independently and cancelled together, with explicit, constructor-injected
//! tasks rather than annotation-driven scheduling.

use crate::cache::L1Cache;
use crate::models::list::BookList;
use crate::providers::ProviderAdapter;
use crate::store::RelationalStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Scheduler {
    cancellation: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the three maintenance hooks: L1 eviction sweep, debounced
    /// materialised-view refresh, and bestseller snapshot refresh.
    pub fn start(
        l1: L1Cache,
        store: Option<Arc<dyn RelationalStore>>,
        providers: Vec<Arc<dyn ProviderAdapter>>,
        refresh_interval: Duration,
        bestseller_interval: Duration,
    ) -> Self {
        let cancellation = CancellationToken::new();
        let mut handles = Vec::new();

        handles.push(tokio::spawn(l1_eviction_loop(l1, cancellation.clone())));

        if let Some(store) = store.clone() {
            handles.push(tokio::spawn(search_view_refresh_loop(
                store,
                refresh_interval,
                cancellation.clone(),
            )));
        }

        if let Some(store) = store {
            handles.push(tokio::spawn(bestseller_refresh_loop(
                store,
                providers,
                bestseller_interval,
                cancellation.clone(),
            )));
        }

        Self { cancellation, handles }
    }

    pub async fn shutdown(self) {
        self.cancellation.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn l1_eviction_loop(l1: L1Cache, cancellation: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = ticker.tick() => l1.run_pending_tasks().await,
        }
    }
}

/// Debounces `refreshSearchView` to at most one call per `interval` unless
/// a caller forces an out-of-band refresh via the CLI's `--force` flag.
async fn search_view_refresh_loop(store: Arc<dyn RelationalStore>, interval: Duration, cancellation: CancellationToken) {
    let last_refresh = Mutex::new(Instant::now() - interval);
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = ticker.tick() => {
                let mut guard = last_refresh.lock().await;
                if guard.elapsed() >= interval
                    && let Err(e) = store.refresh_search_view().await
                {
                    log::warn!("scheduled search view refresh failed: {e}");
                }
                *guard = Instant::now();
            }
        }
    }
}

async fn bestseller_refresh_loop(
    store: Arc<dyn RelationalStore>,
    providers: Vec<Arc<dyn ProviderAdapter>>,
    interval: Duration,
    cancellation: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = ticker.tick() => {
                for provider in &providers {
                    if !provider.capability().supports_bestseller_overview {
                        continue;
                    }
                    match provider.fetch_bestseller_overview().await {
                        Ok(payload) => {
                            if let Err(e) = persist_bestseller_overview(store.as_ref(), provider.name(), payload.json).await {
                                log::warn!("failed to persist bestseller overview from {}: {e}", provider.name());
                            }
                        }
                        Err(e) => log::warn!("bestseller overview fetch failed for {}: {e}", provider.name()),
                    }
                }
            }
        }
    }
}

/// Best-effort parse of a bestseller overview payload into `BookList` rows.
/// The exact shape is provider-specific and opaque to the rest of the engine;
/// this only extracts the minimal fields needed to persist a list row.
async fn persist_bestseller_overview(
    store: &dyn RelationalStore,
    provider_name: &str,
    json: serde_json::Value,
) -> crate::error::EngineResult<()> {
    let published_date = json
        .get("published_date")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let list = BookList {
        list_id: uuid::Uuid::now_v7(),
        provider: provider_name.to_string(),
        provider_list_code: json
            .get("list_code")
            .and_then(|v| v.as_str())
            .unwrap_or("overview")
            .to_string(),
        published_date,
        display_name: json.get("display_name").and_then(|v| v.as_str()).map(str::to_string),
        raw_json_response: json,
    };
    store.upsert_book_list(&list).await
}
