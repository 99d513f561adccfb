//! Event bus.
//!
//! A small `Clone`-able struct wrapping `tokio::sync::broadcast` channels,
//! constructed explicitly and passed in via constructor injection rather
//! than reached through a global singleton.

use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// One stage of a background search job's progress.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchStage {
    Starting,
    SearchingPrimary,
    SearchingSecondary,
    RateLimited,
    Complete,
    Error(String),
}

/// Lossy progress notification — subscribers that fall behind drop the oldest
/// of these first.
#[derive(Debug, Clone)]
pub struct SearchProgress {
    pub query_hash: String,
    pub stage: SearchStage,
}

/// Never dropped, and must be delivered in order per `query_hash`.
#[derive(Debug, Clone)]
pub struct SearchResultsUpdated {
    pub query_hash: String,
    pub delta_book_ids: Vec<Uuid>,
    pub source: String,
    pub cumulative_count: usize,
}

#[derive(Debug, Clone)]
pub struct BookCoverUpdated {
    pub book_id: Uuid,
}

/// Process-wide publish/subscribe bus.
///
/// Progress and result-update events are given separate channels: the
/// progress channel is intentionally small (lossy-by-capacity), while the
/// result-update channel is sized generously so bursts of
/// `SearchResultsUpdated` are not silently dropped the way progress events are
/// allowed to be.
#[derive(Clone)]
pub struct EventBus {
    cover_updated: broadcast::Sender<BookCoverUpdated>,
    search_progress: broadcast::Sender<SearchProgress>,
    search_results: broadcast::Sender<SearchResultsUpdated>,
}

impl EventBus {
    pub fn new() -> Self {
        let (cover_updated, _) = broadcast::channel(64);
        let (search_progress, _) = broadcast::channel(64);
        let (search_results, _) = broadcast::channel(1024);
        Self {
            cover_updated,
            search_progress,
            search_results,
        }
    }

    pub fn publish_cover_updated(&self, book_id: Uuid) {
        let _ = self.cover_updated.send(BookCoverUpdated { book_id });
    }

    pub fn subscribe_cover_updated(&self) -> broadcast::Receiver<BookCoverUpdated> {
        self.cover_updated.subscribe()
    }

    pub fn publish_search_progress(&self, event: SearchProgress) {
        let _ = self.search_progress.send(event);
    }

    pub fn subscribe_search_progress(&self) -> broadcast::Receiver<SearchProgress> {
        self.search_progress.subscribe()
    }

    pub fn publish_search_results(&self, event: SearchResultsUpdated) {
        let _ = self.search_results.send(event);
    }

    pub fn subscribe_search_results(&self) -> broadcast::Receiver<SearchResultsUpdated> {
        self.search_results.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedEventBus = Arc<EventBus>;

pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
