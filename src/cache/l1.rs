//! L1 process cache.
//!
//! A single `moka::future::Cache` keyed by canonical book id, with an explicit
//! weigher plus TTL/TTI, sized in bytes rather than entry count.

use crate::models::CanonicalBook;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Rough weight of a cached book for the moka weigher: dominated by its raw
/// JSON snapshot.
fn weigh(book: &Arc<CanonicalBook>) -> u32 {
    let json_len = book.raw_json_response.to_string().len();
    (64 + json_len).min(u32::MAX as usize) as u32
}

#[derive(Clone)]
pub struct L1Cache {
    inner: Cache<Uuid, Arc<CanonicalBook>>,
}

impl L1Cache {
    pub fn new(max_capacity_bytes: u64, ttl: Duration, tti: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity_bytes)
            .weigher(|_key, value: &Arc<CanonicalBook>| weigh(value))
            .time_to_live(ttl)
            .time_to_idle(tti)
            .build();
        Self { inner }
    }

    pub async fn get(&self, book_id: Uuid) -> Option<Arc<CanonicalBook>> {
        self.inner.get(&book_id).await
    }

    pub async fn put(&self, book: CanonicalBook) {
        self.inner.insert(book.book_id, Arc::new(book)).await;
    }

    /// Invalidate an entry on a cover-update notification.
    pub async fn invalidate(&self, book_id: Uuid) {
        self.inner.invalidate(&book_id).await;
    }

    /// Force eviction bookkeeping to run now (scheduler hook).
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl Default for L1Cache {
    fn default() -> Self {
        // 64 MiB of approximate JSON weight, 10 minute TTL, 5 minute TTI.
        Self::new(64 * 1024 * 1024, Duration::from_secs(600), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_book() -> CanonicalBook {
        CanonicalBook::blank(Uuid::nil(), "dune".into())
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = L1Cache::default();
        let book = sample_book();
        let id = book.book_id;
        cache.put(book).await;
        let fetched = cache.get(id).await.expect("present");
        assert_eq!(fetched.book_id, id);
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = L1Cache::default();
        let book = sample_book();
        let id = book.book_id;
        cache.put(book).await;
        cache.invalidate(id).await;
        assert!(cache.get(id).await.is_none());
    }
}
