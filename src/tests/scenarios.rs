//! End-to-end scenario tests exercising cross-module round trips.

use super::fakes::{FakeProvider, InMemoryStore};
use crate::cache::{L1Cache, ObjectCacheAdapter};
use crate::circuit::CircuitBreaker;
use crate::config::{CircuitConfig, EngineConfig, RetryConfig, WriteBackPolicy};
use crate::events::create_event_bus;
use crate::fetcher::TieredFetcher;
use crate::migration::{MigrationEngine, ThrottleConfig};
use crate::models::book::CanonicalBook;
use crate::providers::ProviderAdapter;
use crate::resolver::canonicalize_and_persist;
use crate::search::SearchEngine;
use crate::store::RelationalStore;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn object_cache() -> Arc<ObjectCacheAdapter> {
    Arc::new(ObjectCacheAdapter::new(
        Arc::new(InMemory::new()),
        RetryConfig::default(),
        WriteBackPolicy::KeepExisting,
    ))
}

fn fetcher_with(
    store: Option<Arc<dyn RelationalStore>>,
    object_cache: Option<Arc<ObjectCacheAdapter>>,
    primary: Arc<dyn ProviderAdapter>,
    secondary: Arc<dyn ProviderAdapter>,
    circuit: Arc<CircuitBreaker>,
) -> TieredFetcher {
    TieredFetcher::new(
        L1Cache::default(),
        store,
        object_cache,
        primary,
        secondary,
        circuit,
        EngineConfig::default(),
    )
}

/// Scenario 1: cold read by canonical UUID, DB hit, no provider calls.
#[tokio::test]
async fn cold_read_by_canonical_uuid_hits_relational_tier_only() {
    let store = Arc::new(InMemoryStore::new());
    let book_id = Uuid::now_v7();
    let mut book = CanonicalBook::blank(book_id, "dune".into());
    book.title = "Dune".into();
    store.seed(book);

    let primary = Arc::new(FakeProvider::new("primary"));
    let secondary = Arc::new(FakeProvider::new("secondary"));
    let circuit = Arc::new(CircuitBreaker::new(CircuitConfig::default()));

    let fetcher = fetcher_with(
        Some(store.clone() as Arc<dyn RelationalStore>),
        None,
        primary.clone(),
        secondary.clone(),
        circuit,
    );

    let result = fetcher.get_book(&book_id.to_string()).await.unwrap();
    assert_eq!(result.title, "Dune");
    assert_eq!(primary.call_count(), 0);
    assert_eq!(secondary.call_count(), 0);
}

/// Scenario 2: cold read by ISBN-13 fans out to both providers and persists
/// the aggregated record.
#[tokio::test]
async fn cold_read_by_isbn13_fans_out_and_persists_aggregate() {
    let isbn = "9780441013593";
    let store = Arc::new(InMemoryStore::new());
    let primary = Arc::new(
        FakeProvider::new("primary").with_isbn(isbn, json!({"title": "Dune", "authors": ["Frank Herbert"], "description": "short"})),
    );
    let secondary = Arc::new(
        FakeProvider::new("secondary").with_isbn(
            isbn,
            json!({"title": "Dune", "authors": ["Frank Herbert", "Brian Herbert"], "description": "a much longer description"}),
        ),
    );
    let circuit = Arc::new(CircuitBreaker::new(CircuitConfig::default()));
    let object_cache = object_cache();

    let fetcher = fetcher_with(
        Some(store.clone() as Arc<dyn RelationalStore>),
        Some(object_cache.clone()),
        primary.clone(),
        secondary.clone(),
        circuit,
    );

    let result = fetcher.get_book(isbn).await.unwrap();
    assert_eq!(result.isbn13.as_deref(), Some(isbn));
    assert_eq!(result.authors, vec!["Frank Herbert", "Brian Herbert"]);
    assert_eq!(result.description.as_deref(), Some("a much longer description"));
    assert_eq!(store.book_count(), 1);
}

/// Scenario 3: circuit open for "primary" means only "secondary" is consulted.
#[tokio::test]
async fn circuit_open_skips_primary_provider() {
    let circuit = Arc::new(CircuitBreaker::new(CircuitConfig {
        window: 60,
        threshold: 1,
        cool_down_ms: 60_000,
    }));
    circuit.report_failure("primary");
    assert!(!circuit.is_allowed("primary"));

    let primary = Arc::new(FakeProvider::new("primary").with_volume("oaijW7sKqTYC", json!({"title": "Dune"})));
    let secondary = Arc::new(FakeProvider::new("secondary"));

    let fetcher = fetcher_with(None, None, primary.clone(), secondary.clone(), circuit);

    let result = fetcher.get_book("oaijW7sKqTYC").await;
    assert!(result.is_err());
    assert_eq!(primary.call_count(), 0);
}

/// Scenario 4: two concurrent searches for the same query share one
/// `queryHash` and only one of them launches a background job.
#[tokio::test]
async fn concurrent_search_for_same_query_dedupes_background_job() {
    let store = Arc::new(InMemoryStore::new());
    let primary = Arc::new(
        FakeProvider::new("primary")
            .with_search_delay_ms(50)
            .with_isbn("dune", json!({"id": "p1", "title": "Dune (primary)"})),
    );
    let secondary = Arc::new(FakeProvider::new("secondary").with_isbn("dune", json!({"id": "s1", "title": "Dune (secondary)"})));
    let circuit = Arc::new(CircuitBreaker::new(CircuitConfig::default()));

    let fetcher = Arc::new(fetcher_with(
        Some(store.clone() as Arc<dyn RelationalStore>),
        None,
        primary.clone(),
        secondary.clone(),
        circuit.clone(),
    ));
    let events = create_event_bus();
    let engine = Arc::new(SearchEngine::new(
        fetcher,
        Some(store.clone() as Arc<dyn RelationalStore>),
        primary.clone(),
        secondary.clone(),
        circuit,
        events,
    ));

    let first = engine.search("dune", 20, None).await;
    let second = engine.search("dune", 20, None).await;
    assert_eq!(first.query_hash, second.query_hash);

    // Give the single background job time to finish before inspecting its effects.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(primary.call_count(), 1);
    assert_eq!(secondary.call_count(), 1);
    assert_eq!(store.book_count(), 2);
}

/// Scenario 5: consolidating duplicate legacy keys collapses them into the
/// canonical key and deletes the originals.
#[tokio::test]
async fn consolidation_collapses_duplicate_legacy_keys() {
    let isbn = "9780441013593";
    let in_memory_store = InMemoryStore::new();

    // A row already exists in the relational store under a known UUID for
    // this ISBN, so consolidation must find it rather than mint a new one.
    let mut existing = CanonicalBook::blank(Uuid::now_v7(), "dune".into());
    existing.isbn13 = Some(isbn.to_string());
    let known_book_id = existing.book_id;
    in_memory_store.seed(existing);
    let store: Arc<dyn RelationalStore> = Arc::new(in_memory_store);

    // Two distinct legacy keys sharing the same ISBN, written directly to the
    // backing object store under non-UUID-keyed paths.
    let raw_store: Arc<object_store::memory::InMemory> = Arc::new(InMemory::new());
    let object_cache = Arc::new(ObjectCacheAdapter::new(
        raw_store.clone(),
        RetryConfig::default(),
        WriteBackPolicy::KeepExisting,
    ));
    raw_store
        .put(
            &object_store::path::Path::from("legacy/cached_book:9780441013593.json"),
            bytes::Bytes::from(serde_json::to_vec(&json!({"isbn13": isbn, "id": "a", "title": "Dune"})).unwrap()).into(),
        )
        .await
        .unwrap();
    raw_store
        .put(
            &object_store::path::Path::from("legacy/book:9780441013593.json"),
            bytes::Bytes::from(serde_json::to_vec(&json!({"isbn13": isbn, "id": "b", "title": "Dune", "description": "longer text here"})).unwrap())
                .into(),
        )
        .await
        .unwrap();

    let migration = MigrationEngine::new(object_cache, store.clone(), ThrottleConfig::default());
    let cancellation = CancellationToken::new();
    let summary = migration.consolidate("legacy/", false, 0, None, &cancellation).await;

    assert_eq!(summary.conceptual_books_processed, 1);
    assert_eq!(summary.merged, 1);
    assert_eq!(summary.old_keys_deleted, 2);
    assert_eq!(summary.new_uuids_generated, 0);
    assert!(summary.errors.is_empty());

    let persisted = store.fetch_by_canonical_id(known_book_id).await.unwrap();
    assert_eq!(persisted.book_id, known_book_id);
}

/// Scenario 5b: dry-run consolidation reports the same summary counts as a
/// real consolidation over the same input, without deleting or persisting
/// anything.
#[tokio::test]
async fn dry_run_consolidation_matches_real_run_summary_counts() {
    let isbn = "9780441013593";
    let in_memory_store = InMemoryStore::new();
    let mut existing = CanonicalBook::blank(Uuid::now_v7(), "dune".into());
    existing.isbn13 = Some(isbn.to_string());
    in_memory_store.seed(existing);
    let store: Arc<dyn RelationalStore> = Arc::new(in_memory_store);

    let raw_store: Arc<object_store::memory::InMemory> = Arc::new(InMemory::new());
    let object_cache = Arc::new(ObjectCacheAdapter::new(
        raw_store.clone(),
        RetryConfig::default(),
        WriteBackPolicy::KeepExisting,
    ));
    raw_store
        .put(
            &object_store::path::Path::from("legacy/cached_book:9780441013593.json"),
            bytes::Bytes::from(serde_json::to_vec(&json!({"isbn13": isbn, "id": "a", "title": "Dune"})).unwrap()).into(),
        )
        .await
        .unwrap();
    raw_store
        .put(
            &object_store::path::Path::from("legacy/book:9780441013593.json"),
            bytes::Bytes::from(serde_json::to_vec(&json!({"isbn13": isbn, "id": "b", "title": "Dune", "description": "longer text here"})).unwrap())
                .into(),
        )
        .await
        .unwrap();

    let migration = MigrationEngine::new(object_cache, store.clone(), ThrottleConfig::default());
    let cancellation = CancellationToken::new();
    let summary = migration.consolidate("legacy/", true, 0, None, &cancellation).await;

    assert_eq!(summary.conceptual_books_processed, 1);
    assert_eq!(summary.merged, 1);
    assert_eq!(summary.migrated, 1);
    assert_eq!(summary.old_keys_deleted, 2);
    assert_eq!(summary.new_uuids_generated, 0);
    assert!(summary.errors.is_empty());
}

/// Scenario 6: cover invalidation makes the L1/relational tiers observe the
/// new cover URL on the next read.
#[tokio::test]
async fn cover_invalidation_is_observed_on_next_read() {
    let store = Arc::new(InMemoryStore::new());
    let book_id = Uuid::now_v7();
    let mut book = CanonicalBook::blank(book_id, "dune".into());
    book.title = "Dune".into();
    book.cover_image_url = Some("https://covers/a.jpg".into());
    store.seed(book);

    let l1 = L1Cache::default();
    let events = create_event_bus();
    let primary = Arc::new(FakeProvider::new("primary"));
    let secondary = Arc::new(FakeProvider::new("secondary"));
    let circuit = Arc::new(CircuitBreaker::new(CircuitConfig::default()));

    let fetcher = TieredFetcher::new(
        l1.clone(),
        Some(store.clone() as Arc<dyn RelationalStore>),
        None,
        primary,
        secondary,
        circuit,
        EngineConfig::default(),
    );

    let first = fetcher.get_book(&book_id.to_string()).await.unwrap();
    assert_eq!(first.cover_image_url.as_deref(), Some("https://covers/a.jpg"));

    canonicalize_and_persist(
        store.as_ref(),
        {
            let mut updated = first.clone();
            updated.cover_image_url = Some("https://covers/b.jpg".into());
            updated
        },
        "manual-update",
        None,
    )
    .await
    .unwrap();

    l1.invalidate(book_id).await;
    events.publish_cover_updated(book_id);

    let second = fetcher.get_book(&book_id.to_string()).await.unwrap();
    assert_eq!(second.cover_image_url.as_deref(), Some("https://covers/b.jpg"));
}
