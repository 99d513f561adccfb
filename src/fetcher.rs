//! Tiered fetcher — the sole orchestrator across L1, relational store,
//! object cache, and providers.

use crate::aggregator::{aggregate, PrecedenceSource, SourcedPayload};
use crate::cache::object_cache::{decide_write_back, FetchOutcome, ObjectCacheAdapter};
use crate::cache::L1Cache;
use crate::circuit::CircuitBreaker;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::identifier::{classify, Identifier};
use crate::models::book::CanonicalBook;
use crate::providers::{ProviderAdapter, SearchOrder};
use crate::resolver::canonicalize_and_persist;
use crate::store::RelationalStore;
use futures::future::join_all;
use std::sync::Arc;
use uuid::Uuid;

pub struct TieredFetcher {
    l1: L1Cache,
    store: Option<Arc<dyn RelationalStore>>,
    object_cache: Option<Arc<ObjectCacheAdapter>>,
    primary: Arc<dyn ProviderAdapter>,
    secondary: Arc<dyn ProviderAdapter>,
    circuit: Arc<CircuitBreaker>,
    config: EngineConfig,
}

impl TieredFetcher {
    pub fn new(
        l1: L1Cache,
        store: Option<Arc<dyn RelationalStore>>,
        object_cache: Option<Arc<ObjectCacheAdapter>>,
        primary: Arc<dyn ProviderAdapter>,
        secondary: Arc<dyn ProviderAdapter>,
        circuit: Arc<CircuitBreaker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            l1,
            store,
            object_cache,
            primary,
            secondary,
            circuit,
            config,
        }
    }

    pub async fn get_book(&self, identifier: &str) -> EngineResult<CanonicalBook> {
        let classified = classify(identifier);

        if let Identifier::CanonicalId(id_str) = &classified
            && let Ok(book_id) = Uuid::parse_str(id_str)
            && let Some(book) = self.l1.get(book_id).await
        {
            return Ok((*book).clone());
        }

        if let Some(book) = self.fetch_from_relational(&classified).await? {
            self.l1.put(book.clone()).await;
            return Ok(book);
        }

        if let Some(book) = self.fetch_from_object_cache(&classified).await? {
            self.warm_relational(&book).await;
            self.l1.put(book.clone()).await;
            return Ok(book);
        }

        if self.config.feature.external_fallback_enabled && !self.config.bypass_caches_override {
            if let Some(book) = self.fetch_from_providers(&classified).await? {
                self.l1.put(book.clone()).await;
                return Ok(book);
            }
        }

        Err(EngineError::NotFound)
    }

    async fn fetch_from_relational(&self, classified: &Identifier) -> EngineResult<Option<CanonicalBook>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let result = match classified {
            Identifier::CanonicalId(s) => {
                let id = Uuid::parse_str(s).map_err(|e| EngineError::ParseError(e.to_string()))?;
                store.fetch_by_canonical_id(id).await
            }
            Identifier::Isbn13(s) => store.fetch_by_isbn13(s).await,
            Identifier::Isbn10(s) => store.fetch_by_isbn10(s).await,
            Identifier::Slug(s) => store.fetch_by_slug(s).await,
            Identifier::ProviderVolumeId(s) => store.fetch_by_external_id(self.primary.name(), s).await,
            Identifier::Unknown(_) => return Ok(None),
        };
        match result {
            Ok(book) => Ok(Some(book)),
            Err(EngineError::NotFound) => Ok(None),
            Err(other) => {
                log::warn!("relational tier error, continuing to next tier: {other}");
                Ok(None)
            }
        }
    }

    async fn fetch_from_object_cache(&self, classified: &Identifier) -> EngineResult<Option<CanonicalBook>> {
        let Some(object_cache) = &self.object_cache else {
            return Ok(None);
        };
        let Identifier::CanonicalId(s) = classified else {
            return Ok(None);
        };
        let Ok(book_id) = Uuid::parse_str(s) else {
            return Ok(None);
        };
        match object_cache.fetch(book_id).await {
            Ok(FetchOutcome::Success(json)) => match serde_json::from_value::<CanonicalBook>(json) {
                Ok(book) => Ok(Some(book)),
                Err(e) => {
                    log::warn!("object cache entry for {book_id} unparseable: {e}");
                    Ok(None)
                }
            },
            Ok(FetchOutcome::NotFound | FetchOutcome::Disabled) => Ok(None),
            Err(err) => {
                log::warn!("object cache tier error, continuing to next tier: {err}");
                Ok(None)
            }
        }
    }

    async fn warm_relational(&self, book: &CanonicalBook) {
        let Some(store) = &self.store else { return };
        if let Err(e) = canonicalize_and_persist(store.as_ref(), book.clone(), "object-cache-warm", None).await {
            log::warn!("failed to warm relational store from object cache hit: {e}");
        }
    }

    async fn fetch_from_providers(&self, classified: &Identifier) -> EngineResult<Option<CanonicalBook>> {
        let payloads = match classified {
            Identifier::CanonicalId(id) | Identifier::ProviderVolumeId(id) => {
                self.fetch_volume_payloads(id).await
            }
            Identifier::Isbn13(isbn) | Identifier::Isbn10(isbn) => self.fetch_isbn_payloads(isbn).await,
            _ => Vec::new(),
        };

        if payloads.is_empty() {
            return Ok(None);
        }

        let book_id = Uuid::now_v7();
        let aggregated = aggregate(book_id, String::new(), payloads);

        let Some(store) = &self.store else {
            return Ok(Some(aggregated));
        };
        let persisted = canonicalize_and_persist(store.as_ref(), aggregated, self.primary.name(), None).await?;
        self.write_back_to_object_cache(&persisted).await;
        Ok(Some(persisted))
    }

    async fn fetch_volume_payloads(&self, id: &str) -> Vec<SourcedPayload> {
        let mut futures = Vec::new();
        if self.circuit.is_allowed(self.primary.name()) {
            futures.push(self.tagged_call(
                self.primary.clone(),
                PrecedenceSource::AuthenticatedPrimary,
                id.to_string(),
                true,
            ));
            futures.push(self.tagged_call(
                self.primary.clone(),
                PrecedenceSource::UnauthenticatedPrimary,
                id.to_string(),
                false,
            ));
        }
        join_all(futures).await.into_iter().flatten().collect()
    }

    fn tagged_call(
        &self,
        provider: Arc<dyn ProviderAdapter>,
        source: PrecedenceSource,
        id: String,
        authenticated: bool,
    ) -> impl std::future::Future<Output = Option<SourcedPayload>> + '_ {
        let circuit = self.circuit.clone();
        async move {
            let result = provider.fetch_volume_by_id(&id, authenticated).await;
            match result {
                Ok(payload) => {
                    circuit.report_success(provider.name());
                    Some(SourcedPayload {
                        source,
                        json: provider.normalize(payload.json),
                    })
                }
                Err(e) => {
                    if e.is_retryable() {
                        circuit.report_failure(provider.name());
                    }
                    None
                }
            }
        }
    }

    async fn fetch_isbn_payloads(&self, isbn: &str) -> Vec<SourcedPayload> {
        let mut futures: Vec<std::pin::Pin<Box<dyn std::future::Future<Output = Option<SourcedPayload>> + Send + '_>>> =
            Vec::new();

        if self.circuit.is_allowed(self.primary.name()) {
            let primary = self.primary.clone();
            let circuit = self.circuit.clone();
            let isbn = isbn.to_string();
            futures.push(Box::pin(async move {
                let query = format!("isbn:{isbn}");
                match primary
                    .search_volumes(&query, 0, SearchOrder::Relevance, None, false)
                    .await
                {
                    Ok(page) if !page.items.is_empty() => {
                        circuit.report_success(primary.name());
                        Some(SourcedPayload {
                            source: PrecedenceSource::IsbnSearchFallback,
                            json: primary.normalize(page.items[0].json.clone()),
                        })
                    }
                    Ok(_) => None,
                    Err(e) => {
                        if e.is_retryable() {
                            circuit.report_failure(primary.name());
                        }
                        None
                    }
                }
            }));
        }

        if self.circuit.is_allowed(self.secondary.name()) {
            let secondary = self.secondary.clone();
            let circuit = self.circuit.clone();
            let isbn = isbn.to_string();
            futures.push(Box::pin(async move {
                match secondary.fetch_by_isbn(&isbn).await {
                    Ok(payload) => {
                        circuit.report_success(secondary.name());
                        Some(SourcedPayload {
                            source: PrecedenceSource::Secondary,
                            json: secondary.normalize(payload.json),
                        })
                    }
                    Err(e) => {
                        if e.is_retryable() {
                            circuit.report_failure(secondary.name());
                        }
                        None
                    }
                }
            }));
        }

        join_all(futures).await.into_iter().flatten().collect()
    }

    async fn write_back_to_object_cache(&self, book: &CanonicalBook) {
        let Some(object_cache) = &self.object_cache else { return };
        let new_json = serde_json::to_value(book).unwrap_or(serde_json::Value::Null);

        let existing = match object_cache.fetch(book.book_id).await {
            Ok(FetchOutcome::Success(json)) => serde_json::from_value::<CanonicalBook>(json.clone())
                .ok()
                .map(|b| (json, b)),
            _ => None,
        };

        let decision = decide_write_back(
            &new_json,
            book,
            existing.as_ref().map(|(j, b)| (j, b)),
            object_cache.write_back_policy(),
        );

        if decision.should_write()
            && let Err(e) = object_cache.upload(book.book_id, &new_json).await
        {
            log::warn!("object cache write-back failed for {}: {e}", book.book_id);
        }
    }

    /// Relational-only search path used when `bypass_external` is true or
    /// when the search engine wraps this for the cached-first slice.
    pub async fn search_books_cached(&self, query: &str, limit: usize) -> EngineResult<Vec<CanonicalBook>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        // The relational store's lookup surface has no free-text search; a
        // prefix/slug match is the cached-first slice's cheapest approximation.
        match store.fetch_by_slug(query).await {
            Ok(book) => Ok(vec![book].into_iter().take(limit).collect()),
            Err(EngineError::NotFound) => Ok(Vec::new()),
            Err(other) => Err(other),
        }
    }
}
