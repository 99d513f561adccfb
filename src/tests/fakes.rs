//! In-memory fakes used by the end-to-end scenario tests.

use crate::error::{EngineError, EngineResult};
use crate::models::book::CanonicalBook;
use crate::models::external_id::{ExternalIdMapping, ImageLink};
use crate::models::list::{BookList, BookListMembership};
use crate::models::view::ViewStats;
use crate::providers::{ProviderAdapter, ProviderCapability, RawPayload, SearchOrder, SearchPage};
use crate::store::{BookFields, RelationalStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// A minimal, fully in-process `RelationalStore` standing in for Postgres so
/// the resolver, fetcher, search engine, and migration engine can be
/// exercised without a live database.
#[derive(Default)]
pub struct InMemoryStore {
    books: Mutex<HashMap<Uuid, CanonicalBook>>,
    external_ids: Mutex<HashMap<(String, String), Uuid>>,
    slugs: Mutex<std::collections::HashSet<String>>,
    lists: Mutex<Vec<BookList>>,
    memberships: Mutex<Vec<BookListMembership>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, book: CanonicalBook) {
        self.slugs.lock().unwrap().insert(book.slug.clone());
        self.books.lock().unwrap().insert(book.book_id, book);
    }

    pub fn book_count(&self) -> usize {
        self.books.lock().unwrap().len()
    }
}

#[async_trait]
impl RelationalStore for InMemoryStore {
    async fn fetch_by_canonical_id(&self, id: Uuid) -> EngineResult<CanonicalBook> {
        self.books.lock().unwrap().get(&id).cloned().ok_or(EngineError::NotFound)
    }

    async fn fetch_by_isbn13(&self, isbn13: &str) -> EngineResult<CanonicalBook> {
        self.books
            .lock()
            .unwrap()
            .values()
            .find(|b| b.isbn13.as_deref() == Some(isbn13))
            .cloned()
            .ok_or(EngineError::NotFound)
    }

    async fn fetch_by_isbn10(&self, isbn10: &str) -> EngineResult<CanonicalBook> {
        self.books
            .lock()
            .unwrap()
            .values()
            .find(|b| b.isbn10.as_deref() == Some(isbn10))
            .cloned()
            .ok_or(EngineError::NotFound)
    }

    async fn fetch_by_slug(&self, slug: &str) -> EngineResult<CanonicalBook> {
        self.books
            .lock()
            .unwrap()
            .values()
            .find(|b| b.slug == slug)
            .cloned()
            .ok_or(EngineError::NotFound)
    }

    async fn fetch_by_external_id(&self, source: &str, external_id: &str) -> EngineResult<CanonicalBook> {
        let book_id = self
            .external_ids
            .lock()
            .unwrap()
            .get(&(source.to_string(), external_id.to_string()))
            .copied()
            .ok_or(EngineError::NotFound)?;
        self.fetch_by_canonical_id(book_id).await
    }

    async fn upsert_book(&self, book_id: Uuid, fields: &BookFields, slug: &str) -> EngineResult<()> {
        let mut books = self.books.lock().unwrap();
        let entry = books.entry(book_id).or_insert_with(|| CanonicalBook::blank(book_id, slug.to_string()));
        entry.title = fields.title.clone();
        entry.subtitle = entry.subtitle.take().or_else(|| fields.subtitle.clone());
        entry.description = entry.description.take().or_else(|| fields.description.clone());
        entry.isbn10 = entry.isbn10.take().or_else(|| fields.isbn10.clone());
        entry.isbn13 = entry.isbn13.take().or_else(|| fields.isbn13.clone());
        entry.publisher = entry.publisher.take().or_else(|| fields.publisher.clone());
        entry.published_date = entry.published_date.take().or_else(|| fields.published_date.clone());
        entry.language = entry.language.take().or_else(|| fields.language.clone());
        entry.page_count = entry.page_count.or(fields.page_count);
        entry.edition_number = entry.edition_number.or(fields.edition_number);
        entry.edition_group_key = entry.edition_group_key.take().or_else(|| fields.edition_group_key.clone());
        entry.cover_image_url = fields.cover_image_url.clone().or_else(|| entry.cover_image_url.clone());
        entry.average_rating = entry.average_rating.or(fields.average_rating);
        entry.ratings_count = entry.ratings_count.or(fields.ratings_count);
        entry.list_price = entry.list_price.or(fields.list_price);
        entry.currency_code = entry.currency_code.take().or_else(|| fields.currency_code.clone());
        entry.info_link = entry.info_link.take().or_else(|| fields.info_link.clone());
        entry.preview_link = entry.preview_link.take().or_else(|| fields.preview_link.clone());
        entry.purchase_link = entry.purchase_link.take().or_else(|| fields.purchase_link.clone());
        entry.web_reader_link = entry.web_reader_link.take().or_else(|| fields.web_reader_link.clone());
        entry.pdf_available = entry.pdf_available || fields.pdf_available;
        entry.epub_available = entry.epub_available || fields.epub_available;
        entry.categories = fields.categories.clone();
        entry.authors = fields.authors.clone();
        if let serde_json::Value::Object(map) = &fields.qualifiers {
            for (k, v) in map {
                entry.qualifiers.insert(k.clone(), v.clone());
            }
        }
        entry.slug = slug.to_string();
        self.slugs.lock().unwrap().insert(slug.to_string());
        Ok(())
    }

    async fn upsert_external_mapping(&self, mapping: &ExternalIdMapping) -> EngineResult<()> {
        self.external_ids
            .lock()
            .unwrap()
            .insert((mapping.source.clone(), mapping.external_id.clone()), mapping.book_id);
        Ok(())
    }

    async fn upsert_raw_snapshot(&self, book_id: Uuid, _source: &str, json: &serde_json::Value) -> EngineResult<()> {
        if let Some(book) = self.books.lock().unwrap().get_mut(&book_id) {
            book.raw_json_response = json.clone();
        }
        Ok(())
    }

    async fn upsert_image_link(&self, link: &ImageLink) -> EngineResult<()> {
        if let Some(book) = self.books.lock().unwrap().get_mut(&link.book_id) {
            book.cover_image_url = Some(link.url.clone());
        }
        Ok(())
    }

    async fn ensure_unique_slug(&self, desired: &str) -> EngineResult<String> {
        let mut slugs = self.slugs.lock().unwrap();
        if !slugs.contains(desired) {
            slugs.insert(desired.to_string());
            return Ok(desired.to_string());
        }
        let mut n = 2;
        loop {
            let candidate = crate::slug::with_suffix(desired, n);
            if !slugs.contains(&candidate) {
                slugs.insert(candidate.clone());
                return Ok(candidate);
            }
            n += 1;
        }
    }

    async fn sync_edition_group(&self, _primary: Uuid, _siblings: &[Uuid]) -> EngineResult<()> {
        Ok(())
    }

    async fn refresh_search_view(&self) -> EngineResult<()> {
        Ok(())
    }

    async fn fetch_view_stats_for_book(&self, _book_id: Uuid) -> EngineResult<ViewStats> {
        Ok(ViewStats::default())
    }

    async fn record_view(&self, _book_id: Uuid, _source: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn upsert_book_list(&self, list: &BookList) -> EngineResult<()> {
        self.lists.lock().unwrap().push(list.clone());
        Ok(())
    }

    async fn upsert_list_membership(&self, membership: &BookListMembership) -> EngineResult<()> {
        self.memberships.lock().unwrap().push(membership.clone());
        Ok(())
    }

    async fn reassign_external_mapping(&self, source: &str, external_id: &str, new_book_id: Uuid) -> EngineResult<()> {
        self.external_ids
            .lock()
            .unwrap()
            .insert((source.to_string(), external_id.to_string()), new_book_id);
        Ok(())
    }
}

/// A canned provider that returns fixed payloads keyed by
/// ISBN or volume id, or `NotFound`/`Disabled` when asked for anything else.
pub struct FakeProvider {
    name: &'static str,
    capability: ProviderCapability,
    by_isbn: HashMap<String, serde_json::Value>,
    by_volume_id: HashMap<String, serde_json::Value>,
    calls: AtomicUsize,
    search_delay_ms: Option<u64>,
}

impl FakeProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            capability: ProviderCapability {
                supports_authenticated: false,
                supports_isbn_search: true,
                supports_title_search: true,
                supports_bestseller_overview: false,
            },
            by_isbn: HashMap::new(),
            by_volume_id: HashMap::new(),
            calls: AtomicUsize::new(0),
            search_delay_ms: None,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn with_isbn(mut self, isbn: &str, json: serde_json::Value) -> Self {
        self.by_isbn.insert(isbn.to_string(), json);
        self
    }

    pub fn with_volume(mut self, id: &str, json: serde_json::Value) -> Self {
        self.by_volume_id.insert(id.to_string(), json);
        self
    }

    /// Simulates network latency so a background job can be observed still
    /// running by a concurrent caller.
    pub fn with_search_delay_ms(mut self, ms: u64) -> Self {
        self.search_delay_ms = Some(ms);
        self
    }
}

#[async_trait]
impl ProviderAdapter for FakeProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn capability(&self) -> ProviderCapability {
        self.capability
    }

    async fn fetch_volume_by_id(&self, id: &str, _authenticated: bool) -> EngineResult<RawPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.by_volume_id
            .get(id)
            .cloned()
            .map(|json| RawPayload {
                source: self.name.to_string(),
                json,
            })
            .ok_or(EngineError::NotFound)
    }

    async fn search_volumes(
        &self,
        query: &str,
        _start_index: u32,
        _order: SearchOrder,
        _language: Option<&str>,
        _authenticated: bool,
    ) -> EngineResult<SearchPage> {
        if let Some(ms) = self.search_delay_ms {
            tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let isbn = query.strip_prefix("isbn:").unwrap_or(query);
        let items = self
            .by_isbn
            .get(isbn)
            .cloned()
            .into_iter()
            .map(|json| RawPayload {
                source: self.name.to_string(),
                json,
            })
            .collect::<Vec<_>>();
        Ok(SearchPage {
            total_estimate: Some(items.len() as u64),
            items,
        })
    }

    async fn fetch_by_isbn(&self, isbn: &str) -> EngineResult<RawPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.by_isbn
            .get(isbn)
            .cloned()
            .map(|json| RawPayload {
                source: self.name.to_string(),
                json,
            })
            .ok_or(EngineError::NotFound)
    }

    async fn fetch_bestseller_overview(&self) -> EngineResult<RawPayload> {
        Err(EngineError::Disabled)
    }
}
