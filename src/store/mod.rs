//! Relational store adapter: the one trait every tier above it depends on
//! instead of talking to Postgres directly.

pub mod postgres;

use crate::error::EngineResult;
use crate::models::book::CanonicalBook;
use crate::models::external_id::{ExternalIdMapping, ImageLink};
use crate::models::list::{BookList, BookListMembership};
use crate::models::view::ViewStats;
use async_trait::async_trait;
use uuid::Uuid;

pub use postgres::PostgresStore;

/// Fields accepted by an UPSERT, distinct from `CanonicalBook` so callers can
/// omit `book_id`/`created_at`/`updated_at`, which the store manages.
#[derive(Debug, Clone)]
pub struct BookFields {
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub publisher: Option<String>,
    pub published_date: Option<String>,
    pub language: Option<String>,
    pub page_count: Option<i32>,
    pub edition_number: Option<i32>,
    pub edition_group_key: Option<String>,
    pub cover_image_url: Option<String>,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<i64>,
    pub list_price: Option<f64>,
    pub currency_code: Option<String>,
    pub info_link: Option<String>,
    pub preview_link: Option<String>,
    pub purchase_link: Option<String>,
    pub web_reader_link: Option<String>,
    pub pdf_available: bool,
    pub epub_available: bool,
    pub categories: Vec<String>,
    pub authors: Vec<String>,
    pub qualifiers: serde_json::Value,
}

/// The relational store's operation set. Implemented once against Postgres;
/// a second, in-memory implementation backs unit tests so they don't need a
/// live database.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn fetch_by_canonical_id(&self, id: Uuid) -> EngineResult<CanonicalBook>;
    async fn fetch_by_isbn13(&self, isbn13: &str) -> EngineResult<CanonicalBook>;
    async fn fetch_by_isbn10(&self, isbn10: &str) -> EngineResult<CanonicalBook>;
    async fn fetch_by_slug(&self, slug: &str) -> EngineResult<CanonicalBook>;
    async fn fetch_by_external_id(&self, source: &str, external_id: &str) -> EngineResult<CanonicalBook>;

    async fn upsert_book(&self, book_id: Uuid, fields: &BookFields, slug: &str) -> EngineResult<()>;
    async fn upsert_external_mapping(&self, mapping: &ExternalIdMapping) -> EngineResult<()>;
    async fn upsert_raw_snapshot(&self, book_id: Uuid, source: &str, json: &serde_json::Value) -> EngineResult<()>;
    async fn upsert_image_link(&self, link: &ImageLink) -> EngineResult<()>;

    /// Returns a slug guaranteed unique among active rows.
    async fn ensure_unique_slug(&self, desired: &str) -> EngineResult<String>;

    /// Rewrite `book_editions` rows for an edition cluster: deletes any
    /// existing links for the involved books, then inserts
    /// primary -> sibling `ALTERNATE_EDITION` links.
    async fn sync_edition_group(&self, primary: Uuid, siblings: &[Uuid]) -> EngineResult<()>;

    async fn refresh_search_view(&self) -> EngineResult<()>;

    async fn fetch_view_stats_for_book(&self, book_id: Uuid) -> EngineResult<ViewStats>;
    async fn record_view(&self, book_id: Uuid, source: &str) -> EngineResult<()>;

    async fn upsert_book_list(&self, list: &BookList) -> EngineResult<()>;
    async fn upsert_list_membership(&self, membership: &BookListMembership) -> EngineResult<()>;

    /// Redirects an `ExternalIdMapping` row onto a different canonical id
    /// when consolidating duplicates.
    async fn reassign_external_mapping(&self, source: &str, external_id: &str, new_book_id: Uuid) -> EngineResult<()>;
}
