//! `CanonicalBook`: the unified record produced by aggregation and canonicalisation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A single canonical book record.
///
/// `book_id` is minted once (UUIDv7) and never changes; every other field
/// may be overwritten by a later UPSERT via the COALESCE-style merge in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalBook {
    pub book_id: Uuid,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    /// Globally unique, URL-safe slug.
    pub slug: String,
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
    /// Ordered, de-duplicated.
    pub categories: Vec<String>,
    /// Ordered, de-duplicated.
    pub authors: Vec<String>,
    pub qualifiers: HashMap<String, serde_json::Value>,
    /// Opaque composite JSON produced by the aggregator.
    pub raw_json_response: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CanonicalBook {
    /// A fresh, mostly-empty record for `book_id`, used as the aggregation seed
    /// before field-by-field merging populates it.
    pub fn blank(book_id: Uuid, slug: String) -> Self {
        Self {
            book_id,
            title: String::new(),
            subtitle: None,
            description: None,
            slug,
            isbn10: None,
            isbn13: None,
            publisher: None,
            published_date: None,
            language: None,
            page_count: None,
            edition_number: None,
            edition_group_key: None,
            cover_image_url: None,
            average_rating: None,
            ratings_count: None,
            list_price: None,
            currency_code: None,
            info_link: None,
            preview_link: None,
            purchase_link: None,
            web_reader_link: None,
            pdf_available: false,
            epub_available: false,
            categories: Vec::new(),
            authors: Vec::new(),
            qualifiers: HashMap::new(),
            raw_json_response: serde_json::Value::Null,
            created_at: None,
            updated_at: None,
        }
    }

    /// Number of populated "key" fields, used by the object-cache write-back
    /// heuristic's fallback comparison.
    pub fn populated_field_count(&self) -> usize {
        [
            self.publisher.is_some(),
            self.published_date.is_some(),
            self.page_count.is_some(),
            self.isbn10.is_some(),
            self.isbn13.is_some(),
            !self.categories.is_empty(),
            self.language.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}
