//! `ExternalIdMapping`: (source, external_id) -> book_id, plus provider-reported fields.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maps an externally-namespaced identifier to a canonical book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalIdMapping {
    pub book_id: Uuid,
    pub source: String,
    pub external_id: String,
    pub provider_isbn10: Option<String>,
    pub provider_isbn13: Option<String>,
    pub info_link: Option<String>,
    pub preview_link: Option<String>,
    pub purchase_link: Option<String>,
    pub web_reader_link: Option<String>,
    pub average_rating: Option<f64>,
    pub ratings_count: Option<i64>,
    pub pdf_available: bool,
    pub epub_available: bool,
    pub list_price: Option<f64>,
    pub currency_code: Option<String>,
}

impl ExternalIdMapping {
    pub fn new(book_id: Uuid, source: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            book_id,
            source: source.into(),
            external_id: external_id.into(),
            provider_isbn10: None,
            provider_isbn13: None,
            info_link: None,
            preview_link: None,
            purchase_link: None,
            web_reader_link: None,
            average_rating: None,
            ratings_count: None,
            pdf_available: false,
            epub_available: false,
            list_price: None,
            currency_code: None,
        }
    }
}

/// One of the (bookId, type) image link rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageLinkType {
    Preferred,
    Fallback,
    External,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageLink {
    pub book_id: Uuid,
    pub image_type: ImageLinkType,
    pub url: String,
    pub source: String,
}
