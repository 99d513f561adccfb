//! Primary provider adapter: authenticated/unauthenticated volume
//! lookup, title search, ISBN search, and bestseller overview.

use super::http::build_client;
use super::{ProviderAdapter, ProviderCapability, RawPayload, SearchOrder, SearchPage};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const BASE_URL: &str = "https://www.googleapis.com/books/v1";
const BESTSELLER_URL: &str = "https://api.nytimes.com/svc/books/v3/lists/overview.json";

pub struct GoogleBooksProvider {
    client: Client,
    api_key: Option<String>,
}

impl GoogleBooksProvider {
    pub fn new(api_key: Option<String>) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client("bookcache-engine/1.0")?,
            api_key,
        })
    }

    fn maybe_key<'a>(&'a self, authenticated: bool) -> Option<&'a str> {
        if authenticated {
            self.api_key.as_deref()
        } else {
            None
        }
    }

    fn order_param(order: SearchOrder) -> &'static str {
        match order {
            SearchOrder::Relevance => "relevance",
            SearchOrder::Newest => "newest",
        }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleBooksProvider {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn capability(&self) -> ProviderCapability {
        ProviderCapability {
            supports_authenticated: true,
            supports_isbn_search: true,
            supports_title_search: true,
            supports_bestseller_overview: true,
        }
    }

    async fn fetch_volume_by_id(&self, id: &str, authenticated: bool) -> EngineResult<RawPayload> {
        let url = format!("{BASE_URL}/volumes/{id}");
        let mut req = self.client.get(&url);
        if let Some(key) = self.maybe_key(authenticated) {
            req = req.query(&[("key", key)]);
        }
        let resp = req.send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(EngineError::Transient(format!(
                "primary volume lookup returned {}",
                resp.status()
            )));
        }
        let json: Value = resp.json().await?;
        Ok(RawPayload {
            source: self.name().to_string(),
            json,
        })
    }

    async fn search_volumes(
        &self,
        query: &str,
        start_index: u32,
        order: SearchOrder,
        language: Option<&str>,
        authenticated: bool,
    ) -> EngineResult<SearchPage> {
        let mut req = self.client.get(format!("{BASE_URL}/volumes")).query(&[
            ("q", query),
            ("startIndex", &start_index.to_string()),
            ("orderBy", Self::order_param(order)),
        ]);
        if let Some(lang) = language {
            req = req.query(&[("langRestrict", lang)]);
        }
        if let Some(key) = self.maybe_key(authenticated) {
            req = req.query(&[("key", key)]);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(EngineError::Transient(format!(
                "primary search returned {}",
                resp.status()
            )));
        }
        let json: Value = resp.json().await?;
        let total_estimate = json.get("totalItems").and_then(Value::as_u64);
        let items = json
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|item| RawPayload {
                source: self.name().to_string(),
                json: item,
            })
            .collect();
        Ok(SearchPage {
            items,
            total_estimate,
        })
    }

    async fn fetch_by_isbn(&self, isbn: &str) -> EngineResult<RawPayload> {
        let query = format!("isbn:{isbn}");
        let page = self
            .search_volumes(&query, 0, SearchOrder::Relevance, None, false)
            .await?;
        page.items.into_iter().next().ok_or(EngineError::NotFound)
    }

    async fn fetch_bestseller_overview(&self) -> EngineResult<RawPayload> {
        let mut req = self.client.get(BESTSELLER_URL);
        if let Some(key) = &self.api_key {
            req = req.query(&[("api-key", key.as_str())]);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(EngineError::Transient(format!(
                "bestseller overview returned {}",
                resp.status()
            )));
        }
        let json: Value = resp.json().await?;
        Ok(RawPayload {
            source: self.name().to_string(),
            json,
        })
    }

    fn normalize(&self, raw: Value) -> Value {
        normalize_volume(&raw)
    }
}

/// Flattens a Google Books volume resource (fields nested under
/// `volumeInfo`/`saleInfo`/`accessInfo`) into the canonical field names the
/// aggregator reads.
fn normalize_volume(raw: &Value) -> Value {
    let volume_info = raw.get("volumeInfo");
    let sale_info = raw.get("saleInfo");
    let access_info = raw.get("accessInfo");

    let identifiers = volume_info
        .and_then(|v| v.get("industryIdentifiers"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let isbn_by_type = |kind: &str| {
        identifiers
            .iter()
            .find(|id| id.get("type").and_then(Value::as_str) == Some(kind))
            .and_then(|id| id.get("identifier"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let list_price = sale_info.and_then(|s| s.get("listPrice"));

    serde_json::json!({
        "title": volume_info.and_then(|v| v.get("title")).and_then(Value::as_str),
        "subtitle": volume_info.and_then(|v| v.get("subtitle")).and_then(Value::as_str),
        "description": volume_info.and_then(|v| v.get("description")).and_then(Value::as_str),
        "isbn13": isbn_by_type("ISBN_13"),
        "isbn10": isbn_by_type("ISBN_10"),
        "publisher": volume_info.and_then(|v| v.get("publisher")).and_then(Value::as_str),
        "published_date": volume_info.and_then(|v| v.get("publishedDate")).and_then(Value::as_str),
        "language": volume_info.and_then(|v| v.get("language")).and_then(Value::as_str),
        "page_count": volume_info.and_then(|v| v.get("pageCount")).and_then(Value::as_i64),
        "cover_image_url": volume_info
            .and_then(|v| v.get("imageLinks"))
            .and_then(|i| i.get("thumbnail"))
            .and_then(Value::as_str),
        "info_link": volume_info.and_then(|v| v.get("infoLink")).and_then(Value::as_str),
        "preview_link": volume_info.and_then(|v| v.get("previewLink")).and_then(Value::as_str),
        "purchase_link": sale_info.and_then(|s| s.get("buyLink")).and_then(Value::as_str),
        "web_reader_link": access_info.and_then(|a| a.get("webReaderLink")).and_then(Value::as_str),
        "pdf_available": access_info
            .and_then(|a| a.get("pdf"))
            .and_then(|p| p.get("isAvailable"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        "epub_available": access_info
            .and_then(|a| a.get("epub"))
            .and_then(|p| p.get("isAvailable"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        "average_rating": volume_info.and_then(|v| v.get("averageRating")).and_then(Value::as_f64),
        "ratings_count": volume_info.and_then(|v| v.get("ratingsCount")).and_then(Value::as_i64),
        "list_price": list_price.and_then(|p| p.get("amount")).and_then(Value::as_f64),
        "currency_code": list_price.and_then(|p| p.get("currencyCode")).and_then(Value::as_str),
        "authors": volume_info.and_then(|v| v.get("authors")).cloned().unwrap_or_default(),
        "categories": volume_info.and_then(|v| v.get("categories")).cloned().unwrap_or_default(),
    })
}
