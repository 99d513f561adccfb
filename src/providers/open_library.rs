//! Secondary bibliographic provider adapter: ISBN lookup and title
//! search only — no authenticated tier, no bestseller overview.

use super::http::build_client;
use super::{ProviderAdapter, ProviderCapability, RawPayload, SearchOrder, SearchPage};
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const BASE_URL: &str = "https://openlibrary.org";

pub struct OpenLibraryProvider {
    client: Client,
}

impl OpenLibraryProvider {
    pub fn new() -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client("bookcache-engine/1.0")?,
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenLibraryProvider {
    fn name(&self) -> &'static str {
        "secondary"
    }

    fn capability(&self) -> ProviderCapability {
        ProviderCapability {
            supports_authenticated: false,
            supports_isbn_search: true,
            supports_title_search: true,
            supports_bestseller_overview: false,
        }
    }

    async fn fetch_volume_by_id(&self, _id: &str, _authenticated: bool) -> EngineResult<RawPayload> {
        Err(EngineError::Disabled)
    }

    async fn search_volumes(
        &self,
        query: &str,
        start_index: u32,
        _order: SearchOrder,
        language: Option<&str>,
        _authenticated: bool,
    ) -> EngineResult<SearchPage> {
        let mut req = self
            .client
            .get(format!("{BASE_URL}/search.json"))
            .query(&[("q", query), ("offset", &start_index.to_string())]);
        if let Some(lang) = language {
            req = req.query(&[("lang", lang)]);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(EngineError::Transient(format!(
                "secondary search returned {}",
                resp.status()
            )));
        }
        let json: Value = resp.json().await?;
        let total_estimate = json.get("numFound").and_then(Value::as_u64);
        let items = json
            .get("docs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|doc| RawPayload {
                source: self.name().to_string(),
                json: doc,
            })
            .collect();
        Ok(SearchPage {
            items,
            total_estimate,
        })
    }

    async fn fetch_by_isbn(&self, isbn: &str) -> EngineResult<RawPayload> {
        let url = format!("{BASE_URL}/isbn/{isbn}.json");
        let resp = self.client.get(&url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::NotFound);
        }
        if !resp.status().is_success() {
            return Err(EngineError::Transient(format!(
                "secondary isbn lookup returned {}",
                resp.status()
            )));
        }
        let json: Value = resp.json().await?;
        Ok(RawPayload {
            source: self.name().to_string(),
            json,
        })
    }

    async fn fetch_bestseller_overview(&self) -> EngineResult<RawPayload> {
        Err(EngineError::Disabled)
    }

    fn normalize(&self, raw: Value) -> Value {
        if raw.get("author_name").is_some() || raw.get("isbn").is_some() {
            normalize_search_doc(&raw)
        } else {
            normalize_isbn_record(&raw)
        }
    }
}

fn first_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_array).and_then(|a| a.first()).and_then(Value::as_str)
}

/// Flattens a Solr-style `/search.json` result document into the canonical
/// field names the aggregator reads.
fn normalize_search_doc(raw: &Value) -> Value {
    let isbns: Vec<&str> = raw
        .get("isbn")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let isbn13 = isbns.iter().find(|s| s.len() == 13).copied();
    let isbn10 = isbns.iter().find(|s| s.len() == 10).copied();
    let cover_image_url = raw
        .get("cover_i")
        .and_then(Value::as_i64)
        .map(|id| format!("https://covers.openlibrary.org/b/id/{id}-L.jpg"));

    serde_json::json!({
        "title": raw.get("title").and_then(Value::as_str),
        "authors": raw.get("author_name").cloned().unwrap_or_default(),
        "isbn13": isbn13,
        "isbn10": isbn10,
        "publisher": first_str(raw.get("publisher")),
        "published_date": raw.get("first_publish_year").and_then(Value::as_i64).map(|y| y.to_string()),
        "language": first_str(raw.get("language")),
        "page_count": raw.get("number_of_pages_median").and_then(Value::as_i64),
        "cover_image_url": cover_image_url,
    })
}

/// Flattens an `/isbn/{isbn}.json` edition record into the canonical field
/// names the aggregator reads. Author names aren't resolvable from this
/// payload (only `/authors/OL...` keys), so `authors` is left empty here.
fn normalize_isbn_record(raw: &Value) -> Value {
    let cover_image_url = raw
        .get("covers")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(Value::as_i64)
        .map(|id| format!("https://covers.openlibrary.org/b/id/{id}-L.jpg"));
    let language = raw
        .get("languages")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(|l| l.get("key"))
        .and_then(Value::as_str)
        .map(|k| k.trim_start_matches("/languages/").to_string());

    serde_json::json!({
        "title": raw.get("title").and_then(Value::as_str),
        "subtitle": raw.get("subtitle").and_then(Value::as_str),
        "isbn13": first_str(raw.get("isbn_13")),
        "isbn10": first_str(raw.get("isbn_10")),
        "publisher": first_str(raw.get("publishers")),
        "published_date": raw.get("publish_date").and_then(Value::as_str),
        "language": language,
        "page_count": raw.get("number_of_pages").and_then(Value::as_i64),
        "cover_image_url": cover_image_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_search_doc_flattens_solr_fields() {
        let raw = serde_json::json!({
            "title": "Dune",
            "author_name": ["Frank Herbert"],
            "isbn": ["0441013597", "9780441013593"],
            "publisher": ["Ace"],
            "first_publish_year": 1965,
            "language": ["eng"],
            "number_of_pages_median": 412,
            "cover_i": 12345
        });
        let flat = normalize_search_doc(&raw);
        assert_eq!(flat["title"], "Dune");
        assert_eq!(flat["isbn13"], "9780441013593");
        assert_eq!(flat["isbn10"], "0441013597");
        assert_eq!(flat["published_date"], "1965");
        assert_eq!(flat["cover_image_url"], "https://covers.openlibrary.org/b/id/12345-L.jpg");
    }

    #[test]
    fn normalize_isbn_record_flattens_edition_fields() {
        let raw = serde_json::json!({
            "title": "Dune",
            "isbn_13": ["9780441013593"],
            "isbn_10": ["0441013597"],
            "publishers": ["Ace"],
            "publish_date": "1990",
            "number_of_pages": 412,
            "covers": [12345],
            "languages": [{"key": "/languages/eng"}]
        });
        let flat = normalize_isbn_record(&raw);
        assert_eq!(flat["isbn13"], "9780441013593");
        assert_eq!(flat["isbn10"], "0441013597");
        assert_eq!(flat["language"], "eng");
        assert_eq!(flat["cover_image_url"], "https://covers.openlibrary.org/b/id/12345-L.jpg");
    }
}
