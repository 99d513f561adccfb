//! Provider adapters: uniform external metadata source contract.
//!
//! Adapters never retry internally and never inspect identifiers themselves —
//! callers pass pre-classified inputs and gate every call through the
//! circuit breaker before invoking one of these methods.

pub mod google_books;
pub mod http;
pub mod open_library;

use crate::error::EngineResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sort order accepted by `search_volumes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOrder {
    Relevance,
    Newest,
}

/// An opaque provider response payload; only the aggregator interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPayload {
    pub source: String,
    pub json: serde_json::Value,
}

/// A page of search results: opaque item payloads plus a total-estimate hint.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub items: Vec<RawPayload>,
    pub total_estimate: Option<u64>,
}

/// Capability descriptor driving aggregator/search dispatch without
/// hard-coding provider names through the engine.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapability {
    pub supports_authenticated: bool,
    pub supports_isbn_search: bool,
    pub supports_title_search: bool,
    pub supports_bestseller_overview: bool,
}

/// Uniform contract every external metadata source implements.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable, lowercase name used as the `source` column value.
    fn name(&self) -> &'static str;

    fn capability(&self) -> ProviderCapability;

    async fn fetch_volume_by_id(&self, id: &str, authenticated: bool) -> EngineResult<RawPayload>;

    async fn search_volumes(
        &self,
        query: &str,
        start_index: u32,
        order: SearchOrder,
        language: Option<&str>,
        authenticated: bool,
    ) -> EngineResult<SearchPage>;

    async fn fetch_by_isbn(&self, isbn: &str) -> EngineResult<RawPayload>;

    async fn fetch_bestseller_overview(&self) -> EngineResult<RawPayload>;

    /// Map this adapter's raw response shape onto the flat canonical field
    /// names the aggregator reads (`title`, `isbn13`, `authors`, ...).
    /// Default is identity, for payloads that already arrive in that shape.
    fn normalize(&self, raw: serde_json::Value) -> serde_json::Value {
        raw
    }
}
