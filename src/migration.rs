//! Consolidation/migration engine.

use crate::cache::object_cache::ObjectCacheAdapter;
use crate::error::EngineError;
use crate::models::book::CanonicalBook;
use crate::resolver::{canonicalize_and_persist, ResolutionCandidate};
use crate::store::RelationalStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Returned by `consolidate`, never persisted.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MigrationSummary {
    pub conceptual_books_processed: usize,
    pub migrated: usize,
    pub merged: usize,
    pub old_keys_deleted: usize,
    pub new_uuids_generated: usize,
    pub errors: Vec<String>,
}

/// Throttle parameters: yield for `pause` every `batch_size` keys.
pub struct ThrottleConfig {
    pub batch_size: usize,
    pub pause: std::time::Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            pause: std::time::Duration::from_millis(100),
        }
    }
}

pub struct MigrationEngine {
    object_cache: Arc<ObjectCacheAdapter>,
    store: Arc<dyn RelationalStore>,
    throttle: ThrottleConfig,
}

struct ParsedRecord {
    key: String,
    definitive_id: String,
    book: CanonicalBook,
}

impl MigrationEngine {
    pub fn new(object_cache: Arc<ObjectCacheAdapter>, store: Arc<dyn RelationalStore>, throttle: ThrottleConfig) -> Self {
        Self {
            object_cache,
            store,
            throttle,
        }
    }

    /// `dry_run` computes everything but skips writes and deletions, still
    /// returning the same summary counts a real run would produce. `skip`
    /// and `max` page over the listed keys before any parsing happens.
    pub async fn consolidate(
        &self,
        prefix: &str,
        dry_run: bool,
        skip: usize,
        max: Option<usize>,
        cancellation: &CancellationToken,
    ) -> MigrationSummary {
        let mut summary = MigrationSummary::default();

        let keys = match self.object_cache.list(prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                summary.errors.push(format!("failed to list prefix {prefix}: {e}"));
                return summary;
            }
        };
        let keys: Vec<String> = match max {
            Some(max) => keys.into_iter().skip(skip).take(max).collect(),
            None => keys.into_iter().skip(skip).collect(),
        };

        let mut parsed = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            if cancellation.is_cancelled() {
                break;
            }
            match self.parse_key(key).await {
                Ok(Some(record)) => parsed.push(record),
                Ok(None) => {}
                Err(e) => summary.errors.push(format!("{key}: {e}")),
            }
            if (i + 1) % self.throttle.batch_size == 0 {
                tokio::time::sleep(self.throttle.pause).await;
            }
        }

        let mut groups: HashMap<String, Vec<ParsedRecord>> = HashMap::new();
        for record in parsed {
            groups.entry(record.definitive_id.clone()).or_default().push(record);
        }

        summary.conceptual_books_processed = groups.len();

        for (definitive_id, group) in groups {
            if cancellation.is_cancelled() {
                break;
            }
            let originating_keys: Vec<String> = group.iter().map(|r| r.key.clone()).collect();
            let merged = merge_versions(&definitive_id, group);
            if originating_keys.len() > 1 {
                summary.merged += 1;
            }

            let candidate = ResolutionCandidate {
                existing_canonical_id: None,
                primary_provider_volume_id: None,
                isbn13: merged.isbn13.clone(),
                isbn10: merged.isbn10.clone(),
            };
            let (resolved_id, was_new) =
                match crate::resolver::resolve_canonical_id(self.store.as_ref(), &candidate).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        summary.errors.push(format!("{definitive_id}: resolve failed: {e}"));
                        continue;
                    }
                };
            if was_new {
                summary.new_uuids_generated += 1;
            }

            if dry_run {
                let canonical_key = format!("books/v1/{resolved_id}.json");
                summary.old_keys_deleted += originating_keys.iter().filter(|k| **k != canonical_key).count();
                summary.migrated += 1;
                continue;
            }

            let mut merged = merged;
            merged.book_id = resolved_id;

            match canonicalize_and_persist(self.store.as_ref(), merged, "migration", None).await {
                Ok(persisted) => {
                    let canonical_key = format!("books/v1/{}.json", persisted.book_id);
                    for key in &originating_keys {
                        if *key == canonical_key {
                            continue;
                        }
                        if let Err(e) = self.object_cache.delete_by_key(key).await {
                            summary.errors.push(format!("{key}: delete failed: {e}"));
                        } else {
                            summary.old_keys_deleted += 1;
                        }
                    }
                    summary.migrated += 1;
                }
                Err(e) => summary.errors.push(format!("{definitive_id}: persist failed: {e}")),
            }
        }

        summary
    }

    async fn parse_key(&self, key: &str) -> Result<Option<ParsedRecord>, EngineError> {
        let raw = self.object_cache.fetch_raw_key(key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        if let Ok(book) = serde_json::from_value::<CanonicalBook>(raw.clone()) {
            let definitive_id = definitive_id_for(&book.isbn13, &book.isbn10, None, Some(book.book_id.to_string()));
            return Ok(Some(ParsedRecord {
                key: key.to_string(),
                definitive_id,
                book,
            }));
        }

        // Fall back to provider-payload shape: extract whatever identifiers we can.
        let isbn13 = raw.get("isbn13").and_then(Value::as_str).map(str::to_string);
        let isbn10 = raw.get("isbn10").and_then(Value::as_str).map(str::to_string);
        let provider_id = raw.get("id").and_then(Value::as_str).map(str::to_string);
        if isbn13.is_none() && isbn10.is_none() && provider_id.is_none() {
            return Err(EngineError::ParseError(format!("{key}: unrecognised payload shape")));
        }

        let mut book = CanonicalBook::blank(uuid::Uuid::nil(), String::new());
        book.isbn13 = isbn13.clone();
        book.isbn10 = isbn10.clone();
        book.raw_json_response = raw;
        let definitive_id = definitive_id_for(&isbn13, &isbn10, provider_id, None);
        Ok(Some(ParsedRecord {
            key: key.to_string(),
            definitive_id,
            book,
        }))
    }
}

/// First non-empty of {ISBN-13, ISBN-10, providerVolumeId, own UUID}.
fn definitive_id_for(
    isbn13: &Option<String>,
    isbn10: &Option<String>,
    provider_id: Option<String>,
    own_uuid: Option<String>,
) -> String {
    isbn13
        .clone()
        .or_else(|| isbn10.clone())
        .or(provider_id)
        .or(own_uuid)
        .unwrap_or_default()
}

/// Merge rules: prefer the record matching the definitive-id family, first
/// non-null wins per field, list fields union, qualifier maps union
/// last-writer-wins. Reuses the same field-merge shape as the aggregator but
/// over already-canonical records rather than raw provider payloads.
fn merge_versions(definitive_id: &str, mut records: Vec<ParsedRecord>) -> CanonicalBook {
    records.sort_by(|a, b| {
        let a_matches = a.definitive_id == definitive_id;
        let b_matches = b.definitive_id == definitive_id;
        b_matches.cmp(&a_matches)
    });

    let mut merged = records[0].book.clone();
    for record in records.iter().skip(1) {
        let other = &record.book;
        if merged.title.is_empty() {
            merged.title = other.title.clone();
        }
        merged.subtitle = merged.subtitle.take().or_else(|| other.subtitle.clone());
        merged.description = merged.description.take().or_else(|| other.description.clone());
        merged.isbn10 = merged.isbn10.take().or_else(|| other.isbn10.clone());
        merged.isbn13 = merged.isbn13.take().or_else(|| other.isbn13.clone());
        merged.publisher = merged.publisher.take().or_else(|| other.publisher.clone());
        merged.published_date = merged.published_date.take().or_else(|| other.published_date.clone());
        merged.language = merged.language.take().or_else(|| other.language.clone());
        merged.page_count = merged.page_count.or(other.page_count);
        merged.cover_image_url = merged.cover_image_url.take().or_else(|| other.cover_image_url.clone());

        for author in &other.authors {
            if !merged.authors.contains(author) {
                merged.authors.push(author.clone());
            }
        }
        for category in &other.categories {
            if !merged.categories.contains(category) {
                merged.categories.push(category.clone());
            }
        }
        for (k, v) in &other.qualifiers {
            merged.qualifiers.insert(k.clone(), v.clone());
        }
    }

    merged
}
