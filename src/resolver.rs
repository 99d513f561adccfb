//! Canonical resolver.

use crate::error::{EngineError, EngineResult};
use crate::models::book::CanonicalBook;
use crate::models::external_id::{ExternalIdMapping, ImageLink, ImageLinkType};
use crate::slug;
use crate::store::{BookFields, RelationalStore};
use std::collections::HashMap;
use uuid::Uuid;

/// Candidate identifiers known for an incoming record, used by the 4-step
/// resolution algorithm below.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCandidate {
    pub existing_canonical_id: Option<Uuid>,
    pub primary_provider_volume_id: Option<String>,
    pub isbn13: Option<String>,
    pub isbn10: Option<String>,
}

const PRIMARY_PROVIDER: &str = "primary";

/// Mint a time-ordered canonical UUID (UUIDv7).
pub fn mint_canonical_id() -> Uuid {
    Uuid::now_v7()
}

/// Find or mint the canonical id for a candidate record, trying in order:
/// existing external-id mapping, caller-supplied canonical id, ISBN-13, then
/// ISBN-10. Returns whether the id was newly minted (`true`) or found
/// (`false`) — callers that report "new UUIDs generated" must use this, not
/// a nil-check on the input record's own id.
pub async fn resolve_canonical_id(
    store: &dyn RelationalStore,
    candidate: &ResolutionCandidate,
) -> EngineResult<(Uuid, bool)> {
    if let Some(volume_id) = &candidate.primary_provider_volume_id
        && let Ok(book) = store.fetch_by_external_id(PRIMARY_PROVIDER, volume_id).await
    {
        return Ok((book.book_id, false));
    }

    if let Some(existing_id) = candidate.existing_canonical_id
        && store.fetch_by_canonical_id(existing_id).await.is_ok()
    {
        return Ok((existing_id, false));
    }

    if let Some(isbn13) = &candidate.isbn13
        && let Ok(book) = store.fetch_by_isbn13(isbn13).await
    {
        return Ok((book.book_id, false));
    }

    if let Some(isbn10) = &candidate.isbn10
        && let Ok(book) = store.fetch_by_isbn10(isbn10).await
    {
        return Ok((book.book_id, false));
    }

    Ok((mint_canonical_id(), true))
}

/// Full canonicalisation: resolve the id, ensure a unique slug, and persist
/// the book/mapping/snapshot/image-link rows.
pub async fn canonicalize_and_persist(
    store: &dyn RelationalStore,
    book: CanonicalBook,
    source: &str,
    external_id: Option<&str>,
) -> EngineResult<CanonicalBook> {
    let candidate = ResolutionCandidate {
        existing_canonical_id: Some(book.book_id).filter(|id| !id.is_nil()),
        primary_provider_volume_id: if source == PRIMARY_PROVIDER {
            external_id.map(str::to_string)
        } else {
            None
        },
        isbn13: book.isbn13.clone(),
        isbn10: book.isbn10.clone(),
    };

    let (book_id, _was_new) = resolve_canonical_id(store, &candidate).await?;

    let desired_slug = if book.slug.is_empty() {
        slug::base_slug(&book.title, book_id)
    } else {
        book.slug.clone()
    };
    let unique_slug = match store.fetch_by_canonical_id(book_id).await {
        Ok(existing) if !existing.slug.is_empty() => existing.slug,
        _ => store.ensure_unique_slug(&desired_slug).await?,
    };

    let fields = BookFields {
        title: book.title.clone(),
        subtitle: book.subtitle.clone(),
        description: book.description.clone(),
        isbn10: book.isbn10.clone(),
        isbn13: book.isbn13.clone(),
        publisher: book.publisher.clone(),
        published_date: book.published_date.clone(),
        language: book.language.clone(),
        page_count: book.page_count,
        edition_number: book.edition_number,
        edition_group_key: book.edition_group_key.clone(),
        cover_image_url: book.cover_image_url.clone(),
        average_rating: book.average_rating,
        ratings_count: book.ratings_count,
        list_price: book.list_price,
        currency_code: book.currency_code.clone(),
        info_link: book.info_link.clone(),
        preview_link: book.preview_link.clone(),
        purchase_link: book.purchase_link.clone(),
        web_reader_link: book.web_reader_link.clone(),
        pdf_available: book.pdf_available,
        epub_available: book.epub_available,
        categories: book.categories.clone(),
        authors: book.authors.clone(),
        qualifiers: serde_json::to_value(&book.qualifiers).unwrap_or(serde_json::Value::Null),
    };

    store.upsert_book(book_id, &fields, &unique_slug).await?;
    store.upsert_raw_snapshot(book_id, source, &book.raw_json_response).await?;

    if let Some(external_id) = external_id {
        let mut mapping = ExternalIdMapping::new(book_id, source, external_id);
        mapping.provider_isbn10 = book.isbn10.clone();
        mapping.provider_isbn13 = book.isbn13.clone();
        mapping.info_link = book.info_link.clone();
        mapping.preview_link = book.preview_link.clone();
        mapping.purchase_link = book.purchase_link.clone();
        mapping.web_reader_link = book.web_reader_link.clone();
        mapping.average_rating = book.average_rating;
        mapping.ratings_count = book.ratings_count;
        mapping.pdf_available = book.pdf_available;
        mapping.epub_available = book.epub_available;
        mapping.list_price = book.list_price;
        mapping.currency_code = book.currency_code.clone();
        store.upsert_external_mapping(&mapping).await?;
    }

    if let Some(cover_url) = &book.cover_image_url {
        store
            .upsert_image_link(&ImageLink {
                book_id,
                image_type: ImageLinkType::External,
                url: cover_url.clone(),
                source: source.to_string(),
            })
            .await?;
    }

    let mut persisted = book;
    persisted.book_id = book_id;
    persisted.slug = unique_slug;
    Ok(persisted)
}

/// Edition grouping: given every book sharing a non-null
/// `edition_group_key`, determine the primary (highest `edition_number`, ties
/// broken by `book_id`) and sync the sibling links via the store. A singleton
/// cluster yields no links.
pub async fn sync_edition_cluster(store: &dyn RelationalStore, cluster: &[CanonicalBook]) -> EngineResult<()> {
    if cluster.len() < 2 {
        return Ok(());
    }

    let primary = cluster
        .iter()
        .max_by(|a, b| {
            a.edition_number
                .cmp(&b.edition_number)
                .then(a.book_id.cmp(&b.book_id))
        })
        .ok_or_else(|| EngineError::Permanent("empty edition cluster".into()))?;

    let siblings: Vec<Uuid> = cluster
        .iter()
        .filter(|b| b.book_id != primary.book_id)
        .map(|b| b.book_id)
        .collect();

    store.sync_edition_group(primary.book_id, &siblings).await
}

/// Group a flat list of books by `edition_group_key` (ignoring books with
/// none) for `sync_edition_cluster` to consume per-cluster.
pub fn group_by_edition_key(books: &[CanonicalBook]) -> HashMap<String, Vec<CanonicalBook>> {
    let mut groups: HashMap<String, Vec<CanonicalBook>> = HashMap::new();
    for book in books {
        if let Some(key) = &book.edition_group_key {
            groups.entry(key.clone()).or_default().push(book.clone());
        }
    }
    groups
}
