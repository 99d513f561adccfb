//! Postgres-backed `RelationalStore` implementation.

use super::{BookFields, RelationalStore};
use crate::error::{EngineError, EngineResult};
use crate::models::book::CanonicalBook;
use crate::models::external_id::{ExternalIdMapping, ImageLink, ImageLinkType};
use crate::models::list::{BookList, BookListMembership};
use crate::models::view::ViewStats;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> EngineResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(EngineError::from)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_book(row: &sqlx::postgres::PgRow) -> EngineResult<CanonicalBook> {
        Ok(CanonicalBook {
            book_id: row.try_get("id")?,
            title: row.try_get("title")?,
            subtitle: row.try_get("subtitle")?,
            description: row.try_get("description")?,
            slug: row.try_get("slug")?,
            isbn10: row.try_get("isbn10")?,
            isbn13: row.try_get("isbn13")?,
            publisher: row.try_get("publisher")?,
            published_date: row.try_get("published_date")?,
            language: row.try_get("language")?,
            page_count: row.try_get("page_count")?,
            edition_number: row.try_get("edition_number")?,
            edition_group_key: row.try_get("edition_group_key")?,
            cover_image_url: row.try_get("cover_image_url")?,
            average_rating: row.try_get("average_rating")?,
            ratings_count: row.try_get("ratings_count")?,
            list_price: row.try_get("list_price")?,
            currency_code: row.try_get("currency_code")?,
            info_link: row.try_get("info_link")?,
            preview_link: row.try_get("preview_link")?,
            purchase_link: row.try_get("purchase_link")?,
            web_reader_link: row.try_get("web_reader_link")?,
            pdf_available: row.try_get("pdf_available")?,
            epub_available: row.try_get("epub_available")?,
            categories: row.try_get("categories")?,
            authors: row.try_get("authors")?,
            qualifiers: {
                let raw: serde_json::Value = row.try_get("qualifiers")?;
                match raw {
                    serde_json::Value::Object(map) => map.into_iter().collect(),
                    _ => Default::default(),
                }
            },
            raw_json_response: serde_json::Value::Null,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn fetch_by_column(&self, column: &str, value: &str) -> EngineResult<CanonicalBook> {
        let query = format!("SELECT * FROM books WHERE {column} = $1");
        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(EngineError::from)?
            .ok_or(EngineError::NotFound)?;
        Self::row_to_book(&row)
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn fetch_by_canonical_id(&self, id: Uuid) -> EngineResult<CanonicalBook> {
        let row = sqlx::query("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(EngineError::from)?
            .ok_or(EngineError::NotFound)?;
        Self::row_to_book(&row)
    }

    async fn fetch_by_isbn13(&self, isbn13: &str) -> EngineResult<CanonicalBook> {
        self.fetch_by_column("isbn13", isbn13).await
    }

    async fn fetch_by_isbn10(&self, isbn10: &str) -> EngineResult<CanonicalBook> {
        self.fetch_by_column("isbn10", isbn10).await
    }

    async fn fetch_by_slug(&self, slug: &str) -> EngineResult<CanonicalBook> {
        self.fetch_by_column("slug", slug).await
    }

    async fn fetch_by_external_id(&self, source: &str, external_id: &str) -> EngineResult<CanonicalBook> {
        let row = sqlx::query(
            "SELECT b.* FROM books b \
             JOIN book_external_ids e ON e.book_id = b.id \
             WHERE e.source = $1 AND e.external_id = $2",
        )
        .bind(source)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(EngineError::from)?
        .ok_or(EngineError::NotFound)?;
        Self::row_to_book(&row)
    }

    async fn upsert_book(&self, book_id: Uuid, fields: &BookFields, slug: &str) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO books (
                id, title, subtitle, description, slug, isbn10, isbn13, publisher,
                published_date, language, page_count, edition_number, edition_group_key,
                cover_image_url, average_rating, ratings_count, list_price, currency_code,
                info_link, preview_link, purchase_link, web_reader_link,
                pdf_available, epub_available, categories, authors, qualifiers,
                created_at, updated_at
             ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, now(), now()
             )
             ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                subtitle = COALESCE(EXCLUDED.subtitle, books.subtitle),
                description = COALESCE(EXCLUDED.description, books.description),
                isbn10 = COALESCE(EXCLUDED.isbn10, books.isbn10),
                isbn13 = COALESCE(EXCLUDED.isbn13, books.isbn13),
                publisher = COALESCE(EXCLUDED.publisher, books.publisher),
                published_date = COALESCE(EXCLUDED.published_date, books.published_date),
                language = COALESCE(EXCLUDED.language, books.language),
                page_count = COALESCE(EXCLUDED.page_count, books.page_count),
                edition_number = COALESCE(EXCLUDED.edition_number, books.edition_number),
                edition_group_key = COALESCE(EXCLUDED.edition_group_key, books.edition_group_key),
                cover_image_url = COALESCE(EXCLUDED.cover_image_url, books.cover_image_url),
                average_rating = COALESCE(EXCLUDED.average_rating, books.average_rating),
                ratings_count = COALESCE(EXCLUDED.ratings_count, books.ratings_count),
                list_price = COALESCE(EXCLUDED.list_price, books.list_price),
                currency_code = COALESCE(EXCLUDED.currency_code, books.currency_code),
                info_link = COALESCE(EXCLUDED.info_link, books.info_link),
                preview_link = COALESCE(EXCLUDED.preview_link, books.preview_link),
                purchase_link = COALESCE(EXCLUDED.purchase_link, books.purchase_link),
                web_reader_link = COALESCE(EXCLUDED.web_reader_link, books.web_reader_link),
                pdf_available = EXCLUDED.pdf_available OR books.pdf_available,
                epub_available = EXCLUDED.epub_available OR books.epub_available,
                categories = EXCLUDED.categories,
                authors = EXCLUDED.authors,
                qualifiers = books.qualifiers || EXCLUDED.qualifiers,
                updated_at = now()",
        )
        .bind(book_id)
        .bind(&fields.title)
        .bind(&fields.subtitle)
        .bind(&fields.description)
        .bind(slug)
        .bind(&fields.isbn10)
        .bind(&fields.isbn13)
        .bind(&fields.publisher)
        .bind(&fields.published_date)
        .bind(&fields.language)
        .bind(fields.page_count)
        .bind(fields.edition_number)
        .bind(&fields.edition_group_key)
        .bind(&fields.cover_image_url)
        .bind(fields.average_rating)
        .bind(fields.ratings_count)
        .bind(fields.list_price)
        .bind(&fields.currency_code)
        .bind(&fields.info_link)
        .bind(&fields.preview_link)
        .bind(&fields.purchase_link)
        .bind(&fields.web_reader_link)
        .bind(fields.pdf_available)
        .bind(fields.epub_available)
        .bind(&fields.categories)
        .bind(&fields.authors)
        .bind(&fields.qualifiers)
        .execute(&self.pool)
        .await
        .map_err(EngineError::from)?;
        Ok(())
    }

    async fn upsert_external_mapping(&self, mapping: &ExternalIdMapping) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO book_external_ids (
                book_id, source, external_id, provider_isbn10, provider_isbn13,
                info_link, preview_link, purchase_link, web_reader_link,
                average_rating, ratings_count, pdf_available, epub_available,
                list_price, currency_code, created_at, last_updated
             ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15, now(), now())
             ON CONFLICT (source, external_id) DO UPDATE SET
                book_id = EXCLUDED.book_id,
                provider_isbn10 = COALESCE(EXCLUDED.provider_isbn10, book_external_ids.provider_isbn10),
                provider_isbn13 = COALESCE(EXCLUDED.provider_isbn13, book_external_ids.provider_isbn13),
                info_link = COALESCE(EXCLUDED.info_link, book_external_ids.info_link),
                preview_link = COALESCE(EXCLUDED.preview_link, book_external_ids.preview_link),
                purchase_link = COALESCE(EXCLUDED.purchase_link, book_external_ids.purchase_link),
                web_reader_link = COALESCE(EXCLUDED.web_reader_link, book_external_ids.web_reader_link),
                average_rating = COALESCE(EXCLUDED.average_rating, book_external_ids.average_rating),
                ratings_count = COALESCE(EXCLUDED.ratings_count, book_external_ids.ratings_count),
                pdf_available = EXCLUDED.pdf_available OR book_external_ids.pdf_available,
                epub_available = EXCLUDED.epub_available OR book_external_ids.epub_available,
                list_price = COALESCE(EXCLUDED.list_price, book_external_ids.list_price),
                currency_code = COALESCE(EXCLUDED.currency_code, book_external_ids.currency_code),
                last_updated = now()",
        )
        .bind(mapping.book_id)
        .bind(&mapping.source)
        .bind(&mapping.external_id)
        .bind(&mapping.provider_isbn10)
        .bind(&mapping.provider_isbn13)
        .bind(&mapping.info_link)
        .bind(&mapping.preview_link)
        .bind(&mapping.purchase_link)
        .bind(&mapping.web_reader_link)
        .bind(mapping.average_rating)
        .bind(mapping.ratings_count)
        .bind(mapping.pdf_available)
        .bind(mapping.epub_available)
        .bind(mapping.list_price)
        .bind(&mapping.currency_code)
        .execute(&self.pool)
        .await
        .map_err(EngineError::from)?;
        Ok(())
    }

    async fn upsert_raw_snapshot(&self, book_id: Uuid, source: &str, json: &serde_json::Value) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO book_raw_data (book_id, source, raw_json_response, fetched_at, contributed_at)
             VALUES ($1, $2, $3, now(), now())
             ON CONFLICT (book_id, source) DO UPDATE SET
                raw_json_response = EXCLUDED.raw_json_response,
                fetched_at = now()",
        )
        .bind(book_id)
        .bind(source)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(EngineError::from)?;
        Ok(())
    }

    async fn upsert_image_link(&self, link: &ImageLink) -> EngineResult<()> {
        let image_type = match link.image_type {
            ImageLinkType::Preferred => "preferred",
            ImageLinkType::Fallback => "fallback",
            ImageLinkType::External => "external",
            ImageLinkType::Object => "object",
        };
        sqlx::query(
            "INSERT INTO book_image_links (book_id, image_type, url, source)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (book_id, image_type) DO UPDATE SET
                url = EXCLUDED.url, source = EXCLUDED.source",
        )
        .bind(link.book_id)
        .bind(image_type)
        .bind(&link.url)
        .bind(&link.source)
        .execute(&self.pool)
        .await
        .map_err(EngineError::from)?;
        Ok(())
    }

    async fn ensure_unique_slug(&self, desired: &str) -> EngineResult<String> {
        let row = sqlx::query("SELECT ensure_unique_slug($1) AS slug")
            .bind(desired)
            .fetch_one(&self.pool)
            .await
            .map_err(EngineError::from)?;
        row.try_get("slug").map_err(EngineError::from)
    }

    async fn sync_edition_group(&self, primary: Uuid, siblings: &[Uuid]) -> EngineResult<()> {
        let mut all = siblings.to_vec();
        all.push(primary);

        let mut tx = self.pool.begin().await.map_err(EngineError::from)?;
        sqlx::query("DELETE FROM book_editions WHERE book_id = ANY($1) OR related_book_id = ANY($1)")
            .bind(&all)
            .execute(&mut *tx)
            .await
            .map_err(EngineError::from)?;

        for sibling in siblings {
            sqlx::query(
                "INSERT INTO book_editions (book_id, related_book_id, link_source, relationship_type, created_at, updated_at)
                 VALUES ($1, $2, 'resolver', 'ALTERNATE_EDITION', now(), now())
                 ON CONFLICT (book_id, related_book_id) DO NOTHING",
            )
            .bind(primary)
            .bind(sibling)
            .execute(&mut *tx)
            .await
            .map_err(EngineError::from)?;
        }

        tx.commit().await.map_err(EngineError::from)?;
        Ok(())
    }

    async fn refresh_search_view(&self) -> EngineResult<()> {
        sqlx::query("REFRESH MATERIALIZED VIEW CONCURRENTLY book_search_view")
            .execute(&self.pool)
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }

    async fn fetch_view_stats_for_book(&self, book_id: Uuid) -> EngineResult<ViewStats> {
        let row = sqlx::query(
            "SELECT
                count(*) FILTER (WHERE viewed_at > now() - interval '1 day') AS views_24h,
                count(*) FILTER (WHERE viewed_at > now() - interval '7 days') AS views_7d,
                count(*) FILTER (WHERE viewed_at > now() - interval '30 days') AS views_30d
             FROM recent_book_views WHERE book_id = $1",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(EngineError::from)?;

        Ok(ViewStats {
            views_24h: row.try_get("views_24h")?,
            views_7d: row.try_get("views_7d")?,
            views_30d: row.try_get("views_30d")?,
        })
    }

    async fn record_view(&self, book_id: Uuid, source: &str) -> EngineResult<()> {
        sqlx::query("INSERT INTO recent_book_views (book_id, viewed_at, source) VALUES ($1, now(), $2)")
            .bind(book_id)
            .bind(source)
            .execute(&self.pool)
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }

    async fn upsert_book_list(&self, list: &BookList) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO book_lists (id, provider, provider_list_code, published_date, display_name, raw_json_response)
             VALUES ($1,$2,$3,$4,$5,$6)
             ON CONFLICT (provider, provider_list_code, published_date) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                raw_json_response = EXCLUDED.raw_json_response",
        )
        .bind(list.list_id)
        .bind(&list.provider)
        .bind(&list.provider_list_code)
        .bind(list.published_date)
        .bind(&list.display_name)
        .bind(&list.raw_json_response)
        .execute(&self.pool)
        .await
        .map_err(EngineError::from)?;
        Ok(())
    }

    async fn upsert_list_membership(&self, membership: &BookListMembership) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO book_lists_join (list_id, book_id, rank, weeks_on_list, provider_isbn10, provider_isbn13, referral_url)
             VALUES ($1,$2,$3,$4,$5,$6,$7)
             ON CONFLICT (list_id, book_id) DO UPDATE SET
                rank = EXCLUDED.rank,
                weeks_on_list = EXCLUDED.weeks_on_list,
                referral_url = COALESCE(EXCLUDED.referral_url, book_lists_join.referral_url)",
        )
        .bind(membership.list_id)
        .bind(membership.book_id)
        .bind(membership.rank)
        .bind(membership.weeks_on_list)
        .bind(&membership.provider_isbn10)
        .bind(&membership.provider_isbn13)
        .bind(&membership.referral_url)
        .execute(&self.pool)
        .await
        .map_err(EngineError::from)?;
        Ok(())
    }

    async fn reassign_external_mapping(&self, source: &str, external_id: &str, new_book_id: Uuid) -> EngineResult<()> {
        sqlx::query("UPDATE book_external_ids SET book_id = $1, last_updated = now() WHERE source = $2 AND external_id = $3")
            .bind(new_book_id)
            .bind(source)
            .bind(external_id)
            .execute(&self.pool)
            .await
            .map_err(EngineError::from)?;
        Ok(())
    }
}
