//! Aggregator.
//!
//! Merges N normalized provider payloads into one canonical record under a
//! fixed precedence order. This is the one place field-merge policy lives;
//! migration reuses these same rules.

use crate::models::CanonicalBook;
use serde_json::Value;
use uuid::Uuid;

/// A single provider payload tagged with its precedence source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrecedenceSource {
    AuthenticatedPrimary,
    UnauthenticatedPrimary,
    IsbnSearchFallback,
    Secondary,
    Editorial,
}

#[derive(Debug, Clone)]
pub struct SourcedPayload {
    pub source: PrecedenceSource,
    pub json: Value,
}

fn str_field<'a>(json: &'a Value, key: &str) -> Option<&'a str> {
    json.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn str_array(json: &Value, key: &str) -> Vec<String> {
    json.get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn union_preserving_order(lists: impl Iterator<Item = Vec<String>>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for list in lists {
        for item in list {
            if seen.insert(item.clone()) {
                result.push(item);
            }
        }
    }
    result
}

/// Merge field confidence rank: lower precedence enum value wins ties for
/// "highest-confidence" numeric fields (ratings/prices).
fn confidence_rank(source: PrecedenceSource) -> u8 {
    source as u8
}

/// Run the aggregation algorithm over payloads already normalized into the
/// flat canonical field shape. Payloads are sorted internally by
/// `PrecedenceSource` so callers may pass them in any order.
pub fn aggregate(book_id: Uuid, slug: String, mut payloads: Vec<SourcedPayload>) -> CanonicalBook {
    payloads.sort_by_key(|p| p.source);

    let mut book = CanonicalBook::blank(book_id, slug);
    let mut title_set_by_non_editorial = false;
    let mut editorial_title: Option<String> = None;
    let mut best_rating_confidence: Option<u8> = None;
    let mut best_price_confidence: Option<u8> = None;
    let mut best_description_len = 0usize;

    for payload in &payloads {
        let json = &payload.json;
        let is_editorial = payload.source == PrecedenceSource::Editorial;

        if let Some(title) = str_field(json, "title") {
            if is_editorial {
                editorial_title.get_or_insert_with(|| title.to_string());
            } else if !title_set_by_non_editorial {
                book.title = title.to_string();
                title_set_by_non_editorial = true;
            }
        }

        if book.subtitle.is_none() {
            book.subtitle = str_field(json, "subtitle").map(str::to_string);
        }

        if let Some(description) = str_field(json, "description")
            && description.len() > best_description_len
        {
            best_description_len = description.len();
            book.description = Some(description.to_string());
        }

        if book.isbn13.is_none() {
            book.isbn13 = str_field(json, "isbn13").map(str::to_string);
        }
        if book.isbn10.is_none() {
            book.isbn10 = str_field(json, "isbn10").map(str::to_string);
        }
        if book.publisher.is_none() {
            book.publisher = str_field(json, "publisher").map(str::to_string);
        }
        if book.published_date.is_none() {
            book.published_date = str_field(json, "published_date").map(str::to_string);
        }
        if book.language.is_none() {
            book.language = str_field(json, "language").map(str::to_string);
        }
        if book.page_count.is_none() {
            book.page_count = json.get("page_count").and_then(Value::as_i64).map(|v| v as i32);
        }
        if book.cover_image_url.is_none() {
            book.cover_image_url = str_field(json, "cover_image_url").map(str::to_string);
        }
        if book.info_link.is_none() {
            book.info_link = str_field(json, "info_link").map(str::to_string);
        }
        if book.preview_link.is_none() {
            book.preview_link = str_field(json, "preview_link").map(str::to_string);
        }
        if book.purchase_link.is_none() {
            book.purchase_link = str_field(json, "purchase_link").map(str::to_string);
        }
        if book.web_reader_link.is_none() {
            book.web_reader_link = str_field(json, "web_reader_link").map(str::to_string);
        }
        book.pdf_available |= json.get("pdf_available").and_then(Value::as_bool).unwrap_or(false);
        book.epub_available |= json.get("epub_available").and_then(Value::as_bool).unwrap_or(false);

        let rank = confidence_rank(payload.source);
        if let Some(rating) = json.get("average_rating").and_then(Value::as_f64)
            && best_rating_confidence.map(|best| rank < best).unwrap_or(true)
        {
            book.average_rating = Some(rating);
            book.ratings_count = json.get("ratings_count").and_then(Value::as_i64);
            best_rating_confidence = Some(rank);
        }
        if let Some(price) = json.get("list_price").and_then(Value::as_f64)
            && best_price_confidence.map(|best| rank < best).unwrap_or(true)
        {
            book.list_price = Some(price);
            book.currency_code = str_field(json, "currency_code").map(str::to_string);
            best_price_confidence = Some(rank);
        }
    }

    if !title_set_by_non_editorial
        && let Some(title) = editorial_title
    {
        book.title = title;
    }

    book.authors = union_preserving_order(payloads.iter().map(|p| str_array(&p.json, "authors")));
    book.categories = union_preserving_order(payloads.iter().map(|p| str_array(&p.json, "categories")));

    book.raw_json_response = Value::Object(
        payloads
            .iter()
            .map(|p| (p.source_key(), p.json.clone()))
            .collect(),
    );

    book
}

impl SourcedPayload {
    fn source_key(&self) -> String {
        match self.source {
            PrecedenceSource::AuthenticatedPrimary => "authenticated_primary".to_string(),
            PrecedenceSource::UnauthenticatedPrimary => "unauthenticated_primary".to_string(),
            PrecedenceSource::IsbnSearchFallback => "isbn_search_fallback".to_string(),
            PrecedenceSource::Secondary => "secondary".to_string(),
            PrecedenceSource::Editorial => "editorial".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_non_empty_title_wins_in_precedence_order() {
        let payloads = vec![
            SourcedPayload {
                source: PrecedenceSource::UnauthenticatedPrimary,
                json: json!({"title": "Dune"}),
            },
            SourcedPayload {
                source: PrecedenceSource::AuthenticatedPrimary,
                json: json!({"title": "Dune (Authenticated)"}),
            },
        ];
        let book = aggregate(Uuid::nil(), "dune".into(), payloads);
        assert_eq!(book.title, "Dune (Authenticated)");
    }

    #[test]
    fn editorial_title_only_wins_when_all_others_empty() {
        let payloads = vec![
            SourcedPayload {
                source: PrecedenceSource::Editorial,
                json: json!({"title": "Bestseller Title"}),
            },
            SourcedPayload {
                source: PrecedenceSource::Secondary,
                json: json!({"title": "Secondary Title"}),
            },
        ];
        let book = aggregate(Uuid::nil(), "dune".into(), payloads);
        assert_eq!(book.title, "Secondary Title");

        let payloads_empty_others = vec![SourcedPayload {
            source: PrecedenceSource::Editorial,
            json: json!({"title": "Bestseller Title"}),
        }];
        let book2 = aggregate(Uuid::nil(), "dune".into(), payloads_empty_others);
        assert_eq!(book2.title, "Bestseller Title");
    }

    #[test]
    fn longest_description_wins() {
        let payloads = vec![
            SourcedPayload {
                source: PrecedenceSource::AuthenticatedPrimary,
                json: json!({"description": "short"}),
            },
            SourcedPayload {
                source: PrecedenceSource::Secondary,
                json: json!({"description": "a much longer description of the book"}),
            },
        ];
        let book = aggregate(Uuid::nil(), "dune".into(), payloads);
        assert_eq!(book.description.as_deref(), Some("a much longer description of the book"));
    }

    #[test]
    fn authors_and_categories_union_preserving_order() {
        let payloads = vec![
            SourcedPayload {
                source: PrecedenceSource::AuthenticatedPrimary,
                json: json!({"authors": ["Frank Herbert"], "categories": ["Fiction"]}),
            },
            SourcedPayload {
                source: PrecedenceSource::Secondary,
                json: json!({"authors": ["Frank Herbert", "Brian Herbert"], "categories": ["Sci-Fi"]}),
            },
        ];
        let book = aggregate(Uuid::nil(), "dune".into(), payloads);
        assert_eq!(book.authors, vec!["Frank Herbert", "Brian Herbert"]);
        assert_eq!(book.categories, vec!["Fiction", "Sci-Fi"]);
    }

    #[test]
    fn authenticated_source_wins_rating_confidence_tie() {
        let payloads = vec![
            SourcedPayload {
                source: PrecedenceSource::Secondary,
                json: json!({"average_rating": 3.0, "ratings_count": 10}),
            },
            SourcedPayload {
                source: PrecedenceSource::AuthenticatedPrimary,
                json: json!({"average_rating": 4.5, "ratings_count": 900}),
            },
        ];
        let book = aggregate(Uuid::nil(), "dune".into(), payloads);
        assert_eq!(book.average_rating, Some(4.5));
        assert_eq!(book.ratings_count, Some(900));
    }
}
