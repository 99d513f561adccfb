//! Slug generation helpers used by the resolver's `ensure_unique_slug` contract.
//!
//! The base-slug derivation filters to alphanumerics/whitespace, splits on
//! whitespace, lowercases, and joins with hyphens. Uniqueness suffixing is
//! layered on top since the store, not this module, knows what slugs already
//! exist.

use uuid::Uuid;

/// Derive a base (not-yet-unique) slug from a title.
///
/// Falls back to a deterministic slug derived from `book_id` when the title has
/// no alphanumeric characters at all.
pub fn base_slug(title: &str, book_id: Uuid) -> String {
    let filtered: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect();

    let slug = filtered
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        format!("book-{}", book_id.simple())
    } else {
        slug
    }
}

/// Append a numeric suffix to disambiguate a slug collision, e.g. `dune-2`.
pub fn with_suffix(base: &str, suffix: u32) -> String {
    format!("{base}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_title() {
        assert_eq!(base_slug("Dune Messiah", Uuid::nil()), "dune-messiah");
    }

    #[test]
    fn falls_back_to_book_id_when_title_has_no_alphanumerics() {
        let id = Uuid::nil();
        assert_eq!(base_slug("***", id), format!("book-{}", id.simple()));
    }

    #[test]
    fn suffix_disambiguates() {
        assert_eq!(with_suffix("dune", 2), "dune-2");
    }
}
