//! Identifier classifier.
//!
//! Pure, deterministic classification of an arbitrary input string into one of
//! the identifier kinds the rest of the engine dispatches on. Every other
//! component takes pre-classified input; nothing else re-implements these
//! rules.

use regex::Regex;
use std::sync::LazyLock;

static CANONICAL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static regex is valid")
});

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)+$").expect("static regex is valid"));

/// The kind of identifier an input string was classified as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    CanonicalId(String),
    Isbn13(String),
    Isbn10(String),
    ProviderVolumeId(String),
    Slug(String),
    Unknown(String),
}

impl Identifier {
    /// Whether this identifier is safe to send directly to a provider's
    /// volume-by-id endpoint.
    pub fn is_volume_lookup_safe(&self) -> bool {
        matches!(self, Identifier::CanonicalId(_) | Identifier::ProviderVolumeId(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::CanonicalId(s)
            | Identifier::Isbn13(s)
            | Identifier::Isbn10(s)
            | Identifier::ProviderVolumeId(s)
            | Identifier::Slug(s)
            | Identifier::Unknown(s) => s,
        }
    }
}

/// Strip non-alphanumeric characters and uppercase, per the ISBN sanitisation rule.
pub fn sanitize_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase()
}

fn isbn13_checksum_valid(digits: &str) -> bool {
    if digits.len() != 13 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let sum: u32 = digits
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let d = (b - b'0') as u32;
            if i % 2 == 0 { d } else { d * 3 }
        })
        .sum();
    sum % 10 == 0
}

fn isbn10_checksum_valid(candidate: &str) -> bool {
    if candidate.len() != 10 {
        return false;
    }
    let bytes = candidate.as_bytes();
    if !bytes[..9].iter().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let last = bytes[9];
    if !(last.is_ascii_digit() || last == b'X') {
        return false;
    }
    let mut sum: u32 = 0;
    for (i, b) in bytes[..9].iter().enumerate() {
        let d = (b - b'0') as u32;
        sum += d * (10 - i as u32);
    }
    sum += if last == b'X' { 10 } else { (last - b'0') as u32 };
    sum % 11 == 0
}

/// Classify a raw input string.
///
/// Order matters: canonical ID and ISBN shapes are checked before the looser
/// provider-id/slug fallbacks so a 13-digit provider id is never mistaken for
/// an ISBN-13 that fails checksum (it is rejected and falls through instead).
pub fn classify(input: &str) -> Identifier {
    let trimmed = input.trim();

    if CANONICAL_ID_RE.is_match(trimmed) {
        return Identifier::CanonicalId(trimmed.to_ascii_lowercase());
    }

    let sanitized = sanitize_isbn(trimmed);
    if sanitized.len() == 13 && isbn13_checksum_valid(&sanitized) {
        return Identifier::Isbn13(sanitized);
    }
    if sanitized.len() == 10 && isbn10_checksum_valid(&sanitized) {
        return Identifier::Isbn10(sanitized);
    }

    if SLUG_RE.is_match(trimmed) {
        return Identifier::Slug(trimmed.to_string());
    }

    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Identifier::ProviderVolumeId(trimmed.to_string());
    }

    Identifier::Unknown(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_canonical_uuid() {
        let id = "0193f1b7-4f63-7a3b-8e64-9b2d0a1c2e33";
        assert_eq!(classify(id), Identifier::CanonicalId(id.to_string()));
    }

    #[test]
    fn classifies_valid_isbn13() {
        assert_eq!(
            classify("9780441013593"),
            Identifier::Isbn13("9780441013593".to_string())
        );
    }

    #[test]
    fn rejects_checksum_invalid_isbn13() {
        // Syntactically 13 digits but wrong check digit must NOT classify as Isbn13.
        assert_ne!(
            classify("9780441013590"),
            Identifier::Isbn13("9780441013590".to_string())
        );
    }

    #[test]
    fn accepts_isbn10_with_x_checksum() {
        assert_eq!(classify("080442957X"), Identifier::Isbn10("080442957X".to_string()));
        // lowercase x normalised to uppercase
        assert_eq!(classify("080442957x"), Identifier::Isbn10("080442957X".to_string()));
    }

    #[test]
    fn classifies_slug() {
        assert_eq!(
            classify("dune-messiah-1969"),
            Identifier::Slug("dune-messiah-1969".to_string())
        );
    }

    #[test]
    fn classifies_provider_volume_id() {
        assert_eq!(
            classify("oaijW7sKqTYC"),
            Identifier::ProviderVolumeId("oaijW7sKqTYC".to_string())
        );
    }

    #[test]
    fn volume_lookup_safety() {
        assert!(classify("oaijW7sKqTYC").is_volume_lookup_safe());
        assert!(!classify("9780441013593").is_volume_lookup_safe());
        assert!(!classify("dune-messiah-1969").is_volume_lookup_safe());
    }
}
