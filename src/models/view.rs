//! Recent-view tracking and windowed aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecentView {
    pub book_id: Uuid,
    pub viewed_at: DateTime<Utc>,
    pub source: String,
}

/// Windowed view counters for a single book, as returned by
/// the view-stats lookup.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewStats {
    pub views_24h: i64,
    pub views_7d: i64,
    pub views_30d: i64,
}
