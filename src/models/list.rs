//! Bestseller lists and their memberships.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookList {
    pub list_id: Uuid,
    pub provider: String,
    pub provider_list_code: String,
    pub published_date: NaiveDate,
    pub display_name: Option<String>,
    pub raw_json_response: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookListMembership {
    pub list_id: Uuid,
    pub book_id: Uuid,
    pub rank: i32,
    pub weeks_on_list: Option<i32>,
    pub provider_isbn10: Option<String>,
    pub provider_isbn13: Option<String>,
    pub referral_url: Option<String>,
}
