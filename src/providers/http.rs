//! Shared HTTP client construction for provider adapters.
//!
//! A single `reqwest::Client` built once with a user agent and a fixed
//! timeout, reused across requests rather than rebuilt per call.

use reqwest::Client;
use std::time::Duration;

/// Provider calls time out after 15 seconds.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

pub fn build_client(user_agent: &str) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent.to_string())
        .timeout(PROVIDER_TIMEOUT)
        .build()
}
