//! Shared exponential-backoff retry helper.
//!
//! Only `Transient` errors are retried, bounded by `max_attempts`, with
//! jittered exponential backoff. Used by the object cache adapter; provider
//! adapters deliberately do not use this — they never retry internally.

use crate::config::RetryConfig;
use crate::error::{EngineError, EngineResult};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut attempt: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut backoff = config.initial_backoff();
    let mut attempts_made = 0u32;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempts_made + 1 < config.max_attempts => {
                attempts_made += 1;
                let jitter_ms = rand::rng().random_range(0..=25u64);
                tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
                backoff = backoff.mul_f64(config.backoff_multiplier);
            }
            Err(err) => return Err(err),
        }
    }
}
