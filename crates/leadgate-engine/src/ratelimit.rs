// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session token bucket rate limiter.

use std::time::Duration;

use leadgate_core::LeadgateError;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket with fractional refill.
///
/// A send acquires one token, waiting for refill when the bucket is empty.
/// The wait is bounded: if the next token cannot arrive before the caller's
/// deadline, [`LeadgateError::RateLimitTimeout`] is returned without
/// consuming anything.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = Instant::now();
    }

    /// Acquire one token, waiting up to `deadline`.
    pub async fn acquire(&self, deadline: Duration) -> Result<(), LeadgateError> {
        let started = Instant::now();
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                }
                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / self.refill_per_sec)
            };
            if started.elapsed() + wait > deadline {
                return Err(LeadgateError::RateLimitTimeout { deadline });
            }
            tokio::time::sleep(wait).await;
        }
    }
}
