//! Token-bucket rate limiter for global extraction starts.
//!
//! Caps how many extractions may begin per refill window, protecting the
//! LLM provider from bursts when many users' debounce timers fire together.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// Fixed-window token bucket. `acquire` suspends until a token is available.
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// A capacity of zero is treated as one to keep `acquire` from
    /// suspending forever.
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Consume a token if one is available.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens > 0 {
            state.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Wait until a token can be consumed.
    pub async fn acquire(&self) {
        loop {
            let wake_at = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens > 0 {
                    state.tokens -= 1;
                    return;
                }
                state.last_refill + self.window
            };
            tokio::time::sleep_until(wake_at).await;
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        if now.duration_since(state.last_refill) >= self.window {
            state.tokens = self.capacity;
            state.last_refill = now;
        }
    }
}
