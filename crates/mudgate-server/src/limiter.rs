//! Per-owner admission control for client→upstream command frames.
//!
//! Fixed-window refill: up to `capacity` frames per refill interval, the
//! whole bucket topped up when the window rolls over. Not a leaky bucket.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A single owner's token bucket.
#[derive(Debug)]
pub struct TokenBucket {
    tokens: u32,
    capacity: u32,
    refill_interval: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_interval,
            last_refill: Instant::now(),
        }
    }

    /// Admit one frame if a token is available.
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_refill) >= self.refill_interval {
            self.tokens = self.capacity;
            self.last_refill = now;
        }

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// Hands out one bucket per active owner.
///
/// Buckets are created lazily on first use and released when the owner's
/// relay session ends.
pub struct CommandLimiters {
    capacity: u32,
    refill_interval: Duration,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl CommandLimiters {
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Admit one frame for `owner`, creating the bucket on first use.
    pub fn allow(&self, owner: &str) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets
            .entry(owner.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity, self.refill_interval))
            .allow()
    }

    /// Drop the owner's bucket once their session terminates.
    pub fn release(&self, owner: &str) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.remove(owner);
    }
}
