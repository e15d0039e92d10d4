//! Async token bucket rate limiter (C2).

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

/// Upper bound on how long a starved `take` waits before re-checking the
/// bucket. Keeps latency bounded without busy-spinning.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct Bucket {
    tokens: f64,
    last: Instant,
}

/// A token bucket with continuous wall-clock refill, safe for concurrent use.
pub struct TokenBucket {
    capacity: f64,
    rps: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// Create a bucket with the given refill rate (tokens/second) and burst
    /// capacity.
    #[must_use]
    pub fn new(rps: f64, burst: f64) -> Self {
        Self {
            capacity: burst,
            rps,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }

    /// Acquire `amount` tokens, suspending the caller until enough have
    /// accumulated. No lock is held while suspended between poll attempts.
    pub async fn take(&self, amount: f64) {
        loop {
            {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rps).min(self.capacity);
                bucket.last = now;

                if bucket.tokens >= amount {
                    bucket.tokens -= amount;
                    return;
                }
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn immediate_take_within_burst() {
        let bucket = TokenBucket::new(1.0, 5.0);
        let start = StdInstant::now();
        for _ in 0..5 {
            bucket.take(1.0).await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn starved_taker_waits_for_refill() {
        let bucket = Arc::new(TokenBucket::new(20.0, 1.0));
        bucket.take(1.0).await;
        let start = StdInstant::now();
        bucket.take(1.0).await;
        // at 20 tokens/sec, one token refills in 50ms; allow generous slack.
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
