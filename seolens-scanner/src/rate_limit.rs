// Per-host token bucket shared by every crawl in the process

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl Bucket {
    fn new(rps: f64, now: Instant) -> Self {
        let capacity = rps.ceil().max(1.0);
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: rps,
            last_refill: now,
            last_used: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes a token, or reports how long until one is available.
    fn try_take(&mut self, now: Instant) -> Option<Duration> {
        self.refill(now);
        self.last_used = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let missing = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }
}

/// Token buckets keyed by host. Buckets are created lazily on first use and never
/// drop a request: `acquire` only delays the calling worker.
#[derive(Clone, Default)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<String, Arc<Mutex<Bucket>>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for a token on `host`'s bucket.
    ///
    /// A bucket keeps the strictest rate any caller has asked for, since politeness is
    /// scoped to the host rather than to the job.
    pub async fn acquire(&self, host: &str, rps: f64) {
        let rps = if rps.is_finite() && rps > 0.0 { rps } else { 1.0 };
        let bucket = {
            let mut buckets = self.buckets.lock().await;
            buckets
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Bucket::new(rps, Instant::now()))))
                .clone()
        };

        loop {
            let wait = {
                let mut bucket = bucket.lock().await;
                if rps < bucket.refill_per_sec {
                    bucket.refill_per_sec = rps;
                    bucket.capacity = rps.ceil().max(1.0);
                    bucket.tokens = bucket.tokens.min(bucket.capacity);
                }
                bucket.try_take(Instant::now())
            };

            match wait {
                None => return,
                Some(delay) => {
                    debug!("Rate limited on {}, waiting {:?}", host, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Drop buckets that have been idle longer than `horizon`. Returns how many were removed.
    pub async fn prune_idle(&self, horizon: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let mut keep = HashMap::with_capacity(before);
        for (host, bucket) in buckets.drain() {
            let idle = {
                let b = bucket.lock().await;
                now.saturating_duration_since(b.last_used) > horizon
            };
            if !idle || Arc::strong_count(&bucket) > 1 {
                keep.insert(host, bucket);
            }
        }
        *buckets = keep;
        before - buckets.len()
    }

    pub async fn host_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_up_to_capacity_then_throttles() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for _ in 0..2 {
            limiter.acquire("example.com", 2.0).await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire("example.com", 2.0).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(490), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosts_have_independent_buckets() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        limiter.acquire("a.example.com", 1.0).await;
        limiter.acquire("b.example.com", 1.0).await;

        assert!(start.elapsed() < Duration::from_millis(10));
        assert_eq!(limiter.host_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_drops_requests() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for _ in 0..5 {
            limiter.acquire("example.com", 10.0).await;
        }
        for _ in 0..5 {
            limiter.acquire("example.com", 10.0).await;
        }
        for _ in 0..10 {
            limiter.acquire("example.com", 10.0).await;
        }

        // 10 tokens of burst, then 10 more at 10/s
        assert!(start.elapsed() >= Duration::from_millis(990));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_idle_removes_stale_buckets() {
        let limiter = RateLimiter::new();
        limiter.acquire("old.example.com", 5.0).await;
        tokio::time::advance(Duration::from_secs(600)).await;
        limiter.acquire("new.example.com", 5.0).await;

        let removed = limiter.prune_idle(Duration::from_secs(300)).await;
        assert_eq!(removed, 1);
        assert_eq!(limiter.host_count().await, 1);
    }
}
