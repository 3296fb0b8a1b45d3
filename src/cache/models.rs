use std::time::Duration;

use cached::stores::CanExpire;
use tokio::time::Instant;

use crate::transport::Response;

/// A response kept by the [`CacheGate`](super::CacheGate).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: Response,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    pub fn new(response: Response, ttl: Duration) -> Self {
        Self {
            response,
            stored_at: Instant::now(),
            ttl,
        }
    }

    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }
}

impl CanExpire for CacheEntry {
    /// Valid while `age < ttl`.
    fn is_expired(&self) -> bool {
        self.age() >= self.ttl
    }
}
