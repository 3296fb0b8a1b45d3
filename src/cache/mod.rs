pub mod models;

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use cached::{stores::ExpiringValueCache, Cached};
use hashbrown::HashMap;
use tokio::sync::Mutex as AsyncMutex;

pub use models::CacheEntry;

use crate::{
    error::TransportError,
    request::Request,
    transport::{Response, Transport},
};

/// Number of responses kept before the least recently used one is dropped.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Serves responses from a TTL cache, fetching through a transport on miss.
///
/// At most one fetch per cache key is in flight at any time: concurrent
/// callers asking for the same key queue on that key and reuse the response
/// stored by the first one.
pub struct CacheGate {
    store: Mutex<ExpiringValueCache<String, CacheEntry>>,
    flights: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Default for CacheGate {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CacheGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            store: Mutex::new(ExpiringValueCache::with_size(capacity.max(1))),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached response for `key` if it has not expired.
    ///
    /// An expired entry is evicted by the lookup that finds it.
    pub fn lookup(&self, key: &str) -> Option<Response> {
        let key = key.to_string();
        lock(&self.store)
            .cache_get(&key)
            .map(|entry| entry.response.clone())
    }

    /// Stores `response` under `key`, replacing any previous entry.
    pub fn store(&self, key: String, response: Response, ttl: Duration) {
        lock(&self.store).cache_set(key, CacheEntry::new(response, ttl));
    }

    /// Number of stored entries, expired ones included until looked up.
    pub fn len(&self) -> usize {
        lock(&self.store).cache_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.store).cache_clear();
    }

    /// Returns the response for `request`, from the cache when possible.
    ///
    /// # Arguments
    ///
    /// * `request`: The forged request. Its `cache_ttl` (seconds) decides how
    ///   long the response is kept; 0 bypasses the cache entirely.
    /// * `transport`: Executes the request on a miss.
    ///
    /// # Returns
    ///
    /// The cached or freshly fetched response. Transport errors are returned
    /// as is and nothing is stored for them.
    pub async fn fetch(
        &self,
        request: &Request,
        transport: &dyn Transport,
    ) -> Result<Response, TransportError> {
        let ttl = request.params.cache_ttl;
        if ttl == 0 {
            return transport.execute(request).await;
        }

        let key = request.cache_key();
        if let Some(response) = self.lookup(&key) {
            #[cfg(feature = "log")]
            log::debug!("{}: served from cache", request);
            return Ok(response);
        }

        let flight = self.board(key);
        let _turn = flight.lock.lock().await;

        // The previous holder of the flight may have stored it meanwhile.
        if let Some(response) = self.lookup(&flight.key) {
            #[cfg(feature = "log")]
            log::debug!("{}: served from cache after waiting", request);
            return Ok(response);
        }

        let response = transport.execute(request).await?;
        self.store(
            flight.key.clone(),
            response.clone(),
            Duration::from_secs(ttl),
        );
        Ok(response)
    }

    /// Joins the flight for `key`, creating it when nobody else holds it.
    fn board(&self, key: String) -> Flight<'_> {
        let shared = lock(&self.flights).entry(key.clone()).or_default().clone();
        Flight {
            gate: self,
            key,
            lock: shared,
        }
    }
}

/// Membership in the flight for one cache key.
///
/// The last member to leave removes the key from the flight table, also when
/// the fetch future is dropped halfway.
struct Flight<'a> {
    gate: &'a CacheGate,
    key: String,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut flights = lock(&self.gate.flights);
        // The table and this member.
        if Arc::strong_count(&self.lock) == 2 {
            flights.remove(&self.key);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
