// Fetch cache - TTL caching and in-flight request coalescing
use crate::domain::error::{CacheError, FetchError};
use crate::domain::fingerprint::QueryFingerprint;
use crate::domain::telemetry::TelemetryPayload;
use futures::future::{BoxFuture, Shared, WeakShared};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type FetchResult = Result<Arc<TelemetryPayload>, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: QueryFingerprint,
    pub entity_id: String,
    pub payload: Arc<TelemetryPayload>,
    pub fetched_at_ms: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub in_flight: usize,
}

/// Backing storage for cache entries. Entries are replaced whole, never
/// mutated in place.
pub trait CacheStore: Send + Sync {
    fn load(&self, fingerprint: &QueryFingerprint) -> Result<Option<CacheEntry>, CacheError>;
    fn store(&self, entry: CacheEntry) -> Result<(), CacheError>;
    fn remove(&self, fingerprint: &QueryFingerprint) -> Result<(), CacheError>;
    /// Remove every entry stored for `entity_id`, returning how many were dropped.
    fn remove_entity(&self, entity_id: &str) -> Result<usize, CacheError>;
    /// Fingerprint and fetch time of every stored entry.
    fn timestamps(&self) -> Result<Vec<(QueryFingerprint, i64)>, CacheError>;
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<QueryFingerprint, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<QueryFingerprint, CacheEntry>>, CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, fingerprint: &QueryFingerprint) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries()?.get(fingerprint).cloned())
    }

    fn store(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries()
            .map_err(|e| CacheError::Write(e.to_string()))?
            .insert(entry.fingerprint.clone(), entry);
        Ok(())
    }

    fn remove(&self, fingerprint: &QueryFingerprint) -> Result<(), CacheError> {
        self.entries()?.remove(fingerprint);
        Ok(())
    }

    fn remove_entity(&self, entity_id: &str) -> Result<usize, CacheError> {
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.entity_id != entity_id);
        Ok(before - entries.len())
    }

    fn timestamps(&self) -> Result<Vec<(QueryFingerprint, i64)>, CacheError> {
        Ok(self
            .entries()?
            .values()
            .map(|e| (e.fingerprint.clone(), e.fetched_at_ms))
            .collect())
    }
}

struct PendingFetch {
    id: u64,
    entity_id: String,
    fetch: WeakShared<BoxFuture<'static, FetchResult>>,
}

struct Inner {
    name: String,
    ttl_ms: i64,
    store: Box<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    pending: Mutex<HashMap<QueryFingerprint, PendingFetch>>,
    next_id: AtomicU64,
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, HashMap<QueryFingerprint, PendingFetch>> {
        // The map holds no invariants a panicking holder could break halfway.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, fingerprint: &QueryFingerprint, id: u64) -> bool {
        self.pending().get(fingerprint).is_some_and(|p| p.id == id)
    }

    fn is_fresh(&self, fetched_at_ms: i64, now_ms: i64) -> bool {
        now_ms - fetched_at_ms < self.ttl_ms
    }
}

/// Releases a pending registration when its fetch settles or when every
/// caller waiting on it has gone away.
struct PendingSlot {
    inner: Arc<Inner>,
    fingerprint: QueryFingerprint,
    id: u64,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        let mut pending = self.inner.pending();
        if pending.get(&self.fingerprint).is_some_and(|p| p.id == self.id) {
            pending.remove(&self.fingerprint);
        }
    }
}

/// TTL cache over telemetry fetches with at most one in-flight request per
/// fingerprint.
///
/// Caching is best effort: when the backing store fails, reads count as
/// misses and writes are dropped, so every call degrades to a direct fetch.
#[derive(Clone)]
pub struct FetchCache {
    inner: Arc<Inner>,
}

impl FetchCache {
    pub fn new(name: impl Into<String>, ttl: Duration) -> Self {
        Self::with_parts(name, ttl, Box::new(MemoryCacheStore::new()), Arc::new(SystemClock))
    }

    pub fn with_parts(
        name: impl Into<String>,
        ttl: Duration,
        store: Box<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                ttl_ms: ttl.as_millis() as i64,
                store,
                clock,
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.inner.ttl_ms as u64)
    }

    /// Fresh entry for `fingerprint`. Expired entries are dropped on the way.
    pub fn get(&self, fingerprint: &QueryFingerprint) -> Option<CacheEntry> {
        let entry = match self.inner.store.load(fingerprint) {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::debug!("[{}] cache read skipped: {}", self.inner.name, e);
                return None;
            }
        };

        if self.inner.is_fresh(entry.fetched_at_ms, self.inner.clock.now_ms()) {
            return Some(entry);
        }

        if let Err(e) = self.inner.store.remove(fingerprint) {
            tracing::debug!("[{}] could not drop expired entry: {}", self.inner.name, e);
        }
        None
    }

    /// Serve from cache, join an identical in-flight fetch, or start one.
    ///
    /// A successful result is cached; a failure is not, and reaches every
    /// caller that joined the fetch.
    ///
    /// `fetch` runs without any cache lock held and may call back into the
    /// cache.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        fingerprint: QueryFingerprint,
        entity_id: &str,
        fetch: F,
    ) -> Result<Arc<TelemetryPayload>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TelemetryPayload, FetchError>> + Send + 'static,
    {
        if let Some(entry) = self.get(&fingerprint) {
            tracing::debug!("[{}] cache hit for {}", self.inner.name, fingerprint);
            return Ok(entry.payload);
        }

        self.join_or_start(fingerprint, entity_id, fetch).await
    }

    fn join_or_start<F, Fut>(&self, fingerprint: QueryFingerprint, entity_id: &str, fetch: F) -> SharedFetch
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TelemetryPayload, FetchError>> + Send + 'static,
    {
        if let Some(existing) = self.in_flight_fetch(&fingerprint) {
            return existing;
        }

        tracing::debug!("[{}] cache miss for {}", self.inner.name, fingerprint);

        // Built outside the registry lock; a caller that registered meanwhile
        // wins and this request is dropped unpolled.
        let request = fetch();
        let mut pending = self.inner.pending();
        if let Some(existing) = pending.get(&fingerprint).and_then(|p| p.fetch.upgrade()) {
            tracing::debug!("[{}] joining in-flight fetch for {}", self.inner.name, fingerprint);
            return existing;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = PendingSlot {
            inner: self.inner.clone(),
            fingerprint: fingerprint.clone(),
            id,
        };
        let inner = self.inner.clone();
        let entity = entity_id.to_string();
        let key = fingerprint.clone();

        let task: SharedFetch = async move {
            let slot = slot;
            let result = request.await.map(Arc::new);

            match &result {
                // An invalidation while in flight deregisters the fetch; its
                // result still reaches waiting callers but is not cached.
                Ok(payload) if inner.is_current(&key, slot.id) => {
                    let entry = CacheEntry {
                        fingerprint: key.clone(),
                        entity_id: entity,
                        payload: payload.clone(),
                        fetched_at_ms: inner.clock.now_ms(),
                    };
                    if let Err(e) = inner.store.store(entry) {
                        tracing::warn!("[{}] cache write skipped for {}: {}", inner.name, key, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("[{}] fetch failed for {}, not cached: {}", inner.name, key, e);
                }
            }

            drop(slot);
            result
        }
        .boxed()
        .shared();

        if let Some(weak) = task.downgrade() {
            pending.insert(
                fingerprint,
                PendingFetch {
                    id,
                    entity_id: entity_id.to_string(),
                    fetch: weak,
                },
            );
        }
        drop(pending);

        task
    }

    fn in_flight_fetch(&self, fingerprint: &QueryFingerprint) -> Option<SharedFetch> {
        let existing = self.inner.pending().get(fingerprint).and_then(|p| p.fetch.upgrade())?;
        tracing::debug!("[{}] joining in-flight fetch for {}", self.inner.name, fingerprint);
        Some(existing)
    }

    /// Drop every cached entry and in-flight registration for an entity.
    pub fn invalidate(&self, entity_id: &str) -> usize {
        self.inner.pending().retain(|_, p| p.entity_id != entity_id);

        match self.inner.store.remove_entity(entity_id) {
            Ok(removed) => {
                tracing::debug!("[{}] invalidated {} entries for {}", self.inner.name, removed, entity_id);
                removed
            }
            Err(e) => {
                tracing::warn!("[{}] invalidation failed for {}: {}", self.inner.name, entity_id, e);
                0
            }
        }
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.inner.clock.now_ms();
        let Ok(entries) = self.inner.store.timestamps() else {
            return 0;
        };

        entries
            .into_iter()
            .filter(|(_, fetched_at)| !self.inner.is_fresh(*fetched_at, now))
            .filter(|(fingerprint, _)| self.inner.store.remove(fingerprint).is_ok())
            .count()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.pending().len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.inner.clock.now_ms();
        let entries = self.inner.store.timestamps().unwrap_or_default();
        let valid_entries = entries
            .iter()
            .filter(|(_, fetched_at)| self.inner.is_fresh(*fetched_at, now))
            .count();

        CacheStats {
            size: entries.len(),
            valid_entries,
            expired_entries: entries.len() - valid_entries,
            in_flight: self.in_flight(),
        }
    }
}
