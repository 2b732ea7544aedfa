//! Read cache that memoizes catalog reads in front of the store.

use color_eyre::{eyre::eyre, Report, Result};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::keys::{CacheKey, Namespace};
use super::traits::{CachedValue, Cacheable};
use crate::error::CatalogError;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// A cached value plus the write sequence observed before it was computed.
#[derive(Debug, Clone)]
struct Stamped {
  value: CachedValue,
  stamp: u64,
}

/// Invalidation bookkeeping.
///
/// Every invalidation bumps `seq` and records the new value against the
/// namespace or key it targets. An entry is current only if it was stamped
/// at or after the latest invalidation covering it, so a computation that
/// started before a write can never satisfy a read that started after it,
/// however long it runs.
struct WriteLog {
  seq: AtomicU64,
  stamps: Mutex<Stamps>,
  max_keys: usize,
}

#[derive(Default)]
struct Stamps {
  cleared: [u64; Namespace::COUNT],
  evicted: HashMap<CacheKey, u64>,
}

impl WriteLog {
  fn new(max_keys: u64) -> Self {
    Self {
      seq: AtomicU64::new(0),
      stamps: Mutex::new(Stamps::default()),
      max_keys: usize::try_from(max_keys).unwrap_or(usize::MAX).max(1),
    }
  }

  fn current(&self) -> u64 {
    self.seq.load(Ordering::SeqCst)
  }

  fn stamps(&self) -> MutexGuard<'_, Stamps> {
    self.stamps.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn clear(&self, namespace: Namespace) {
    let mut stamps = self.stamps();
    let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
    stamps.cleared[namespace.index()] = seq;
  }

  fn evict(&self, key: &CacheKey) {
    let mut stamps = self.stamps();
    let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;

    // Too many keys: fold them into their namespace stamps
    if stamps.evicted.len() >= self.max_keys && !stamps.evicted.contains_key(key) {
      let Stamps { cleared, evicted } = &mut *stamps;
      for (evicted_key, seq) in evicted.drain() {
        let ns = &mut cleared[evicted_key.namespace().index()];
        *ns = (*ns).max(seq);
      }
    }
    stamps.evicted.insert(key.clone(), seq);
  }

  fn is_current(&self, key: &CacheKey, stamp: u64) -> bool {
    let stamps = self.stamps();
    let cleared = stamps.cleared[key.namespace().index()];
    let evicted = stamps.evicted.get(key).copied().unwrap_or(0);
    stamp >= cleared && stamp >= evicted
  }
}

/// Namespaced, TTL- and size-bounded memoization of read results.
///
/// Concurrent misses on the same key share one computation; unrelated keys
/// never wait on each other. Errors are returned to every waiter and are not
/// cached.
#[derive(Clone)]
pub struct ReadCache {
  entries: Cache<CacheKey, Stamped>,
  log: Arc<WriteLog>,
  enabled: bool,
}

impl ReadCache {
  /// Create a cache whose entries expire `ttl` after being written, holding
  /// at most `max_entries` across all namespaces (least recently used go first).
  pub fn new(ttl: Duration, max_entries: u64) -> Self {
    let entries = Cache::builder()
      .max_capacity(max_entries)
      .time_to_live(ttl)
      .eviction_policy(EvictionPolicy::lru())
      .support_invalidation_closures()
      .build();

    Self {
      entries,
      log: Arc::new(WriteLog::new(max_entries)),
      enabled: true,
    }
  }

  /// A cache that keeps nothing; every read computes.
  pub fn disabled() -> Self {
    Self {
      enabled: false,
      ..Self::new(DEFAULT_TTL, 0)
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// Return the cached value for `key`, or compute, store and return it.
  ///
  /// On a hit `compute` is not called. On a miss it is called once, even
  /// when several callers miss the same key at the same time. It is called
  /// again only if an invalidation for `key` lands while it runs.
  pub async fn get_or_compute<V, F, Fut>(&self, key: CacheKey, compute: F) -> Result<V>
  where
    V: Cacheable,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<V>>,
  {
    if !self.enabled {
      return compute().await;
    }

    loop {
      let stamp = self.log.current();
      let entry = self
        .entries
        .try_get_with(key.clone(), async {
          let value = compute().await?;
          Ok::<_, Report>(Stamped {
            value: value.into_cached(),
            stamp,
          })
        })
        .await
        .map_err(unshare)?;

      if self.log.is_current(&key, entry.stamp) {
        trace!(key = %key, "Read cache entry served");
        return V::from_cached(entry.value)
          .ok_or_else(|| eyre!("Cached value for {} has an unexpected shape", key));
      }

      // Computed before an invalidation that covers it; drop and recompute.
      debug!(key = %key, "Discarding read computed before a write");
      self.entries.invalidate(&key).await;
    }
  }

  /// Evict a single key.
  pub async fn evict(&self, key: &CacheKey) {
    self.log.evict(key);
    self.entries.invalidate(key).await;
  }

  /// Evict every entry of `namespace`.
  pub async fn evict_all(&self, namespace: Namespace) {
    self.log.clear(namespace);

    // Stale entries are already unreachable; this only frees their memory.
    if let Err(e) = self
      .entries
      .invalidate_entries_if(move |key, _| key.namespace() == namespace)
    {
      warn!(namespace = %namespace, "Failed to schedule namespace eviction: {}", e);
    }
  }

  /// Whether `key` currently has a servable entry.
  pub async fn contains(&self, key: &CacheKey) -> bool {
    match self.entries.get(key).await {
      Some(entry) => self.log.is_current(key, entry.stamp),
      None => false,
    }
  }

  /// Number of stored entries, after pending evictions have been applied.
  pub async fn entry_count(&self) -> u64 {
    self.entries.run_pending_tasks().await;
    self.entries.entry_count()
  }
}

impl Default for ReadCache {
  fn default() -> Self {
    Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
  }
}

/// Take a shared computation error back to an owned report.
///
/// Waiters on a failed computation all receive the same `Arc`. Catalog
/// conditions are rebuilt so callers can still classify them.
fn unshare(err: Arc<Report>) -> Report {
  match Arc::try_unwrap(err) {
    Ok(report) => report,
    Err(shared) => match CatalogError::classify(&shared) {
      Some(catalog_err) => catalog_err.clone().into(),
      None => eyre!("{:#}", shared),
    },
  }
}
