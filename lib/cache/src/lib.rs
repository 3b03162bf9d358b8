//! Small in-process caching / locking primitives, the shape of the
//! teacher's `cache` lib (`CloneCache`, `TimeoutCache`) inferred from its
//! call sites in `bin/periphery/src/api/docker.rs` and `bin/core/src/state.rs`.

use std::{
  hash::Hash,
  sync::Arc,
  time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio::sync::Mutex;

/// A `Clone`-on-read cache keyed map. Values are cheap to clone (usually
/// `Arc<T>` or a small struct) so readers never hold a lock across `.await`.
#[derive(Debug)]
pub struct CloneCache<K, V>(DashMap<K, V>);

impl<K: Eq + Hash, V> Default for CloneCache<K, V> {
  fn default() -> Self {
    Self(DashMap::new())
  }
}

impl<K: Eq + Hash + Clone, V: Clone> CloneCache<K, V> {
  pub async fn get(&self, key: &K) -> Option<V> {
    self.0.get(key).map(|v| v.clone())
  }

  pub async fn insert(&self, key: K, value: V) -> Option<V> {
    self.0.insert(key, value)
  }

  pub async fn remove(&self, key: &K) -> Option<V> {
    self.0.remove(key).map(|(_, v)| v)
  }

  pub async fn values(&self) -> Vec<V> {
    self.0.iter().map(|e| e.value().clone()).collect()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Per-key `Mutex<()>` registry used to serialize writes for a given key
/// (spec.md §5: "all writes for a single service ... are serialized by a
/// per-service mutex").
#[derive(Debug, Default)]
pub struct KeyedLocks<K>(DashMap<K, Arc<Mutex<()>>>);

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
  pub fn lock_for(&self, key: &K) -> Arc<Mutex<()>> {
    self
      .0
      .entry(key.clone())
      .or_insert_with(|| Arc::new(Mutex::new(())))
      .clone()
  }
}

/// A result cache keyed by `K` that treats entries older than a fixed
/// timeout as stale, used to de-duplicate concurrent identical requests
/// (mirrors `pull_cache()` in the teacher's `docker.rs`, deduplicating
/// concurrent `docker pull` calls for the same image).
pub struct TimeoutCache<K, V> {
  entries: DashMap<K, Arc<Mutex<TimedEntry<V>>>>,
  timeout: Duration,
}

pub struct TimedEntry<V> {
  pub value: Option<V>,
  pub last_set: Option<Instant>,
}

impl<V> Default for TimedEntry<V> {
  fn default() -> Self {
    Self {
      value: None,
      last_set: None,
    }
  }
}

impl<V: Clone> TimedEntry<V> {
  pub fn set(&mut self, value: V) {
    self.value = Some(value);
    self.last_set = Some(Instant::now());
  }

  pub fn is_fresh(&self, timeout: Duration) -> bool {
    self
      .last_set
      .map(|t| t.elapsed() < timeout)
      .unwrap_or(false)
  }
}

impl<K: Eq + Hash + Clone, V: Clone> TimeoutCache<K, V> {
  pub fn new(timeout: Duration) -> Self {
    Self {
      entries: DashMap::new(),
      timeout,
    }
  }

  pub async fn get_lock(&self, key: K) -> Arc<Mutex<TimedEntry<V>>> {
    self
      .entries
      .entry(key)
      .or_insert_with(|| Arc::new(Mutex::new(TimedEntry::default())))
      .clone()
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn clone_cache_roundtrip() {
    let cache: CloneCache<String, i32> = CloneCache::default();
    cache.insert("a".to_string(), 1).await;
    assert_eq!(cache.get(&"a".to_string()).await, Some(1));
    cache.remove(&"a".to_string()).await;
    assert_eq!(cache.get(&"a".to_string()).await, None);
  }

  #[tokio::test]
  async fn keyed_lock_same_arc_for_same_key() {
    let locks: KeyedLocks<String> = KeyedLocks::default();
    let a = locks.lock_for(&"svc-1".to_string());
    let b = locks.lock_for(&"svc-1".to_string());
    assert!(Arc::ptr_eq(&a, &b));
  }

  #[tokio::test]
  async fn timeout_cache_freshness() {
    let cache: TimeoutCache<String, i32> =
      TimeoutCache::new(Duration::from_millis(50));
    let lock = cache.get_lock("img".to_string()).await;
    let mut entry = lock.lock().await;
    assert!(!entry.is_fresh(cache.timeout()));
    entry.set(42);
    assert!(entry.is_fresh(cache.timeout()));
  }
}
