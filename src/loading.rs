use crate::cache::LruCache;
use crate::counters::CounterSnapshot;
use crate::error::DynError;
use crate::loader::SyncLoader;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// An [`LruCache`] layered over a synchronous loader.
///
/// On a miss (or an expired entry, when time-aware) the loader runs on the
/// calling thread and the result is inserted through the cache's put path,
/// so the configured update policy applies. Concurrent misses on the same
/// key may each invoke the loader; requests that must share one load
/// belong on [`LazyMap`](crate::LazyMap) instead.
pub struct LoadingCache<K, V, H = ahash::RandomState> {
  cache: LruCache<K, V, H>,
  loader: SyncLoader<K, V>,
}

impl<K, V, H> LoadingCache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync,
  V: Send + Sync,
  H: BuildHasher + Clone + Send + Sync,
{
  pub(crate) fn from_parts(cache: LruCache<K, V, H>, loader: SyncLoader<K, V>) -> Self {
    Self { cache, loader }
  }

  /// Returns the cached value for `key`, loading and inserting it on a
  /// miss. Loader errors propagate and nothing is cached for the key.
  pub fn get(&self, key: &K) -> Result<Arc<V>, DynError> {
    if let Some(value) = self.cache.get(key) {
      return Ok(value);
    }

    let value = Arc::new((self.loader)(key)?);
    self.cache.put_shared(key.clone(), value.clone());
    Ok(value)
  }

  /// Eagerly loads and inserts every key in `keys`. The caller is
  /// responsible for the set fitting in capacity; keys beyond it evict
  /// earlier ones as usual. Stops at the first loader error.
  pub fn warm<I>(&self, keys: I) -> Result<(), DynError>
  where
    I: IntoIterator<Item = K>,
  {
    for key in keys {
      let value = Arc::new((self.loader)(&key)?);
      self.cache.put_shared(key, value);
    }
    Ok(())
  }

  /// The wrapped cache, for direct inspection.
  pub fn cache(&self) -> &LruCache<K, V, H> {
    &self.cache
  }

  pub fn reset(&self) {
    self.cache.reset();
  }

  pub fn counters(&self) -> CounterSnapshot {
    self.cache.counters()
  }
}

impl<K, V, H> fmt::Debug for LoadingCache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync,
  V: Send + Sync,
  H: BuildHasher + Clone + Send + Sync,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LoadingCache")
      .field("cache", &self.cache)
      .finish_non_exhaustive()
  }
}
