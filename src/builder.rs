use crate::cache::LruCache;
use crate::error::{BuildError, DynError};
use crate::lazy::LazyMap;
use crate::loader::{BoxLoadFuture, DeferredLoader, SyncLoader};
use crate::loading::LoadingCache;
use crate::log_sink::{FacadeSink, LogSink};
use crate::signal::CancelSignal;

use core::fmt;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// A builder for [`LruCache`] and [`LoadingCache`] instances.
///
/// `capacity` is the one mandatory knob; everything else has a default.
pub struct CacheBuilder<K, V, H = ahash::RandomState> {
  capacity: usize,
  concurrency: usize,
  update_existing: bool,
  item_lifetime: Option<Duration>,
  hasher: H,
  _key_marker: PhantomData<fn(K) -> V>,
}

impl<K, V, H> fmt::Debug for CacheBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("capacity", &self.capacity)
      .field("concurrency", &self.concurrency)
      .field("update_existing", &self.update_existing)
      .field("item_lifetime", &self.item_lifetime)
      .finish_non_exhaustive()
  }
}

impl<K, V, H: BuildHasher + Default> CacheBuilder<K, V, H> {
  /// Creates a builder with default settings. The shard count defaults to
  /// the number of logical CPUs.
  pub fn new() -> Self {
    Self {
      capacity: 0,
      concurrency: num_cpus::get().max(1),
      update_existing: false,
      item_lifetime: None,
      hasher: H::default(),
      _key_marker: PhantomData,
    }
  }
}

impl<K, V> Default for CacheBuilder<K, V, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V, H> CacheBuilder<K, V, H> {
  /// Sets the maximum number of entries. Required, and must be positive.
  pub fn capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  /// Sets the number of independently locked recency shards.
  pub fn concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency;
    self
  }

  /// Chooses what a put against an existing key does: replace the stored
  /// value in place (`true`) or keep it and only refresh its recency
  /// (`false`, the default).
  pub fn update_existing(mut self, update_existing: bool) -> Self {
    self.update_existing = update_existing;
    self
  }

  /// Gives every entry a fixed lifetime, turning the cache time-aware.
  /// Expired entries read as absent and are removed on observation.
  pub fn item_lifetime(mut self, lifetime: Duration) -> Self {
    self.item_lifetime = Some(lifetime);
    self
  }

  /// Sets the hasher used by the hash index.
  pub fn hasher(mut self, hasher: H) -> Self {
    self.hasher = hasher;
    self
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.capacity == 0 {
      return Err(BuildError::ZeroCapacity);
    }
    if self.concurrency == 0 {
      return Err(BuildError::ZeroConcurrency);
    }
    if self.item_lifetime == Some(Duration::ZERO) {
      return Err(BuildError::ZeroItemLifetime);
    }
    Ok(())
  }
}

impl<K, V, H> CacheBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync,
  V: Send + Sync,
  H: BuildHasher + Clone + Send + Sync,
{
  /// Builds the plain put-style cache.
  pub fn build(self) -> Result<LruCache<K, V, H>, BuildError> {
    self.validate()?;
    Ok(LruCache::from_parts(
      self.capacity,
      self.concurrency,
      self.update_existing,
      self.item_lifetime,
      self.hasher,
    ))
  }

  /// Builds a cache that fills misses through `loader`, invoked on the
  /// calling thread.
  pub fn build_loading<F>(self, loader: F) -> Result<LoadingCache<K, V, H>, BuildError>
  where
    F: Fn(&K) -> Result<V, DynError> + Send + Sync + 'static,
  {
    let cache = self.build()?;
    let loader: SyncLoader<K, V> = Arc::new(loader);
    Ok(LoadingCache::from_parts(cache, loader))
  }
}

const DEFAULT_MAP_CAPACITY: usize = 50_000;
const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// A builder for [`LazyMap`] instances.
pub struct LazyMapBuilder<K, V, H = ahash::RandomState> {
  loader: DeferredLoader<K, V>,
  initial: Vec<(K, V)>,
  concurrency_level: usize,
  capacity: usize,
  task_timeout: Duration,
  logger: Arc<dyn LogSink>,
  hasher: H,
}

impl<K, V, H> fmt::Debug for LazyMapBuilder<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LazyMapBuilder")
      .field("concurrency_level", &self.concurrency_level)
      .field("capacity", &self.capacity)
      .field("task_timeout", &self.task_timeout)
      .field("preloads", &self.initial.len())
      .finish_non_exhaustive()
  }
}

impl<K, V> LazyMapBuilder<K, V, ahash::RandomState> {
  /// Creates a builder around the deferred loader.
  ///
  /// The loader is called with the key and a cancellation signal scoped to
  /// the load's internal budget; the future it returns should watch that
  /// signal and bail out early when it fires.
  pub fn new<F, Fut>(loader: F) -> Self
  where
    F: Fn(K, CancelSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, DynError>> + Send + 'static,
  {
    let loader: DeferredLoader<K, V> =
      Arc::new(move |key, signal| Box::pin(loader(key, signal)) as BoxLoadFuture<V>);

    Self {
      loader,
      initial: Vec::new(),
      concurrency_level: num_cpus::get().max(1),
      capacity: DEFAULT_MAP_CAPACITY,
      task_timeout: DEFAULT_TASK_TIMEOUT,
      logger: Arc::new(FacadeSink),
      hasher: ahash::RandomState::default(),
    }
  }
}

impl<K, V, H> LazyMapBuilder<K, V, H> {
  /// Supplies pre-completed pairs. Preloaded keys never invoke the loader.
  pub fn initial<I>(mut self, pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
  {
    self.initial.extend(pairs);
    self
  }

  /// Estimates how many threads will update the map concurrently; sizes
  /// the lock striping. Defaults to the number of logical CPUs.
  pub fn concurrency_level(mut self, concurrency_level: usize) -> Self {
    self.concurrency_level = concurrency_level;
    self
  }

  /// Pre-sizes the map for this many entries. Defaults to 50 000.
  pub fn capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  /// Bounds each loader invocation. A load that outlives the budget
  /// faults with [`LoadTimeout`](crate::LoadTimeout). Defaults to 30
  /// seconds.
  pub fn task_timeout(mut self, task_timeout: Duration) -> Self {
    self.task_timeout = task_timeout;
    self
  }

  /// Routes diagnostic records somewhere other than the `log` facade.
  pub fn logger(mut self, logger: Arc<dyn LogSink>) -> Self {
    self.logger = logger;
    self
  }

  /// Sets the hasher used by the map.
  pub fn with_hasher<H2>(self, hasher: H2) -> LazyMapBuilder<K, V, H2> {
    LazyMapBuilder {
      loader: self.loader,
      initial: self.initial,
      concurrency_level: self.concurrency_level,
      capacity: self.capacity,
      task_timeout: self.task_timeout,
      logger: self.logger,
      hasher,
    }
  }
}

impl<K, V, H> LazyMapBuilder<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  pub fn build(self) -> Result<LazyMap<K, V, H>, BuildError> {
    if self.concurrency_level == 0 {
      return Err(BuildError::ZeroConcurrency);
    }
    Ok(LazyMap::from_parts(
      self.concurrency_level,
      self.capacity,
      self.hasher,
      self.loader,
      self.initial,
      self.task_timeout,
      self.logger,
    ))
  }
}
