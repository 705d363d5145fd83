use crate::counters::{CounterSnapshot, Counters};
use crate::entry::{CacheEntry, NIL};
use crate::index::{InsertOutcome, KeyIndex};
use crate::list::RecencyList;
use crate::{rng, time};

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;

/// The read/write surface shared by every cache variant.
pub trait Cache<K, V>: Send + Sync {
  /// Looks up `key`, returning the cached value if live.
  fn get(&self, key: &K) -> Option<Arc<V>>;
  /// Stores `value` under `key`, subject to the cache's put policy.
  fn put(&self, key: K, value: V);
  /// Empties the cache and zeroes its counters.
  fn reset(&self);
  /// A point-in-time view of the request/miss counters.
  fn counters(&self) -> CounterSnapshot;
}

/// One independently locked recency list.
pub(crate) struct Shard<K, V> {
  list: Mutex<RecencyList<K, V>>,
  /// Mirror of the list head, readable without the lock, so promotions of
  /// an entry that is already most-recent skip the lock entirely.
  head_hint: AtomicU32,
}

impl<K, V> Shard<K, V> {
  fn new() -> Self {
    Self {
      list: Mutex::new(RecencyList::new()),
      head_hint: AtomicU32::new(NIL),
    }
  }
}

/// A bounded, sharded, concurrently accessible LRU cache.
///
/// A single concurrent hash index answers "does K exist"; recency is
/// tracked per shard, each shard an independently locked list that an
/// entry is assigned to uniformly at random when it is created. Ordering
/// is exact within a shard and approximate across shards, which is the
/// price of not funneling every promotion through one cache-wide lock.
///
/// With an item lifetime configured the cache becomes time-aware: entries
/// carry an absolute expiry and reads treat expired entries as absent,
/// removing them on observation. No background sweeper exists.
pub struct LruCache<K, V, H = ahash::RandomState> {
  index: KeyIndex<K, CacheEntry<K, V>, H>,
  shards: Box<[CachePadded<Shard<K, V>>]>,
  capacity: usize,
  update_existing: bool,
  item_lifetime: Option<Duration>,
  counters: Counters,
}

impl<K, V, H> fmt::Debug for LruCache<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LruCache")
      .field("capacity", &self.capacity)
      .field("shards", &self.shards.len())
      .field("len", &self.index.len())
      .field("update_existing", &self.update_existing)
      .field("item_lifetime", &self.item_lifetime)
      .finish_non_exhaustive()
  }
}

impl<K, V, H> LruCache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync,
  V: Send + Sync,
  H: BuildHasher + Clone + Send + Sync,
{
  pub(crate) fn from_parts(
    capacity: usize,
    concurrency: usize,
    update_existing: bool,
    item_lifetime: Option<Duration>,
    hasher: H,
  ) -> Self {
    let mut shards = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
      shards.push(CachePadded::new(Shard::new()));
    }

    Self {
      index: KeyIndex::new(concurrency, capacity, hasher),
      shards: shards.into_boxed_slice(),
      capacity,
      update_existing,
      item_lifetime,
      counters: Counters::new(),
    }
  }

  /// Retrieves a value, promoting the entry to the front of its shard.
  ///
  /// Expired entries are removed on observation and reported as absent.
  pub fn get(&self, key: &K) -> Option<Arc<V>> {
    self.counters.record_request();

    let entry = match self.index.get(key) {
      Some(entry) => entry,
      None => {
        self.counters.record_miss();
        return None;
      }
    };

    if entry.is_expired(time::now_nanos()) {
      self.discard(&entry);
      self.counters.record_miss();
      return None;
    }

    self.promote(&entry);
    Some(entry.value())
  }

  /// Stores `value` under `key`.
  ///
  /// A colliding key either keeps its old value (the existing entry is
  /// promoted) or is replaced in place, per `update_existing`.
  pub fn put(&self, key: K, value: V) {
    self.put_shared(key, Arc::new(value));
  }

  /// The put path proper, taking a value that may already be shared with
  /// the caller (the loading variant returns the same `Arc` it inserts).
  pub(crate) fn put_shared(&self, key: K, value: Arc<V>) {
    let expires_at = match self.item_lifetime {
      Some(lifetime) => time::expiry_after(lifetime),
      None => 0,
    };
    let shard = rng::next_in(self.shards.len() as u32);
    let candidate = Arc::new(CacheEntry::new(key, value, shard, expires_at));

    loop {
      match self
        .index
        .insert_or_get(candidate.key.clone(), candidate.clone())
      {
        InsertOutcome::Inserted => {
          self.link_new(&candidate);
          if self.index.len() > self.capacity {
            self.evict_one(shard);
          }
          return;
        }
        InsertOutcome::Existing(existing) => {
          if !self.update_existing {
            self.promote(&existing);
            return;
          }
          if self.replace(&existing, &candidate) {
            self.link_new(&candidate);
            return;
          }
          // the old entry vanished mid-replace; retry against whatever
          // holds the key now
        }
      }
    }
  }

  /// Empties every shard and the index, then zeroes the counters. All
  /// shard locks are held until the structures are empty.
  pub fn reset(&self) {
    let mut guards: Vec<_> = self.shards.iter().map(|shard| shard.list.lock()).collect();
    for guard in guards.iter_mut() {
      for entry in guard.drain() {
        entry.valid.store(false, Ordering::Release);
        entry.node.store(NIL, Ordering::Release);
      }
    }
    self.index.clear();
    for shard in self.shards.iter() {
      shard.head_hint.store(NIL, Ordering::Relaxed);
    }
    self.counters.reset();
    drop(guards);
  }

  /// Number of live entries in the index.
  pub fn len(&self) -> usize {
    self.index.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn shard_count(&self) -> usize {
    self.shards.len()
  }

  pub fn counters(&self) -> CounterSnapshot {
    self.counters.snapshot()
  }

  #[inline]
  fn shard_of(&self, entry: &CacheEntry<K, V>) -> &Shard<K, V> {
    &self.shards[entry.shard as usize]
  }

  /// Links a freshly inserted entry at the head of its shard and flips it
  /// live.
  fn link_new(&self, entry: &Arc<CacheEntry<K, V>>) {
    let shard = self.shard_of(entry);
    let mut list = shard.list.lock();
    // a reset may have swept the index between our insert and this link;
    // linking anyway would strand the entry in the list
    match self.index.get(&entry.key) {
      Some(current) if Arc::ptr_eq(&current, entry) => {}
      _ => return,
    }
    let node = list.push_head(entry.clone());
    entry.node.store(node, Ordering::Release);
    entry.valid.store(true, Ordering::Release);
    shard.head_hint.store(node, Ordering::Relaxed);
  }

  /// Moves `entry` to the front of its shard. The validity and at-head
  /// predicates are checked before taking the lock and again under it;
  /// the second check is what keeps racing promotions of one entry from
  /// relinking a node that a concurrent removal already detached.
  fn promote(&self, entry: &Arc<CacheEntry<K, V>>) {
    let shard = self.shard_of(entry);
    let node = entry.node.load(Ordering::Acquire);
    if node == NIL || !entry.valid.load(Ordering::Acquire) {
      return;
    }
    if shard.head_hint.load(Ordering::Relaxed) == node {
      return;
    }

    let mut list = shard.list.lock();
    if !entry.valid.load(Ordering::Acquire) {
      return;
    }
    let node = entry.node.load(Ordering::Acquire);
    if node == NIL {
      return;
    }
    list.move_to_head(node, entry);
    shard.head_hint.store(node, Ordering::Relaxed);
  }

  /// Removes an entry observed as expired (or otherwise dead) from its
  /// shard and the index. Loses gracefully to concurrent removals.
  fn discard(&self, entry: &Arc<CacheEntry<K, V>>) -> bool {
    let shard = self.shard_of(entry);
    if !entry.valid.load(Ordering::Acquire) {
      return false;
    }

    let mut list = shard.list.lock();
    if !entry.valid.load(Ordering::Acquire) {
      return false;
    }
    entry.valid.store(false, Ordering::Release);
    let removed = self.index.remove_if_same(&entry.key, entry);
    let node = entry.node.load(Ordering::Acquire);
    if node != NIL {
      list.unlink(node, entry);
      entry.node.store(NIL, Ordering::Release);
    }
    shard.head_hint.store(list.head(), Ordering::Relaxed);
    removed
  }

  /// Swaps `old` for `new` in the index and unlinks `old` from its shard.
  /// Both entries carry the same key; only the index slot's identity is
  /// ever checked, so a concurrently removed `old` fails the swap and the
  /// caller retries.
  fn replace(&self, old: &Arc<CacheEntry<K, V>>, new: &Arc<CacheEntry<K, V>>) -> bool {
    let shard = self.shard_of(old);
    if !old.valid.load(Ordering::Acquire) {
      return false;
    }

    let mut list = shard.list.lock();
    if !old.valid.load(Ordering::Acquire) {
      return false;
    }
    if !self.index.replace_if_same(&old.key, old, new.clone()) {
      return false;
    }
    old.valid.store(false, Ordering::Release);
    let node = old.node.load(Ordering::Acquire);
    if node != NIL {
      list.unlink(node, old);
      old.node.store(NIL, Ordering::Release);
    }
    shard.head_hint.store(list.head(), Ordering::Relaxed);
    true
  }

  /// Brings the index back under capacity by dropping one entry,
  /// preferring the tail of the shard that just grew. If a concurrent
  /// replace emptied that shard, the remaining shards are walked
  /// round-robin so the bound still holds when this returns.
  fn evict_one(&self, start_shard: u32) {
    let shard_count = self.shards.len() as u32;
    for offset in 0..shard_count {
      let shard = (start_shard + offset) % shard_count;
      if self.evict_tail(shard) {
        return;
      }
    }
  }

  /// Drops the least-recently-used entry of `shard_idx`: mark it
  /// in-transit, drop it from the index, unlink it, relink the tail.
  fn evict_tail(&self, shard_idx: u32) -> bool {
    let shard = &self.shards[shard_idx as usize];
    let mut list = shard.list.lock();
    let victim = match list.tail_entry() {
      Some(victim) => victim,
      None => return false,
    };
    debug_assert!(victim.valid.load(Ordering::Acquire));

    victim.valid.store(false, Ordering::Release);
    let removed = self.index.remove_if_same(&victim.key, &victim);
    debug_assert!(removed, "a linked tail must still be indexed");
    let node = victim.node.load(Ordering::Acquire);
    if node != NIL {
      list.unlink(node, &victim);
      victim.node.store(NIL, Ordering::Release);
    }
    shard.head_hint.store(list.head(), Ordering::Relaxed);
    true
  }
}

impl<K, V, H> Cache<K, V> for LruCache<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync,
  V: Send + Sync,
  H: BuildHasher + Clone + Send + Sync,
{
  fn get(&self, key: &K) -> Option<Arc<V>> {
    LruCache::get(self, key)
  }

  fn put(&self, key: K, value: V) {
    LruCache::put(self, key, value)
  }

  fn reset(&self) {
    LruCache::reset(self)
  }

  fn counters(&self) -> CounterSnapshot {
    LruCache::counters(self)
  }
}

/// A cache that stores nothing.
///
/// Every get is a miss and every put is dropped on the floor. Useful as a
/// drop-in stand-in when caching is disabled but callers still speak the
/// [`Cache`] interface.
pub struct NoopCache<K, V> {
  counters: Counters,
  _marker: PhantomData<fn(K) -> V>,
}

impl<K, V> NoopCache<K, V> {
  pub fn new() -> Self {
    Self {
      counters: Counters::new(),
      _marker: PhantomData,
    }
  }

  pub fn get(&self, _key: &K) -> Option<Arc<V>> {
    self.counters.record_request();
    self.counters.record_miss();
    None
  }

  pub fn put(&self, _key: K, _value: V) {}

  pub fn reset(&self) {
    self.counters.reset();
  }

  pub fn counters(&self) -> CounterSnapshot {
    self.counters.snapshot()
  }
}

impl<K, V> Default for NoopCache<K, V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V> fmt::Debug for NoopCache<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NoopCache").finish_non_exhaustive()
  }
}

impl<K, V> Cache<K, V> for NoopCache<K, V>
where
  K: Send + Sync,
  V: Send + Sync,
{
  fn get(&self, key: &K) -> Option<Arc<V>> {
    NoopCache::get(self, key)
  }

  fn put(&self, key: K, value: V) {
    NoopCache::put(self, key, value)
  }

  fn reset(&self) {
    NoopCache::reset(self)
  }

  fn counters(&self) -> CounterSnapshot {
    NoopCache::counters(self)
  }
}
