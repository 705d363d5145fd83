use core::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Sentinel slot index: "not linked anywhere".
pub(crate) const NIL: u32 = u32::MAX;

/// A container for one cached value and its bookkeeping.
///
/// An entry is shared between the hash index and its shard's recency list.
/// `valid` is false while the entry is in transit (mid-insert or
/// mid-removal); in-transit entries must not be promoted or unlinked by
/// anyone but the thread that owns the transition.
pub(crate) struct CacheEntry<K, V> {
  pub(crate) key: K,
  value: Arc<V>,
  /// Index of the owning recency shard, fixed for the entry's lifetime.
  pub(crate) shard: u32,
  /// Slot in the owning shard's arena; NIL until linked. Written only
  /// under the shard lock.
  pub(crate) node: AtomicU32,
  pub(crate) valid: AtomicBool,
  /// Absolute expiry in nanoseconds since the crate epoch; 0 means none.
  pub(crate) expires_at: u64,
}

impl<K, V> CacheEntry<K, V> {
  pub(crate) fn new(key: K, value: Arc<V>, shard: u32, expires_at: u64) -> Self {
    Self {
      key,
      value,
      shard,
      node: AtomicU32::new(NIL),
      valid: AtomicBool::new(false),
      expires_at,
    }
  }

  /// Returns a clone of the `Arc` holding the value.
  #[inline]
  pub(crate) fn value(&self) -> Arc<V> {
    self.value.clone()
  }

  #[inline]
  pub(crate) fn is_expired(&self, now_nanos: u64) -> bool {
    self.expires_at != 0 && now_nanos >= self.expires_at
  }
}

impl<K, V> fmt::Debug for CacheEntry<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheEntry")
      .field("shard", &self.shard)
      .field("node", &self.node.load(Ordering::Relaxed))
      .field("valid", &self.valid.load(Ordering::Relaxed))
      .field("expires_at", &self.expires_at)
      .finish_non_exhaustive()
  }
}
