use core::fmt;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

/// A helper function to hash a key using a `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash, H: BuildHasher>(hasher: &H, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// Outcome of [`KeyIndex::insert_or_get`].
pub(crate) enum InsertOutcome<T> {
  /// The candidate won the slot.
  Inserted,
  /// The key was already present; the candidate was not stored.
  Existing(Arc<T>),
}

/// A concurrent hash map partitioned into independently locked segments.
///
/// This is the single authoritative "does K exist" structure for both
/// cache flavors. Single-key operations are linearizable: each key lives
/// in exactly one segment and every mutation of that key takes the
/// segment's write lock. A global atomic tracks the total entry count so
/// capacity checks never sum segment sizes.
pub(crate) struct KeyIndex<K, T, H> {
  segments: Box<[CachePadded<RwLock<HashMap<K, Arc<T>, H>>>]>,
  hasher: H,
  mask: usize,
  len: AtomicUsize,
}

impl<K, T, H> fmt::Debug for KeyIndex<K, T, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("KeyIndex")
      .field("num_segments", &self.segments.len())
      .field("len", &self.len())
      .finish()
  }
}

impl<K, T, H> KeyIndex<K, T, H>
where
  K: Eq + Hash,
  H: BuildHasher + Clone,
{
  /// Creates an index with at least `segments` lock stripes (rounded up to
  /// a power of two) pre-sized for `capacity` entries in total.
  pub(crate) fn new(segments: usize, capacity: usize, hasher: H) -> Self {
    let segment_count = segments.max(1).next_power_of_two();
    let per_segment = capacity / segment_count;

    let mut stripes = Vec::with_capacity(segment_count);
    for _ in 0..segment_count {
      let map = HashMap::with_capacity_and_hasher(per_segment, hasher.clone());
      stripes.push(CachePadded::new(RwLock::new(map)));
    }

    Self {
      segments: stripes.into_boxed_slice(),
      hasher,
      mask: segment_count - 1,
      len: AtomicUsize::new(0),
    }
  }

  #[inline]
  fn segment(&self, key: &K) -> &RwLock<HashMap<K, Arc<T>, H>> {
    let hash = hash_key(&self.hasher, key);
    &self.segments[hash as usize & self.mask]
  }

  pub(crate) fn get(&self, key: &K) -> Option<Arc<T>> {
    self.segment(key).read().get(key).cloned()
  }

  /// Stores `candidate` under `key` unless the key is already present.
  pub(crate) fn insert_or_get(&self, key: K, candidate: Arc<T>) -> InsertOutcome<T> {
    let mut guard = self.segment(&key).write();
    match guard.entry(key) {
      Entry::Occupied(slot) => InsertOutcome::Existing(slot.get().clone()),
      Entry::Vacant(slot) => {
        slot.insert(candidate);
        self.len.fetch_add(1, Ordering::Relaxed);
        InsertOutcome::Inserted
      }
    }
  }

  /// Returns the value for `key`, inserting the one produced by `make`
  /// when absent. The factory runs at most once, under the segment's
  /// write lock, and only when the fast-path read found nothing.
  pub(crate) fn get_or_insert_with<F>(&self, key: &K, make: F) -> Arc<T>
  where
    K: Clone,
    F: FnOnce() -> Arc<T>,
  {
    if let Some(found) = self.get(key) {
      return found;
    }

    let mut guard = self.segment(key).write();
    match guard.entry(key.clone()) {
      Entry::Occupied(slot) => slot.get().clone(),
      Entry::Vacant(slot) => {
        let made = make();
        slot.insert(made.clone());
        self.len.fetch_add(1, Ordering::Relaxed);
        made
      }
    }
  }

  /// Removes `key` only while it still maps to `expected`. Identity is
  /// pointer identity, so a slot that was concurrently replaced is left
  /// alone.
  pub(crate) fn remove_if_same(&self, key: &K, expected: &Arc<T>) -> bool {
    let mut guard = self.segment(key).write();
    match guard.get(key) {
      Some(current) if Arc::ptr_eq(current, expected) => {
        guard.remove(key);
        self.len.fetch_sub(1, Ordering::Relaxed);
        true
      }
      _ => false,
    }
  }

  /// Swaps the slot for `key` from `old` to `new`, failing when the slot
  /// no longer holds `old`. The count is unchanged either way.
  pub(crate) fn replace_if_same(&self, key: &K, old: &Arc<T>, new: Arc<T>) -> bool {
    let mut guard = self.segment(key).write();
    match guard.get_mut(key) {
      Some(current) if Arc::ptr_eq(current, old) => {
        *current = new;
        true
      }
      _ => false,
    }
  }

  /// Removes `key` unconditionally.
  pub(crate) fn remove(&self, key: &K) -> Option<Arc<T>> {
    let mut guard = self.segment(key).write();
    let removed = guard.remove(key);
    if removed.is_some() {
      self.len.fetch_sub(1, Ordering::Relaxed);
    }
    removed
  }

  /// A best-effort snapshot of the stored keys, segment by segment.
  pub(crate) fn keys(&self) -> Vec<K>
  where
    K: Clone,
  {
    let mut keys = Vec::with_capacity(self.len());
    for segment in self.segments.iter() {
      let guard = segment.read();
      keys.extend(guard.keys().cloned());
    }
    keys
  }
}

impl<K, T, H> KeyIndex<K, T, H> {
  pub(crate) fn len(&self) -> usize {
    self.len.load(Ordering::Relaxed)
  }

  /// Empties every segment. Callers that need the operation to look
  /// atomic must already hold whatever outer locks make it so.
  pub(crate) fn clear(&self) {
    for segment in self.segments.iter() {
      segment.write().clear();
    }
    self.len.store(0, Ordering::Relaxed);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ahash::RandomState;

  fn index() -> KeyIndex<u32, String, RandomState> {
    KeyIndex::new(4, 16, RandomState::new())
  }

  #[test]
  fn insert_or_get_keeps_the_first_value() {
    let index = index();
    let first = Arc::new("one".to_string());
    let second = Arc::new("two".to_string());

    assert!(matches!(
      index.insert_or_get(1, first.clone()),
      InsertOutcome::Inserted
    ));
    match index.insert_or_get(1, second) {
      InsertOutcome::Existing(found) => assert!(Arc::ptr_eq(&found, &first)),
      InsertOutcome::Inserted => panic!("second insert must observe the first"),
    }
    assert_eq!(index.len(), 1);
  }

  #[test]
  fn remove_if_same_checks_identity() {
    let index = index();
    let stored = Arc::new("stored".to_string());
    let stranger = Arc::new("stored".to_string());
    index.insert_or_get(7, stored.clone());

    assert!(!index.remove_if_same(&7, &stranger));
    assert_eq!(index.len(), 1);
    assert!(index.remove_if_same(&7, &stored));
    assert_eq!(index.len(), 0);
    assert!(index.get(&7).is_none());
  }

  #[test]
  fn replace_if_same_swaps_in_place() {
    let index = index();
    let old = Arc::new("old".to_string());
    let new = Arc::new("new".to_string());
    index.insert_or_get(3, old.clone());

    assert!(index.replace_if_same(&3, &old, new.clone()));
    assert!(Arc::ptr_eq(&index.get(&3).unwrap(), &new));
    // a second attempt against the displaced value fails
    assert!(!index.replace_if_same(&3, &old, old.clone()));
    assert_eq!(index.len(), 1);
  }

  #[test]
  fn factory_runs_only_when_vacant() {
    let index = index();
    let mut calls = 0;
    let first = index.get_or_insert_with(&9, || {
      calls += 1;
      Arc::new("fresh".to_string())
    });
    let second = index.get_or_insert_with(&9, || {
      calls += 1;
      Arc::new("unused".to_string())
    });

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls, 1);
  }

  #[test]
  fn keys_snapshot_sees_all_segments() {
    let index = index();
    for key in 0..32u32 {
      index.insert_or_get(key, Arc::new(key.to_string()));
    }
    let mut keys = index.keys();
    keys.sort_unstable();
    assert_eq!(keys, (0..32).collect::<Vec<_>>());
  }
}
