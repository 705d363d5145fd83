use strand_cache::{CacheBuilder, DynError};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn loader_runs_once_then_the_cache_serves() {
  let load_count = Arc::new(AtomicUsize::new(0));

  let cache = CacheBuilder::<i32, i32>::new()
    .capacity(10)
    .build_loading({
      let load_count = load_count.clone();
      move |key: &i32| {
        load_count.fetch_add(1, Ordering::SeqCst);
        Ok(key * 10)
      }
    })
    .unwrap();

  let value = cache.get(&5).unwrap();
  assert_eq!(*value, 50);
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
  assert_eq!(cache.counters().misses, 1);

  let value = cache.get(&5).unwrap();
  assert_eq!(*value, 50);
  assert_eq!(
    load_count.load(Ordering::SeqCst),
    1,
    "second lookup must not reload"
  );
  assert_eq!(cache.counters().hits(), 1);
}

#[test]
fn warm_populates_without_later_loads() {
  let load_count = Arc::new(AtomicUsize::new(0));

  let cache = CacheBuilder::<u64, u64>::new()
    .capacity(10)
    .build_loading({
      let load_count = load_count.clone();
      move |key: &u64| {
        load_count.fetch_add(1, Ordering::SeqCst);
        Ok(key + 1)
      }
    })
    .unwrap();

  cache.warm(1..=5).unwrap();
  assert_eq!(load_count.load(Ordering::SeqCst), 5);
  assert_eq!(cache.cache().len(), 5);

  for key in 1..=5u64 {
    assert_eq!(*cache.get(&key).unwrap(), key + 1);
  }
  assert_eq!(
    load_count.load(Ordering::SeqCst),
    5,
    "warmed keys must be served from the cache"
  );
}

#[test]
fn warm_beyond_capacity_keeps_the_bound() {
  let cache = CacheBuilder::<u64, u64>::new()
    .capacity(3)
    .build_loading(|key: &u64| Ok(*key))
    .unwrap();

  cache.warm(0..10).unwrap();
  assert!(cache.cache().len() <= 3);
}

#[test]
fn loader_errors_propagate_and_are_not_cached() {
  let load_count = Arc::new(AtomicUsize::new(0));

  let cache = CacheBuilder::<u64, u64>::new()
    .capacity(10)
    .build_loading({
      let load_count = load_count.clone();
      move |key: &u64| {
        load_count.fetch_add(1, Ordering::SeqCst);
        if key % 2 == 1 {
          let err: DynError = format!("no value for {key}").into();
          Err(err)
        } else {
          Ok(key / 2)
        }
      }
    })
    .unwrap();

  let err = cache.get(&1).unwrap_err();
  assert!(err.to_string().contains("no value for 1"));
  assert_eq!(load_count.load(Ordering::SeqCst), 1);

  // failures leave nothing behind, so the next call tries again
  assert!(cache.get(&1).is_err());
  assert_eq!(load_count.load(Ordering::SeqCst), 2);
  assert_eq!(cache.cache().len(), 0);

  assert_eq!(*cache.get(&4).unwrap(), 2);
  assert_eq!(*cache.get(&4).unwrap(), 2);
  assert_eq!(load_count.load(Ordering::SeqCst), 3);
}

#[test]
fn reset_clears_loaded_state() {
  let load_count = Arc::new(AtomicUsize::new(0));
  let cache = CacheBuilder::<u64, u64>::new()
    .capacity(10)
    .build_loading({
      let load_count = load_count.clone();
      move |key: &u64| {
        load_count.fetch_add(1, Ordering::SeqCst);
        Ok(*key)
      }
    })
    .unwrap();

  cache.get(&1).unwrap();
  cache.reset();
  assert_eq!(cache.cache().len(), 0);
  assert_eq!(cache.counters().requests, 0);

  cache.get(&1).unwrap();
  assert_eq!(load_count.load(Ordering::SeqCst), 2);
}
