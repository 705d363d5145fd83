use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Lock-free request/miss counters, one set per cache.
#[derive(Debug, Default)]
pub(crate) struct Counters {
  requests: CachePadded<AtomicU64>,
  misses: CachePadded<AtomicU64>,
}

impl Counters {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn record_request(&self) {
    self.requests.fetch_add(1, Ordering::Relaxed);
  }

  #[inline]
  pub(crate) fn record_miss(&self) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn reset(&self) {
    self.requests.store(0, Ordering::Relaxed);
    self.misses.store(0, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the counters.
  pub(crate) fn snapshot(&self) -> CounterSnapshot {
    let requests = self.requests.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);

    CounterSnapshot {
      requests,
      misses,
      miss_ratio: if requests == 0 {
        0.0
      } else {
        misses as f64 / requests as f64
      },
    }
  }
}

/// A point-in-time, public-facing view of a cache's counters.
#[derive(Clone, Copy, PartialEq)]
pub struct CounterSnapshot {
  /// Total lookups, hits and misses alike.
  pub requests: u64,
  /// Lookups that found no live value.
  pub misses: u64,
  /// `misses / requests`, or `0.0` before the first request.
  pub miss_ratio: f64,
}

impl CounterSnapshot {
  /// Lookups that returned a live value.
  pub fn hits(&self) -> u64 {
    self.requests - self.misses
  }
}

impl fmt::Debug for CounterSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CounterSnapshot")
      .field("requests", &self.requests)
      .field("misses", &self.misses)
      .field("miss_ratio", &format!("{:.2}%", self.miss_ratio * 100.0))
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ratio_tracks_misses() {
    let counters = Counters::new();
    for _ in 0..4 {
      counters.record_request();
    }
    counters.record_miss();

    let snapshot = counters.snapshot();
    assert_eq!(snapshot.requests, 4);
    assert_eq!(snapshot.misses, 1);
    assert_eq!(snapshot.hits(), 3);
    assert!((snapshot.miss_ratio - 0.25).abs() < f64::EPSILON);
  }

  #[test]
  fn empty_ratio_is_zero() {
    assert_eq!(Counters::new().snapshot().miss_ratio, 0.0);
  }

  #[test]
  fn reset_clears_both() {
    let counters = Counters::new();
    counters.record_request();
    counters.record_miss();
    counters.reset();

    let snapshot = counters.snapshot();
    assert_eq!(snapshot.requests, 0);
    assert_eq!(snapshot.misses, 0);
  }
}
