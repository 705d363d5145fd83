use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

const WEYL_CONSTANT: u64 = 0x9E37_79B9_7F4A_7C15;

// Seeds successive threads with well-separated starting points.
static SEED: AtomicU64 = AtomicU64::new(0x243F_6A88_85A3_08D3);

thread_local! {
  // One Weyl sequence per thread. Shard assignment sits on the put hot
  // path; a single shared generator would serialize the very writers the
  // shards exist to decouple.
  static STATE: Cell<u64> = Cell::new(SEED.fetch_add(WEYL_CONSTANT, Ordering::Relaxed) | 1);
}

/// Advances the calling thread's Weyl sequence and scrambles the state.
#[inline]
fn next() -> u64 {
  STATE.with(|state| {
    let raw = state.get().wrapping_add(WEYL_CONSTANT);
    state.set(raw);
    let mut x = raw;
    x ^= x >> 32;
    x = x.wrapping_mul(0xD6E8_FEB8_6659_FD93);
    x ^= x >> 32;
    x
  })
}

/// Returns a uniformly distributed value in `[0, bound)`.
///
/// Uses the multiply-shift range reduction, so `bound` need not be a power
/// of two.
#[inline]
pub(crate) fn next_in(bound: u32) -> u32 {
  debug_assert!(bound > 0);
  (((next() as u32) as u64 * bound as u64) >> 32) as u32
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn values_stay_in_range() {
    for bound in [1u32, 2, 3, 7, 16, 1000] {
      for _ in 0..1000 {
        assert!(next_in(bound) < bound);
      }
    }
  }

  #[test]
  fn all_shards_get_picked() {
    let bound = 8u32;
    let mut seen = vec![false; bound as usize];
    for _ in 0..10_000 {
      seen[next_in(bound) as usize] = true;
    }
    assert!(seen.iter().all(|&hit| hit));
  }
}
