use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

// The single, static reference point for all expiry arithmetic in the crate.
// Initialized lazily on first use.
static CRATE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Returns the current time as nanoseconds since the crate epoch.
#[inline]
pub(crate) fn now_nanos() -> u64 {
  Instant::now().saturating_duration_since(*CRATE_EPOCH).as_nanos() as u64
}

/// Computes an absolute expiry timestamp `lifetime` from now.
///
/// `0` is the "no expiry" sentinel, so the result is clamped to at least 1.
#[inline]
pub(crate) fn expiry_after(lifetime: Duration) -> u64 {
  now_nanos().saturating_add(lifetime.as_nanos() as u64).max(1)
}
