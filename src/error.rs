use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Type-erased error produced by user-supplied loaders.
pub type DynError = Box<dyn Error + Send + Sync + 'static>;

/// Errors that can occur when building a cache or a lazy map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
  /// The cache was configured with a capacity of zero. Every cache in this
  /// crate is bounded; a positive capacity is required.
  ZeroCapacity,
  /// The shard count / concurrency level was zero.
  ZeroConcurrency,
  /// An item lifetime of zero was supplied; expiry needs a positive
  /// duration.
  ZeroItemLifetime,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroCapacity => write!(f, "cache capacity cannot be zero"),
      BuildError::ZeroConcurrency => write!(f, "concurrency level cannot be zero"),
      BuildError::ZeroItemLifetime => write!(f, "item lifetime cannot be zero"),
    }
  }
}

impl Error for BuildError {}

/// Errors surfaced by [`LazyMap`](crate::LazyMap) lookups.
#[derive(Debug, Clone)]
pub enum LoadError {
  /// The loader's computation faulted. The failed cell has already been
  /// dropped from the map, so the next lookup re-attempts the load.
  ///
  /// The cause is shared: every caller waiting on the same failed load
  /// observes the same underlying error.
  KeyNotFound {
    cause: Arc<dyn Error + Send + Sync + 'static>,
  },
  /// The caller's cancellation signal fired before a value was produced.
  /// The pending load, if any, keeps running for later callers.
  Cancelled,
}

impl LoadError {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, LoadError::Cancelled)
  }

  pub fn is_key_not_found(&self) -> bool {
    matches!(self, LoadError::KeyNotFound { .. })
  }
}

impl fmt::Display for LoadError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      LoadError::KeyNotFound { cause } => write!(f, "key not found: {}", cause),
      LoadError::Cancelled => write!(f, "wait cancelled by caller"),
    }
  }
}

impl Error for LoadError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      LoadError::KeyNotFound { cause } => Some(cause.as_ref()),
      LoadError::Cancelled => None,
    }
  }
}

/// The error installed as the [`LoadError::KeyNotFound`] cause when a
/// loader overruns its per-task budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTimeout {
  /// The budget the loader failed to meet.
  pub budget: Duration,
}

impl fmt::Display for LoadTimeout {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "loader did not complete within {:?}", self.budget)
  }
}

impl Error for LoadTimeout {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_not_found_exposes_cause() {
    let cause: DynError = "backing store offline".into();
    let err = LoadError::KeyNotFound { cause: Arc::from(cause) };

    assert!(err.is_key_not_found());
    assert!(err.source().is_some());
    assert!(err.to_string().contains("backing store offline"));
  }

  #[test]
  fn timeout_names_the_budget() {
    let err = LoadTimeout { budget: Duration::from_secs(30) };
    assert!(err.to_string().contains("30s"));
  }
}
