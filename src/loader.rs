use crate::error::DynError;
use crate::signal::CancelSignal;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The future a deferred loader hands back.
pub type BoxLoadFuture<V> = Pin<Box<dyn Future<Output = Result<V, DynError>> + Send>>;

/// A synchronous loader, invoked on the calling thread on a cache miss.
pub(crate) type SyncLoader<K, V> = Arc<dyn Fn(&K) -> Result<V, DynError> + Send + Sync>;

/// A deferred loader. The call itself must return quickly; the heavy work
/// lives inside the returned future, which is expected to watch the
/// supplied [`CancelSignal`] cooperatively. The signal it receives is
/// never the caller's own: it is scoped to the load's internal budget.
pub(crate) type DeferredLoader<K, V> =
  Arc<dyn Fn(K, CancelSignal) -> BoxLoadFuture<V> + Send + Sync>;
