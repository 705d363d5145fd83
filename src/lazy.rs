//! The lazy loading map.
//!
//! A read-mostly map that materializes values on first access through a
//! deferred loader, with three guarantees: concurrent requests for a
//! missing key share exactly one loader invocation, a caller's wait is
//! bounded by its own cancellation signal alone, and a loader that
//! misbehaves is cut off by a per-load budget instead of leaking forever.

use crate::error::{DynError, LoadError, LoadTimeout};
use crate::index::KeyIndex;
use crate::loader::{BoxLoadFuture, DeferredLoader};
use crate::log_sink::LogSink;
use crate::signal::{CancelSignal, Waiter};

use core::fmt;
use std::collections::VecDeque;
use std::error::Error;
use std::future::Future;
use std::hash::{BuildHasher, Hash};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

type SharedResult<V> = Result<Arc<V>, Arc<dyn Error + Send + Sync + 'static>>;

enum CellState<V> {
  /// Allocated by the index factory; no loader started yet. The factory
  /// only allocates, so cells that lose an insert race are discarded
  /// without side effects.
  Unstarted,
  /// Exactly one observer claimed the cell and owns the loader task.
  Running,
  /// Terminal. The result is shared by every waiter, current and future.
  Done(SharedResult<V>),
}

struct CellInner<V> {
  state: CellState<V>,
  waiters: VecDeque<Waiter>,
}

/// A lazily started, shared slot for one key's value.
///
/// Constructing a cell does not start its computation; the first reader
/// does, exactly once per cell lifetime. Everyone else waits on the same
/// outcome.
pub(crate) struct DeferredCell<V> {
  inner: Mutex<CellInner<V>>,
}

impl<V> DeferredCell<V> {
  fn new() -> Self {
    Self {
      inner: Mutex::new(CellInner {
        state: CellState::Unstarted,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// A cell born finished, for preloaded pairs. Never invokes a loader.
  fn completed(value: V) -> Self {
    Self {
      inner: Mutex::new(CellInner {
        state: CellState::Done(Ok(Arc::new(value))),
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Flips `Unstarted` to `Running`. At most one caller ever wins.
  fn try_claim(&self) -> bool {
    let mut inner = self.inner.lock();
    match inner.state {
      CellState::Unstarted => {
        inner.state = CellState::Running;
        true
      }
      _ => false,
    }
  }

  /// Finishes the cell and wakes every waiter.
  fn complete(&self, result: SharedResult<V>) {
    let mut inner = self.inner.lock();
    inner.state = CellState::Done(result);
    for waiter in inner.waiters.drain(..) {
      waiter.wake();
    }
  }
}

/// Blocks until the cell finishes or the caller's signal fires, whichever
/// comes first. A finished cell wins a tie.
fn wait_sync<V>(cell: &DeferredCell<V>, cancel: &CancelSignal) -> Result<Arc<V>, LoadError> {
  loop {
    {
      let mut inner = cell.inner.lock();
      if let CellState::Done(result) = &inner.state {
        return result
          .clone()
          .map_err(|cause| LoadError::KeyNotFound { cause });
      }
      if cancel.is_cancelled() {
        return Err(LoadError::Cancelled);
      }
      inner.waiters.push_back(Waiter::Sync(thread::current()));
    }
    if !cancel.register(Waiter::Sync(thread::current())) {
      // fired between the check above and registration; re-check
      continue;
    }
    thread::park();
  }
}

/// Future returned by [`LazyMap::get_async`].
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct GetFuture<V> {
  cell: Arc<DeferredCell<V>>,
  cancel: CancelSignal,
}

impl<V> Future for GetFuture<V> {
  type Output = Result<Arc<V>, LoadError>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();
    {
      let mut inner = this.cell.inner.lock();
      if let CellState::Done(result) = &inner.state {
        return Poll::Ready(
          result
            .clone()
            .map_err(|cause| LoadError::KeyNotFound { cause }),
        );
      }
      if this.cancel.is_cancelled() {
        return Poll::Ready(Err(LoadError::Cancelled));
      }
      inner.waiters.push_back(Waiter::Async(cx.waker().clone()));
    }
    if !this.cancel.register(Waiter::Async(cx.waker().clone())) {
      // fired during registration; schedule an immediate re-poll
      cx.waker().wake_by_ref();
    }
    Poll::Pending
  }
}

impl<V> fmt::Debug for GetFuture<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("GetFuture").finish_non_exhaustive()
  }
}

// --- Loader task driving ---

/// Wakes the loader thread out of `park_timeout`.
struct ThreadUnparker {
  thread: Thread,
  notified: AtomicBool,
}

impl Wake for ThreadUnparker {
  fn wake(self: Arc<Self>) {
    self.wake_by_ref();
  }

  fn wake_by_ref(self: &Arc<Self>) {
    if !self.notified.swap(true, Ordering::AcqRel) {
      self.thread.unpark();
    }
  }
}

/// Polls `future` to completion on the current thread, parking between
/// polls. Returns `None` once `deadline` passes, dropping the future.
fn drive_until<V>(mut future: BoxLoadFuture<V>, deadline: Instant) -> Option<Result<V, DynError>> {
  let unparker = Arc::new(ThreadUnparker {
    thread: thread::current(),
    notified: AtomicBool::new(false),
  });
  let waker = Waker::from(unparker.clone());
  let mut cx = Context::from_waker(&waker);

  loop {
    match future.as_mut().poll(&mut cx) {
      Poll::Ready(output) => return Some(output),
      Poll::Pending => {
        let now = Instant::now();
        if now >= deadline {
          return None;
        }
        // skip the park if a wake raced ahead of us
        if !unparker.notified.swap(false, Ordering::AcqRel) {
          thread::park_timeout(deadline - now);
        }
      }
    }
  }
}

struct LazyShared<K, V, H> {
  index: KeyIndex<K, DeferredCell<V>, H>,
  loader: DeferredLoader<K, V>,
  task_timeout: Duration,
  logger: Arc<dyn LogSink>,
}

/// A concurrent, unbounded map that loads values on first access.
///
/// Lookups for a missing key allocate a [`DeferredCell`] through the
/// index's insert-if-absent, then start the loader through the cell,
/// never through the map itself. The split matters: insert-if-absent may
/// construct several speculative cells under contention, but only the one
/// that won insertion is ever claimed, so the loader runs at most once per
/// stored cell.
///
/// Two cancellation scopes exist per call. The caller's signal bounds only
/// that caller's wait; firing it abandons the wait without touching the
/// cell, and the load keeps running for whoever asks next. The per-load
/// budget (`task_timeout`) bounds the loader itself through a derived
/// signal; overrunning it faults the cell.
pub struct LazyMap<K, V, H = ahash::RandomState> {
  shared: Arc<LazyShared<K, V, H>>,
}

impl<K, V, H> LazyMap<K, V, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  pub(crate) fn from_parts(
    concurrency_level: usize,
    capacity: usize,
    hasher: H,
    loader: DeferredLoader<K, V>,
    initial: Vec<(K, V)>,
    task_timeout: Duration,
    logger: Arc<dyn LogSink>,
  ) -> Self {
    let index = KeyIndex::new(concurrency_level, capacity, hasher);
    for (key, value) in initial {
      index.insert_or_get(key, Arc::new(DeferredCell::completed(value)));
    }

    Self {
      shared: Arc::new(LazyShared {
        index,
        loader,
        task_timeout,
        logger,
      }),
    }
  }

  /// Returns the value for `key`, waiting for the in-flight load when one
  /// exists and starting one otherwise.
  ///
  /// Fails with [`LoadError::KeyNotFound`] when the loader faulted (the
  /// cell is gone by then, so the next call re-attempts) and with
  /// [`LoadError::Cancelled`] as soon as `cancel` fires, without waiting
  /// for or disturbing the loader.
  pub fn get(&self, key: &K, cancel: &CancelSignal) -> Result<Arc<V>, LoadError> {
    let cell = self.cell_for(key);
    wait_sync(&cell, cancel)
  }

  /// Like [`get`](Self::get), but flattens loader faults into `Ok(None)`.
  /// Cancellation still propagates as an error.
  pub fn try_get(&self, key: &K, cancel: &CancelSignal) -> Result<Option<Arc<V>>, LoadError> {
    match self.get(key, cancel) {
      Ok(value) => Ok(Some(value)),
      Err(LoadError::KeyNotFound { .. }) => Ok(None),
      Err(err) => Err(err),
    }
  }

  /// The non-blocking flavor of [`get`](Self::get). The returned future is
  /// runtime-agnostic and independent of `self`'s lifetime.
  pub fn get_async(&self, key: &K, cancel: &CancelSignal) -> GetFuture<V> {
    GetFuture {
      cell: self.cell_for(key),
      cancel: cancel.clone(),
    }
  }

  /// Whether a cell (pending or completed) currently exists for `key`.
  pub fn contains(&self, key: &K) -> bool {
    self.shared.index.get(key).is_some()
  }

  /// A best-effort snapshot of the stored keys, pending cells included.
  pub fn keys(&self) -> Vec<K> {
    self.shared.index.keys()
  }

  pub fn len(&self) -> usize {
    self.shared.index.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drops the cell for `key`, if any. A load already in flight keeps
  /// running; its result is simply never stored.
  pub fn remove(&self, key: &K) -> bool {
    self.shared.index.remove(key).is_some()
  }

  /// Finds or creates the cell for `key` and makes sure its load has been
  /// started by somebody.
  fn cell_for(&self, key: &K) -> Arc<DeferredCell<V>> {
    let cell = self
      .shared
      .index
      .get_or_insert_with(key, || Arc::new(DeferredCell::new()));
    if cell.try_claim() {
      Self::spawn_load(self.shared.clone(), key.clone(), cell.clone());
    }
    cell
  }

  /// Runs one claimed cell's loader on a dedicated thread, bounded by the
  /// per-load budget.
  ///
  /// On a fault (loader error, budget overrun, or spawn failure) the cell
  /// is removed from the map *before* waiters are woken, so every arrival
  /// after the wake-up re-attempts from scratch while current waiters all
  /// observe the same error.
  fn spawn_load(shared: Arc<LazyShared<K, V, H>>, key: K, cell: Arc<DeferredCell<V>>) {
    let spawned = {
      let shared = shared.clone();
      let key = key.clone();
      let cell = cell.clone();
      thread::Builder::new()
        .name("strand-cache-load".into())
        .spawn(move || {
          let budget = shared.task_timeout;
          // the loader gets its own signal, scoped to the budget; a
          // caller's signal must not be able to stop a load that other
          // callers may still want
          let load_signal = CancelSignal::new();
          let future = (shared.loader)(key.clone(), load_signal.clone());
          let deadline = Instant::now() + budget;

          let result: SharedResult<V> = match drive_until(future, deadline) {
            Some(Ok(value)) => Ok(Arc::new(value)),
            Some(Err(cause)) => Err(Arc::from(cause)),
            None => {
              load_signal.cancel();
              Err(Arc::new(LoadTimeout { budget }) as Arc<dyn Error + Send + Sync>)
            }
          };

          if result.is_err() {
            Self::remove_failed_cell(&shared, &key, &cell);
          }
          cell.complete(result);
        })
    };

    if let Err(spawn_error) = spawned {
      let cause: DynError = Box::new(spawn_error);
      Self::remove_failed_cell(&shared, &key, &cell);
      cell.complete(Err(Arc::from(cause)));
    }
  }

  fn remove_failed_cell(shared: &LazyShared<K, V, H>, key: &K, cell: &Arc<DeferredCell<V>>) {
    if !shared.index.remove_if_same(key, cell) {
      shared.logger.info(format_args!(
        "discarding a failed load, but its cell was already gone from the map"
      ));
    }
  }
}

impl<K, V, H> fmt::Debug for LazyMap<K, V, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LazyMap")
      .field("len", &self.shared.index.len())
      .field("task_timeout", &self.shared.task_timeout)
      .finish_non_exhaustive()
  }
}
