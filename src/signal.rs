use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::Thread;

use parking_lot::Mutex;

/// A party parked on a signal or a pending load.
pub(crate) enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  pub(crate) fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

struct SignalInner {
  fired: AtomicBool,
  waiters: Mutex<Vec<Waiter>>,
}

/// A cloneable, fire-once cancellation signal.
///
/// Clones share state: cancelling any clone cancels them all. A signal
/// scopes one concern only, so a caller's wait and a loader's internal
/// budget always use distinct signals.
#[derive(Clone)]
pub struct CancelSignal {
  inner: Arc<SignalInner>,
}

impl CancelSignal {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(SignalInner {
        fired: AtomicBool::new(false),
        waiters: Mutex::new(Vec::new()),
      }),
    }
  }

  /// Fires the signal, waking every registered waiter. Idempotent.
  pub fn cancel(&self) {
    if self.inner.fired.swap(true, Ordering::AcqRel) {
      return;
    }
    let mut waiters = self.inner.waiters.lock();
    for waiter in waiters.drain(..) {
      waiter.wake();
    }
  }

  #[inline]
  pub fn is_cancelled(&self) -> bool {
    self.inner.fired.load(Ordering::Acquire)
  }

  /// Registers a waiter to be woken when the signal fires. Returns `false`
  /// (dropping the waiter) when the signal already fired, in which case
  /// the caller must re-check its exit conditions instead of parking.
  pub(crate) fn register(&self, waiter: Waiter) -> bool {
    if self.is_cancelled() {
      return false;
    }
    let mut waiters = self.inner.waiters.lock();
    // cancel() drains under this lock, so the flag is stable here
    if self.inner.fired.load(Ordering::Acquire) {
      return false;
    }
    waiters.push(waiter);
    true
  }

  /// A future that resolves once the signal fires. Lets cooperative
  /// loaders race their work against cancellation.
  pub fn cancelled(&self) -> WaitCancelled {
    WaitCancelled {
      signal: self.clone(),
    }
  }
}

impl Default for CancelSignal {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for CancelSignal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CancelSignal")
      .field("fired", &self.is_cancelled())
      .finish()
  }
}

/// Future returned by [`CancelSignal::cancelled`].
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct WaitCancelled {
  signal: CancelSignal,
}

impl Future for WaitCancelled {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    if self.signal.is_cancelled() {
      return Poll::Ready(());
    }
    if !self.signal.register(Waiter::Async(cx.waker().clone())) {
      return Poll::Ready(());
    }
    Poll::Pending
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::thread;
  use std::time::Duration;

  #[test]
  fn cancel_is_visible_to_clones() {
    let signal = CancelSignal::new();
    let clone = signal.clone();
    assert!(!clone.is_cancelled());
    signal.cancel();
    assert!(clone.is_cancelled());
  }

  #[test]
  fn cancel_unparks_a_waiting_thread() {
    let signal = CancelSignal::new();
    let waiting = {
      let signal = signal.clone();
      thread::spawn(move || {
        while !signal.is_cancelled() {
          if signal.register(Waiter::Sync(thread::current())) {
            thread::park();
          }
        }
      })
    };

    thread::sleep(Duration::from_millis(20));
    signal.cancel();
    waiting.join().unwrap();
  }

  #[test]
  fn late_registration_reports_fired() {
    let signal = CancelSignal::new();
    signal.cancel();
    assert!(!signal.register(Waiter::Sync(thread::current())));
  }
}
