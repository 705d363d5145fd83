#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use strand_cache::{CancelSignal, WaitCancelled};

/// A timer future for loader bodies: completes `duration` after its first
/// poll, waking through a helper thread. Runtime-agnostic, since the maps
/// under test drive loader futures themselves.
pub struct Delay {
  duration: Duration,
  started: bool,
  done: Arc<AtomicBool>,
  waker: Arc<Mutex<Option<Waker>>>,
}

impl Delay {
  pub fn new(duration: Duration) -> Self {
    Self {
      duration,
      started: false,
      done: Arc::new(AtomicBool::new(false)),
      waker: Arc::new(Mutex::new(None)),
    }
  }
}

impl Future for Delay {
  type Output = ();

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
    let this = self.get_mut();
    if this.done.load(Ordering::Acquire) {
      return Poll::Ready(());
    }
    *this.waker.lock() = Some(cx.waker().clone());
    if !this.started {
      this.started = true;
      let done = this.done.clone();
      let waker = this.waker.clone();
      let duration = this.duration;
      thread::spawn(move || {
        thread::sleep(duration);
        done.store(true, Ordering::Release);
        if let Some(waker) = waker.lock().take() {
          waker.wake();
        }
      });
    }
    Poll::Pending
  }
}

/// Resolves to `true` if `signal` fired before the delay elapsed.
pub struct DelayOrCancel {
  delay: Delay,
  cancelled: WaitCancelled,
}

impl Future for DelayOrCancel {
  type Output = bool;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<bool> {
    let this = self.get_mut();
    if let Poll::Ready(()) = Pin::new(&mut this.cancelled).poll(cx) {
      return Poll::Ready(true);
    }
    if let Poll::Ready(()) = Pin::new(&mut this.delay).poll(cx) {
      return Poll::Ready(false);
    }
    Poll::Pending
  }
}

/// A cancellation-aware sleep for cooperative test loaders.
pub fn sleep_watching(duration: Duration, signal: &CancelSignal) -> DelayOrCancel {
  DelayOrCancel {
    delay: Delay::new(duration),
    cancelled: signal.cancelled(),
  }
}
