// src/awaiter.rs

//! Single-assignment result cells and the factories that create them.
//!
//! A consumer that finds no item waiting parks an [`Awaiter`] in the
//! channel's queue; the producer that later dequeues it hands the item over
//! with [`Awaiter::try_set_result`]. The write succeeds at most once. Writes
//! after the first, or after the awaiter was cancelled, give the result back
//! so the producer can deliver it elsewhere.
//!
//! [`AwaiterFactory`] lets one take implementation serve both plain futures
//! ([`CompletionAwaiterFactory`], [`InstanceAwaiterFactory`]) and the slots of
//! a [`take_from_any`](crate::take_from_any) race.

use crate::async_util::AtomicWaker;
use crate::backoff::{Backoff, BackoffConfig};
use crate::cancel::{CancelRegistration, CancelToken};
use crate::error::Cancelled;

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Receives the result of exactly one take.
pub trait Awaiter<R>: Send + Sync {
  /// Attempts to complete the awaiter with `result`.
  ///
  /// Returns the result back if the awaiter was already completed or
  /// cancelled; the caller still owns it and must deliver it elsewhere.
  fn try_set_result(&self, result: R) -> Result<(), R>;
}

/// Creates the awaiter a take parks in the channel when no item is waiting.
///
/// The factory is consumed only on that path; a take that finds an item
/// completes without ever creating an awaiter.
pub trait AwaiterFactory<R> {
  /// The awaiter placed in the channel's queue.
  type Awaiter: Awaiter<R> + 'static;
  /// What the caller keeps to observe the awaiter's completion.
  type Handle;

  fn create_awaiter(self) -> (Arc<Self::Awaiter>, Self::Handle);
}

const STATE_EMPTY: u8 = 0;
const STATE_WRITING: u8 = 1;
const STATE_SET: u8 = 2;
const STATE_TAKEN: u8 = 3;
const STATE_CANCELLED: u8 = 4;

/// The plain awaiter: a result slot, a state word and the consumer's waker.
pub struct CompletionAwaiter<R> {
  state: AtomicU8,
  slot: Mutex<Option<R>>,
  waker: AtomicWaker,
}

impl<R> fmt::Debug for CompletionAwaiter<R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = match self.state.load(Ordering::Relaxed) {
      STATE_EMPTY => "Empty",
      STATE_WRITING => "Writing",
      STATE_SET => "Set",
      STATE_TAKEN => "Taken",
      STATE_CANCELLED => "Cancelled",
      _ => "Unknown",
    };
    f.debug_struct("CompletionAwaiter").field("state", &state).finish_non_exhaustive()
  }
}

impl<R> Default for CompletionAwaiter<R> {
  fn default() -> Self {
    Self::new()
  }
}

impl<R> CompletionAwaiter<R> {
  pub fn new() -> Self {
    Self {
      state: AtomicU8::new(STATE_EMPTY),
      slot: Mutex::new(None),
      waker: AtomicWaker::new(),
    }
  }

  /// Moves an empty awaiter to the cancelled state.
  ///
  /// Returns `false` if a result was already written (or is being written);
  /// the consumer will observe that result instead of the cancellation.
  pub fn cancel(&self) -> bool {
    let cancelled = self
      .state
      .compare_exchange(STATE_EMPTY, STATE_CANCELLED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok();
    if cancelled {
      self.waker.wake();
    }
    cancelled
  }

  /// True once the awaiter holds a result, handed it out, or was cancelled.
  pub fn is_completed(&self) -> bool {
    self.state.load(Ordering::Acquire) >= STATE_SET
  }

  /// True if the awaiter was cancelled before any result arrived.
  pub fn is_cancelled(&self) -> bool {
    self.state.load(Ordering::Acquire) == STATE_CANCELLED
  }

  /// Polls for the outcome. Must only be called by the single consumer that
  /// owns this awaiter's handle.
  pub fn poll_result(&self, cx: &mut Context<'_>) -> Poll<Result<R, Cancelled>> {
    if let Some(ready) = self.try_result() {
      return Poll::Ready(ready);
    }
    self.waker.register(cx.waker());
    // Re-check: the producer may have finished between the first look and
    // the waker registration.
    match self.try_result() {
      Some(ready) => Poll::Ready(ready),
      None => Poll::Pending,
    }
  }

  /// Gives the awaiter up from the consumer side: cancels it if it is still
  /// empty, otherwise waits out an in-progress write and returns the result
  /// the consumer never observed.
  pub(crate) fn abandon(&self, config: &BackoffConfig) -> Option<R> {
    let mut backoff = Backoff::new(config);
    loop {
      if self.cancel() {
        return None;
      }
      match self.state.load(Ordering::Acquire) {
        STATE_WRITING => backoff.snooze(),
        STATE_SET => return self.take_set_value(),
        _ => return None,
      }
    }
  }

  fn try_result(&self) -> Option<Result<R, Cancelled>> {
    match self.state.load(Ordering::Acquire) {
      STATE_SET => self.take_set_value().map(Ok),
      STATE_CANCELLED => Some(Err(Cancelled)),
      _ => None,
    }
  }

  fn take_set_value(&self) -> Option<R> {
    if self.state.load(Ordering::Acquire) != STATE_SET {
      return None;
    }
    let value = self.slot.lock().take();
    if value.is_some() {
      self.state.store(STATE_TAKEN, Ordering::Release);
    }
    value
  }
}

impl<R: Send> Awaiter<R> for CompletionAwaiter<R> {
  fn try_set_result(&self, result: R) -> Result<(), R> {
    if self
      .state
      .compare_exchange(STATE_EMPTY, STATE_WRITING, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return Err(result);
    }
    *self.slot.lock() = Some(result);
    let prev = self.state.swap(STATE_SET, Ordering::AcqRel);
    debug_assert_eq!(prev, STATE_WRITING, "awaiter left WRITING state while being written");
    self.waker.wake();
    Ok(())
  }
}

/// Handle of a [`CompletionAwaiter`] created by [`CompletionAwaiterFactory`].
///
/// Holding the registration keeps the cancellation callback armed; dropping
/// the handle disarms it.
#[derive(Debug)]
pub struct CompletionHandle<R> {
  pub(crate) awaiter: Arc<CompletionAwaiter<R>>,
  pub(crate) _registration: Option<CancelRegistration>,
}

impl<R> CompletionHandle<R> {
  /// The awaiter queued in the channel.
  pub fn awaiter(&self) -> &Arc<CompletionAwaiter<R>> {
    &self.awaiter
  }
}

/// Creates a fresh [`CompletionAwaiter`], optionally wired to a
/// [`CancelToken`] so that cancelling the token cancels the awaiter.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionAwaiterFactory<'a> {
  cancel: Option<&'a CancelToken>,
}

impl<'a> CompletionAwaiterFactory<'a> {
  pub fn new(cancel: Option<&'a CancelToken>) -> Self {
    Self { cancel }
  }
}

impl<'a, R: Send + 'static> AwaiterFactory<R> for CompletionAwaiterFactory<'a> {
  type Awaiter = CompletionAwaiter<R>;
  type Handle = CompletionHandle<R>;

  fn create_awaiter(self) -> (Arc<Self::Awaiter>, Self::Handle) {
    let awaiter = Arc::new(CompletionAwaiter::new());
    let registration = self.cancel.map(|token| {
      let weak = Arc::downgrade(&awaiter);
      token.register(move || {
        if let Some(awaiter) = weak.upgrade() {
          awaiter.cancel();
        }
      })
    });
    let handle = CompletionHandle {
      awaiter: Arc::clone(&awaiter),
      _registration: registration,
    };
    (awaiter, handle)
  }
}

/// Hands out an awaiter that already exists; the handle is the awaiter itself.
pub struct InstanceAwaiterFactory<A> {
  awaiter: Arc<A>,
}

impl<A> InstanceAwaiterFactory<A> {
  pub fn new(awaiter: Arc<A>) -> Self {
    Self { awaiter }
  }
}

impl<A> Clone for InstanceAwaiterFactory<A> {
  fn clone(&self) -> Self {
    Self {
      awaiter: Arc::clone(&self.awaiter),
    }
  }
}

impl<A> PartialEq for InstanceAwaiterFactory<A> {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.awaiter, &other.awaiter)
  }
}

impl<A> Eq for InstanceAwaiterFactory<A> {}

impl<A> fmt::Debug for InstanceAwaiterFactory<A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InstanceAwaiterFactory")
      .field("awaiter", &Arc::as_ptr(&self.awaiter))
      .finish()
  }
}

impl<R, A> AwaiterFactory<R> for InstanceAwaiterFactory<A>
where
  A: Awaiter<R> + 'static,
{
  type Awaiter = A;
  type Handle = Arc<A>;

  fn create_awaiter(self) -> (Arc<A>, Arc<A>) {
    (Arc::clone(&self.awaiter), self.awaiter)
  }
}
