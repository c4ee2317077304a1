// src/select/group.rs

//! Slot bookkeeping for one `take_from_any` call.
//!
//! Every participating channel gets one slot awaiter pointing back at a
//! shared group state. The group moves through:
//!
//! ```text
//! LOCKED --mark_resolved--> RESOLVED      (fast pass took an item itself)
//! LOCKED --unlock---------> UNLOCKED --slot wins--> CLAIMING --> RESOLVED
//!                           UNLOCKED --cancel-----> CANCELLED
//! ```
//!
//! A slot resolved while the group is still LOCKED waits for the fast pass
//! to finish; it must not win a race the fast pass may still win itself.
//! Slots resolved in any state other than UNLOCKED hand their item back, so
//! the producer delivers it elsewhere.

use crate::async_util::AtomicWaker;
use crate::awaiter::{Awaiter, AwaiterFactory};
use crate::backoff::{Backoff, BackoffConfig};
use crate::cancel::{CancelRegistration, CancelToken};
use crate::channel::{Channel, Take};
use crate::error::Cancelled;
use crate::result::{AnyResult, TakeResult};

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

const STATE_LOCKED: u8 = 0;
const STATE_UNLOCKED: u8 = 1;
const STATE_CLAIMING: u8 = 2;
const STATE_RESOLVED: u8 = 3;
const STATE_CANCELLED: u8 = 4;

pub(crate) struct SelectorShared<T> {
  state: AtomicU8,
  // Bit `i` set once slot `i` has an awaiter queued in its channel.
  created: AtomicU32,
  result: Mutex<Option<AnyResult<T>>>,
  waker: AtomicWaker,
  backoff: BackoffConfig,
}

impl<T> fmt::Debug for SelectorShared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SelectorShared")
      .field("state", &self.state.load(Ordering::Relaxed))
      .field("created", &format_args!("{:#034b}", self.created.load(Ordering::Relaxed)))
      .finish_non_exhaustive()
  }
}

impl<T: Send + 'static> SelectorShared<T> {
  fn try_resolve(&self, index: usize, value: TakeResult<T>) -> Result<(), TakeResult<T>> {
    let mut backoff = Backoff::new(&self.backoff);
    loop {
      match self.state.load(Ordering::Acquire) {
        STATE_LOCKED => backoff.snooze(),
        STATE_UNLOCKED => {
          if self
            .state
            .compare_exchange(STATE_UNLOCKED, STATE_CLAIMING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
          {
            *self.result.lock() = Some(AnyResult::new(value, index));
            self.state.store(STATE_RESOLVED, Ordering::Release);
            self.waker.wake();
            return Ok(());
          }
        }
        _ => return Err(value),
      }
    }
  }

  /// Cancels the competition if nothing has won it yet.
  pub(crate) fn cancel(&self) -> bool {
    let cancelled = [STATE_UNLOCKED, STATE_LOCKED].into_iter().any(|from| {
      self
        .state
        .compare_exchange(from, STATE_CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    });
    if cancelled {
      tracing::debug!("take_from_any cancelled before any channel delivered");
      self.waker.wake();
    }
    cancelled
  }

  pub(crate) fn poll_result(&self, cx: &mut Context<'_>) -> Poll<Result<AnyResult<T>, Cancelled>> {
    if let Some(ready) = self.try_result() {
      return Poll::Ready(ready);
    }
    self.waker.register(cx.waker());
    match self.try_result() {
      Some(ready) => Poll::Ready(ready),
      None => Poll::Pending,
    }
  }

  fn try_result(&self) -> Option<Result<AnyResult<T>, Cancelled>> {
    match self.state.load(Ordering::Acquire) {
      STATE_RESOLVED => self.result.lock().take().map(Ok),
      STATE_CANCELLED => Some(Err(Cancelled)),
      _ => None,
    }
  }

  /// Gives the selection up from the consumer side. Returns a result that
  /// won the race but was never observed.
  pub(crate) fn abandon(&self) -> Option<AnyResult<T>> {
    let mut backoff = Backoff::new(&self.backoff);
    loop {
      if self.cancel() {
        return None;
      }
      match self.state.load(Ordering::Acquire) {
        STATE_CLAIMING => backoff.snooze(),
        STATE_RESOLVED => return self.result.lock().take(),
        _ => return None,
      }
    }
  }
}

/// The awaiter queued in one participating channel.
struct SlotAwaiter<T> {
  group: Arc<SelectorShared<T>>,
  index: usize,
}

impl<T: Send + 'static> Awaiter<TakeResult<T>> for SlotAwaiter<T> {
  fn try_set_result(&self, result: TakeResult<T>) -> Result<(), TakeResult<T>> {
    self.group.try_resolve(self.index, result)
  }
}

struct SlotAwaiterFactory<T> {
  group: Arc<SelectorShared<T>>,
  index: usize,
}

impl<T: Send + 'static> AwaiterFactory<TakeResult<T>> for SlotAwaiterFactory<T> {
  type Awaiter = SlotAwaiter<T>;
  // The aggregate future observes the group, not individual slots.
  type Handle = ();

  fn create_awaiter(self) -> (Arc<SlotAwaiter<T>>, ()) {
    self.group.created.fetch_or(1 << self.index, Ordering::AcqRel);
    let awaiter = SlotAwaiter {
      group: self.group,
      index: self.index,
    };
    (Arc::new(awaiter), ())
  }
}

/// Fan-in state for a single `take_from_any` call.
#[derive(Debug)]
pub(crate) struct Selector<T> {
  shared: Arc<SelectorShared<T>>,
}

impl<T: Send + 'static> Selector<T> {
  pub(crate) fn new(backoff: BackoffConfig) -> Self {
    Self {
      shared: Arc::new(SelectorShared {
        state: AtomicU8::new(STATE_LOCKED),
        created: AtomicU32::new(0),
        result: Mutex::new(None),
        waker: AtomicWaker::new(),
        backoff,
      }),
    }
  }

  pub(crate) fn is_awaiter_created(&self, index: usize) -> bool {
    self.shared.created.load(Ordering::Acquire) & (1 << index) != 0
  }

  /// Takes from `channel` through slot `index`. Returns the result if the
  /// channel had an item (or had ended), which resolves the selection.
  pub(crate) fn try_take_fast(&self, channel: &Channel<T>, index: usize) -> Option<AnyResult<T>> {
    if self.is_awaiter_created(index) {
      return None;
    }
    let factory = SlotAwaiterFactory {
      group: Arc::clone(&self.shared),
      index,
    };
    match channel.take_with(factory) {
      Take::Ready(value) => {
        self.mark_resolved();
        Some(AnyResult::new(value, index))
      }
      Take::Pending(()) => None,
    }
  }

  fn mark_resolved(&self) {
    let resolved = self
      .shared
      .state
      .compare_exchange(STATE_LOCKED, STATE_RESOLVED, Ordering::AcqRel, Ordering::Acquire)
      .is_ok();
    debug_assert!(resolved, "selector left LOCKED during its own fast pass");
  }

  /// Opens the competition between the queued slot awaiters and arms
  /// `cancel` on the selection.
  pub(crate) fn unlock_competition(&self, cancel: &CancelToken) -> Option<CancelRegistration> {
    if cancel.is_cancelled() {
      self.shared.cancel();
      return None;
    }
    self.shared.state.store(STATE_UNLOCKED, Ordering::Release);
    let weak = Arc::downgrade(&self.shared);
    Some(cancel.register(move || {
      if let Some(shared) = weak.upgrade() {
        shared.cancel();
      }
    }))
  }

  pub(crate) fn into_shared(self) -> Arc<SelectorShared<T>> {
    self.shared
  }
}
