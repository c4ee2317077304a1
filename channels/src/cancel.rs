// src/cancel.rs

//! A cloneable cancellation signal with at-most-once callbacks.
//!
//! A [`CancelToken`] is shared by everything that should stop together.
//! Channels register a callback per pending take; the callback fires once,
//! when [`CancelToken::cancel`] is first called, or immediately if the token
//! was already cancelled at registration time.

use futures_intrusive::sync::ManualResetEvent;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

type Callback = Box<dyn FnOnce() + Send>;

struct CancelInner {
  cancelled: AtomicBool,
  event: ManualResetEvent,
  callbacks: Mutex<CallbackList>,
}

#[derive(Default)]
struct CallbackList {
  next_id: u64,
  entries: Vec<(u64, Callback)>,
}

/// Cancellation signal for [`Channel::take_async`](crate::Channel::take_async)
/// and [`take_from_any`](crate::take_from_any).
#[derive(Clone)]
pub struct CancelToken {
  inner: Arc<CancelInner>,
}

impl fmt::Debug for CancelToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CancelToken")
      .field("cancelled", &self.is_cancelled())
      .field("callbacks", &self.inner.callbacks.lock().entries.len())
      .finish()
  }
}

impl Default for CancelToken {
  fn default() -> Self {
    Self::new()
  }
}

impl CancelToken {
  /// Creates a token that is not cancelled.
  pub fn new() -> Self {
    Self {
      inner: Arc::new(CancelInner {
        cancelled: AtomicBool::new(false),
        event: ManualResetEvent::new(false),
        callbacks: Mutex::new(CallbackList::default()),
      }),
    }
  }

  /// Requests cancellation. Registered callbacks run on the calling thread,
  /// each exactly once. Calling this again has no effect.
  pub fn cancel(&self) {
    let entries = {
      let mut list = self.inner.callbacks.lock();
      if self.inner.cancelled.swap(true, Ordering::AcqRel) {
        return;
      }
      std::mem::take(&mut list.entries)
    };
    self.inner.event.set();
    tracing::trace!(callbacks = entries.len(), "cancel token fired");
    for (_, callback) in entries {
      callback();
    }
  }

  /// Returns `true` once [`cancel`](Self::cancel) has been called.
  #[inline]
  pub fn is_cancelled(&self) -> bool {
    self.inner.cancelled.load(Ordering::Acquire)
  }

  /// Registers `callback` to run when the token is cancelled.
  ///
  /// If the token is already cancelled the callback runs before this returns.
  /// Dropping the returned registration before cancellation unregisters it.
  pub fn register<F>(&self, callback: F) -> CancelRegistration
  where
    F: FnOnce() + Send + 'static,
  {
    let mut list = self.inner.callbacks.lock();
    if self.inner.cancelled.load(Ordering::Acquire) {
      drop(list);
      callback();
      return CancelRegistration::empty();
    }
    let id = list.next_id;
    list.next_id += 1;
    list.entries.push((id, Box::new(callback)));
    CancelRegistration {
      token: Arc::downgrade(&self.inner),
      id: Some(id),
    }
  }

  /// Completes once the token is cancelled.
  pub fn cancelled(&self) -> impl Future<Output = ()> + '_ {
    self.inner.event.wait()
  }
}

/// Keeps a callback registered with a [`CancelToken`]. Dropping it removes
/// the callback if it has not fired yet.
#[must_use = "dropping the registration unregisters the callback"]
pub struct CancelRegistration {
  token: Weak<CancelInner>,
  id: Option<u64>,
}

impl CancelRegistration {
  fn empty() -> Self {
    Self {
      token: Weak::new(),
      id: None,
    }
  }
}

impl fmt::Debug for CancelRegistration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CancelRegistration").field("id", &self.id).finish()
  }
}

impl Drop for CancelRegistration {
  fn drop(&mut self) {
    let (Some(id), Some(inner)) = (self.id, self.token.upgrade()) else {
      return;
    };
    let removed = {
      let mut list = inner.callbacks.lock();
      list
        .entries
        .iter()
        .position(|(entry_id, _)| *entry_id == id)
        .map(|pos| list.entries.swap_remove(pos))
    };
    // The callback may own state whose drop takes other locks; drop it
    // outside of ours.
    drop(removed);
  }
}
