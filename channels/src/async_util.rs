//! Utilities for asynchronous operations and wakers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Wake, Waker};
use std::thread::{self, Thread};

// Re-export AtomicWaker from futures-util for internal crate use.
pub(crate) use futures_util::task::AtomicWaker;

/// Waker that unparks a blocked thread. Lets the blocking take wait on the
/// same awaiter cell the async take uses.
#[derive(Debug)]
pub(crate) struct ThreadNotify {
  thread: Thread,
  notified: AtomicBool,
}

impl ThreadNotify {
  pub(crate) fn current() -> Arc<Self> {
    Arc::new(Self {
      thread: thread::current(),
      notified: AtomicBool::new(false),
    })
  }

  pub(crate) fn waker(self: &Arc<Self>) -> Waker {
    Waker::from(Arc::clone(self))
  }

  /// Consumes a pending notification, if any.
  pub(crate) fn take_notification(&self) -> bool {
    self.notified.swap(false, Ordering::AcqRel)
  }
}

impl Wake for ThreadNotify {
  fn wake(self: Arc<Self>) {
    self.wake_by_ref();
  }

  fn wake_by_ref(self: &Arc<Self>) {
    self.notified.store(true, Ordering::Release);
    self.thread.unpark();
  }
}
