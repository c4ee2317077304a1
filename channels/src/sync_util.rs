//! Utilities for synchronous blocking and parking.

use crate::async_util::ThreadNotify;

use std::future::Future;
use std::pin::pin;
use std::task::{Context, Poll};
use std::thread;

/// Drives `future` to completion on the current thread, parking between polls.
///
/// Only used for futures whose wakeups come from other threads (an awaiter
/// resolved by a producer), so parking cannot miss its own wakeup.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
  let notify = ThreadNotify::current();
  let waker = notify.waker();
  let mut cx = Context::from_waker(&waker);
  let mut future = pin!(future);

  loop {
    if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
      return output;
    }
    // Spurious unparks are fine, the flag is the source of truth.
    while !notify.take_notification() {
      thread::park();
    }
  }
}
