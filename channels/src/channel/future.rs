// src/channel/future.rs

//! Futures and streams returned by channel takes.

use super::{ChannelShared, Take};
use crate::awaiter::{CompletionAwaiterFactory, CompletionHandle};
use crate::error::Cancelled;
use crate::result::TakeResult;

use futures_core::Stream;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

enum TakeState<T> {
  Ready(TakeResult<T>),
  Cancelled,
  Waiting(CompletionHandle<TakeResult<T>>),
  Done,
}

/// Future returned by [`Channel::take_async`](crate::Channel::take_async).
///
/// Dropping it while it is still waiting cancels the take. If an item had
/// already been handed to it but was never returned from `poll`, the item is
/// put back into the channel.
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct TakeFuture<T: Send + 'static> {
  state: TakeState<T>,
  channel: Arc<ChannelShared<T>>,
}

impl<T: Send + 'static> TakeFuture<T> {
  pub(crate) fn new(take: Take<T, CompletionHandle<TakeResult<T>>>, channel: Arc<ChannelShared<T>>) -> Self {
    let state = match take {
      Take::Ready(result) => TakeState::Ready(result),
      Take::Pending(handle) => TakeState::Waiting(handle),
    };
    Self { state, channel }
  }

  pub(crate) fn cancelled(channel: Arc<ChannelShared<T>>) -> Self {
    Self {
      state: TakeState::Cancelled,
      channel,
    }
  }

  /// Returns `true` if polling would complete immediately.
  pub fn is_ready(&self) -> bool {
    match &self.state {
      TakeState::Ready(_) | TakeState::Cancelled => true,
      TakeState::Waiting(handle) => handle.awaiter.is_completed(),
      TakeState::Done => false,
    }
  }
}

// No field is structurally pinned.
impl<T: Send + 'static> Unpin for TakeFuture<T> {}

impl<T: Send + 'static> Future for TakeFuture<T> {
  type Output = Result<TakeResult<T>, Cancelled>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match mem::replace(&mut self.state, TakeState::Done) {
      TakeState::Ready(result) => Poll::Ready(Ok(result)),
      TakeState::Cancelled => Poll::Ready(Err(Cancelled)),
      TakeState::Waiting(handle) => match handle.awaiter.poll_result(cx) {
        Poll::Ready(outcome) => Poll::Ready(outcome),
        Poll::Pending => {
          self.state = TakeState::Waiting(handle);
          Poll::Pending
        }
      },
      TakeState::Done => panic!("TakeFuture polled after completion"),
    }
  }
}

impl<T: Send + 'static> Drop for TakeFuture<T> {
  fn drop(&mut self) {
    let unobserved = match mem::replace(&mut self.state, TakeState::Done) {
      TakeState::Ready(result) => result.into_value(),
      TakeState::Waiting(handle) => handle
        .awaiter
        .abandon(&self.channel.backoff)
        .and_then(TakeResult::into_value),
      TakeState::Cancelled | TakeState::Done => None,
    };
    if let Some(item) = unobserved {
      tracing::trace!("take future dropped holding an item, putting it back");
      self.channel.requeue(item);
    }
  }
}

impl<T: Send + 'static> fmt::Debug for TakeFuture<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = match &self.state {
      TakeState::Ready(_) => "Ready",
      TakeState::Cancelled => "Cancelled",
      TakeState::Waiting(_) => "Waiting",
      TakeState::Done => "Done",
    };
    f.debug_struct("TakeFuture").field("state", &state).finish_non_exhaustive()
  }
}

/// Stream of items returned by [`Channel::stream`](crate::Channel::stream).
///
/// Yields each item taken from the channel and ends at `End`.
#[must_use = "streams do nothing unless polled"]
pub struct TakeStream<T: Send + 'static> {
  channel: Arc<ChannelShared<T>>,
  pending: Option<TakeFuture<T>>,
  finished: bool,
}

impl<T: Send + 'static> TakeStream<T> {
  pub(crate) fn new(channel: Arc<ChannelShared<T>>) -> Self {
    Self {
      channel,
      pending: None,
      finished: false,
    }
  }
}

impl<T: Send + 'static> Unpin for TakeStream<T> {}

impl<T: Send + 'static> Stream for TakeStream<T> {
  type Item = T;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
    if self.finished {
      return Poll::Ready(None);
    }
    let this = &mut *self;
    let future = this.pending.get_or_insert_with(|| {
      let take = this.channel.take_with(CompletionAwaiterFactory::new(None));
      TakeFuture::new(take, Arc::clone(&this.channel))
    });

    match Pin::new(future).poll(cx) {
      Poll::Pending => Poll::Pending,
      Poll::Ready(outcome) => {
        this.pending = None;
        match outcome {
          Ok(TakeResult::Value(item)) => Poll::Ready(Some(item)),
          Ok(TakeResult::End) | Err(Cancelled) => {
            this.finished = true;
            Poll::Ready(None)
          }
        }
      }
    }
  }
}

impl<T: Send + 'static> fmt::Debug for TakeStream<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TakeStream")
      .field("pending", &self.pending.is_some())
      .field("finished", &self.finished)
      .finish()
  }
}
