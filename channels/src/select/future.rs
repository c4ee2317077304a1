// src/select/future.rs

use super::group::SelectorShared;
use crate::cancel::CancelRegistration;
use crate::channel::ChannelShared;
use crate::error::Cancelled;
use crate::result::AnyResult;

use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

enum AnyState<T> {
  Ready(AnyResult<T>),
  Cancelled,
  Waiting {
    selector: Arc<SelectorShared<T>>,
    // Held only to keep the cancel callback armed.
    _registration: Option<CancelRegistration>,
  },
  Done,
}

/// Future returned by [`take_from_any`](crate::take_from_any).
///
/// Resolves with the first result delivered by any of the channels, tagged
/// with that channel's index. Dropping it while waiting cancels the
/// selection; an item that had already won but was never observed goes back
/// to the channel it came from.
#[must_use = "futures do nothing unless you .await or poll them"]
pub struct AnyFuture<T: Send + 'static> {
  state: AnyState<T>,
  channels: Vec<Arc<ChannelShared<T>>>,
}

impl<T: Send + 'static> AnyFuture<T> {
  pub(crate) fn ready(result: AnyResult<T>, channels: Vec<Arc<ChannelShared<T>>>) -> Self {
    Self {
      state: AnyState::Ready(result),
      channels,
    }
  }

  pub(crate) fn cancelled(channels: Vec<Arc<ChannelShared<T>>>) -> Self {
    Self {
      state: AnyState::Cancelled,
      channels,
    }
  }

  pub(crate) fn waiting(
    selector: Arc<SelectorShared<T>>,
    registration: Option<CancelRegistration>,
    channels: Vec<Arc<ChannelShared<T>>>,
  ) -> Self {
    Self {
      state: AnyState::Waiting {
        selector,
        _registration: registration,
      },
      channels,
    }
  }

  /// Returns `true` if a channel was ready during the call itself.
  pub fn is_ready(&self) -> bool {
    matches!(self.state, AnyState::Ready(_) | AnyState::Cancelled)
  }
}

impl<T: Send + 'static> Unpin for AnyFuture<T> {}

impl<T: Send + 'static> Future for AnyFuture<T> {
  type Output = Result<AnyResult<T>, Cancelled>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match mem::replace(&mut self.state, AnyState::Done) {
      AnyState::Ready(result) => Poll::Ready(Ok(result)),
      AnyState::Cancelled => Poll::Ready(Err(Cancelled)),
      AnyState::Waiting {
        selector,
        _registration,
      } => match selector.poll_result(cx) {
        Poll::Ready(outcome) => Poll::Ready(outcome),
        Poll::Pending => {
          self.state = AnyState::Waiting {
            selector,
            _registration,
          };
          Poll::Pending
        }
      },
      AnyState::Done => panic!("AnyFuture polled after completion"),
    }
  }
}

impl<T: Send + 'static> Drop for AnyFuture<T> {
  fn drop(&mut self) {
    let unobserved = match mem::replace(&mut self.state, AnyState::Done) {
      AnyState::Ready(result) => Some(result),
      AnyState::Waiting { selector, .. } => selector.abandon(),
      AnyState::Cancelled | AnyState::Done => None,
    };
    let Some(AnyResult { value, index }) = unobserved else {
      return;
    };
    if let Some(item) = value.into_value() {
      tracing::trace!(index, "take_from_any dropped holding an item, putting it back");
      if let Some(channel) = self.channels.get(index) {
        channel.requeue(item);
      }
    }
  }
}

impl<T: Send + 'static> fmt::Debug for AnyFuture<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = match &self.state {
      AnyState::Ready(_) => "Ready",
      AnyState::Cancelled => "Cancelled",
      AnyState::Waiting { .. } => "Waiting",
      AnyState::Done => "Done",
    };
    f.debug_struct("AnyFuture")
      .field("state", &state)
      .field("channels", &self.channels.len())
      .finish()
  }
}
