// src/select/mod.rs

//! Taking from whichever of several channels delivers first.
//!
//! [`take_from_any`] first makes a fast pass over the channels while its
//! selector is locked: channels that currently hold items are tried first,
//! then every channel in order. Each try either takes an item (which decides
//! the selection on the spot) or leaves a slot awaiter queued in that
//! channel. Only after the pass does the selector open the competition
//! between those queued slots. Exactly one channel's result is consumed;
//! every other channel keeps its items.

mod future;
mod group;

pub use future::AnyFuture;

use group::Selector;

use crate::cancel::CancelToken;
use crate::channel::{Channel, ChannelShared};
use crate::error::SelectError;

use std::sync::Arc;

/// Most channels a single [`take_from_any`] call can wait on.
pub const MAX_SELECT_CHANNELS: usize = 32;

/// Takes one item from whichever channel in `channels` delivers first.
///
/// The future resolves to an [`AnyResult`](crate::AnyResult) carrying the
/// [`TakeResult`](crate::TakeResult) and the index of the channel it came
/// from. A completed, empty channel also wins, with `End`. If `cancel` fires
/// before any channel delivers, the future resolves to
/// [`Cancelled`](crate::Cancelled).
///
/// # Errors
///
/// Fails synchronously if `channels` is empty, longer than
/// [`MAX_SELECT_CHANNELS`], or names the same channel twice.
///
/// # Examples
///
/// ```
/// use fibre_balance::{take_from_any, CancelToken, Channel, TakeResult};
///
/// tokio::runtime::Runtime::new().unwrap().block_on(async {
///   let channels = [Channel::new(), Channel::new()];
///   let any = take_from_any(&channels, &CancelToken::new()).unwrap();
///
///   channels[1].add("second");
///   let won = any.await.unwrap();
///   assert_eq!(won.index, 1);
///   assert_eq!(won.value, TakeResult::Value("second"));
/// });
/// ```
pub fn take_from_any<T: Send + 'static>(
  channels: &[Channel<T>],
  cancel: &CancelToken,
) -> Result<AnyFuture<T>, SelectError> {
  validate(channels)?;
  let shared: Vec<Arc<ChannelShared<T>>> = channels.iter().map(|channel| Arc::clone(channel.shared())).collect();

  if cancel.is_cancelled() {
    return Ok(AnyFuture::cancelled(shared));
  }

  let selector = Selector::new(channels[0].shared().backoff);

  // Channels holding items right now get the first chance.
  for (index, channel) in channels.iter().enumerate() {
    if channel.is_empty() {
      continue;
    }
    if let Some(won) = selector.try_take_fast(channel, index) {
      tracing::debug!(index, "take_from_any satisfied by a non-empty channel");
      return Ok(AnyFuture::ready(won, shared));
    }
  }
  for (index, channel) in channels.iter().enumerate() {
    if let Some(won) = selector.try_take_fast(channel, index) {
      tracing::debug!(index, "take_from_any satisfied during the second pass");
      return Ok(AnyFuture::ready(won, shared));
    }
  }

  let registration = selector.unlock_competition(cancel);
  tracing::debug!(channels = channels.len(), "take_from_any waiting on all channels");
  Ok(AnyFuture::waiting(selector.into_shared(), registration, shared))
}

/// [`take_from_any`] without a way to cancel it, short of dropping the
/// future.
pub fn take_from_any_uncancelled<T: Send + 'static>(channels: &[Channel<T>]) -> Result<AnyFuture<T>, SelectError> {
  take_from_any(channels, &CancelToken::new())
}

fn validate<T: Send + 'static>(channels: &[Channel<T>]) -> Result<(), SelectError> {
  if channels.is_empty() {
    return Err(SelectError::Empty);
  }
  if channels.len() > MAX_SELECT_CHANNELS {
    return Err(SelectError::TooManyChannels {
      count: channels.len(),
      max: MAX_SELECT_CHANNELS,
    });
  }
  // A channel listed twice would make its second slot wait on the locked
  // selector from the thread running the fast pass.
  for (second, channel) in channels.iter().enumerate() {
    if let Some(first) = channels[..second]
      .iter()
      .position(|other| Arc::ptr_eq(other.shared(), channel.shared()))
    {
      return Err(SelectError::DuplicateChannel { first, second });
    }
  }
  Ok(())
}
