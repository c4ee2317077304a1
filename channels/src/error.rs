// src/error.rs

use thiserror::Error;

/// Returned by a take or select future whose operation was cancelled before
/// an item was delivered to it.
///
/// Cancellation is a terminal outcome, not a failure of the channel. An item
/// that races with the cancellation is never lost: it is either delivered to
/// the cancelled consumer (the future then resolves with it) or handed to
/// another consumer / kept in the channel.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[error("take operation was cancelled")]
pub struct Cancelled;

/// Caller errors reported synchronously by [`take_from_any`](crate::take_from_any).
///
/// None of these are retried; they indicate a misuse of the API.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum SelectError {
  /// The channel list was empty.
  #[error("take_from_any needs at least one channel")]
  Empty,
  /// More channels were supplied than a selector has slots for.
  #[error("take_from_any supports at most {max} channels, got {count}")]
  TooManyChannels { count: usize, max: usize },
  /// The same channel appears twice in the list.
  #[error("channel at index {second} is the same channel as index {first}")]
  DuplicateChannel { first: usize, second: usize },
}
