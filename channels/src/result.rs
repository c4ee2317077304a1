// src/result.rs

//! Outcome types produced by channel takes.

use std::fmt;

/// The result of taking from a [`Channel`](crate::Channel).
///
/// Either an item, or `End` once the channel has been completed and no
/// further items can arrive. Ordering compares the tag first, so `End`
/// sorts before every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TakeResult<T> {
  /// The channel was completed; no more items will be produced.
  End,
  /// An item taken from the channel.
  Value(T),
}

impl<T> TakeResult<T> {
  /// Returns `true` if this is the end-of-channel marker.
  #[inline]
  pub fn is_end(&self) -> bool {
    matches!(self, TakeResult::End)
  }

  /// Returns `true` if this carries an item.
  #[inline]
  pub fn is_value(&self) -> bool {
    matches!(self, TakeResult::Value(_))
  }

  /// Borrows the carried item, if any.
  #[inline]
  pub fn as_value(&self) -> Option<&T> {
    match self {
      TakeResult::Value(v) => Some(v),
      TakeResult::End => None,
    }
  }

  /// Consumes the result, returning the carried item, if any.
  #[inline]
  pub fn into_value(self) -> Option<T> {
    match self {
      TakeResult::Value(v) => Some(v),
      TakeResult::End => None,
    }
  }

  /// Maps the carried item, leaving `End` untouched.
  pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> TakeResult<U> {
    match self {
      TakeResult::Value(v) => TakeResult::Value(f(v)),
      TakeResult::End => TakeResult::End,
    }
  }
}

impl<T> From<Option<T>> for TakeResult<T> {
  fn from(value: Option<T>) -> Self {
    match value {
      Some(v) => TakeResult::Value(v),
      None => TakeResult::End,
    }
  }
}

impl<T> From<TakeResult<T>> for Option<T> {
  fn from(result: TakeResult<T>) -> Self {
    result.into_value()
  }
}

/// The outcome of [`take_from_any`](crate::take_from_any): what was taken and
/// from which channel (its index in the slice passed in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyResult<T> {
  pub value: TakeResult<T>,
  pub index: usize,
}

impl<T> AnyResult<T> {
  pub(crate) fn new(value: TakeResult<T>, index: usize) -> Self {
    Self { value, index }
  }

  /// Splits the result into its value and channel index.
  pub fn into_parts(self) -> (TakeResult<T>, usize) {
    (self.value, self.index)
  }
}

impl<T: fmt::Display> fmt::Display for TakeResult<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TakeResult::End => f.write_str("End"),
      TakeResult::Value(v) => write!(f, "Value({})", v),
    }
  }
}
