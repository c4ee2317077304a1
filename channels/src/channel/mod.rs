// src/channel/mod.rs

//! The balanced multi-producer, multi-consumer channel.
//!
//! A [`Channel`] is an unbounded item store plus a FIFO of waiting consumers,
//! coordinated by one signed counter, the *balance*. Producers never block:
//! [`Channel::add`] either stores the item or hands it straight to the oldest
//! waiting consumer. Consumers either take a stored item immediately or wait,
//! asynchronously with [`Channel::take_async`] or by blocking the thread with
//! [`Channel::take_blocking`]. Both consumer styles share the balance, so they
//! can be mixed on the same channel.
//!
//! Once [`Channel::complete_adding`] is called, further adds are dropped,
//! waiting consumers receive [`TakeResult::End`], and takes drain whatever is
//! left in the store before reporting `End`.
//!
//! # Examples
//!
//! ```
//! use fibre_balance::{CancelToken, Channel, TakeResult};
//!
//! tokio::runtime::Runtime::new().unwrap().block_on(async {
//!   let channel = Channel::new();
//!   let consumer = {
//!     let channel = channel.clone();
//!     tokio::spawn(async move { channel.take_async(&CancelToken::new()).await })
//!   };
//!
//!   channel.add(42);
//!   assert_eq!(consumer.await.unwrap(), Ok(TakeResult::Value(42)));
//!
//!   channel.complete_adding();
//!   assert_eq!(channel.take_async(&CancelToken::new()).await, Ok(TakeResult::End));
//! });
//! ```

mod core;
mod future;

pub use future::{TakeFuture, TakeStream};

pub(crate) use self::core::ChannelShared;

use crate::awaiter::{AwaiterFactory, CompletionAwaiter, CompletionAwaiterFactory, InstanceAwaiterFactory};
use crate::backoff::BackoffConfig;
use crate::cancel::CancelToken;
use crate::result::TakeResult;
use crate::sync_util;

use std::collections::VecDeque;
use std::fmt;
use std::future::poll_fn;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Outcome of [`Channel::take_with`].
#[derive(Debug)]
pub enum Take<T, H> {
  /// An item (or `End`) was available; no awaiter was created.
  Ready(TakeResult<T>),
  /// The factory's awaiter was queued; `H` observes its completion.
  Pending(H),
}

impl<T, H> Take<T, H> {
  /// Returns `true` if the take completed without queueing an awaiter.
  pub fn is_ready(&self) -> bool {
    matches!(self, Take::Ready(_))
  }
}

/// A handle to a balanced channel.
///
/// Handles are cheap to clone and all refer to the same channel. Dropping the
/// last handle completes the channel, exactly as if
/// [`complete_adding`](Self::complete_adding) had been called.
pub struct Channel<T: Send + 'static> {
  shared: Arc<ChannelShared<T>>,
}

impl<T: Send + 'static> Channel<T> {
  /// Creates an empty channel with default back-off tuning.
  pub fn new() -> Self {
    Self::builder().build()
  }

  /// Starts configuring a channel.
  pub fn builder() -> ChannelBuilder<T> {
    ChannelBuilder::new()
  }

  /// Creates a channel that already holds `items`, in iteration order.
  pub fn with_items<I: IntoIterator<Item = T>>(items: I) -> Self {
    Self::builder().items(items).build()
  }

  /// Adds an item.
  ///
  /// The item is handed to the longest-waiting live consumer, or stored if no
  /// consumer is waiting. Never blocks indefinitely. After
  /// [`complete_adding`](Self::complete_adding) the item is silently dropped.
  pub fn add(&self, item: T) {
    self.shared.add(item);
  }

  /// Takes an item asynchronously.
  ///
  /// The returned future resolves to `Ok(TakeResult::Value(_))` when an item
  /// arrives, `Ok(TakeResult::End)` once the channel is completed and empty,
  /// or `Err(Cancelled)` if `cancel` fires first. If the token is already
  /// cancelled the future is cancelled immediately and the channel is not
  /// touched.
  ///
  /// Dropping a pending future is equivalent to cancelling it.
  pub fn take_async(&self, cancel: &CancelToken) -> TakeFuture<T> {
    if cancel.is_cancelled() {
      return TakeFuture::cancelled(Arc::clone(&self.shared));
    }
    let take = self.shared.take_with(CompletionAwaiterFactory::new(Some(cancel)));
    TakeFuture::new(take, Arc::clone(&self.shared))
  }

  /// Takes an item, blocking the current thread until one is available or
  /// the channel is completed and empty.
  ///
  /// Must not be called from an async context.
  pub fn take_blocking(&self) -> TakeResult<T> {
    let awaiter = Arc::new(CompletionAwaiter::<TakeResult<T>>::new());
    match self.shared.take_with(InstanceAwaiterFactory::new(awaiter)) {
      Take::Ready(result) => result,
      Take::Pending(awaiter) => {
        // Nothing can cancel this awaiter, so the outcome is always a result.
        sync_util::block_on(poll_fn(|cx| awaiter.poll_result(cx))).unwrap_or(TakeResult::End)
      }
    }
  }

  /// Takes an item only if one is available right now.
  pub fn try_take(&self) -> Option<T> {
    self.shared.try_take()
  }

  /// Runs a take whose waiting side is provided by `factory`.
  ///
  /// This is the primitive [`take_async`](Self::take_async),
  /// [`take_blocking`](Self::take_blocking) and
  /// [`take_from_any`](crate::take_from_any) are built on. The factory is
  /// only invoked when no item is available.
  pub fn take_with<F>(&self, factory: F) -> Take<T, F::Handle>
  where
    F: AwaiterFactory<TakeResult<T>>,
  {
    self.shared.take_with(factory)
  }

  /// Returns a stream of items that ends when the channel does.
  pub fn stream(&self) -> TakeStream<T> {
    TakeStream::new(Arc::clone(&self.shared))
  }

  /// Marks the channel complete. Idempotent.
  ///
  /// Consumers waiting at the time receive `End`. Items still stored remain
  /// takeable; later adds are dropped.
  pub fn complete_adding(&self) {
    self.shared.complete_adding();
  }

  /// Returns `true` once [`complete_adding`](Self::complete_adding) was called.
  pub fn is_completed(&self) -> bool {
    self.shared.is_completed()
  }

  /// Number of queued consumer awaiters, including cancelled ones that have
  /// not been reclaimed by an add yet.
  pub fn pending_consumer_count(&self) -> usize {
    self.shared.pending_consumer_count()
  }

  /// Number of stored items.
  pub fn len(&self) -> usize {
    self.shared.len()
  }

  /// Returns `true` if no items are stored.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Current balance: stored items minus queued consumers. Exact only when
  /// no operation is in flight.
  pub fn balance(&self) -> i64 {
    self.shared.balance()
  }

  /// Copies the stored items, front first.
  pub fn snapshot(&self) -> Vec<T>
  where
    T: Clone,
  {
    self.shared.snapshot()
  }

  pub(crate) fn shared(&self) -> &Arc<ChannelShared<T>> {
    &self.shared
  }
}

impl<T: Send + 'static> Default for Channel<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Send + 'static> Clone for Channel<T> {
  fn clone(&self) -> Self {
    self.shared.handle_count.fetch_add(1, Ordering::Relaxed);
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T: Send + 'static> Drop for Channel<T> {
  fn drop(&mut self) {
    if self.shared.handle_count.fetch_sub(1, Ordering::AcqRel) == 1 {
      self.shared.complete_adding();
    }
  }
}

impl<T: Send + 'static> FromIterator<T> for Channel<T> {
  fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
    Self::with_items(iter)
  }
}

impl<T: Send + 'static> fmt::Debug for Channel<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Channel").field("shared", &self.shared).finish()
  }
}

impl<T: Send + 'static> fmt::Display for Channel<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Count = {}, Awaiters = {}", self.len(), self.pending_consumer_count())
  }
}

/// Configures and creates a [`Channel`].
pub struct ChannelBuilder<T> {
  backoff: BackoffConfig,
  items: VecDeque<T>,
}

impl<T> fmt::Debug for ChannelBuilder<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelBuilder")
      .field("backoff", &self.backoff)
      .field("items", &self.items.len())
      .finish()
  }
}

impl<T: Send + 'static> Default for ChannelBuilder<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Send + 'static> ChannelBuilder<T> {
  pub fn new() -> Self {
    Self {
      backoff: BackoffConfig::default(),
      items: VecDeque::new(),
    }
  }

  /// Sets the back-off used by the channel's internal retry loops.
  pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
    self.backoff = backoff;
    self
  }

  /// Pre-fills the channel. May be called repeatedly; items accumulate.
  pub fn items<I: IntoIterator<Item = T>>(mut self, items: I) -> Self {
    self.items.extend(items);
    self
  }

  pub fn build(self) -> Channel<T> {
    Channel {
      shared: Arc::new(ChannelShared::new(self.items, self.backoff)),
    }
  }
}
