//! Balanced unbounded channels with cancellable async and blocking takes.
//!
//! A [`Channel`] pairs producers and consumers through a single signed
//! counter: items that arrive while consumers wait are handed straight to
//! the oldest waiting consumer, otherwise they are stored. Consumers can
//! [`take_async`](Channel::take_async) with a [`CancelToken`],
//! [`take_blocking`](Channel::take_blocking) on a thread, or race several
//! channels at once with [`take_from_any`].
//!
//! Completing a channel with [`Channel::complete_adding`] wakes all waiting
//! consumers with [`TakeResult::End`]; stored items stay takeable.

pub mod awaiter;
pub mod backoff;
pub mod cancel;
pub mod channel;
pub mod error;
pub mod result;
pub mod select;

// Internal utilities
mod async_util;
mod sync_util;

pub use awaiter::{
  Awaiter, AwaiterFactory, CompletionAwaiter, CompletionAwaiterFactory, CompletionHandle, InstanceAwaiterFactory,
};
pub use backoff::BackoffConfig;
pub use cancel::{CancelRegistration, CancelToken};
pub use channel::{Channel, ChannelBuilder, Take, TakeFuture, TakeStream};
pub use error::{Cancelled, SelectError};
pub use result::{AnyResult, TakeResult};
pub use select::{take_from_any, take_from_any_uncancelled, AnyFuture, MAX_SELECT_CHANNELS};
