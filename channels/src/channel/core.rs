// src/channel/core.rs

//! Shared state of a balanced channel and the handoff algorithm.
//!
//! `balance` is moved *before* the matching store operation. Whoever moves it
//! learns from the sign which side it has to meet:
//!
//! - a producer that pushes it above zero owns a store slot and inserts;
//! - a producer that leaves it at or below zero owes an item to a consumer
//!   and dequeues an awaiter (waiting for the consumer to finish enqueuing);
//! - a consumer that pushes it below zero enqueues an awaiter;
//! - a consumer that leaves it at or above zero owns an item and takes it
//!   from the store (waiting for the producer to finish inserting).
//!
//! Neither side holds a lock across the pair; the store and the awaiter
//! queue are only touched with `try_lock` inside backed-off retry loops.

use super::Take;
use crate::awaiter::{Awaiter, AwaiterFactory};
use crate::backoff::{Backoff, BackoffConfig};
use crate::result::TakeResult;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) type DynAwaiter<T> = Arc<dyn Awaiter<TakeResult<T>>>;

pub(crate) struct ChannelShared<T> {
  items: Mutex<VecDeque<T>>,
  awaiters: Mutex<VecDeque<DynAwaiter<T>>>,
  // > 0: items waiting for consumers, < 0: consumers waiting for items.
  balance: AtomicI64,
  completed: AtomicBool,
  pub(crate) handle_count: AtomicUsize,
  pub(crate) backoff: BackoffConfig,
}

impl<T> fmt::Debug for ChannelShared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelShared")
      .field("balance", &self.balance.load(Ordering::Relaxed))
      .field("completed", &self.completed.load(Ordering::Relaxed))
      .field("handle_count", &self.handle_count.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

/// Outcome of a single non-blocking attempt on one of the internal queues.
enum Attempt<V> {
  Done(V),
  Empty,
  Contended,
}

impl<T: Send + 'static> ChannelShared<T> {
  pub(crate) fn new(initial: VecDeque<T>, backoff: BackoffConfig) -> Self {
    let balance = initial.len() as i64;
    Self {
      items: Mutex::new(initial),
      awaiters: Mutex::new(VecDeque::new()),
      balance: AtomicI64::new(balance),
      completed: AtomicBool::new(false),
      handle_count: AtomicUsize::new(1),
      backoff,
    }
  }

  // --- Producer side ---

  pub(crate) fn add(&self, item: T) {
    if self.completed.load(Ordering::SeqCst) {
      tracing::trace!("add after completion, item dropped");
      return;
    }
    self.deliver(item);
  }

  /// Hands `item` over even if the channel has completed since. Used to put
  /// back items that were taken on behalf of a consumer that went away.
  pub(crate) fn requeue(&self, item: T) {
    self.deliver(item);
  }

  fn deliver(&self, mut item: T) {
    loop {
      match self.try_deliver(item) {
        Ok(()) => return,
        Err(returned) => {
          tracing::trace!("awaiter was cancelled before delivery, retrying add");
          item = returned;
        }
      }
    }
  }

  /// One delivery attempt. Gives the item back if the dequeued awaiter had
  /// been cancelled; the balance unit it consumed matched that dead awaiter.
  fn try_deliver(&self, item: T) -> Result<(), T> {
    let balance = self.balance.fetch_add(1, Ordering::SeqCst) + 1;

    if balance > 0 {
      // Items dominate: this item owns a store slot.
      self.push_item(item);
      return Ok(());
    }

    // A consumer is dominant, possibly still enqueuing its awaiter.
    let mut backoff = Backoff::new(&self.backoff);
    let awaiter = loop {
      match self.try_dequeue_awaiter() {
        Attempt::Done(awaiter) => break awaiter,
        Attempt::Empty if self.completed.load(Ordering::SeqCst) => {
          // Completion drained the consumer we were matched with and gave
          // its balance unit back; our unit now counts this item as stored.
          self.push_item(item);
          return Ok(());
        }
        Attempt::Empty | Attempt::Contended => backoff.snooze(),
      }
    };

    match awaiter.try_set_result(TakeResult::Value(item)) {
      Ok(()) => Ok(()),
      Err(TakeResult::Value(item)) => Err(item),
      Err(TakeResult::End) => Ok(()),
    }
  }

  fn push_item(&self, item: T) {
    let mut backoff = Backoff::new(&self.backoff);
    loop {
      if let Some(mut items) = self.items.try_lock() {
        items.push_back(item);
        return;
      }
      backoff.snooze();
    }
  }

  fn try_dequeue_awaiter(&self) -> Attempt<DynAwaiter<T>> {
    match self.awaiters.try_lock() {
      Some(mut awaiters) => match awaiters.pop_front() {
        Some(awaiter) => Attempt::Done(awaiter),
        None => Attempt::Empty,
      },
      None => Attempt::Contended,
    }
  }

  // --- Consumer side ---

  /// Takes one item, or parks an awaiter created by `factory`.
  pub(crate) fn take_with<F>(&self, factory: F) -> Take<T, F::Handle>
  where
    F: AwaiterFactory<TakeResult<T>>,
  {
    let balance = self.balance.fetch_sub(1, Ordering::SeqCst) - 1;

    if balance < 0 {
      // Consumers dominate: wait for a producer.
      let (awaiter, handle) = factory.create_awaiter();
      let queued: DynAwaiter<T> = awaiter;
      self.enqueue_awaiter(Arc::clone(&queued));

      // complete_adding() may have drained the queue just before our push.
      if self.completed.load(Ordering::SeqCst) && self.drain_awaiters(Some(&queued)) {
        return Take::Ready(TakeResult::End);
      }
      return Take::Pending(handle);
    }

    // An item is dominant, possibly still being inserted.
    match self.pop_reserved_item() {
      Some(item) => Take::Ready(TakeResult::Value(item)),
      None => Take::Ready(TakeResult::End),
    }
  }

  /// Takes an item only if one is already accounted for.
  pub(crate) fn try_take(&self) -> Option<T> {
    let mut current = self.balance.load(Ordering::SeqCst);
    loop {
      if current <= 0 {
        return None;
      }
      match self
        .balance
        .compare_exchange_weak(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
      {
        Ok(_) => return self.pop_reserved_item(),
        Err(actual) => current = actual,
      }
    }
  }

  /// Pops the item the caller's balance decrement reserved. Returns `None`
  /// only when the channel completed while the store was empty; the
  /// reservation is then handed back.
  fn pop_reserved_item(&self) -> Option<T> {
    let mut backoff = Backoff::new(&self.backoff);
    loop {
      match self.try_pop_item() {
        Attempt::Done(item) => return Some(item),
        Attempt::Empty if self.completed.load(Ordering::SeqCst) => {
          self.balance.fetch_add(1, Ordering::SeqCst);
          return None;
        }
        Attempt::Empty | Attempt::Contended => backoff.snooze(),
      }
    }
  }

  fn try_pop_item(&self) -> Attempt<T> {
    match self.items.try_lock() {
      Some(mut items) => match items.pop_front() {
        Some(item) => Attempt::Done(item),
        None => Attempt::Empty,
      },
      None => Attempt::Contended,
    }
  }

  fn enqueue_awaiter(&self, awaiter: DynAwaiter<T>) {
    let mut backoff = Backoff::new(&self.backoff);
    loop {
      if let Some(mut awaiters) = self.awaiters.try_lock() {
        awaiters.push_back(awaiter);
        return;
      }
      backoff.snooze();
    }
  }

  // --- Completion ---

  pub(crate) fn complete_adding(&self) {
    if self.completed.swap(true, Ordering::SeqCst) {
      return;
    }
    self.drain_awaiters(None);
  }

  /// Resolves every queued awaiter to `End`, returning each one's balance
  /// unit. `own` is skipped instead of resolved; returns whether it was found.
  fn drain_awaiters(&self, own: Option<&DynAwaiter<T>>) -> bool {
    let drained: Vec<DynAwaiter<T>> = self.awaiters.lock().drain(..).collect();
    if drained.is_empty() {
      return false;
    }
    tracing::debug!(awaiters = drained.len(), "channel completed, resolving pending takes to End");

    let mut found_own = false;
    for awaiter in drained {
      self.balance.fetch_add(1, Ordering::SeqCst);
      if own.is_some_and(|own| Arc::ptr_eq(own, &awaiter)) {
        found_own = true;
        continue;
      }
      // Cancelled awaiters reject End; nothing else to do for them.
      let _ = awaiter.try_set_result(TakeResult::End);
    }
    found_own
  }

  // --- Diagnostics ---

  pub(crate) fn is_completed(&self) -> bool {
    self.completed.load(Ordering::SeqCst)
  }

  pub(crate) fn balance(&self) -> i64 {
    self.balance.load(Ordering::SeqCst)
  }

  pub(crate) fn len(&self) -> usize {
    self.items.lock().len()
  }

  pub(crate) fn pending_consumer_count(&self) -> usize {
    self.awaiters.lock().len()
  }

  pub(crate) fn snapshot(&self) -> Vec<T>
  where
    T: Clone,
  {
    self.items.lock().iter().cloned().collect()
  }
}
