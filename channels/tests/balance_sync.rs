// tests/balance_sync.rs

mod common;
use common::*;

use fibre_balance::{CancelToken, Channel, CompletionAwaiterFactory, Take, TakeResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn sync_take_blocking_smoke() {
  let channel = Channel::new();
  channel.add(10);
  assert_eq!(channel.take_blocking(), TakeResult::Value(10));
}

#[test]
fn sync_take_blocking_waits() {
  let channel = Channel::new();
  let producer = {
    let channel = channel.clone();
    thread::spawn(move || {
      thread::sleep(SHORT_TIMEOUT / 5);
      channel.add("hello");
    })
  };
  assert_eq!(channel.take_blocking(), TakeResult::Value("hello"));
  producer.join().unwrap();
}

#[test]
fn sync_dropping_last_handle_ends_pending_take() {
  let channel = Channel::<u32>::new();
  let pending = channel.take_with(CompletionAwaiterFactory::new(None));
  let Take::Pending(handle) = pending else {
    panic!("empty channel should queue the awaiter");
  };
  assert!(!handle.awaiter().is_completed());

  drop(channel);
  assert!(handle.awaiter().is_completed());
  assert!(!handle.awaiter().is_cancelled());
}

#[test]
fn sync_mixed_blocking_and_async_consumers() {
  let channel = Channel::new();
  let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();

  let blocking = {
    let channel = channel.clone();
    thread::spawn(move || channel.take_blocking())
  };
  let async_take = channel.take_async(&CancelToken::new());

  // Wait until both consumers are queued.
  while channel.pending_consumer_count() < 2 {
    thread::yield_now();
  }
  assert_eq!(channel.balance(), -2);

  channel.add(1);
  channel.add(2);

  let from_thread = blocking.join().unwrap();
  let from_async = runtime.block_on(async_take).unwrap();
  let mut got = vec![from_thread, from_async];
  got.sort();
  assert_eq!(got, vec![TakeResult::Value(1), TakeResult::Value(2)]);
  assert_eq!(channel.balance(), 0);
}

#[test]
fn sync_mpmc_threads() {
  let channel = Channel::new();
  let producers = 4;
  let consumers = 4;
  let per_producer = ITEMS_HIGH;
  let received = Arc::new(AtomicUsize::new(0));
  let sum = Arc::new(AtomicUsize::new(0));
  let barrier = Arc::new(Barrier::new(producers + consumers));

  let mut consumer_handles = Vec::new();
  for _ in 0..consumers {
    let channel = channel.clone();
    let received = received.clone();
    let sum = sum.clone();
    let barrier = barrier.clone();
    consumer_handles.push(thread::spawn(move || {
      barrier.wait();
      while let TakeResult::Value(item) = channel.take_blocking() {
        received.fetch_add(1, Ordering::Relaxed);
        sum.fetch_add(item, Ordering::Relaxed);
      }
    }));
  }

  let mut producer_handles = Vec::new();
  for p in 0..producers {
    let channel = channel.clone();
    let barrier = barrier.clone();
    producer_handles.push(thread::spawn(move || {
      barrier.wait();
      for i in 0..per_producer {
        channel.add(p * per_producer + i);
      }
    }));
  }

  for handle in producer_handles {
    handle.join().unwrap();
  }
  channel.complete_adding();
  for handle in consumer_handles {
    handle.join().unwrap();
  }

  let total = producers * per_producer;
  assert_eq!(received.load(Ordering::Relaxed), total);
  assert_eq!(sum.load(Ordering::Relaxed), total * (total - 1) / 2);
  assert_eq!(channel.balance(), 0);
  assert_eq!(channel.len(), 0);
}

#[test]
fn sync_balance_matches_store_and_queue_when_quiescent() {
  let channel = Channel::new();
  for i in 0..ITEMS_LOW {
    channel.add(i);
  }
  for _ in 0..ITEMS_LOW / 2 {
    channel.try_take().unwrap();
  }
  assert_eq!(channel.balance(), (ITEMS_LOW / 2) as i64);
  assert_eq!(channel.len(), ITEMS_LOW / 2);

  channel.complete_adding();
  let mut drained = 0;
  while let TakeResult::Value(_) = channel.take_blocking() {
    drained += 1;
  }
  assert_eq!(drained, ITEMS_LOW / 2);
  assert_eq!(channel.balance(), 0);
}
