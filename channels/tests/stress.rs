// tests/stress.rs
//
// Heavy interleavings; only meaningful (and only fast enough) in release.
// Run with `cargo test --release --test stress`.
#![cfg(not(debug_assertions))]

mod common;
use common::*;

use fibre_balance::{take_from_any_uncancelled, CancelToken, Channel, TakeResult};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
#[serial]
fn stress_blocking_mpmc_with_completion() {
  let channel = Channel::new();
  let num_threads = 8;
  let items_per_thread = 100_000;
  let received = Arc::new(AtomicUsize::new(0));

  let consumers: Vec<_> = (0..num_threads)
    .map(|_| {
      let channel = channel.clone();
      let received = received.clone();
      thread::spawn(move || {
        while let TakeResult::Value(_) = channel.take_blocking() {
          received.fetch_add(1, Ordering::Relaxed);
        }
      })
    })
    .collect();

  let producers: Vec<_> = (0..num_threads)
    .map(|i| {
      let channel = channel.clone();
      thread::spawn(move || {
        for j in 0..items_per_thread {
          channel.add((i, j));
          if j % 10 == 0 {
            thread::yield_now();
          }
        }
      })
    })
    .collect();

  for producer in producers {
    producer.join().unwrap();
  }
  channel.complete_adding();
  for consumer in consumers {
    consumer.join().unwrap();
  }

  assert_eq!(received.load(Ordering::Relaxed), num_threads * items_per_thread);
  assert_eq!(channel.balance(), 0);
  assert_eq!(channel.pending_consumer_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[serial]
async fn stress_cancellation_never_loses_items() {
  let channel = Channel::new();
  let total = ITEMS_HIGH * 50;

  // Consumers that keep giving up on their takes.
  let flaky: Vec<_> = (0..4)
    .map(|_| {
      let channel = channel.clone();
      tokio::spawn(async move {
        let mut kept = Vec::new();
        loop {
          let token = CancelToken::new();
          let take = channel.take_async(&token);
          token.cancel();
          match take.await {
            Ok(TakeResult::Value(item)) => kept.push(item),
            Ok(TakeResult::End) => return kept,
            Err(_) => tokio::task::yield_now().await,
          }
        }
      })
    })
    .collect();

  let steady = {
    let channel = channel.clone();
    tokio::spawn(async move {
      let mut kept = Vec::new();
      let token = CancelToken::new();
      while let Ok(TakeResult::Value(item)) = channel.take_async(&token).await {
        kept.push(item);
      }
      kept
    })
  };

  for i in 0..total {
    channel.add(i);
    if i % 32 == 0 {
      tokio::task::yield_now().await;
    }
  }
  channel.complete_adding();

  let mut seen = HashSet::new();
  for handle in flaky.into_iter().chain(std::iter::once(steady)) {
    for item in tokio::time::timeout(STRESS_TIMEOUT, handle).await.unwrap().unwrap() {
      assert!(seen.insert(item), "item {item} delivered twice");
    }
  }
  assert_eq!(seen.len(), total);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[serial]
async fn stress_take_from_any_exactly_once() {
  let channels: Vec<Channel<usize>> = (0..8).map(|_| Channel::new()).collect();
  let per_channel = ITEMS_HIGH * 10;

  let producers: Vec<_> = channels
    .iter()
    .enumerate()
    .map(|(c, channel)| {
      let channel = channel.clone();
      thread::spawn(move || {
        for i in 0..per_channel {
          channel.add(c * per_channel + i);
        }
      })
    })
    .collect();

  let selectors: Vec<_> = (0..4)
    .map(|_| {
      let channels = channels.clone();
      tokio::spawn(async move {
        let mut kept = Vec::new();
        // Each selector takes a fixed share; the rest is drained below.
        for _ in 0..per_channel {
          let won = take_from_any_uncancelled(&channels).unwrap().await.unwrap();
          if let TakeResult::Value(item) = won.value {
            kept.push(item);
          }
        }
        kept
      })
    })
    .collect();

  for producer in producers {
    producer.join().unwrap();
  }

  let mut seen = HashSet::new();
  for handle in selectors {
    for item in tokio::time::timeout(STRESS_TIMEOUT, handle).await.unwrap().unwrap() {
      assert!(seen.insert(item), "item {item} delivered twice");
    }
  }
  for channel in &channels {
    while let Some(item) = channel.try_take() {
      assert!(seen.insert(item), "item {item} delivered twice");
    }
  }
  assert_eq!(seen.len(), channels.len() * per_channel);
}
