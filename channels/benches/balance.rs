use bench_matrix::{
  criterion_runner::{async_suite::AsyncBenchmarkSuite, sync_suite::SyncBenchmarkSuite},
  AbstractCombination, MatrixCellValue,
};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::{
  future::Future,
  pin::Pin,
  thread,
  time::{Duration, Instant},
};
use tokio::runtime::Runtime;

use fibre_balance::{CancelToken, Channel, TakeResult};

const ITEM_VALUE: u64 = 42;

#[derive(Debug, Clone)]
struct BalanceBenchConfig {
  num_consumers: usize,
  num_items: usize,
}

#[derive(Default, Debug)]
struct BenchContext {
  items_processed_total: usize,
}

struct BalanceState {
  channel: Channel<u64>,
}

fn extract_balance_config(combo: &AbstractCombination) -> Result<BalanceBenchConfig, String> {
  let num_consumers = combo.get_u64(0)? as usize;
  let num_items = (combo.get_u64(1)? as usize).max(1);
  if num_consumers == 0 {
    return Err("Skipping combination: at least one consumer is needed".to_string());
  }
  Ok(BalanceBenchConfig {
    num_consumers,
    num_items,
  })
}

// --- Sync: producer thread vs. blocking consumers ---

fn setup_fn_sync(_cfg: &BalanceBenchConfig) -> Result<(BenchContext, BalanceState), String> {
  Ok((
    BenchContext::default(),
    BalanceState {
      channel: Channel::new(),
    },
  ))
}

fn benchmark_logic_sync(
  mut ctx: BenchContext,
  state: BalanceState,
  cfg: &BalanceBenchConfig,
) -> (BenchContext, BalanceState, Duration) {
  // Each iteration gets its own channel since completion is terminal.
  let channel = Channel::new();
  let start_time = Instant::now();
  let consumers: Vec<_> = (0..cfg.num_consumers)
    .map(|_| {
      let channel = channel.clone();
      thread::spawn(move || {
        let mut taken = 0usize;
        while let TakeResult::Value(_) = channel.take_blocking() {
          taken += 1;
        }
        taken
      })
    })
    .collect();

  for _ in 0..cfg.num_items {
    channel.add(ITEM_VALUE);
  }
  channel.complete_adding();
  let taken: usize = consumers.into_iter().map(|h| h.join().unwrap()).sum();
  let duration = start_time.elapsed();
  assert_eq!(taken, cfg.num_items);

  ctx.items_processed_total += cfg.num_items;
  (ctx, state, duration)
}

fn teardown_sync(_ctx: BenchContext, _state: BalanceState, _cfg: &BalanceBenchConfig) {}

// --- Async: add/take ping-pong through a prefilled balance ---

fn setup_fn_async(
  _runtime: &Runtime,
  _cfg: &BalanceBenchConfig,
) -> Pin<Box<dyn Future<Output = Result<(BenchContext, BalanceState), String>> + Send>> {
  Box::pin(async move {
    Ok((
      BenchContext::default(),
      BalanceState {
        channel: Channel::new(),
      },
    ))
  })
}

fn benchmark_logic_async(
  mut ctx: BenchContext,
  state: BalanceState,
  cfg: &BalanceBenchConfig,
) -> Pin<Box<dyn Future<Output = (BenchContext, BalanceState, Duration)> + Send>> {
  let cfg_clone = cfg.clone();
  Box::pin(async move {
    let token = CancelToken::new();
    let start_time = Instant::now();

    let mut consumers = Vec::with_capacity(cfg_clone.num_consumers);
    for _ in 0..cfg_clone.num_consumers {
      let channel = state.channel.clone();
      let token = token.clone();
      let quota = cfg_clone.num_items / cfg_clone.num_consumers;
      consumers.push(tokio::spawn(async move {
        for _ in 0..quota {
          let _ = channel.take_async(&token).await.unwrap();
        }
      }));
    }
    let total = (cfg_clone.num_items / cfg_clone.num_consumers) * cfg_clone.num_consumers;
    for _ in 0..total {
      state.channel.add(ITEM_VALUE);
    }
    for consumer in consumers {
      consumer.await.unwrap();
    }

    let duration = start_time.elapsed();
    ctx.items_processed_total += total;
    (ctx, state, duration)
  })
}

fn teardown_async(
  _ctx: BenchContext,
  _state: BalanceState,
  _runtime: &Runtime,
  _cfg: &BalanceBenchConfig,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
  Box::pin(async move {})
}

// Suites
fn balance_sync_benches(c: &mut Criterion) {
  let parameter_axes = vec![
    vec![
      MatrixCellValue::Unsigned(1),
      MatrixCellValue::Unsigned(4),
    ], // Consumers
    vec![
      MatrixCellValue::Unsigned(10_000),
      MatrixCellValue::Unsigned(100_000),
    ], // NumItems
  ];
  let parameter_names = vec!["Consumers".to_string(), "Items".to_string()];

  SyncBenchmarkSuite::new(
    c,
    "BalanceSync".to_string(),
    Some(parameter_names),
    parameter_axes,
    Box::new(extract_balance_config),
    setup_fn_sync,
    benchmark_logic_sync,
    teardown_sync,
  )
  .throughput(|cfg: &BalanceBenchConfig| Throughput::Elements(cfg.num_items as u64))
  .run();
}

fn balance_async_benches(c: &mut Criterion) {
  let rt = Runtime::new().unwrap();
  let parameter_axes = vec![
    vec![
      MatrixCellValue::Unsigned(1),
      MatrixCellValue::Unsigned(4),
      MatrixCellValue::Unsigned(16),
    ], // Consumers
    vec![
      MatrixCellValue::Unsigned(10_000),
      MatrixCellValue::Unsigned(100_000),
    ], // NumItems
  ];
  let parameter_names = vec!["Consumers".to_string(), "Items".to_string()];

  AsyncBenchmarkSuite::new(
    c,
    &rt,
    "BalanceAsync".to_string(),
    Some(parameter_names),
    parameter_axes,
    Box::new(extract_balance_config),
    setup_fn_async,
    benchmark_logic_async,
    teardown_async,
  )
  .throughput(|cfg: &BalanceBenchConfig| Throughput::Elements(cfg.num_items as u64))
  .run();
}

criterion_group!(benches, balance_sync_benches, balance_async_benches);
criterion_main!(benches);
