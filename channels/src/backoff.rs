// src/backoff.rs

//! Bounded exponential back-off for the channel's cooperative retry loops.

use std::thread;
use std::time::Duration;

/// Tuning for the retry loops a channel runs while the other side of a
/// handoff catches up (an item being inserted, an awaiter being enqueued).
///
/// Each wait step goes through three phases: exponential spinning, yielding
/// the thread, then parking it for `park_timeout` at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
  /// Number of spin steps; step `n` spins `2^n` times.
  pub spin_limit: u32,
  /// Step at which yielding stops and timed parking begins.
  pub yield_limit: u32,
  /// How long a single park lasts once yielding is exhausted.
  pub park_timeout: Duration,
}

impl BackoffConfig {
  pub const DEFAULT_SPIN_LIMIT: u32 = 6;
  pub const DEFAULT_YIELD_LIMIT: u32 = 10;
  pub const DEFAULT_PARK_TIMEOUT: Duration = Duration::from_micros(50);

  /// Sets the number of exponential spin steps.
  pub fn spin_limit(mut self, spin_limit: u32) -> Self {
    self.spin_limit = spin_limit;
    self
  }

  /// Sets the step at which the loop starts parking.
  pub fn yield_limit(mut self, yield_limit: u32) -> Self {
    self.yield_limit = yield_limit;
    self
  }

  /// Sets the duration of a single park.
  pub fn park_timeout(mut self, park_timeout: Duration) -> Self {
    self.park_timeout = park_timeout;
    self
  }
}

impl Default for BackoffConfig {
  fn default() -> Self {
    Self {
      spin_limit: Self::DEFAULT_SPIN_LIMIT,
      yield_limit: Self::DEFAULT_YIELD_LIMIT,
      park_timeout: Self::DEFAULT_PARK_TIMEOUT,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
  Spin,
  Yield,
  Park,
}

/// A single retry loop's back-off state.
#[derive(Debug)]
pub(crate) struct Backoff<'a> {
  config: &'a BackoffConfig,
  step: u32,
}

impl<'a> Backoff<'a> {
  pub(crate) fn new(config: &'a BackoffConfig) -> Self {
    Self { config, step: 0 }
  }

  // Spinning never outlasts `yield_limit`, whatever `spin_limit` says.
  fn phase(&self) -> Phase {
    let spin_end = self.config.spin_limit.min(self.config.yield_limit);
    if self.step < spin_end {
      Phase::Spin
    } else if self.step < self.config.yield_limit {
      Phase::Yield
    } else {
      Phase::Park
    }
  }

  /// Waits a little longer than last time.
  pub(crate) fn snooze(&mut self) {
    match self.phase() {
      Phase::Spin => {
        for _ in 0..(1u32 << self.step.min(16)) {
          std::hint::spin_loop();
        }
      }
      Phase::Yield => thread::yield_now(),
      Phase::Park => {
        if self.step == self.config.yield_limit {
          tracing::trace!(step = self.step, "handoff still pending, backing off to timed parks");
        }
        thread::park_timeout(self.config.park_timeout);
      }
    }
    if self.step <= self.config.yield_limit {
      self.step += 1;
    }
  }

  /// True once the loop has moved past spinning and yielding.
  #[cfg(test)]
  pub(crate) fn is_parking(&self) -> bool {
    self.phase() == Phase::Park
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Instant;

  #[test]
  fn snooze_escalates_to_parking() {
    let config = BackoffConfig::default().spin_limit(2).yield_limit(4);
    let mut backoff = Backoff::new(&config);
    for _ in 0..4 {
      assert!(!backoff.is_parking());
      backoff.snooze();
    }
    backoff.snooze();
    assert!(backoff.is_parking());
  }

  #[test]
  fn spin_limit_above_yield_limit_still_parks() {
    let config = BackoffConfig::default()
      .spin_limit(20)
      .yield_limit(2)
      .park_timeout(Duration::from_micros(10));
    let mut backoff = Backoff::new(&config);
    let mut phases = Vec::new();
    for _ in 0..10 {
      phases.push(backoff.phase());
      backoff.snooze();
    }
    assert_eq!(&phases[..2], &[Phase::Spin, Phase::Spin]);
    assert!(phases[2..].iter().all(|phase| *phase == Phase::Park));
    assert!(backoff.is_parking());
  }

  #[test]
  fn parking_is_bounded_by_timeout() {
    let config = BackoffConfig::default()
      .spin_limit(0)
      .yield_limit(0)
      .park_timeout(Duration::from_millis(1));
    let mut backoff = Backoff::new(&config);
    let start = Instant::now();
    for _ in 0..5 {
      backoff.snooze();
    }
    assert!(start.elapsed() < Duration::from_secs(1));
  }
}
