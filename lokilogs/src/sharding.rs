use std::time::{Duration, Instant};
use log::debug;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

/// Throughput a single shard is assumed to sustain downstream, 1 MiB/s.
pub const BYTES_PER_SHARD: f64 = 1048576.0;

/// Sliding window estimate of bytes per second.
///
/// The published rate only changes when a window closes, in between
/// `rate()` returns the value of the last closed window (0 before the first).
#[derive(Debug, Clone)]
pub struct RateTracker {
    window: Duration,
    start: Instant,
    total: u64,
    rate: f64,
}

impl RateTracker {

    pub fn new(window: Duration) -> Self {
        Self::new_at(window, Instant::now())
    }

    pub fn new_at(window: Duration, start: Instant) -> Self {
        Self {
            window: window,
            start: start,
            total: 0,
            rate: 0.0,
        }
    }

    pub fn update(&mut self, bytes: u64) {
        self.update_at(bytes, Instant::now())
    }

    pub fn update_at(&mut self, bytes: u64, now: Instant) {
        self.total += bytes;
        let elapsed = now.saturating_duration_since(self.start);
        if elapsed >= self.window {
            self.rate = self.total as f64 / elapsed.as_secs_f64();
            self.start = now;
            self.total = 0;
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Turns the observed rate into a shard count and spreads work across shards.
#[derive(Debug, Clone)]
pub struct StreamSharding {
    tracker: RateTracker,
    desired_rate: f64,
    shards: i64,
    rng: StdRng,
}

impl StreamSharding {

    /// `desired_rate` is in MB/s per shard and must be positive.
    pub fn new(desired_rate: f64, window: Duration) -> Self {
        Self::with_tracker(desired_rate, RateTracker::new(window))
    }

    pub fn with_tracker(desired_rate: f64, tracker: RateTracker) -> Self {
        debug_assert!(desired_rate > 0.0, "desired rate must be positive");
        Self {
            tracker: tracker,
            desired_rate: desired_rate,
            shards: 1,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn update(&mut self, bytes: u64) {
        self.update_at(bytes, Instant::now())
    }

    pub fn update_at(&mut self, bytes: u64, now: Instant) {
        self.tracker.update_at(bytes, now);

        let rate = self.tracker.rate();
        self.shards = Self::shard_count(rate, self.desired_rate);

        debug!("Updated transmission rate ({}ms window): {:.0}B/s ({:.2}MB/s desired)",
            self.tracker.window().as_millis(), rate, self.desired_rate);
        debug!("Updated stream shards: {}", self.shards);
    }

    /// ceil(rate / 1MiB / desired), never below one
    pub fn shard_count(rate: f64, desired_rate: f64) -> i64 {
        let shards = (rate / BYTES_PER_SHARD / desired_rate).ceil();
        if !shards.is_finite() || shards < 1.0 {
            return 1;
        }
        shards as i64
    }

    pub fn shards(&self) -> i64 {
        self.shards
    }

    pub fn rate(&self) -> f64 {
        self.tracker.rate()
    }

    /// Uniform pick in `[1, shards]`.
    pub fn pick_shard(&mut self) -> i64 {
        if self.shards <= 1 {
            return 1;
        }
        self.rng.gen_range(1..=self.shards)
    }
}
