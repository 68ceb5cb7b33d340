use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use super::CollisionReport;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "metrics lock poisoned; recovered inner value");
    }
}

/// Per-interval loop statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    pub worst_frame_ms: f32,
    /// Live entities at the end of the interval.
    pub entity_count: usize,
    /// Overlap tests per tick, averaged over the interval.
    pub collision_tests_per_tick: f32,
    pub collision_responses: u32,
    pub response_failures: u32,
    /// Ticks the loop gave up on because the frame fell too far behind.
    pub dropped_ticks: u32,
}

/// Shared read side of the loop statistics.
#[derive(Clone, Debug)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(LoopMetricsSnapshot::default())),
        }
    }
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                *poisoned.into_inner() = snapshot;
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    frames: u32,
    ticks: u32,
    frame_time_sum: Duration,
    worst_frame: Duration,
    collision_tests: u64,
    collision_responses: u32,
    response_failures: u32,
    dropped_ticks: u32,
    entity_count: usize,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval_start: Instant::now(),
            interval,
            frames: 0,
            ticks: 0,
            frame_time_sum: Duration::ZERO,
            worst_frame: Duration::ZERO,
            collision_tests: 0,
            collision_responses: 0,
            response_failures: 0,
            dropped_ticks: 0,
            entity_count: 0,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration, entity_count: usize) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_dt);
        self.worst_frame = self.worst_frame.max(frame_dt);
        self.entity_count = entity_count;
    }

    pub(crate) fn record_tick(&mut self, collisions: Option<&CollisionReport>) {
        self.ticks = self.ticks.saturating_add(1);
        if let Some(report) = collisions {
            self.collision_tests = self.collision_tests.saturating_add(report.tested as u64);
            self.collision_responses = self
                .collision_responses
                .saturating_add(report.responded.len() as u32);
            self.response_failures = self.response_failures.saturating_add(report.failures as u32);
        }
    }

    pub(crate) fn record_dropped_ticks(&mut self, dropped: u32) {
        self.dropped_ticks = self.dropped_ticks.saturating_add(dropped);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = if self.frames == 0 {
            0.0
        } else {
            (self.frame_time_sum.as_secs_f32() / self.frames as f32) * 1000.0
        };
        let collision_tests_per_tick = if self.ticks == 0 {
            0.0
        } else {
            self.collision_tests as f32 / self.ticks as f32
        };

        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            tps: self.ticks as f32 / elapsed_seconds,
            frame_time_ms,
            worst_frame_ms: self.worst_frame.as_secs_f32() * 1000.0,
            entity_count: self.entity_count,
            collision_tests_per_tick,
            collision_responses: self.collision_responses,
            response_failures: self.response_failures,
            dropped_ticks: self.dropped_ticks,
        };

        let entity_count = self.entity_count;
        *self = Self::new(self.interval);
        self.interval_start = now;
        self.entity_count = entity_count;

        Some(snapshot)
    }
}
