use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// The clock seam. Components never read the wall clock directly; they take
/// a provider (or explicit `Instant`s derived from one) so tests can run on
/// a manual clock.
pub trait TimeProvider: Send + Sync {
    fn now_instant(&self) -> Instant;
    fn now_system_ms(&self) -> i64;
}

/// The production provider, backed by the OS clocks.
#[derive(Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_instant(&self) -> Instant {
        Instant::now()
    }

    fn now_system_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// A manual time provider for deterministic simulations.
#[derive(Debug)]
pub struct ManualTimeProvider {
    instant: std::sync::RwLock<Instant>,
    system_ms: std::sync::RwLock<i64>,
}

impl ManualTimeProvider {
    pub fn new(instant: Instant, system_ms: i64) -> Self {
        Self {
            instant: std::sync::RwLock::new(instant),
            system_ms: std::sync::RwLock::new(system_ms),
        }
    }

    pub fn set_time(&self, instant: Instant, system_ms: i64) {
        *self.instant.write().unwrap() = instant;
        *self.system_ms.write().unwrap() = system_ms;
    }

    pub fn advance(&self, duration: Duration) {
        *self.instant.write().unwrap() += duration;
        *self.system_ms.write().unwrap() += duration.as_millis() as i64;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_instant(&self) -> Instant {
        *self.instant.read().unwrap()
    }

    fn now_system_ms(&self) -> i64 {
        *self.system_ms.read().unwrap()
    }
}

/// A deadline helper: a period, an optional armed deadline, and an enabled
/// flag. A disabled or zero-period timeout reads as already expired and
/// reports zero remaining.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicTimeout {
    period: Duration,
    deadline: Option<Instant>,
    enabled: bool,
}

impl PeriodicTimeout {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            deadline: None,
            enabled: true,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Re-arms the deadline at `now + period`.
    pub fn reset(&mut self, now: Instant) {
        self.deadline = Some(now + self.period);
    }

    /// Re-arms with a new period in one call.
    pub fn reset_with(&mut self, now: Instant, period: Duration) {
        self.period = period;
        self.reset(now);
    }

    pub fn expired(&self, now: Instant) -> bool {
        if !self.enabled || self.period.is_zero() {
            return true;
        }
        match self.deadline {
            Some(d) => now >= d,
            None => true,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        if !self.enabled || self.period.is_zero() {
            return Duration::ZERO;
        }
        match self.deadline {
            Some(d) => d.saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}

/// Accumulating run-time profiler: best, worst, mean and last lap.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stopwatch {
    started_at: Option<Instant>,
    last: Duration,
    best: Duration,
    worst: Duration,
    total: Duration,
    laps: u64,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    /// Closes the lap opened by the last `mark_start`. Returns the lap time,
    /// or `None` when no lap was open.
    pub fn mark_stop(&mut self, now: Instant) -> Option<Duration> {
        let started = self.started_at.take()?;
        let lap = now.saturating_duration_since(started);
        self.last = lap;
        self.total += lap;
        if self.laps == 0 || lap < self.best {
            self.best = lap;
        }
        if lap > self.worst {
            self.worst = lap;
        }
        self.laps += 1;
        Some(lap)
    }

    pub fn laps(&self) -> u64 {
        self.laps
    }

    pub fn last(&self) -> Duration {
        self.last
    }

    pub fn best(&self) -> Duration {
        self.best
    }

    pub fn worst(&self) -> Duration {
        self.worst
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn mean(&self) -> Duration {
        if self.laps == 0 {
            Duration::ZERO
        } else {
            self.total / self.laps as u32
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
