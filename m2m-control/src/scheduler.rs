use m2m_buffers::{Stopwatch, TimeProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("Schedule period must be nonzero")]
    ZeroPeriod,
    #[error("Recurrence count must be nonzero (use -1 for infinite)")]
    ZeroRecurrence,
}

/// Identifier handed back by [`Scheduler::add_schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleId(pub u32);

/// Copyable snapshot of one schedule's bookkeeping, for tests and reports.
#[derive(Debug, Clone)]
pub struct ScheduleInfo {
    pub name: String,
    pub period: Duration,
    pub enabled: bool,
    pub recurrences_left: i64,
    pub fires: u64,
    pub slip: Duration,
    pub mean_runtime: Duration,
    pub worst_runtime: Duration,
}

struct Schedule {
    id: ScheduleId,
    name: String,
    period_us: u64,
    /// Remaining firings; -1 means unbounded.
    recurrences: i64,
    auto_clear: bool,
    enabled: bool,
    /// Phase value at which this schedule next fires. Armed on the first
    /// service call after addition.
    next_fire_us: Option<u64>,
    fires: u64,
    slip_us: u64,
    profiler: Stopwatch,
    action: Box<dyn FnMut()>,
}

/// A cooperative polled scheduler with microsecond phase accounting.
///
/// Two calls drive it from different contexts:
/// - [`Scheduler::advance`] from a timer tick: accumulates elapsed time into
///   the phase counter. Nothing executes here.
/// - [`Scheduler::service`] from the task loop: runs every schedule that
///   became due since the last service, each at most once per call (rate
///   limited catch-up, not backlog replay).
///
/// Firing order among due schedules follows add order, so behavior is
/// deterministic for a given call pattern.
pub struct Scheduler {
    time: Arc<dyn TimeProvider>,
    phase_us: u64,
    last_advance: Option<Instant>,
    advances: u64,
    services: u64,
    global_slip_us: u64,
    next_id: u32,
    active: Vec<Schedule>,
    additions: Vec<Schedule>,
}

impl Scheduler {
    pub fn new(time: Arc<dyn TimeProvider>) -> Self {
        Self {
            time,
            phase_us: 0,
            last_advance: None,
            advances: 0,
            services: 0,
            global_slip_us: 0,
            next_id: 1,
            active: Vec::new(),
            additions: Vec::new(),
        }
    }

    /// Registers a schedule. `recurrences` of -1 repeats forever; a positive
    /// count disables the schedule once exhausted (and removes it when
    /// `auto_clear` is set).
    pub fn add_schedule(
        &mut self,
        name: &str,
        period: Duration,
        recurrences: i64,
        auto_clear: bool,
        action: impl FnMut() + 'static,
    ) -> Result<ScheduleId, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        if recurrences == 0 {
            return Err(SchedulerError::ZeroRecurrence);
        }
        let id = ScheduleId(self.next_id);
        self.next_id += 1;
        // New schedules land in a staging queue so that additions made from
        // inside a running action take effect on the next service pass.
        self.additions.push(Schedule {
            id,
            name: name.to_string(),
            period_us: period.as_micros() as u64,
            recurrences,
            auto_clear,
            enabled: true,
            next_fire_us: None,
            fires: 0,
            slip_us: 0,
            profiler: Stopwatch::new(),
            action: Box::new(action),
        });
        Ok(id)
    }

    /// Accumulates elapsed time since the previous advance into the phase
    /// counter. Call this from the tick source.
    pub fn advance(&mut self) {
        let now = self.time.now_instant();
        if let Some(prev) = self.last_advance {
            self.phase_us += now.saturating_duration_since(prev).as_micros() as u64;
        }
        self.last_advance = Some(now);
        self.advances += 1;
    }

    /// Executes every due schedule at most once. Call this from the task
    /// loop. Does nothing until `advance` has established a phase.
    pub fn service(&mut self) {
        self.services += 1;
        self.active.append(&mut self.additions);
        if self.advances == 0 {
            return;
        }
        let phase = self.phase_us;
        let mut cleared = false;
        for sched in self.active.iter_mut() {
            let deadline = match sched.next_fire_us {
                Some(d) => d,
                None => {
                    // First sight of this schedule: anchor its deadline.
                    sched.next_fire_us = Some(phase + sched.period_us);
                    continue;
                }
            };
            if !sched.enabled || phase < deadline {
                continue;
            }
            let slip = phase - deadline;
            sched.slip_us += slip;
            self.global_slip_us += slip;

            let started = self.time.now_instant();
            sched.profiler.mark_start(started);
            (sched.action)();
            sched.profiler.mark_stop(self.time.now_instant());
            sched.fires += 1;

            // Re-anchor rather than replaying missed periods.
            sched.next_fire_us = Some(phase + sched.period_us);
            if sched.recurrences > 0 {
                sched.recurrences -= 1;
                if sched.recurrences == 0 {
                    sched.enabled = false;
                    cleared |= sched.auto_clear;
                }
            }
        }
        if cleared {
            self.active
                .retain(|s| !(s.auto_clear && s.recurrences == 0));
        }
    }

    pub fn set_enabled(&mut self, id: ScheduleId, enabled: bool) -> bool {
        match self.find_mut(id) {
            Some(s) => {
                s.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Removes a schedule outright. Returns false for unknown ids.
    pub fn remove(&mut self, id: ScheduleId) -> bool {
        let before = self.active.len() + self.additions.len();
        self.active.retain(|s| s.id != id);
        self.additions.retain(|s| s.id != id);
        before != self.active.len() + self.additions.len()
    }

    pub fn schedule_count(&self) -> usize {
        self.active.len() + self.additions.len()
    }

    pub fn phase_us(&self) -> u64 {
        self.phase_us
    }

    pub fn global_slip(&self) -> Duration {
        Duration::from_micros(self.global_slip_us)
    }

    pub fn advances(&self) -> u64 {
        self.advances
    }

    pub fn services(&self) -> u64 {
        self.services
    }

    pub fn info(&self, id: ScheduleId) -> Option<ScheduleInfo> {
        self.active
            .iter()
            .chain(self.additions.iter())
            .find(|s| s.id == id)
            .map(|s| ScheduleInfo {
                name: s.name.clone(),
                period: Duration::from_micros(s.period_us),
                enabled: s.enabled,
                recurrences_left: s.recurrences,
                fires: s.fires,
                slip: Duration::from_micros(s.slip_us),
                mean_runtime: s.profiler.mean(),
                worst_runtime: s.profiler.worst(),
            })
    }

    fn find_mut(&mut self, id: ScheduleId) -> Option<&mut Schedule> {
        self.active
            .iter_mut()
            .chain(self.additions.iter_mut())
            .find(|s| s.id == id)
    }
}
