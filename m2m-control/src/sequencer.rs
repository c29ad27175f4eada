use m2m_buffers::BufferChain;
use std::fmt::Write as _;

/// Tri-state result of a step's dispatch or poll callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Not ready; try again on a later poll.
    Defer,
    Success,
    Fail,
}

/// Definition of one step: a single flag bit, a label for reports, the mask
/// of steps that must have passed first, and the two callbacks.
pub struct StepDef {
    pub flag: u32,
    pub label: &'static str,
    pub deps: u32,
    dispatch: Box<dyn FnMut() -> StepOutcome>,
    poll: Box<dyn FnMut() -> StepOutcome>,
}

impl StepDef {
    pub fn new(
        flag: u32,
        label: &'static str,
        deps: u32,
        dispatch: impl FnMut() -> StepOutcome + 'static,
        poll: impl FnMut() -> StepOutcome + 'static,
    ) -> Self {
        Self {
            flag,
            label,
            deps,
            dispatch: Box::new(dispatch),
            poll: Box::new(poll),
        }
    }
}

/// Snapshot of the engine's five bitmaps, for checkpointing a checklist
/// mid-flight or priming one in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerState {
    pub requested: u32,
    pub runnable: u32,
    pub running: u32,
    pub complete: u32,
    pub passed: u32,
}

/// Tracks up to 32 named asynchronous steps and their dependencies.
///
/// Steps are requested as a bitmask; each `poll()` advances every step whose
/// dependencies have all passed, one tier at a time: idle → dispatched
/// (running) → complete, with pass/fail recorded separately. A failed
/// dispatch completes the step immediately without polling it.
pub struct AsyncSequencer {
    steps: Vec<StepDef>,
    state: SequencerState,
}

impl AsyncSequencer {
    /// Builds an engine over a step table. Steps whose flag is not a single
    /// bit, or whose bit collides with an earlier step, are dropped from the
    /// table.
    pub fn new(steps: Vec<StepDef>) -> Self {
        let mut seen = 0u32;
        let steps = steps
            .into_iter()
            .filter(|s| {
                let ok = s.flag.count_ones() == 1 && (seen & s.flag) == 0;
                seen |= s.flag;
                ok
            })
            .collect();
        Self {
            steps,
            state: SequencerState::default(),
        }
    }

    fn known_mask(&self) -> u32 {
        self.steps.iter().fold(0, |m, s| m | s.flag)
    }

    /// Requests steps by mask. Unknown flag bits are ignored.
    pub fn request_steps(&mut self, mask: u32) {
        self.state.requested |= mask & self.known_mask();
        self.check_dependencies();
    }

    /// Clears the named steps from the running/complete/passed bitmaps so
    /// they will run again.
    pub fn reset_steps(&mut self, mask: u32) {
        self.state.running &= !mask;
        self.state.complete &= !mask;
        self.state.passed &= !mask;
    }

    /// Clears all five bitmaps.
    pub fn reset_sequencer(&mut self) {
        self.state = SequencerState::default();
    }

    pub fn get_state(&self) -> SequencerState {
        self.state
    }

    pub fn set_state(&mut self, state: SequencerState) {
        self.state = state;
    }

    /// The requested steps, their dependencies, and their dependencies'
    /// dependencies, until the set stops growing.
    fn check_dependencies(&mut self) {
        let mut runnable = self.state.requested;
        loop {
            let mut next = runnable;
            for s in &self.steps {
                if runnable & s.flag != 0 {
                    next |= s.deps;
                }
            }
            if next == runnable {
                break;
            }
            runnable = next;
        }
        self.state.runnable = runnable & self.known_mask();
    }

    /// Advances every eligible step one tier. Returns the number of steps
    /// whose state changed in this call.
    pub fn poll(&mut self) -> usize {
        self.check_dependencies();
        let mut advanced = 0;
        for i in 0..self.steps.len() {
            let flag = self.steps[i].flag;
            if self.state.runnable & flag == 0 || self.state.complete & flag != 0 {
                continue;
            }
            if self.state.running & flag != 0 {
                match (self.steps[i].poll)() {
                    StepOutcome::Success => {
                        self.state.running &= !flag;
                        self.state.complete |= flag;
                        self.state.passed |= flag;
                        advanced += 1;
                    }
                    StepOutcome::Fail => {
                        self.state.running &= !flag;
                        self.state.complete |= flag;
                        advanced += 1;
                    }
                    StepOutcome::Defer => {}
                }
            } else if self.steps[i].deps & !self.state.passed == 0 {
                match (self.steps[i].dispatch)() {
                    StepOutcome::Success => {
                        self.state.running |= flag;
                        advanced += 1;
                    }
                    StepOutcome::Fail => {
                        // Failed dispatch completes the step without a poll.
                        self.state.complete |= flag;
                        advanced += 1;
                    }
                    StepOutcome::Defer => {}
                }
            }
        }
        advanced
    }

    /// True when everything requested has completed and passed.
    pub fn request_fulfilled(&self) -> bool {
        self.state.requested == (self.state.requested & self.state.passed & self.state.complete)
    }

    pub fn all_steps_have_run(&self) -> bool {
        self.state.runnable == (self.state.runnable & self.state.complete)
    }

    pub fn all_steps_have_passed(&self, mask: u32) -> bool {
        (mask & self.state.complete) == mask && (mask & self.state.passed) == mask
    }

    /// Runnable steps that have not completed yet.
    pub fn steps_outstanding(&self) -> u32 {
        self.state.runnable & !self.state.complete
    }

    /// Completed steps that did not pass.
    pub fn failed_steps(&self) -> u32 {
        self.state.runnable & self.state.complete & !self.state.passed
    }

    /// Renders a per-step status table into `out`.
    pub fn write_report(&self, out: &mut BufferChain) {
        for s in &self.steps {
            let status = if self.state.complete & s.flag != 0 {
                if self.state.passed & s.flag != 0 {
                    "pass"
                } else {
                    "FAIL"
                }
            } else if self.state.running & s.flag != 0 {
                "running"
            } else if self.state.runnable & s.flag != 0 {
                "pending"
            } else {
                "idle"
            };
            let _ = writeln!(out, "  {:<20} {}", s.label, status);
        }
    }
}
