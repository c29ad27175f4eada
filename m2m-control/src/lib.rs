//! # m2m-control
//!
//! Progress engines for cooperative firmware: a dependency-ordered step
//! sequencer for bring-up checklists, a polled scheduler with slip
//! accounting, and an enum-keyed finite state machine with route planning.
//!
//! Nothing here spawns threads or blocks. All progress happens inside
//! explicit `poll()` / `service()` calls on the caller's executor, with time
//! injected through `m2m_buffers::TimeProvider`.

pub mod fsm;
pub mod scheduler;
pub mod sequencer;

pub use fsm::{EnumDef, EnumDefList, FsmError, StateHooks, StateMachine, ENUM_FLAG_CATCHALL};
pub use scheduler::{Scheduler, SchedulerError, ScheduleId, ScheduleInfo};
pub use sequencer::{AsyncSequencer, SequencerState, StepDef, StepOutcome};
