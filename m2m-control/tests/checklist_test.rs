//! Drives a bring-up checklist the way firmware does: a scheduler tick
//! polls an AsyncSequencer until its requested steps pass.

use m2m_buffers::ManualTimeProvider;
use m2m_control::{AsyncSequencer, Scheduler, StepDef, StepOutcome};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

const STEP_CLOCK: u32 = 0x01;
const STEP_STORAGE: u32 = 0x02;
const STEP_RADIO: u32 = 0x04;

#[test]
fn scheduler_polls_a_sequencer_to_completion() {
    let clock = Arc::new(ManualTimeProvider::new(Instant::now(), 0));
    let mut sched = Scheduler::new(clock.clone());

    // The radio "hardware" needs three polls before it reports ready.
    let radio_countdown = Rc::new(RefCell::new(3u8));
    let countdown = radio_countdown.clone();
    let seq = Rc::new(RefCell::new(AsyncSequencer::new(vec![
        StepDef::new(
            STEP_CLOCK,
            "clock",
            0,
            || StepOutcome::Success,
            || StepOutcome::Success,
        ),
        StepDef::new(
            STEP_STORAGE,
            "storage",
            STEP_CLOCK,
            || StepOutcome::Success,
            || StepOutcome::Success,
        ),
        StepDef::new(
            STEP_RADIO,
            "radio",
            STEP_CLOCK | STEP_STORAGE,
            || StepOutcome::Success,
            move || {
                let mut left = countdown.borrow_mut();
                if *left == 0 {
                    StepOutcome::Success
                } else {
                    *left -= 1;
                    StepOutcome::Defer
                }
            },
        ),
    ])));
    seq.borrow_mut().request_steps(STEP_RADIO);

    let seq_in = seq.clone();
    sched
        .add_schedule("bringup", Duration::from_millis(10), -1, false, move || {
            seq_in.borrow_mut().poll();
        })
        .unwrap();

    sched.advance();
    sched.service();
    for _ in 0..16 {
        clock.advance(Duration::from_millis(10));
        sched.advance();
        sched.service();
    }

    assert!(seq.borrow().request_fulfilled());
    assert_eq!(*radio_countdown.borrow(), 0);
}
