use m2m_buffers::{BufferChain, PeriodicTimeout, RingBuffer};
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsmError {
    #[error("State code not present in the definition list")]
    InvalidState,
    #[error("Route queue is full")]
    RouteFull,
    #[error("No states given")]
    EmptyRoute,
}

/// Marks a definition row as the invalid catch-all; such rows never validate.
pub const ENUM_FLAG_CATCHALL: u8 = 0x01;

/// One row of an enum description table.
#[derive(Debug, Clone, Copy)]
pub struct EnumDef<S: Copy> {
    pub value: S,
    pub label: &'static str,
    pub flags: u8,
}

impl<S: Copy> EnumDef<S> {
    pub const fn new(value: S, label: &'static str) -> Self {
        Self {
            value,
            label,
            flags: 0,
        }
    }

    pub const fn catchall(value: S, label: &'static str) -> Self {
        Self {
            value,
            label,
            flags: ENUM_FLAG_CATCHALL,
        }
    }
}

/// A table describing the values of an enum: labels for reports and a
/// validity check for externally-supplied codes.
#[derive(Debug, Clone, Copy)]
pub struct EnumDefList<S: Copy + PartialEq + 'static> {
    defs: &'static [EnumDef<S>],
}

impl<S: Copy + PartialEq + 'static> EnumDefList<S> {
    pub const fn new(defs: &'static [EnumDef<S>]) -> Self {
        Self { defs }
    }

    pub fn is_valid(&self, value: S) -> bool {
        self.defs
            .iter()
            .any(|d| d.value == value && d.flags & ENUM_FLAG_CATCHALL == 0)
    }

    pub fn label(&self, value: S) -> &'static str {
        self.defs
            .iter()
            .find(|d| d.value == value)
            .map(|d| d.label)
            .unwrap_or("<unknown>")
    }

    /// Case-insensitive reverse lookup by label.
    pub fn by_label(&self, label: &str) -> Option<S> {
        self.defs
            .iter()
            .find(|d| d.label.eq_ignore_ascii_case(label))
            .map(|d| d.value)
    }

    /// Number of rows that describe real values.
    pub fn count_valid(&self) -> usize {
        self.defs
            .iter()
            .filter(|d| d.flags & ENUM_FLAG_CATCHALL == 0)
            .count()
    }
}

/// Client hooks consulted on every attempted transition.
pub trait StateHooks<S> {
    /// May the machine leave `current`? Returning false holds the plan.
    fn can_exit(&mut self, current: S) -> bool;
    /// Attempt entry into `next`. Returning false leaves state unchanged;
    /// the planned step is retried on a later poll.
    fn on_enter(&mut self, next: S) -> bool;
}

/// An enum-keyed state machine with a bounded route plan and a minimum
/// inter-transition delay.
///
/// The machine stores where it is, where it was, and where it is going; the
/// client's [`StateHooks`] decide whether each planned transition may happen.
/// A plan entry that keeps failing is never dropped autonomously; that is a
/// client bug by contract.
pub struct StateMachine<S: Copy + PartialEq + 'static> {
    name: String,
    defs: EnumDefList<S>,
    current: S,
    prior: S,
    route: RingBuffer<S>,
    lockout: PeriodicTimeout,
    slowdown: Duration,
}

impl<S: Copy + PartialEq + 'static> StateMachine<S> {
    pub fn new(name: &str, defs: EnumDefList<S>, initial: S, max_depth: usize) -> Self {
        Self {
            name: name.to_string(),
            defs,
            current: initial,
            prior: initial,
            route: RingBuffer::new(max_depth),
            lockout: PeriodicTimeout::new(Duration::ZERO),
            slowdown: Duration::ZERO,
        }
    }

    pub fn current_state(&self) -> S {
        self.current
    }

    pub fn prior_state(&self) -> S {
        self.prior
    }

    /// True when the plan is empty.
    pub fn is_stable(&self) -> bool {
        self.route.is_empty()
    }

    /// True while the inter-transition lockout is unexpired.
    pub fn is_waiting(&self, now: Instant) -> bool {
        !self.lockout.expired(now)
    }

    /// The next planned state, if any.
    pub fn next_state(&self) -> Option<S> {
        self.route.peek().copied()
    }

    /// Enforces a minimum delay between transitions.
    pub fn set_slowdown(&mut self, delay: Duration) {
        self.slowdown = delay;
    }

    /// Starts (or extends) a lockout window ending at `now + window`.
    pub fn lockout(&mut self, now: Instant, window: Duration) {
        self.lockout.reset_with(now, window);
    }

    /// Replaces the plan. Every state is validated first; states beyond the
    /// route capacity are silently truncated.
    pub fn set_route(&mut self, states: &[S]) -> Result<(), FsmError> {
        if states.is_empty() {
            return Err(FsmError::EmptyRoute);
        }
        let take = states.len().min(self.route.capacity());
        if states[..take].iter().any(|s| !self.defs.is_valid(*s)) {
            return Err(FsmError::InvalidState);
        }
        self.route.clear();
        for s in &states[..take] {
            let _ = self.route.insert(*s);
        }
        Ok(())
    }

    /// Enqueues states behind the current plan, truncating at capacity.
    pub fn append_route(&mut self, states: &[S]) -> Result<(), FsmError> {
        if states.is_empty() {
            return Err(FsmError::EmptyRoute);
        }
        let take = states.len().min(self.route.vacancy());
        if states[..take].iter().any(|s| !self.defs.is_valid(*s)) {
            return Err(FsmError::InvalidState);
        }
        for s in &states[..take] {
            let _ = self.route.insert(*s);
        }
        Ok(())
    }

    /// Puts `state` at the head of the plan, shifting the rest back.
    pub fn prepend_state(&mut self, state: S) -> Result<(), FsmError> {
        if !self.defs.is_valid(state) {
            return Err(FsmError::InvalidState);
        }
        let depth = self.route.count();
        if depth >= self.route.capacity() {
            return Err(FsmError::RouteFull);
        }
        let _ = self.route.insert(state);
        for _ in 0..depth {
            let cycled = self.route.get().unwrap();
            let _ = self.route.insert(cycled);
        }
        Ok(())
    }

    /// Attempts one planned transition. Returns the state entered, if any.
    pub fn poll(&mut self, hooks: &mut dyn StateHooks<S>, now: Instant) -> Option<S> {
        if self.is_waiting(now) {
            return None;
        }
        let next = self.route.peek().copied()?;
        if !hooks.can_exit(self.current) {
            return None;
        }
        if !hooks.on_enter(next) {
            return None;
        }
        let _ = self.route.get();
        self.prior = self.current;
        self.current = next;
        // Preserve any margin a hook asked for via lockout() during entry.
        let window = self.slowdown.max(self.lockout.remaining(now));
        if !window.is_zero() {
            self.lockout.reset_with(now, window);
        }
        Some(next)
    }

    /// Renders a human-readable report of the machine into `out`.
    pub fn write_report(&self, out: &mut BufferChain, now: Instant) {
        let _ = writeln!(out, "-- FSM: {}", self.name);
        let _ = writeln!(out, "\tPrior state:   {}", self.defs.label(self.prior));
        let _ = writeln!(
            out,
            "\tCurrent state: {}{}",
            self.defs.label(self.current),
            if self.is_waiting(now) { " (LOCKED)" } else { "" }
        );
        let _ = write!(out, "\tNext states:   ");
        if self.route.is_empty() {
            out.append_static(b"(stable)\n");
        } else {
            for (i, s) in self.route.iter().enumerate() {
                let sep = if i == 0 { "" } else { ", " };
                let _ = write!(out, "{}{}", sep, self.defs.label(*s));
            }
            out.append_static(b"\n");
        }
        if self.is_waiting(now) {
            let _ = writeln!(
                out,
                "\tLocked for another {}ms",
                self.lockout.remaining(now).as_millis()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Gear {
        Park,
        Reverse,
        Neutral,
        Drive,
        Bogus,
    }

    static GEAR_DEFS: &[EnumDef<Gear>] = &[
        EnumDef::new(Gear::Park, "PARK"),
        EnumDef::new(Gear::Reverse, "REVERSE"),
        EnumDef::new(Gear::Neutral, "NEUTRAL"),
        EnumDef::new(Gear::Drive, "DRIVE"),
        EnumDef::catchall(Gear::Bogus, "<BOGUS>"),
    ];

    struct Transmission {
        allow_exit: bool,
        refuse_enter: Option<Gear>,
        entries: Vec<Gear>,
    }

    impl Default for Transmission {
        fn default() -> Self {
            Self {
                allow_exit: true,
                refuse_enter: None,
                entries: Vec::new(),
            }
        }
    }

    impl StateHooks<Gear> for Transmission {
        fn can_exit(&mut self, _current: Gear) -> bool {
            self.allow_exit
        }

        fn on_enter(&mut self, next: Gear) -> bool {
            if self.refuse_enter == Some(next) {
                return false;
            }
            self.entries.push(next);
            true
        }
    }

    fn fsm() -> StateMachine<Gear> {
        StateMachine::new("gears", EnumDefList::new(GEAR_DEFS), Gear::Park, 4)
    }

    #[test]
    fn route_traversal_is_fifo() {
        let mut m = fsm();
        let mut hooks = Transmission::default();
        let now = Instant::now();
        m.set_route(&[Gear::Neutral, Gear::Drive]).unwrap();
        assert!(!m.is_stable());
        assert_eq!(m.poll(&mut hooks, now), Some(Gear::Neutral));
        assert_eq!(m.poll(&mut hooks, now), Some(Gear::Drive));
        assert_eq!(m.poll(&mut hooks, now), None);
        assert!(m.is_stable());
        assert_eq!(m.current_state(), Gear::Drive);
        assert_eq!(m.prior_state(), Gear::Neutral);
        assert_eq!(hooks.entries, vec![Gear::Neutral, Gear::Drive]);
    }

    #[test]
    fn invalid_states_are_rejected() {
        let mut m = fsm();
        assert_eq!(
            m.set_route(&[Gear::Neutral, Gear::Bogus]),
            Err(FsmError::InvalidState)
        );
        assert!(m.is_stable());
        assert_eq!(m.set_route(&[]), Err(FsmError::EmptyRoute));
        assert_eq!(m.prepend_state(Gear::Bogus), Err(FsmError::InvalidState));
    }

    #[test]
    fn refused_entry_leaves_state_unchanged() {
        let mut m = fsm();
        let mut hooks = Transmission {
            refuse_enter: Some(Gear::Drive),
            ..Default::default()
        };
        let now = Instant::now();
        m.set_route(&[Gear::Drive]).unwrap();
        assert_eq!(m.poll(&mut hooks, now), None);
        assert_eq!(m.current_state(), Gear::Park);
        assert!(!m.is_stable());
        hooks.refuse_enter = None;
        assert_eq!(m.poll(&mut hooks, now), Some(Gear::Drive));
    }

    #[test]
    fn slowdown_enforces_lockout_between_transitions() {
        let mut m = fsm();
        let mut hooks = Transmission::default();
        let t0 = Instant::now();
        m.set_slowdown(Duration::from_millis(10));
        m.set_route(&[Gear::Neutral, Gear::Drive]).unwrap();
        assert_eq!(m.poll(&mut hooks, t0), Some(Gear::Neutral));
        assert!(m.is_waiting(t0));
        assert_eq!(m.poll(&mut hooks, t0), None);
        let t1 = t0 + Duration::from_millis(10);
        assert!(!m.is_waiting(t1));
        assert_eq!(m.poll(&mut hooks, t1), Some(Gear::Drive));
    }

    #[test]
    fn prepend_shifts_the_plan() {
        let mut m = fsm();
        m.set_route(&[Gear::Drive]).unwrap();
        m.prepend_state(Gear::Neutral).unwrap();
        assert_eq!(m.next_state(), Some(Gear::Neutral));
        let mut hooks = Transmission::default();
        let now = Instant::now();
        m.poll(&mut hooks, now);
        m.poll(&mut hooks, now);
        assert_eq!(hooks.entries, vec![Gear::Neutral, Gear::Drive]);
    }

    #[test]
    fn held_exit_blocks_the_plan() {
        let mut m = fsm();
        let mut hooks = Transmission {
            allow_exit: false,
            ..Default::default()
        };
        let now = Instant::now();
        m.set_route(&[Gear::Reverse]).unwrap();
        assert_eq!(m.poll(&mut hooks, now), None);
        assert_eq!(m.current_state(), Gear::Park);
        hooks.allow_exit = true;
        assert_eq!(m.poll(&mut hooks, now), Some(Gear::Reverse));
    }

    #[test]
    fn report_renders_labels() {
        let mut m = fsm();
        m.set_route(&[Gear::Drive]).unwrap();
        let mut out = BufferChain::new();
        m.write_report(&mut out, Instant::now());
        let text = out.into_string();
        assert!(text.contains("PARK"));
        assert!(text.contains("DRIVE"));
    }
}
