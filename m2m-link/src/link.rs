use crate::header::{sync_frame, MsgCode, MsgHdr};
use crate::message::M2MMsg;
use crate::options::{LinkConfig, LinkOpts};
use crate::LinkError;
use m2m_buffers::{BufferChain, PeriodicTimeout, TimeProvider};
use m2m_control::{EnumDef, EnumDefList, StateHooks, StateMachine};
use m2m_pipeline::{BufferAccepter, PushResult};
use m2m_values::KeyValuePair;
use rand::rngs::StdRng;
use rand::RngCore;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Session states of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Constructed but not yet started.
    Uninit,
    /// Session state wiped; ready to begin establishment.
    PendingSetup,
    /// Emitting SYNC at a bounded cadence, nothing heard yet.
    SyncCasting,
    /// One SYNC heard; waiting for a consecutive second.
    SyncTentative,
    /// Framing agreed; exchanging CONNECT tables.
    SyncReceived,
    /// Session established; application traffic flows.
    Ready,
    /// Local hangup in progress; draining DISCONNECT.
    Hungup,
    /// Session over.
    Disconnected,
    /// Framing or payload decode failed; buffers flushed before re-sync.
    CorruptedTransport,
}

static LINK_STATES: &[EnumDef<LinkState>] = &[
    EnumDef::new(LinkState::Uninit, "UNINIT"),
    EnumDef::new(LinkState::PendingSetup, "PENDING_SETUP"),
    EnumDef::new(LinkState::SyncCasting, "SYNC_CASTING"),
    EnumDef::new(LinkState::SyncTentative, "SYNC_TENTATIVE"),
    EnumDef::new(LinkState::SyncReceived, "SYNC_RECEIVED"),
    EnumDef::new(LinkState::Ready, "READY"),
    EnumDef::new(LinkState::Hungup, "HUNGUP"),
    EnumDef::new(LinkState::Disconnected, "DISCONNECTED"),
    EnumDef::new(LinkState::CorruptedTransport, "CORRUPTED_TRANSPORT"),
];

/// What the session reports to the application. Drained with
/// [`M2MLink::poll_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    StateChanged(LinkState),
    /// A non-reply message arrived (APPLICATION).
    Msg(M2MMsg),
    /// The reply to an id this side was waiting on.
    Reply(M2MMsg),
    /// No reply arrived within the ack timeout.
    ReplyTimeout(u16),
    /// Peer-originated LOG text.
    Log(String),
    PeerDisconnected,
}

/// Traffic and fault counters. All monotonically increasing.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkCounters {
    pub frames_rx: u64,
    pub frames_tx: u64,
    pub garbage_bytes: u64,
    pub checksum_faults: u64,
    pub decode_faults: u64,
    pub unmatched_replies: u64,
    pub reply_timeouts: u64,
    pub resyncs: u64,
}

struct InFlight {
    id: u16,
    deadline: Instant,
    /// Protocol-internal exchanges (CONNECT) do not surface timeout events
    /// to the application.
    internal: bool,
}

/// Everything but the state machine, split out so the FSM can borrow it as
/// its hook sink while the link drives both.
struct LinkCtl {
    config: LinkConfig,
    peer_opts: Option<LinkOpts>,
    time: Arc<dyn TimeProvider>,
    rng: StdRng,
    inbound: BufferChain,
    /// Set while the parser is wedged behind an incomplete frame; a poll
    /// that extracts at least one frame (or empties the buffer) clears it.
    inbound_stalled_since: Option<Instant>,
    outbound: VecDeque<M2MMsg>,
    in_flight: Vec<InFlight>,
    events: VecDeque<LinkEvent>,
    counters: LinkCounters,
    sync_timer: PeriodicTimeout,
    ka_timer: PeriodicTimeout,
    last_heard: Option<Instant>,
    consecutive_syncs: u8,
    sent_connect: bool,
    connect_confirmed: bool,
    /// Route change requested by a frame handler, applied by `poll`.
    route_request: Option<SmallVec<[LinkState; 2]>>,
}

impl StateHooks<LinkState> for LinkCtl {
    fn can_exit(&mut self, _current: LinkState) -> bool {
        true
    }

    fn on_enter(&mut self, next: LinkState) -> bool {
        let now = self.time.now_instant();
        match next {
            LinkState::PendingSetup => {
                self.wipe_session(now);
            }
            LinkState::SyncCasting => {
                self.consecutive_syncs = 0;
                self.sent_connect = false;
                self.connect_confirmed = false;
                // First poll in this state emits immediately.
                self.sync_timer.set_period(self.config.sync_interval);
            }
            LinkState::Ready => {
                self.ka_timer
                    .reset_with(now, self.config.opts.ka_interval());
                self.last_heard = Some(now);
            }
            LinkState::CorruptedTransport => {
                self.inbound.clear();
                self.inbound_stalled_since = None;
            }
            _ => {}
        }
        self.events.push_back(LinkEvent::StateChanged(next));
        true
    }
}

enum ParseStep {
    NeedMore,
    Skip(usize),
    Frame(MsgHdr, usize),
}

impl LinkCtl {
    fn wipe_session(&mut self, _now: Instant) {
        self.inbound.clear();
        self.inbound_stalled_since = None;
        self.outbound.clear();
        self.in_flight.clear();
        self.peer_opts = None;
        self.consecutive_syncs = 0;
        self.sent_connect = false;
        self.connect_confirmed = false;
    }

    fn effective_mtu(&self) -> u32 {
        match self.peer_opts {
            Some(peer) => peer.mtu.min(self.config.opts.mtu),
            None => self.config.opts.mtu,
        }
    }

    fn request_route(&mut self, states: &[LinkState]) {
        self.route_request = Some(SmallVec::from_slice(states));
    }

    fn next_parse_step(&mut self) -> ParseStep {
        let mtu = self.effective_mtu();
        let buf = self.inbound.collapse();
        if buf.is_empty() {
            return ParseStep::NeedMore;
        }
        match MsgHdr::parse(buf) {
            Ok(None) => ParseStep::NeedMore,
            Ok(Some((hdr, hdr_len))) => {
                if hdr.payload_len > mtu {
                    // A "valid" header promising more than the session MTU
                    // is garbage that happened to checksum.
                    return ParseStep::Skip(1);
                }
                let total = hdr_len + hdr.payload_len as usize;
                if buf.len() < total {
                    ParseStep::NeedMore
                } else {
                    ParseStep::Frame(hdr, hdr_len)
                }
            }
            Err(crate::HeaderError::BadChecksum) => {
                self.counters.checksum_faults += 1;
                ParseStep::Skip(1)
            }
            Err(_) => ParseStep::Skip(1),
        }
    }

    /// Extracts every complete frame from the inbound buffer. Garbage bytes
    /// before a valid header are discarded one at a time and counted.
    fn parse_inbound(&mut self, now: Instant) -> Vec<M2MMsg> {
        let mut frames = Vec::new();
        loop {
            match self.next_parse_step() {
                ParseStep::NeedMore => break,
                ParseStep::Skip(n) => {
                    self.inbound.cull_head(n);
                    self.counters.garbage_bytes += n as u64;
                    self.consecutive_syncs = 0;
                }
                ParseStep::Frame(hdr, hdr_len) => {
                    let total = hdr_len + hdr.payload_len as usize;
                    let raw = self.inbound.take_front(total);
                    let payload = raw[hdr_len..].to_vec();
                    frames.push(M2MMsg::from_wire(hdr, payload));
                }
            }
        }
        // Stall bookkeeping: a poll that produced no frame while bytes wait
        // means a phantom header may be demanding payload that never comes.
        if self.inbound.is_empty() || !frames.is_empty() {
            self.inbound_stalled_since = None;
        } else if self.inbound_stalled_since.is_none() {
            self.inbound_stalled_since = Some(now);
        }
        frames
    }

    fn inbound_is_stalled(&self, now: Instant) -> bool {
        match self.inbound_stalled_since {
            Some(since) => {
                now.saturating_duration_since(since) >= self.config.opts.ack_timeout()
            }
            None => false,
        }
    }

    fn handle_frame(&mut self, msg: M2MMsg, now: Instant, state: LinkState) {
        self.counters.frames_rx += 1;
        self.last_heard = Some(now);

        if msg.code() != MsgCode::Sync {
            self.consecutive_syncs = 0;
        }

        // Replies must match something in flight; strays are dropped.
        if msg.is_reply() {
            let idx = self.in_flight.iter().position(|f| f.id == msg.id());
            match idx {
                Some(idx) => {
                    self.in_flight.swap_remove(idx);
                }
                None => {
                    debug!(id = msg.id(), "dropping unmatched reply");
                    self.counters.unmatched_replies += 1;
                    return;
                }
            }
        }

        match msg.code() {
            MsgCode::Sync => {
                self.consecutive_syncs = self.consecutive_syncs.saturating_add(1);
                match state {
                    LinkState::SyncCasting if self.consecutive_syncs == 1 => {
                        self.request_route(&[LinkState::SyncTentative]);
                    }
                    LinkState::SyncCasting | LinkState::SyncTentative
                        if self.consecutive_syncs >= 2 =>
                    {
                        self.request_route(&[LinkState::SyncReceived]);
                    }
                    LinkState::Ready => {
                        // Peer lost the session; meet it back at sync.
                        warn!("peer is casting sync from an established session");
                        self.counters.resyncs += 1;
                        self.request_route(&[LinkState::SyncCasting]);
                    }
                    _ => {}
                }
            }
            MsgCode::Connect => match msg.payload_opts() {
                Ok(opts) => {
                    trace!(?opts, "peer options");
                    self.peer_opts = Some(opts);
                    self.connect_confirmed = true;
                    if msg.expects_reply() && !msg.is_reply() {
                        if let Ok(reply) = M2MMsg::connect_reply(msg.id(), &self.config.opts) {
                            self.outbound.push_back(reply);
                            self.sent_connect = true;
                        }
                    }
                    if state != LinkState::Ready {
                        self.request_route(&[LinkState::Ready]);
                    }
                }
                Err(_) => {
                    self.counters.decode_faults += 1;
                    self.counters.resyncs += 1;
                    self.request_route(&[
                        LinkState::CorruptedTransport,
                        LinkState::SyncCasting,
                    ]);
                }
            },
            MsgCode::Keepalive => {}
            MsgCode::Disconnect => {
                self.events.push_back(LinkEvent::PeerDisconnected);
                self.request_route(&[LinkState::Disconnected]);
            }
            MsgCode::Log => match msg.payload_text() {
                Ok(text) => self.events.push_back(LinkEvent::Log(text)),
                Err(_) => self.counters.decode_faults += 1,
            },
            MsgCode::Application => {
                // Validate the payload shape before delivery; a payload that
                // does not decode means the stream is corrupt.
                if msg.payload_kvp().is_err() {
                    self.counters.decode_faults += 1;
                    self.counters.resyncs += 1;
                    self.request_route(&[
                        LinkState::CorruptedTransport,
                        LinkState::SyncCasting,
                    ]);
                    return;
                }
                if msg.is_reply() {
                    self.events.push_back(LinkEvent::Reply(msg));
                } else {
                    self.events.push_back(LinkEvent::Msg(msg));
                }
            }
        }
    }

    fn assign_fresh_id(&mut self) -> u16 {
        loop {
            let id = (self.rng.next_u32() & 0xFFFF) as u16;
            if id != 0 && !self.in_flight.iter().any(|f| f.id == id) {
                return id;
            }
        }
    }

    fn emit_sync(&mut self, wire_out: &mut dyn BufferAccepter, now: Instant) {
        let frame = sync_frame();
        if wire_out.buffer_available() >= frame.len() {
            let mut chain = BufferChain::new();
            chain.append(&frame);
            if wire_out.push_buffer(&mut chain) == PushResult::Full {
                self.counters.frames_tx += 1;
            }
        }
        self.sync_timer.reset(now);
    }

    /// Frames queued messages onto the wire. A message goes out whole or
    /// not at all, so back-pressure never tears a frame.
    fn flush_outbound(&mut self, wire_out: &mut dyn BufferAccepter) {
        while let Some(front) = self.outbound.front() {
            let need = front.encoded_len();
            if need == 0 {
                // Unframeable message; drop rather than wedge the queue.
                self.outbound.pop_front();
                continue;
            }
            if wire_out.buffer_available() < need {
                break;
            }
            let msg = self.outbound.pop_front().unwrap();
            let mut chain = BufferChain::new();
            if msg.encode_into(&mut chain).is_err() {
                continue;
            }
            match wire_out.push_buffer(&mut chain) {
                PushResult::Full => self.counters.frames_tx += 1,
                _ => {
                    warn!("transport under-delivered on its advertised capacity");
                    break;
                }
            }
        }
    }

    fn sweep_in_flight(&mut self, now: Instant) {
        let mut expired: SmallVec<[(u16, bool); 4]> = SmallVec::new();
        self.in_flight.retain(|f| {
            if now >= f.deadline {
                expired.push((f.id, f.internal));
                false
            } else {
                true
            }
        });
        for (id, internal) in expired {
            debug!(id, internal, "reply wait expired");
            if !internal {
                self.counters.reply_timeouts += 1;
                self.events.push_back(LinkEvent::ReplyTimeout(id));
            }
        }
    }
}

/// A peer-to-peer message link over a byte transport.
///
/// Inbound bytes arrive through this type's [`BufferAccepter`] impl;
/// outbound bytes are pushed into whatever sink [`M2MLink::poll`] is handed.
/// Two links can therefore be joined back-to-back, each serving as the
/// other's transport.
pub struct M2MLink {
    fsm: StateMachine<LinkState>,
    ctl: LinkCtl,
}

impl M2MLink {
    pub fn new(config: LinkConfig, time: Arc<dyn TimeProvider>, rng: StdRng) -> Self {
        let sync_interval = config.sync_interval;
        let ka = config.opts.ka_interval();
        Self {
            fsm: StateMachine::new("m2m-link", EnumDefList::new(LINK_STATES), LinkState::Uninit, 4),
            ctl: LinkCtl {
                config,
                peer_opts: None,
                time,
                rng,
                inbound: BufferChain::new(),
                inbound_stalled_since: None,
                outbound: VecDeque::new(),
                in_flight: Vec::new(),
                events: VecDeque::new(),
                counters: LinkCounters::default(),
                sync_timer: PeriodicTimeout::new(sync_interval),
                ka_timer: PeriodicTimeout::new(ka),
                last_heard: None,
                consecutive_syncs: 0,
                sent_connect: false,
                connect_confirmed: false,
                route_request: None,
            },
        }
    }

    /// Begins session establishment.
    pub fn start(&mut self) {
        let _ = self
            .fsm
            .set_route(&[LinkState::PendingSetup, LinkState::SyncCasting]);
    }

    /// Tears the session down to PENDING_SETUP and starts over.
    pub fn reset(&mut self) {
        self.start();
    }

    /// Sends DISCONNECT and winds the session down once it drains.
    pub fn hangup(&mut self) {
        self.ctl.outbound.push_back(M2MMsg::disconnect());
        let _ = self.fsm.set_route(&[LinkState::Hungup]);
    }

    pub fn state(&self) -> LinkState {
        self.fsm.current_state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Ready
    }

    /// True when nothing is queued, in flight, or partially parsed.
    pub fn link_idle(&self) -> bool {
        self.ctl.outbound.is_empty()
            && self.ctl.in_flight.is_empty()
            && self.ctl.inbound.is_empty()
            && self.ctl.events.is_empty()
    }

    pub fn counters(&self) -> LinkCounters {
        self.ctl.counters
    }

    pub fn local_opts(&self) -> LinkOpts {
        self.ctl.config.opts
    }

    pub fn peer_opts(&self) -> Option<LinkOpts> {
        self.ctl.peer_opts
    }

    pub fn poll_event(&mut self) -> Option<LinkEvent> {
        self.ctl.events.pop_front()
    }

    /// Queues an APPLICATION message. With `expect_reply`, a fresh nonzero
    /// id is assigned, entered into the in-flight table, and returned.
    pub fn send(
        &mut self,
        kvp: Option<&KeyValuePair>,
        expect_reply: bool,
    ) -> Result<Option<u16>, LinkError> {
        if self.state() != LinkState::Ready {
            return Err(LinkError::NotReady);
        }
        if self.ctl.outbound.len() >= self.ctl.config.max_outbound {
            return Err(LinkError::QueueFull);
        }
        let mut msg = M2MMsg::application(kvp, expect_reply)?;
        let id = if expect_reply {
            let id = self.ctl.assign_fresh_id();
            msg.set_id(id);
            let deadline = self.ctl.time.now_instant() + self.ctl.config.opts.ack_timeout();
            self.ctl.in_flight.push(InFlight {
                id,
                deadline,
                internal: false,
            });
            Some(id)
        } else {
            None
        };
        self.ctl.outbound.push_back(msg);
        Ok(id)
    }

    /// Queues the reply to `original`, echoing its id.
    pub fn reply(
        &mut self,
        original: &M2MMsg,
        kvp: Option<&KeyValuePair>,
    ) -> Result<(), LinkError> {
        if !original.expects_reply() {
            return Err(LinkError::InvalidArgument);
        }
        if self.ctl.outbound.len() >= self.ctl.config.max_outbound {
            return Err(LinkError::QueueFull);
        }
        let msg = M2MMsg::application_reply(original.id(), kvp)?;
        self.ctl.outbound.push_back(msg);
        Ok(())
    }

    /// Queues a LOG frame.
    pub fn send_log(&mut self, text: &str) -> Result<(), LinkError> {
        if self.state() != LinkState::Ready {
            return Err(LinkError::NotReady);
        }
        if self.ctl.outbound.len() >= self.ctl.config.max_outbound {
            return Err(LinkError::QueueFull);
        }
        self.ctl.outbound.push_back(M2MMsg::log(text));
        Ok(())
    }

    /// Drives the session: parses inbound bytes, advances the state
    /// machine, emits protocol frames, flushes queued messages, and retires
    /// expired reply waits. Returns the number of frames processed.
    pub fn poll(&mut self, wire_out: &mut dyn BufferAccepter) -> usize {
        let now = self.ctl.time.now_instant();

        let frames = self.ctl.parse_inbound(now);
        let frame_count = frames.len();
        for msg in frames {
            let state = self.fsm.current_state();
            self.ctl.handle_frame(msg, now, state);
            self.apply_route_request();
            while self.fsm.poll(&mut self.ctl, now).is_some() {}
        }

        // A phantom header can leave the parser waiting forever on payload
        // bytes that never come. Declare the transport corrupt and re-sync.
        if self.ctl.inbound_is_stalled(now) && self.state() != LinkState::Uninit {
            warn!("inbound stream stalled mid-frame");
            self.ctl.counters.resyncs += 1;
            self.ctl
                .request_route(&[LinkState::CorruptedTransport, LinkState::SyncCasting]);
            self.apply_route_request();
        }

        while self.fsm.poll(&mut self.ctl, now).is_some() {}

        match self.fsm.current_state() {
            LinkState::SyncCasting | LinkState::SyncTentative => {
                if self.ctl.sync_timer.expired(now) {
                    self.ctl.emit_sync(wire_out, now);
                }
            }
            LinkState::SyncReceived => {
                if self.ctl.connect_confirmed {
                    self.ctl.request_route(&[LinkState::Ready]);
                } else if !self.ctl.sent_connect {
                    let id = self.ctl.assign_fresh_id();
                    if let Ok(mut msg) = M2MMsg::connect(&self.ctl.config.opts, true) {
                        msg.set_id(id);
                        let deadline = now + self.ctl.config.opts.ack_timeout();
                        self.ctl.in_flight.push(InFlight {
                            id,
                            deadline,
                            internal: true,
                        });
                        self.ctl.outbound.push_back(msg);
                        self.ctl.sent_connect = true;
                    }
                } else if self.ctl.in_flight.is_empty() {
                    // The CONNECT we sent expired unanswered (likely eaten by
                    // line noise); offer it again.
                    self.ctl.sent_connect = false;
                }
            }
            LinkState::Ready => {
                if self.ctl.ka_timer.expired(now) {
                    self.ctl.outbound.push_back(M2MMsg::keepalive());
                    self.ctl.ka_timer.reset(now);
                }
                let grace =
                    self.ctl.config.opts.ka_interval() * self.ctl.config.grace_factor;
                let silent = self
                    .ctl
                    .last_heard
                    .map(|t| now.saturating_duration_since(t) > grace)
                    .unwrap_or(false);
                if silent {
                    warn!("keepalive grace window exceeded; re-syncing");
                    self.ctl.counters.resyncs += 1;
                    self.ctl.request_route(&[LinkState::SyncCasting]);
                }
            }
            LinkState::Hungup => {
                if self.ctl.outbound.is_empty() {
                    self.ctl.request_route(&[LinkState::Disconnected]);
                }
            }
            _ => {}
        }
        self.apply_route_request();
        while self.fsm.poll(&mut self.ctl, now).is_some() {}

        self.ctl.flush_outbound(wire_out);
        self.ctl.sweep_in_flight(now);
        frame_count
    }

    fn apply_route_request(&mut self) {
        if let Some(route) = self.ctl.route_request.take() {
            let _ = self.fsm.set_route(&route);
        }
    }

    /// Renders a human-readable session report into `out`.
    pub fn write_report(&self, out: &mut BufferChain) {
        let now = self.ctl.time.now_instant();
        self.fsm.write_report(out, now);
        let c = self.ctl.counters;
        let _ = writeln!(
            out,
            "\trx/tx: {}/{}  garbage: {}  csum: {}  decode: {}",
            c.frames_rx, c.frames_tx, c.garbage_bytes, c.checksum_faults, c.decode_faults
        );
        let _ = writeln!(
            out,
            "\ttimeouts: {}  strays: {}  resyncs: {}  in-flight: {}  queued: {}",
            c.reply_timeouts,
            c.unmatched_replies,
            c.resyncs,
            self.ctl.in_flight.len(),
            self.ctl.outbound.len()
        );
    }
}

impl BufferAccepter for M2MLink {
    fn push_buffer(&mut self, chain: &mut BufferChain) -> PushResult {
        let offered = chain.len();
        if offered == 0 {
            return PushResult::Full;
        }
        let avail = self.buffer_available();
        if avail == 0 {
            return PushResult::Reject;
        }
        let moved = self.ctl.inbound.concat_handoff_limit(chain, avail.min(offered));
        if moved == offered {
            PushResult::Full
        } else if moved > 0 {
            PushResult::Partial
        } else {
            PushResult::Reject
        }
    }

    fn buffer_available(&self) -> usize {
        self.ctl
            .config
            .inbound_capacity
            .saturating_sub(self.ctl.inbound.len())
    }
}
