use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payload encoding codes carried in CONNECT. Only CBOR is defined today.
pub const ENCODING_CBOR: u8 = 0;

/// The negotiable session options a CONNECT frame carries.
///
/// Each side sends its own table; the session runs on the element-wise
/// minimum of the MTUs and each sender's own ack timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOpts {
    /// Largest frame (header + payload) this side will accept.
    pub mtu: u32,
    /// How long this side waits for a reply before retiring a message.
    pub ack_timeout_ms: u32,
    /// Cadence of KEEPALIVE emission when the session is ready.
    pub ka_interval_ms: u32,
    /// Preferred payload encoding; see [`ENCODING_CBOR`].
    pub encoding: u8,
}

impl Default for LinkOpts {
    fn default() -> Self {
        Self {
            mtu: 2048,
            ack_timeout_ms: 250,
            ka_interval_ms: 100,
            encoding: ENCODING_CBOR,
        }
    }
}

impl LinkOpts {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms as u64)
    }

    pub fn ka_interval(&self) -> Duration {
        Duration::from_millis(self.ka_interval_ms as u64)
    }
}

/// Local, non-negotiated link tuning.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Inbound accumulation buffer cap; also the advertised sink capacity.
    pub inbound_capacity: usize,
    /// Maximum queued outbound messages before sends refuse.
    pub max_outbound: usize,
    /// SYNC emission cadence while establishing framing.
    pub sync_interval: Duration,
    /// Missed-keepalive grace factor: the link re-syncs after
    /// `ka_interval * grace_factor` of silence.
    pub grace_factor: u32,
    /// This side's negotiables.
    pub opts: LinkOpts,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 4096,
            max_outbound: 8,
            sync_interval: Duration::from_millis(20),
            grace_factor: 3,
            opts: LinkOpts::default(),
        }
    }
}
