//! # m2m-link
//!
//! A bidirectional, session-oriented message link between two peers joined
//! by any byte transport that speaks the pipeline contract.
//!
//! ## Architecture
//!
//! - **Framing**: a small self-checking header (zero-sum checksum,
//!   variable-width length, optional message id) delimits frames in the
//!   byte stream; SYNC frames let peers re-acquire framing after garbage.
//! - **Session**: an enum-keyed state machine walks setup → sync → options
//!   negotiation → ready, with recovery routes from corruption and hangup.
//! - **Messages**: typed payloads ride as CBOR key/value maps; replies are
//!   matched by 16-bit nonzero ids with per-message ack deadlines.
//! - **Transport neutrality**: the link is itself a pipeline sink for
//!   inbound bytes, and drives any [`m2m_pipeline::BufferAccepter`] for
//!   outbound bytes. Two links can be connected back-to-back in a test.
//!
//! All progress happens inside [`M2MLink::poll`]; nothing blocks and no
//! threads are spawned.

pub mod header;
pub mod link;
pub mod message;
pub mod options;

pub use header::{HeaderError, MsgCode, MsgHdr};
pub use link::{LinkCounters, LinkEvent, LinkState, M2MLink};
pub use message::M2MMsg;
pub use options::{LinkConfig, LinkOpts};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("Link session is not ready")]
    NotReady,
    #[error("Outbound queue is full")]
    QueueFull,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Frame header: {0}")]
    Header(#[from] header::HeaderError),
    #[error("Payload: {0}")]
    Payload(#[from] m2m_values::ValueError),
}
