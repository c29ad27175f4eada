//! # m2m-pipeline
//!
//! The buffer-transform pipeline: a chainable sink contract with
//! back-pressure, reference sinks, and two streaming codecs (Base64 and
//! line-terminator normalization).
//!
//! ## The contract
//!
//! A sink accepts bytes by taking segments out of the caller's
//! [`BufferChain`]; whatever it does not claim stays in the chain, verbatim
//! and in order. [`BufferAccepter::buffer_available`] advertises how much the
//! sink will take on the next push so upstream producers can shape their
//! offerings. Three rules make chains composable:
//!
//! - A sink never keeps references into caller memory; claimed bytes are
//!   moved out of the chain.
//! - A sink that rejects must not have mutated the chain.
//! - A partial claim always consumes a prefix; bytes are never reordered or
//!   skipped.

pub mod base64;
pub mod fixtures;
pub mod line;
pub mod sink;

pub use crate::base64::{Base64Decoder, Base64Encoder, CodecError};
pub use fixtures::{TestSink, TestSource};
pub use line::{LineEndingCodec, LineTerm};
pub use sink::{BufferFork, CaptureSink};

use m2m_buffers::BufferChain;

/// Claim category returned by a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    /// Everything offered was claimed.
    Full,
    /// A prefix was claimed; the remainder stays with the caller.
    Partial,
    /// Nothing was claimed; the chain is untouched.
    Reject,
    /// The sink is in a faulted state; content of the chain is unspecified
    /// only insofar as already-claimed prefixes may have been consumed.
    Error,
}

impl PushResult {
    /// True when the sink claimed at least one byte.
    pub fn claimed_any(self) -> bool {
        matches!(self, PushResult::Full | PushResult::Partial)
    }
}

/// The pipeline sink contract. See the crate docs for the rules.
pub trait BufferAccepter {
    fn push_buffer(&mut self, chain: &mut BufferChain) -> PushResult;

    /// Maximum number of bytes the sink will accept on the next push,
    /// modulo any transform scaling documented by the implementation.
    fn buffer_available(&self) -> usize;
}

impl<T: BufferAccepter + ?Sized> BufferAccepter for &mut T {
    fn push_buffer(&mut self, chain: &mut BufferChain) -> PushResult {
        (**self).push_buffer(chain)
    }

    fn buffer_available(&self) -> usize {
        (**self).buffer_available()
    }
}
