use crate::{BufferAccepter, PushResult};
use ::base64::engine::general_purpose::STANDARD;
use ::base64::Engine as _;
use m2m_buffers::BufferChain;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Input byte outside the Base64 alphabet")]
    InvalidCharacter,
    #[error("Malformed padding")]
    BadPadding,
    #[error("Stream ended inside a 4-character group")]
    TrailingPartialGroup,
    #[error("Data arrived after the final padded group")]
    DataAfterPadding,
    #[error("Downstream sink took less than it advertised")]
    DownstreamStall,
}

/// Streaming Base64 encoder. Forwards encoded text to a downstream sink.
///
/// Input is consumed in 3-byte groups; at most two residual bytes are
/// carried between pushes. [`Base64Encoder::finish`] flushes the residue
/// with standard `=` padding. Output scales input by 4/3, and the encoder
/// splits its downstream pushes to respect the advertised capacity.
#[derive(Debug)]
pub struct Base64Encoder<D: BufferAccepter> {
    downstream: D,
    carry: Vec<u8>,
    last_error: Option<CodecError>,
}

impl<D: BufferAccepter> Base64Encoder<D> {
    pub fn new(downstream: D) -> Self {
        Self {
            downstream,
            carry: Vec::with_capacity(3),
            last_error: None,
        }
    }

    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    pub fn downstream_mut(&mut self) -> &mut D {
        &mut self.downstream
    }

    pub fn into_inner(self) -> D {
        self.downstream
    }

    pub fn last_error(&self) -> Option<CodecError> {
        self.last_error
    }

    /// Encodes and forwards the 0-2 residual bytes with padding, ending the
    /// stream. The encoder is reusable afterward.
    pub fn finish(&mut self) -> Result<(), CodecError> {
        if self.carry.is_empty() {
            return Ok(());
        }
        let encoded = STANDARD.encode(&self.carry);
        self.carry.clear();
        self.forward(encoded.into_bytes())
    }

    fn forward(&mut self, encoded: Vec<u8>) -> Result<(), CodecError> {
        if encoded.is_empty() {
            return Ok(());
        }
        let mut out = BufferChain::from(encoded);
        if self.downstream.push_buffer(&mut out) != PushResult::Full {
            self.last_error = Some(CodecError::DownstreamStall);
            return Err(CodecError::DownstreamStall);
        }
        Ok(())
    }
}

impl<D: BufferAccepter> BufferAccepter for Base64Encoder<D> {
    fn push_buffer(&mut self, chain: &mut BufferChain) -> PushResult {
        let offered = chain.len();
        if offered == 0 {
            return PushResult::Full;
        }
        let in_capacity = self.buffer_available();
        if in_capacity == 0 {
            return PushResult::Reject;
        }
        let take = in_capacity.min(offered);
        let taken = chain.take_front(take);
        self.carry.extend_from_slice(&taken);

        let whole = (self.carry.len() / 3) * 3;
        if whole > 0 {
            let residue = self.carry.split_off(whole);
            let encoded = STANDARD.encode(&self.carry);
            self.carry = residue;
            if self.forward(encoded.into_bytes()).is_err() {
                return PushResult::Error;
            }
        }
        if take == offered {
            PushResult::Full
        } else {
            PushResult::Partial
        }
    }

    fn buffer_available(&self) -> usize {
        let groups = self.downstream.buffer_available() / 4;
        (groups * 3).saturating_sub(self.carry.len())
    }
}

/// Streaming Base64 decoder. Forwards decoded bytes to a downstream sink.
///
/// Strict by default: any byte outside the Base64 alphabet, malformed
/// padding, or data after the final padded group faults the stream. The lax
/// variant additionally skips ASCII whitespace, which is common in wrapped
/// transfer encodings. Output scales input by 3/4.
#[derive(Debug)]
pub struct Base64Decoder<D: BufferAccepter> {
    downstream: D,
    carry: Vec<u8>,
    lax: bool,
    saw_padding: bool,
    last_error: Option<CodecError>,
}

impl<D: BufferAccepter> Base64Decoder<D> {
    pub fn new(downstream: D) -> Self {
        Self {
            downstream,
            carry: Vec::with_capacity(4),
            lax: false,
            saw_padding: false,
            last_error: None,
        }
    }

    /// A decoder that tolerates ASCII whitespace between groups.
    pub fn lax(downstream: D) -> Self {
        let mut d = Self::new(downstream);
        d.lax = true;
        d
    }

    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    pub fn downstream_mut(&mut self) -> &mut D {
        &mut self.downstream
    }

    pub fn into_inner(self) -> D {
        self.downstream
    }

    pub fn last_error(&self) -> Option<CodecError> {
        self.last_error
    }

    /// Ends the stream. A partial 4-character group at the end is an error.
    /// The decoder resets for reuse either way.
    pub fn finish(&mut self) -> Result<(), CodecError> {
        let dangling = !self.carry.is_empty();
        self.carry.clear();
        self.saw_padding = false;
        if dangling {
            self.last_error = Some(CodecError::TrailingPartialGroup);
            return Err(CodecError::TrailingPartialGroup);
        }
        Ok(())
    }

    fn fault(&mut self, err: CodecError) -> PushResult {
        self.last_error = Some(err);
        PushResult::Error
    }
}

fn is_b64_alphabet(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
}

impl<D: BufferAccepter> BufferAccepter for Base64Decoder<D> {
    fn push_buffer(&mut self, chain: &mut BufferChain) -> PushResult {
        let offered = chain.len();
        if offered == 0 {
            return PushResult::Full;
        }
        let in_capacity = self.buffer_available();
        if in_capacity == 0 {
            return PushResult::Reject;
        }
        let take = in_capacity.min(offered);
        let taken = chain.take_front(take);

        let mut decoded: Vec<u8> = Vec::with_capacity(take / 4 * 3);
        for &b in &taken {
            if self.lax && (b == b'\r' || b == b'\n' || b == b' ' || b == b'\t') {
                continue;
            }
            if !is_b64_alphabet(b) {
                return self.fault(CodecError::InvalidCharacter);
            }
            if self.saw_padding {
                return self.fault(CodecError::DataAfterPadding);
            }
            self.carry.push(b);
            if self.carry.len() == 4 {
                match STANDARD.decode(&self.carry) {
                    Ok(bytes) => decoded.extend_from_slice(&bytes),
                    Err(_) => return self.fault(CodecError::BadPadding),
                }
                if self.carry.contains(&b'=') {
                    self.saw_padding = true;
                }
                self.carry.clear();
            }
        }

        if !decoded.is_empty() {
            let mut out = BufferChain::from(decoded);
            if self.downstream.push_buffer(&mut out) != PushResult::Full {
                return self.fault(CodecError::DownstreamStall);
            }
        }
        if take == offered {
            PushResult::Full
        } else {
            PushResult::Partial
        }
    }

    fn buffer_available(&self) -> usize {
        let groups = self.downstream.buffer_available() / 3;
        groups
            .saturating_mul(4)
            .saturating_sub(self.carry.len())
    }
}
