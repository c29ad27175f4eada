use thiserror::Error;

/// Sender expects a reply carrying the same message id.
pub const FLAG_NEEDS_REPLY: u8 = 0x01;
/// This frame is the reply to an earlier id.
pub const FLAG_IS_REPLY: u8 = 0x02;
/// A 16-bit message id trails the length field.
pub const FLAG_ID_PRESENT: u8 = 0x04;
const FLAG_LEN_SHIFT: u8 = 3;
const FLAG_LEN_MASK: u8 = 0x18;
const FLAG_RESERVED: u8 = 0xE0;

/// Payload length rides in at most three little-endian bytes.
pub const MAX_PAYLOAD_LEN: u32 = 0x00FF_FFFF;

/// Frame type codes. Stable on the wire; append only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgCode {
    Sync = 0x01,
    Connect = 0x02,
    Disconnect = 0x03,
    Keepalive = 0x04,
    Log = 0x05,
    Application = 0x06,
}

impl MsgCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x01 => MsgCode::Sync,
            0x02 => MsgCode::Connect,
            0x03 => MsgCode::Disconnect,
            0x04 => MsgCode::Keepalive,
            0x05 => MsgCode::Log,
            0x06 => MsgCode::Application,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("Unknown message code")]
    BadCode,
    #[error("Reserved flag bits set")]
    ReservedFlags,
    #[error("Header checksum does not cancel")]
    BadChecksum,
    #[error("Reply flags without a nonzero id")]
    ReplyWithoutId,
    #[error("Payload on a code that forbids one")]
    ForbiddenPayload,
    #[error("Payload length exceeds the encodable range")]
    LengthOverflow,
}

/// A parsed or to-be-encoded frame header.
///
/// Layout: `code, flags, checksum`, then 0-3 little-endian payload-length
/// bytes (width per the flags), then a 16-bit id iff `ID_PRESENT`. The
/// checksum byte is chosen so the whole header sums to zero modulo 256,
/// which lets a parser validate a candidate header with no further context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHdr {
    pub code: MsgCode,
    pub flags: u8,
    pub payload_len: u32,
    pub msg_id: u16,
}

fn len_width(payload_len: u32) -> u8 {
    // Always at least one length byte, so every header is 4+ bytes and a
    // bare SYNC has a fixed shape.
    if payload_len < 0x100 {
        1
    } else if payload_len < 0x1_0000 {
        2
    } else {
        3
    }
}

impl MsgHdr {
    pub fn new(
        code: MsgCode,
        payload_len: u32,
        msg_id: u16,
        needs_reply: bool,
        is_reply: bool,
    ) -> Result<Self, HeaderError> {
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(HeaderError::LengthOverflow);
        }
        if (needs_reply || is_reply) && msg_id == 0 {
            return Err(HeaderError::ReplyWithoutId);
        }
        if code == MsgCode::Sync && payload_len != 0 {
            return Err(HeaderError::ForbiddenPayload);
        }
        let mut flags = (len_width(payload_len)) << FLAG_LEN_SHIFT;
        if needs_reply {
            flags |= FLAG_NEEDS_REPLY;
        }
        if is_reply {
            flags |= FLAG_IS_REPLY;
        }
        if msg_id != 0 {
            flags |= FLAG_ID_PRESENT;
        }
        Ok(Self {
            code,
            flags,
            payload_len,
            msg_id,
        })
    }

    pub fn expects_reply(&self) -> bool {
        self.flags & FLAG_NEEDS_REPLY != 0
    }

    pub fn is_reply(&self) -> bool {
        self.flags & FLAG_IS_REPLY != 0
    }

    pub fn id_present(&self) -> bool {
        self.flags & FLAG_ID_PRESENT != 0
    }

    pub fn is_sync(&self) -> bool {
        self.code == MsgCode::Sync
    }

    fn width(&self) -> usize {
        ((self.flags & FLAG_LEN_MASK) >> FLAG_LEN_SHIFT) as usize
    }

    /// Encoded header length in bytes.
    pub fn encoded_len(&self) -> usize {
        3 + self.width() + if self.id_present() { 2 } else { 0 }
    }

    /// Serializes the header, computing the zero-sum checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.code as u8);
        out.push(self.flags);
        out.push(0); // checksum placeholder
        let len_le = self.payload_len.to_le_bytes();
        out.extend_from_slice(&len_le[..self.width()]);
        if self.id_present() {
            out.extend_from_slice(&self.msg_id.to_le_bytes());
        }
        let sum: u8 = out.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        out[2] = sum.wrapping_neg();
        out
    }

    /// Attempts to parse a header at the start of `buf`.
    ///
    /// `Ok(None)` means the bytes so far are a plausible prefix and more are
    /// needed; any `Err` means byte zero cannot start a valid header.
    pub fn parse(buf: &[u8]) -> Result<Option<(MsgHdr, usize)>, HeaderError> {
        if buf.len() < 3 {
            return Ok(None);
        }
        let code = MsgCode::from_u8(buf[0]).ok_or(HeaderError::BadCode)?;
        let flags = buf[1];
        if flags & FLAG_RESERVED != 0 {
            return Err(HeaderError::ReservedFlags);
        }
        let width = ((flags & FLAG_LEN_MASK) >> FLAG_LEN_SHIFT) as usize;
        let id_present = flags & FLAG_ID_PRESENT != 0;
        let hdr_len = 3 + width + if id_present { 2 } else { 0 };
        if buf.len() < hdr_len {
            return Ok(None);
        }
        let sum: u8 = buf[..hdr_len]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(HeaderError::BadChecksum);
        }
        let mut len_le = [0u8; 4];
        len_le[..width].copy_from_slice(&buf[3..3 + width]);
        let payload_len = u32::from_le_bytes(len_le);
        let msg_id = if id_present {
            u16::from_le_bytes([buf[3 + width], buf[4 + width]])
        } else {
            0
        };
        if flags & (FLAG_NEEDS_REPLY | FLAG_IS_REPLY) != 0 && msg_id == 0 {
            return Err(HeaderError::ReplyWithoutId);
        }
        if code == MsgCode::Sync && payload_len != 0 {
            return Err(HeaderError::ForbiddenPayload);
        }
        Ok(Some((
            MsgHdr {
                code,
                flags,
                payload_len,
                msg_id,
            },
            hdr_len,
        )))
    }
}

/// The canonical 4-byte SYNC frame.
pub fn sync_frame() -> [u8; 4] {
    // code SYNC, one zero length byte, checksum cancels the sum.
    let hdr = MsgHdr::new(MsgCode::Sync, 0, 0, false, false).unwrap();
    let enc = hdr.encode();
    [enc[0], enc[1], enc[2], enc[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_sum_to_zero() {
        for (code, len, id, nr, ir) in [
            (MsgCode::Sync, 0u32, 0u16, false, false),
            (MsgCode::Keepalive, 0, 0, false, false),
            (MsgCode::Application, 5, 0x1234, true, false),
            (MsgCode::Application, 70000, 7, false, true),
            (MsgCode::Log, 300, 0, false, false),
        ] {
            let hdr = MsgHdr::new(code, len, id, nr, ir).unwrap();
            let enc = hdr.encode();
            assert_eq!(enc.len(), hdr.encoded_len());
            let sum: u8 = enc.iter().fold(0u8, |a, &b| a.wrapping_add(b));
            assert_eq!(sum, 0, "{code:?}");
            let (back, used) = MsgHdr::parse(&enc).unwrap().unwrap();
            assert_eq!(used, enc.len());
            assert_eq!(back, hdr);
        }
    }

    #[test]
    fn sync_frame_shape() {
        let frame = sync_frame();
        assert_eq!(frame.len(), 4);
        let (hdr, used) = MsgHdr::parse(&frame).unwrap().unwrap();
        assert_eq!(used, 4);
        assert!(hdr.is_sync());
        assert_eq!(hdr.payload_len, 0);
        assert!(!hdr.id_present());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let hdr = MsgHdr::new(MsgCode::Application, 10, 9, true, false).unwrap();
        let mut enc = hdr.encode();
        enc[0] = MsgCode::Log as u8; // change a covered byte, keep checksum
        assert_eq!(MsgHdr::parse(&enc), Err(HeaderError::BadChecksum));
    }

    #[test]
    fn reply_flags_require_an_id() {
        assert_eq!(
            MsgHdr::new(MsgCode::Application, 0, 0, true, false),
            Err(HeaderError::ReplyWithoutId)
        );
        // Hand-build a needs-reply header with no id and a valid checksum.
        let mut raw = vec![MsgCode::Application as u8, FLAG_NEEDS_REPLY | 0x08, 0, 0];
        let sum: u8 = raw.iter().fold(0u8, |a, &b| a.wrapping_add(b));
        raw[2] = sum.wrapping_neg();
        assert_eq!(MsgHdr::parse(&raw), Err(HeaderError::ReplyWithoutId));
    }

    #[test]
    fn sync_with_payload_is_invalid() {
        assert_eq!(
            MsgHdr::new(MsgCode::Sync, 1, 0, false, false),
            Err(HeaderError::ForbiddenPayload)
        );
    }

    #[test]
    fn short_buffers_ask_for_more() {
        let hdr = MsgHdr::new(MsgCode::Application, 900, 4, true, false).unwrap();
        let enc = hdr.encode();
        for cut in 0..enc.len() {
            assert_eq!(MsgHdr::parse(&enc[..cut]), Ok(None), "cut {cut}");
        }
    }

    #[test]
    fn length_widths_are_minimal() {
        for (len, width) in [(0u32, 1usize), (255, 1), (256, 2), (65535, 2), (65536, 3)] {
            let hdr = MsgHdr::new(MsgCode::Log, len, 0, false, false).unwrap();
            assert_eq!(hdr.encoded_len(), 3 + width);
        }
    }

    #[test]
    fn garbage_bytes_cannot_validate() {
        // Exhaustively check that single-byte mutations of a valid header
        // fail at least one of the structural checks.
        let hdr = MsgHdr::new(MsgCode::Keepalive, 0, 0, false, false).unwrap();
        let enc = hdr.encode();
        for i in 0..enc.len() {
            let mut bad = enc.clone();
            bad[i] = bad[i].wrapping_add(1);
            assert!(matches!(MsgHdr::parse(&bad), Err(_) | Ok(None)), "byte {i}");
        }
    }
}
