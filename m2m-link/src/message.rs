use crate::header::{MsgCode, MsgHdr};
use crate::options::LinkOpts;
use crate::LinkError;
use m2m_buffers::BufferChain;
use m2m_values::{KeyValuePair, ValueError};

/// One message on the link: a frame code, reply bookkeeping, and an encoded
/// payload.
///
/// Messages are constructed by senders (payloads encoded immediately, so a
/// failed encode surfaces at `send` time) or by the parser from a validated
/// header plus payload bytes. The message id stays zero until the session
/// assigns one; ids are only carried when a reply relationship exists.
#[derive(Debug, Clone, PartialEq)]
pub struct M2MMsg {
    code: MsgCode,
    needs_reply: bool,
    is_reply: bool,
    id: u16,
    payload: Vec<u8>,
}

impl M2MMsg {
    /// An APPLICATION message with an optional key/value payload.
    pub fn application(
        kvp: Option<&KeyValuePair>,
        expect_reply: bool,
    ) -> Result<Self, LinkError> {
        let payload = match kvp {
            Some(kvp) => m2m_values::cbor::kvp_to_bytes(kvp)?,
            None => Vec::new(),
        };
        Ok(Self {
            code: MsgCode::Application,
            needs_reply: expect_reply,
            is_reply: false,
            id: 0,
            payload,
        })
    }

    /// The APPLICATION reply to message `reply_to`.
    pub fn application_reply(
        reply_to: u16,
        kvp: Option<&KeyValuePair>,
    ) -> Result<Self, LinkError> {
        if reply_to == 0 {
            return Err(LinkError::InvalidArgument);
        }
        let payload = match kvp {
            Some(kvp) => m2m_values::cbor::kvp_to_bytes(kvp)?,
            None => Vec::new(),
        };
        Ok(Self {
            code: MsgCode::Application,
            needs_reply: false,
            is_reply: true,
            id: reply_to,
            payload,
        })
    }

    /// A LOG frame carrying UTF-8 text.
    pub fn log(text: &str) -> Self {
        Self {
            code: MsgCode::Log,
            needs_reply: false,
            is_reply: false,
            id: 0,
            payload: text.as_bytes().to_vec(),
        }
    }

    /// A CONNECT frame carrying this side's negotiables.
    pub fn connect(opts: &LinkOpts, expect_reply: bool) -> Result<Self, LinkError> {
        let mut payload = Vec::new();
        ciborium::ser::into_writer(opts, &mut payload)
            .map_err(|e| LinkError::Payload(ValueError::Encode(e.to_string())))?;
        Ok(Self {
            code: MsgCode::Connect,
            needs_reply: expect_reply,
            is_reply: false,
            id: 0,
            payload,
        })
    }

    /// The CONNECT reply: same id, this side's negotiables.
    pub fn connect_reply(reply_to: u16, opts: &LinkOpts) -> Result<Self, LinkError> {
        let mut msg = Self::connect(opts, false)?;
        msg.is_reply = true;
        msg.id = reply_to;
        Ok(msg)
    }

    pub fn keepalive() -> Self {
        Self {
            code: MsgCode::Keepalive,
            needs_reply: false,
            is_reply: false,
            id: 0,
            payload: Vec::new(),
        }
    }

    pub fn disconnect() -> Self {
        Self {
            code: MsgCode::Disconnect,
            needs_reply: false,
            is_reply: false,
            id: 0,
            payload: Vec::new(),
        }
    }

    /// Reconstructs a message delivered by the parser.
    pub(crate) fn from_wire(hdr: MsgHdr, payload: Vec<u8>) -> Self {
        Self {
            code: hdr.code,
            needs_reply: hdr.expects_reply(),
            is_reply: hdr.is_reply(),
            id: hdr.msg_id,
            payload,
        }
    }

    pub(crate) fn set_id(&mut self, id: u16) {
        self.id = id;
    }

    pub fn code(&self) -> MsgCode {
        self.code
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn expects_reply(&self) -> bool {
        self.needs_reply
    }

    pub fn is_reply(&self) -> bool {
        self.is_reply
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn header(&self) -> Result<MsgHdr, LinkError> {
        Ok(MsgHdr::new(
            self.code,
            self.payload.len() as u32,
            self.id,
            self.needs_reply,
            self.is_reply,
        )?)
    }

    /// Total bytes this message will occupy on the wire.
    pub fn encoded_len(&self) -> usize {
        // Payload length fits the header width rules by construction.
        self.header()
            .map(|h| h.encoded_len() + self.payload.len())
            .unwrap_or(0)
    }

    /// Frames the message onto `out`.
    pub fn encode_into(&self, out: &mut BufferChain) -> Result<(), LinkError> {
        let hdr = self.header()?;
        out.append_vec(hdr.encode());
        if !self.payload.is_empty() {
            out.append(&self.payload);
        }
        Ok(())
    }

    /// Decodes the payload as a key/value map. `None` for empty payloads.
    pub fn payload_kvp(&self) -> Result<Option<KeyValuePair>, ValueError> {
        if self.payload.is_empty() {
            return Ok(None);
        }
        KeyValuePair::unserialize(&self.payload).map(Some)
    }

    /// Decodes the payload as this side's option table (CONNECT frames).
    pub fn payload_opts(&self) -> Result<LinkOpts, ValueError> {
        ciborium::de::from_reader(self.payload.as_slice())
            .map_err(|e| ValueError::Decode(e.to_string()))
    }

    /// Decodes the payload as UTF-8 text (LOG frames).
    pub fn payload_text(&self) -> Result<String, ValueError> {
        String::from_utf8(self.payload.clone())
            .map_err(|_| ValueError::Decode("log payload is not UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_message_round_trips_through_framing() {
        let mut kvp = KeyValuePair::new();
        kvp.append_kv("temp", 21i64);
        let mut msg = M2MMsg::application(Some(&kvp), true).unwrap();
        msg.set_id(0x0BEE);

        let mut wire = BufferChain::new();
        msg.encode_into(&mut wire).unwrap();
        let bytes = wire.into_bytes();
        assert_eq!(bytes.len(), msg.encoded_len());

        let (hdr, hdr_len) = MsgHdr::parse(&bytes).unwrap().unwrap();
        assert_eq!(hdr.payload_len as usize, bytes.len() - hdr_len);
        let back = M2MMsg::from_wire(hdr, bytes[hdr_len..].to_vec());
        assert_eq!(back, msg);
        assert_eq!(
            back.payload_kvp().unwrap().unwrap().value_with_key("temp"),
            kvp.value_with_key("temp")
        );
    }

    #[test]
    fn empty_payload_decodes_to_none() {
        let msg = M2MMsg::keepalive();
        assert!(msg.payload_kvp().unwrap().is_none());
        assert_eq!(msg.encoded_len(), 4);
    }

    #[test]
    fn connect_payload_carries_options() {
        let opts = LinkOpts {
            mtu: 512,
            ..LinkOpts::default()
        };
        let msg = M2MMsg::connect(&opts, true).unwrap();
        assert_eq!(msg.payload_opts().unwrap(), opts);
    }

    #[test]
    fn reply_to_zero_id_is_invalid() {
        assert!(matches!(
            M2MMsg::application_reply(0, None),
            Err(LinkError::InvalidArgument)
        ));
    }
}
