use crate::error::ValueError;
use m2m_buffers::BufferChain;
use rand::RngCore;
use uuid::Uuid;

/// Wire format codes for the identity body. Stable; append only.
const FORMAT_UUID: u8 = 1;

/// Header is {len: u16, flags: u16, format: u8}, little-endian.
const HEADER_LEN: usize = 5;

/// Format-specific payload of an identity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityBody {
    Uuid(Uuid),
}

impl IdentityBody {
    fn format_code(&self) -> u8 {
        match self {
            IdentityBody::Uuid(_) => FORMAT_UUID,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            IdentityBody::Uuid(_) => 16,
        }
    }
}

/// A self-describing identity record: a handle, caller-defined flags, and a
/// format-specific body.
///
/// Serialized layout: 2-byte total length, 2-byte flags, 1-byte format, the
/// null-terminated handle, then the body bytes (16 for UUID).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub handle: String,
    pub flags: u16,
    pub body: IdentityBody,
}

impl Identity {
    pub fn uuid(handle: &str, uuid: Uuid) -> Self {
        Self {
            handle: handle.to_string(),
            flags: 0,
            body: IdentityBody::Uuid(uuid),
        }
    }

    /// A fresh UUID identity drawn from the caller's generator.
    pub fn random_uuid(handle: &str, rng: &mut dyn RngCore) -> Self {
        let mut raw = [0u8; 16];
        rng.fill_bytes(&mut raw);
        // Stamp RFC 4122 version/variant bits so the result reads as v4.
        raw[6] = (raw[6] & 0x0F) | 0x40;
        raw[8] = (raw[8] & 0x3F) | 0x80;
        Self::uuid(handle, Uuid::from_bytes(raw))
    }

    pub fn serialized_len(&self) -> usize {
        HEADER_LEN + self.handle.len() + 1 + self.body.body_len()
    }

    pub fn serialize(&self, out: &mut BufferChain) {
        let total = self.serialized_len() as u16;
        let mut buf = Vec::with_capacity(total as usize);
        buf.extend_from_slice(&total.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.push(self.body.format_code());
        buf.extend_from_slice(self.handle.as_bytes());
        buf.push(0);
        match &self.body {
            IdentityBody::Uuid(u) => buf.extend_from_slice(u.as_bytes()),
        }
        out.append_vec(buf);
    }

    /// Parses one record from the front of `bytes`. Returns the record and
    /// the number of bytes consumed.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize), ValueError> {
        if bytes.len() < HEADER_LEN {
            return Err(ValueError::MalformedRecord);
        }
        let total = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        if total < HEADER_LEN || total > bytes.len() {
            return Err(ValueError::MalformedRecord);
        }
        let flags = u16::from_le_bytes([bytes[2], bytes[3]]);
        let format = bytes[4];
        let rest = &bytes[HEADER_LEN..total];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ValueError::MalformedRecord)?;
        let handle = std::str::from_utf8(&rest[..nul])
            .map_err(|_| ValueError::MalformedRecord)?
            .to_string();
        let body_bytes = &rest[nul + 1..];
        let body = match format {
            FORMAT_UUID => {
                let raw: [u8; 16] = body_bytes
                    .try_into()
                    .map_err(|_| ValueError::MalformedRecord)?;
                IdentityBody::Uuid(Uuid::from_bytes(raw))
            }
            _ => return Err(ValueError::MalformedRecord),
        };
        Ok((
            Self {
                handle,
                flags,
                body,
            },
            total,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn serialize_parse_round_trip() {
        let id = Identity::uuid("node-7", Uuid::from_u128(0xDEADBEEF));
        let mut out = BufferChain::new();
        id.serialize(&mut out);
        let bytes = out.into_bytes();
        assert_eq!(bytes.len(), id.serialized_len());
        let (back, consumed) = Identity::parse(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(back, id);
    }

    #[test]
    fn random_identity_is_v4_shaped() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let id = Identity::random_uuid("ephemeral", &mut rng);
        match &id.body {
            IdentityBody::Uuid(u) => {
                assert_eq!(u.get_version_num(), 4);
            }
        }
    }

    #[test]
    fn truncated_records_are_malformed() {
        let id = Identity::uuid("x", Uuid::from_u128(1));
        let mut out = BufferChain::new();
        id.serialize(&mut out);
        let bytes = out.into_bytes();
        for cut in [0, 3, bytes.len() - 1] {
            assert!(Identity::parse(&bytes[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn unknown_format_is_rejected() {
        let id = Identity::uuid("x", Uuid::from_u128(1));
        let mut out = BufferChain::new();
        id.serialize(&mut out);
        let mut bytes = out.into_bytes();
        bytes[4] = 0x7F;
        assert!(Identity::parse(&bytes).is_err());
    }

    #[test]
    fn parse_consumes_exactly_one_record() {
        let a = Identity::uuid("a", Uuid::from_u128(1));
        let b = Identity::uuid("bee", Uuid::from_u128(2));
        let mut out = BufferChain::new();
        a.serialize(&mut out);
        b.serialize(&mut out);
        let bytes = out.into_bytes();
        let (first, used) = Identity::parse(&bytes).unwrap();
        assert_eq!(first, a);
        let (second, _) = Identity::parse(&bytes[used..]).unwrap();
        assert_eq!(second, b);
    }
}
