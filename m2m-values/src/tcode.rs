/// Type tag discriminating the kinds a [`crate::TypedValue`] can hold.
///
/// The numeric assignments are part of the configuration-record format, so
/// they are stable: never reorder, only append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TCode {
    None = 0x00,
    I8 = 0x01,
    I16 = 0x02,
    I32 = 0x03,
    I64 = 0x04,
    U8 = 0x05,
    U16 = 0x06,
    U32 = 0x07,
    U64 = 0x08,
    F32 = 0x09,
    F64 = 0x0A,
    Bool = 0x0B,
    V3I32 = 0x0C,
    V3U32 = 0x0D,
    V3F32 = 0x0E,
    V3F64 = 0x0F,
    Str = 0x10,
    Bin = 0x11,
    Kvp = 0x12,
    Chain = 0x13,
    Uuid = 0x14,
    /// In-band marker for "no usable type": unrecognized tags in stored
    /// records and fields whose kind could not be determined.
    Invalid = 0xFF,
}

impl TCode {
    /// Decodes a stored tag byte. Bytes outside the table yield `None`;
    /// callers that want a total mapping fold that into [`TCode::Invalid`]
    /// with `from_u8(v).unwrap_or(TCode::Invalid)`.
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => TCode::None,
            0x01 => TCode::I8,
            0x02 => TCode::I16,
            0x03 => TCode::I32,
            0x04 => TCode::I64,
            0x05 => TCode::U8,
            0x06 => TCode::U16,
            0x07 => TCode::U32,
            0x08 => TCode::U64,
            0x09 => TCode::F32,
            0x0A => TCode::F64,
            0x0B => TCode::Bool,
            0x0C => TCode::V3I32,
            0x0D => TCode::V3U32,
            0x0E => TCode::V3F32,
            0x0F => TCode::V3F64,
            0x10 => TCode::Str,
            0x11 => TCode::Bin,
            0x12 => TCode::Kvp,
            0x13 => TCode::Chain,
            0x14 => TCode::Uuid,
            0xFF => TCode::Invalid,
            _ => return None,
        })
    }

    /// True for the scalar numeric kinds (not vectors, not bool).
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            TCode::I8
                | TCode::I16
                | TCode::I32
                | TCode::I64
                | TCode::U8
                | TCode::U16
                | TCode::U32
                | TCode::U64
                | TCode::F32
                | TCode::F64
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            TCode::None => "NONE",
            TCode::I8 => "INT8",
            TCode::I16 => "INT16",
            TCode::I32 => "INT32",
            TCode::I64 => "INT64",
            TCode::U8 => "UINT8",
            TCode::U16 => "UINT16",
            TCode::U32 => "UINT32",
            TCode::U64 => "UINT64",
            TCode::F32 => "FLOAT",
            TCode::F64 => "DOUBLE",
            TCode::Bool => "BOOL",
            TCode::V3I32 => "VEC3_INT32",
            TCode::V3U32 => "VEC3_UINT32",
            TCode::V3F32 => "VEC3_FLOAT",
            TCode::V3F64 => "VEC3_DOUBLE",
            TCode::Str => "STR",
            TCode::Bin => "BINARY",
            TCode::Kvp => "KVP",
            TCode::Chain => "BUFFER",
            TCode::Uuid => "UUID",
            TCode::Invalid => "INVALID",
        }
    }
}
