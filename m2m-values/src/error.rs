use crate::tcode::TCode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// A conversion that would lose essential information, or a read with
    /// the wrong type in mind.
    #[error("Cannot represent {from:?} as {to:?}")]
    TypeMismatch { from: TCode, to: TCode },
    #[error("No such key")]
    UnknownKey,
    #[error("Index out of range")]
    BadIndex,
    #[error("CBOR encode failed: {0}")]
    Encode(String),
    #[error("CBOR decode failed: {0}")]
    Decode(String),
    #[error("Record layout is malformed")]
    MalformedRecord,
}
