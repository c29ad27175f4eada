use thiserror::Error;

/// Errors reported by [`crate::BufferChain`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Offset or window out of range")]
    OutOfRange,
}

/// Errors reported by [`crate::RingBuffer`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("Ring is full")]
    Full,
    #[error("Ring is empty")]
    Empty,
    #[error("Zero-element request against a non-empty ring")]
    ZeroRequest,
}

/// Errors reported by [`crate::MultiStringSearch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("Needle table is full")]
    TableFull,
    #[error("Empty needle")]
    EmptyNeedle,
}
