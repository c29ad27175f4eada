//! # m2m-buffers
//!
//! Foundation primitives for the m2m stack: a segmented byte buffer that can
//! be grown, carved and handed off without copying, a fixed-capacity ring
//! buffer, monotonic-time seams, and a multi-needle stream scanner.
//!
//! ## Architecture
//!
//! - **Zero-copy assembly**: [`BufferChain`] stores bytes as an ordered list
//!   of owned (or static-borrowed) segments. Appends and hand-offs move
//!   segments; only `collapse` concatenates.
//! - **Bounded queues**: [`RingBuffer`] is a lazily-allocated circular FIFO
//!   with an explicit count, used for route planning and work queues.
//! - **Injected clocks**: all timing goes through [`TimeProvider`] so tests
//!   can run on a manual clock.
//! - **Deterministic fallback RNG**: [`Pcg32`] stands in for the OS generator
//!   on targets without one.

pub mod chain;
pub mod error;
pub mod ring;
pub mod rng;
pub mod search;
pub mod timer;

pub use chain::{find_ignore_ascii_case, hex_dump_into, BufferChain, HexDump};
pub use error::{BufferError, RingError, SearchError};
pub use ring::RingBuffer;
pub use rng::Pcg32;
pub use search::{MultiStringSearch, SearchHit};
pub use timer::{ManualTimeProvider, PeriodicTimeout, Stopwatch, SystemTimeProvider, TimeProvider};
