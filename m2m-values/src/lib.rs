//! # m2m-values
//!
//! Dynamic typing for configuration and wire payloads: a tagged value cell
//! covering a closed set of kinds, an ordered (and optionally keyed) value
//! container, CBOR serialization for both, and the record types built on
//! them (identity and configuration records).
//!
//! Values are sum types, not trait objects: every conversion is an explicit
//! match arm returning a result, and lossy coercions fail rather than
//! corrupt.

pub mod cbor;
pub mod conf;
pub mod error;
pub mod identity;
pub mod kvp;
pub mod tcode;
pub mod value;
pub mod vector;

pub use conf::{ConfKeyDef, ConfRecord};
pub use error::ValueError;
pub use identity::{Identity, IdentityBody};
pub use kvp::KeyValuePair;
pub use tcode::TCode;
pub use value::TypedValue;
pub use vector::Vector3;
