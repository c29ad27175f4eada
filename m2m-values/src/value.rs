use crate::error::ValueError;
use crate::kvp::KeyValuePair;
use crate::tcode::TCode;
use crate::vector::Vector3;
use m2m_buffers::BufferChain;
use uuid::Uuid;

/// A value of exactly one kind from the closed [`TCode`] set.
///
/// Conversions are explicit and conservative: a coercion succeeds only when
/// the destination kind can represent the source value exactly. Anything
/// else reports [`ValueError::TypeMismatch`] and leaves the value untouched.
/// The byte-container kinds (`Str`, `Bin`, `Chain`) convert among themselves
/// where the bytes permit; nothing converts to or from `Kvp` or `Uuid`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TypedValue {
    #[default]
    None,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    V3I32(Vector3<i32>),
    V3U32(Vector3<u32>),
    V3F32(Vector3<f32>),
    V3F64(Vector3<f64>),
    Str(String),
    Bin(Vec<u8>),
    Kvp(Box<KeyValuePair>),
    Chain(BufferChain),
    Uuid(Uuid),
}

impl TypedValue {
    pub fn tcode(&self) -> TCode {
        match self {
            TypedValue::None => TCode::None,
            TypedValue::Bool(_) => TCode::Bool,
            TypedValue::I8(_) => TCode::I8,
            TypedValue::I16(_) => TCode::I16,
            TypedValue::I32(_) => TCode::I32,
            TypedValue::I64(_) => TCode::I64,
            TypedValue::U8(_) => TCode::U8,
            TypedValue::U16(_) => TCode::U16,
            TypedValue::U32(_) => TCode::U32,
            TypedValue::U64(_) => TCode::U64,
            TypedValue::F32(_) => TCode::F32,
            TypedValue::F64(_) => TCode::F64,
            TypedValue::V3I32(_) => TCode::V3I32,
            TypedValue::V3U32(_) => TCode::V3U32,
            TypedValue::V3F32(_) => TCode::V3F32,
            TypedValue::V3F64(_) => TCode::V3F64,
            TypedValue::Str(_) => TCode::Str,
            TypedValue::Bin(_) => TCode::Bin,
            TypedValue::Kvp(_) => TCode::Kvp,
            TypedValue::Chain(_) => TCode::Chain,
            TypedValue::Uuid(_) => TCode::Uuid,
        }
    }

    fn mismatch(&self, to: TCode) -> ValueError {
        ValueError::TypeMismatch {
            from: self.tcode(),
            to,
        }
    }

    /// Integer view of the scalar kinds. Bools read as 0/1; floats qualify
    /// only when they carry an exact integer.
    fn integer_view(&self) -> Option<i128> {
        match *self {
            TypedValue::Bool(b) => Some(b as i128),
            TypedValue::I8(v) => Some(v as i128),
            TypedValue::I16(v) => Some(v as i128),
            TypedValue::I32(v) => Some(v as i128),
            TypedValue::I64(v) => Some(v as i128),
            TypedValue::U8(v) => Some(v as i128),
            TypedValue::U16(v) => Some(v as i128),
            TypedValue::U32(v) => Some(v as i128),
            TypedValue::U64(v) => Some(v as i128),
            TypedValue::F32(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i128),
            TypedValue::F64(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i128),
            _ => None,
        }
    }

    fn float_view(&self) -> Option<f64> {
        match *self {
            TypedValue::F32(v) => Some(v as f64),
            TypedValue::F64(v) => Some(v),
            _ => self.integer_view().and_then(|i| {
                let f = i as f64;
                if f as i128 == i {
                    Some(f)
                } else {
                    None
                }
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, ValueError> {
        match self {
            TypedValue::Bool(b) => Ok(*b),
            _ => self
                .integer_view()
                .map(|i| i != 0)
                .ok_or_else(|| self.mismatch(TCode::Bool)),
        }
    }

    pub fn as_i64(&self) -> Result<i64, ValueError> {
        self.integer_view()
            .and_then(|i| i64::try_from(i).ok())
            .ok_or_else(|| self.mismatch(TCode::I64))
    }

    pub fn as_u64(&self) -> Result<u64, ValueError> {
        self.integer_view()
            .and_then(|i| u64::try_from(i).ok())
            .ok_or_else(|| self.mismatch(TCode::U64))
    }

    pub fn as_f64(&self) -> Result<f64, ValueError> {
        self.float_view().ok_or_else(|| self.mismatch(TCode::F64))
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            TypedValue::Str(s) => Ok(s),
            _ => Err(self.mismatch(TCode::Str)),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], ValueError> {
        match self {
            TypedValue::Bin(b) => Ok(b),
            TypedValue::Str(s) => Ok(s.as_bytes()),
            _ => Err(self.mismatch(TCode::Bin)),
        }
    }

    pub fn as_kvp(&self) -> Result<&KeyValuePair, ValueError> {
        match self {
            TypedValue::Kvp(k) => Ok(k),
            _ => Err(self.mismatch(TCode::Kvp)),
        }
    }

    pub fn as_uuid(&self) -> Result<Uuid, ValueError> {
        match self {
            TypedValue::Uuid(u) => Ok(*u),
            _ => Err(self.mismatch(TCode::Uuid)),
        }
    }

    /// Attempts an in-place coercion to `to`. On failure the value is
    /// unchanged and the error names both kinds.
    pub fn convert_to_type(&mut self, to: TCode) -> Result<(), ValueError> {
        if self.tcode() == to {
            return Ok(());
        }
        let converted = self.converted(to)?;
        *self = converted;
        Ok(())
    }

    fn converted(&self, to: TCode) -> Result<TypedValue, ValueError> {
        let err = || self.mismatch(to);
        let int = self.integer_view();
        let exact = |_: std::num::TryFromIntError| err();
        Ok(match to {
            TCode::None => TypedValue::None,
            TCode::Bool => TypedValue::Bool(self.as_bool()?),
            TCode::I8 => TypedValue::I8(i8::try_from(int.ok_or_else(err)?).map_err(exact)?),
            TCode::I16 => TypedValue::I16(i16::try_from(int.ok_or_else(err)?).map_err(exact)?),
            TCode::I32 => TypedValue::I32(i32::try_from(int.ok_or_else(err)?).map_err(exact)?),
            TCode::I64 => TypedValue::I64(i64::try_from(int.ok_or_else(err)?).map_err(exact)?),
            TCode::U8 => TypedValue::U8(u8::try_from(int.ok_or_else(err)?).map_err(exact)?),
            TCode::U16 => TypedValue::U16(u16::try_from(int.ok_or_else(err)?).map_err(exact)?),
            TCode::U32 => TypedValue::U32(u32::try_from(int.ok_or_else(err)?).map_err(exact)?),
            TCode::U64 => TypedValue::U64(u64::try_from(int.ok_or_else(err)?).map_err(exact)?),
            TCode::F32 => {
                let f = self.float_view().ok_or_else(err)?;
                let narrowed = f as f32;
                if narrowed as f64 == f || f.is_nan() {
                    TypedValue::F32(narrowed)
                } else {
                    return Err(err());
                }
            }
            TCode::F64 => TypedValue::F64(self.float_view().ok_or_else(err)?),
            TCode::Str => match self {
                TypedValue::Bin(b) => TypedValue::Str(
                    String::from_utf8(b.clone()).map_err(|_| err())?,
                ),
                TypedValue::Chain(c) => TypedValue::Str(
                    String::from_utf8(c.clone().into_bytes()).map_err(|_| err())?,
                ),
                _ => return Err(err()),
            },
            TCode::Bin => match self {
                TypedValue::Str(s) => TypedValue::Bin(s.clone().into_bytes()),
                TypedValue::Chain(c) => TypedValue::Bin(c.clone().into_bytes()),
                _ => return Err(err()),
            },
            TCode::Chain => match self {
                TypedValue::Str(s) => TypedValue::Chain(BufferChain::from(s.as_str())),
                TypedValue::Bin(b) => TypedValue::Chain(BufferChain::from(b.clone())),
                _ => return Err(err()),
            },
            TCode::V3F64 => match *self {
                TypedValue::V3F32(v) => TypedValue::V3F64(Vector3::new(
                    v.x as f64,
                    v.y as f64,
                    v.z as f64,
                )),
                TypedValue::V3I32(v) => TypedValue::V3F64(Vector3::new(
                    v.x as f64,
                    v.y as f64,
                    v.z as f64,
                )),
                TypedValue::V3U32(v) => TypedValue::V3F64(Vector3::new(
                    v.x as f64,
                    v.y as f64,
                    v.z as f64,
                )),
                _ => return Err(err()),
            },
            TCode::V3I32
            | TCode::V3U32
            | TCode::V3F32
            | TCode::Kvp
            | TCode::Uuid
            | TCode::Invalid => return Err(err()),
        })
    }
}

impl From<bool> for TypedValue {
    fn from(v: bool) -> Self {
        TypedValue::Bool(v)
    }
}
impl From<i32> for TypedValue {
    fn from(v: i32) -> Self {
        TypedValue::I32(v)
    }
}
impl From<i64> for TypedValue {
    fn from(v: i64) -> Self {
        TypedValue::I64(v)
    }
}
impl From<u32> for TypedValue {
    fn from(v: u32) -> Self {
        TypedValue::U32(v)
    }
}
impl From<u64> for TypedValue {
    fn from(v: u64) -> Self {
        TypedValue::U64(v)
    }
}
impl From<f64> for TypedValue {
    fn from(v: f64) -> Self {
        TypedValue::F64(v)
    }
}
impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        TypedValue::Str(v.to_string())
    }
}
impl From<Vec<u8>> for TypedValue {
    fn from(v: Vec<u8>) -> Self {
        TypedValue::Bin(v)
    }
}
impl From<Uuid> for TypedValue {
    fn from(v: Uuid) -> Self {
        TypedValue::Uuid(v)
    }
}
impl From<KeyValuePair> for TypedValue {
    fn from(v: KeyValuePair) -> Self {
        TypedValue::Kvp(Box::new(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_conversions_succeed() {
        let mut v = TypedValue::U8(200);
        v.convert_to_type(TCode::U64).unwrap();
        assert_eq!(v, TypedValue::U64(200));
        v.convert_to_type(TCode::F64).unwrap();
        assert_eq!(v, TypedValue::F64(200.0));
    }

    #[test]
    fn narrowing_fails_when_out_of_range() {
        let mut v = TypedValue::I32(300);
        assert!(v.convert_to_type(TCode::I8).is_err());
        assert_eq!(v, TypedValue::I32(300), "failed conversions are no-ops");
        let mut fits = TypedValue::I32(-100);
        fits.convert_to_type(TCode::I8).unwrap();
        assert_eq!(fits, TypedValue::I8(-100));
    }

    #[test]
    fn signedness_is_respected() {
        let mut v = TypedValue::I16(-5);
        assert!(v.convert_to_type(TCode::U16).is_err());
        assert!(v.as_u64().is_err());
        assert_eq!(v.as_i64().unwrap(), -5);
    }

    #[test]
    fn float_integer_boundary() {
        let mut whole = TypedValue::F64(42.0);
        whole.convert_to_type(TCode::I32).unwrap();
        assert_eq!(whole, TypedValue::I32(42));
        let mut frac = TypedValue::F64(42.5);
        assert!(frac.convert_to_type(TCode::I32).is_err());
        let mut wide = TypedValue::F64(1.0000000001);
        assert!(wide.convert_to_type(TCode::F32).is_err());
    }

    #[test]
    fn byte_container_conversions() {
        let mut s = TypedValue::Str("abc".into());
        s.convert_to_type(TCode::Bin).unwrap();
        assert_eq!(s, TypedValue::Bin(b"abc".to_vec()));
        s.convert_to_type(TCode::Str).unwrap();
        assert_eq!(s.as_str().unwrap(), "abc");
        let mut bad = TypedValue::Bin(vec![0xFF, 0xFE]);
        assert!(bad.convert_to_type(TCode::Str).is_err());
    }

    #[test]
    fn bool_view_of_integers() {
        assert!(TypedValue::U8(1).as_bool().unwrap());
        assert!(!TypedValue::I64(0).as_bool().unwrap());
        assert!(TypedValue::Str("x".into()).as_bool().is_err());
    }

    #[test]
    fn invalid_is_a_dead_end_kind() {
        assert_eq!(TCode::from_u8(0xFF), Some(TCode::Invalid));
        assert_eq!(TCode::from_u8(0x60), None);
        assert_eq!(TCode::from_u8(0x60).unwrap_or(TCode::Invalid), TCode::Invalid);
        assert!(!TCode::Invalid.is_numeric());
        let mut v = TypedValue::I32(1);
        assert!(v.convert_to_type(TCode::Invalid).is_err());
        assert_eq!(v, TypedValue::I32(1));
    }

    #[test]
    fn vector_widening() {
        let mut v = TypedValue::V3I32(Vector3::new(1, 2, 3));
        v.convert_to_type(TCode::V3F64).unwrap();
        assert_eq!(v, TypedValue::V3F64(Vector3::new(1.0, 2.0, 3.0)));
    }
}
