//! Bridge between [`TypedValue`]/[`KeyValuePair`] and CBOR, using
//! `ciborium`'s dynamic `Value` as the intermediate form.
//!
//! Wire mapping:
//! - scalars map to the natural CBOR kinds;
//! - binary blobs (and buffer chains) are byte strings;
//! - 3-vectors are 3-element arrays;
//! - nested containers are nested maps;
//! - UUIDs use CBOR tag 37.
//!
//! Decoding is permissive about widths: integers come back as `I64`/`U64`,
//! floats as `F64`, and numeric 3-arrays as `V3I32`/`V3F64`. Unknown map
//! keys are retained as ordinary entries.

use crate::error::ValueError;
use crate::kvp::KeyValuePair;
use crate::value::TypedValue;
use crate::vector::Vector3;
use ciborium::value::Value;
use uuid::Uuid;

const TAG_UUID: u64 = 37;

pub fn value_to_cbor(value: &TypedValue) -> Value {
    match value {
        TypedValue::None => Value::Null,
        TypedValue::Bool(b) => Value::Bool(*b),
        TypedValue::I8(v) => Value::Integer((*v as i64).into()),
        TypedValue::I16(v) => Value::Integer((*v as i64).into()),
        TypedValue::I32(v) => Value::Integer((*v as i64).into()),
        TypedValue::I64(v) => Value::Integer((*v).into()),
        TypedValue::U8(v) => Value::Integer((*v as u64).into()),
        TypedValue::U16(v) => Value::Integer((*v as u64).into()),
        TypedValue::U32(v) => Value::Integer((*v as u64).into()),
        TypedValue::U64(v) => Value::Integer((*v).into()),
        TypedValue::F32(v) => Value::Float(*v as f64),
        TypedValue::F64(v) => Value::Float(*v),
        TypedValue::V3I32(v) => int_array(&[v.x as i64, v.y as i64, v.z as i64]),
        TypedValue::V3U32(v) => int_array(&[v.x as i64, v.y as i64, v.z as i64]),
        TypedValue::V3F32(v) => float_array(&[v.x as f64, v.y as f64, v.z as f64]),
        TypedValue::V3F64(v) => float_array(&[v.x, v.y, v.z]),
        TypedValue::Str(s) => Value::Text(s.clone()),
        TypedValue::Bin(b) => Value::Bytes(b.clone()),
        TypedValue::Kvp(kvp) => kvp_to_cbor(kvp),
        TypedValue::Chain(c) => Value::Bytes(c.bytes().collect()),
        TypedValue::Uuid(u) => Value::Tag(TAG_UUID, Box::new(Value::Bytes(u.as_bytes().to_vec()))),
    }
}

fn int_array(vals: &[i64; 3]) -> Value {
    Value::Array(vals.iter().map(|&v| Value::Integer(v.into())).collect())
}

fn float_array(vals: &[f64; 3]) -> Value {
    Value::Array(vals.iter().map(|&v| Value::Float(v)).collect())
}

pub fn cbor_to_value(value: &Value) -> Result<TypedValue, ValueError> {
    Ok(match value {
        Value::Null => TypedValue::None,
        Value::Bool(b) => TypedValue::Bool(*b),
        Value::Integer(i) => {
            let wide: i128 = (*i).into();
            if let Ok(v) = i64::try_from(wide) {
                TypedValue::I64(v)
            } else if let Ok(v) = u64::try_from(wide) {
                TypedValue::U64(v)
            } else {
                return Err(ValueError::Decode("integer out of range".into()));
            }
        }
        Value::Float(f) => TypedValue::F64(*f),
        Value::Text(s) => TypedValue::Str(s.clone()),
        Value::Bytes(b) => TypedValue::Bin(b.clone()),
        Value::Tag(TAG_UUID, inner) => match inner.as_ref() {
            Value::Bytes(b) if b.len() == 16 => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(b);
                TypedValue::Uuid(Uuid::from_bytes(raw))
            }
            _ => return Err(ValueError::Decode("malformed UUID tag".into())),
        },
        Value::Array(items) if items.len() == 3 => decode_vector(items)?,
        Value::Map(pairs) => TypedValue::Kvp(Box::new(map_to_kvp(pairs)?)),
        other => {
            return Err(ValueError::Decode(format!(
                "unsupported CBOR shape: {other:?}"
            )))
        }
    })
}

fn decode_vector(items: &[Value]) -> Result<TypedValue, ValueError> {
    let mut ints = [0i64; 3];
    let mut all_int = true;
    let mut floats = [0f64; 3];
    for (slot, item) in items.iter().enumerate() {
        match item {
            Value::Integer(i) => {
                let wide: i128 = (*i).into();
                let v = i64::try_from(wide)
                    .map_err(|_| ValueError::Decode("vector element out of range".into()))?;
                ints[slot] = v;
                floats[slot] = v as f64;
            }
            Value::Float(f) => {
                all_int = false;
                floats[slot] = *f;
            }
            _ => return Err(ValueError::Decode("non-numeric 3-array".into())),
        }
    }
    if all_int {
        let fits_i32 = ints.iter().all(|&v| i32::try_from(v).is_ok());
        if fits_i32 {
            return Ok(TypedValue::V3I32(Vector3::new(
                ints[0] as i32,
                ints[1] as i32,
                ints[2] as i32,
            )));
        }
    }
    Ok(TypedValue::V3F64(Vector3::new(floats[0], floats[1], floats[2])))
}

pub fn kvp_to_cbor(kvp: &KeyValuePair) -> Value {
    let pairs = kvp
        .iter()
        .map(|(key, value)| {
            (
                Value::Text(key.unwrap_or("").to_string()),
                value_to_cbor(value),
            )
        })
        .collect();
    Value::Map(pairs)
}

pub fn map_to_kvp(pairs: &[(Value, Value)]) -> Result<KeyValuePair, ValueError> {
    let mut kvp = KeyValuePair::new();
    for (k, v) in pairs {
        let key = match k {
            Value::Text(s) => s.as_str(),
            _ => return Err(ValueError::Decode("non-text map key".into())),
        };
        let value = cbor_to_value(v)?;
        if key.is_empty() {
            kvp.append(value);
        } else {
            kvp.append_kv(key, value);
        }
    }
    Ok(kvp)
}

/// Encodes the whole chain as one CBOR map.
pub fn kvp_to_bytes(kvp: &KeyValuePair) -> Result<Vec<u8>, ValueError> {
    cbor_value_to_bytes(&kvp_to_cbor(kvp))
}

pub fn cbor_value_to_bytes(value: &Value) -> Result<Vec<u8>, ValueError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| ValueError::Encode(e.to_string()))?;
    Ok(out)
}

/// Consumes the next top-level CBOR value, which must be a map.
pub fn kvp_from_bytes(bytes: &[u8]) -> Result<KeyValuePair, ValueError> {
    let value = cbor_bytes_to_value(bytes)?;
    match value {
        Value::Map(pairs) => map_to_kvp(&pairs),
        _ => Err(ValueError::Decode("expected a top-level map".into())),
    }
}

pub fn cbor_bytes_to_value(bytes: &[u8]) -> Result<Value, ValueError> {
    ciborium::de::from_reader(bytes).map_err(|e| ValueError::Decode(e.to_string()))
}
