use crate::cbor;
use crate::error::ValueError;
use crate::kvp::KeyValuePair;
use crate::tcode::TCode;
use crate::value::TypedValue;
use ciborium::value::Value;

/// One allowed key of a configuration record, with its required kind.
#[derive(Debug, Clone, Copy)]
pub struct ConfKeyDef {
    pub key: &'static str,
    pub tcode: TCode,
}

impl ConfKeyDef {
    pub const fn new(key: &'static str, tcode: TCode) -> Self {
        Self { key, tcode }
    }
}

const RECORD_TYPE: &str = "conf";
const RECORD_VERSION: i64 = 1;

/// A named configuration record over a key-validated [`KeyValuePair`].
///
/// Persisted as a CBOR 2-entry map: a record header, then
/// `{list-name: {key: value, ...}}`. Writes validate the key against the
/// definition table and coerce the value to the declared kind; loads drop
/// unknown keys and entries that cannot be coerced, counting what was lost.
#[derive(Debug, Clone)]
pub struct ConfRecord {
    list_name: String,
    defs: &'static [ConfKeyDef],
    values: KeyValuePair,
    dropped: u32,
}

impl ConfRecord {
    pub fn new(list_name: &str, defs: &'static [ConfKeyDef]) -> Self {
        Self {
            list_name: list_name.to_string(),
            defs,
            values: KeyValuePair::new(),
            dropped: 0,
        }
    }

    pub fn list_name(&self) -> &str {
        &self.list_name
    }

    pub fn count(&self) -> usize {
        self.values.count()
    }

    /// Entries discarded by the last load: unknown keys plus uncoercible
    /// values.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    fn def_for(&self, key: &str) -> Option<&ConfKeyDef> {
        self.defs.iter().find(|d| d.key == key)
    }

    /// Stores `value` under `key`, coercing to the declared kind. Unknown
    /// keys and lossy coercions are errors; the record keeps one entry per
    /// key.
    pub fn set(&mut self, key: &str, value: impl Into<TypedValue>) -> Result<(), ValueError> {
        let def = self.def_for(key).ok_or(ValueError::UnknownKey)?;
        let mut value = value.into();
        value.convert_to_type(def.tcode)?;
        self.values.set(def.key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&TypedValue> {
        self.values.retrieve_by_key(key)
    }

    pub fn values(&self) -> &KeyValuePair {
        &self.values
    }

    /// Serializes the record to its persisted CBOR form.
    pub fn serialize(&self) -> Result<Vec<u8>, ValueError> {
        let mut header = KeyValuePair::new();
        header.append_kv("type", RECORD_TYPE);
        header.append_kv("ver", RECORD_VERSION);
        let outer = Value::Map(vec![
            (Value::Text("hdr".into()), cbor::kvp_to_cbor(&header)),
            (
                Value::Text(self.list_name.clone()),
                cbor::kvp_to_cbor(&self.values),
            ),
        ]);
        cbor::cbor_value_to_bytes(&outer)
    }

    /// Loads a record persisted by [`ConfRecord::serialize`], validating
    /// every entry against `defs`.
    pub fn deserialize(bytes: &[u8], defs: &'static [ConfKeyDef]) -> Result<Self, ValueError> {
        let outer = match cbor::cbor_bytes_to_value(bytes)? {
            Value::Map(pairs) => pairs,
            _ => return Err(ValueError::MalformedRecord),
        };
        if outer.len() != 2 {
            return Err(ValueError::MalformedRecord);
        }
        let header = match &outer[0] {
            (Value::Text(k), Value::Map(hdr)) if k.as_str() == "hdr" => cbor::map_to_kvp(hdr)?,
            _ => return Err(ValueError::MalformedRecord),
        };
        match header.retrieve_by_key("type") {
            Some(TypedValue::Str(t)) if t.as_str() == RECORD_TYPE => {}
            _ => return Err(ValueError::MalformedRecord),
        }
        let (list_name, body) = match &outer[1] {
            (Value::Text(name), Value::Map(body)) => (name.clone(), cbor::map_to_kvp(body)?),
            _ => return Err(ValueError::MalformedRecord),
        };

        let mut record = Self {
            list_name,
            defs,
            values: KeyValuePair::new(),
            dropped: 0,
        };
        for (key, value) in body.iter() {
            let def = key.and_then(|k| record.defs.iter().find(|d| d.key == k));
            match def {
                Some(def) => {
                    let mut value = value.clone();
                    if value.convert_to_type(def.tcode).is_ok() {
                        record.values.set(def.key, value);
                    } else {
                        record.dropped += 1;
                    }
                }
                None => record.dropped += 1,
            }
        }
        Ok(record)
    }
}
