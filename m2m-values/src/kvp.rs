use crate::cbor;
use crate::error::ValueError;
use crate::value::TypedValue;
use m2m_buffers::BufferChain;

/// One entry: an optional key and a value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KvpEntry {
    key: Option<String>,
    value: TypedValue,
}

impl KvpEntry {
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn value(&self) -> &TypedValue {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut TypedValue {
        &mut self.value
    }
}

/// An ordered list of typed values, each with an optional string key.
///
/// Keys may repeat; lookup by key returns the first match in insertion
/// order, and lookup by index addresses that order directly. Consumers that
/// want map-like uniqueness de-duplicate on insert (see
/// [`KeyValuePair::set`]). The container is kept flat: for the entry counts
/// configuration and wire payloads see, a linear scan over a contiguous
/// vector wins over anything pointer-chased.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyValuePair {
    entries: Vec<KvpEntry>,
}

impl KeyValuePair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a keyless value. Returns the new entry's index.
    pub fn append(&mut self, value: impl Into<TypedValue>) -> usize {
        self.entries.push(KvpEntry {
            key: None,
            value: value.into(),
        });
        self.entries.len() - 1
    }

    /// Appends a keyed value. Duplicate keys are allowed.
    pub fn append_kv(&mut self, key: &str, value: impl Into<TypedValue>) -> usize {
        self.entries.push(KvpEntry {
            key: Some(key.to_string()),
            value: value.into(),
        });
        self.entries.len() - 1
    }

    /// Replaces the first entry with `key`, or appends one. This is the
    /// de-duplicating insert for callers that want map semantics.
    pub fn set(&mut self, key: &str, value: impl Into<TypedValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|e| e.key.as_deref() == Some(key)) {
            Some(entry) => entry.value = value,
            None => {
                self.append_kv(key, value);
            }
        }
    }

    /// First entry whose key equals `key` by case-sensitive byte match.
    pub fn retrieve_by_key(&self, key: &str) -> Option<&TypedValue> {
        self.entries
            .iter()
            .find(|e| e.key.as_deref() == Some(key))
            .map(|e| &e.value)
    }

    pub fn retrieve_by_key_mut(&mut self, key: &str) -> Option<&mut TypedValue> {
        self.entries
            .iter_mut()
            .find(|e| e.key.as_deref() == Some(key))
            .map(|e| &mut e.value)
    }

    /// Copy of the value under `key`, or an error naming the failure.
    pub fn value_with_key(&self, key: &str) -> Result<TypedValue, ValueError> {
        self.retrieve_by_key(key)
            .cloned()
            .ok_or(ValueError::UnknownKey)
    }

    /// Copy of the value at insertion index `i`.
    pub fn value_with_idx(&self, i: usize) -> Result<TypedValue, ValueError> {
        self.entries
            .get(i)
            .map(|e| e.value.clone())
            .ok_or(ValueError::BadIndex)
    }

    pub fn entry(&self, i: usize) -> Option<&KvpEntry> {
        self.entries.get(i)
    }

    pub fn key_at(&self, i: usize) -> Option<&str> {
        self.entries.get(i).and_then(|e| e.key.as_deref())
    }

    /// Removes the first entry with `key`. Returns its value.
    pub fn remove_by_key(&mut self, key: &str) -> Option<TypedValue> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.key.as_deref() == Some(key))?;
        Some(self.entries.remove(idx).value)
    }

    /// Appends each present key as one segment of `out`.
    pub fn collect_keys(&self, out: &mut BufferChain) {
        for e in &self.entries {
            if let Some(k) = &e.key {
                out.append(k.as_bytes());
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Option<&str>, &TypedValue)> {
        self.entries.iter().map(|e| (e.key.as_deref(), &e.value))
    }

    /// Serializes the whole chain as a CBOR map into `out`.
    pub fn serialize(&self, out: &mut BufferChain) -> Result<(), ValueError> {
        let bytes = cbor::kvp_to_bytes(self)?;
        out.append_vec(bytes);
        Ok(())
    }

    /// Consumes one top-level CBOR map and reconstructs the chain.
    pub fn unserialize(bytes: &[u8]) -> Result<Self, ValueError> {
        cbor::kvp_from_bytes(bytes)
    }
}

impl FromIterator<(String, TypedValue)> for KeyValuePair {
    fn from_iter<T: IntoIterator<Item = (String, TypedValue)>>(iter: T) -> Self {
        let mut kvp = KeyValuePair::new();
        for (k, v) in iter {
            kvp.append_kv(&k, v);
        }
        kvp
    }
}
