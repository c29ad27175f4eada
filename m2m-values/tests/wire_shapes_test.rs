//! Wire-shape checks against raw CBOR, so encoding changes that would break
//! peers show up as test failures rather than interop incidents.

use m2m_values::{cbor, KeyValuePair, TypedValue, Vector3};

#[test]
fn map_header_and_text_keys() {
    let mut kvp = KeyValuePair::new();
    kvp.append_kv("a", 1i64);
    let bytes = cbor::kvp_to_bytes(&kvp).unwrap();
    // 0xA1: map of 1 pair; 0x61 'a': 1-char text key; 0x01: integer 1.
    assert_eq!(bytes, vec![0xA1, 0x61, b'a', 0x01]);
}

#[test]
fn blobs_are_byte_strings() {
    let mut kvp = KeyValuePair::new();
    kvp.append_kv("b", vec![0xDEu8, 0xAD]);
    let bytes = cbor::kvp_to_bytes(&kvp).unwrap();
    assert_eq!(bytes, vec![0xA1, 0x61, b'b', 0x42, 0xDE, 0xAD]);
}

#[test]
fn vectors_are_three_element_arrays() {
    let mut kvp = KeyValuePair::new();
    kvp.append_kv("v", TypedValue::V3I32(Vector3::new(1, 2, 3)));
    let bytes = cbor::kvp_to_bytes(&kvp).unwrap();
    assert_eq!(bytes, vec![0xA1, 0x61, b'v', 0x83, 0x01, 0x02, 0x03]);
}

#[test]
fn nested_containers_are_nested_maps() {
    let mut inner = KeyValuePair::new();
    inner.append_kv("x", 0i64);
    let mut outer = KeyValuePair::new();
    outer.append_kv("n", inner);
    let bytes = cbor::kvp_to_bytes(&outer).unwrap();
    assert_eq!(
        bytes,
        vec![0xA1, 0x61, b'n', 0xA1, 0x61, b'x', 0x00]
    );
}

#[test]
fn unknown_keys_are_retained_on_decode() {
    // A peer speaking a newer dialect sends a key we do not know.
    let mut kvp = KeyValuePair::new();
    kvp.append_kv("known", 1i64);
    kvp.append_kv("from_the_future", "?");
    let bytes = cbor::kvp_to_bytes(&kvp).unwrap();
    let back = KeyValuePair::unserialize(&bytes).unwrap();
    assert_eq!(back.count(), 2);
    assert_eq!(
        back.retrieve_by_key("from_the_future").unwrap().as_str().unwrap(),
        "?"
    );
}
