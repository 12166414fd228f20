//! Deterministic JSON serialization and content hashing.
//!
//! Every idempotency key in the pipeline is `sha256(canonical_json(payload))`,
//! so semantically identical payloads must hash identically regardless of
//! field order.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render a JSON value deterministically: object keys sorted, tight separators,
/// no trailing whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        // serde_json's own number/string rendering is already stable.
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            out.push_str(&serde_json::to_string(s).expect("string serialization is infallible"))
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(
                    &serde_json::to_string(key).expect("string serialization is infallible"),
                );
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
    }
}

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// SHA-256 of the canonical JSON representation of a value.
pub fn content_hash(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted() {
        let v = json!({"b": 1, "a": {"z": true, "m": null}});
        assert_eq!(canonical_json(&v), r#"{"a":{"m":null,"z":true},"b":1}"#);
    }

    #[test]
    fn field_order_does_not_change_hash() {
        let a: Value = serde_json::from_str(r#"{"name":"Acme","score":0.9}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"score":0.9,"name":"Acme"}"#).unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn arrays_preserve_order() {
        let a = json!([1, 2, 3]);
        let b = json!([3, 2, 1]);
        assert_ne!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn sha256_matches_known_vector() {
        // sha256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn strings_are_escaped() {
        let v = json!({"note": "line\nbreak \"quoted\""});
        assert_eq!(canonical_json(&v), r#"{"note":"line\nbreak \"quoted\""}"#);
    }
}
