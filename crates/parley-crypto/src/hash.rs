//! Hashing and canonical serialization

use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

/// Largest integer an f64 represents exactly (2^53)
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Compute SHA-256 hash of data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Serialize a JSON value into its canonical text form.
///
/// Object keys are sorted by byte order, no insignificant whitespace is
/// emitted, and numbers have one spelling: integral values print as
/// integers (so `1200000` and `1200000.0` agree), everything else uses the
/// shortest round-trip float form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Canonical serialization as bytes, the signing input for attested records
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    canonical_json(value).into_bytes()
}

/// SHA-256 over the canonical bytes of a value
pub fn canonical_digest(value: &Value) -> [u8; 32] {
    sha256(&canonical_bytes(value))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => write_string(s, out),
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
                write_string(key, out);
                out.push(':');
                if let Some(v) = map.get(key.as_str()) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
    }
}

fn canonical_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT => (f as i64).to_string(),
        _ => n.to_string(),
    }
}

fn write_string(s: &str, out: &mut String) {
    // Value's Display applies JSON escaping and cannot fail
    out.push_str(&Value::String(s.to_string()).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sha256() {
        let hash = sha256(b"abc");
        assert_eq!(
            hex::encode(hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_canonical_sorts_keys_recursively() {
        let value = json!({"b": 1, "a": {"d": [1, 2], "c": "x"}});
        assert_eq!(canonical_json(&value), r#"{"a":{"c":"x","d":[1,2]},"b":1}"#);
    }

    #[test]
    fn test_canonical_is_insertion_order_independent() {
        let a: Value = serde_json::from_str(r#"{"offer_amount": 1200000, "buyer": "Bob", "closing_days": 30}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"closing_days": 30, "offer_amount": 1200000, "buyer": "Bob"}"#).unwrap();

        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
        assert_eq!(canonical_digest(&a), canonical_digest(&b));
    }

    #[test]
    fn test_canonical_number_spelling() {
        let int_form: Value = serde_json::from_str(r#"{"amount": 1200000}"#).unwrap();
        let float_form: Value = serde_json::from_str(r#"{"amount": 1200000.0}"#).unwrap();
        assert_eq!(canonical_json(&int_form), canonical_json(&float_form));

        let fractional = json!({"rate": 0.25});
        assert_eq!(canonical_json(&fractional), r#"{"rate":0.25}"#);
    }

    #[test]
    fn test_canonical_escapes_strings() {
        let value = json!({"note": "line\n\"quoted\""});
        assert_eq!(canonical_json(&value), r#"{"note":"line\n\"quoted\""}"#);
    }
}
