//! JSON to `application/x-www-form-urlencoded` conversion for PUT bodies.
//!
//! Nested objects become bracketed keys (`user[name]=x`), arrays use their
//! index (`ids[0]=1`). `true`/`false` encode as `1`/`0`; `null` and empty
//! containers produce no pair.

use serde_json::Value;
use url::form_urlencoded::byte_serialize;

/// Form-encodes `body` when it is a JSON object or array.
///
/// Returns `None` for anything else, including bare JSON scalars, so the
/// caller forwards those bytes untouched.
pub fn encode_json_body(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<Value>(body).ok()? {
        value @ (Value::Object(_) | Value::Array(_)) => Some(build_query(&value)),
        _ => None,
    }
}

/// Serializes a JSON object or array as form pairs joined by `&`.
pub fn build_query(value: &Value) -> String {
    let mut pairs = Vec::new();

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                push_pairs(&mut pairs, key.clone(), child);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                push_pairs(&mut pairs, index.to_string(), child);
            }
        }
        _ => {}
    }

    pairs.join("&")
}

fn push_pairs(pairs: &mut Vec<String>, key: String, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => pairs.push(pair(&key, if *b { "1" } else { "0" })),
        Value::Number(n) => pairs.push(pair(&key, &n.to_string())),
        Value::String(s) => pairs.push(pair(&key, s)),
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                push_pairs(pairs, format!("{}[{}]", key, index), child);
            }
        }
        Value::Object(map) => {
            for (child_key, child) in map {
                push_pairs(pairs, format!("{}[{}]", key, child_key), child);
            }
        }
    }
}

fn pair(key: &str, value: &str) -> String {
    format!(
        "{}={}",
        byte_serialize(key.as_bytes()).collect::<String>(),
        byte_serialize(value.as_bytes()).collect::<String>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_object() {
        assert_eq!(encode_json_body(br#"{"qty":3}"#).as_deref(), Some("qty=3"));
        assert_eq!(
            encode_json_body(br#"{"name":"a b","ok":true,"gone":null,"no":false}"#).as_deref(),
            Some("name=a+b&ok=1&no=0")
        );
    }

    #[test]
    fn keeps_document_key_order() {
        assert_eq!(
            encode_json_body(br#"{"z":1,"a":2}"#).as_deref(),
            Some("z=1&a=2")
        );
    }

    #[test]
    fn nested_keys_are_bracketed_and_escaped() {
        assert_eq!(
            encode_json_body(br#"{"user":{"name":"x"},"ids":[4,5]}"#).as_deref(),
            Some("user%5Bname%5D=x&ids%5B0%5D=4&ids%5B1%5D=5")
        );
    }

    #[test]
    fn top_level_array_uses_indexes() {
        assert_eq!(encode_json_body(br#"["a","b"]"#).as_deref(), Some("0=a&1=b"));
    }

    #[test]
    fn scalars_and_invalid_json_are_not_encoded() {
        assert_eq!(encode_json_body(b"3"), None);
        assert_eq!(encode_json_body(br#""text""#), None);
        assert_eq!(encode_json_body(b"qty=3"), None);
        assert_eq!(encode_json_body(b""), None);
    }

    #[test]
    fn empty_containers_encode_to_nothing() {
        assert_eq!(encode_json_body(b"{}").as_deref(), Some(""));
        assert_eq!(encode_json_body(br#"{"a":[],"b":1}"#).as_deref(), Some("b=1"));
    }
}
