//! Canonical JSON digest computation for audit payloads.
//!
//! Audit entry payload hashes must be reproducible by an independent
//! verifier, so the JSON body is canonicalized (object keys sorted by UTF-16
//! code unit order) before hashing.

use council_ledger::ChainDigest;

/// Recursively sort JSON object keys using UTF-16 code unit ordering.
fn sort_keys_utf16(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort_by(|a, b| {
                let a_utf16: Vec<u16> = a.encode_utf16().collect();
                let b_utf16: Vec<u16> = b.encode_utf16().collect();
                a_utf16.cmp(&b_utf16)
            });
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.to_string(), sort_keys_utf16(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_keys_utf16).collect())
        }
        other => other.clone(),
    }
}

/// SHA-256 digest of the canonical serialization of `value`.
pub fn canonical_digest(value: &serde_json::Value) -> ChainDigest {
    let canonical = sort_keys_utf16(value);
    ChainDigest::from_bytes(canonical.to_string().as_bytes())
}

/// Chain hash of one audit entry: `SHA256(prev_hash ∥ payload_hash ∥ sequence_no)`.
pub fn chain_hash(prev_hash: &ChainDigest, payload_hash: &ChainDigest, sequence_no: u64) -> ChainDigest {
    let mut material = Vec::with_capacity(148);
    material.extend_from_slice(prev_hash.as_str().as_bytes());
    material.extend_from_slice(payload_hash.as_str().as_bytes());
    material.extend_from_slice(sequence_no.to_string().as_bytes());
    ChainDigest::from_bytes(&material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_digest_is_key_order_independent() {
        let a = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let b = json!({"a": {"c": 3, "d": 2}, "b": 1});
        assert_eq!(canonical_digest(&a), canonical_digest(&b));
    }

    #[test]
    fn test_canonical_digest_differs_on_content() {
        let a = json!({"vote": "PASS"});
        let b = json!({"vote": "FAIL"});
        assert_ne!(canonical_digest(&a), canonical_digest(&b));
    }

    #[test]
    fn test_chain_hash_depends_on_all_inputs() {
        let payload = canonical_digest(&json!({"k": 1}));
        let h0 = chain_hash(&ChainDigest::genesis(), &payload, 0);
        let h1 = chain_hash(&ChainDigest::genesis(), &payload, 1);
        let h2 = chain_hash(&h0, &payload, 1);
        assert_ne!(h0, h1);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_chain_hash_is_deterministic() {
        let payload = canonical_digest(&json!({"event": "created"}));
        let a = chain_hash(&ChainDigest::genesis(), &payload, 0);
        let b = chain_hash(&ChainDigest::genesis(), &payload, 0);
        assert_eq!(a, b);
    }
}
