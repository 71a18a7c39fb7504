//! AR-009: BLAKE3 fingerprints for pipeline artifacts and catalogs.

use serde::Serialize;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash the canonical JSON encoding of a value.
///
/// Two catalogs that differ only in file format (YAML vs JSON vs TOML) hash
/// the same.
pub fn hash_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    Ok(hash_string(&json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ar009_hash_string_format() {
        let h = hash_string("module x 'y' = {}");
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), "blake3:".len() + 64);
    }

    #[test]
    fn test_ar009_hash_deterministic() {
        assert_eq!(hash_string("abc"), hash_string("abc"));
        assert_ne!(hash_string("abc"), hash_string("abd"));
    }

    #[test]
    fn test_ar009_hash_json_matches_string() {
        let v = serde_json::json!({"a": 1});
        assert_eq!(hash_json(&v).unwrap(), hash_string(r#"{"a":1}"#));
    }
}
