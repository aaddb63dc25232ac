//! Request signing for provider contracts.
//!
//! Field order and separators are fixed by each provider and must not change.

use sha2::{Digest, Sha256, Sha512};

/// Lowercase hex SHA-256 of the UTF-8 bytes of `data`.
pub fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Lowercase hex SHA-512 of the UTF-8 bytes of `data`.
pub fn sha512_hex(data: &str) -> String {
    hex::encode(Sha512::digest(data.as_bytes()))
}

/// Inicis approval `signature`: `authToken=..&timestamp=..`.
pub fn inicis_signature(auth_token: &str, timestamp: &str) -> String {
    sha256_hex(&format!("authToken={}&timestamp={}", auth_token, timestamp))
}

/// Inicis approval `verification`: `authToken=..&signKey=..&timestamp=..`.
pub fn inicis_verification(auth_token: &str, sign_key: &str, timestamp: &str) -> String {
    sha256_hex(&format!(
        "authToken={}&signKey={}&timestamp={}",
        auth_token, sign_key, timestamp
    ))
}

/// Inicis refund `hashData`: plain concatenation `apiKey + mid + type + timestamp + data`.
pub fn inicis_refund_hash(
    api_key: &str,
    mid: &str,
    kind: &str,
    timestamp: &str,
    data_json: &str,
) -> String {
    let mut target = String::with_capacity(
        api_key.len() + mid.len() + kind.len() + timestamp.len() + data_json.len(),
    );
    target.push_str(api_key);
    target.push_str(mid);
    target.push_str(kind);
    target.push_str(timestamp);
    target.push_str(data_json);
    sha512_hex(&target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha512_known_vector() {
        assert_eq!(
            sha512_hex("abc"),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn test_inicis_signature_field_order() {
        assert_eq!(
            inicis_signature("tok", "1700000000000"),
            sha256_hex("authToken=tok&timestamp=1700000000000")
        );
        assert_eq!(
            inicis_verification("tok", "key", "1700000000000"),
            sha256_hex("authToken=tok&signKey=key&timestamp=1700000000000")
        );
    }

    #[test]
    fn test_refund_hash_is_plain_concatenation() {
        let data = r#"{"msg":"cancel","tid":"T1"}"#;
        assert_eq!(
            inicis_refund_hash("api", "mid", "refund", "20240101120000", data),
            sha512_hex(&format!("apimidrefund20240101120000{}", data))
        );
    }
}
