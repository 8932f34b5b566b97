//! JWT codec
//!
//! Encodes and verifies three-segment HS256 tokens:
//! `base64url(header) "." base64url(payload) "." base64url(hmac)`, no padding.
//!
//! The codec is time-agnostic. `decode` only proves that the header and payload
//! were signed with the shared secret; expiry is checked by the caller through
//! [`JwtPayload::check_time_bounds`].

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm written into every header
pub const ALGORITHM: &str = "HS256";

/// Claim carrying the authenticated user id
pub const UID_CLAIM: &str = "uid";

/// Numeric user identifier carried in the `uid` claim
pub type UserId = i64;

/// JWT errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    Encoding(String),

    #[error("Malformed token: {0}")]
    Malformed(&'static str),

    #[error("Token signature mismatch")]
    SignatureMismatch,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token expired")]
    Expired,

    #[error("Token not yet valid")]
    NotYetValid,

    #[error("Claim `{claim}` has type {found}, expected {expected}")]
    ClaimType {
        claim: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// Token header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    /// Signing algorithm
    #[serde(rename = "alg", default)]
    pub algorithm: String,
    /// Token type tag
    #[serde(rename = "typ", default)]
    pub token_type: String,
}

impl Default for JwtHeader {
    fn default() -> Self {
        Self {
            algorithm: ALGORITHM.to_string(),
            token_type: "JWT".to_string(),
        }
    }
}

/// Token payload
///
/// Registered claims are plain fields; everything application-defined lives in
/// `claims`, serialized under `ud`. `Map` keeps keys sorted, so encoding the same
/// payload twice yields the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtPayload {
    /// Token identifier
    #[serde(rename = "jti", default)]
    pub id: String,
    /// Issuer
    #[serde(rename = "iss", default)]
    pub issuer: String,
    /// Audience
    #[serde(rename = "aud", default)]
    pub audience: String,
    /// Subject
    #[serde(rename = "sub", default)]
    pub subject: String,
    /// Issued at (Unix seconds)
    #[serde(rename = "iat", default)]
    pub issued_at: i64,
    /// Not valid before (Unix seconds)
    #[serde(rename = "nbf", default)]
    pub not_before: i64,
    /// Expiration (Unix seconds)
    #[serde(rename = "exp", default)]
    pub expiration: i64,
    /// Application-defined claims
    #[serde(rename = "ud", default)]
    pub claims: Map<String, Value>,
}

impl JwtPayload {
    /// Add an application claim
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Look up an application claim
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Extract the `uid` claim.
    ///
    /// Returns `Ok(None)` when the claim is absent. Integral numbers are
    /// accepted (including `42.0`); any other shape is a [`JwtError::ClaimType`].
    pub fn user_id(&self) -> Result<Option<UserId>, JwtError> {
        let Some(value) = self.claims.get(UID_CLAIM) else {
            return Ok(None);
        };

        let wrong_type = |found| JwtError::ClaimType {
            claim: UID_CLAIM,
            expected: "integer",
            found,
        };

        match value {
            Value::Number(number) => {
                if let Some(id) = number.as_i64() {
                    return Ok(Some(id));
                }
                let in_range = |f: f64| f >= i64::MIN as f64 && f < i64::MAX as f64;
                match number.as_f64() {
                    Some(f) if f.fract() == 0.0 && in_range(f) => Ok(Some(f as i64)),
                    _ => Err(wrong_type("non-integral number")),
                }
            }
            other => Err(wrong_type(json_type_name(other))),
        }
    }

    /// Check `nbf`/`exp` against `now` (Unix seconds)
    pub fn check_time_bounds(&self, now: i64) -> Result<(), JwtError> {
        if now >= self.expiration {
            return Err(JwtError::Expired);
        }
        if now < self.not_before {
            return Err(JwtError::NotYetValid);
        }
        Ok(())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mac_for(secret: &str, header_segment: &str, payload_segment: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(header_segment.as_bytes());
    mac.update(b".");
    mac.update(payload_segment.as_bytes());
    Some(mac)
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, JwtError> {
    let bytes = serde_json::to_vec(value).map_err(|e| JwtError::Encoding(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn decode_segment<T: DeserializeOwned>(segment: &str, what: &'static str) -> Result<T, JwtError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| JwtError::Malformed(what))?;
    serde_json::from_slice(&bytes).map_err(|_| JwtError::Malformed(what))
}

/// Sign a header and payload into a token string
pub fn encode(header: &JwtHeader, payload: &JwtPayload, secret: &str) -> Result<String, JwtError> {
    let header_segment = encode_segment(header)?;
    let payload_segment = encode_segment(payload)?;

    let mac = mac_for(secret, &header_segment, &payload_segment)
        .ok_or_else(|| JwtError::Encoding("invalid signing key".to_string()))?;
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{header_segment}.{payload_segment}.{signature}"))
}

/// Verify a token's signature and parse its header and payload.
///
/// The MAC is checked in constant time before either JSON segment is parsed.
/// Time bounds are not checked here.
pub fn decode(token: &str, secret: &str) -> Result<(JwtHeader, JwtPayload), JwtError> {
    let mut segments = token.split('.');
    let (Some(header_segment), Some(payload_segment), Some(signature_segment), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(JwtError::Malformed("expected three segments"));
    };

    if header_segment.is_empty() || payload_segment.is_empty() || signature_segment.is_empty() {
        return Err(JwtError::Malformed("empty segment"));
    }

    // A signature that does not even decode can never match.
    let signature = URL_SAFE_NO_PAD
        .decode(signature_segment)
        .map_err(|_| JwtError::SignatureMismatch)?;

    mac_for(secret, header_segment, payload_segment)
        .ok_or(JwtError::SignatureMismatch)?
        .verify_slice(&signature)
        .map_err(|_| JwtError::SignatureMismatch)?;

    let header = decode_segment(header_segment, "header")?;
    let payload = decode_segment(payload_segment, "payload")?;

    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test_secret_key_for_testing_only";

    fn sample_payload() -> JwtPayload {
        JwtPayload {
            id: "rj4t49tu49".to_string(),
            issuer: "blog".to_string(),
            audience: "readers".to_string(),
            subject: "42".to_string(),
            issued_at: 1_700_000_000,
            not_before: 1_700_000_000,
            expiration: 1_700_007_200,
            claims: Map::new(),
        }
        .with_claim("uid", 42)
        .with_claim("name", "大乔乔")
        .with_claim("roles", json!(["author", "editor"]))
    }

    fn replace_char(token: &str, index: usize) -> String {
        let mut bytes = token.as_bytes().to_vec();
        bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
        String::from_utf8(bytes).unwrap()
    }

    // ========================================================================
    // Encode / Decode
    // ========================================================================

    #[test]
    fn test_round_trip() {
        let header = JwtHeader::default();
        let payload = sample_payload();

        let token = encode(&header, &payload, SECRET).unwrap();
        let (decoded_header, decoded_payload) = decode(&token, SECRET).unwrap();

        assert_eq!(decoded_header, header);
        assert_eq!(decoded_payload, payload);
    }

    #[test]
    fn test_round_trip_empty_claims() {
        let header = JwtHeader::default();
        let payload = JwtPayload::default();

        let token = encode(&header, &payload, SECRET).unwrap();
        let (_, decoded) = decode(&token, SECRET).unwrap();

        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_token_shape() {
        let token = encode(&JwtHeader::default(), &sample_payload(), SECRET).unwrap();

        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        // {"alg":"HS256","typ":"JWT"}
        assert_eq!(segments[0], "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9");
        // 32-byte digest without padding
        assert_eq!(segments[2].len(), 43);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let first = encode(&JwtHeader::default(), &sample_payload(), SECRET).unwrap();
        let second = encode(&JwtHeader::default(), &sample_payload(), SECRET).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_flipping_any_signature_byte_fails() {
        let token = encode(&JwtHeader::default(), &sample_payload(), SECRET).unwrap();
        let signature_start = token.rfind('.').unwrap() + 1;

        for index in signature_start..token.len() {
            let tampered = replace_char(&token, index);
            assert_eq!(
                decode(&tampered, SECRET),
                Err(JwtError::SignatureMismatch),
                "byte {} of the signature was not detected",
                index
            );
        }
    }

    #[test]
    fn test_tampered_payload_fails() {
        let token = encode(&JwtHeader::default(), &sample_payload(), SECRET).unwrap();
        let payload_index = token.find('.').unwrap() + 5;

        let tampered = replace_char(&token, payload_index);
        assert_eq!(decode(&tampered, SECRET), Err(JwtError::SignatureMismatch));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let token = encode(&JwtHeader::default(), &sample_payload(), "secret_one").unwrap();
        assert_eq!(decode(&token, "secret_two"), Err(JwtError::SignatureMismatch));
    }

    #[test]
    fn test_malformed_segment_counts() {
        assert_eq!(
            decode("not-a-token", SECRET),
            Err(JwtError::Malformed("expected three segments"))
        );
        assert_eq!(
            decode("a.b", SECRET),
            Err(JwtError::Malformed("expected three segments"))
        );
        assert_eq!(
            decode("a.b.c.d", SECRET),
            Err(JwtError::Malformed("expected three segments"))
        );
        assert_eq!(decode("a..c", SECRET), Err(JwtError::Malformed("empty segment")));
        assert_eq!(decode("", SECRET), Err(JwtError::Malformed("expected three segments")));
    }

    #[test]
    fn test_signed_garbage_payload_is_malformed() {
        let header_segment = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload_segment = URL_SAFE_NO_PAD.encode(b"not json at all");
        let mac = mac_for(SECRET, &header_segment, &payload_segment).unwrap();
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        let token = format!("{header_segment}.{payload_segment}.{signature}");

        assert_eq!(decode(&token, SECRET), Err(JwtError::Malformed("payload")));
    }

    #[test]
    fn test_signed_invalid_base64_header_is_malformed() {
        let header_segment = "!!!";
        let payload_segment = URL_SAFE_NO_PAD.encode(b"{}");
        let mac = mac_for(SECRET, header_segment, &payload_segment).unwrap();
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        let token = format!("{header_segment}.{payload_segment}.{signature}");

        assert_eq!(decode(&token, SECRET), Err(JwtError::Malformed("header")));
    }

    #[test]
    fn test_expired_token_still_decodes() {
        let payload = JwtPayload {
            expiration: 1,
            ..sample_payload()
        };
        let token = encode(&JwtHeader::default(), &payload, SECRET).unwrap();

        let (_, decoded) = decode(&token, SECRET).unwrap();
        assert_eq!(decoded.check_time_bounds(1_700_000_000), Err(JwtError::Expired));
    }

    // ========================================================================
    // Time Bounds
    // ========================================================================

    #[test]
    fn test_check_time_bounds() {
        let payload = sample_payload();

        assert_eq!(payload.check_time_bounds(1_700_000_000), Ok(()));
        assert_eq!(payload.check_time_bounds(1_700_007_199), Ok(()));
        assert_eq!(payload.check_time_bounds(1_700_007_200), Err(JwtError::Expired));
        assert_eq!(payload.check_time_bounds(1_699_999_999), Err(JwtError::NotYetValid));
    }

    #[test]
    fn test_missing_expiration_is_expired() {
        let payload = JwtPayload::default();
        assert_eq!(payload.check_time_bounds(1_700_000_000), Err(JwtError::Expired));
    }

    // ========================================================================
    // Claims
    // ========================================================================

    #[test]
    fn test_user_id_integer() {
        let payload = JwtPayload::default().with_claim("uid", 123);
        assert_eq!(payload.user_id(), Ok(Some(123)));
    }

    #[test]
    fn test_user_id_integral_float() {
        let payload = JwtPayload::default().with_claim("uid", 77.0);
        assert_eq!(payload.user_id(), Ok(Some(77)));
    }

    #[test]
    fn test_user_id_missing() {
        let payload = JwtPayload::default().with_claim("name", "tester");
        assert_eq!(payload.user_id(), Ok(None));
    }

    #[test]
    fn test_user_id_string_is_claim_type_error() {
        let payload = JwtPayload::default().with_claim("uid", "123");
        assert_eq!(
            payload.user_id(),
            Err(JwtError::ClaimType {
                claim: "uid",
                expected: "integer",
                found: "string",
            })
        );
    }

    #[test]
    fn test_user_id_other_shapes_are_claim_type_errors() {
        for value in [json!(null), json!(true), json!([1]), json!({"id": 1}), json!(1.5)] {
            let payload = JwtPayload::default().with_claim("uid", value.clone());
            assert!(
                matches!(payload.user_id(), Err(JwtError::ClaimType { .. })),
                "{} should be rejected",
                value
            );
        }
    }

    #[test]
    fn test_user_id_out_of_range() {
        let payload = JwtPayload::default().with_claim("uid", u64::MAX);
        assert!(matches!(payload.user_id(), Err(JwtError::ClaimType { .. })));
    }

    // ========================================================================
    // Wire Compatibility
    // ========================================================================

    #[test]
    fn test_tokens_verify_with_jsonwebtoken() {
        let now = chrono::Utc::now().timestamp();
        let payload = JwtPayload {
            issuer: "blog".to_string(),
            audience: "blog".to_string(),
            issued_at: now,
            not_before: now,
            expiration: now + 3600,
            ..Default::default()
        }
        .with_claim("uid", 9);
        let token = encode(&JwtHeader::default(), &payload, SECRET).unwrap();

        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_audience(&["blog"]);
        let data = jsonwebtoken::decode::<Value>(
            &token,
            &jsonwebtoken::DecodingKey::from_secret(SECRET.as_bytes()),
            &validation,
        )
        .unwrap();

        assert_eq!(data.claims["ud"]["uid"], json!(9));
        assert_eq!(data.claims["iss"], json!("blog"));
    }

    #[test]
    fn test_decodes_tokens_from_jsonwebtoken() {
        let claims = json!({
            "iss": "blog",
            "exp": 4_102_444_800_i64,
            "ud": { "uid": 5 }
        });
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let (header, payload) = decode(&token, SECRET).unwrap();
        assert_eq!(header.algorithm, "HS256");
        assert_eq!(payload.issuer, "blog");
        assert_eq!(payload.user_id(), Ok(Some(5)));
    }

    #[test]
    fn test_jwt_error_display() {
        assert_eq!(JwtError::Expired.to_string(), "Token expired");
        assert_eq!(
            JwtError::SignatureMismatch.to_string(),
            "Token signature mismatch"
        );
        assert_eq!(
            JwtError::Malformed("header").to_string(),
            "Malformed token: header"
        );
    }
}
