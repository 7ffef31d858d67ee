// Bearer credential decoding
// Turns an `Authorization` header value into the claims used to authorize and route a call.
// The signature is NOT verified here, that is the job of the trust verification layer
// which receives these claims together with the raw token.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

const BEARER_SCHEME: &str = "Bearer";
const DID_ORGID_PREFIX: &str = "did:orgid:";

static ISSUER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<did>did:orgid:(?:[0-9A-Za-z]+:)?0x[0-9a-fA-F]{64})(?:#(?P<fragment>\w+))?$")
        .expect("issuer regex is valid")
});

static DID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^did:orgid:(?:[0-9]+:)?(?P<orgid>[0-9A-Za-z]+)(?:#.*)?$")
        .expect("did regex is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Missing or invalid bearer token")]
    MalformedAuthHeader,

    #[error("Cannot decode JWT token: {0}")]
    InvalidToken(String),

    #[error("Invalid issuer format: {0}")]
    InvalidIssuerFormat(String),

    #[error("Invalid ORGiD: {0}")]
    InvalidOrgId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub issuer_did: String,
    pub issuer_key_fragment: Option<String>,
    pub audience: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

#[derive(Deserialize)]
struct RawClaims {
    iss: String,
    aud: Audience,
    // NumericDate, may carry a fraction of a second
    exp: f64,
}

// Decodes `Bearer <jwt>` into Claims.
// Deterministic for a given header value; nothing is cached and nothing is retried.
pub fn decode_bearer_token(header_value: &str) -> Result<Claims, CredentialError> {
    let token = extract_token(header_value)?;
    let raw = decode_claims(token)?;
    let (issuer_did, issuer_key_fragment) = parse_issuer(&raw.iss)?;

    let audience = match raw.aud {
        Audience::One(audience) => audience,
        Audience::Many(audiences) => audiences
            .into_iter()
            .next()
            .ok_or_else(|| CredentialError::InvalidToken("empty audience".to_string()))?,
    };

    let expiry = numeric_date(raw.exp)
        .ok_or_else(|| CredentialError::InvalidToken(format!("exp out of range: {}", raw.exp)))?;

    Ok(Claims {
        issuer_did,
        issuer_key_fragment,
        audience,
        expiry,
    })
}

// Whole seconds since the epoch, fractions are truncated
fn numeric_date(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() || seconds.abs() >= i64::MAX as f64 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(seconds.trunc() as i64, 0)
}

// Exactly one scheme and one token separated by a single space
fn extract_token(header_value: &str) -> Result<&str, CredentialError> {
    let mut parts = header_value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(CredentialError::MalformedAuthHeader),
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, CredentialError> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| CredentialError::InvalidToken(format!("base64 decode failed: {}", e)))
}

fn decode_claims(token: &str) -> Result<RawClaims, CredentialError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(CredentialError::InvalidToken(
            "JWT must have 3 parts".to_string(),
        ));
    }

    let header: serde_json::Value = serde_json::from_slice(&decode_segment(segments[0])?)
        .map_err(|e| CredentialError::InvalidToken(format!("header JSON parse failed: {}", e)))?;
    if !header.is_object() {
        return Err(CredentialError::InvalidToken(
            "header is not a JSON object".to_string(),
        ));
    }

    serde_json::from_slice(&decode_segment(segments[1])?)
        .map_err(|e| CredentialError::InvalidToken(format!("claims JSON parse failed: {}", e)))
}

// `<did>[#<fragment>]`
fn parse_issuer(issuer: &str) -> Result<(String, Option<String>), CredentialError> {
    let captures = ISSUER_REGEX
        .captures(issuer)
        .ok_or_else(|| CredentialError::InvalidIssuerFormat(issuer.to_string()))?;
    let did = captures
        .name("did")
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| CredentialError::InvalidIssuerFormat(issuer.to_string()))?;
    let fragment = captures.name("fragment").map(|m| m.as_str().to_string());
    Ok((did, fragment))
}

pub fn org_id_to_did(org_id: &str) -> Result<String, CredentialError> {
    if org_id.is_empty() {
        return Err(CredentialError::InvalidOrgId("missing ORGiD".to_string()));
    }
    if org_id.starts_with(DID_ORGID_PREFIX) {
        return Ok(org_id.to_string());
    }
    Ok(format!("{}{}", DID_ORGID_PREFIX, org_id))
}

pub fn did_to_org_id(did: &str) -> Result<String, CredentialError> {
    DID_REGEX
        .captures(did)
        .and_then(|captures| captures.name("orgid"))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| CredentialError::InvalidOrgId(did.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn issuer_org() -> String {
        format!("did:orgid:0x{}", "a".repeat(64))
    }

    fn audience_org() -> String {
        format!("did:orgid:0x{}", "b".repeat(64))
    }

    fn make_token(claims: serde_json::Value) -> String {
        let header = json!({"alg": "ES256K", "typ": "JWT"});
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string()),
            URL_SAFE_NO_PAD.encode("not-a-real-signature"),
        )
    }

    fn bearer(claims: serde_json::Value) -> String {
        format!("Bearer {}", make_token(claims))
    }

    #[test]
    fn test_decode_valid_bearer_token() {
        let header = bearer(json!({
            "iss": format!("{}#webserver", issuer_org()),
            "aud": audience_org(),
            "exp": 1_900_000_000i64,
        }));

        let claims = decode_bearer_token(&header).unwrap();
        assert_eq!(claims.issuer_did, issuer_org());
        assert_eq!(claims.issuer_key_fragment.as_deref(), Some("webserver"));
        assert_eq!(claims.audience, audience_org());
        assert_eq!(claims.expiry.timestamp(), 1_900_000_000);

        // pure decode
        assert_eq!(decode_bearer_token(&header).unwrap(), claims);
    }

    #[test]
    fn test_issuer_without_fragment() {
        let header = bearer(json!({
            "iss": issuer_org(),
            "aud": [audience_org(), "ignored"],
            "exp": 1_900_000_000i64,
        }));

        let claims = decode_bearer_token(&header).unwrap();
        assert_eq!(claims.issuer_did, issuer_org());
        assert_eq!(claims.issuer_key_fragment, None);
        assert_eq!(claims.audience, audience_org());
    }

    #[test]
    fn test_fractional_expiry_is_truncated() {
        let header = bearer(json!({
            "iss": issuer_org(),
            "aud": audience_org(),
            "exp": 1_900_000_000.5,
        }));

        let claims = decode_bearer_token(&header).unwrap();
        assert_eq!(claims.expiry.timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_expiry_must_be_numeric() {
        let header = bearer(json!({
            "iss": issuer_org(),
            "aud": audience_org(),
            "exp": "tomorrow",
        }));
        assert!(matches!(
            decode_bearer_token(&header),
            Err(CredentialError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_issuer_with_network_segment() {
        let issuer = format!("did:orgid:4:0x{}#key1", "c".repeat(64));
        let header = bearer(json!({"iss": issuer, "aud": audience_org(), "exp": 1}));

        let claims = decode_bearer_token(&header).unwrap();
        assert_eq!(claims.issuer_did, format!("did:orgid:4:0x{}", "c".repeat(64)));
        assert_eq!(claims.issuer_key_fragment.as_deref(), Some("key1"));
    }

    #[test_case("XXXXXXXXXXXXXXXXXXXXXxabc.def.ghi"; "garbage prefix")]
    #[test_case("abc.def.ghi"; "token only")]
    #[test_case("Bearerabc.def.ghi"; "missing space")]
    #[test_case("Bearer "; "empty token")]
    #[test_case("Bearer  abc.def.ghi"; "double space")]
    #[test_case("Bearer abc def"; "two tokens")]
    #[test_case("bearer abc.def.ghi"; "lowercase scheme")]
    #[test_case(""; "empty header")]
    fn test_malformed_auth_header(header: &str) {
        assert_eq!(
            decode_bearer_token(header),
            Err(CredentialError::MalformedAuthHeader)
        );
    }

    #[test_case("Bearer aa.bb.cc"; "not base64 json")]
    #[test_case("Bearer abcdefg.abdcdef"; "two segments")]
    fn test_undecodable_token(header: &str) {
        assert!(matches!(
            decode_bearer_token(header),
            Err(CredentialError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_missing_claims_are_rejected() {
        let header = bearer(json!({"iss": issuer_org(), "exp": 1}));
        assert!(matches!(
            decode_bearer_token(&header),
            Err(CredentialError::InvalidToken(_))
        ));
    }

    #[test_case("https://issuer.example.com"; "url issuer")]
    #[test_case("did:orgid:0xabc#webserver"; "short address")]
    #[test_case("did:web:0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"; "other did method")]
    fn test_invalid_issuer_format(issuer: &str) {
        let header = bearer(json!({"iss": issuer, "aud": audience_org(), "exp": 1}));
        assert_eq!(
            decode_bearer_token(&header),
            Err(CredentialError::InvalidIssuerFormat(issuer.to_string()))
        );
    }

    #[test]
    fn test_org_id_did_conversion() {
        let org_id = format!("0x{}", "a".repeat(64));
        let did = org_id_to_did(&org_id).unwrap();
        assert_eq!(did, format!("did:orgid:{}", org_id));
        assert_eq!(org_id_to_did(&did).unwrap(), did);
        assert_eq!(did_to_org_id(&did).unwrap(), org_id);
        assert_eq!(did_to_org_id(&format!("{}#webserver", did)).unwrap(), org_id);
        assert_eq!(did_to_org_id(&format!("did:orgid:4:{}", org_id)).unwrap(), org_id);

        assert!(matches!(org_id_to_did(""), Err(CredentialError::InvalidOrgId(_))));
        assert!(matches!(
            did_to_org_id("did:web:example.com"),
            Err(CredentialError::InvalidOrgId(_))
        ));
    }
}
