//! Offline JWT payload inspection. No signature verification is attempted.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jiff::Timestamp;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{DeckError, Result};

const ROLE_CLAIM_URI: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";
const EMAIL_CLAIM_URI: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";

#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub subject: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub expires_at: Option<Timestamp>,
    pub payload: Map<String, Value>,
}

impl Claims {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

pub fn decode_payload(token: &str) -> Result<Map<String, Value>> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(DeckError::parse(
            "token",
            format!("expected 3 dot-separated segments, found {}", segments.len()),
        ));
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| DeckError::parse("token payload", e.to_string()))?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DeckError::parse("token payload", "not a JSON object")),
        Err(e) => Err(DeckError::parse("token payload", e.to_string())),
    }
}

fn string_claim(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| payload.get(*k))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
}

pub fn decode(token: &str) -> Result<Claims> {
    let payload = decode_payload(token)?;

    let roles = match payload.get("role").or_else(|| payload.get(ROLE_CLAIM_URI)) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    // NumericDate may carry a fractional part.
    #[allow(clippy::cast_possible_truncation)]
    let expires_at = payload
        .get("exp")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.trunc() as i64)))
        .and_then(|secs| Timestamp::from_second(secs).ok());

    Ok(Claims {
        subject: string_claim(&payload, &["sub"]),
        email: string_claim(&payload, &["email", EMAIL_CLAIM_URI]),
        roles,
        issuer: string_claim(&payload, &["iss"]),
        audience: string_claim(&payload, &["aud"]),
        expires_at,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE;
    use rstest::rstest;

    fn token(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn decodes_standard_claims() {
        let claims = decode(&token(
            r#"{"sub":"42","email":"ops@example.com","role":["Admin","User"],"iss":"api","aud":"web","exp":1700000000}"#,
        ))
        .unwrap();
        assert_eq!(claims.subject.as_deref(), Some("42"));
        assert_eq!(claims.email.as_deref(), Some("ops@example.com"));
        assert_eq!(claims.roles, vec!["Admin", "User"]);
        assert_eq!(claims.audience.as_deref(), Some("web"));
        assert_eq!(
            claims.expires_at.unwrap().to_string(),
            "2023-11-14T22:13:20Z"
        );
        assert!(claims.is_expired(Timestamp::from_second(1_800_000_000).unwrap()));
    }

    // ASP.NET Identity tokens carry roles under a URI-named claim.
    #[test]
    fn reads_uri_named_role_claim() {
        let payload = format!(r#"{{"sub":"1","{ROLE_CLAIM_URI}":"Admin"}}"#);
        let claims = decode(&token(&payload)).unwrap();
        assert_eq!(claims.roles, vec!["Admin"]);
        assert!(claims.expires_at.is_none());
    }

    #[test]
    fn fractional_expiry_is_truncated() {
        let claims = decode(&token(r#"{"sub":"42","exp":1700000000.5}"#)).unwrap();
        assert_eq!(
            claims.expires_at.unwrap().to_string(),
            "2023-11-14T22:13:20Z"
        );
    }

    // Padded base64url (non-standard, but seen in the wild) is accepted.
    #[test]
    fn tolerates_padding() {
        let padded = format!("h.{}.s", URL_SAFE.encode(r#"{"sub":"abc"}"#));
        assert!(padded.contains('='));
        assert_eq!(decode(&padded).unwrap().subject.as_deref(), Some("abc"));
    }

    #[rstest]
    #[case::two_segments("a.b")]
    #[case::bad_base64("a.!!!.c")]
    #[case::not_json("a.bm90IGpzb24.c")]
    #[case::json_array("a.WzFd.c")]
    fn rejects_malformed_tokens(#[case] token: &str) {
        assert!(matches!(decode(token), Err(DeckError::Parse { .. })));
    }
}
