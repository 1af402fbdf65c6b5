//! Request Envelope and Response Packer (spec §4.4/§6).
//!
//! Parses the HTTP method, query parameters, and JSON body into a typed
//! [`ParsedRequest`], validating the application key and dispatching on the
//! `type` query parameter. Builds the canonical JSON response envelope
//! (`{"error": <int>, "objects": [...]?, "committedSyncCount": <int>?}`)
//! for every outcome, success or failure.

use std::collections::HashMap;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::AppKeysConfig;
use crate::error::{ApiErrorCode, ProtocolError};

/// The seven request types the API dispatches on (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Test,
    BaseDataDown,
    SyncDown,
    SyncUp,
    AccountOpen,
    AccountClose,
    AccountModify,
}

impl RequestType {
    /// Parses the `type` query parameter. Absent, unknown, empty,
    /// whitespace-only, or the literal string `"None"` are all malformed
    /// (spec §4.4/§8 boundary behaviors) — that last case matches a known
    /// failure mode of the Python reference client, which would stringify
    /// a missing value as `"None"` rather than omitting the parameter.
    fn parse(raw: Option<&str>) -> Result<Self, ProtocolError> {
        let raw = raw.unwrap_or("").trim();
        match raw {
            "test" => Ok(Self::Test),
            "baseDataDown" => Ok(Self::BaseDataDown),
            "syncDown" => Ok(Self::SyncDown),
            "syncUp" => Ok(Self::SyncUp),
            "accountOpen" => Ok(Self::AccountOpen),
            "accountClose" => Ok(Self::AccountClose),
            "accountModify" => Ok(Self::AccountModify),
            _ => Err(ProtocolError::MalformedRequest(format!(
                "unknown or missing request type: {raw:?}"
            ))),
        }
    }

    /// Whether this request type requires `email`/`password` query
    /// parameters (all but `baseDataDown`, spec §6).
    fn requires_auth(self) -> bool {
        !matches!(self, Self::BaseDataDown)
    }
}

/// `accountOpen` body (spec §6).
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AccountOpenBody {
    #[serde(rename = "clientUUID")]
    pub client_uuid: Uuid,
}

/// `accountModify` body (spec §6).
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AccountModifyBody {
    pub email: String,
    pub password: String,
}

/// `syncDown` / `baseDataDown` body (spec §6).
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncDownBody {
    #[serde(rename = "objectClass")]
    pub object_class: String,
    #[serde(rename = "clientUUID")]
    pub client_uuid: Uuid,
    #[serde(rename = "lastSync")]
    pub last_sync: i64,
}

/// `syncUp` body (spec §6). Uploaded objects keep their class-specific
/// fields as raw JSON; the object-class registry validates their shape.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncUpBody {
    #[serde(rename = "objectClass")]
    pub object_class: String,
    #[serde(rename = "clientUUID")]
    pub client_uuid: Uuid,
    pub objects: Vec<Value>,
}

/// The request-type-specific body, once parsed. `None` for `test` and
/// `accountClose`, which carry no body.
#[derive(Debug)]
pub enum ParsedBody {
    None,
    AccountOpen(AccountOpenBody),
    AccountModify(AccountModifyBody),
    SyncDown(SyncDownBody),
    SyncUp(SyncUpBody),
}

/// Credentials carried on the query string, present whenever
/// [`RequestType::requires_auth`] is true.
#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

/// A fully parsed, validated request, ready for the Handler Set.
#[derive(Debug)]
pub struct ParsedRequest {
    pub request_type: RequestType,
    pub credentials: Option<Credentials>,
    pub body: ParsedBody,
}

/// Parses a POST request's method, headers, query string, and body into a
/// [`ParsedRequest`]. Any other HTTP method is rejected by the caller
/// before this is reached (spec §4.4: `MethodNotAllowed` with
/// `Allow: POST`).
pub fn parse_request(
    app_keys: &AppKeysConfig,
    query: &HashMap<String, String>,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<ParsedRequest, ProtocolError> {
    let key = query
        .get("key")
        .map(String::as_str)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ProtocolError::MalformedRequest("missing key parameter".to_string()))?;
    if !app_keys.is_allowed(key) {
        return Err(ProtocolError::InvalidKey);
    }

    let request_type = RequestType::parse(query.get("type").map(String::as_str))?;

    let credentials = parse_credentials(query, request_type)?;

    let has_json_content_type = content_type
        .map(|ct| ct.trim_start().starts_with("application/json"))
        .unwrap_or(false);
    if !body.is_empty() && !has_json_content_type {
        return Err(ProtocolError::MalformedRequest(
            "Content-Type must be application/json when a body is present".to_string(),
        ));
    }

    let parsed_body = parse_body(request_type, body)?;

    Ok(ParsedRequest {
        request_type,
        credentials,
        body: parsed_body,
    })
}

fn parse_credentials(
    query: &HashMap<String, String>,
    request_type: RequestType,
) -> Result<Option<Credentials>, ProtocolError> {
    let email = query.get("email").map(String::as_str).filter(|s| !s.is_empty());
    let password = query.get("password").map(String::as_str).filter(|s| !s.is_empty());

    match (email, password) {
        (Some(email), Some(password)) => Ok(Some(Credentials {
            email: email.to_string(),
            password: SecretString::from(password.to_string()),
        })),
        (None, None) if !request_type.requires_auth() => Ok(None),
        _ => {
            if request_type.requires_auth() {
                Err(ProtocolError::MalformedRequest(
                    "email and password query parameters are required".to_string(),
                ))
            } else {
                Ok(None)
            }
        }
    }
}

fn parse_body(request_type: RequestType, body: &[u8]) -> Result<ParsedBody, ProtocolError> {
    match request_type {
        RequestType::Test | RequestType::AccountClose => Ok(ParsedBody::None),
        RequestType::AccountOpen => parse_json::<AccountOpenBody>(body).map(ParsedBody::AccountOpen),
        RequestType::AccountModify => {
            parse_json::<AccountModifyBody>(body).map(ParsedBody::AccountModify)
        }
        RequestType::SyncDown | RequestType::BaseDataDown => {
            parse_json::<SyncDownBody>(body).map(ParsedBody::SyncDown)
        }
        RequestType::SyncUp => parse_json::<SyncUpBody>(body).map(ParsedBody::SyncUp),
    }
}

/// Strictly parses the body for a request type that requires one. A
/// body that isn't even syntactically valid JSON is `MalformedRequest`;
/// valid JSON that doesn't match the expected schema (missing/extra/
/// mistyped fields) is `InvalidJsonObject` (spec §7).
fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ProtocolError> {
    if body.is_empty() {
        return Err(ProtocolError::MalformedRequest(
            "request requires a JSON body".to_string(),
        ));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProtocolError::MalformedRequest(format!("invalid JSON syntax: {e}")))?;
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
}

/// The canonical JSON response envelope (spec §6).
#[derive(Debug, Serialize, PartialEq)]
pub struct ResponseEnvelope {
    pub error: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objects: Option<Vec<Value>>,
    #[serde(rename = "committedSyncCount", skip_serializing_if = "Option::is_none")]
    pub committed_sync_count: Option<i64>,
}

impl ResponseEnvelope {
    pub fn success() -> Self {
        Self {
            error: ApiErrorCode::Success.code(),
            objects: None,
            committed_sync_count: None,
        }
    }

    pub fn with_objects(objects: Vec<Value>, committed_sync_count: i64) -> Self {
        Self {
            error: ApiErrorCode::Success.code(),
            objects: Some(objects),
            committed_sync_count: Some(committed_sync_count),
        }
    }

    pub fn with_committed_sync_count(committed_sync_count: i64) -> Self {
        Self {
            error: ApiErrorCode::Success.code(),
            objects: None,
            committed_sync_count: Some(committed_sync_count),
        }
    }

    pub fn error(code: ApiErrorCode) -> Self {
        Self {
            error: code.code(),
            objects: None,
            committed_sync_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> AppKeysConfig {
        AppKeysConfig::resolve(&crate::config::FileOverlay {
            app_keys: Some(vec!["private".to_string(), "other".to_string()]),
            ..Default::default()
        })
        .unwrap()
    }

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn missing_key_is_malformed() {
        let q = query(&[("type", "test")]);
        let err = parse_request(&keys(), &q, None, b"").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedRequest(_)));
    }

    #[test]
    fn key_not_in_allowlist_is_invalid_key() {
        let q = query(&[("type", "test"), ("key", "nope"), ("email", "a@b.com"), ("password", "x")]);
        let err = parse_request(&keys(), &q, None, b"").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidKey));
    }

    #[test]
    fn type_none_literal_is_malformed() {
        for bad in ["None", "", "   ", "bogus"] {
            let q = query(&[("type", bad), ("key", "private"), ("email", "a@b.com"), ("password", "x")]);
            let err = parse_request(&keys(), &q, None, b"").unwrap_err();
            assert!(matches!(err, ProtocolError::MalformedRequest(_)), "type={bad:?}");
        }
    }

    #[test]
    fn base_data_down_does_not_require_credentials() {
        let q = query(&[("type", "baseDataDown"), ("key", "private")]);
        let body = br#"{"objectClass":"Product","clientUUID":"11111111-1111-1111-1111-111111111111","lastSync":0}"#;
        let parsed = parse_request(&keys(), &q, Some("application/json"), body).unwrap();
        assert!(parsed.credentials.is_none());
        assert!(matches!(parsed.body, ParsedBody::SyncDown(_)));
    }

    #[test]
    fn sync_down_requires_credentials() {
        let q = query(&[("type", "syncDown"), ("key", "private")]);
        let body = br#"{"objectClass":"Product","clientUUID":"11111111-1111-1111-1111-111111111111","lastSync":0}"#;
        let err = parse_request(&keys(), &q, Some("application/json"), body).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedRequest(_)));
    }

    #[test]
    fn missing_content_type_with_body_is_malformed() {
        let q = query(&[("type", "accountOpen"), ("key", "private"), ("email", "a@b.com"), ("password", "x")]);
        let body = br#"{"clientUUID":"11111111-1111-1111-1111-111111111111"}"#;
        let err = parse_request(&keys(), &q, None, body).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedRequest(_)));
    }

    #[test]
    fn unknown_field_in_body_is_invalid_json_object() {
        let q = query(&[("type", "accountOpen"), ("key", "private"), ("email", "a@b.com"), ("password", "x")]);
        let body = br#"{"clientUUID":"11111111-1111-1111-1111-111111111111","extra":1}"#;
        let err = parse_request(&keys(), &q, Some("application/json"), body).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn account_open_body_round_trips() {
        let body = AccountOpenBody {
            client_uuid: Uuid::nil(),
        };
        let json = serde_json::to_value(&body).unwrap();
        let back: AccountOpenBody = serde_json::from_value(json).unwrap();
        assert_eq!(body, back);
    }
}
