//! Wire protocol for the hub socket
//!
//! Newline-delimited JSON frames, request/reply correlated by `id`.
//! Success is `{id, result}`; failure is `{id, error: {code, message}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;

/// Bumped on breaking frame changes; clients refuse a major mismatch.
pub const PROTOCOL_VERSION: &str = "1.0";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const CODE_PARSE_ERROR: i64 = -32700;
pub const CODE_INTERNAL: i64 = -32603;
pub const CODE_INPUT: i64 = 1000;
pub const CODE_UNKNOWN_METHOD: i64 = 1001;
pub const CODE_TIMEOUT: i64 = 1002;
pub const CODE_HUB_LOCATION: i64 = 1003;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    pub fn ok(id: u64, result: Value) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn fail(id: u64, code: i64, message: impl Into<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(WireError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub server_version: String,
    pub protocol_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub sql: String,
    #[serde(default)]
    pub packages: Option<Vec<String>>,
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultWire {
    pub rows: Vec<serde_json::Map<String, Value>>,
    pub row_count: usize,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterParams {
    pub repo_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResult {
    pub repo_id: String,
    pub packages: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshParams {
    pub repo_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushValidationErrorsParams {
    pub repo_id: String,
    pub package_path: String,
    #[serde(default)]
    pub errors: Vec<Value>,
}

/// Major component of a protocol version string.
pub fn protocol_major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

pub fn error_code_for(error: &HubError) -> i64 {
    match error {
        HubError::Input(_) => CODE_INPUT,
        HubError::HubLocation(_) => CODE_HUB_LOCATION,
        _ => CODE_INTERNAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_round_trip() {
        let request = Request {
            id: 7,
            method: "query".to_string(),
            params: serde_json::json!({ "sql": "SELECT 1" }),
        };
        let line = serde_json::to_string(&request).unwrap();
        let back: Request = serde_json::from_str(&line).unwrap();
        assert_eq!(back.id, 7);
        assert_eq!(back.method, "query");
    }

    #[test]
    fn success_frames_omit_the_error_field() {
        let response = Response::ok(1, serde_json::json!({ "x": 1 }));
        let line = serde_json::to_string(&response).unwrap();
        assert!(!line.contains("error"));

        let failure = Response::fail(2, CODE_INPUT, "bad query");
        let line = serde_json::to_string(&failure).unwrap();
        assert!(line.contains("\"code\":1000"));
        assert!(!line.contains("result"));
    }

    #[test]
    fn major_version_extraction() {
        assert_eq!(protocol_major("1.0"), "1");
        assert_eq!(protocol_major("2.13"), "2");
    }
}
