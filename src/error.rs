use reqwest::header::InvalidHeaderValue;
// src/error.rs
use serde_json::Value;
use thiserror::Error;

use crate::location::LocationErrorCode;

#[derive(Error, Debug)]
pub enum PinsError {
    #[error("HTTP request failed: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("URL parsing failed: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("JSON processing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("JSON deserialization failed: {0}")]
    JsonDeserializationFailed(String),

    #[error("Backend API error (code {code}): {message}")]
    ApiError { code: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid function name: {0}")]
    InvalidFunctionName(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Operation forbidden: {0}")]
    OperationForbidden(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("SDK error: {0}")]
    SdkError(String),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(InvalidHeaderValue),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A pin query failed. The feed that issued it keeps its previous pins.
    #[error("Pin query failed: {0}")]
    BackendQueryFailed(#[source] Box<PinsError>),
}

impl PinsError {
    /// Creates a `PinsError` from an HTTP status code and a JSON response body.
    ///
    /// The backend reports failures as `{"code": "...", "message": "...", "details": ..., "hint": ...}`.
    /// `code` is either a SQLSTATE (e.g. `42501`) or a gateway code (e.g. `PGRST202`).
    pub(crate) fn from_response(status_code: u16, response_body: Value) -> Self {
        let error_code = match response_body.get("code") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let error_message = response_body
            .get("message")
            .or_else(|| response_body.get("error"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error")
            .to_string();

        match error_code.as_str() {
            "PGRST202" => PinsError::NotFound(format!("({}) {}", error_code, error_message)),
            "42501" => PinsError::OperationForbidden(format!("({}) {}", error_code, error_message)),
            "22023" | "22P02" => PinsError::InvalidInput(format!(
                "Invalid parameter: ({}) {}",
                error_code, error_message
            )),
            _ => {
                if status_code >= 500 {
                    PinsError::InternalServerError(format!(
                        "Server error (HTTP {}): ({}) {}",
                        status_code, error_code, error_message
                    ))
                } else if status_code == 401 || status_code == 403 {
                    PinsError::AuthenticationError(format!(
                        "Auth error (HTTP {}): ({}) {}",
                        status_code, error_code, error_message
                    ))
                } else if status_code == 404 {
                    PinsError::NotFound(format!(
                        "Not found (HTTP {}): ({}) {}",
                        status_code, error_code, error_message
                    ))
                } else {
                    PinsError::ApiError {
                        code: error_code,
                        message: error_message,
                    }
                }
            }
        }
    }

    /// Wraps this error as a failed pin query, unless it already is one.
    pub(crate) fn into_query_failure(self) -> Self {
        match self {
            PinsError::BackendQueryFailed(_) => self,
            other => PinsError::BackendQueryFailed(Box::new(other)),
        }
    }
}

/// Failures of the device location capability, as surfaced by the tracker.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0:?}")]
    LocationUnavailable(LocationErrorCode),

    #[error("Location capability unsupported on this platform")]
    Unsupported,
}

impl From<LocationErrorCode> for LocationError {
    fn from(code: LocationErrorCode) -> Self {
        match code {
            LocationErrorCode::PermissionDenied => LocationError::PermissionDenied,
            other => LocationError::LocationUnavailable(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_missing_function_to_not_found() {
        let err = PinsError::from_response(
            404,
            json!({"code": "PGRST202", "message": "Could not find the function"}),
        );
        assert!(matches!(err, PinsError::NotFound(ref m) if m.contains("PGRST202")));
    }

    #[test]
    fn maps_status_when_code_unknown() {
        let err = PinsError::from_response(503, json!({"message": "upstream down"}));
        assert!(matches!(err, PinsError::InternalServerError(_)));

        let err = PinsError::from_response(401, json!({"message": "JWT expired"}));
        assert!(matches!(err, PinsError::AuthenticationError(_)));

        let err = PinsError::from_response(400, json!({"code": "P0001", "message": "raised"}));
        match err {
            PinsError::ApiError { code, message } => {
                assert_eq!(code, "P0001");
                assert_eq!(message, "raised");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn query_failure_is_not_double_wrapped() {
        let err = PinsError::SdkError("boom".into())
            .into_query_failure()
            .into_query_failure();
        match err {
            PinsError::BackendQueryFailed(inner) => {
                assert!(matches!(*inner, PinsError::SdkError(_)))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn permission_code_maps_to_denied() {
        assert_eq!(
            LocationError::from(LocationErrorCode::PermissionDenied),
            LocationError::PermissionDenied
        );
        assert_eq!(
            LocationError::from(LocationErrorCode::Timeout),
            LocationError::LocationUnavailable(LocationErrorCode::Timeout)
        );
    }
}
