use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for wardkey operations.
#[derive(Debug, thiserror::Error)]
pub enum WardkeyError {
    /// Required configuration is missing or invalid (e.g. the master
    /// encryption key). Raised before any credential material is generated.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Secret or provisioning-artifact generation failed. Fatal to the
    /// current setup attempt; nothing is persisted.
    #[error("Generation failure: {0}")]
    Generation(String),

    /// The operation conflicts with the user's current MFA state
    /// (e.g. setup requested while MFA is already active).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Standard error response body for API consumers.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    error_id: String,
}

impl WardkeyError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) | Self::Generation(_) | Self::Internal(_) | Self::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns a message suitable for client responses.
    ///
    /// Client errors (4xx) expose their message; the caller needs to know
    /// what went wrong. Server-side failures are reduced to generic text
    /// (CWE-209) — in particular, setup failures never reveal whether the
    /// secret, the QR artifact, or the key configuration was at fault.
    fn safe_message(&self) -> String {
        match self {
            Self::Conflict(msg) => format!("Conflict: {}", msg),
            Self::NotFound(msg) => format!("Not found: {}", msg),
            Self::BadRequest(msg) => format!("Bad request: {}", msg),
            Self::Configuration(_) | Self::Generation(_) => {
                "Could not set up two-factor authentication".to_string()
            }
            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for WardkeyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        // Full detail goes to the server logs only.
        tracing::error!(
            status = status.as_u16(),
            error_id = %error_id,
            error = %self,
            "MFA operation failed"
        );

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
        });

        (status, body).into_response()
    }
}

/// Result type alias for wardkey operations.
pub type Result<T> = std::result::Result<T, WardkeyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            WardkeyError::conflict("already enabled").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            WardkeyError::not_found("no MFA config").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            WardkeyError::bad_request("bad label").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WardkeyError::configuration("key missing").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            WardkeyError::generation("qr failed").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_errors_expose_message() {
        assert_eq!(
            WardkeyError::conflict("MFA already enabled").safe_message(),
            "Conflict: MFA already enabled"
        );
        assert_eq!(
            WardkeyError::not_found("user 42").safe_message(),
            "Not found: user 42"
        );
    }

    #[test]
    fn test_setup_failures_are_generic() {
        // Neither variant may reveal which stage failed.
        assert_eq!(
            WardkeyError::configuration("WARDKEY_MASTER_KEY is not set").safe_message(),
            "Could not set up two-factor authentication"
        );
        assert_eq!(
            WardkeyError::generation("QR encoder rejected URI").safe_message(),
            "Could not set up two-factor authentication"
        );
    }

    #[test]
    fn test_internal_detail_hidden() {
        let err = WardkeyError::internal("decrypt failed for user 42 under key v3");
        assert_eq!(err.safe_message(), "Internal server error");

        let err: WardkeyError = anyhow::anyhow!("sensitive stack info").into();
        assert_eq!(err.safe_message(), "Internal server error");
    }

    #[tokio::test]
    async fn test_into_response_conflict() {
        let response = WardkeyError::conflict("already enabled").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Conflict: already enabled");
        assert!(uuid::Uuid::parse_str(json["error_id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_into_response_hides_generation_detail() {
        let response =
            WardkeyError::generation("png encode: buffer overflow at 0x3f").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Could not set up two-factor authentication");
    }
}
