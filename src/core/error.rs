use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Error taxonomy for the relay. Client-facing messages are genericized:
/// raw vendor payloads and upstream identifiers never cross this boundary.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Transient upstream trouble. During reconciliation this is absorbed
    /// as "still processing"; at submission time it aborts the request.
    #[error("upstream unavailable")]
    UpstreamUnavailable,

    /// The vendor's own application-level failure code.
    #[error("upstream rejected: {0}")]
    UpstreamRejected(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl RelayError {
    fn client_message(&self) -> String {
        match self {
            RelayError::Unauthorized => "Unauthorized".to_string(),
            RelayError::QuotaExceeded => "Daily limit reached".to_string(),
            RelayError::InvalidInput(msg) => msg.clone(),
            RelayError::UpstreamUnavailable => "Engine busy".to_string(),
            RelayError::UpstreamRejected(_) => "Synthesis failed".to_string(),
            RelayError::Persistence(_) => "System busy".to_string(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match &self {
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            RelayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::UpstreamRejected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            RelayError::QuotaExceeded => serde_json::json!({
                "ok": false,
                "limit_reached": true,
            }),
            other => serde_json::json!({
                "ok": false,
                "message": other.client_message(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_error_maps_to_429_with_limit_flag() {
        let resp = RelayError::QuotaExceeded.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn vendor_detail_is_genericized_for_clients() {
        let err = RelayError::UpstreamRejected("paxsenix code 42: gpu melted".into());
        assert_eq!(err.client_message(), "Synthesis failed");
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let resp = RelayError::Unauthorized.into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
