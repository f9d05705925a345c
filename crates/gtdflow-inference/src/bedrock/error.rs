//! Bedrock-specific error classification.

use std::time::Duration;

use reqwest::header::HeaderMap;

use gtdflow_core::{TransportError, TransportErrorKind};

/// Bedrock runtime error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BedrockErrorCode {
    /// Missing, expired or rejected credentials.
    AccessDenied,
    /// Request rate or quota exceeded, or model still warming up.
    Throttling,
    /// Model did not finish in time.
    ModelTimeout,
    /// Service temporarily unavailable; treated as a throttle signal.
    ServiceUnavailable,
    /// Internal server failure.
    InternalServer,
    /// Malformed request or unsupported parameters.
    Validation,
    /// Model or inference profile does not exist.
    ResourceNotFound,
    /// Endpoint does not serve this operation.
    UnknownOperation,
    /// Unknown error.
    Unknown,
}

impl BedrockErrorCode {
    /// Determine error code from HTTP status and the `__type` / `x-amzn-ErrorType` value.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        let error_type = normalize_error_type(error_type);
        match (status, error_type) {
            (_, "ThrottlingException")
            | (_, "ServiceQuotaExceededException")
            | (_, "ModelNotReadyException")
            | (429, _) => Self::Throttling,
            (_, "AccessDeniedException")
            | (_, "UnrecognizedClientException")
            | (_, "ExpiredTokenException")
            | (401, _)
            | (403, _) => Self::AccessDenied,
            (_, "ModelTimeoutException") | (408, _) => Self::ModelTimeout,
            (_, "ServiceUnavailableException") | (503, _) => Self::ServiceUnavailable,
            (_, "ResourceNotFoundException") => Self::ResourceNotFound,
            (404, _) => Self::UnknownOperation,
            (_, "ValidationException") | (400..=499, _) => Self::Validation,
            (_, "InternalServerException") | (500..=599, _) => Self::InternalServer,
            _ => Self::Unknown,
        }
    }

    /// Transport error kind for this code.
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::AccessDenied => TransportErrorKind::Auth,
            Self::Throttling | Self::ServiceUnavailable => TransportErrorKind::Throttle,
            Self::ModelTimeout => TransportErrorKind::Timeout,
            Self::InternalServer => TransportErrorKind::Server,
            Self::Validation | Self::ResourceNotFound => TransportErrorKind::InvalidRequest,
            Self::UnknownOperation | Self::Unknown => TransportErrorKind::Network,
        }
    }

    /// Whether the endpoint itself failed to speak the protocol.
    pub fn is_protocol_level(&self) -> bool {
        matches!(self, Self::UnknownOperation | Self::Unknown)
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retriable()
    }
}

/// Strip namespace and URI decorations from an AWS error type.
///
/// `com.amazon.bedrock#ThrottlingException` and
/// `ThrottlingException:http://internal.amazon.com/...` both become
/// `ThrottlingException`.
pub fn normalize_error_type(raw: &str) -> &str {
    let raw = raw.trim();
    let raw = raw.rsplit('#').next().unwrap_or(raw);
    raw.split(':').next().unwrap_or(raw)
}

/// Build a transport error from a non-success response.
pub fn to_transport_error(
    status: u16,
    error_type: &str,
    message: &str,
    retry_after: Option<Duration>,
) -> TransportError {
    let code = BedrockErrorCode::from_response(status, error_type);
    let message = if message.is_empty() {
        format!("HTTP {}", status)
    } else {
        message.to_string()
    };
    TransportError::new(code.kind(), message)
        .with_status(status)
        .with_retry_after(retry_after)
        .with_protocol_level(code.is_protocol_level())
}

/// Parse a delta-seconds `retry-after` header.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Map a reqwest failure onto the transport taxonomy.
pub fn from_reqwest(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(format!("Request timed out: {}", err))
    } else if err.is_connect() {
        TransportError::unreachable(format!("Connection failed: {}", err))
    } else if err.is_decode() {
        TransportError::unreachable(format!("Undecodable response: {}", err))
    } else {
        TransportError::network(format!("Request failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_error_code_from_429() {
        let code = BedrockErrorCode::from_response(429, "");
        assert_eq!(code, BedrockErrorCode::Throttling);
    }

    #[test]
    fn test_throttling_type_wins_over_status() {
        let code = BedrockErrorCode::from_response(400, "ThrottlingException");
        assert_eq!(code, BedrockErrorCode::Throttling);
        let code = BedrockErrorCode::from_response(503, "com.amazon.bedrock#ThrottlingException");
        assert_eq!(code, BedrockErrorCode::Throttling);
    }

    #[test]
    fn test_error_code_from_403() {
        let code = BedrockErrorCode::from_response(403, "AccessDeniedException");
        assert_eq!(code, BedrockErrorCode::AccessDenied);
        assert!(!code.is_retryable());
    }

    #[test]
    fn test_error_code_from_400_validation() {
        let code = BedrockErrorCode::from_response(400, "ValidationException");
        assert_eq!(code, BedrockErrorCode::Validation);
        assert_eq!(code.kind(), TransportErrorKind::InvalidRequest);
    }

    #[test]
    fn test_error_code_from_404_without_type_is_unknown_operation() {
        let code = BedrockErrorCode::from_response(404, "");
        assert_eq!(code, BedrockErrorCode::UnknownOperation);
        assert!(code.is_protocol_level());
        assert!(code.is_retryable());
    }

    #[test]
    fn test_error_code_from_404_missing_model_is_fatal() {
        let code = BedrockErrorCode::from_response(404, "ResourceNotFoundException");
        assert_eq!(code, BedrockErrorCode::ResourceNotFound);
        assert!(!code.is_retryable());
    }

    #[test]
    fn test_error_code_from_5xx() {
        assert_eq!(
            BedrockErrorCode::from_response(500, "InternalServerException"),
            BedrockErrorCode::InternalServer
        );
        assert_eq!(
            BedrockErrorCode::from_response(502, ""),
            BedrockErrorCode::InternalServer
        );
        assert_eq!(
            BedrockErrorCode::from_response(503, ""),
            BedrockErrorCode::ServiceUnavailable
        );
    }

    #[test]
    fn test_service_unavailable_is_throttle() {
        let code = BedrockErrorCode::from_response(503, "ServiceUnavailableException");
        assert_eq!(code.kind(), TransportErrorKind::Throttle);
        assert_eq!(
            BedrockErrorCode::InternalServer.kind(),
            TransportErrorKind::Server
        );
    }

    #[test]
    fn test_model_timeout() {
        let code = BedrockErrorCode::from_response(408, "ModelTimeoutException");
        assert_eq!(code.kind(), TransportErrorKind::Timeout);
    }

    #[test]
    fn test_normalize_error_type() {
        assert_eq!(
            normalize_error_type("ThrottlingException:http://internal.amazon.com/coral/x/"),
            "ThrottlingException"
        );
        assert_eq!(
            normalize_error_type("com.amazon.coral#ValidationException"),
            "ValidationException"
        );
        assert_eq!(normalize_error_type(""), "");
    }

    #[test]
    fn test_to_transport_error_carries_status_and_retry_after() {
        let err = to_transport_error(
            429,
            "ThrottlingException",
            "Too many requests",
            Some(Duration::from_secs(2)),
        );
        assert_eq!(err.kind, TransportErrorKind::Throttle);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.retry_after, Some(Duration::from_secs(2)));
        assert!(!err.warrants_fallback());
    }

    #[test]
    fn test_to_transport_error_empty_message() {
        let err = to_transport_error(500, "", "", None);
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(reqwest::header::RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(
            reqwest::header::RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }
}
