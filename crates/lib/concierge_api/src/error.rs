//! Application error types.
//!
//! Handshake and start-up routes answer in plain text; the command route
//! builds its own JSON envelope and only uses [`AppError`] for failures
//! outside dispatch.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use concierge_core::credentials::{CredentialError, ExchangeFailure};
use thiserror::Error;
use tracing::error;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotConfigured(String),

    #[error("{0}")]
    Upstream(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(detail) => {
                error!("internal error: {detail}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

impl From<CredentialError> for AppError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::ExchangeFailed(ExchangeFailure::Rejected {
                error,
                description,
                ..
            }) => AppError::Validation(match description {
                Some(d) => format!("Authorization code was rejected: {error} ({d})"),
                None => format!("Authorization code was rejected: {error}"),
            }),
            CredentialError::ExchangeFailed(ExchangeFailure::Unreachable(msg)) => {
                AppError::Upstream(format!("Authorization provider unavailable: {msg}"))
            }
            CredentialError::InvalidState => AppError::Validation(e.to_string()),
            CredentialError::NotConfigured(_) => AppError::NotConfigured(e.to_string()),
            CredentialError::NotConnected { .. } => AppError::Validation(e.to_string()),
            CredentialError::RefreshFailed(_) => AppError::Upstream(e.to_string()),
            CredentialError::StoreUnavailable { .. } => AppError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_code_is_a_client_error() {
        let err = AppError::from(CredentialError::ExchangeFailed(ExchangeFailure::Rejected {
            status: 400,
            error: "invalid_grant".into(),
            description: Some("Bad Request".into()),
        }));
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("invalid_grant")));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unreachable_provider_is_bad_gateway() {
        let err = AppError::from(CredentialError::ExchangeFailed(ExchangeFailure::Unreachable(
            "connection refused".into(),
        )));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn internal_detail_stays_out_of_the_body() {
        let err = AppError::from(CredentialError::StoreUnavailable {
            durable: "quota".into(),
            local: "disk full".into(),
        });
        assert_eq!(err.to_string(), "Internal server error");
    }
}
