use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::clients::payment::PaymentError;
use crate::token::TokenError;
use crate::utils::{error_codes, error_to_api_response};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    /// Any action token failure. The cause is logged, never returned.
    #[error("This link is invalid or has expired")]
    InvalidActionToken,

    #[error("payment provider error: {0}")]
    Payment(#[from] PaymentError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::TamperDetected => {
                tracing::warn!(target: "security", "action token tamper detected");
            }
            TokenError::MissingSecret => {
                tracing::error!("action token secret missing at verification time");
            }
            other => tracing::debug!(reason = %other, "action token rejected"),
        }
        AppError::InvalidActionToken
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match &self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                error_codes::VALIDATION_ERROR,
                msg.clone(),
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
                "Not found".to_string(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, error_codes::CONFLICT, msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                error_codes::AUTH_FAILED,
                "Unauthorized".to_string(),
            ),
            AppError::InvalidActionToken => (
                StatusCode::BAD_REQUEST,
                error_codes::INVALID_ACTION_LINK,
                self.to_string(),
            ),
            AppError::Payment(_) => (
                StatusCode::BAD_GATEWAY,
                error_codes::UPSTREAM_ERROR,
                "Payment provider unavailable".to_string(),
            ),
            AppError::Database(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, error_to_api_response::<()>(code, msg)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_token_failure_looks_the_same() {
        let errors = [
            TokenError::Malformed,
            TokenError::TamperDetected,
            TokenError::InvalidClaims,
            TokenError::Expired,
        ];
        let rendered: Vec<(StatusCode, String)> = errors
            .into_iter()
            .map(|e| {
                let app: AppError = e.into();
                let msg = app.to_string();
                (app.into_response().status(), msg)
            })
            .collect();

        assert!(rendered.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(rendered[0].0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn database_errors_are_not_leaked() {
        let response = AppError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
