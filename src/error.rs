use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::card::CardStatus;
use crate::services::users::AuthError;

/// Failures of the underlying store, surfaced to callers unchanged and
/// never retried internally.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid stored value: {0}")]
    Decode(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Error taxonomy of the card ledger core. Every variant is a stable
/// category a presentation layer can map without inspecting messages;
/// the message text exists for diagnostics only.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("card {0} not found")]
    CardNotFound(Uuid),

    #[error("owner {0} not found")]
    OwnerNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Carries the offending status so callers can tell a blocked card
    /// from an expired one without parsing the message.
    #[error("card is {0}, operation requires an active card")]
    CardNotActive(CardStatus),

    #[error("insufficient funds for this transaction")]
    InsufficientFunds,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level application error, mapping every category to a stable
/// HTTP status.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("authentication required")]
    Unauthorized,

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

fn ledger_status(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
        LedgerError::CardNotFound(_) | LedgerError::OwnerNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        LedgerError::CardNotActive(_) => StatusCode::CONFLICT,
        LedgerError::InsufficientFunds => StatusCode::BAD_REQUEST,
        LedgerError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Ledger(e) => (ledger_status(e), e.to_string()),
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials | AuthError::InvalidToken => {
                    (StatusCode::UNAUTHORIZED, e.to_string())
                }
                AuthError::Store(inner) => (ledger_status(inner), inner.to_string()),
                AuthError::Crypto => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                ),
            },
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Internal(e) => {
                tracing::error!(error = %e, "unhandled internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "status": status.as_u16(),
            "message": message,
            "timestamp": Utc::now(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
