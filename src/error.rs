//! Request-level error taxonomy for webhook signals.

use axum::http::StatusCode;
use thiserror::Error;

use crate::models::PositionSide;

/// Why a webhook signal was rejected or aborted.
///
/// Every variant is reported back to the caller as `{"ok": false, "error": ...}`;
/// none of them stop the process.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Passphrase missing or not equal to the configured secret.
    #[error("bad passphrase")]
    Unauthorized,

    /// Body is not valid JSON or a field has an unusable value.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// DCA step has no positive ratio configured.
    #[error("bad step: {0}")]
    InvalidStep(i64),

    /// A signal tried to add in the opposite direction of an open position.
    #[error("existing opposite position: holding {existing}, signal wants {requested}")]
    ConflictingSide {
        existing: PositionSide,
        requested: PositionSide,
    },

    /// Last price could not be fetched.
    #[error("ticker error: {0}")]
    MarketData(String),

    /// Entry order could not be placed.
    #[error("entry failed: {0}")]
    Order(String),

    /// State store could not be read or written.
    #[error("state store error: {0}")]
    Storage(String),
}

impl SignalError {
    /// HTTP status used when this error is returned from the webhook route.
    pub fn status_code(&self) -> StatusCode {
        match self {
            SignalError::Unauthorized => StatusCode::UNAUTHORIZED,
            SignalError::BadRequest(_)
            | SignalError::UnknownAction(_)
            | SignalError::InvalidStep(_) => StatusCode::BAD_REQUEST,
            SignalError::ConflictingSide { .. } => StatusCode::CONFLICT,
            SignalError::MarketData(_) | SignalError::Order(_) => StatusCode::BAD_GATEWAY,
            SignalError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
