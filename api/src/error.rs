//! API Error Handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ece_treasury::{ChainError, TreasuryError};
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Missing x-wallet-address header")]
    MissingWallet,

    #[error("Invalid wallet address: {0}")]
    InvalidWallet(String),

    #[error("Wallet {0} is not authorized for this operation")]
    Forbidden(String),

    #[error(transparent)]
    Treasury(#[from] TreasuryError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingWallet | ApiError::InvalidWallet(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Treasury(err) => treasury_status(err),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::MissingWallet => "missing_wallet",
            ApiError::InvalidWallet(_) => "invalid_wallet",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Treasury(err) => err.code(),
        }
    }
}

fn treasury_status(err: &TreasuryError) -> StatusCode {
    match err {
        TreasuryError::Validation(_) | TreasuryError::InvalidPercentage(_) => {
            StatusCode::BAD_REQUEST
        }
        TreasuryError::UnauthorizedSigner(_) => StatusCode::FORBIDDEN,
        TreasuryError::PayoutWindowClosed { .. }
        | TreasuryError::PayoutInProgress(_)
        | TreasuryError::TreasuryPaused
        | TreasuryError::InsufficientReserves { .. } => StatusCode::CONFLICT,
        TreasuryError::ComplianceRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TreasuryError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        TreasuryError::ChainSubmission(_) => StatusCode::BAD_GATEWAY,
        TreasuryError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
            "code": self.code(),
        }));

        (status, body).into_response()
    }
}
