//! Treasury error types

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::chain::ChainError;
use crate::ledger::LedgerError;

/// Treasury operation errors
#[derive(Error, Debug)]
pub enum TreasuryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payout percentage must be between 0 and 100 (got {0})")]
    InvalidPercentage(f64),

    #[error("Weekly payout window not active. Must wait 7 days since last payout (next window opens {next_window})")]
    PayoutWindowClosed { next_window: DateTime<Utc> },

    #[error("Payout {0} is awaiting reconciliation")]
    PayoutInProgress(String),

    #[error("Transaction flagged by compliance system (risk score {risk_score}). Manual review required.")]
    ComplianceRejected { risk_score: u8 },

    #[error("Insufficient USDC reserves for redemption: requested {requested}, available {available}")]
    InsufficientReserves { requested: u64, available: u64 },

    #[error("Unauthorized signer for emergency operations: {0}")]
    UnauthorizedSigner(String),

    #[error("Treasury operations are paused")]
    TreasuryPaused,

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Chain submission failed: {0}")]
    ChainSubmission(#[from] ChainError),

    #[error("Ledger persistence failed: {0}")]
    Persistence(#[from] LedgerError),
}

impl TreasuryError {
    /// Stable machine readable code for this error class
    pub fn code(&self) -> &'static str {
        match self {
            TreasuryError::Validation(_) => "validation_error",
            TreasuryError::InvalidPercentage(_) => "invalid_percentage",
            TreasuryError::PayoutWindowClosed { .. } => "payout_window_closed",
            TreasuryError::PayoutInProgress(_) => "payout_in_progress",
            TreasuryError::ComplianceRejected { .. } => "compliance_rejected",
            TreasuryError::InsufficientReserves { .. } => "insufficient_reserves",
            TreasuryError::UnauthorizedSigner(_) => "unauthorized_signer",
            TreasuryError::TreasuryPaused => "treasury_paused",
            TreasuryError::NotImplemented(_) => "not_implemented",
            TreasuryError::ChainSubmission(_) => "chain_submission_error",
            TreasuryError::Persistence(_) => "persistence_error",
        }
    }

    /// True for failures detected before any side effect took place
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            TreasuryError::Validation(_)
                | TreasuryError::InvalidPercentage(_)
                | TreasuryError::PayoutWindowClosed { .. }
                | TreasuryError::PayoutInProgress(_)
                | TreasuryError::InsufficientReserves { .. }
                | TreasuryError::UnauthorizedSigner(_)
                | TreasuryError::TreasuryPaused
                | TreasuryError::NotImplemented(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TreasuryError>;
