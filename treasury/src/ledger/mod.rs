//! Ledger Accessor
//!
//! Persistence boundary for payout records, compliance audit entries,
//! company balances, emergency actions and the generic transaction log.
//!
//! Invariants every backend upholds:
//! - payout status only moves PENDING -> COMPLETED | FAILED
//! - compliance checks and emergency actions are append-only
//! - completing a payout and crediting both company balances is one atomic step

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    CompanyBalance, ComplianceCheck, Currency, EmergencyAction, LedgerTransaction, PayoutRecord,
    PayoutStatus, TransactionKind,
};

pub use memory::MemoryLedger;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Invalid status transition for payout {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: PayoutStatus,
        to: PayoutStatus,
    },

    #[error("Balance overflow for {0}")]
    BalanceOverflow(Currency),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Payouts

    /// Insert a new payout record (normally PENDING)
    async fn insert_payout(&self, record: &PayoutRecord) -> LedgerResult<()>;

    /// Record the chain signature of a PENDING payout
    async fn attach_payout_signature(&self, id: &str, signature: &str) -> LedgerResult<()>;

    /// Mark a PENDING payout COMPLETED and credit the retained ECE and the
    /// received USDC to the company balances, atomically
    async fn complete_payout(
        &self,
        id: &str,
        signature: &str,
        completed_at: DateTime<Utc>,
    ) -> LedgerResult<PayoutRecord>;

    /// Mark a PENDING payout FAILED
    async fn fail_payout(&self, id: &str, reason: &str) -> LedgerResult<PayoutRecord>;

    async fn get_payout(&self, id: &str) -> LedgerResult<Option<PayoutRecord>>;

    /// Most recent COMPLETED payout by creation time
    async fn last_completed_payout(&self) -> LedgerResult<Option<PayoutRecord>>;

    async fn pending_payouts(&self) -> LedgerResult<Vec<PayoutRecord>>;

    /// Payouts newest first
    async fn list_payouts(&self, skip: u64, limit: u64) -> LedgerResult<Vec<PayoutRecord>>;

    async fn count_payouts(&self) -> LedgerResult<u64>;

    // Compliance audit log

    async fn append_compliance_check(&self, check: &ComplianceCheck) -> LedgerResult<()>;

    async fn compliance_checks_for(&self, transaction_id: &str)
        -> LedgerResult<Vec<ComplianceCheck>>;

    // Company balances, credited only by `complete_payout`

    async fn balances(&self) -> LedgerResult<Vec<CompanyBalance>>;

    // Emergency actions

    async fn append_emergency_action(&self, action: &EmergencyAction) -> LedgerResult<()>;

    async fn emergency_actions(&self) -> LedgerResult<Vec<EmergencyAction>>;

    // Transaction log

    async fn record_transaction(&self, tx: &LedgerTransaction) -> LedgerResult<()>;

    /// Sum of amounts of the given kinds created at or after `since`
    async fn sum_transactions(
        &self,
        kinds: &[TransactionKind],
        since: DateTime<Utc>,
    ) -> LedgerResult<u64>;

    /// Flush buffered writes to durable storage
    async fn flush(&self) -> LedgerResult<()> {
        Ok(())
    }
}

/// Apply the PENDING -> COMPLETED transition to a record in place
pub fn apply_completion(
    record: &mut PayoutRecord,
    signature: &str,
    completed_at: DateTime<Utc>,
) -> LedgerResult<()> {
    ensure_pending(record, PayoutStatus::Completed)?;
    record.status = PayoutStatus::Completed;
    record.transaction_signature = Some(signature.to_string());
    record.metadata.completed_at = Some(completed_at);
    Ok(())
}

/// Apply the PENDING -> FAILED transition to a record in place
pub fn apply_failure(record: &mut PayoutRecord, reason: &str) -> LedgerResult<()> {
    ensure_pending(record, PayoutStatus::Failed)?;
    record.status = PayoutStatus::Failed;
    record.metadata.failure_reason = Some(reason.to_string());
    Ok(())
}

/// Only PENDING payouts may change
pub fn ensure_pending(record: &PayoutRecord, to: PayoutStatus) -> LedgerResult<()> {
    if record.status != PayoutStatus::Pending {
        return Err(LedgerError::InvalidTransition {
            id: record.id.clone(),
            from: record.status,
            to,
        });
    }
    Ok(())
}

/// Balance increments credited by a completed payout
pub fn completion_credits(record: &PayoutRecord) -> [(Currency, u64); 2] {
    [
        (Currency::Ece, record.metadata.ece_retained),
        (Currency::Usdc, record.usdc_received),
    ]
}
