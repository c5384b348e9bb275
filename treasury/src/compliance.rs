//! Compliance Checker
//!
//! Scores a transaction's risk and records an immutable audit entry for
//! every check, whatever the outcome.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::constants::{APPROVAL_RISK_LIMIT, KYC_THRESHOLD};
use crate::error::Result;
use crate::ledger::LedgerStore;
use crate::types::{ComplianceCheck, ComplianceType};

#[derive(Error, Debug)]
#[error("AML provider error: {0}")]
pub struct AmlError(pub String);

/// External anti-money-laundering screening
#[async_trait]
pub trait AmlProvider: Send + Sync {
    /// Returns true when the parties are cleared to move `amount`
    async fn check(&self, amount: u64, parties: &[String]) -> std::result::Result<bool, AmlError>;
}

/// Clears everything. Development and test wiring only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveAml;

#[async_trait]
impl AmlProvider for PermissiveAml {
    async fn check(&self, _amount: u64, _parties: &[String]) -> std::result::Result<bool, AmlError> {
        Ok(true)
    }
}

/// Step function of amount, monotonic non-decreasing
pub fn calculate_risk_score(amount: u64) -> u8 {
    match amount {
        a if a > 100_000 => 90,
        a if a > 50_000 => 70,
        a if a > 10_000 => 50,
        a if a > 1_000 => 30,
        _ => 10,
    }
}

pub fn kyc_required(amount: u64) -> bool {
    amount > KYC_THRESHOLD
}

/// Approval rule shared by every transaction type
pub fn is_approved(risk_score: u8, aml_cleared: bool) -> bool {
    risk_score < APPROVAL_RISK_LIMIT && aml_cleared
}

#[derive(Clone)]
pub struct ComplianceChecker {
    ledger: Arc<dyn LedgerStore>,
    aml: Arc<dyn AmlProvider>,
    clock: Arc<dyn Clock>,
}

impl ComplianceChecker {
    pub fn new(ledger: Arc<dyn LedgerStore>, aml: Arc<dyn AmlProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { ledger, aml, clock }
    }

    /// Score, decide and persist one compliance check.
    ///
    /// An AML provider failure is recorded as not cleared, which rejects the
    /// transaction. A failure to persist the audit record aborts with a
    /// persistence error.
    pub async fn perform_check(
        &self,
        transaction_id: &str,
        amount: u64,
        check_type: ComplianceType,
        parties: &[String],
    ) -> Result<ComplianceCheck> {
        let risk_score = calculate_risk_score(amount);

        let (aml_cleared, aml_note) = match self.aml.check(amount, parties).await {
            Ok(cleared) => (cleared, None),
            Err(e) => {
                tracing::warn!(transaction_id, error = %e, "AML screening unavailable");
                (false, Some(e.to_string()))
            }
        };

        let approved = is_approved(risk_score, aml_cleared);
        let notes = match aml_note {
            Some(note) => format!("Risk score: {}; {}", risk_score, note),
            None => format!("Risk score: {}", risk_score),
        };

        let check = ComplianceCheck {
            transaction_id: transaction_id.to_string(),
            amount,
            check_type,
            risk_score,
            kyc_required: kyc_required(amount),
            aml_cleared,
            approved,
            notes,
            created_at: self.clock.now(),
        };

        self.ledger.append_compliance_check(&check).await?;

        tracing::info!(
            transaction_id,
            amount,
            risk_score,
            kyc_required = check.kyc_required,
            approved,
            "compliance check recorded"
        );

        Ok(check)
    }
}
