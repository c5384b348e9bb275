//! Treasury Orchestrator
//!
//! Sequences compliance, chain submission and ledger writes for payouts,
//! mints, burns and emergency actions.
//!
//! A weekly payout runs as a saga under a single-writer lock:
//! 1. validate the request
//! 2. reconcile any PENDING intent, refusing while one stays unresolved
//! 3. enforce the 7 day window and the paused flag
//! 4. compliance check (audited)
//! 5. write a PENDING intent
//! 6. submit, attach the signature, confirm
//! 7. mark COMPLETED and credit both company balances in one ledger step
//! 8. notify, best effort
//!
//! A crash or an ambiguous chain error after step 5 leaves a PENDING intent
//! that is reconciled against the chain by the next payout request or by
//! `recover_pending_payouts` at startup.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::chain::{ChainError, ChainGateway, SignatureStatus, TreasuryAccount};
use crate::clock::{Clock, SystemClock};
use crate::compliance::{AmlProvider, ComplianceChecker, PermissiveAml};
use crate::constants::{ECE_PER_USDC, PAYOUT_REVIEW_RISK_THRESHOLD};
use crate::error::{Result, TreasuryError};
use crate::ledger::LedgerStore;
use crate::notify::{LogNotifier, PayoutNotifier};
use crate::status::{next_payout_after, reserve_ratio, StatusReporter};
use crate::types::{
    BurnReceipt, ComplianceCheck, ComplianceType, EmergencyAction, EmergencyActionKind,
    EmergencyReceipt, LedgerTransaction, MintReceipt, PayoutMetadata, PayoutReceipt, PayoutRecord,
    PayoutStatus, RecoveryReport, TransactionKind, WeeklyPayoutRequest,
};

/// Requested payout percentage as an exact decimal.
///
/// Parsed from the shortest decimal form of the float, so `33.335` is
/// exactly 33.335 rather than the nearest binary fraction below it.
/// Accepts any finite value in [0, 100].
pub fn parse_percentage(percentage: f64) -> Result<Decimal> {
    if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
        return Err(TreasuryError::InvalidPercentage(percentage));
    }
    Decimal::from_str(&percentage.to_string())
        .ok()
        .or_else(|| Decimal::from_f64_retain(percentage))
        .map(|d| d.normalize())
        .ok_or(TreasuryError::InvalidPercentage(percentage))
}

/// Split revenue into (converted, retained) with
/// `converted = floor(revenue * percentage / 100)`.
/// The two always sum to `revenue`.
pub fn split_revenue(revenue: u64, percentage: Decimal) -> (u64, u64) {
    let percentage = percentage.normalize();
    let scale = 10u128.pow(percentage.scale());
    let mantissa = percentage.mantissa().clamp(0, 100 * scale as i128) as u128;

    let converted = match (revenue as u128).checked_mul(mantissa) {
        Some(numerator) => (numerator / (100 * scale)) as u64,
        None => Decimal::from(revenue)
            .checked_mul(percentage)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .and_then(|v| v.floor().to_u64())
            .unwrap_or(revenue),
    }
    .min(revenue);

    (converted, revenue - converted)
}

/// Fails when the last completed payout is less than a week old
pub fn ensure_payout_window(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<()> {
    if let Some(last) = last {
        let next_window = next_payout_after(last);
        if now < next_window {
            return Err(TreasuryError::PayoutWindowClosed { next_window });
        }
    }
    Ok(())
}

fn normalize_signers(signers: &[String]) -> Result<BTreeSet<String>> {
    let set: BTreeSet<String> = signers
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if set.is_empty() {
        return Err(TreasuryError::Validation(
            "at least one authorized signer is required".to_string(),
        ));
    }
    Ok(set)
}

/// Payouts are held for manual review only when compliance did not approve
/// them and the risk is above the review threshold
fn payout_needs_review(check: &ComplianceCheck) -> bool {
    !check.approved && check.risk_score > PAYOUT_REVIEW_RISK_THRESHOLD
}

fn require_wallet(wallet: &str) -> Result<()> {
    if wallet.trim().is_empty() {
        return Err(TreasuryError::Validation("wallet address is required".to_string()));
    }
    Ok(())
}

fn require_amount(amount: u64) -> Result<()> {
    if amount == 0 {
        return Err(TreasuryError::Validation(
            "amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn ensure_approved(check: &ComplianceCheck) -> Result<()> {
    if !check.approved {
        return Err(TreasuryError::ComplianceRejected {
            risk_score: check.risk_score,
        });
    }
    Ok(())
}

pub struct TreasuryOrchestrator {
    ledger: Arc<dyn LedgerStore>,
    chain: Arc<dyn ChainGateway>,
    aml: Arc<dyn AmlProvider>,
    notifier: Arc<dyn PayoutNotifier>,
    clock: Arc<dyn Clock>,
    emergency_signers: HashSet<String>,
    payout_lock: Mutex<()>,
    paused: Arc<AtomicBool>,
}

impl TreasuryOrchestrator {
    pub fn new<I>(ledger: Arc<dyn LedgerStore>, chain: Arc<dyn ChainGateway>, emergency_signers: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            ledger,
            chain,
            aml: Arc::new(PermissiveAml),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
            emergency_signers: emergency_signers.into_iter().collect(),
            payout_lock: Mutex::new(()),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_aml(mut self, aml: Arc<dyn AmlProvider>) -> Self {
        self.aml = aml;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn PayoutNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn compliance(&self) -> ComplianceChecker {
        ComplianceChecker::new(self.ledger.clone(), self.aml.clone(), self.clock.clone())
    }

    /// Read-only view sharing this orchestrator's pause flag
    pub fn status_reporter(&self) -> StatusReporter {
        StatusReporter::new(
            self.ledger.clone(),
            self.chain.clone(),
            self.clock.clone(),
            self.paused.clone(),
        )
    }

    pub fn is_emergency_signer(&self, address: &str) -> bool {
        self.emergency_signers.contains(address)
    }

    /// Paused by this process, regardless of the on-chain flag
    pub fn is_locally_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Current treasury account, failing when operations are paused
    async fn ensure_not_paused(&self) -> Result<TreasuryAccount> {
        if self.is_locally_paused() {
            return Err(TreasuryError::TreasuryPaused);
        }
        let account = self.chain.treasury_account().await?;
        if account.is_paused {
            return Err(TreasuryError::TreasuryPaused);
        }
        Ok(account)
    }

    async fn mark_failed(&self, payout_id: &str, reason: &str) {
        match self.ledger.fail_payout(payout_id, reason).await {
            Ok(_) => tracing::warn!(payout_id, reason, "payout marked failed"),
            Err(e) => tracing::error!(payout_id, error = %e, "could not mark payout failed"),
        }
    }

    async fn notify_completed(&self, record: &PayoutRecord) {
        if let Err(e) = self.notifier.payout_completed(record).await {
            tracing::warn!(payout_id = %record.id, error = %e, "payout notification failed");
        }
    }

    pub async fn process_weekly_payout(&self, request: WeeklyPayoutRequest) -> Result<PayoutReceipt> {
        let percentage = parse_percentage(request.payout_percentage)?;
        let signers = normalize_signers(&request.authorized_signers)?;

        let _guard = self.payout_lock.lock().await;

        if !self.ledger.pending_payouts().await?.is_empty() {
            let report = self.reconcile_pending().await?;
            if let Some(pending) = report.unresolved().next() {
                return Err(TreasuryError::PayoutInProgress(pending.clone()));
            };
        }

        let now = self.clock.now();
        let last = self.ledger.last_completed_payout().await?;
        ensure_payout_window(last.map(|p| p.created_at), now)?;

        let account = self.ensure_not_paused().await?;

        let (ece_converted, ece_retained) = split_revenue(request.revenue_amount, percentage);
        let usdc_received = ece_converted / ECE_PER_USDC;

        let payout_id = Uuid::new_v4().to_string();
        let compliance_id = format!("{}_{}", ComplianceType::Payout.prefix(), payout_id);
        let parties: Vec<String> = signers.iter().cloned().collect();
        let check = self
            .compliance()
            .perform_check(&compliance_id, ece_converted, ComplianceType::Payout, &parties)
            .await?;

        if payout_needs_review(&check) {
            tracing::warn!(
                payout_id = %payout_id,
                risk_score = check.risk_score,
                aml_cleared = check.aml_cleared,
                "payout rejected by compliance"
            );
            return Err(TreasuryError::ComplianceRejected {
                risk_score: check.risk_score,
            });
        }
        if !check.approved {
            tracing::warn!(
                payout_id = %payout_id,
                risk_score = check.risk_score,
                aml_cleared = check.aml_cleared,
                "payout proceeding without compliance approval"
            );
        }

        let record = PayoutRecord {
            id: payout_id.clone(),
            created_at: now,
            revenue_amount: request.revenue_amount,
            payout_percentage: request.payout_percentage,
            ece_converted,
            usdc_received,
            transaction_signature: None,
            status: PayoutStatus::Pending,
            authorized_signers: signers,
            compliance_approved: check.approved,
            metadata: PayoutMetadata {
                reserve_ratio_before_payout: reserve_ratio(
                    account.ece_circulation,
                    account.usdc_reserves,
                ),
                compliance_transaction_id: compliance_id,
                compliance_notes: Some(check.notes),
                ece_retained,
                ..Default::default()
            },
        };
        self.ledger.insert_payout(&record).await?;
        tracing::info!(
            payout_id = %payout_id,
            revenue_amount = request.revenue_amount,
            ece_converted,
            ece_retained,
            "payout intent recorded"
        );

        let tx = self.chain.builder().weekly_payout(request.revenue_amount, ece_converted);
        let signature = match self.chain.submit(&tx).await {
            Ok(signature) => signature,
            Err(e) => {
                self.mark_failed(&payout_id, &e.to_string()).await;
                return Err(e.into());
            }
        };

        // Completion records the signature too, so an attach failure only
        // matters when the payout cannot be completed now
        let attach_error = self
            .ledger
            .attach_payout_signature(&payout_id, &signature)
            .await
            .err();
        if let Some(e) = &attach_error {
            tracing::error!(payout_id = %payout_id, %signature, error = %e, "could not attach signature to payout intent");
        }

        if let Err(e) = self.chain.confirm(&signature).await {
            if let ChainError::TransactionFailed(reason) = &e {
                self.mark_failed(&payout_id, reason).await;
                return Err(e.into());
            }
            if let Some(attach) = attach_error {
                tracing::error!(
                    payout_id = %payout_id,
                    %signature,
                    error = %e,
                    "unconfirmed payout has no recorded signature, needs manual review"
                );
                return Err(attach.into());
            }
            tracing::warn!(
                payout_id = %payout_id,
                %signature,
                error = %e,
                "payout confirmation unresolved, intent left PENDING for recovery"
            );
            return Err(e.into());
        }

        let completed = self
            .ledger
            .complete_payout(&payout_id, &signature, self.clock.now())
            .await
            .map_err(|e| {
                tracing::error!(
                    payout_id = %payout_id,
                    %signature,
                    error = %e,
                    "payout confirmed on-chain but not completed in the ledger"
                );
                e
            })?;

        self.notify_completed(&completed).await;

        Ok(PayoutReceipt {
            payout_id,
            ece_converted,
            ece_retained,
            usdc_received,
            transaction_signature: signature,
        })
    }

    pub async fn mint_ece_tokens(&self, user_wallet: &str, usdc_amount: u64) -> Result<MintReceipt> {
        require_wallet(user_wallet)?;
        require_amount(usdc_amount)?;
        self.ensure_not_paused().await?;

        let ece_amount = usdc_amount
            .checked_mul(ECE_PER_USDC)
            .ok_or_else(|| TreasuryError::Validation("amount too large".to_string()))?;

        let transaction_id = Uuid::new_v4().to_string();
        let compliance_id = format!("{}_{}", ComplianceType::Mint.prefix(), transaction_id);
        let check = self
            .compliance()
            .perform_check(
                &compliance_id,
                usdc_amount,
                ComplianceType::Mint,
                &[user_wallet.to_string()],
            )
            .await?;
        ensure_approved(&check)?;

        let tx = self.chain.builder().mint(user_wallet, ece_amount);
        let signature = self.chain.send_and_confirm(&tx).await?;

        self.log_transaction(
            &transaction_id,
            user_wallet,
            TransactionKind::EceMint,
            ece_amount,
            format!("Minted {} ECE for {} USDC", ece_amount, usdc_amount),
            &signature,
        )
        .await?;

        tracing::info!(transaction_id = %transaction_id, wallet = user_wallet, ece_amount, %signature, "ECE minted");

        Ok(MintReceipt {
            transaction_id,
            ece_amount,
            transaction_signature: signature,
        })
    }

    pub async fn burn_ece_tokens(&self, user_wallet: &str, ece_amount: u64) -> Result<BurnReceipt> {
        require_wallet(user_wallet)?;
        require_amount(ece_amount)?;
        let account = self.ensure_not_paused().await?;

        let usdc_amount = ece_amount / ECE_PER_USDC;
        if account.usdc_reserves < usdc_amount {
            return Err(TreasuryError::InsufficientReserves {
                requested: usdc_amount,
                available: account.usdc_reserves,
            });
        }

        let transaction_id = Uuid::new_v4().to_string();
        let compliance_id = format!("{}_{}", ComplianceType::Burn.prefix(), transaction_id);
        let check = self
            .compliance()
            .perform_check(
                &compliance_id,
                ece_amount,
                ComplianceType::Burn,
                &[user_wallet.to_string()],
            )
            .await?;
        ensure_approved(&check)?;

        let tx = self.chain.builder().burn(user_wallet, ece_amount);
        let signature = self.chain.send_and_confirm(&tx).await?;

        self.log_transaction(
            &transaction_id,
            user_wallet,
            TransactionKind::EceBurn,
            ece_amount,
            format!("Burned {} ECE for {} USDC", ece_amount, usdc_amount),
            &signature,
        )
        .await?;

        tracing::info!(transaction_id = %transaction_id, wallet = user_wallet, ece_amount, %signature, "ECE burned");

        Ok(BurnReceipt {
            transaction_id,
            usdc_amount,
            transaction_signature: signature,
        })
    }

    async fn log_transaction(
        &self,
        id: &str,
        user_id: &str,
        kind: TransactionKind,
        amount: u64,
        description: String,
        signature: &str,
    ) -> Result<()> {
        let entry = LedgerTransaction {
            id: id.to_string(),
            user_id: user_id.to_string(),
            kind,
            amount,
            description,
            transaction_signature: Some(signature.to_string()),
            created_at: self.clock.now(),
        };
        self.ledger.record_transaction(&entry).await.map_err(|e| {
            tracing::error!(transaction_id = id, signature, error = %e, "confirmed transaction not logged");
            e
        })?;
        Ok(())
    }

    pub async fn emergency_pause(&self, signer: &str, reason: &str) -> Result<EmergencyReceipt> {
        if !self.is_emergency_signer(signer) {
            tracing::warn!(signer, "emergency pause refused for unauthorized signer");
            return Err(TreasuryError::UnauthorizedSigner(signer.to_string()));
        }

        let tx = self.chain.builder().emergency_pause();
        let signature = self.chain.send_and_confirm(&tx).await?;
        self.paused.store(true, Ordering::SeqCst);

        let action = EmergencyAction {
            id: Uuid::new_v4().to_string(),
            action: EmergencyActionKind::Pause,
            authorized_by: signer.to_string(),
            reason: reason.to_string(),
            transaction_signature: signature.clone(),
            timestamp: self.clock.now(),
        };
        self.ledger.append_emergency_action(&action).await?;

        tracing::warn!(signer, reason, %signature, "treasury paused");

        Ok(EmergencyReceipt {
            action_id: action.id,
            action: EmergencyActionKind::Pause,
            transaction_signature: signature,
        })
    }

    /// No authorization policy exists for unpausing yet
    pub async fn emergency_unpause(&self, signer: &str) -> Result<EmergencyReceipt> {
        tracing::warn!(signer, "emergency unpause requested");
        Err(TreasuryError::NotImplemented(
            "emergency unpause is not yet implemented".to_string(),
        ))
    }

    /// Append a platform revenue entry for weekly aggregation
    pub async fn record_revenue(
        &self,
        kind: TransactionKind,
        payer: &str,
        amount: u64,
        description: &str,
    ) -> Result<LedgerTransaction> {
        if !kind.is_revenue() {
            return Err(TreasuryError::Validation(format!(
                "{:?} is not a revenue transaction kind",
                kind
            )));
        }
        require_wallet(payer)?;
        require_amount(amount)?;

        let entry = LedgerTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: payer.to_string(),
            kind,
            amount,
            description: description.to_string(),
            transaction_signature: None,
            created_at: self.clock.now(),
        };
        self.ledger.record_transaction(&entry).await?;
        tracing::debug!(transaction_id = %entry.id, ?kind, amount, "revenue recorded");
        Ok(entry)
    }

    /// Reconcile PENDING payout intents against the chain
    pub async fn recover_pending_payouts(&self) -> Result<RecoveryReport> {
        let _guard = self.payout_lock.lock().await;
        self.reconcile_pending().await
    }

    /// Caller holds the payout lock
    async fn reconcile_pending(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for intent in self.ledger.pending_payouts().await? {
            // Funds may have moved; only an operator can settle it
            let Some(signature) = intent.transaction_signature.clone() else {
                tracing::error!(payout_id = %intent.id, "pending payout has no transaction signature, needs manual review");
                report.needs_review.push(intent.id);
                continue;
            };

            match self.chain.signature_status(&signature).await {
                Ok(SignatureStatus::Confirmed) => {
                    let completed = self
                        .ledger
                        .complete_payout(&intent.id, &signature, self.clock.now())
                        .await?;
                    tracing::info!(payout_id = %intent.id, %signature, "pending payout completed");
                    self.notify_completed(&completed).await;
                    report.completed.push(intent.id);
                }
                Ok(SignatureStatus::Failed(reason)) => {
                    self.mark_failed(&intent.id, &reason).await;
                    report.failed.push(intent.id);
                }
                Ok(SignatureStatus::Pending) => report.still_pending.push(intent.id),
                Err(e) => {
                    tracing::warn!(payout_id = %intent.id, %signature, error = %e, "signature status unavailable");
                    report.still_pending.push(intent.id);
                }
            }
        }

        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            still_pending = report.still_pending.len(),
            needs_review = report.needs_review.len(),
            "payout recovery finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pct(value: f64) -> Decimal {
        parse_percentage(value).unwrap()
    }

    #[test]
    fn test_percentage_bounds() {
        assert_eq!(pct(0.0), Decimal::ZERO);
        assert_eq!(pct(100.0), Decimal::ONE_HUNDRED);
        assert_eq!(pct(33.335), Decimal::new(33_335, 3));
        assert_eq!(pct(12.3456), Decimal::new(123_456, 4));

        for bad in [-0.01, 100.01, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                parse_percentage(bad),
                Err(TreasuryError::InvalidPercentage(_))
            ));
        }
    }

    #[test]
    fn test_split_conserves_revenue() {
        assert_eq!(split_revenue(10_000, pct(80.0)), (8_000, 2_000));
        assert_eq!(split_revenue(200_000, pct(100.0)), (200_000, 0));
        assert_eq!(split_revenue(7, pct(50.0)), (3, 4));
        assert_eq!(split_revenue(u64::MAX, pct(100.0)), (u64::MAX, 0));
        assert_eq!(split_revenue(u64::MAX, pct(0.0)), (0, u64::MAX));

        for revenue in [0u64, 1, 99, 12_345, 1_000_001, u64::MAX] {
            for value in [0.0, 0.01, 33.33, 50.0, 99.99, 100.0] {
                let (converted, retained) = split_revenue(revenue, pct(value));
                assert_eq!(converted + retained, revenue);
            }
        }
    }

    #[test]
    fn test_split_floors_exact_fractional_percentages() {
        assert_eq!(split_revenue(1_000_000, pct(0.005)).0, 50);
        assert_eq!(split_revenue(1_000_000, pct(33.335)).0, 333_350);
        assert_eq!(split_revenue(1_000, pct(33.335)).0, 333);
        assert_eq!(split_revenue(1_000_000, pct(12.3456)).0, 123_456);
        assert_eq!(split_revenue(10_000, pct(12.3456)).0, 1_234);

        // (percentage, digits, scale) so that percentage == digits / 10^scale
        let cases: [(f64, u128, u32); 7] = [
            (0.005, 5, 3),
            (33.335, 33_335, 3),
            (12.3456, 123_456, 4),
            (0.0001, 1, 4),
            (99.9999, 999_999, 4),
            (66.6666666, 666_666_666, 7),
            (0.1, 1, 1),
        ];
        for (value, digits, scale) in cases {
            for revenue in [1u64, 3, 199, 10_000, 1_000_000, 987_654_321, u64::MAX] {
                let expected = revenue as u128 * digits / (100 * 10u128.pow(scale));
                let (converted, retained) = split_revenue(revenue, pct(value));
                assert_eq!(converted as u128, expected, "{} of {}", value, revenue);
                assert_eq!(converted + retained, revenue);
            }
        }
    }

    #[test]
    fn test_unapproved_payout_held_only_above_review_threshold() {
        let check = |approved: bool, risk_score: u8| ComplianceCheck {
            transaction_id: "payout_1".to_string(),
            check_type: ComplianceType::Payout,
            amount: 1,
            kyc_required: false,
            aml_cleared: approved,
            risk_score,
            approved,
            notes: String::new(),
            created_at: Utc::now(),
        };
        assert!(!payout_needs_review(&check(true, 30)));
        assert!(!payout_needs_review(&check(false, 30)));
        assert!(!payout_needs_review(&check(false, PAYOUT_REVIEW_RISK_THRESHOLD)));
        assert!(payout_needs_review(&check(false, 90)));
    }

    #[test]
    fn test_payout_window() {
        let now = Utc::now();
        assert!(ensure_payout_window(None, now).is_ok());
        assert!(ensure_payout_window(Some(now - Duration::days(7)), now).is_ok());
        assert!(matches!(
            ensure_payout_window(Some(now - Duration::days(6)), now),
            Err(TreasuryError::PayoutWindowClosed { .. })
        ));
        assert!(matches!(
            ensure_payout_window(Some(now - Duration::days(7) + Duration::milliseconds(1)), now),
            Err(TreasuryError::PayoutWindowClosed { .. })
        ));
    }

    #[test]
    fn test_signer_normalization() {
        let signers = normalize_signers(&[" a ".to_string(), "a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(signers.len(), 2);
        assert!(normalize_signers(&[]).is_err());
        assert!(normalize_signers(&["  ".to_string()]).is_err());

        let many: Vec<String> = (0..12).map(|i| format!("s{}", i)).collect();
        assert_eq!(normalize_signers(&many).unwrap().len(), 12);
    }
}
