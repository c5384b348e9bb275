//! In-memory ledger, used for tests and the `memory` storage mode

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    apply_completion, apply_failure, completion_credits, ensure_pending, LedgerError,
    LedgerResult, LedgerStore,
};
use crate::types::{
    CompanyBalance, ComplianceCheck, Currency, EmergencyAction, LedgerTransaction, PayoutRecord,
    PayoutStatus, TransactionKind,
};

#[derive(Debug, Default)]
struct LedgerState {
    /// Payouts in insertion order
    payouts: Vec<PayoutRecord>,
    compliance: Vec<ComplianceCheck>,
    balances: HashMap<Currency, CompanyBalance>,
    emergency: Vec<EmergencyAction>,
    transactions: Vec<LedgerTransaction>,
}

impl LedgerState {
    fn payout_mut(&mut self, id: &str) -> LedgerResult<&mut PayoutRecord> {
        self.payouts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| LedgerError::NotFound(format!("payout {}", id)))
    }

    fn credit(
        &mut self,
        currency: Currency,
        amount: u64,
        at: DateTime<Utc>,
    ) -> LedgerResult<CompanyBalance> {
        let row = self.balances.entry(currency).or_insert(CompanyBalance {
            currency,
            amount: 0,
            last_updated: at,
        });
        row.amount = row
            .amount
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(currency))?;
        row.last_updated = at;
        Ok(row.clone())
    }

    fn check_credit(&self, currency: Currency, amount: u64) -> LedgerResult<()> {
        let current = self.balances.get(&currency).map(|b| b.amount).unwrap_or(0);
        current
            .checked_add(amount)
            .map(|_| ())
            .ok_or(LedgerError::BalanceOverflow(currency))
    }
}

/// Thread-safe in-memory ledger. A single lock guards all tables, so every
/// method is atomic.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compliance audit records
    pub async fn compliance_count(&self) -> usize {
        self.state.read().await.compliance.len()
    }

    /// Number of logged transactions
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn insert_payout(&self, record: &PayoutRecord) -> LedgerResult<()> {
        let mut state = self.state.write().await;
        if state.payouts.iter().any(|p| p.id == record.id) {
            return Err(LedgerError::Duplicate(format!("payout {}", record.id)));
        }
        state.payouts.push(record.clone());
        Ok(())
    }

    async fn attach_payout_signature(&self, id: &str, signature: &str) -> LedgerResult<()> {
        let mut state = self.state.write().await;
        let record = state.payout_mut(id)?;
        ensure_pending(record, PayoutStatus::Pending)?;
        record.transaction_signature = Some(signature.to_string());
        Ok(())
    }

    async fn complete_payout(
        &self,
        id: &str,
        signature: &str,
        completed_at: DateTime<Utc>,
    ) -> LedgerResult<PayoutRecord> {
        let mut state = self.state.write().await;

        let mut updated = state.payout_mut(id)?.clone();
        apply_completion(&mut updated, signature, completed_at)?;
        let credits = completion_credits(&updated);
        for (currency, amount) in credits {
            state.check_credit(currency, amount)?;
        }

        for (currency, amount) in credits {
            state.credit(currency, amount, completed_at)?;
        }
        *state.payout_mut(id)? = updated.clone();
        Ok(updated)
    }

    async fn fail_payout(&self, id: &str, reason: &str) -> LedgerResult<PayoutRecord> {
        let mut state = self.state.write().await;
        let record = state.payout_mut(id)?;
        apply_failure(record, reason)?;
        Ok(record.clone())
    }

    async fn get_payout(&self, id: &str) -> LedgerResult<Option<PayoutRecord>> {
        let state = self.state.read().await;
        Ok(state.payouts.iter().find(|p| p.id == id).cloned())
    }

    async fn last_completed_payout(&self) -> LedgerResult<Option<PayoutRecord>> {
        let state = self.state.read().await;
        Ok(state
            .payouts
            .iter()
            .filter(|p| p.status == PayoutStatus::Completed)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn pending_payouts(&self) -> LedgerResult<Vec<PayoutRecord>> {
        let state = self.state.read().await;
        Ok(state
            .payouts
            .iter()
            .filter(|p| p.status == PayoutStatus::Pending)
            .cloned()
            .collect())
    }

    async fn list_payouts(&self, skip: u64, limit: u64) -> LedgerResult<Vec<PayoutRecord>> {
        let state = self.state.read().await;
        // Later inserts win ties on created_at
        let mut ordered: Vec<&PayoutRecord> = state.payouts.iter().rev().collect();
        ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ordered
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_payouts(&self) -> LedgerResult<u64> {
        Ok(self.state.read().await.payouts.len() as u64)
    }

    async fn append_compliance_check(&self, check: &ComplianceCheck) -> LedgerResult<()> {
        self.state.write().await.compliance.push(check.clone());
        Ok(())
    }

    async fn compliance_checks_for(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<Vec<ComplianceCheck>> {
        let state = self.state.read().await;
        Ok(state
            .compliance
            .iter()
            .filter(|c| c.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn balances(&self) -> LedgerResult<Vec<CompanyBalance>> {
        let state = self.state.read().await;
        let mut rows: Vec<CompanyBalance> = state.balances.values().cloned().collect();
        rows.sort_by_key(|b| b.currency);
        Ok(rows)
    }

    async fn append_emergency_action(&self, action: &EmergencyAction) -> LedgerResult<()> {
        self.state.write().await.emergency.push(action.clone());
        Ok(())
    }

    async fn emergency_actions(&self) -> LedgerResult<Vec<EmergencyAction>> {
        Ok(self.state.read().await.emergency.clone())
    }

    async fn record_transaction(&self, tx: &LedgerTransaction) -> LedgerResult<()> {
        let mut state = self.state.write().await;
        if state.transactions.iter().any(|t| t.id == tx.id) {
            return Err(LedgerError::Duplicate(format!("transaction {}", tx.id)));
        }
        state.transactions.push(tx.clone());
        Ok(())
    }

    async fn sum_transactions(
        &self,
        kinds: &[TransactionKind],
        since: DateTime<Utc>,
    ) -> LedgerResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| kinds.contains(&t.kind) && t.created_at >= since)
            .fold(0u64, |acc, t| acc.saturating_add(t.amount)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PayoutMetadata;
    use chrono::Duration;
    use std::collections::BTreeSet;

    fn payout(id: &str, created_at: DateTime<Utc>) -> PayoutRecord {
        PayoutRecord {
            id: id.to_string(),
            created_at,
            revenue_amount: 10_000,
            payout_percentage: 80.0,
            ece_converted: 8000,
            usdc_received: 8000,
            transaction_signature: None,
            status: PayoutStatus::Pending,
            authorized_signers: BTreeSet::from(["signer".to_string()]),
            compliance_approved: true,
            metadata: PayoutMetadata {
                ece_retained: 2000,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_complete_payout_credits_balances() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        ledger.insert_payout(&payout("p1", now)).await.unwrap();

        let done = ledger.complete_payout("p1", "sig1", now).await.unwrap();
        assert_eq!(done.status, PayoutStatus::Completed);

        let balances = ledger.balances().await.unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].currency, Currency::Ece);
        assert_eq!(balances[0].amount, 2000);
        assert_eq!(balances[1].amount, 8000);

        // Second completion is rejected and does not credit again
        assert!(ledger.complete_payout("p1", "sig1", now).await.is_err());
        let balances = ledger.balances().await.unwrap();
        assert_eq!(balances[1].amount, 8000);
    }

    #[tokio::test]
    async fn test_last_completed_ignores_pending_and_failed() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        ledger
            .insert_payout(&payout("old", now - Duration::days(14)))
            .await
            .unwrap();
        ledger.complete_payout("old", "s", now).await.unwrap();
        ledger.insert_payout(&payout("new", now)).await.unwrap();
        ledger
            .insert_payout(&payout("bad", now - Duration::days(1)))
            .await
            .unwrap();
        ledger.fail_payout("bad", "rejected").await.unwrap();

        let last = ledger.last_completed_payout().await.unwrap().unwrap();
        assert_eq!(last.id, "old");
        assert_eq!(ledger.pending_payouts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_payouts_newest_first() {
        let ledger = MemoryLedger::new();
        let base = Utc::now();
        for i in 0..5 {
            ledger
                .insert_payout(&payout(&format!("p{}", i), base + Duration::days(i)))
                .await
                .unwrap();
        }

        let page = ledger.list_payouts(1, 2).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p2"]);
        assert_eq!(ledger.count_payouts().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_payout_rejected() {
        let ledger = MemoryLedger::new();
        let record = payout("p1", Utc::now());
        ledger.insert_payout(&record).await.unwrap();
        assert!(matches!(
            ledger.insert_payout(&record).await,
            Err(LedgerError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_sum_transactions_filters_kind_and_time() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();
        let entries = [
            ("t1", TransactionKind::MarketplaceFee, 100, now),
            ("t2", TransactionKind::BattleEntryFee, 50, now),
            ("t3", TransactionKind::EceMint, 1000, now),
            ("t4", TransactionKind::NftMintFee, 70, now - Duration::days(10)),
        ];
        for (id, kind, amount, created_at) in entries {
            ledger
                .record_transaction(&LedgerTransaction {
                    id: id.to_string(),
                    user_id: "wallet".to_string(),
                    kind,
                    amount,
                    description: String::new(),
                    transaction_signature: None,
                    created_at,
                })
                .await
                .unwrap();
        }

        let total = ledger
            .sum_transactions(&TransactionKind::REVENUE, now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(total, 150);
    }

    #[tokio::test]
    async fn test_balance_overflow_leaves_payout_pending() {
        let ledger = MemoryLedger::new();
        let now = Utc::now();

        let mut large = payout("p0", now);
        large.metadata.ece_retained = u64::MAX;
        ledger.insert_payout(&large).await.unwrap();
        ledger.complete_payout("p0", "sig0", now).await.unwrap();

        ledger.insert_payout(&payout("p1", now)).await.unwrap();
        assert!(matches!(
            ledger.complete_payout("p1", "sig1", now).await,
            Err(LedgerError::BalanceOverflow(Currency::Ece))
        ));

        let record = ledger.get_payout("p1").await.unwrap().unwrap();
        assert_eq!(record.status, PayoutStatus::Pending);
        let balances = ledger.balances().await.unwrap();
        assert_eq!((balances[0].currency, balances[0].amount), (Currency::Ece, u64::MAX));
        assert_eq!((balances[1].currency, balances[1].amount), (Currency::Usdc, 8000));
    }
}
