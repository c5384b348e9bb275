//! ECE Treasury persistent ledger
//!
//! Sled-backed `LedgerStore`. One tree per table, bincode values:
//! - `payouts`: payout id -> PayoutRecord
//! - `payout_index`: (created_at, sequence) -> payout id, for newest-first paging
//! - `compliance`: sequence -> ComplianceCheck (append-only)
//! - `balances`: currency -> CompanyBalance
//! - `emergency`: sequence -> EmergencyAction (append-only)
//! - `transactions`: transaction id -> LedgerTransaction

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ece_treasury::ledger::{
    apply_completion, apply_failure, completion_credits, ensure_pending, LedgerError,
    LedgerResult, LedgerStore,
};
use ece_treasury::types::{
    CompanyBalance, ComplianceCheck, Currency, EmergencyAction, LedgerTransaction, PayoutRecord,
    PayoutStatus, TransactionKind,
};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree, Transactional,
};
use std::path::Path;

const PAYOUTS_TREE: &str = "payouts";
const PAYOUT_INDEX_TREE: &str = "payout_index";
const COMPLIANCE_TREE: &str = "compliance";
const BALANCES_TREE: &str = "balances";
const EMERGENCY_TREE: &str = "emergency";
const TRANSACTIONS_TREE: &str = "transactions";

fn storage_err(context: &str, e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("{}: {}", context, e))
}

fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn abort(e: LedgerError) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(e)
}

fn from_tx_error(e: TransactionError<LedgerError>) -> LedgerError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => storage_err("transaction failed", e),
    }
}

/// Index key ordering payouts by creation time, ties broken by insertion
fn index_key(created_at: DateTime<Utc>, sequence: u64) -> [u8; 16] {
    let millis = (created_at.timestamp_millis() as u64) ^ (1 << 63);
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&millis.to_be_bytes());
    key[8..].copy_from_slice(&sequence.to_be_bytes());
    key
}

fn balance_key(currency: Currency) -> &'static [u8] {
    currency.as_str().as_bytes()
}

/// Load, transition and store one payout inside a transaction
fn update_payout<F>(
    payouts: &TransactionalTree,
    id: &str,
    mutate: F,
) -> ConflictableTransactionResult<PayoutRecord, LedgerError>
where
    F: Fn(&mut PayoutRecord) -> LedgerResult<()>,
{
    let bytes = payouts
        .get(id.as_bytes())?
        .ok_or_else(|| abort(LedgerError::NotFound(format!("payout {}", id))))?;
    let mut record: PayoutRecord = decode(&bytes).map_err(abort)?;
    mutate(&mut record).map_err(abort)?;
    payouts.insert(id.as_bytes(), encode(&record).map_err(abort)?)?;
    Ok(record)
}

fn credit_in(
    balances: &TransactionalTree,
    currency: Currency,
    amount: u64,
    at: DateTime<Utc>,
) -> ConflictableTransactionResult<CompanyBalance, LedgerError> {
    let current = match balances.get(balance_key(currency))? {
        Some(bytes) => decode::<CompanyBalance>(&bytes).map_err(abort)?.amount,
        None => 0,
    };
    let row = CompanyBalance {
        currency,
        amount: current
            .checked_add(amount)
            .ok_or_else(|| abort(LedgerError::BalanceOverflow(currency)))?,
        last_updated: at,
    };
    balances.insert(balance_key(currency), encode(&row).map_err(abort)?)?;
    Ok(row)
}

#[derive(Debug, Clone)]
pub struct SledLedger {
    db: sled::Db,
    payouts: sled::Tree,
    payout_index: sled::Tree,
    compliance: sled::Tree,
    balances: sled::Tree,
    emergency: sled::Tree,
    transactions: sled::Tree,
}

impl SledLedger {
    /// Open or create the ledger database
    pub fn open<P: AsRef<Path>>(path: P) -> LedgerResult<Self> {
        let db = sled::open(path.as_ref()).map_err(|e| storage_err("failed to open ledger", e))?;
        let tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| storage_err(&format!("failed to open {} tree", name), e))
        };

        let ledger = Self {
            payouts: tree(PAYOUTS_TREE)?,
            payout_index: tree(PAYOUT_INDEX_TREE)?,
            compliance: tree(COMPLIANCE_TREE)?,
            balances: tree(BALANCES_TREE)?,
            emergency: tree(EMERGENCY_TREE)?,
            transactions: tree(TRANSACTIONS_TREE)?,
            db,
        };

        tracing::info!(
            path = %path.as_ref().display(),
            payouts = ledger.payouts.len(),
            "ledger opened"
        );
        Ok(ledger)
    }

    fn next_sequence(&self) -> LedgerResult<u64> {
        self.db
            .generate_id()
            .map_err(|e| storage_err("failed to generate id", e))
    }

    fn load_payout(&self, id: &[u8]) -> LedgerResult<Option<PayoutRecord>> {
        match self
            .payouts
            .get(id)
            .map_err(|e| storage_err("failed to load payout", e))?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(tree: &sled::Tree, context: &str) -> LedgerResult<Vec<T>> {
        tree.iter()
            .values()
            .map(|value| {
                let bytes = value.map_err(|e| storage_err(context, e))?;
                decode(&bytes)
            })
            .collect()
    }

    /// Payouts newest first, lazily loaded through the index
    fn payouts_newest_first(&self) -> impl Iterator<Item = LedgerResult<PayoutRecord>> + '_ {
        self.payout_index.iter().values().rev().map(move |id| {
            let id = id.map_err(|e| storage_err("failed to scan payout index", e))?;
            self.load_payout(&id)?.ok_or_else(|| {
                LedgerError::Storage(format!(
                    "payout index points at missing record {}",
                    String::from_utf8_lossy(&id)
                ))
            })
        })
    }
}

#[async_trait]
impl LedgerStore for SledLedger {
    async fn insert_payout(&self, record: &PayoutRecord) -> LedgerResult<()> {
        let key = index_key(record.created_at, self.next_sequence()?);
        let value = encode(record)?;

        (&self.payouts, &self.payout_index)
            .transaction(|(payouts, index)| {
                if payouts.get(record.id.as_bytes())?.is_some() {
                    return Err(abort(LedgerError::Duplicate(format!("payout {}", record.id))));
                }
                payouts.insert(record.id.as_bytes(), value.clone())?;
                index.insert(&key[..], record.id.as_bytes())?;
                Ok(())
            })
            .map_err(from_tx_error)
    }

    async fn attach_payout_signature(&self, id: &str, signature: &str) -> LedgerResult<()> {
        self.payouts
            .transaction(|payouts| {
                update_payout(payouts, id, |record| {
                    ensure_pending(record, PayoutStatus::Pending)?;
                    record.transaction_signature = Some(signature.to_string());
                    Ok(())
                })
            })
            .map_err(from_tx_error)?;
        Ok(())
    }

    async fn complete_payout(
        &self,
        id: &str,
        signature: &str,
        completed_at: DateTime<Utc>,
    ) -> LedgerResult<PayoutRecord> {
        (&self.payouts, &self.balances)
            .transaction(|(payouts, balances)| {
                let record = update_payout(payouts, id, |record| {
                    apply_completion(record, signature, completed_at)
                })?;
                for (currency, amount) in completion_credits(&record) {
                    credit_in(balances, currency, amount, completed_at)?;
                }
                Ok(record)
            })
            .map_err(from_tx_error)
    }

    async fn fail_payout(&self, id: &str, reason: &str) -> LedgerResult<PayoutRecord> {
        self.payouts
            .transaction(|payouts| update_payout(payouts, id, |record| apply_failure(record, reason)))
            .map_err(from_tx_error)
    }

    async fn get_payout(&self, id: &str) -> LedgerResult<Option<PayoutRecord>> {
        self.load_payout(id.as_bytes())
    }

    async fn last_completed_payout(&self) -> LedgerResult<Option<PayoutRecord>> {
        for record in self.payouts_newest_first() {
            let record = record?;
            if record.status == PayoutStatus::Completed {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn pending_payouts(&self) -> LedgerResult<Vec<PayoutRecord>> {
        let all: Vec<PayoutRecord> = Self::scan(&self.payouts, "failed to scan payouts")?;
        let mut pending: Vec<PayoutRecord> = all
            .into_iter()
            .filter(|p| p.status == PayoutStatus::Pending)
            .collect();
        pending.sort_by_key(|p| p.created_at);
        Ok(pending)
    }

    async fn list_payouts(&self, skip: u64, limit: u64) -> LedgerResult<Vec<PayoutRecord>> {
        self.payouts_newest_first()
            .skip(skip as usize)
            .take(limit as usize)
            .collect()
    }

    async fn count_payouts(&self) -> LedgerResult<u64> {
        Ok(self.payouts.len() as u64)
    }

    async fn append_compliance_check(&self, check: &ComplianceCheck) -> LedgerResult<()> {
        let key = self.next_sequence()?.to_be_bytes();
        self.compliance
            .insert(key, encode(check)?)
            .map_err(|e| storage_err("failed to append compliance check", e))?;
        Ok(())
    }

    async fn compliance_checks_for(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<Vec<ComplianceCheck>> {
        let all: Vec<ComplianceCheck> =
            Self::scan(&self.compliance, "failed to scan compliance checks")?;
        Ok(all
            .into_iter()
            .filter(|c| c.transaction_id == transaction_id)
            .collect())
    }

    async fn balances(&self) -> LedgerResult<Vec<CompanyBalance>> {
        let mut rows: Vec<CompanyBalance> = Self::scan(&self.balances, "failed to scan balances")?;
        rows.sort_by_key(|b| b.currency);
        Ok(rows)
    }

    async fn append_emergency_action(&self, action: &EmergencyAction) -> LedgerResult<()> {
        let key = self.next_sequence()?.to_be_bytes();
        self.emergency
            .insert(key, encode(action)?)
            .map_err(|e| storage_err("failed to append emergency action", e))?;
        Ok(())
    }

    async fn emergency_actions(&self) -> LedgerResult<Vec<EmergencyAction>> {
        Self::scan(&self.emergency, "failed to scan emergency actions")
    }

    async fn record_transaction(&self, tx: &LedgerTransaction) -> LedgerResult<()> {
        let swapped = self
            .transactions
            .compare_and_swap(tx.id.as_bytes(), None as Option<&[u8]>, Some(encode(tx)?))
            .map_err(|e| storage_err("failed to record transaction", e))?;
        swapped.map_err(|_| LedgerError::Duplicate(format!("transaction {}", tx.id)))
    }

    async fn sum_transactions(
        &self,
        kinds: &[TransactionKind],
        since: DateTime<Utc>,
    ) -> LedgerResult<u64> {
        let all: Vec<LedgerTransaction> =
            Self::scan(&self.transactions, "failed to scan transactions")?;
        Ok(all
            .iter()
            .filter(|t| kinds.contains(&t.kind) && t.created_at >= since)
            .fold(0u64, |acc, t| acc.saturating_add(t.amount)))
    }

    async fn flush(&self) -> LedgerResult<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| storage_err("failed to flush ledger", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ece_treasury::types::{ComplianceType, EmergencyActionKind, PayoutMetadata};
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn payout(id: &str, created_at: DateTime<Utc>) -> PayoutRecord {
        PayoutRecord {
            id: id.to_string(),
            created_at,
            revenue_amount: 10_000,
            payout_percentage: 80.0,
            ece_converted: 8_000,
            usdc_received: 8_000,
            transaction_signature: None,
            status: PayoutStatus::Pending,
            authorized_signers: BTreeSet::from(["admin".to_string()]),
            compliance_approved: true,
            metadata: PayoutMetadata {
                ece_retained: 2_000,
                compliance_transaction_id: format!("payout_{}", id),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_index_key_orders_by_time() {
        let now = Utc::now();
        let earlier = index_key(now - Duration::seconds(1), 9);
        let later = index_key(now, 1);
        assert!(earlier < later);
        assert!(index_key(now, 1) < index_key(now, 2));

        let before_epoch = DateTime::<Utc>::from_timestamp(-10, 0).unwrap();
        assert!(index_key(before_epoch, 0) < index_key(now, 0));
    }

    #[tokio::test]
    async fn test_payout_lifecycle_survives_reopen() {
        let dir = tempdir().unwrap();
        let now = Utc::now();

        {
            let ledger = SledLedger::open(dir.path()).unwrap();
            ledger.insert_payout(&payout("p1", now)).await.unwrap();
            ledger.attach_payout_signature("p1", "sig1").await.unwrap();
            let done = ledger.complete_payout("p1", "sig1", now).await.unwrap();
            assert_eq!(done.status, PayoutStatus::Completed);
            ledger.flush().await.unwrap();
        }

        let ledger = SledLedger::open(dir.path()).unwrap();
        let record = ledger.get_payout("p1").await.unwrap().unwrap();
        assert_eq!(record.status, PayoutStatus::Completed);
        assert_eq!(record.transaction_signature.as_deref(), Some("sig1"));
        assert_eq!(record.metadata.completed_at, Some(now));

        let balances = ledger.balances().await.unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!((balances[0].currency, balances[0].amount), (Currency::Ece, 2_000));
        assert_eq!((balances[1].currency, balances[1].amount), (Currency::Usdc, 8_000));
    }

    #[tokio::test]
    async fn test_completion_is_atomic_with_balances() {
        let dir = tempdir().unwrap();
        let ledger = SledLedger::open(dir.path()).unwrap();
        let now = Utc::now();

        let mut large = payout("p0", now);
        large.usdc_received = u64::MAX - 100;
        large.metadata.ece_retained = 0;
        ledger.insert_payout(&large).await.unwrap();
        ledger.complete_payout("p0", "sig0", now).await.unwrap();
        ledger.insert_payout(&payout("p1", now)).await.unwrap();

        assert!(matches!(
            ledger.complete_payout("p1", "sig", now).await,
            Err(LedgerError::BalanceOverflow(Currency::Usdc))
        ));

        // Nothing from the aborted completion is visible
        let record = ledger.get_payout("p1").await.unwrap().unwrap();
        assert_eq!(record.status, PayoutStatus::Pending);
        let balances = ledger.balances().await.unwrap();
        assert_eq!((balances[0].currency, balances[0].amount), (Currency::Ece, 0));
        assert_eq!((balances[1].currency, balances[1].amount), (Currency::Usdc, u64::MAX - 100));
    }

    #[tokio::test]
    async fn test_terminal_payouts_are_immutable() {
        let dir = tempdir().unwrap();
        let ledger = SledLedger::open(dir.path()).unwrap();
        let now = Utc::now();

        ledger.insert_payout(&payout("p1", now)).await.unwrap();
        let failed = ledger.fail_payout("p1", "rejected").await.unwrap();
        assert_eq!(failed.metadata.failure_reason.as_deref(), Some("rejected"));

        assert!(matches!(
            ledger.complete_payout("p1", "sig", now).await,
            Err(LedgerError::InvalidTransition { .. })
        ));
        assert!(matches!(
            ledger.attach_payout_signature("p1", "sig").await,
            Err(LedgerError::InvalidTransition { .. })
        ));
        assert!(matches!(
            ledger.fail_payout("missing", "x").await,
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger.insert_payout(&payout("p1", now)).await,
            Err(LedgerError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_listing_and_last_completed() {
        let dir = tempdir().unwrap();
        let ledger = SledLedger::open(dir.path()).unwrap();
        let base = Utc::now() - Duration::days(100);

        for i in 0..15 {
            let id = format!("p{:02}", i);
            ledger
                .insert_payout(&payout(&id, base + Duration::days(7 * i)))
                .await
                .unwrap();
            if i < 13 {
                ledger.complete_payout(&id, "sig", base).await.unwrap();
            }
        }

        assert_eq!(ledger.count_payouts().await.unwrap(), 15);

        let page = ledger.list_payouts(10, 10).await.unwrap();
        let ids: Vec<&str> = page.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p04", "p03", "p02", "p01", "p00"]);

        let last = ledger.last_completed_payout().await.unwrap().unwrap();
        assert_eq!(last.id, "p12");

        let pending = ledger.pending_payouts().await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p13", "p14"]);
    }

    #[tokio::test]
    async fn test_audit_logs_and_revenue() {
        let dir = tempdir().unwrap();
        let ledger = SledLedger::open(dir.path()).unwrap();
        let now = Utc::now();

        for amount in [500, 20_000] {
            ledger
                .append_compliance_check(&ComplianceCheck {
                    transaction_id: "mint_1".to_string(),
                    amount,
                    check_type: ComplianceType::Mint,
                    risk_score: 10,
                    kyc_required: false,
                    aml_cleared: true,
                    approved: true,
                    notes: "Risk score: 10".to_string(),
                    created_at: now,
                })
                .await
                .unwrap();
        }
        let checks = ledger.compliance_checks_for("mint_1").await.unwrap();
        assert_eq!(checks.iter().map(|c| c.amount).collect::<Vec<_>>(), vec![500, 20_000]);
        assert!(ledger.compliance_checks_for("mint_2").await.unwrap().is_empty());

        ledger
            .append_emergency_action(&EmergencyAction {
                id: "e1".to_string(),
                action: EmergencyActionKind::Pause,
                authorized_by: "signer".to_string(),
                reason: "incident".to_string(),
                transaction_signature: "sig".to_string(),
                timestamp: now,
            })
            .await
            .unwrap();
        assert_eq!(ledger.emergency_actions().await.unwrap().len(), 1);

        let fee = LedgerTransaction {
            id: "t1".to_string(),
            user_id: "wallet".to_string(),
            kind: TransactionKind::SubscriptionPayment,
            amount: 250,
            description: "monthly plan".to_string(),
            transaction_signature: None,
            created_at: now,
        };
        ledger.record_transaction(&fee).await.unwrap();
        assert!(matches!(
            ledger.record_transaction(&fee).await,
            Err(LedgerError::Duplicate(_))
        ));

        let mut old = fee.clone();
        old.id = "t0".to_string();
        old.created_at = now - Duration::days(30);
        ledger.record_transaction(&old).await.unwrap();

        let total = ledger
            .sum_transactions(&TransactionKind::REVENUE, now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(total, 250);
    }
}
