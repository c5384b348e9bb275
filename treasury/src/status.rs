//! Status Reporter
//!
//! Read-only aggregation over the on-chain treasury account and the ledger.
//! Nothing here mutates state.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::chain::ChainGateway;
use crate::clock::Clock;
use crate::constants::{MAX_HISTORY_LIMIT, PAYOUT_WINDOW_MS};
use crate::error::{Result, TreasuryError};
use crate::ledger::LedgerStore;
use crate::types::{
    CompanyBalances, EmergencyAction, PayoutHistory, TransactionKind, TreasuryStatus,
};

/// Length of the payout window
pub fn payout_window() -> Duration {
    Duration::milliseconds(PAYOUT_WINDOW_MS)
}

/// Earliest time the next payout may run after one created at `last`
pub fn next_payout_after(last: DateTime<Utc>) -> DateTime<Utc> {
    last + payout_window()
}

/// Reserve ratio in percent, rounded half up. Zero circulation counts as
/// fully backed.
pub fn reserve_ratio(ece_circulation: u64, usdc_reserves: u64) -> u64 {
    if ece_circulation == 0 {
        return 100;
    }
    let circulation = ece_circulation as u128;
    let ratio = (usdc_reserves as u128 * 200 + circulation) / (2 * circulation);
    ratio.min(u64::MAX as u128) as u64
}

#[derive(Clone)]
pub struct StatusReporter {
    ledger: Arc<dyn LedgerStore>,
    chain: Arc<dyn ChainGateway>,
    clock: Arc<dyn Clock>,
    paused: Arc<AtomicBool>,
}

impl StatusReporter {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        chain: Arc<dyn ChainGateway>,
        clock: Arc<dyn Clock>,
        paused: Arc<AtomicBool>,
    ) -> Self {
        Self {
            ledger,
            chain,
            clock,
            paused,
        }
    }

    pub async fn treasury_status(&self) -> Result<TreasuryStatus> {
        let account = self.chain.treasury_account().await?;
        let last_payout_date = self
            .ledger
            .last_completed_payout()
            .await?
            .map(|p| p.created_at);
        let now = self.clock.now();

        let weekly_revenue_accumulated = self.revenue_since(last_payout_date, now).await?;
        let company_balance = self.company_balances().await?;

        Ok(TreasuryStatus {
            ece_circulation: account.ece_circulation,
            usdc_reserves: account.usdc_reserves,
            reserve_ratio: reserve_ratio(account.ece_circulation, account.usdc_reserves),
            is_paused: account.is_paused || self.paused.load(Ordering::SeqCst),
            last_payout_date,
            next_payout_date: last_payout_date.map(next_payout_after).unwrap_or(now),
            weekly_revenue_accumulated,
            company_balance,
        })
    }

    /// Revenue recorded since the last completed payout, or over the past
    /// week when no payout has completed yet
    pub async fn accumulated_weekly_revenue(&self) -> Result<u64> {
        let last = self
            .ledger
            .last_completed_payout()
            .await?
            .map(|p| p.created_at);
        self.revenue_since(last, self.clock.now()).await
    }

    async fn revenue_since(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Result<u64> {
        let since = last.unwrap_or_else(|| now - payout_window());
        Ok(self
            .ledger
            .sum_transactions(&TransactionKind::REVENUE, since)
            .await?)
    }

    /// One page of payouts, newest first. Pages start at 1.
    pub async fn payout_history(&self, page: u64, limit: u64) -> Result<PayoutHistory> {
        if page == 0 {
            return Err(TreasuryError::Validation("page must be at least 1".to_string()));
        }
        if limit == 0 || limit > MAX_HISTORY_LIMIT {
            return Err(TreasuryError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }

        let skip = (page - 1).saturating_mul(limit);
        let records = self.ledger.list_payouts(skip, limit).await?;
        let total = self.ledger.count_payouts().await?;

        Ok(PayoutHistory {
            payouts: records.iter().map(|r| r.summary()).collect(),
            total,
            has_more: skip.saturating_add(limit) < total,
            page,
            limit,
        })
    }

    pub async fn company_balances(&self) -> Result<CompanyBalances> {
        let rows = self.ledger.balances().await?;
        Ok(CompanyBalances::from_rows(&rows))
    }

    /// Emergency audit trail, oldest first
    pub async fn emergency_actions(&self) -> Result<Vec<EmergencyAction>> {
        Ok(self.ledger.emergency_actions().await?)
    }
}
