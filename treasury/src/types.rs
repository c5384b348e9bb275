//! Treasury domain records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Lifecycle of a weekly payout record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PayoutStatus::Pending => "PENDING",
            PayoutStatus::Completed => "COMPLETED",
            PayoutStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Audit context stored alongside a payout
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayoutMetadata {
    pub reserve_ratio_before_payout: u64,
    pub compliance_transaction_id: String,
    pub compliance_notes: Option<String>,
    pub ece_retained: u64,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

/// One weekly revenue payout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub revenue_amount: u64,
    pub payout_percentage: f64,
    pub ece_converted: u64,
    pub usdc_received: u64,
    pub transaction_signature: Option<String>,
    pub status: PayoutStatus,
    pub authorized_signers: BTreeSet<String>,
    pub compliance_approved: bool,
    pub metadata: PayoutMetadata,
}

impl PayoutRecord {
    /// Dashboard projection of this record
    pub fn summary(&self) -> PayoutSummary {
        PayoutSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            revenue_amount: self.revenue_amount,
            payout_percentage: self.payout_percentage,
            ece_converted: self.ece_converted,
            usdc_received: self.usdc_received,
            status: self.status,
            transaction_signature: self.transaction_signature.clone(),
            compliance_approved: self.compliance_approved,
        }
    }
}

/// Projection of a payout used by history listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayoutSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub revenue_amount: u64,
    pub payout_percentage: f64,
    pub ece_converted: u64,
    pub usdc_received: u64,
    pub status: PayoutStatus,
    pub transaction_signature: Option<String>,
    pub compliance_approved: bool,
}

/// One page of payout history, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutHistory {
    pub payouts: Vec<PayoutSummary>,
    pub total: u64,
    pub has_more: bool,
    pub page: u64,
    pub limit: u64,
}

/// Kind of transaction screened by compliance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceType {
    Mint,
    Burn,
    Payout,
    Deposit,
    Withdraw,
}

impl ComplianceType {
    /// Prefix used for transaction ids of this kind
    pub fn prefix(&self) -> &'static str {
        match self {
            ComplianceType::Mint => "mint",
            ComplianceType::Burn => "burn",
            ComplianceType::Payout => "payout",
            ComplianceType::Deposit => "deposit",
            ComplianceType::Withdraw => "withdraw",
        }
    }
}

/// Append-only compliance audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCheck {
    pub transaction_id: String,
    pub amount: u64,
    #[serde(rename = "type")]
    pub check_type: ComplianceType,
    pub risk_score: u8,
    pub kyc_required: bool,
    pub aml_cleared: bool,
    pub approved: bool,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// Currencies held by the company
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Ece,
    Usdc,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Ece => "ECE",
            Currency::Usdc => "USDC",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Company balance row, one per currency
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanyBalance {
    pub currency: Currency,
    pub amount: u64,
    pub last_updated: DateTime<Utc>,
}

/// Company holdings as shown on the dashboard
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanyBalances {
    pub ece: u64,
    pub usdc: u64,
}

impl CompanyBalances {
    pub fn from_rows(rows: &[CompanyBalance]) -> Self {
        let mut balances = Self::default();
        for row in rows {
            match row.currency {
                Currency::Ece => balances.ece = row.amount,
                Currency::Usdc => balances.usdc = row.amount,
            }
        }
        balances
    }
}

/// Aggregated treasury snapshot, recomputed per query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryStatus {
    pub ece_circulation: u64,
    pub usdc_reserves: u64,
    pub reserve_ratio: u64,
    pub is_paused: bool,
    pub last_payout_date: Option<DateTime<Utc>>,
    pub next_payout_date: DateTime<Utc>,
    pub weekly_revenue_accumulated: u64,
    pub company_balance: CompanyBalances,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmergencyActionKind {
    Pause,
    Unpause,
}

/// Append-only record of an emergency action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAction {
    pub id: String,
    pub action: EmergencyActionKind,
    pub authorized_by: String,
    pub reason: String,
    pub transaction_signature: String,
    pub timestamp: DateTime<Utc>,
}

/// Ledger transaction categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    EceMint,
    EceBurn,
    MarketplaceFee,
    SubscriptionPayment,
    NftMintFee,
    BattleEntryFee,
}

impl TransactionKind {
    /// Kinds counted as platform revenue
    pub const REVENUE: [TransactionKind; 4] = [
        TransactionKind::MarketplaceFee,
        TransactionKind::SubscriptionPayment,
        TransactionKind::NftMintFee,
        TransactionKind::BattleEntryFee,
    ];

    pub fn is_revenue(&self) -> bool {
        Self::REVENUE.contains(self)
    }
}

/// Generic transaction log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: String,
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount: u64,
    pub description: String,
    pub transaction_signature: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input of a weekly payout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyPayoutRequest {
    pub revenue_amount: u64,
    pub payout_percentage: f64,
    pub authorized_signers: Vec<String>,
}

/// Successful weekly payout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReceipt {
    pub payout_id: String,
    pub ece_converted: u64,
    pub ece_retained: u64,
    pub usdc_received: u64,
    pub transaction_signature: String,
}

/// Successful mint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MintReceipt {
    pub transaction_id: String,
    pub ece_amount: u64,
    pub transaction_signature: String,
}

/// Successful burn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BurnReceipt {
    pub transaction_id: String,
    pub usdc_amount: u64,
    pub transaction_signature: String,
}

/// Successful emergency action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyReceipt {
    pub action_id: String,
    pub action: EmergencyActionKind,
    pub transaction_signature: String,
}

/// Outcome of reconciling PENDING payout intents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    pub still_pending: Vec<String>,
    /// PENDING intents with no recorded signature; the chain cannot be asked about them
    pub needs_review: Vec<String>,
}

impl RecoveryReport {
    /// Intents that are still PENDING after reconciliation
    pub fn unresolved(&self) -> impl Iterator<Item = &String> {
        self.still_pending.iter().chain(self.needs_review.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&PayoutStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
        assert_eq!(
            serde_json::to_string(&TransactionKind::NftMintFee).unwrap(),
            "\"NFT_MINT_FEE\""
        );
        assert_eq!(serde_json::to_string(&Currency::Usdc).unwrap(), "\"USDC\"");
    }

    #[test]
    fn test_compliance_check_uses_type_field() {
        let check = ComplianceCheck {
            transaction_id: "payout_1".to_string(),
            amount: 8000,
            check_type: ComplianceType::Payout,
            risk_score: 30,
            kyc_required: false,
            aml_cleared: true,
            approved: true,
            notes: "Risk score: 30".to_string(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&check).unwrap();
        assert_eq!(value["type"], "PAYOUT");
        assert_eq!(value["riskScore"], 30);
    }

    #[test]
    fn test_revenue_kinds() {
        assert!(TransactionKind::MarketplaceFee.is_revenue());
        assert!(TransactionKind::BattleEntryFee.is_revenue());
        assert!(!TransactionKind::EceMint.is_revenue());
        assert!(!TransactionKind::EceBurn.is_revenue());
    }

    #[test]
    fn test_company_balances_from_rows() {
        let now = Utc::now();
        let rows = vec![
            CompanyBalance {
                currency: Currency::Usdc,
                amount: 8000,
                last_updated: now,
            },
            CompanyBalance {
                currency: Currency::Ece,
                amount: 2000,
                last_updated: now,
            },
        ];
        assert_eq!(
            CompanyBalances::from_rows(&rows),
            CompanyBalances {
                ece: 2000,
                usdc: 8000
            }
        );
    }
}
