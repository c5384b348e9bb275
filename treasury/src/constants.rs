//! Treasury policy constants

/// Minimum time between two completed weekly payouts, in milliseconds
pub const PAYOUT_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Transactions above this amount require KYC
pub const KYC_THRESHOLD: u64 = 10_000;

/// A compliance check is approved only below this risk score
pub const APPROVAL_RISK_LIMIT: u8 = 80;

/// Unapproved payouts above this risk score are rejected for manual review
pub const PAYOUT_REVIEW_RISK_THRESHOLD: u8 = 75;

/// ECE:USDC conversion is fixed 1:1
pub const ECE_PER_USDC: u64 = 1;

/// Pagination defaults for payout history
pub const DEFAULT_HISTORY_PAGE: u64 = 1;
pub const DEFAULT_HISTORY_LIMIT: u64 = 10;
pub const MAX_HISTORY_LIMIT: u64 = 100;
