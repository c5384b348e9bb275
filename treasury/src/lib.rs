//! ECE Treasury core
//!
//! Weekly revenue payouts, ECE mint and burn against USDC reserves,
//! compliance screening and emergency pause, sequenced over a ledger store
//! and a chain gateway that are both injected at construction.

pub mod chain;
pub mod clock;
pub mod compliance;
pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod orchestrator;
pub mod outcome;
pub mod status;
pub mod types;

pub use chain::{ChainError, ChainGateway, RpcChainGateway, SimulatedChain, TreasuryAccount};
pub use clock::{Clock, ManualClock, SystemClock};
pub use compliance::{calculate_risk_score, AmlProvider, ComplianceChecker, PermissiveAml};
pub use config::{ChainMode, ConfigError, TreasuryConfig};
pub use error::{Result, TreasuryError};
pub use ledger::{LedgerError, LedgerStore, MemoryLedger};
pub use notify::{LogNotifier, PayoutNotifier, RecordingNotifier};
pub use orchestrator::TreasuryOrchestrator;
pub use outcome::OperationResult;
pub use status::{reserve_ratio, StatusReporter};
pub use types::*;
