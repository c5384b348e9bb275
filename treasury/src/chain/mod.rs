//! Chain Gateway
//!
//! Builds treasury program transactions, signs them with the treasury key,
//! submits them and waits for confirmation. Calls are at-most-once: nothing
//! here retries.

pub mod rpc;
pub mod simulated;
pub mod transaction;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rpc::{RpcChainGateway, RpcGatewayConfig};
pub use simulated::SimulatedChain;
pub use transaction::{SignedTransaction, TransactionBuilder, TreasuryInstruction, UnsignedTransaction};

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Confirmation timed out after {0}s")]
    Timeout(u64),

    #[error("Signature rejected: {0}")]
    SignatureRejected(String),

    #[error("Insufficient on-chain balance: {0}")]
    InsufficientFunds(String),

    #[error("Transaction failed on-chain: {0}")]
    TransactionFailed(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),
}

pub type ChainResult<T> = std::result::Result<T, ChainError>;

/// On-chain treasury state relevant to the orchestrator
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreasuryAccount {
    pub ece_circulation: u64,
    pub usdc_reserves: u64,
    pub is_paused: bool,
}

/// What the network knows about a submitted signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not seen, or seen below the requested commitment
    Pending,
    Confirmed,
    Failed(String),
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Transaction builder bound to this gateway's program and fee payer
    fn builder(&self) -> TransactionBuilder;

    /// Current treasury account state at the gateway's commitment level
    async fn treasury_account(&self) -> ChainResult<TreasuryAccount>;

    /// Sign and submit, returning the transaction signature
    async fn submit(&self, tx: &UnsignedTransaction) -> ChainResult<String>;

    /// Block until the signature reaches the gateway's commitment level
    async fn confirm(&self, signature: &str) -> ChainResult<()>;

    async fn signature_status(&self, signature: &str) -> ChainResult<SignatureStatus>;

    async fn send_and_confirm(&self, tx: &UnsignedTransaction) -> ChainResult<String> {
        let signature = self.submit(tx).await?;
        self.confirm(&signature).await?;
        Ok(signature)
    }
}
