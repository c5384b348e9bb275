//! JSON-RPC chain gateway

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ece_crypto::KeyPair;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{
    ChainError, ChainGateway, ChainResult, SignatureStatus, SignedTransaction, TransactionBuilder,
    TreasuryAccount, UnsignedTransaction,
};

/// Commitment level a transaction must reach to count as confirmed
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }

    /// Whether a reported confirmation status satisfies this level
    pub fn is_satisfied_by(&self, status: &str) -> bool {
        match self {
            Commitment::Confirmed => status == "confirmed" || status == "finalized",
            Commitment::Finalized => status == "finalized",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcGatewayConfig {
    pub rpc_url: String,
    pub commitment: Commitment,
    pub program_id: String,
    pub treasury_state_account: String,
    /// Upper bound on a single HTTP round trip
    pub request_timeout: Duration,
    /// Upper bound on waiting for confirmation
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcContextValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    confirmation_status: Option<String>,
    err: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcAccount {
    /// `[payload, encoding]`
    data: (String, String),
}

fn classify_rpc_error(err: RpcErrorObject) -> ChainError {
    let lower = err.message.to_lowercase();
    if lower.contains("insufficient") {
        ChainError::InsufficientFunds(err.message)
    } else if err.code == -32003 || lower.contains("signature verification") {
        ChainError::SignatureRejected(err.message)
    } else {
        ChainError::Rpc {
            code: err.code,
            message: err.message,
        }
    }
}

/// Gateway talking to a ledger node over HTTP JSON-RPC
pub struct RpcChainGateway {
    client: reqwest::Client,
    config: RpcGatewayConfig,
    keypair: KeyPair,
    request_id: AtomicU64,
}

impl RpcChainGateway {
    pub fn new(config: RpcGatewayConfig, keypair: KeyPair) -> ChainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        tracing::info!(
            rpc_url = %config.rpc_url,
            commitment = config.commitment.as_str(),
            authority = %keypair.public_key_hex(),
            "chain gateway ready"
        );

        Ok(Self {
            client,
            config,
            keypair,
            request_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<T> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(format!("{} failed: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Transport(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }

        let envelope: RpcEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(format!("{}: {}", method, e)))?;

        if let Some(err) = envelope.error {
            return Err(classify_rpc_error(err));
        }

        envelope
            .result
            .ok_or_else(|| ChainError::Decode(format!("{} returned no result", method)))
    }

    async fn poll_until_confirmed(&self, signature: &str) -> ChainResult<()> {
        loop {
            match self.signature_status(signature).await? {
                SignatureStatus::Confirmed => return Ok(()),
                SignatureStatus::Failed(reason) => {
                    return Err(ChainError::TransactionFailed(reason))
                }
                SignatureStatus::Pending => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
    }
}

#[async_trait]
impl ChainGateway for RpcChainGateway {
    fn builder(&self) -> TransactionBuilder {
        TransactionBuilder::new(
            self.config.program_id.clone(),
            self.config.treasury_state_account.clone(),
            self.keypair.public_key_hex(),
        )
    }

    async fn treasury_account(&self) -> ChainResult<TreasuryAccount> {
        let account: RpcContextValue<Option<RpcAccount>> = self
            .call(
                "getAccountInfo",
                json!([
                    self.config.treasury_state_account,
                    { "encoding": "base64", "commitment": self.config.commitment.as_str() }
                ]),
            )
            .await?;

        let account = account
            .value
            .ok_or_else(|| ChainError::AccountNotFound(self.config.treasury_state_account.clone()))?;

        let (payload, encoding) = account.data;
        if encoding != "base64" {
            return Err(ChainError::Decode(format!(
                "unexpected account encoding {}",
                encoding
            )));
        }

        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        bincode::deserialize(&bytes).map_err(|e| ChainError::Decode(e.to_string()))
    }

    async fn submit(&self, tx: &UnsignedTransaction) -> ChainResult<String> {
        let signed = SignedTransaction::sign(tx.clone(), &self.keypair)?;
        let encoded = signed.encode_base64()?;

        let signature: String = self
            .call(
                "sendTransaction",
                json!([
                    encoded,
                    {
                        "encoding": "base64",
                        "preflightCommitment": self.config.commitment.as_str()
                    }
                ]),
            )
            .await?;

        tracing::debug!(%signature, nonce = %tx.nonce, "transaction submitted");
        Ok(signature)
    }

    async fn confirm(&self, signature: &str) -> ChainResult<()> {
        let limit = self.config.confirm_timeout;
        tokio::time::timeout(limit, self.poll_until_confirmed(signature))
            .await
            .map_err(|_| ChainError::Timeout(limit.as_secs()))?
    }

    async fn signature_status(&self, signature: &str) -> ChainResult<SignatureStatus> {
        let statuses: RpcContextValue<Vec<Option<RpcSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": true }]),
            )
            .await?;

        let status = match statuses.value.into_iter().next().flatten() {
            None => SignatureStatus::Pending,
            Some(RpcSignatureStatus { err: Some(err), .. }) if !err.is_null() => {
                SignatureStatus::Failed(err.to_string())
            }
            Some(RpcSignatureStatus {
                confirmation_status: Some(level),
                ..
            }) if self.config.commitment.is_satisfied_by(&level) => SignatureStatus::Confirmed,
            Some(_) => SignatureStatus::Pending,
        };
        Ok(status)
    }
}
