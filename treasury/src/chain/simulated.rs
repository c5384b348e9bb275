//! In-process treasury ledger
//!
//! Verifies and applies treasury program instructions against a local
//! `TreasuryAccount`. Backs the `simulated` chain mode and the test suites.

use async_trait::async_trait;
use ece_crypto::KeyPair;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{
    ChainError, ChainGateway, ChainResult, SignatureStatus, SignedTransaction, TransactionBuilder,
    TreasuryAccount, TreasuryInstruction, UnsignedTransaction,
};

pub const SIMULATED_PROGRAM_ID: &str = "ECETreasurySimProgram1111111111111111111111";
pub const SIMULATED_STATE_ACCOUNT: &str = "ECETreasurySimState11111111111111111111111";

const DEFAULT_SUPPLY: u64 = 1_000_000;

struct SimState {
    account: TreasuryAccount,
    statuses: HashMap<String, SignatureStatus>,
    submitted: Vec<TreasuryInstruction>,
    fail_next_submit: Option<ChainError>,
    fail_next_confirm: bool,
    hold_confirmations: bool,
}

pub struct SimulatedChain {
    keypair: KeyPair,
    program_id: String,
    state_account: String,
    state: Mutex<SimState>,
}

impl SimulatedChain {
    pub fn new(keypair: KeyPair) -> Self {
        Self::with_account(
            keypair,
            TreasuryAccount {
                ece_circulation: DEFAULT_SUPPLY,
                usdc_reserves: DEFAULT_SUPPLY,
                is_paused: false,
            },
        )
    }

    pub fn with_account(keypair: KeyPair, account: TreasuryAccount) -> Self {
        Self {
            keypair,
            program_id: SIMULATED_PROGRAM_ID.to_string(),
            state_account: SIMULATED_STATE_ACCOUNT.to_string(),
            state: Mutex::new(SimState {
                account,
                statuses: HashMap::new(),
                submitted: Vec::new(),
                fail_next_submit: None,
                fail_next_confirm: false,
                hold_confirmations: false,
            }),
        }
    }

    /// Public key of the treasury authority
    pub fn authority(&self) -> String {
        self.keypair.public_key_hex()
    }

    pub fn account_snapshot(&self) -> TreasuryAccount {
        self.state.lock().account
    }

    pub fn set_account(&self, account: TreasuryAccount) {
        self.state.lock().account = account;
    }

    pub fn submitted_count(&self) -> usize {
        self.state.lock().submitted.len()
    }

    pub fn submitted_instructions(&self) -> Vec<TreasuryInstruction> {
        self.state.lock().submitted.clone()
    }

    /// Reject the next submission with `error`
    pub fn fail_next_submit(&self, error: ChainError) {
        self.state.lock().fail_next_submit = Some(error);
    }

    /// Accept the next submission but time out its confirmation
    pub fn fail_next_confirm(&self) {
        self.state.lock().fail_next_confirm = true;
    }

    /// While held, accepted transactions stay `Pending`
    pub fn hold_confirmations(&self, hold: bool) {
        self.state.lock().hold_confirmations = hold;
    }

    pub fn set_signature_status(&self, signature: &str, status: SignatureStatus) {
        self.state
            .lock()
            .statuses
            .insert(signature.to_string(), status);
    }

    fn check_target(&self, tx: &UnsignedTransaction) -> ChainResult<()> {
        if tx.program_id != self.program_id {
            return Err(ChainError::AccountNotFound(tx.program_id.clone()));
        }
        if tx.treasury_state_account != self.state_account {
            return Err(ChainError::AccountNotFound(tx.treasury_state_account.clone()));
        }
        Ok(())
    }
}

/// Apply one instruction, leaving the account untouched on error
fn apply_instruction(
    account: &TreasuryAccount,
    instruction: &TreasuryInstruction,
) -> ChainResult<TreasuryAccount> {
    let mut next = *account;

    match instruction {
        TreasuryInstruction::EmergencyPause => next.is_paused = true,
        TreasuryInstruction::EmergencyUnpause => next.is_paused = false,
        _ if account.is_paused => {
            return Err(ChainError::TransactionFailed(
                "treasury program is paused".to_string(),
            ))
        }
        TreasuryInstruction::MintTokens { amount, .. } => {
            next.ece_circulation = account
                .ece_circulation
                .checked_add(*amount)
                .ok_or_else(|| ChainError::TransactionFailed("circulation overflow".to_string()))?;
            next.usdc_reserves = account
                .usdc_reserves
                .checked_add(*amount)
                .ok_or_else(|| ChainError::TransactionFailed("reserve overflow".to_string()))?;
        }
        TreasuryInstruction::BurnTokens { amount, .. } => {
            next = release(account, *amount)?;
        }
        TreasuryInstruction::WeeklyPayout {
            revenue_amount,
            ece_converted,
        } => {
            if ece_converted > revenue_amount {
                return Err(ChainError::TransactionFailed(format!(
                    "payout converts {} of {} revenue",
                    ece_converted, revenue_amount
                )));
            }
            next = release(account, *ece_converted)?;
        }
    }

    Ok(next)
}

/// Burn `amount` ECE against the same amount of USDC reserves
fn release(account: &TreasuryAccount, amount: u64) -> ChainResult<TreasuryAccount> {
    let usdc_reserves = account.usdc_reserves.checked_sub(amount).ok_or_else(|| {
        ChainError::InsufficientFunds(format!(
            "reserves {} < {}",
            account.usdc_reserves, amount
        ))
    })?;
    let ece_circulation = account.ece_circulation.checked_sub(amount).ok_or_else(|| {
        ChainError::InsufficientFunds(format!(
            "circulation {} < {}",
            account.ece_circulation, amount
        ))
    })?;
    Ok(TreasuryAccount {
        ece_circulation,
        usdc_reserves,
        is_paused: account.is_paused,
    })
}

#[async_trait]
impl ChainGateway for SimulatedChain {
    fn builder(&self) -> TransactionBuilder {
        TransactionBuilder::new(
            self.program_id.clone(),
            self.state_account.clone(),
            self.keypair.public_key_hex(),
        )
    }

    async fn treasury_account(&self) -> ChainResult<TreasuryAccount> {
        Ok(self.state.lock().account)
    }

    async fn submit(&self, tx: &UnsignedTransaction) -> ChainResult<String> {
        let signed = SignedTransaction::sign(tx.clone(), &self.keypair)?;
        signed.verify()?;
        self.check_target(tx)?;

        let mut state = self.state.lock();
        if let Some(err) = state.fail_next_submit.take() {
            return Err(err);
        }

        state.account = apply_instruction(&state.account, &tx.instruction)?;
        state.submitted.push(tx.instruction.clone());

        let status = if state.hold_confirmations {
            SignatureStatus::Pending
        } else {
            SignatureStatus::Confirmed
        };
        state.statuses.insert(signed.signature.clone(), status);

        tracing::debug!(signature = %signed.signature, instruction = ?tx.instruction, "simulated transaction applied");
        Ok(signed.signature)
    }

    async fn confirm(&self, signature: &str) -> ChainResult<()> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_confirm) {
            return Err(ChainError::Timeout(0));
        }
        match state.statuses.get(signature) {
            Some(SignatureStatus::Confirmed) => Ok(()),
            Some(SignatureStatus::Pending) => Err(ChainError::Timeout(0)),
            Some(SignatureStatus::Failed(reason)) => {
                Err(ChainError::TransactionFailed(reason.clone()))
            }
            None => Err(ChainError::TransactionFailed(format!(
                "unknown signature {}",
                signature
            ))),
        }
    }

    async fn signature_status(&self, signature: &str) -> ChainResult<SignatureStatus> {
        Ok(self
            .state
            .lock()
            .statuses
            .get(signature)
            .cloned()
            .unwrap_or(SignatureStatus::Pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mint_and_burn_move_supply() {
        let chain = SimulatedChain::new(KeyPair::generate());
        let builder = chain.builder();

        let sig = chain.send_and_confirm(&builder.mint("wallet", 500)).await.unwrap();
        assert_eq!(
            chain.signature_status(&sig).await.unwrap(),
            SignatureStatus::Confirmed
        );
        chain.send_and_confirm(&builder.burn("wallet", 200)).await.unwrap();

        let account = chain.account_snapshot();
        assert_eq!(account.ece_circulation, 1_000_300);
        assert_eq!(account.usdc_reserves, 1_000_300);
        assert_eq!(chain.submitted_count(), 2);
    }

    #[tokio::test]
    async fn test_payout_releases_converted_amount() {
        let chain = SimulatedChain::new(KeyPair::generate());
        chain
            .send_and_confirm(&chain.builder().weekly_payout(10_000, 8_000))
            .await
            .unwrap();
        assert_eq!(chain.account_snapshot().usdc_reserves, 992_000);

        let result = chain.submit(&chain.builder().weekly_payout(100, 101)).await;
        assert!(matches!(result, Err(ChainError::TransactionFailed(_))));
        assert_eq!(chain.account_snapshot().usdc_reserves, 992_000);
    }

    #[tokio::test]
    async fn test_burn_beyond_reserves_rejected() {
        let chain = SimulatedChain::with_account(
            KeyPair::generate(),
            TreasuryAccount {
                ece_circulation: 100,
                usdc_reserves: 50,
                is_paused: false,
            },
        );
        let result = chain.submit(&chain.builder().burn("wallet", 60)).await;
        assert!(matches!(result, Err(ChainError::InsufficientFunds(_))));
        assert_eq!(chain.account_snapshot().usdc_reserves, 50);
        assert_eq!(chain.submitted_count(), 0);
    }

    #[tokio::test]
    async fn test_paused_program_rejects_transfers() {
        let chain = SimulatedChain::new(KeyPair::generate());
        let builder = chain.builder();
        chain.send_and_confirm(&builder.emergency_pause()).await.unwrap();
        assert!(chain.account_snapshot().is_paused);

        let result = chain.submit(&builder.mint("wallet", 1)).await;
        assert!(matches!(result, Err(ChainError::TransactionFailed(_))));

        chain.send_and_confirm(&builder.emergency_unpause()).await.unwrap();
        assert!(chain.submit(&builder.mint("wallet", 1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_foreign_program_rejected() {
        let chain = SimulatedChain::new(KeyPair::generate());
        let builder = TransactionBuilder::new("other", SIMULATED_STATE_ACCOUNT, chain.authority());
        assert!(matches!(
            chain.submit(&builder.mint("wallet", 1)).await,
            Err(ChainError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let chain = SimulatedChain::new(KeyPair::generate());
        let builder = chain.builder();

        chain.fail_next_submit(ChainError::Transport("connection reset".to_string()));
        assert!(matches!(
            chain.submit(&builder.mint("wallet", 1)).await,
            Err(ChainError::Transport(_))
        ));

        chain.fail_next_confirm();
        let sig = chain.submit(&builder.mint("wallet", 1)).await.unwrap();
        assert!(matches!(chain.confirm(&sig).await, Err(ChainError::Timeout(_))));
        assert!(chain.confirm(&sig).await.is_ok());
    }

    #[tokio::test]
    async fn test_held_confirmations_stay_pending() {
        let chain = SimulatedChain::new(KeyPair::generate());
        chain.hold_confirmations(true);
        let sig = chain.submit(&chain.builder().mint("wallet", 1)).await.unwrap();
        assert_eq!(
            chain.signature_status(&sig).await.unwrap(),
            SignatureStatus::Pending
        );
        assert!(chain.confirm(&sig).await.is_err());
    }
}
