//! Treasury program transactions

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ece_crypto::KeyPair;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ChainError, ChainResult};

/// Instructions understood by the treasury program
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TreasuryInstruction {
    WeeklyPayout {
        revenue_amount: u64,
        /// ECE burned against reserves to fund the USDC payout
        ece_converted: u64,
    },
    MintTokens {
        recipient: String,
        amount: u64,
    },
    BurnTokens {
        owner: String,
        amount: u64,
    },
    EmergencyPause,
    EmergencyUnpause,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub program_id: String,
    pub treasury_state_account: String,
    pub fee_payer: String,
    /// Unique per transaction so identical instructions never collide
    pub nonce: String,
    pub instruction: TreasuryInstruction,
}

impl UnsignedTransaction {
    /// Bytes covered by the signature
    pub fn message_bytes(&self) -> ChainResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ChainError::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedTransaction {
    pub message: UnsignedTransaction,
    pub signer: String,
    pub signature: String,
}

impl SignedTransaction {
    pub fn sign(message: UnsignedTransaction, keypair: &KeyPair) -> ChainResult<Self> {
        let bytes = message.message_bytes()?;
        Ok(Self {
            signature: keypair.sign_hex(&bytes),
            signer: keypair.public_key_hex(),
            message,
        })
    }

    /// Signature must be valid and made by the fee payer
    pub fn verify(&self) -> ChainResult<()> {
        if self.signer != self.message.fee_payer {
            return Err(ChainError::SignatureRejected(
                "signer is not the fee payer".to_string(),
            ));
        }
        let bytes = self.message.message_bytes()?;
        KeyPair::verify_hex(&self.signer, &bytes, &self.signature)
            .map_err(|e| ChainError::SignatureRejected(e.to_string()))
    }

    /// Wire encoding: base64 of the bincode bytes
    pub fn encode_base64(&self) -> ChainResult<String> {
        let bytes = bincode::serialize(self).map_err(|e| ChainError::Decode(e.to_string()))?;
        Ok(STANDARD.encode(bytes))
    }

    pub fn decode_base64(encoded: &str) -> ChainResult<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        bincode::deserialize(&bytes).map_err(|e| ChainError::Decode(e.to_string()))
    }
}

/// Produces unsigned transactions for the treasury program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBuilder {
    program_id: String,
    treasury_state_account: String,
    fee_payer: String,
}

impl TransactionBuilder {
    pub fn new(
        program_id: impl Into<String>,
        treasury_state_account: impl Into<String>,
        fee_payer: impl Into<String>,
    ) -> Self {
        Self {
            program_id: program_id.into(),
            treasury_state_account: treasury_state_account.into(),
            fee_payer: fee_payer.into(),
        }
    }

    fn build(&self, instruction: TreasuryInstruction) -> UnsignedTransaction {
        UnsignedTransaction {
            program_id: self.program_id.clone(),
            treasury_state_account: self.treasury_state_account.clone(),
            fee_payer: self.fee_payer.clone(),
            nonce: Uuid::new_v4().to_string(),
            instruction,
        }
    }

    pub fn weekly_payout(&self, revenue_amount: u64, ece_converted: u64) -> UnsignedTransaction {
        self.build(TreasuryInstruction::WeeklyPayout {
            revenue_amount,
            ece_converted,
        })
    }

    pub fn mint(&self, recipient: &str, amount: u64) -> UnsignedTransaction {
        self.build(TreasuryInstruction::MintTokens {
            recipient: recipient.to_string(),
            amount,
        })
    }

    pub fn burn(&self, owner: &str, amount: u64) -> UnsignedTransaction {
        self.build(TreasuryInstruction::BurnTokens {
            owner: owner.to_string(),
            amount,
        })
    }

    pub fn emergency_pause(&self) -> UnsignedTransaction {
        self.build(TreasuryInstruction::EmergencyPause)
    }

    pub fn emergency_unpause(&self) -> UnsignedTransaction {
        self.build(TreasuryInstruction::EmergencyUnpause)
    }
}
