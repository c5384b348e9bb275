//! ECE Treasury Cryptography
//!
//! Treasury signing key handling and signature verification

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),
}

/// Key pair used to sign treasury transactions
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(signing_key)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Parse secret key material as found in the environment.
    ///
    /// Accepts either a JSON byte array (`[12,34,...]`, 32 secret bytes or the
    /// 64-byte secret+public keypair layout) or a 64 character hex string.
    pub fn from_secret_material(material: &str) -> Result<Self, CryptoError> {
        let material = material.trim();
        if material.starts_with('[') {
            let bytes: Vec<u8> = serde_json::from_str(material)
                .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
            Self::from_secret_bytes(&bytes)
        } else {
            Self::from_private_key_hex(material)
        }
    }

    /// Create keypair from raw bytes (32 byte seed or 64 byte keypair)
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        match bytes.len() {
            32 => {
                let seed: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| CryptoError::InvalidPrivateKey("bad seed length".to_string()))?;
                Ok(Self::from_signing_key(SigningKey::from_bytes(&seed)))
            }
            64 => {
                let keypair: [u8; 64] = bytes
                    .try_into()
                    .map_err(|_| CryptoError::InvalidPrivateKey("bad keypair length".to_string()))?;
                let signing_key = SigningKey::from_keypair_bytes(&keypair).map_err(|_| {
                    CryptoError::InvalidPrivateKey(
                        "public half does not match secret half".to_string(),
                    )
                })?;
                Ok(Self::from_signing_key(signing_key))
            }
            0 => Err(CryptoError::InvalidPrivateKey("empty key".to_string())),
            n => Err(CryptoError::InvalidPrivateKey(format!(
                "expected 32 or 64 bytes, got {}",
                n
            ))),
        }
    }

    /// Create keypair from private key hex
    pub fn from_private_key_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes =
            hex::decode(hex_str).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    /// Get public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }

    /// Sign message
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Sign message, hex encoded
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.sign(message))
    }

    /// Verify signature
    pub fn verify(
        public_key_hex: &str,
        message: &[u8],
        signature_bytes: &[u8],
    ) -> Result<(), CryptoError> {
        let pub_key_bytes = hex::decode(public_key_hex).map_err(|_| CryptoError::InvalidPublicKey)?;

        let pub_key_array: [u8; 32] = pub_key_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;

        let verifying_key =
            VerifyingKey::from_bytes(&pub_key_array).map_err(|_| CryptoError::InvalidPublicKey)?;

        let sig_array: [u8; 64] = signature_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;

        let signature = Signature::from_bytes(&sig_array);

        verifying_key
            .verify(message, &signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Verify a hex encoded signature
    pub fn verify_hex(
        public_key_hex: &str,
        message: &[u8],
        signature_hex: &str,
    ) -> Result<(), CryptoError> {
        let signature = hex::decode(signature_hex).map_err(|_| CryptoError::InvalidSignature)?;
        Self::verify(public_key_hex, message, &signature)
    }
}
