//! Wallet header authentication

use crate::{ApiError, ApiState};
use axum::{extract::FromRequestParts, http::request::Parts};

pub const WALLET_HEADER: &str = "x-wallet-address";

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Well-formed base58 address of 32 to 44 characters
pub fn is_valid_wallet_address(address: &str) -> bool {
    (32..=44).contains(&address.len()) && address.chars().all(|c| BASE58_ALPHABET.contains(c))
}

fn wallet_from_parts(parts: &Parts) -> Result<String, ApiError> {
    let value = parts
        .headers
        .get(WALLET_HEADER)
        .ok_or(ApiError::MissingWallet)?;
    let address = value
        .to_str()
        .map_err(|_| ApiError::InvalidWallet("header is not valid ASCII".to_string()))?
        .trim();

    if !is_valid_wallet_address(address) {
        return Err(ApiError::InvalidWallet(address.to_string()));
    }
    Ok(address.to_string())
}

/// Any caller presenting a well-formed wallet address
#[derive(Debug, Clone)]
pub struct Wallet(pub String);

/// Caller whose wallet is on the admin allowlist
#[derive(Debug, Clone)]
pub struct AdminWallet(pub String);

/// Caller whose wallet is on the emergency signer allowlist
#[derive(Debug, Clone)]
pub struct EmergencySigner(pub String);

impl FromRequestParts<ApiState> for Wallet {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &ApiState) -> Result<Self, Self::Rejection> {
        wallet_from_parts(parts).map(Wallet)
    }
}

impl FromRequestParts<ApiState> for AdminWallet {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let address = wallet_from_parts(parts)?;
        if !state.is_admin(&address) {
            tracing::warn!(wallet = %address, "admin route called by non-admin wallet");
            return Err(ApiError::Forbidden(address));
        }
        Ok(AdminWallet(address))
    }
}

impl FromRequestParts<ApiState> for EmergencySigner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let address = wallet_from_parts(parts)?;
        if !state.is_emergency_signer(&address) {
            tracing::warn!(wallet = %address, "emergency route called by unauthorized wallet");
            return Err(ApiError::Forbidden(address));
        }
        Ok(EmergencySigner(address))
    }
}
