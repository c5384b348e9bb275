//! API State Management

use ece_treasury::{StatusReporter, TreasuryOrchestrator};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<TreasuryOrchestrator>,
    pub reporter: StatusReporter,
    pub admin_wallets: Arc<HashSet<String>>,
    pub started_at: std::time::Instant,
}

impl ApiState {
    pub fn new<I>(orchestrator: Arc<TreasuryOrchestrator>, admin_wallets: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let admin_wallets: HashSet<String> = admin_wallets
            .into_iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        if admin_wallets.is_empty() {
            tracing::warn!("no admin wallets configured, admin routes will reject every caller");
        }

        Self {
            reporter: orchestrator.status_reporter(),
            orchestrator,
            admin_wallets: Arc::new(admin_wallets),
            started_at: std::time::Instant::now(),
        }
    }

    pub fn is_admin(&self, wallet: &str) -> bool {
        self.admin_wallets.contains(wallet)
    }

    pub fn is_emergency_signer(&self, wallet: &str) -> bool {
        self.orchestrator.is_emergency_signer(wallet)
    }
}
