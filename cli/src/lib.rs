//! `ece-treasuryd` wiring: ledger, chain gateway and orchestrator from config

pub mod config;

pub use config::{DaemonConfig, ServerConfig, StorageKind};

use anyhow::Context;
use ece_api::ApiState;
use ece_storage::SledLedger;
use ece_treasury::{
    ChainGateway, ChainMode, LedgerStore, MemoryLedger, RpcChainGateway, SimulatedChain,
    TreasuryConfig, TreasuryOrchestrator,
};
use std::sync::Arc;

/// Fully wired service ready to serve
pub struct Service {
    pub ledger: Arc<dyn LedgerStore>,
    pub orchestrator: Arc<TreasuryOrchestrator>,
    pub api_state: ApiState,
}

pub fn open_ledger(config: &DaemonConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.server.storage {
        StorageKind::Sled => {
            let path = config.ledger_path();
            std::fs::create_dir_all(&config.server.data_dir)
                .with_context(|| format!("creating data dir {}", config.server.data_dir.display()))?;
            let ledger = SledLedger::open(&path)
                .with_context(|| format!("opening ledger at {}", path.display()))?;
            Ok(Arc::new(ledger))
        }
        StorageKind::Memory => {
            tracing::warn!("using in-memory ledger, records are lost on shutdown");
            Ok(Arc::new(MemoryLedger::new()))
        }
    }
}

pub fn build_chain(config: &TreasuryConfig) -> anyhow::Result<Arc<dyn ChainGateway>> {
    let keypair = config.signing_key()?;
    match config.chain_mode {
        ChainMode::Rpc => {
            tracing::info!(
                rpc_url = %config.rpc_url,
                program_id = %config.program_id,
                commitment = config.commitment.as_str(),
                "using JSON-RPC chain gateway"
            );
            let gateway = RpcChainGateway::new(config.rpc_gateway_config(), keypair)?;
            Ok(Arc::new(gateway))
        }
        ChainMode::Simulated => {
            tracing::warn!("using simulated chain, no transactions reach the network");
            Ok(Arc::new(SimulatedChain::new(keypair)))
        }
    }
}

/// Build every component and reconcile payouts left PENDING by a previous run
pub async fn build_service(config: &DaemonConfig) -> anyhow::Result<Service> {
    config.treasury.validate()?;

    let ledger = open_ledger(config)?;
    let chain = build_chain(&config.treasury)?;
    let orchestrator = Arc::new(TreasuryOrchestrator::new(
        ledger.clone(),
        chain,
        config.treasury.emergency_signers.iter().cloned(),
    ));

    let report = orchestrator
        .recover_pending_payouts()
        .await
        .context("reconciling pending payouts")?;
    if !report.completed.is_empty() || !report.failed.is_empty() || report.unresolved().next().is_some() {
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            still_pending = report.still_pending.len(),
            needs_review = report.needs_review.len(),
            "pending payouts reconciled"
        );
    }

    let api_state = ApiState::new(orchestrator.clone(), config.treasury.admin_wallets.iter().cloned());
    Ok(Service {
        ledger,
        orchestrator,
        api_state,
    })
}
