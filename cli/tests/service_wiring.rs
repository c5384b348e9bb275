//! Service wiring from daemon configuration

use ece_cli::{build_service, DaemonConfig, StorageKind};
use ece_treasury::{ChainMode, LedgerStore, PayoutStatus, WeeklyPayoutRequest};

const ADMIN: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
const SIGNER: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

fn simulated_config(storage: StorageKind, data_dir: &std::path::Path) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.server.storage = storage;
    config.server.data_dir = data_dir.to_path_buf();
    config.treasury.chain_mode = ChainMode::Simulated;
    config.treasury.admin_wallets = vec![ADMIN.to_string()];
    config.treasury.emergency_signers = vec![SIGNER.to_string()];
    config
}

#[tokio::test]
async fn test_memory_service_runs_payout() {
    let dir = tempfile::tempdir().unwrap();
    let service = build_service(&simulated_config(StorageKind::Memory, dir.path()))
        .await
        .unwrap();

    assert!(service.api_state.is_admin(ADMIN));
    assert!(service.api_state.is_emergency_signer(SIGNER));

    let receipt = service
        .orchestrator
        .process_weekly_payout(WeeklyPayoutRequest {
            revenue_amount: 4_000,
            payout_percentage: 25.0,
            authorized_signers: vec![ADMIN.to_string()],
        })
        .await
        .unwrap();
    assert_eq!(receipt.ece_converted, 1_000);
    assert_eq!(receipt.ece_retained, 3_000);
}

#[tokio::test]
async fn test_sled_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = simulated_config(StorageKind::Sled, dir.path());

    let payout_id = {
        let service = build_service(&config).await.unwrap();
        let receipt = service
            .orchestrator
            .process_weekly_payout(WeeklyPayoutRequest {
                revenue_amount: 10_000,
                payout_percentage: 80.0,
                authorized_signers: vec![ADMIN.to_string()],
            })
            .await
            .unwrap();
        service.ledger.flush().await.unwrap();
        receipt.payout_id
    };

    let service = build_service(&config).await.unwrap();
    let record = service.ledger.get_payout(&payout_id).await.unwrap().unwrap();
    assert_eq!(record.status, PayoutStatus::Completed);
    assert!(config.ledger_path().exists());
}

#[tokio::test]
async fn test_rpc_mode_requires_signing_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = simulated_config(StorageKind::Memory, dir.path());
    config.treasury.chain_mode = ChainMode::Rpc;
    config.treasury.program_id = "ECEprogram1111111111111111111111111111111111".to_string();
    config.treasury.treasury_state_account =
        "ECEstate11111111111111111111111111111111111".to_string();

    let err = build_service(&config).await.err().unwrap();
    assert!(err.to_string().contains("signing key"));
}
