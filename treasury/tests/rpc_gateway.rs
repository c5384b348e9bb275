use axum::{extract::State, routing::post, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ece_crypto::KeyPair;
use ece_treasury::chain::rpc::Commitment;
use ece_treasury::chain::{
    ChainError, ChainGateway, RpcChainGateway, RpcGatewayConfig, SignatureStatus,
    SignedTransaction, TreasuryAccount, TreasuryInstruction,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PROGRAM: &str = "ECEprogram1111111111111111111111111111111111";
const STATE: &str = "ECEstate11111111111111111111111111111111111";

#[derive(Default)]
struct MockNode {
    /// Status polls answered with null before confirming
    unconfirmed_polls: usize,
    polls: AtomicUsize,
    reject_send: Option<(i64, &'static str)>,
    missing_account: bool,
    failed_tx: bool,
}

async fn handle(State(node): State<Arc<MockNode>>, Json(body): Json<Value>) -> Json<Value> {
    let id = body["id"].clone();
    let params = &body["params"];

    let result = match body["method"].as_str().unwrap_or_default() {
        "sendTransaction" => {
            if let Some((code, message)) = node.reject_send {
                return Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": code, "message": message }
                }));
            }
            assert_eq!(params[1]["encoding"], "base64");
            let tx = SignedTransaction::decode_base64(params[0].as_str().unwrap()).unwrap();
            tx.verify().unwrap();
            assert_eq!(tx.message.program_id, PROGRAM);
            assert_eq!(
                tx.message.instruction,
                TreasuryInstruction::MintTokens {
                    recipient: "wallet".to_string(),
                    amount: 250
                }
            );
            json!(format!("sig-{}", tx.message.nonce))
        }
        "getSignatureStatuses" => {
            let polls = node.polls.fetch_add(1, Ordering::SeqCst);
            if node.failed_tx {
                json!({ "context": { "slot": 1 }, "value": [
                    { "confirmationStatus": "processed", "err": { "InstructionError": [0, "Custom"] } }
                ]})
            } else if polls < node.unconfirmed_polls {
                json!({ "context": { "slot": 1 }, "value": [null] })
            } else {
                json!({ "context": { "slot": 2 }, "value": [
                    { "confirmationStatus": "confirmed", "err": null }
                ]})
            }
        }
        "getAccountInfo" => {
            assert_eq!(params[0], STATE);
            if node.missing_account {
                json!({ "context": { "slot": 1 }, "value": null })
            } else {
                let account = TreasuryAccount {
                    ece_circulation: 5_000,
                    usdc_reserves: 4_000,
                    is_paused: false,
                };
                let data = STANDARD.encode(bincode::serialize(&account).unwrap());
                json!({ "context": { "slot": 1 }, "value": {
                    "data": [data, "base64"],
                    "lamports": 1_000_000,
                    "owner": PROGRAM
                }})
            }
        }
        other => panic!("unexpected method {}", other),
    };

    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

async fn spawn_gateway(node: MockNode, confirm_timeout: Duration) -> RpcChainGateway {
    let app = Router::new()
        .route("/", post(handle))
        .with_state(Arc::new(node));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    RpcChainGateway::new(
        RpcGatewayConfig {
            rpc_url: format!("http://{}", addr),
            commitment: Commitment::Confirmed,
            program_id: PROGRAM.to_string(),
            treasury_state_account: STATE.to_string(),
            request_timeout: Duration::from_secs(5),
            confirm_timeout,
            poll_interval: Duration::from_millis(10),
        },
        KeyPair::generate(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_submit_and_confirm() {
    let node = MockNode {
        unconfirmed_polls: 2,
        ..Default::default()
    };
    let gateway = spawn_gateway(node, Duration::from_secs(5)).await;

    let tx = gateway.builder().mint("wallet", 250);
    let signature = gateway.send_and_confirm(&tx).await.unwrap();
    assert_eq!(signature, format!("sig-{}", tx.nonce));
    assert_eq!(
        gateway.signature_status(&signature).await.unwrap(),
        SignatureStatus::Confirmed
    );
}

#[tokio::test]
async fn test_confirmation_timeout() {
    let node = MockNode {
        unconfirmed_polls: usize::MAX,
        ..Default::default()
    };
    let gateway = spawn_gateway(node, Duration::from_millis(200)).await;

    let result = gateway.confirm("sig-never").await;
    assert!(matches!(result, Err(ChainError::Timeout(_))));
}

#[tokio::test]
async fn test_failed_transaction_reported() {
    let node = MockNode {
        failed_tx: true,
        ..Default::default()
    };
    let gateway = spawn_gateway(node, Duration::from_secs(5)).await;

    assert!(matches!(
        gateway.signature_status("sig").await.unwrap(),
        SignatureStatus::Failed(_)
    ));
    assert!(matches!(
        gateway.confirm("sig").await,
        Err(ChainError::TransactionFailed(_))
    ));
}

#[tokio::test]
async fn test_rpc_errors_are_classified() {
    let node = MockNode {
        reject_send: Some((-32002, "Transaction simulation failed: insufficient funds")),
        ..Default::default()
    };
    let gateway = spawn_gateway(node, Duration::from_secs(5)).await;
    let result = gateway.submit(&gateway.builder().mint("wallet", 250)).await;
    assert!(matches!(result, Err(ChainError::InsufficientFunds(_))));

    let node = MockNode {
        reject_send: Some((-32005, "Node is unhealthy")),
        ..Default::default()
    };
    let gateway = spawn_gateway(node, Duration::from_secs(5)).await;
    let result = gateway.submit(&gateway.builder().mint("wallet", 250)).await;
    assert!(matches!(result, Err(ChainError::Rpc { code: -32005, .. })));
}

#[tokio::test]
async fn test_treasury_account_decoded() {
    let gateway = spawn_gateway(MockNode::default(), Duration::from_secs(5)).await;
    let account = gateway.treasury_account().await.unwrap();
    assert_eq!(account.ece_circulation, 5_000);
    assert_eq!(account.usdc_reserves, 4_000);
    assert!(!account.is_paused);

    let node = MockNode {
        missing_account: true,
        ..Default::default()
    };
    let gateway = spawn_gateway(node, Duration::from_secs(5)).await;
    assert!(matches!(
        gateway.treasury_account().await,
        Err(ChainError::AccountNotFound(_))
    ));
}

#[tokio::test]
async fn test_unreachable_node_is_transport_error() {
    let gateway = RpcChainGateway::new(
        RpcGatewayConfig {
            rpc_url: "http://127.0.0.1:1".to_string(),
            commitment: Commitment::Finalized,
            program_id: PROGRAM.to_string(),
            treasury_state_account: STATE.to_string(),
            request_timeout: Duration::from_secs(2),
            confirm_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(10),
        },
        KeyPair::generate(),
    )
    .unwrap();

    assert!(matches!(
        gateway.treasury_account().await,
        Err(ChainError::Transport(_))
    ));
}
