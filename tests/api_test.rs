//! HTTP API tests
//!
//! The server runs on an ephemeral port with an in-memory store and a
//! scripted ledger, so these tests need no network access. Tests against a
//! live node are marked `#[ignore]`.
//!
//! Run ignored tests with: cargo test --test api_test -- --ignored --nocapture

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{address, Address, B256};
use async_trait::async_trait;
use serde_json::{json, Value};

use icm_dashboard::api::{self, AppState};
use icm_dashboard::encoder::ContractMode;
use icm_dashboard::fees::FeeEstimator;
use icm_dashboard::ledger::{Ledger, ReceiptLog, ReceiptSummary};
use icm_dashboard::store::MemoryStore;
use icm_dashboard::{IcmError, Orchestrator, OrchestratorConfig};

const CONTRACT: Address = address!("253b2784c75e510dD0fF1da844684a1aC0aa5fcf");
const WALLET: &str = "0x2129b880124f9f867dCc080f3272b6CaaBDD5850";
const RECIPIENT: &str = "0x8db97C7cEcE249c2b98bDC0226Cc4C2A57BF52FC";

/// Ledger whose receipts and deliveries are set by the test
#[derive(Default)]
struct ScriptedLedger {
    receipts: Mutex<HashMap<B256, ReceiptSummary>>,
    delivered: Mutex<HashSet<B256>>,
}

impl ScriptedLedger {
    fn mine(&self, tx_hash: B256, success: bool, message_id: Option<B256>) {
        let topics = match message_id {
            Some(id) => vec![B256::repeat_byte(0x01), id],
            None => vec![B256::repeat_byte(0x01)],
        };
        self.receipts.lock().unwrap().insert(
            tx_hash,
            ReceiptSummary {
                tx_hash,
                success,
                block_number: Some(4242),
                logs: vec![ReceiptLog {
                    address: CONTRACT,
                    topics,
                }],
            },
        );
    }

    fn deliver(&self, message_id: B256) {
        self.delivered.lock().unwrap().insert(message_id);
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptSummary>, IcmError> {
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn message_received(&self, _contract: Address, message_id: B256) -> Result<bool, IcmError> {
        Ok(self.delivered.lock().unwrap().contains(&message_id))
    }
}

struct TestServer {
    base_url: String,
    ledger: Arc<ScriptedLedger>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start(mode: ContractMode) -> Self {
        let ledger = Arc::new(ScriptedLedger::default());
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Orchestrator::new(
            OrchestratorConfig {
                mode,
                confirmation_timeout: Duration::from_millis(300),
                receipt_poll_interval: Duration::from_millis(10),
                ..Default::default()
            },
            FeeEstimator::default(),
            ledger.clone(),
            store,
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = api::router(AppState::new(Arc::new(orchestrator)));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            ledger,
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }
}

fn send_body(message: &str, amount: &str) -> Value {
    json!({
        "sourceChain": "fuji",
        "destinationChainId": "0x0000000000000000000000000000000000000000000000000000000000000001",
        "recipient": RECIPIENT,
        "message": message,
        "amount": amount,
        "walletAddress": WALLET,
    })
}

fn hash(byte: u8) -> B256 {
    B256::repeat_byte(byte)
}

// ============================================================================
// Prepare
// ============================================================================

#[tokio::test]
async fn test_send_prepares_transaction() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;
    let (status, body) = server.post("/api/icm/send", send_body("hello", "0.02")).await;

    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["mock"], false);
    let to: Address = body["transactionData"]["to"].as_str().unwrap().parse().unwrap();
    assert_eq!(to, CONTRACT);
    assert_eq!(body["transactionData"]["value"], "20000000000000000");
    assert_eq!(body["transactionData"]["gasLimit"], 500000);
    assert!(body["transactionData"]["data"].as_str().unwrap().len() > 10);
    assert_eq!(body["messageInput"]["requiredGasLimit"], 200000);
    assert_eq!(body["messageInput"]["message"], "hello");
    assert!(body["feeQuote"]["feeInAvax"].is_string());
}

#[tokio::test]
async fn test_send_rejects_invalid_input() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;

    let (status, body) = server
        .post("/api/icm/send", send_body(&"x".repeat(1001), "0.01"))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "MessageTooLarge");

    let (status, body) = server.post("/api/icm/send", send_body("hi", "11")).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "AmountOutOfRange");

    let mut bad_chain = send_body("hi", "0.01");
    bad_chain["destinationChainId"] = json!("0xzz");
    let (status, body) = server.post("/api/icm/send", bad_chain).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "InvalidChainId");
}

// ============================================================================
// Complete and track
// ============================================================================

#[tokio::test]
async fn test_complete_records_and_tracks_message() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;
    let (_, prepared) = server.post("/api/icm/send", send_body("ping", "0.01")).await;

    let tx_hash = hash(0xab);
    let message_id = hash(0x77);
    server.ledger.mine(tx_hash, true, Some(message_id));

    let (status, body) = server
        .post(
            "/api/icm/complete",
            json!({
                "txHash": tx_hash.to_string(),
                "messageInput": prepared["messageInput"],
                "walletAddress": WALLET,
            }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["messageId"], message_id.to_string());
    assert_eq!(body["blockNumber"], 4242);
    assert_eq!(body["status"], "pending");
    assert!(body.get("warning").is_none());

    let (status, history) = server
        .get(&format!("/api/icm/history?address={}", WALLET))
        .await;
    assert_eq!(status, 200);
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["content"], "ping");
    assert_eq!(entries[0]["destinationSubnet"], "Dexalot");

    let (_, stats) = server.get(&format!("/api/icm/stats?address={}", WALLET)).await;
    assert_eq!(stats["totalSent"], 1);
    assert_eq!(stats["pendingMessages"], 1);

    // Undelivered status checks change nothing
    let status_path = format!("/api/icm/status/{}", message_id);
    let (_, status_body) = server.get(&status_path).await;
    assert_eq!(status_body["status"], "pending");

    server.ledger.deliver(message_id);
    let (_, status_body) = server.get(&status_path).await;
    assert_eq!(status_body["status"], "delivered");

    let (_, stats) = server.get(&format!("/api/icm/stats?address={}", WALLET)).await;
    assert_eq!(stats["totalReceived"], 1);
    assert_eq!(stats["successRate"], 100.0);

    let (_, analytics) = server
        .get(&format!("/api/icm/analytics?address={}&days=7", WALLET))
        .await;
    assert_eq!(analytics["messagesByDay"].as_array().unwrap().len(), 7);
    assert_eq!(analytics["messagesBySubnet"][0]["name"], "Dexalot");
    assert_eq!(analytics["totalVolume"], "0.01");
    assert!(analytics["averageDeliveryTime"].is_number());
}

#[tokio::test]
async fn test_complete_is_idempotent() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;
    let (_, prepared) = server.post("/api/icm/send", send_body("once", "0.01")).await;
    let tx_hash = hash(0xac);
    server.ledger.mine(tx_hash, true, Some(hash(0x78)));

    let body = json!({
        "txHash": tx_hash.to_string(),
        "messageInput": prepared["messageInput"],
        "walletAddress": WALLET,
    });
    let (first, _) = server.post("/api/icm/complete", body.clone()).await;
    let (second, _) = server.post("/api/icm/complete", body).await;
    assert_eq!((first, second), (200, 200));

    let (_, stats) = server.get(&format!("/api/icm/stats?address={}", WALLET)).await;
    assert_eq!(stats["totalSent"], 1);
}

#[tokio::test]
async fn test_complete_without_message_id_warns() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;
    let (_, prepared) = server.post("/api/icm/send", send_body("anon", "0.01")).await;
    let tx_hash = hash(0xad);
    server.ledger.mine(tx_hash, true, None);

    let (status, body) = server
        .post(
            "/api/icm/complete",
            json!({
                "txHash": tx_hash.to_string(),
                "messageInput": prepared["messageInput"],
                "walletAddress": WALLET,
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["messageId"].is_null());
    assert!(body["warning"].as_str().unwrap().contains("no message ID"));
}

#[tokio::test]
async fn test_complete_timeout_is_retryable() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;
    let (_, prepared) = server.post("/api/icm/send", send_body("slow", "0.01")).await;
    let tx_hash = hash(0xae);
    let body = json!({
        "txHash": tx_hash.to_string(),
        "messageInput": prepared["messageInput"],
        "walletAddress": WALLET,
    });

    let (status, err) = server.post("/api/icm/complete", body.clone()).await;
    assert_eq!(status, 504);
    assert_eq!(err["error"], "ConfirmationTimeout");
    assert_eq!(err["retryable"], true);

    let (_, history) = server
        .get(&format!("/api/icm/history?address={}", WALLET))
        .await;
    assert!(history.as_array().unwrap().is_empty());

    // Same hash succeeds once mined
    server.ledger.mine(tx_hash, true, Some(hash(0x79)));
    let (status, _) = server.post("/api/icm/complete", body).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_complete_revert_is_recorded_failed() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;
    let (_, prepared) = server.post("/api/icm/send", send_body("boom", "0.01")).await;
    let tx_hash = hash(0xaf);
    server.ledger.mine(tx_hash, false, None);

    let body = json!({
        "txHash": tx_hash.to_string(),
        "messageInput": prepared["messageInput"],
        "walletAddress": WALLET,
    });

    // A retry of the same hash reports the revert again
    for _ in 0..2 {
        let (status, err) = server.post("/api/icm/complete", body.clone()).await;
        assert_eq!(status, 422);
        assert_eq!(err["error"], "ReceiptIndicatesRevert");
        assert!(err.get("retryable").is_none());
    }

    let (_, history) = server
        .get(&format!("/api/icm/history?address={}&status=failed", WALLET))
        .await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}

// ============================================================================
// Mock mode
// ============================================================================

#[tokio::test]
async fn test_mock_mode() {
    let server = TestServer::start(ContractMode::Mock).await;
    let (status, body) = server.post("/api/icm/send", send_body("mock", "0.01")).await;
    assert_eq!(status, 200);
    assert_eq!(body["mock"], true);
    let to: Address = body["transactionData"]["to"].as_str().unwrap().parse().unwrap();
    assert_eq!(to, Address::ZERO);

    let (status, err) = server
        .get(&format!("/api/icm/status/{}", hash(0x11)))
        .await;
    assert_eq!(status, 409);
    assert_eq!(err["error"], "ContractNotConfigured");

    let (_, health) = server.get("/health").await;
    assert_eq!(health["mock"], true);
    assert!(health["contract"].is_null());
}

// ============================================================================
// Queries and reference data
// ============================================================================

#[tokio::test]
async fn test_query_validation() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;

    let (status, _) = server.get("/api/icm/history").await;
    assert_eq!(status, 400);

    let (status, body) = server.get("/api/icm/stats?address=0x1234").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "InvalidAddress");

    let (status, _) = server
        .get(&format!("/api/icm/history?address={}&sort=colour", WALLET))
        .await;
    assert_eq!(status, 400);

    let (status, _) = server.get("/api/icm/status/0x1234").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_fee_and_chains() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;

    let (status, quote) = server
        .get("/api/icm/fee?destinationChainId=1&messageSize=100&gasLimit=200000")
        .await;
    assert_eq!(status, 200);
    assert_eq!(quote["feeInAvax"], "0.016");
    assert_eq!(quote["feeInWei"], "16000000000000000");

    let (_, chains) = server.get("/api/icm/chains").await;
    assert_eq!(chains.as_array().unwrap().len(), 4);
    assert_eq!(chains[0]["chainId"], "43113");

    let (_, info) = server.get("/api/icm/chains/43113").await;
    assert_eq!(info["name"], "Avalanche Fuji C-Chain");
    assert_eq!(info["isKnown"], true);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;

    let (status, health) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(health["status"], "healthy");

    let resp = reqwest::get(format!("{}/healthz", server.base_url)).await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "OK");

    server.post("/api/icm/send", send_body("count me", "0.01")).await;
    let resp = reqwest::get(format!("{}/metrics", server.base_url)).await.unwrap();
    assert!(resp.status().is_success());
    let text = resp.text().await.unwrap();
    assert!(text.contains("icm_messages_prepared_total"));
}

#[tokio::test]
async fn test_cors_preflight() {
    let server = TestServer::start(ContractMode::Real(CONTRACT)).await;
    let resp = server
        .client
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/api/icm/send", server.base_url),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .unwrap()
            .to_str()
            .unwrap(),
        "*"
    );
}

// ============================================================================
// Live network
// ============================================================================

mod live {
    use icm_dashboard::config::DEFAULT_RPC_URL;
    use icm_dashboard::ledger::{Ledger, RpcLedger};

    fn rpc_url() -> String {
        std::env::var("AVALANCHE_FUJI_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string())
    }

    #[tokio::test]
    #[ignore = "requires network access to the Fuji RPC endpoint"]
    async fn test_fuji_chain_id() {
        let ledger = RpcLedger::new(&rpc_url()).unwrap();
        assert_eq!(ledger.chain_id().await.unwrap(), 43113);
    }

    #[tokio::test]
    #[ignore = "requires network access to the Fuji RPC endpoint"]
    async fn test_unknown_receipt_is_none() {
        let ledger = RpcLedger::new(&rpc_url()).unwrap();
        let receipt = ledger
            .transaction_receipt(alloy::primitives::B256::repeat_byte(0x42))
            .await
            .unwrap();
        assert!(receipt.is_none());
    }
}
