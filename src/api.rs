//! HTTP API for the dashboard
//!
//! Endpoints:
//! - POST /api/icm/send - Prepare a transaction for wallet signing
//! - POST /api/icm/complete - Confirm a signed transaction and record it
//! - GET /api/icm/history - Sender history with filters and paging
//! - GET /api/icm/stats - Headline counters for a sender
//! - GET /api/icm/analytics - Aggregates for a sender
//! - GET /api/icm/status/{messageId} - Delivery status of one message
//! - GET /api/icm/fee - Fee quote
//! - GET /api/icm/chains - Known destination chains
//! - GET /health, /healthz, /metrics

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::{Address, B256};
use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use eyre::eyre;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::analytics::{self, HistoryEntry, HistoryParams, HistoryQuery};
use crate::chains::{self, BlockchainInfo, ChainEntry};
use crate::encoder::{self, parse_address, parse_hash};
use crate::error::{IcmError, StoreError};
use crate::metrics;
use crate::orchestrator::{Completion, Orchestrator, SendDraft};
use crate::store::MessageStore;
use crate::types::{FeeQuote, MessageInput, MessageStatus, PreparedTransaction};

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            started_at: Instant::now(),
        }
    }
}

/// Error response wrapper
#[derive(Debug)]
pub enum ApiError {
    Icm(IcmError),
    BadRequest(String),
}

impl From<IcmError> for ApiError {
    fn from(err: IcmError) -> Self {
        ApiError::Icm(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Icm(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Icm(err) if err.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Icm(IcmError::ContractNotConfigured) => StatusCode::CONFLICT,
            ApiError::Icm(IcmError::SignatureRejected(_))
            | ApiError::Icm(IcmError::ReceiptIndicatesRevert(_))
            | ApiError::Icm(IcmError::DeliveryFailed { .. })
            | ApiError::Icm(IcmError::MessageIdUnavailable(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Icm(IcmError::Ledger(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Icm(IcmError::ConfirmationTimeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Icm(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Icm(err) => err.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Icm(err) => err.to_string(),
        };
        if status.is_server_error() {
            warn!(kind = self.kind(), error = %details, "Request failed");
        }
        metrics::ERRORS.with_label_values(&["api", self.kind()]).inc();

        let mut body = json!({ "error": self.kind(), "details": details });
        if let ApiError::Icm(err) = &self {
            if err.is_retryable() {
                body["retryable"] = json!(true);
            }
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Amount as sent by the form: usually a string, sometimes a number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountField {
    Text(String),
    Number(serde_json::Number),
}

impl AmountField {
    fn into_string(self) -> String {
        match self {
            AmountField::Text(s) => s,
            AmountField::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendBody {
    /// Informational; the source is always the configured chain
    #[serde(default)]
    pub source_chain: Option<String>,
    pub destination_chain_id: String,
    pub recipient: String,
    pub message: String,
    #[serde(default)]
    pub amount: Option<AmountField>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub required_gas_limit: Option<u64>,
    #[serde(default)]
    pub allowed_relayer_addresses: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    #[serde(flatten)]
    pub prepared: PreparedTransaction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBody {
    pub tx_hash: String,
    pub message_input: MessageInput,
    pub wallet_address: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub success: bool,
    pub tx_hash: B256,
    pub message_id: Option<B256>,
    pub block_number: Option<u64>,
    pub status: crate::types::DeliveryStatus,
    pub mock: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AddressQuery {
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    pub address: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsRequest {
    pub address: Option<String>,
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRequest {
    pub destination_chain_id: Option<String>,
    pub message_size: Option<u64>,
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub mock: bool,
    pub contract: Option<Address>,
    pub uptime_seconds: u64,
}

fn sender_address(raw: Option<String>) -> Result<Address, ApiError> {
    let raw = raw.ok_or_else(|| ApiError::BadRequest("address query parameter is required".into()))?;
    Ok(parse_address(&raw)?)
}

/// Phase 1: validate and encode, returning the unsigned transaction
async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<SendBody>,
) -> ApiResult<SendResponse> {
    info!(
        source = ?body.source_chain,
        destination = %body.destination_chain_id,
        wallet = ?body.wallet_address,
        "Preparing ICM message"
    );

    let draft = SendDraft {
        destination_chain_id: body.destination_chain_id,
        recipient: body.recipient,
        message: body.message,
        amount: body.amount.map(AmountField::into_string).unwrap_or_default(),
        required_gas_limit: body.required_gas_limit,
        allowed_relayer_addresses: body.allowed_relayer_addresses,
    };
    let prepared = state.orchestrator.prepare(&draft)?;

    Ok(Json(SendResponse {
        success: true,
        prepared,
    }))
}

/// Phase 3: confirm the signed transaction and record it
async fn complete_message(
    State(state): State<AppState>,
    Json(body): Json<CompleteBody>,
) -> ApiResult<CompleteResponse> {
    let sender = parse_address(&body.wallet_address)?;
    // Message inputs are echoed back by the client; re-check the bound
    encoder::check_message_length(&body.message_input.message)?;

    let confirmation = state
        .orchestrator
        .confirm(Completion {
            tx_hash: body.tx_hash,
            sender,
            message_input: body.message_input,
        })
        .await?;

    let (warning, message) = match confirmation.message_id() {
        Ok(_) => (None, "ICM message sent successfully".to_string()),
        Err(err) => (
            Some(err.to_string()),
            "Transaction confirmed; message ID not available".to_string(),
        ),
    };
    let warning = match (warning, confirmation.mock) {
        (None, true) => Some("Mock mode: no Teleporter contract is configured".to_string()),
        (w, _) => w,
    };

    Ok(Json(CompleteResponse {
        success: true,
        tx_hash: confirmation.tx_hash,
        message_id: confirmation.message_id,
        block_number: confirmation.block_number,
        status: confirmation.status,
        mock: confirmation.mock,
        warning,
        message,
    }))
}

async fn message_history(
    State(state): State<AppState>,
    Query(req): Query<HistoryRequest>,
) -> ApiResult<Vec<HistoryEntry>> {
    let sender = sender_address(req.address)?;
    let query = HistoryQuery::try_from(HistoryParams {
        status: req.status,
        search: req.search,
        sort: req.sort,
        order: req.order,
        page: req.page,
        limit: req.limit,
    })
    .map_err(ApiError::BadRequest)?;

    let records = state
        .orchestrator
        .store()
        .records_for_sender(sender)
        .await?;
    Ok(Json(analytics::history(records, &query)))
}

async fn message_stats(
    State(state): State<AppState>,
    Query(req): Query<AddressQuery>,
) -> ApiResult<analytics::Stats> {
    let sender = sender_address(req.address)?;
    let records = state
        .orchestrator
        .store()
        .records_for_sender(sender)
        .await?;
    Ok(Json(analytics::stats(&records)))
}

async fn message_analytics(
    State(state): State<AppState>,
    Query(req): Query<AnalyticsRequest>,
) -> ApiResult<analytics::Analytics> {
    let sender = sender_address(req.address)?;
    let days = req.days.unwrap_or(analytics::DEFAULT_ANALYTICS_DAYS);
    if days == 0 || days > analytics::MAX_ANALYTICS_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {}",
            analytics::MAX_ANALYTICS_DAYS
        )));
    }
    let records = state
        .orchestrator
        .store()
        .records_for_sender(sender)
        .await?;
    Ok(Json(analytics::analytics(&records, days, Utc::now())))
}

async fn message_status(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> ApiResult<MessageStatus> {
    let message_id = parse_hash(&message_id).map_err(|_| {
        ApiError::BadRequest(format!("Invalid message ID '{}'", message_id))
    })?;
    Ok(Json(state.orchestrator.refresh_status(message_id).await?))
}

async fn fee_quote(
    State(state): State<AppState>,
    Query(req): Query<FeeRequest>,
) -> ApiResult<FeeQuote> {
    let destination = req.destination_chain_id.unwrap_or_default();
    if !destination.is_empty() {
        encoder::normalize_chain_id(&destination)?;
    }
    let gas_limit = req
        .gas_limit
        .unwrap_or(state.orchestrator.config().default_gas_limit);
    let quote = state
        .orchestrator
        .estimate_fee(&destination, req.message_size.unwrap_or(0), gas_limit);
    Ok(Json(quote))
}

async fn list_chains() -> Json<Vec<ChainEntry>> {
    Json(chains::presets())
}

async fn chain_info(Path(chain_id): Path<String>) -> Json<BlockchainInfo> {
    Json(chains::blockchain_info(&chain_id))
}

/// Health check endpoint handler
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let mode = state.orchestrator.mode();
    Json(HealthResponse {
        status: "healthy",
        mock: mode.is_mock(),
        contract: mode.contract_address(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Liveness probe (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    let (content_type, buffer) = match metrics::gather_text() {
        Ok(encoded) => encoded,
        Err(_) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    };

    match Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

/// Permissive CORS for the browser dashboard
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    response
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/icm/send", post(send_message))
        .route("/api/icm/complete", post(complete_message))
        .route("/api/icm/history", get(message_history))
        .route("/api/icm/stats", get(message_stats))
        .route("/api/icm/analytics", get(message_analytics))
        .route("/api/icm/status/{message_id}", get(message_status))
        .route("/api/icm/fee", get(fee_quote))
        .route("/api/icm/chains", get(list_chains))
        .route("/api/icm/chains/{chain_id}", get(chain_info))
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/metrics", get(prometheus_metrics))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Start the HTTP server; returns when `shutdown` resolves
pub async fn start_server(
    bind_address: &str,
    port: u16,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);
    info!("  /api/icm/* - Dashboard API");
    info!("  /health    - Health status (JSON)");
    info!("  /metrics   - Prometheus metrics");

    metrics::UP.set(1.0);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    metrics::UP.set(0.0);

    Ok(())
}
