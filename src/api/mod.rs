//! HTTP API for health checks, status, and driving swap actions

use crate::config::ApiConfig;
use crate::error::{AgentError, AgentResult};
use crate::registry::Registry;
use crate::state::{StoredSwap, SwapStore};
use crate::swap::{Action, ActionRecord, ChainKind, Direction, EventTopics, SwapAgent, SwapRecord};
use crate::tx::TransactionSender;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub store: Arc<dyn SwapStore>,
    pub sender: Arc<TransactionSender>,
    pub started: Instant,
}

impl AppState {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn SwapStore>, sender: Arc<TransactionSender>) -> Self {
        Self {
            registry,
            store,
            sender,
            started: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(get_status))
        .route("/swaps", post(register_swap))
        .route("/swaps/:hash_x", get(get_swap))
        .route("/swaps/:hash_x/actions", post(submit_action))
        .route("/tokens/:token/topics/:direction", get(get_topics))
        .route("/tokens/:token/history", get(get_history))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> AgentResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AgentError::Internal(format!("bind API server on {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AgentError::Internal(format!("API server: {}", e)))?;

    Ok(())
}

/// Agent error rendered as an HTTP response
pub struct ApiError(AgentError);

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AgentError::UnknownToken { .. } | AgentError::SwapNotFound { .. } => StatusCode::NOT_FOUND,
            AgentError::Precondition(_) | AgentError::Encoding(_) => StatusCode::BAD_REQUEST,
            AgentError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AgentError::Submission { .. } | AgentError::ChainConnection { .. } | AgentError::Nonce { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

fn parse_hash_x(hash_x: &str) -> Result<H256, ApiError> {
    H256::from_str(hash_x)
        .map_err(|e| AgentError::Precondition(format!("invalid hashX {}: {}", hash_x, e)).into())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - database and both chains
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state.store.health_check().await.is_ok();

    let chain_health = state.sender.chains().health_check().await;
    let chains_ok = chain_health.iter().all(|(_, healthy)| *healthy);

    let ready = db_ok && chains_ok;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            database: db_ok,
            chains: chain_health
                .into_iter()
                .map(|(chain, healthy)| ChainHealth { chain, healthy })
                .collect(),
        }),
    )
}

/// Operators, nonce sequences and scan markers per chain
async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let mut chains = Vec::with_capacity(2);

    for kind in [ChainKind::Origin, ChainKind::Companion] {
        let handle = state.sender.chains().get(kind);
        chains.push(ChainStatus {
            chain: kind,
            name: handle.name.clone(),
            operator: handle.operator,
            next_nonce: state.sender.nonces().peek(kind).await,
            scanned_block: state.store.get_scanned_block(kind, handle.start_block).await?,
        });
    }

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started.elapsed().as_secs(),
        chains,
    }))
}

async fn register_swap(
    State(state): State<AppState>,
    Json(request): Json<RegisterSwapRequest>,
) -> Result<StatusCode, ApiError> {
    state.registry.lookup_token(&request.token)?;
    state
        .store
        .save_swap(&request.token, request.direction, &request.record)
        .await?;
    Ok(StatusCode::CREATED)
}

async fn get_swap(
    State(state): State<AppState>,
    Path(hash_x): Path<String>,
) -> Result<Json<StoredSwap>, ApiError> {
    let hash_key = parse_hash_x(&hash_x)?;
    Ok(Json(load_swap(state.store.as_ref(), hash_key).await?))
}

/// Run one action for a stored swap and persist its result
async fn submit_action(
    State(state): State<AppState>,
    Path(hash_x): Path<String>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionRecord>, ApiError> {
    let hash_key = parse_hash_x(&hash_x)?;
    let swap = load_swap(state.store.as_ref(), hash_key).await?;

    let agent = SwapAgent::new(
        &state.registry,
        &swap.token,
        swap.direction,
        Some(request.action),
        swap.record,
    )?;

    let record = agent.execute(&state.sender).await?;
    state.store.save_action_record(hash_key, &record).await?;

    Ok(Json(record))
}

/// Contract address and the six event signatures for a token and flow
async fn get_topics(
    State(state): State<AppState>,
    Path((token, direction)): Path<(String, u8)>,
) -> Result<Json<TopicsResponse>, ApiError> {
    let direction = Direction::try_from(direction)?;
    let agent = SwapAgent::new(
        &state.registry,
        &token,
        direction,
        None,
        SwapRecord::new(H256::zero(), Default::default(), Address::zero()),
    )?;

    Ok(Json(TopicsResponse {
        chain: agent.chain(),
        contract: agent.contract_address(),
        topics: *agent.topics(),
    }))
}

async fn get_history(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Vec<StoredSwap>>, ApiError> {
    state.registry.lookup_token(&token)?;
    Ok(Json(state.store.event_history(&token).await?))
}

async fn load_swap(store: &dyn SwapStore, hash_key: H256) -> AgentResult<StoredSwap> {
    store
        .get_swap(hash_key)
        .await?
        .ok_or_else(|| AgentError::SwapNotFound {
            hash_key: format!("{:#x}", hash_key),
        })
}

// Request and response types

#[derive(Debug, Deserialize)]
pub struct RegisterSwapRequest {
    pub token: String,
    pub direction: Direction,
    #[serde(flatten)]
    pub record: SwapRecord,
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: Action,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    retryable: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    database: bool,
    chains: Vec<ChainHealth>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain: ChainKind,
    healthy: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    version: String,
    uptime_seconds: u64,
    chains: Vec<ChainStatus>,
}

#[derive(Debug, Serialize)]
struct ChainStatus {
    chain: ChainKind,
    name: String,
    operator: Address,
    next_nonce: Option<u64>,
    scanned_block: u64,
}

#[derive(Debug, Serialize)]
pub struct TopicsResponse {
    chain: ChainKind,
    contract: Address,
    topics: EventTopics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::registry::tests::{sample_registry, ORIGIN_HTLC};
    use crate::state::MockSwapStore;
    use crate::tx::test_support::{sender_with, NonceEchoSigner, RecordingClient};
    use ethers::types::U256;

    fn stored(direction: Direction, key: Option<H256>) -> StoredSwap {
        let mut record = SwapRecord::new(
            H256::repeat_byte(0xab),
            U256::from(1000u64),
            Address::repeat_byte(0xcd),
        );
        if let Some(key) = key {
            record = record.with_key(key);
        }
        StoredSwap {
            token: "DAI".to_string(),
            direction,
            record,
            actions: Vec::new(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn app_state(store: MockSwapStore, companion: Arc<RecordingClient>) -> AppState {
        let sender = sender_with(
            Arc::new(MockChainClient::new()),
            companion,
            Arc::new(NonceEchoSigner),
        );
        AppState::new(Arc::new(sample_registry()), Arc::new(store), Arc::new(sender))
    }

    fn hash_path() -> Path<String> {
        Path(format!("{:#x}", H256::repeat_byte(0xab)))
    }

    #[tokio::test]
    async fn test_submit_action_persists_record() {
        let mut store = MockSwapStore::new();
        store
            .expect_get_swap()
            .times(1)
            .returning(|_| Ok(Some(stored(Direction::Deposit, None))));
        store
            .expect_save_action_record()
            .withf(|hash_key, record| {
                *hash_key == H256::repeat_byte(0xab) && record.action() == Action::Lock
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let companion = Arc::new(RecordingClient::new(7));
        let state = app_state(store, companion.clone());

        let Json(record) = submit_action(
            State(state),
            hash_path(),
            Json(ActionRequest { action: Action::Lock }),
        )
        .await
        .unwrap_or_else(|e| panic!("unexpected error: {}", e.0));

        assert_eq!(record, ActionRecord::Lock(format!("0x{:064x}", 1)));
        assert_eq!(companion.nonces(), vec![7]);
    }

    #[tokio::test]
    async fn test_refund_without_preimage_is_bad_request() {
        let mut store = MockSwapStore::new();
        store
            .expect_get_swap()
            .returning(|_| Ok(Some(stored(Direction::Deposit, None))));

        let state = app_state(store, Arc::new(RecordingClient::new(0)));

        let err = submit_action(
            State(state),
            hash_path(),
            Json(ActionRequest { action: Action::Refund }),
        )
        .await
        .err()
        .unwrap();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_swap_is_not_found() {
        let mut store = MockSwapStore::new();
        store.expect_get_swap().returning(|_| Ok(None));

        let state = app_state(store, Arc::new(RecordingClient::new(0)));
        let err = get_swap(State(state), hash_path()).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_hash_is_bad_request() {
        let state = app_state(MockSwapStore::new(), Arc::new(RecordingClient::new(0)));
        let err = get_swap(State(state), Path("0x12".to_string())).await.err().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_topics_for_withdraw_flow() {
        let state = app_state(MockSwapStore::new(), Arc::new(RecordingClient::new(0)));

        let Json(response) = get_topics(State(state), Path(("DAI".to_string(), 1)))
            .await
            .unwrap_or_else(|e| panic!("unexpected error: {}", e.0));

        assert_eq!(response.chain, ChainKind::Origin);
        assert_eq!(response.contract, Address::from(ORIGIN_HTLC));
        assert_ne!(response.topics.deposit.lock, response.topics.withdraw.lock);
    }

    #[tokio::test]
    async fn test_status_reports_default_scan_marker() {
        let mut store = MockSwapStore::new();
        store
            .expect_get_scanned_block()
            .times(2)
            .returning(|_, default| Ok(default));

        let state = app_state(store, Arc::new(RecordingClient::new(0)));
        let Json(status) = get_status(State(state))
            .await
            .unwrap_or_else(|e| panic!("unexpected error: {}", e.0));

        assert_eq!(status.chains[0].scanned_block, 2_863_800);
        assert_eq!(status.chains[1].scanned_block, 1_654_200);
        assert_eq!(status.chains[1].next_nonce, None);
    }

    #[test]
    fn test_register_request_shape() {
        let request: RegisterSwapRequest = serde_json::from_value(serde_json::json!({
            "token": "DAI",
            "direction": 1,
            "hashX": format!("{:#x}", H256::repeat_byte(0xab)),
            "value": "0x3e8",
            "crossAddress": format!("{:#x}", Address::repeat_byte(0xcd)),
        }))
        .unwrap();

        assert_eq!(request.direction, Direction::Withdraw);
        assert_eq!(request.record.amount, U256::from(1000u64));
        assert_eq!(request.record.key, None);
    }

    #[test]
    fn test_error_status_mapping() {
        let timeout = ApiError(AgentError::Timeout {
            operation: "send".to_string(),
        });
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let missing = ApiError(AgentError::UnknownToken {
            token: "USDT".to_string(),
        });
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
