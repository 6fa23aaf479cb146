//! Swap state persistence
//!
//! Handles:
//! - Swap records keyed by hash commitment
//! - Action results (one tx-hash column per action)
//! - Last scanned block per chain

mod manager;

pub use manager::StateManager;

use crate::error::AgentResult;
use crate::swap::{ActionRecord, ChainKind, Direction, SwapRecord};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::H256;
use serde::Serialize;

/// A persisted swap with the actions submitted for it so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredSwap {
    pub token: String,
    pub direction: Direction,
    #[serde(flatten)]
    pub record: SwapRecord,
    pub actions: Vec<ActionRecord>,
    pub updated_at: DateTime<Utc>,
}

/// Persistence gateway for swap records and scan markers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwapStore: Send + Sync {
    /// Insert or refresh a swap record
    async fn save_swap(&self, token: &str, direction: Direction, record: &SwapRecord) -> AgentResult<()>;

    async fn get_swap(&self, hash_key: H256) -> AgentResult<Option<StoredSwap>>;

    /// Store the tx hash of a successful action against its swap
    async fn save_action_record(&self, hash_key: H256, record: &ActionRecord) -> AgentResult<()>;

    async fn save_scanned_block(&self, chain: ChainKind, block_number: u64) -> AgentResult<()>;

    /// Last scanned block, or `default` when nothing has been stored for `chain`
    async fn get_scanned_block(&self, chain: ChainKind, default: u64) -> AgentResult<u64>;

    /// Every stored swap of `token`, newest first
    async fn event_history(&self, token: &str) -> AgentResult<Vec<StoredSwap>>;

    async fn health_check(&self) -> AgentResult<()>;
}
