//! Chain module - connections to the origin and companion chains
//!
//! This module provides:
//! - The `ChainClient` seam the agent submits through
//! - Multi-RPC provider management with failover for read calls
//! - Per-chain handles bundling client, signer, gas policy and operator

pub mod provider;

pub use provider::ChainProvider;

use crate::config::Settings;
use crate::error::AgentResult;
use crate::swap::{ChainKind, Operators};
use crate::tx::{unlock_keystores, Credential, GasPolicy, KeystoreSigner, TransactionSigner};

use async_trait::async_trait;
use ethers::types::{Address, Bytes};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// RPC operations the agent needs from a chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Broadcast a signed transaction, returning its identifier
    async fn submit_raw_transaction(&self, raw: Bytes) -> AgentResult<String>;

    /// Pending transaction count of `address`
    async fn pending_nonce(&self, address: Address) -> AgentResult<u64>;

    /// Latest block number
    async fn block_number(&self) -> AgentResult<u64>;
}

/// Everything needed to get a transaction onto one chain
#[derive(Clone)]
pub struct ChainHandle {
    pub kind: ChainKind,
    pub name: String,
    /// Operator whose account sequence this chain's nonces track
    pub operator: Address,
    pub gas: GasPolicy,
    /// First block of interest for this chain's contracts
    pub start_block: u64,
    pub client: Arc<dyn ChainClient>,
    pub signer: Arc<dyn TransactionSigner>,
}

/// Manages the two chains a swap spans
pub struct ChainManager {
    origin: ChainHandle,
    companion: ChainHandle,
}

impl ChainManager {
    pub fn new(origin: ChainHandle, companion: ChainHandle) -> Self {
        Self { origin, companion }
    }

    /// Connect both configured chains, unlocking the operator keystores once
    pub async fn connect(settings: &Settings, credential: &Credential) -> AgentResult<Self> {
        // Either operator may sign on either chain (approve always uses the
        // origin operator), so both signers share every wallet.
        let keystores: HashMap<Address, _> = [&settings.chains.origin, &settings.chains.companion]
            .into_iter()
            .map(|c| (c.operator, c.keystore_path.clone()))
            .collect();
        let wallets = Arc::new(unlock_keystores(keystores, credential).await?);

        let mut handles = Vec::with_capacity(2);
        for kind in [ChainKind::Origin, ChainKind::Companion] {
            let config = settings.chains.get(kind);
            info!(
                "Initializing {} chain {} (ID: {})",
                kind, config.name, config.chain_id
            );

            let provider = ChainProvider::new(kind, config.clone()).await?;
            let signer = KeystoreSigner::new(config.chain_id, config.tx_format, wallets.clone());

            handles.push(ChainHandle {
                kind,
                name: config.name.clone(),
                operator: config.operator,
                gas: GasPolicy::from_config(config)?,
                start_block: config.start_block,
                client: Arc::new(provider),
                signer: Arc::new(signer),
            });
        }

        let companion = handles.pop();
        let origin = handles.pop();
        match (origin, companion) {
            (Some(origin), Some(companion)) => Ok(Self::new(origin, companion)),
            _ => Err(crate::error::AgentError::Internal(
                "chain handles not initialized".to_string(),
            )),
        }
    }

    /// Get the handle for a chain
    pub fn get(&self, kind: ChainKind) -> &ChainHandle {
        match kind {
            ChainKind::Origin => &self.origin,
            ChainKind::Companion => &self.companion,
        }
    }

    pub fn operators(&self) -> Operators {
        Operators {
            origin: self.origin.operator,
            companion: self.companion.operator,
        }
    }

    /// Health check for both chains
    pub async fn health_check(&self) -> Vec<(ChainKind, bool)> {
        let mut results = Vec::with_capacity(2);

        for handle in [&self.origin, &self.companion] {
            let healthy = handle.client.block_number().await.is_ok();
            crate::metrics::record_chain_health(handle.kind, healthy);
            results.push((handle.kind, healthy));
        }

        results
    }
}
