//! Chain provider with multi-RPC support and failover for read calls

use super::ChainClient;
use crate::config::ChainConfig;
use crate::error::{AgentError, AgentResult};
use crate::swap::ChainKind;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Multi-provider wrapper with failover
pub struct ChainProvider {
    kind: ChainKind,
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub async fn new(kind: ChainKind, config: ChainConfig) -> AgentResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for {} chain: {}", kind, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(AgentError::ChainConnection {
                chain: kind,
                message: "No valid RPC providers".to_string(),
            });
        }

        info!(
            "{} chain {} ready with {} RPC endpoint(s)",
            kind,
            config.name,
            http_providers.len()
        );

        Ok(Self {
            kind,
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("{} chain {} failover to provider {}", self.kind, self.config.name, next);
    }

    fn connection_error(&self, message: impl Into<String>) -> AgentError {
        AgentError::ChainConnection {
            chain: self.kind,
            message: message.into(),
        }
    }
}

#[async_trait]
impl ChainClient for ChainProvider {
    async fn submit_raw_transaction(&self, raw: Bytes) -> AgentResult<String> {
        // No failover here: a second endpoint could see the same nonce twice.
        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| AgentError::Submission {
                chain: self.kind,
                message: e.to_string(),
            })?;

        Ok(format!("{:#x}", pending.tx_hash()))
    }

    async fn pending_nonce(&self, address: Address) -> AgentResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self
                .http()
                .get_transaction_count(address, Some(BlockNumber::Pending.into()))
                .await
            {
                Ok(count) => {
                    return u64::try_from(count).map_err(|e| AgentError::Nonce {
                        chain: self.kind,
                        message: format!("pending nonce {} out of range: {}", count, e),
                    });
                }
                Err(e) => {
                    warn!("Failed to get pending nonce from {} chain: {}", self.kind, e);
                    self.failover();
                }
            }
        }

        Err(AgentError::Nonce {
            chain: self.kind,
            message: "All providers failed to report a pending nonce".to_string(),
        })
    }

    async fn block_number(&self) -> AgentResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!("Failed to get block number from {} chain: {}", self.kind, e);
                    self.failover();
                }
            }
        }

        Err(self.connection_error("All providers failed"))
    }
}
