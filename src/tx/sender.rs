//! Transaction sender: nonce lease, signing and submission as one step
//!
//! The per-chain nonce lease is held across signing and broadcast, so two
//! concurrent sends on the same chain never share a nonce and are broadcast
//! in allocation order.

use super::nonce::NonceSequencer;
use super::signer::TransactionDescriptor;
use crate::chain::ChainManager;
use crate::error::{AgentError, AgentResult};
use crate::swap::{ChainKind, Operators};

use ethers::types::{Address, Bytes, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// What the caller wants on chain; gas and nonce are filled in by the sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    pub chain: ChainKind,
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

/// Submits drafts to their chain
pub struct TransactionSender {
    /// Chain handles
    chains: Arc<ChainManager>,
    /// Shared per-chain nonce sequences
    nonces: Arc<NonceSequencer>,
    /// Upper bound on one broadcast round trip
    submit_timeout: Duration,
}

impl TransactionSender {
    pub fn new(
        chains: Arc<ChainManager>,
        nonces: Arc<NonceSequencer>,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            chains,
            nonces,
            submit_timeout,
        }
    }

    pub fn operators(&self) -> Operators {
        self.chains.operators()
    }

    pub fn chains(&self) -> &ChainManager {
        &self.chains
    }

    pub fn nonces(&self) -> &NonceSequencer {
        &self.nonces
    }

    /// Sign and broadcast a draft, returning the chain's transaction id.
    ///
    /// Nonce handling on failure:
    /// - signing failed: the nonce is released and handed out again
    /// - broadcast failed or timed out: the sequence re-seeds from the chain
    pub async fn send(&self, draft: TransactionDraft) -> AgentResult<String> {
        let handle = self.chains.get(draft.chain);

        let lease = self
            .nonces
            .lease(draft.chain, handle.client.as_ref(), handle.operator)
            .await?;

        let descriptor = TransactionDescriptor {
            from: draft.from,
            to: draft.to,
            gas_limit: handle.gas.gas_limit,
            gas_price: handle.gas.gas_price,
            nonce: lease.nonce(),
            value: U256::zero(),
            data: draft.data,
        };

        info!(
            "Sending on {} chain: from {:?} to {:?} gas {} gas price {} nonce {}",
            draft.chain,
            descriptor.from,
            descriptor.to,
            descriptor.gas_limit,
            descriptor.gas_price,
            descriptor.nonce
        );

        let raw = match handle.signer.sign(&descriptor).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to sign transaction on {} chain: {}", draft.chain, e);
                lease.release();
                return Err(e);
            }
        };

        let result = timeout(self.submit_timeout, handle.client.submit_raw_transaction(raw)).await;

        match result {
            Ok(Ok(tx_id)) => {
                let nonce = lease.commit();
                info!("Transaction sent on {} chain: {} (nonce {})", draft.chain, tx_id, nonce);
                Ok(tx_id)
            }
            Ok(Err(e)) => {
                warn!("Transaction rejected on {} chain: {}", draft.chain, e);
                lease.invalidate();
                Err(e)
            }
            Err(_) => {
                warn!(
                    "Transaction send timeout on {} chain after {:?}",
                    draft.chain, self.submit_timeout
                );
                lease.invalidate();
                Err(AgentError::Timeout {
                    operation: format!("send transaction on {} chain", draft.chain),
                })
            }
        }
    }
}
