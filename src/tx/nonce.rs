//! Per-chain nonce sequencing
//!
//! One sequence per chain, shared by every agent in the process:
//! - Lazily seeded from the chain's pending nonce on first use
//! - Leases hold the chain's lock from allocation until the transaction is
//!   submitted, so broadcast order always equals allocation order
//! - An uninitialized sequence is `None`, never zero

use crate::chain::ChainClient;
use crate::error::AgentResult;
use crate::swap::ChainKind;

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Per-chain sequence state
#[derive(Debug, Default)]
struct ChainSequence {
    /// Next nonce to hand out; `None` until seeded from the chain
    next: Option<u64>,
}

/// Hands out gap-free nonces per chain
#[derive(Default)]
pub struct NonceSequencer {
    chains: DashMap<ChainKind, Arc<Mutex<ChainSequence>>>,
}

impl NonceSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    fn sequence(&self, chain: ChainKind) -> Arc<Mutex<ChainSequence>> {
        self.chains
            .entry(chain)
            .or_insert_with(|| Arc::new(Mutex::new(ChainSequence::default())))
            .clone()
    }

    /// Reserve the next nonce for `chain`.
    ///
    /// The returned lease keeps the chain locked: no other allocation on the
    /// same chain can proceed until it is committed, released or invalidated.
    pub async fn lease(
        &self,
        chain: ChainKind,
        client: &dyn ChainClient,
        account: Address,
    ) -> AgentResult<NonceLease> {
        let mut guard = self.sequence(chain).lock_owned().await;

        let nonce = match guard.next {
            Some(next) => next,
            None => {
                let seeded = client.pending_nonce(account).await?;
                info!("Seeded {} chain nonce sequence at {} for {:?}", chain, seeded, account);
                guard.next = Some(seeded);
                seeded
            }
        };

        debug!("Leased nonce {} on {} chain", nonce, chain);
        Ok(NonceLease { chain, nonce, guard })
    }

    /// Allocate and immediately consume the next nonce for `chain`
    pub async fn next_nonce(
        &self,
        chain: ChainKind,
        client: &dyn ChainClient,
        account: Address,
    ) -> AgentResult<u64> {
        let lease = self.lease(chain, client, account).await?;
        Ok(lease.commit())
    }

    /// Next nonce that would be handed out, if the chain has been seeded
    pub async fn peek(&self, chain: ChainKind) -> Option<u64> {
        let seq = self.chains.get(&chain).map(|s| s.value().clone())?;
        let guard = seq.lock().await;
        guard.next
    }
}

/// A reserved nonce holding its chain's sequence lock
#[must_use = "a lease must be committed, released or invalidated"]
pub struct NonceLease {
    chain: ChainKind,
    nonce: u64,
    guard: OwnedMutexGuard<ChainSequence>,
}

impl NonceLease {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn chain(&self) -> ChainKind {
        self.chain
    }

    /// The transaction was accepted; advance the sequence
    pub fn commit(mut self) -> u64 {
        self.guard.next = Some(self.nonce + 1);
        crate::metrics::record_nonce_allocated(self.chain, self.nonce);
        self.nonce
    }

    /// The transaction never left the process; the nonce is handed out again
    pub fn release(self) {
        debug!("Released unused nonce {} on {} chain", self.nonce, self.chain);
    }

    /// Broadcast state is unknown; re-seed from the chain on next use
    pub fn invalidate(mut self) {
        warn!(
            "Invalidated {} chain nonce sequence at {}; will re-seed from chain",
            self.chain, self.nonce
        );
        self.guard.next = None;
    }
}
