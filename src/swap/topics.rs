//! Event topic signatures for HTLC lock/refund/revoke events

use super::Direction;
use crate::contract::ContractInterface;
use crate::error::AgentResult;
use crate::registry::Triple;

use ethers::types::H256;
use serde::Serialize;

/// Kind of HTLC event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Lock,
    Refund,
    Revoke,
}

impl EventKind {
    /// Topic index carrying the hash commitment.
    ///
    /// Lock and refund events index two addresses before it, revoke only one.
    pub fn hash_key_position(&self) -> usize {
        match self {
            EventKind::Lock | EventKind::Refund => 3,
            EventKind::Revoke => 2,
        }
    }

    /// Topic filter `[signature, *, ..., hashKey]` for this event kind
    pub fn topic_filter(&self, signature: H256, hash_key: H256) -> Vec<Option<H256>> {
        let mut topics = vec![None; self.hash_key_position() + 1];
        topics[0] = Some(signature);
        topics[self.hash_key_position()] = Some(hash_key);
        topics
    }
}

/// Lock, refund and revoke signatures of one flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowTopics {
    pub lock: H256,
    pub refund: H256,
    pub revoke: H256,
}

impl FlowTopics {
    pub fn derive(contract: &ContractInterface, events: &Triple) -> AgentResult<Self> {
        Ok(Self {
            lock: contract.event_signature(&events.lock)?,
            refund: contract.event_signature(&events.refund)?,
            revoke: contract.event_signature(&events.revoke)?,
        })
    }

    pub fn get(&self, kind: EventKind) -> H256 {
        match kind {
            EventKind::Lock => self.lock,
            EventKind::Refund => self.refund,
            EventKind::Revoke => self.revoke,
        }
    }

    fn classify(&self, topic: &H256) -> Option<EventKind> {
        [EventKind::Lock, EventKind::Refund, EventKind::Revoke]
            .into_iter()
            .find(|kind| self.get(*kind) == *topic)
    }
}

/// All six signatures a watcher needs to classify events of either flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventTopics {
    pub deposit: FlowTopics,
    pub withdraw: FlowTopics,
}

impl EventTopics {
    pub fn flow(&self, direction: Direction) -> &FlowTopics {
        match direction {
            Direction::Deposit => &self.deposit,
            Direction::Withdraw => &self.withdraw,
        }
    }

    /// Classify an event by its first topic
    pub fn classify(&self, topic: &H256) -> Option<(Direction, EventKind)> {
        if let Some(kind) = self.deposit.classify(topic) {
            return Some((Direction::Deposit, kind));
        }
        self.withdraw
            .classify(topic)
            .map(|kind| (Direction::Withdraw, kind))
    }
}
