//! HTLC event classification
//!
//! Lock, refund and revoke logs of both flows are recognised by their first
//! topic and carry the swap's hash commitment in an indexed topic.

use crate::error::{AgentError, AgentResult};
use crate::swap::{Direction, EventKind, EventTopics};

use ethers::types::{Address, Log, H256};
use serde::Serialize;

/// One observed HTLC event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapEvent {
    pub direction: Direction,
    pub kind: EventKind,
    #[serde(rename = "hashX")]
    pub hash_key: H256,
    pub contract: Address,
    pub block_number: u64,
    pub tx_hash: H256,
}

impl SwapEvent {
    /// Classify `log` against the six known signatures.
    ///
    /// Logs from other events yield `Ok(None)`. A known signature without the
    /// hash topic is malformed.
    pub fn from_log(log: &Log, topics: &EventTopics) -> AgentResult<Option<Self>> {
        let Some(signature) = log.topics.first() else {
            return Ok(None);
        };
        let Some((direction, kind)) = topics.classify(signature) else {
            return Ok(None);
        };

        let hash_key = log
            .topics
            .get(kind.hash_key_position())
            .copied()
            .ok_or_else(|| {
                AgentError::EventParsing(format!(
                    "{} {:?} log in tx {:?} has {} topics",
                    direction,
                    kind,
                    log.transaction_hash,
                    log.topics.len()
                ))
            })?;

        Ok(Some(Self {
            direction,
            kind,
            hash_key,
            contract: log.address,
            block_number: log.block_number.map(|b| b.as_u64()).unwrap_or(0),
            tx_hash: log.transaction_hash.unwrap_or_default(),
        }))
    }

    /// Metric label
    pub fn name(&self) -> &'static str {
        match (self.direction, self.kind) {
            (Direction::Deposit, EventKind::Lock) => "deposit_lock",
            (Direction::Deposit, EventKind::Refund) => "deposit_refund",
            (Direction::Deposit, EventKind::Revoke) => "deposit_revoke",
            (Direction::Withdraw, EventKind::Lock) => "withdraw_lock",
            (Direction::Withdraw, EventKind::Refund) => "withdraw_refund",
            (Direction::Withdraw, EventKind::Revoke) => "withdraw_revoke",
        }
    }
}

/// Classify a batch of logs, skipping unrelated ones
pub fn classify_logs(logs: &[Log], topics: &EventTopics) -> AgentResult<Vec<SwapEvent>> {
    let mut events = Vec::new();
    for log in logs {
        if let Some(event) = SwapEvent::from_log(log, topics)? {
            crate::metrics::record_event(&event);
            events.push(event);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::FlowTopics;
    use ethers::types::U64;

    fn topics() -> EventTopics {
        EventTopics {
            deposit: FlowTopics {
                lock: H256::repeat_byte(1),
                refund: H256::repeat_byte(2),
                revoke: H256::repeat_byte(3),
            },
            withdraw: FlowTopics {
                lock: H256::repeat_byte(4),
                refund: H256::repeat_byte(5),
                revoke: H256::repeat_byte(6),
            },
        }
    }

    fn log(topics: Vec<H256>) -> Log {
        Log {
            address: Address::repeat_byte(0x55),
            topics,
            block_number: Some(U64::from(1_654_300u64)),
            transaction_hash: Some(H256::repeat_byte(0xee)),
            ..Default::default()
        }
    }

    #[test]
    fn test_lock_hash_key_from_fourth_topic() {
        let hash_key = H256::repeat_byte(0xab);
        let log = log(vec![
            H256::repeat_byte(1),
            H256::repeat_byte(0x0c),
            H256::repeat_byte(0x0d),
            hash_key,
        ]);

        let event = SwapEvent::from_log(&log, &topics()).unwrap().unwrap();
        assert_eq!(event.direction, Direction::Deposit);
        assert_eq!(event.kind, EventKind::Lock);
        assert_eq!(event.hash_key, hash_key);
        assert_eq!(event.block_number, 1_654_300);
        assert_eq!(event.name(), "deposit_lock");
    }

    #[test]
    fn test_revoke_hash_key_from_third_topic() {
        let hash_key = H256::repeat_byte(0xab);
        let log = log(vec![H256::repeat_byte(6), H256::repeat_byte(0x0c), hash_key]);

        let event = SwapEvent::from_log(&log, &topics()).unwrap().unwrap();
        assert_eq!(event.direction, Direction::Withdraw);
        assert_eq!(event.kind, EventKind::Revoke);
        assert_eq!(event.hash_key, hash_key);
    }

    #[test]
    fn test_unrelated_logs_are_skipped() {
        let unrelated = log(vec![H256::repeat_byte(9)]);
        assert_eq!(SwapEvent::from_log(&unrelated, &topics()).unwrap(), None);
        assert_eq!(SwapEvent::from_log(&log(vec![]), &topics()).unwrap(), None);
    }

    #[test]
    fn test_missing_hash_topic_is_an_error() {
        let truncated = log(vec![H256::repeat_byte(2), H256::repeat_byte(0x0c)]);
        let err = SwapEvent::from_log(&truncated, &topics()).unwrap_err();
        assert!(matches!(err, AgentError::EventParsing(_)));
    }

    #[test]
    fn test_classify_batch() {
        let logs = vec![
            log(vec![H256::repeat_byte(9)]),
            log(vec![H256::repeat_byte(3), H256::zero(), H256::repeat_byte(0xab)]),
            log(vec![
                H256::repeat_byte(5),
                H256::zero(),
                H256::zero(),
                H256::repeat_byte(0xcd),
            ]),
        ];

        let events = classify_logs(&logs, &topics()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "deposit_revoke");
        assert_eq!(events[1].hash_key, H256::repeat_byte(0xcd));
    }
}
