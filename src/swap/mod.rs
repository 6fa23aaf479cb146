//! Swap domain: directions, actions, swap records and the per-action agent
//!
//! A swap moves tokens between the origin chain (where the real ERC20 lives)
//! and the companion chain (where the wrapped token lives). Every action runs
//! through a freshly built [`SwapAgent`].

pub mod agent;
pub mod topics;

pub use agent::SwapAgent;
pub use topics::{EventKind, EventTopics, FlowTopics};

use crate::error::{AgentError, AgentResult};

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which of the two chains a transaction executes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    /// Chain holding the original token
    Origin,
    /// Chain holding the wrapped token
    Companion,
}

impl ChainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainKind::Origin => "origin",
            ChainKind::Companion => "companion",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Swap direction, which also names the logical flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Direction {
    /// 0: token -> wrapped token
    Deposit,
    /// 1: wrapped token -> token
    Withdraw,
}

impl TryFrom<u8> for Direction {
    type Error = AgentError;

    fn try_from(value: u8) -> AgentResult<Self> {
        match value {
            0 => Ok(Direction::Deposit),
            1 => Ok(Direction::Withdraw),
            other => Err(AgentError::Precondition(format!(
                "invalid swap direction {}",
                other
            ))),
        }
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> u8 {
        match direction {
            Direction::Deposit => 0,
            Direction::Withdraw => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Deposit => f.write_str("deposit"),
            Direction::Withdraw => f.write_str("withdraw"),
        }
    }
}

/// Business action requested for a swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Approve,
    Lock,
    Refund,
    Revoke,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Approve, Action::Lock, Action::Refund, Action::Revoke];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Lock => "lock",
            Action::Refund => "refund",
            Action::Revoke => "revoke",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AgentError;

    fn from_str(s: &str) -> AgentResult<Self> {
        match s {
            "approve" => Ok(Action::Approve),
            "lock" => Ok(Action::Lock),
            "refund" => Ok(Action::Refund),
            "revoke" => Ok(Action::Revoke),
            other => Err(AgentError::Precondition(format!("unknown action {}", other))),
        }
    }
}

/// Chain an action executes on.
///
/// Refund is performed by the counter-party on the chain opposite to the
/// original lock; every other action (or none) follows the direction alone.
pub fn resolve_chain(direction: Direction, action: Option<Action>) -> ChainKind {
    let refund = action == Some(Action::Refund);
    match (direction, refund) {
        (Direction::Deposit, true) => ChainKind::Origin,
        (Direction::Deposit, false) => ChainKind::Companion,
        (Direction::Withdraw, true) => ChainKind::Companion,
        (Direction::Withdraw, false) => ChainKind::Origin,
    }
}

/// Operator (storeman) accounts submitting on each chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operators {
    pub origin: Address,
    pub companion: Address,
}

impl Operators {
    pub fn on(&self, chain: ChainKind) -> Address {
        match chain {
            ChainKind::Origin => self.origin,
            ChainKind::Companion => self.companion,
        }
    }
}

/// One in-flight swap as known to the persistence gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRecord {
    /// Public hash commitment
    #[serde(rename = "hashX")]
    pub hash_key: H256,
    /// Secret preimage, known only once revealed
    #[serde(rename = "x", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<H256>,
    #[serde(rename = "value")]
    pub amount: U256,
    /// Counter-party address on the receiving chain
    #[serde(rename = "crossAddress")]
    pub cross_address: Address,
}

impl SwapRecord {
    pub fn new(hash_key: H256, amount: U256, cross_address: Address) -> Self {
        Self {
            hash_key,
            key: None,
            amount,
            cross_address,
        }
    }

    pub fn with_key(mut self, key: H256) -> Self {
        self.key = Some(key);
        self
    }
}

/// Persistence-ready result of a successful submission, keyed externally by hashKey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionRecord {
    #[serde(rename = "storemanApproveTxHash")]
    Approve(String),
    #[serde(rename = "storemanLockTxHash")]
    Lock(String),
    #[serde(rename = "storemanRefundTxHash")]
    Refund(String),
    #[serde(rename = "storemanRevokeTxHash")]
    Revoke(String),
}

impl ActionRecord {
    /// Tag a transaction id with the action that produced it, lower-casing the id
    pub fn new(action: Action, tx_id: &str) -> Self {
        let tx_hash = tx_id.to_lowercase();
        match action {
            Action::Approve => ActionRecord::Approve(tx_hash),
            Action::Lock => ActionRecord::Lock(tx_hash),
            Action::Refund => ActionRecord::Refund(tx_hash),
            Action::Revoke => ActionRecord::Revoke(tx_hash),
        }
    }

    pub fn action(&self) -> Action {
        match self {
            ActionRecord::Approve(_) => Action::Approve,
            ActionRecord::Lock(_) => Action::Lock,
            ActionRecord::Refund(_) => Action::Refund,
            ActionRecord::Revoke(_) => Action::Revoke,
        }
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            ActionRecord::Approve(h)
            | ActionRecord::Lock(h)
            | ActionRecord::Refund(h)
            | ActionRecord::Revoke(h) => h,
        }
    }

    /// Field name used by the persistence gateway
    pub fn field(&self) -> &'static str {
        match self {
            ActionRecord::Approve(_) => "storemanApproveTxHash",
            ActionRecord::Lock(_) => "storemanLockTxHash",
            ActionRecord::Refund(_) => "storemanRefundTxHash",
            ActionRecord::Revoke(_) => "storemanRevokeTxHash",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_chain_table() {
        use Action::*;
        use ChainKind::*;
        use Direction::*;

        let cases = [
            (Deposit, Approve, Companion),
            (Deposit, Lock, Companion),
            (Deposit, Refund, Origin),
            (Deposit, Revoke, Companion),
            (Withdraw, Approve, Origin),
            (Withdraw, Lock, Origin),
            (Withdraw, Refund, Companion),
            (Withdraw, Revoke, Origin),
        ];

        for (direction, action, expected) in cases {
            assert_eq!(
                resolve_chain(direction, Some(action)),
                expected,
                "direction {} action {}",
                direction,
                action
            );
        }
    }

    #[test]
    fn test_no_action_means_lock_side() {
        assert_eq!(resolve_chain(Direction::Deposit, None), ChainKind::Companion);
        assert_eq!(resolve_chain(Direction::Withdraw, None), ChainKind::Origin);
    }

    #[test]
    fn test_direction_from_wire_value() {
        assert_eq!(Direction::try_from(0).unwrap(), Direction::Deposit);
        assert_eq!(Direction::try_from(1).unwrap(), Direction::Withdraw);
        assert!(Direction::try_from(2).is_err());

        let parsed: Direction = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, Direction::Withdraw);
    }

    #[test]
    fn test_action_record_shape() {
        let expected = [
            (Action::Approve, "storemanApproveTxHash"),
            (Action::Lock, "storemanLockTxHash"),
            (Action::Refund, "storemanRefundTxHash"),
            (Action::Revoke, "storemanRevokeTxHash"),
        ];
        assert_eq!(expected.map(|(action, _)| action), Action::ALL);

        for (action, key) in expected {
            let record = ActionRecord::new(action, "0xABCDEF0123");
            let json = serde_json::to_value(&record).unwrap();
            assert_eq!(json, serde_json::json!({ key: "0xabcdef0123" }), "{}", action);
            assert_eq!(record.action(), action);
            assert_eq!(record.field(), key);
            assert_eq!(record.tx_hash(), "0xabcdef0123");

            let back: ActionRecord = serde_json::from_value(json).unwrap();
            assert_eq!(back, record);
        }
    }

    #[test]
    fn test_swap_record_uses_gateway_field_names() {
        let record = SwapRecord::new(H256::repeat_byte(0xab), U256::from(1000u64), Address::repeat_byte(0xcd));
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("hashX").is_some());
        assert!(json.get("crossAddress").is_some());
        assert!(json.get("x").is_none());

        let back: SwapRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_action_parsing() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("burn".parse::<Action>().is_err());
    }
}
