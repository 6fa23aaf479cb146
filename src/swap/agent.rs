//! The per-action swap agent
//!
//! An agent is built for exactly one (token, direction, action, record) and
//! fixes at construction the chain the action runs on, the HTLC contract it
//! talks to, the active flow's function and event names, and the six event
//! topics a watcher needs. It is then either queried for call-data and topic
//! filters or executed once.

use super::topics::{EventKind, EventTopics, FlowTopics};
use super::{resolve_chain, Action, ActionRecord, ChainKind, Direction, Operators, SwapRecord};
use crate::contract::ContractInterface;
use crate::error::{AgentError, AgentResult};
use crate::registry::{Registry, SwapToken, Triple};
use crate::tx::{TransactionDraft, TransactionSender};

use ethers::abi::Token;
use ethers::types::{Address, Bytes, Filter, H256};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Execution plan for one action on one swap
#[derive(Debug, Clone)]
pub struct SwapAgent {
    token: SwapToken,
    direction: Direction,
    action: Option<Action>,
    record: SwapRecord,
    /// Chain this action executes on
    chain: ChainKind,
    /// HTLC contract on `chain`
    htlc: ContractInterface,
    /// ERC20 contract of the token, for approvals
    token_contract: ContractInterface,
    /// Active flow's (lock, refund, revoke) function names
    functions: Triple,
    /// Active flow's topics, taken from the HTLC contract on `chain`
    active_topics: FlowTopics,
    topics: EventTopics,
}

impl SwapAgent {
    /// Resolve everything the action needs. Configuration problems abort here.
    pub fn new(
        registry: &Registry,
        token_id: &str,
        direction: Direction,
        action: Option<Action>,
        record: SwapRecord,
    ) -> AgentResult<Self> {
        let token = registry.lookup_token(token_id)?.clone();
        let family = registry.lookup_family(&token)?;

        let chain = resolve_chain(direction, action);
        let htlc = family.htlc(chain).clone();
        let token_contract = ContractInterface::new(token.address, family.erc20_abi.clone());

        let topics = EventTopics {
            deposit: FlowTopics::derive(&htlc, &family.deposit.events)?,
            withdraw: FlowTopics::derive(&htlc, &family.withdraw.events)?,
        };
        let active_topics = *topics.flow(direction);
        let functions = family.flow(direction).functions.clone();

        debug!(
            "Agent for {} {} {:?}: {} chain, HTLC {:?}, hashX {:#x}",
            token.symbol,
            direction,
            action,
            chain,
            htlc.address(),
            record.hash_key
        );

        Ok(Self {
            token,
            direction,
            action,
            record,
            chain,
            htlc,
            token_contract,
            functions,
            active_topics,
            topics,
        })
    }

    pub fn chain(&self) -> ChainKind {
        self.chain
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn action(&self) -> Option<Action> {
        self.action
    }

    pub fn token(&self) -> &SwapToken {
        &self.token
    }

    pub fn record(&self) -> &SwapRecord {
        &self.record
    }

    pub fn hash_key(&self) -> H256 {
        self.record.hash_key
    }

    /// Address of the HTLC contract on the resolved chain
    pub fn contract_address(&self) -> Address {
        self.htlc.address()
    }

    /// Signatures of both flows
    pub fn topics(&self) -> &EventTopics {
        &self.topics
    }

    /// Signatures of this swap's flow
    pub fn active_topics(&self) -> &FlowTopics {
        &self.active_topics
    }

    pub fn lock_topics(&self) -> Vec<Option<H256>> {
        self.topic_filter(EventKind::Lock)
    }

    pub fn refund_topics(&self) -> Vec<Option<H256>> {
        self.topic_filter(EventKind::Refund)
    }

    pub fn revoke_topics(&self) -> Vec<Option<H256>> {
        self.topic_filter(EventKind::Revoke)
    }

    fn topic_filter(&self, kind: EventKind) -> Vec<Option<H256>> {
        kind.topic_filter(self.active_topics.get(kind), self.record.hash_key)
    }

    /// Log filter for `kind` events of this swap on the resolved HTLC contract
    pub fn event_filter(&self, kind: EventKind) -> Filter {
        let filter = Filter::new()
            .address(self.htlc.address())
            .topic0(self.active_topics.get(kind));

        match kind {
            EventKind::Lock | EventKind::Refund => filter.topic3(self.record.hash_key),
            EventKind::Revoke => filter.topic2(self.record.hash_key),
        }
    }

    /// `approve(htlc, amount)` on the token contract
    pub fn approve_data(&self) -> AgentResult<Bytes> {
        self.token_contract.encode_call(
            "approve",
            &[Token::Address(self.htlc.address()), Token::Uint(self.record.amount)],
        )
    }

    /// `lock(token, hashKey, counterparty, amount)` on the HTLC contract
    pub fn lock_data(&self) -> AgentResult<Bytes> {
        debug!(
            "lock data: {} chain, {} flow, token {:?}, hashX {:#x}, cross {:?}, amount {}",
            self.chain,
            self.direction,
            self.token.address,
            self.record.hash_key,
            self.record.cross_address,
            self.record.amount
        );
        self.htlc.encode_call(
            &self.functions.lock,
            &[
                Token::Address(self.token.address),
                Token::FixedBytes(self.record.hash_key.as_bytes().to_vec()),
                Token::Address(self.record.cross_address),
                Token::Uint(self.record.amount),
            ],
        )
    }

    /// `refund(token, key)`; the preimage must be known
    pub fn refund_data(&self) -> AgentResult<Bytes> {
        let key = self.record.key.ok_or_else(|| {
            AgentError::Precondition(format!(
                "refund of {:#x} requested without a known preimage",
                self.record.hash_key
            ))
        })?;

        self.htlc.encode_call(
            &self.functions.refund,
            &[
                Token::Address(self.token.address),
                Token::FixedBytes(key.as_bytes().to_vec()),
            ],
        )
    }

    /// `revoke(token, hashKey)`
    pub fn revoke_data(&self) -> AgentResult<Bytes> {
        self.htlc.encode_call(
            &self.functions.revoke,
            &[
                Token::Address(self.token.address),
                Token::FixedBytes(self.record.hash_key.as_bytes().to_vec()),
            ],
        )
    }

    pub fn call_data(&self, action: Action) -> AgentResult<Bytes> {
        match action {
            Action::Approve => self.approve_data(),
            Action::Lock => self.lock_data(),
            Action::Refund => self.refund_data(),
            Action::Revoke => self.revoke_data(),
        }
    }

    /// Operator account that signs `action`
    pub fn sender_for(&self, action: Action, operators: &Operators) -> Address {
        match (action, self.direction) {
            (Action::Approve, _) => operators.origin,
            (Action::Refund, Direction::Deposit) => operators.origin,
            (Action::Refund, Direction::Withdraw) => operators.companion,
            (Action::Lock | Action::Revoke, Direction::Deposit) => operators.companion,
            (Action::Lock | Action::Revoke, Direction::Withdraw) => operators.origin,
        }
    }

    /// Token contract for approvals, the HTLC contract otherwise
    pub fn recipient_for(&self, action: Action) -> Address {
        match action {
            Action::Approve => self.token.address,
            _ => self.htlc.address(),
        }
    }

    fn requested_action(&self) -> AgentResult<Action> {
        self.action.ok_or_else(|| {
            AgentError::Precondition("agent was built without an action to execute".to_string())
        })
    }

    /// Transaction this agent would send, without gas or nonce
    pub fn draft(&self, operators: &Operators) -> AgentResult<TransactionDraft> {
        let action = self.requested_action()?;
        let data = self.call_data(action)?;

        // A deposit approve is sent on the companion chain by the origin
        // operator. Its nonce still comes from the companion chain's sequence,
        // which tracks the companion operator, so committing it leaves a gap in
        // that account until the sequence is re-seeded after a failed submit.
        if action == Action::Approve && self.chain != ChainKind::Origin {
            warn!(
                "approve of {:#x} resolves to the {} chain; tokens are approved on the origin chain \
                 and this nonce is taken from the {} operator's sequence",
                self.record.hash_key, self.chain, self.chain
            );
        }

        Ok(TransactionDraft {
            chain: self.chain,
            from: self.sender_for(action, operators),
            to: self.recipient_for(action),
            data,
        })
    }

    /// Sign and submit the action, returning the record to persist.
    ///
    /// Nothing is persisted here and nothing is retried.
    pub async fn execute(&self, sender: &TransactionSender) -> AgentResult<ActionRecord> {
        let action = self.requested_action()?;
        let started = Instant::now();

        let result = match self.draft(&sender.operators()) {
            Ok(draft) => sender.send(draft).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(tx_id) => {
                crate::metrics::record_action_submitted(self.chain, action);
                crate::metrics::record_submit_latency(self.chain, started.elapsed().as_secs_f64());

                let record = ActionRecord::new(action, &tx_id);
                info!(
                    "{} for {:#x} submitted on {} chain: {}",
                    action,
                    self.record.hash_key,
                    self.chain,
                    record.tx_hash()
                );
                Ok(record)
            }
            Err(e) => {
                crate::metrics::record_action_failed(self.chain, action);
                error!(
                    "{} for {:#x} failed on {} chain: {}",
                    action, self.record.hash_key, self.chain, e
                );
                Err(e)
            }
        }
    }
}
