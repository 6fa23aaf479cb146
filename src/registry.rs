//! Configuration registry: swap tokens and the HTLC families they belong to

use crate::config::{FamilyConfig, FlowConfig, Settings, TokenConfig};
use crate::contract::{self, ContractInterface, ERC20_ABI};
use crate::error::{AgentError, AgentResult};
use crate::swap::{ChainKind, Direction};

use ethers::abi::Abi;
use ethers::types::Address;
use std::collections::HashMap;
use tracing::debug;

/// Static token metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapToken {
    pub id: String,
    pub address: Address,
    pub symbol: String,
    pub family: String,
}

/// Names of one flow's contract entry points or events, in (lock, refund, revoke) order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub lock: String,
    pub refund: String,
    pub revoke: String,
}

impl From<[String; 3]> for Triple {
    fn from([lock, refund, revoke]: [String; 3]) -> Self {
        Self { lock, refund, revoke }
    }
}

/// Function and event names for one logical flow
#[derive(Debug, Clone)]
pub struct Flow {
    pub functions: Triple,
    pub events: Triple,
}

impl From<&FlowConfig> for Flow {
    fn from(config: &FlowConfig) -> Self {
        Self {
            functions: config.functions.clone().into(),
            events: config.events.clone().into(),
        }
    }
}

/// HTLC deployments and flows shared by every token of a family
#[derive(Debug, Clone)]
pub struct SwapFamily {
    pub id: String,
    pub origin: ContractInterface,
    pub companion: ContractInterface,
    pub deposit: Flow,
    pub withdraw: Flow,
    pub erc20_abi: Abi,
}

impl SwapFamily {
    /// HTLC contract deployed on `chain`
    pub fn htlc(&self, chain: ChainKind) -> &ContractInterface {
        match chain {
            ChainKind::Origin => &self.origin,
            ChainKind::Companion => &self.companion,
        }
    }

    pub fn flow(&self, direction: Direction) -> &Flow {
        match direction {
            Direction::Deposit => &self.deposit,
            Direction::Withdraw => &self.withdraw,
        }
    }

    fn from_config(id: &str, config: &FamilyConfig) -> AgentResult<Self> {
        let erc20_abi = match &config.erc20_abi {
            Some(abi) => contract::load_abi(abi)?,
            None => contract::parse_human_readable(ERC20_ABI)?,
        };

        Ok(Self {
            id: id.to_string(),
            origin: ContractInterface::new(config.origin.address, contract::load_abi(&config.origin.abi)?),
            companion: ContractInterface::new(
                config.companion.address,
                contract::load_abi(&config.companion.abi)?,
            ),
            deposit: Flow::from(&config.deposit),
            withdraw: Flow::from(&config.withdraw),
            erc20_abi,
        })
    }
}

/// Immutable lookup of tokens and families, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tokens: HashMap<String, SwapToken>,
    families: HashMap<String, SwapFamily>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from settings, loading every ABI
    pub fn from_settings(settings: &Settings) -> AgentResult<Self> {
        let mut registry = Self::new();

        for (id, family) in &settings.families {
            registry.add_family(SwapFamily::from_config(id, family)?);
        }

        for (id, TokenConfig { address, symbol, family }) in &settings.tokens {
            registry.add_token(SwapToken {
                id: id.clone(),
                address: *address,
                symbol: symbol.clone(),
                family: family.clone(),
            });
        }

        debug!(
            "Registry loaded {} tokens across {} families",
            registry.tokens.len(),
            registry.families.len()
        );
        Ok(registry)
    }

    pub fn add_token(&mut self, token: SwapToken) {
        self.tokens.insert(token.id.clone(), token);
    }

    pub fn add_family(&mut self, family: SwapFamily) {
        self.families.insert(family.id.clone(), family);
    }

    pub fn lookup_token(&self, id: &str) -> AgentResult<&SwapToken> {
        self.tokens
            .get(id)
            .ok_or_else(|| AgentError::UnknownToken { token: id.to_string() })
    }

    pub fn lookup_family(&self, token: &SwapToken) -> AgentResult<&SwapFamily> {
        self.families
            .get(&token.family)
            .ok_or_else(|| AgentError::UnknownFamily {
                token: token.id.clone(),
                family: token.family.clone(),
            })
    }
}
