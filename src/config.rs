//! Configuration management for the swap agent
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::swap::ChainKind;

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub agent: AgentConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub wallet: WalletConfig,
    pub chains: ChainsConfig,
    pub tokens: HashMap<String, TokenConfig>,
    pub families: HashMap<String, FamilyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub instance_id: String,
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,
}

fn default_submit_timeout() -> u64 {
    30
}

fn default_health_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Environment variable holding the keystore password
    pub password_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainsConfig {
    pub origin: ChainConfig,
    pub companion: ChainConfig,
}

impl ChainsConfig {
    pub fn get(&self, chain: ChainKind) -> &ChainConfig {
        match chain {
            ChainKind::Origin => &self.origin,
            ChainKind::Companion => &self.companion,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub tx_format: TxFormat,
    /// Operator (storeman) account submitting on this chain
    pub operator: Address,
    pub keystore_path: PathBuf,
    pub gas_limit: u64,
    /// Decimal gas price, interpreted in `gas_price_unit`
    pub gas_price: String,
    #[serde(default)]
    pub gas_price_unit: GasPriceUnit,
    /// Block to start scanning from when nothing is stored yet
    #[serde(default)]
    pub start_block: u64,
}

/// Raw transaction layout expected by a chain family
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TxFormat {
    Ethereum,
    Wanchain,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceUnit {
    #[default]
    Wei,
    Gwei,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub address: Address,
    pub symbol: String,
    pub family: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FamilyConfig {
    pub origin: ContractConfig,
    pub companion: ContractConfig,
    pub deposit: FlowConfig,
    pub withdraw: FlowConfig,
    /// ERC20 ABI; the standard token interface when omitted
    #[serde(default)]
    pub erc20_abi: Option<AbiConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
    pub address: Address,
    #[serde(flatten)]
    pub abi: AbiConfig,
}

/// Either inline human-readable signatures or a JSON ABI file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AbiConfig {
    Inline { abi: Vec<String> },
    File { abi_path: PathBuf },
}

/// Function and event names of one flow, ordered (lock, refund, revoke)
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    pub functions: [String; 3],
    pub events: [String; 3],
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("SWAP_AGENT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        for chain in [&self.chains.origin, &self.chains.companion] {
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", chain.name);
            }
            if chain.gas_limit == 0 {
                anyhow::bail!("Chain {} has a zero gas limit", chain.name);
            }
        }

        for (id, token) in &self.tokens {
            if !self.families.contains_key(&token.family) {
                anyhow::bail!("Token {} refers to unknown swap family {}", id, token.family);
            }
        }

        if self.chains.origin.chain_id == self.chains.companion.chain_id {
            tracing::warn!(
                "Origin and companion chains share chain id {}",
                self.chains.origin.chain_id
            );
        }

        Ok(())
    }

    /// Operator accounts for both chains
    pub fn operators(&self) -> crate::swap::Operators {
        crate::swap::Operators {
            origin: self.chains.origin.operator,
            companion: self.chains.companion.operator,
        }
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = match regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
        Ok(re) => re,
        Err(_) => return result,
    };

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
