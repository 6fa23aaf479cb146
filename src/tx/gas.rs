//! Configured gas policy per chain

use crate::config::{ChainConfig, GasPriceUnit};
use crate::error::{AgentError, AgentResult};

use ethers::types::U256;
use ethers::utils::parse_units;

/// Fixed gas limit and price used for every transaction on a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    pub gas_limit: U256,
    /// Price in the chain's smallest unit
    pub gas_price: U256,
}

impl GasPolicy {
    pub fn new(gas_limit: u64, gas_price: U256) -> Self {
        Self {
            gas_limit: U256::from(gas_limit),
            gas_price,
        }
    }

    pub fn from_config(config: &ChainConfig) -> AgentResult<Self> {
        let gas_price = to_wei(&config.gas_price, config.gas_price_unit)
            .map_err(|e| AgentError::Config(format!("Invalid gas price for {}: {}", config.name, e)))?;

        Ok(Self::new(config.gas_limit, gas_price))
    }
}

fn to_wei(amount: &str, unit: GasPriceUnit) -> Result<U256, ethers::utils::ConversionError> {
    let units = match unit {
        GasPriceUnit::Wei => "wei",
        GasPriceUnit::Gwei => "gwei",
    };
    Ok(parse_units(amount, units)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gwei_price_is_converted() {
        assert_eq!(to_wei("180", GasPriceUnit::Gwei).unwrap(), U256::from(180_000_000_000u64));
        assert_eq!(to_wei("1.5", GasPriceUnit::Gwei).unwrap(), U256::from(1_500_000_000u64));
    }

    #[test]
    fn test_wei_price_is_taken_as_is() {
        assert_eq!(to_wei("60000000000", GasPriceUnit::Wei).unwrap(), U256::from(60_000_000_000u64));
        assert!(to_wei("sixty", GasPriceUnit::Wei).is_err());
    }
}
