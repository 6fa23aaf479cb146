//! Contract interface: call-data encoding and event signatures over an ABI

use crate::config::AbiConfig;
use crate::error::{AgentError, AgentResult};

use ethers::abi::{Abi, Token};
use ethers::types::{Address, Bytes, H256};
use std::path::Path;

/// Human-readable ERC20 interface used when a family does not supply one
pub const ERC20_ABI: &[&str] = &[
    "function approve(address spender, uint256 amount) returns (bool)",
    "function allowance(address owner, address spender) view returns (uint256)",
    "function balanceOf(address account) view returns (uint256)",
    "function transfer(address to, uint256 amount) returns (bool)",
    "event Approval(address indexed owner, address indexed spender, uint256 value)",
    "event Transfer(address indexed from, address indexed to, uint256 value)",
];

/// A deployed contract: address plus the ABI used to talk to it
#[derive(Debug, Clone)]
pub struct ContractInterface {
    address: Address,
    abi: Abi,
}

impl ContractInterface {
    pub fn new(address: Address, abi: Abi) -> Self {
        Self { address, abi }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// Encode a call to `function` with positional arguments
    pub fn encode_call(&self, function: &str, args: &[Token]) -> AgentResult<Bytes> {
        let func = self.abi.function(function).map_err(|e| {
            AgentError::Encoding(format!("function {} not in ABI of {:?}: {}", function, self.address, e))
        })?;

        func.encode_input(args)
            .map(Bytes::from)
            .map_err(|e| AgentError::Encoding(format!("{}({}): {}", function, args.len(), e)))
    }

    /// Decode call-data produced for `function` back into its arguments
    pub fn decode_call(&self, function: &str, data: &[u8]) -> AgentResult<Vec<Token>> {
        let func = self
            .abi
            .function(function)
            .map_err(|e| AgentError::Encoding(e.to_string()))?;

        if data.len() < 4 || data[..4] != func.short_signature() {
            return Err(AgentError::Encoding(format!(
                "call-data does not start with the {} selector",
                function
            )));
        }

        func.decode_input(&data[4..])
            .map_err(|e| AgentError::Encoding(e.to_string()))
    }

    /// Canonical topic of a named event
    pub fn event_signature(&self, event: &str) -> AgentResult<H256> {
        self.abi
            .event(event)
            .map(|e| e.signature())
            .map_err(|e| AgentError::Config(format!("event {} not in ABI of {:?}: {}", event, self.address, e)))
    }
}

/// Load an ABI from inline human-readable signatures or a JSON file
pub fn load_abi(config: &AbiConfig) -> AgentResult<Abi> {
    match config {
        AbiConfig::Inline { abi } => {
            let sigs: Vec<&str> = abi.iter().map(String::as_str).collect();
            parse_human_readable(&sigs)
        }
        AbiConfig::File { abi_path } => load_abi_file(abi_path),
    }
}

pub fn parse_human_readable(signatures: &[&str]) -> AgentResult<Abi> {
    ethers::abi::parse_abi(signatures).map_err(|e| AgentError::Config(format!("Invalid ABI: {}", e)))
}

fn load_abi_file(path: &Path) -> AgentResult<Abi> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AgentError::Config(format!("Failed to read ABI {:?}: {}", path, e)))?;

    serde_json::from_str(&raw).map_err(|e| AgentError::Config(format!("Invalid ABI {:?}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use std::io::Write;

    fn erc20() -> ContractInterface {
        ContractInterface::new(
            Address::repeat_byte(0x33),
            parse_human_readable(ERC20_ABI).unwrap(),
        )
    }

    #[test]
    fn test_approve_round_trip() {
        let token = erc20();
        let spender = Address::repeat_byte(0x44);
        let amount = U256::from(1_000u64);

        let data = token
            .encode_call("approve", &[Token::Address(spender), Token::Uint(amount)])
            .unwrap();

        // approve(address,uint256)
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);

        let decoded = token.decode_call("approve", &data).unwrap();
        assert_eq!(decoded, vec![Token::Address(spender), Token::Uint(amount)]);
    }

    #[test]
    fn test_unknown_function_is_encoding_error() {
        let err = erc20().encode_call("mint", &[]).unwrap_err();
        assert!(matches!(err, AgentError::Encoding(_)));
    }

    #[test]
    fn test_argument_mismatch_is_encoding_error() {
        let err = erc20()
            .encode_call("approve", &[Token::Uint(U256::one())])
            .unwrap_err();
        assert!(matches!(err, AgentError::Encoding(_)));
    }

    #[test]
    fn test_event_signature_matches_keccak() {
        let sig = erc20().event_signature("Transfer").unwrap();
        assert_eq!(
            sig,
            H256::from(ethers::utils::keccak256("Transfer(address,address,uint256)"))
        );
        assert!(erc20().event_signature("Burn").is_err());
    }

    #[test]
    fn test_load_abi_file() {
        let json = r#"[{
            "type": "function",
            "name": "approve",
            "stateMutability": "nonpayable",
            "inputs": [
                {"name": "spender", "type": "address"},
                {"name": "amount", "type": "uint256"}
            ],
            "outputs": [{"name": "", "type": "bool"}]
        }]"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = load_abi(&AbiConfig::File {
            abi_path: file.path().to_path_buf(),
        })
        .unwrap();
        assert!(loaded.function("approve").is_ok());
    }
}
