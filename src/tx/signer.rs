//! Raw transaction construction and signing
//!
//! Two layouts are supported:
//! - Ethereum: legacy EIP-155 transaction
//! - Wanchain: legacy layout prefixed with a `Txtype` field, EIP-155 protected

use crate::config::TxFormat;
use crate::error::{AgentError, AgentResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Signature, TransactionRequest, H256, U256};
use ethers::utils::{keccak256, rlp::RlpStream};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// `Txtype` of a normal Wanchain transaction
pub const WANCHAIN_NORMAL_TX: u64 = 1;

/// Fully resolved, unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDescriptor {
    pub from: Address,
    pub to: Address,
    pub gas_limit: U256,
    pub gas_price: U256,
    pub nonce: u64,
    pub value: U256,
    pub data: Bytes,
}

/// Secret that unlocks an operator's signing key
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Signs transaction descriptors for one chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, tx: &TransactionDescriptor) -> AgentResult<Bytes>;
}

/// Decrypt every operator keystore once.
///
/// Scrypt key derivation runs on the blocking pool, one keystore at a time.
pub async fn unlock_keystores(
    keystores: HashMap<Address, PathBuf>,
    credential: &Credential,
) -> AgentResult<HashMap<Address, LocalWallet>> {
    let mut wallets = HashMap::with_capacity(keystores.len());

    for (account, path) in keystores {
        let credential = credential.clone();
        let wallet = tokio::task::spawn_blocking(move || unlock_keystore(&path, account, &credential))
            .await
            .map_err(|e| AgentError::Internal(format!("Keystore unlock task failed: {}", e)))??;

        info!("Unlocked keystore for {:?}", account);
        wallets.insert(account, wallet);
    }

    Ok(wallets)
}

fn unlock_keystore(path: &Path, account: Address, credential: &Credential) -> AgentResult<LocalWallet> {
    let wallet = LocalWallet::decrypt_keystore(path, credential.expose())
        .map_err(|e| AgentError::Signing(format!("Failed to unlock {:?}: {}", path, e)))?;

    if wallet.address() != account {
        return Err(AgentError::Signing(format!(
            "Keystore {:?} holds {:?}, expected {:?}",
            path,
            wallet.address(),
            account
        )));
    }

    Ok(wallet)
}

/// Signs with operator wallets unlocked at startup
pub struct KeystoreSigner {
    chain_id: u64,
    format: TxFormat,
    wallets: Arc<HashMap<Address, LocalWallet>>,
}

impl KeystoreSigner {
    pub fn new(chain_id: u64, format: TxFormat, wallets: Arc<HashMap<Address, LocalWallet>>) -> Self {
        Self {
            chain_id,
            format,
            wallets,
        }
    }
}

#[async_trait]
impl TransactionSigner for KeystoreSigner {
    async fn sign(&self, tx: &TransactionDescriptor) -> AgentResult<Bytes> {
        let wallet = self
            .wallets
            .get(&tx.from)
            .ok_or_else(|| AgentError::Signing(format!("No unlocked wallet for {:?}", tx.from)))?;
        sign_with_wallet(wallet, self.format, self.chain_id, tx)
    }
}

/// Sign `tx` with an unlocked wallet in the given layout
pub fn sign_with_wallet(
    wallet: &LocalWallet,
    format: TxFormat,
    chain_id: u64,
    tx: &TransactionDescriptor,
) -> AgentResult<Bytes> {
    let raw = match format {
        TxFormat::Ethereum => sign_ethereum(wallet, chain_id, tx)?,
        TxFormat::Wanchain => sign_wanchain(wallet, chain_id, tx)?,
    };

    debug!(
        "Signed {:?} transaction from {:?} nonce {} ({} bytes)",
        format,
        tx.from,
        tx.nonce,
        raw.len()
    );
    Ok(raw)
}

fn sign_ethereum(wallet: &LocalWallet, chain_id: u64, tx: &TransactionDescriptor) -> AgentResult<Bytes> {
    let request = TransactionRequest::new()
        .from(tx.from)
        .to(tx.to)
        .gas(tx.gas_limit)
        .gas_price(tx.gas_price)
        .nonce(tx.nonce)
        .value(tx.value)
        .data(tx.data.clone())
        .chain_id(chain_id);
    let typed = TypedTransaction::Legacy(request);

    let signature = wallet
        .sign_transaction_sync(&typed)
        .map_err(|e| AgentError::Signing(e.to_string()))?;

    Ok(typed.rlp_signed(&signature))
}

/// Hash a Wanchain transaction signs over (EIP-155 form)
pub fn wanchain_sighash(chain_id: u64, tx: &TransactionDescriptor) -> H256 {
    let mut stream = RlpStream::new_list(10);
    append_wanchain_fields(&mut stream, tx);
    stream.append(&chain_id);
    stream.append(&0u8);
    stream.append(&0u8);
    H256::from(keccak256(stream.out()))
}

fn sign_wanchain(wallet: &LocalWallet, chain_id: u64, tx: &TransactionDescriptor) -> AgentResult<Bytes> {
    let sighash = wanchain_sighash(chain_id, tx);
    let signature: Signature = wallet
        .sign_hash(sighash)
        .map_err(|e| AgentError::Signing(e.to_string()))?;

    // sign_hash yields v = 27 + recovery id
    let recovery_id = signature.v.checked_sub(27).ok_or_else(|| {
        AgentError::Signing(format!("unexpected recovery value {}", signature.v))
    })?;
    let v = recovery_id + chain_id * 2 + 35;

    let mut stream = RlpStream::new_list(10);
    append_wanchain_fields(&mut stream, tx);
    stream.append(&v);
    stream.append(&signature.r);
    stream.append(&signature.s);
    Ok(Bytes::from(stream.out().to_vec()))
}

fn append_wanchain_fields(stream: &mut RlpStream, tx: &TransactionDescriptor) {
    stream.append(&WANCHAIN_NORMAL_TX);
    stream.append(&tx.nonce);
    stream.append(&tx.gas_price);
    stream.append(&tx.gas_limit);
    stream.append(&tx.to);
    stream.append(&tx.value);
    stream.append(&tx.data.to_vec());
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::rlp::Rlp;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn wallet() -> LocalWallet {
        TEST_KEY.parse().unwrap()
    }

    fn descriptor(from: Address) -> TransactionDescriptor {
        TransactionDescriptor {
            from,
            to: Address::repeat_byte(0x55),
            gas_limit: U256::from(470_000u64),
            gas_price: U256::from(180_000_000_000u64),
            nonce: 9,
            value: U256::zero(),
            data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
        }
    }

    #[test]
    fn test_ethereum_transaction_recovers_sender() {
        let wallet = wallet();
        let tx = descriptor(wallet.address());

        let raw = sign_with_wallet(&wallet, TxFormat::Ethereum, 4, &tx).unwrap();
        let (decoded, signature) = TypedTransaction::decode_signed(&Rlp::new(&raw)).unwrap();

        assert_eq!(decoded.nonce(), Some(&U256::from(9u64)));
        assert_eq!(decoded.data().map(|d| d.to_vec()), Some(tx.data.to_vec()));
        assert_eq!(signature.recover(decoded.sighash()).unwrap(), wallet.address());
    }

    #[test]
    fn test_wanchain_transaction_layout() {
        let wallet = wallet();
        let tx = descriptor(wallet.address());
        let chain_id = 3u64;

        let raw = sign_with_wallet(&wallet, TxFormat::Wanchain, chain_id, &tx).unwrap();
        let rlp = Rlp::new(&raw);

        assert_eq!(rlp.item_count().unwrap(), 10);
        assert_eq!(rlp.val_at::<u64>(0).unwrap(), WANCHAIN_NORMAL_TX);
        assert_eq!(rlp.val_at::<u64>(1).unwrap(), 9);
        assert_eq!(rlp.val_at::<Address>(4).unwrap(), tx.to);

        let v: u64 = rlp.val_at(7).unwrap();
        assert!(v == chain_id * 2 + 35 || v == chain_id * 2 + 36);

        let signature = Signature {
            r: rlp.val_at(8).unwrap(),
            s: rlp.val_at(9).unwrap(),
            v,
        };
        let recovered = signature.recover(wanchain_sighash(chain_id, &tx)).unwrap();
        assert_eq!(recovered, wallet.address());
    }

    #[tokio::test]
    async fn test_keystore_signer_without_wallet_fails() {
        let signer = KeystoreSigner::new(1, TxFormat::Ethereum, Arc::new(HashMap::new()));
        let err = signer.sign(&descriptor(Address::repeat_byte(1))).await.unwrap_err();
        assert!(matches!(err, AgentError::Signing(_)));
    }

    #[tokio::test]
    async fn test_keystore_is_unlocked_once_for_many_signs() {
        let dir = tempfile::tempdir().unwrap();
        let (created, file_name) = LocalWallet::new_keystore(
            dir.path(),
            &mut ethers::core::rand::thread_rng(),
            "operator-pw",
            None,
        )
        .unwrap();
        let account = created.address();

        let keystores = HashMap::from([(account, dir.path().join(file_name))]);
        let wallets = unlock_keystores(keystores, &Credential::new("operator-pw"))
            .await
            .unwrap();

        // Signing must not go back to disk
        dir.close().unwrap();

        let signer = KeystoreSigner::new(4, TxFormat::Ethereum, Arc::new(wallets));
        for nonce in [9u64, 10] {
            let mut tx = descriptor(account);
            tx.nonce = nonce;

            let raw = signer.sign(&tx).await.unwrap();
            let (decoded, signature) = TypedTransaction::decode_signed(&Rlp::new(&raw)).unwrap();
            assert_eq!(decoded.nonce(), Some(&U256::from(nonce)));
            assert_eq!(signature.recover(decoded.sighash()).unwrap(), account);
        }
    }

    #[tokio::test]
    async fn test_keystore_rejects_wrong_password_and_account() {
        let dir = tempfile::tempdir().unwrap();
        let (created, file_name) = LocalWallet::new_keystore(
            dir.path(),
            &mut ethers::core::rand::thread_rng(),
            "operator-pw",
            None,
        )
        .unwrap();
        let path = dir.path().join(file_name);

        let wrong_password = HashMap::from([(created.address(), path.clone())]);
        let err = unlock_keystores(wrong_password, &Credential::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Signing(_)));

        let wrong_account = HashMap::from([(Address::repeat_byte(0x0e), path)]);
        let err = unlock_keystores(wrong_account, &Credential::new("operator-pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Signing(_)));
    }

    #[test]
    fn test_credential_is_redacted() {
        assert_eq!(format!("{:?}", Credential::new("hunter2")), "Credential(<redacted>)");
    }
}
