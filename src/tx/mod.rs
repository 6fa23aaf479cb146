//! Transaction submission: nonce sequencing, gas policy, signing and broadcast

mod gas;
mod nonce;
mod sender;
mod signer;

pub use gas::GasPolicy;
pub use nonce::{NonceLease, NonceSequencer};
pub use sender::{TransactionDraft, TransactionSender};
pub use signer::{
    sign_with_wallet, unlock_keystores, wanchain_sighash, Credential, KeystoreSigner,
    TransactionDescriptor, TransactionSigner,
};

#[cfg(test)]
pub(crate) use sender::tests as test_support;
#[cfg(test)]
pub(crate) use signer::MockTransactionSigner;
