//! Deterministic keychain wallet engine compatible with the Armory wallet
//! file lineage.
//!
//! A single root key and chaincode generate an arbitrarily long chain of
//! keypairs.  Private keys are encrypted with AES-256-CFB under a key
//! derived from a passphrase by a memory-hard KDF, and the whole wallet
//! serializes to the fixed-header-plus-tagged-entries container format.

use btcvault_primitives::{DecodeError, Network};

pub mod address;
pub mod crypto;
mod entry;
pub mod kdf;
pub mod recent;
pub mod version;
pub mod wallet;

pub use address::{AddressInfo, BtcAddress, IMPORTED_KEY_CHAIN_IDX, ROOT_KEY_CHAIN_IDX};
pub use crypto::{chained_privkey, pubkey_from_privkey};
pub use kdf::{
    compute_kdf_parameters, derive_key, KdfParameters, DEFAULT_KDF_COMPUTE_TIME,
    DEFAULT_KDF_MAX_MEM,
};
pub use recent::{BlockStamp, RecentBlocksIter, MAX_RECENT_BLOCKS};
pub use version::{FileVersion, VERS_20_LAST_BLOCKS, VERS_ARMORY, VERS_CURRENT};
pub use wallet::Wallet;

pub use secp256k1;

#[derive(Debug)]
pub enum WalletError {
    AddressNotFound,
    ChecksumMismatch,
    Duplicate,
    IncorrectPassphrase,
    InvalidSecretKey,
    MalformedEntry,
    NetworkMismatch { expected: Network, found: Network },
    WalletDoesNotExist,
    WalletLocked,
    Io(std::io::Error),
    Decode(DecodeError),
    InvalidData(&'static str),
}

impl std::fmt::Display for WalletError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletError::AddressNotFound => write!(f, "address not found"),
            WalletError::ChecksumMismatch => write!(f, "checksum mismatch"),
            WalletError::Duplicate => write!(f, "duplicate key or address"),
            WalletError::IncorrectPassphrase => write!(f, "incorrect wallet passphrase"),
            WalletError::InvalidSecretKey => write!(f, "invalid secret key"),
            WalletError::MalformedEntry => write!(f, "malformed entry"),
            WalletError::NetworkMismatch { expected, found } => write!(
                f,
                "wallet network mismatch (expected {expected:?}, found {found:?})"
            ),
            WalletError::WalletDoesNotExist => write!(f, "wallet file does not exist"),
            WalletError::WalletLocked => write!(f, "wallet is locked"),
            WalletError::Io(err) => write!(f, "{err}"),
            WalletError::Decode(err) => write!(f, "{err}"),
            WalletError::InvalidData(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for WalletError {}

impl From<std::io::Error> for WalletError {
    fn from(err: std::io::Error) -> Self {
        WalletError::Io(err)
    }
}

impl From<DecodeError> for WalletError {
    fn from(err: DecodeError) -> Self {
        WalletError::Decode(err)
    }
}
