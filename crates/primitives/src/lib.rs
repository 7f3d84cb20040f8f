//! Byte-level codec, hashes, and address encodings shared by the wallet.

pub mod address;
pub mod encoding;
pub mod hash;
pub mod network;

pub use address::{
    address_to_pubkey_hash, pubkey_hash_to_address, secret_key_to_wif, wif_to_secret_key,
    AddressError,
};
pub use encoding::{DecodeError, Decoder, Encoder};
pub use hash::{hash160, sha256, sha256d, sha512, wallet_checksum};
pub use network::Network;
