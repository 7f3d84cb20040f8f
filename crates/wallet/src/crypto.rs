//! secp256k1 key operations and private-key encryption.

use std::sync::OnceLock;

use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use secp256k1::{All, Message, PublicKey, Scalar, Secp256k1, SecretKey};

use btcvault_primitives::sha256;

use crate::WalletError;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

pub(crate) fn secp() -> &'static Secp256k1<All> {
    static SECP: OnceLock<Secp256k1<All>> = OnceLock::new();
    SECP.get_or_init(Secp256k1::new)
}

/// Serializes the public key for a 32-byte private key, compressed (33
/// bytes) or uncompressed (65 bytes).
pub fn pubkey_from_privkey(privkey: &[u8; 32], compressed: bool) -> Result<Vec<u8>, WalletError> {
    let secret = SecretKey::from_slice(privkey).map_err(|_| WalletError::InvalidSecretKey)?;
    let pubkey = PublicKey::from_secret_key(secp(), &secret);
    Ok(if compressed {
        pubkey.serialize().to_vec()
    } else {
        pubkey.serialize_uncompressed().to_vec()
    })
}

/// Deterministically derives the next private key in the chain from its
/// parent.  `pubkey` may be 33 or 65 bytes, or `None` to compute the
/// compressed form from `privkey`.
///
/// The child scalar is `privkey * (sha256(pubkey) XOR chaincode) mod N`.
/// A mask that is zero or not below the group order cannot be represented
/// as a scalar and is rejected; the chance of deriving one is around
/// 2^-128.
pub fn chained_privkey(
    privkey: &[u8; 32],
    pubkey: Option<&[u8]>,
    chaincode: &[u8; 32],
) -> Result<[u8; 32], WalletError> {
    let derived;
    let pubkey = match pubkey {
        Some(bytes) => {
            if bytes.len() != 33 && bytes.len() != 65 {
                return Err(WalletError::InvalidData("invalid pubkey length"));
            }
            bytes
        }
        None => {
            derived = pubkey_from_privkey(privkey, true)?;
            derived.as_slice()
        }
    };

    let digest = sha256(pubkey);
    let mut mask = [0u8; 32];
    for (i, byte) in mask.iter_mut().enumerate() {
        *byte = digest[i] ^ chaincode[i];
    }

    let scalar = Scalar::from_be_bytes(mask).map_err(|_| WalletError::InvalidSecretKey)?;
    let parent = SecretKey::from_slice(privkey).map_err(|_| WalletError::InvalidSecretKey)?;
    let child = parent
        .mul_tweak(&scalar)
        .map_err(|_| WalletError::InvalidSecretKey)?;
    Ok(child.secret_bytes())
}

/// AES-256-CFB encryption of a 32-byte private key under a per-address IV.
pub(crate) fn encrypt_privkey(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8; 32]) -> [u8; 32] {
    let mut buf = *plaintext;
    Aes256CfbEnc::new(key.into(), iv.into()).encrypt(&mut buf);
    buf
}

pub(crate) fn decrypt_privkey(key: &[u8; 32], iv: &[u8; 16], ciphertext: &[u8; 32]) -> [u8; 32] {
    let mut buf = *ciphertext;
    Aes256CfbDec::new(key.into(), iv.into()).decrypt(&mut buf);
    buf
}

/// Signs a fixed message with the private key and verifies the signature
/// against the recorded public key.  Catches a corrupted keypair before an
/// unspendable address is ever handed out.
pub(crate) fn verify_keypair(pubkey: &[u8], privkey: &[u8; 32]) -> Result<(), WalletError> {
    let pubkey = PublicKey::from_slice(pubkey)
        .map_err(|_| WalletError::InvalidData("invalid public key encoding"))?;
    let secret = SecretKey::from_slice(privkey).map_err(|_| WalletError::InvalidSecretKey)?;

    let message = Message::from_digest(sha256(b"String to sign."));
    let signature = secp().sign_ecdsa(&message, &secret);
    secp()
        .verify_ecdsa(&message, &signature, &pubkey)
        .map_err(|_| WalletError::InvalidData("keypair verification failed"))
}
