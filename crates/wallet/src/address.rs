//! Encrypted per-address key records and their on-disk codec.

use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use btcvault_primitives::{
    hash160, pubkey_hash_to_address, wallet_checksum, Decoder, Encoder, Network,
};

use crate::crypto::{decrypt_privkey, encrypt_privkey, pubkey_from_privkey, verify_keypair};
use crate::recent::BlockStamp;
use crate::WalletError;

/// Chain index of the root address every other key descends from.
pub const ROOT_KEY_CHAIN_IDX: i64 = -1;

/// Chain index marking keys imported from outside the chain.
pub const IMPORTED_KEY_CHAIN_IDX: i64 = -2;

const PUBKEY_COMPRESSED: u8 = 0x02;
const PUBKEY_UNCOMPRESSED: u8 = 0x04;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct AddrFlags {
    pub has_priv_key: bool,
    pub has_pub_key: bool,
    pub encrypted: bool,
    pub create_priv_key_next_unlock: bool,
    pub compressed: bool,
}

impl AddrFlags {
    fn encode(&self, encoder: &mut Encoder) -> Result<(), WalletError> {
        let mut raw = [0u8; 8];
        if self.has_priv_key {
            raw[0] |= 1 << 0;
        }
        if self.has_pub_key {
            raw[0] |= 1 << 1;
        }
        if !self.encrypted {
            // Only encrypted private keys are representable on disk.
            return Err(WalletError::InvalidData("address must be encrypted"));
        }
        raw[0] |= 1 << 2;
        if self.create_priv_key_next_unlock {
            raw[0] |= 1 << 3;
        }
        if self.compressed {
            raw[0] |= 1 << 4;
        }
        encoder.write_bytes(&raw);
        Ok(())
    }

    fn decode(decoder: &mut Decoder) -> Result<Self, WalletError> {
        let raw = decoder.read_fixed::<8>()?;
        if raw[0] & (1 << 2) == 0 {
            return Err(WalletError::InvalidData(
                "address flag specifies unencrypted address",
            ));
        }
        Ok(Self {
            has_priv_key: raw[0] & (1 << 0) != 0,
            has_pub_key: raw[0] & (1 << 1) != 0,
            encrypted: true,
            create_priv_key_next_unlock: raw[0] & (1 << 3) != 0,
            compressed: raw[0] & (1 << 4) != 0,
        })
    }
}

/// A serialized public key starts with its format byte; the low parity bit
/// is masked off to decide the body length.
fn decode_pubkey(decoder: &mut Decoder) -> Result<Vec<u8>, WalletError> {
    let format = decoder.read_u8()?;
    let body_len = match format & !0x01 {
        PUBKEY_UNCOMPRESSED => 64,
        PUBKEY_COMPRESSED => 32,
        _ => return Err(WalletError::InvalidData("unrecognized pubkey format")),
    };
    let body = decoder.read_bytes(body_len)?;
    let mut out = Vec::with_capacity(1 + body_len);
    out.push(format);
    out.extend_from_slice(&body);
    Ok(out)
}

/// An encrypted keypair record.  The plaintext private key only exists in
/// the mutex-guarded cache between unlock and lock.
pub struct BtcAddress {
    pub(crate) pub_key_hash: [u8; 20],
    pub(crate) flags: AddrFlags,
    pub(crate) chaincode: [u8; 32],
    pub(crate) chain_index: i64,
    pub(crate) chain_depth: i64,
    pub(crate) init_vector: [u8; 16],
    pub(crate) priv_key: [u8; 32],
    pub(crate) pub_key: Vec<u8>,
    pub(crate) first_seen: i64,
    pub(crate) last_seen: i64,
    pub(crate) first_block: i32,
    pub(crate) last_block: i32,
    priv_key_ct: Mutex<Option<[u8; 32]>>,
}

fn lock_plain(cache: &Mutex<Option<[u8; 32]>>) -> MutexGuard<'_, Option<[u8; 32]>> {
    cache.lock().unwrap_or_else(|err| err.into_inner())
}

impl BtcAddress {
    /// Builds a new address around a 32-byte private key.  The IV must be
    /// 16 bytes; pass `None` to generate one.
    pub(crate) fn new(
        privkey: [u8; 32],
        iv: Option<[u8; 16]>,
        bs: &BlockStamp,
        compressed: bool,
    ) -> Result<Self, WalletError> {
        let iv = match iv {
            Some(iv) => iv,
            None => {
                let mut iv = [0u8; 16];
                OsRng.fill_bytes(&mut iv);
                iv
            }
        };

        let pub_key = pubkey_from_privkey(&privkey, compressed)?;
        let pub_key_hash = hash160(&pub_key);
        Ok(Self {
            pub_key_hash,
            flags: AddrFlags {
                has_priv_key: true,
                has_pub_key: true,
                encrypted: false,
                create_priv_key_next_unlock: false,
                compressed,
            },
            chaincode: [0u8; 32],
            chain_index: 0,
            chain_depth: 0,
            init_vector: iv,
            priv_key: [0u8; 32],
            pub_key,
            first_seen: unix_now(),
            last_seen: 0,
            first_block: bs.height,
            last_block: 0,
            priv_key_ct: Mutex::new(Some(privkey)),
        })
    }

    /// Builds the chain root: a compressed address carrying the chaincode
    /// and chain index −1.
    pub(crate) fn new_root(
        privkey: [u8; 32],
        iv: Option<[u8; 16]>,
        chaincode: [u8; 32],
        bs: &BlockStamp,
    ) -> Result<Self, WalletError> {
        let mut addr = Self::new(privkey, iv, bs, true)?;
        addr.chaincode = chaincode;
        addr.chain_index = ROOT_KEY_CHAIN_IDX;
        Ok(addr)
    }

    pub(crate) fn verify_keypairs(&self) -> Result<(), WalletError> {
        let guard = lock_plain(&self.priv_key_ct);
        let Some(privkey) = *guard else {
            return Err(WalletError::InvalidData("private key unavailable"));
        };
        drop(guard);
        verify_keypair(&self.pub_key, &privkey)
    }

    /// Encrypts the clear-text private key in place.  Fails if the record
    /// is already encrypted; re-encryption is not supported.
    pub(crate) fn encrypt(&mut self, key: &[u8; 32]) -> Result<(), WalletError> {
        if self.flags.encrypted {
            return Err(WalletError::InvalidData("address already encrypted"));
        }
        let guard = lock_plain(&self.priv_key_ct);
        let Some(plaintext) = *guard else {
            return Err(WalletError::InvalidData("invalid clear text private key"));
        };
        drop(guard);

        self.priv_key = encrypt_privkey(key, &self.init_vector, &plaintext);
        self.flags.encrypted = true;
        Ok(())
    }

    /// Decrypts and returns the private key, caching the plaintext for
    /// later calls.  The returned copy stays valid across a concurrent
    /// [`BtcAddress::lock`].
    pub(crate) fn unlock(&self, key: &[u8; 32]) -> Result<[u8; 32], WalletError> {
        if !self.flags.encrypted {
            return Err(WalletError::InvalidData(
                "unable to unlock unencrypted address",
            ));
        }

        {
            let guard = lock_plain(&self.priv_key_ct);
            if let Some(cached) = *guard {
                return Ok(cached);
            }
        }

        let plaintext = decrypt_privkey(key, &self.init_vector, &self.priv_key);

        // The decryption result must reproduce the recorded public key;
        // anything else means the AES key, and thus the passphrase, was
        // wrong.
        let derived = pubkey_from_privkey(&plaintext, self.flags.compressed)
            .map_err(|_| WalletError::IncorrectPassphrase)?;
        if derived != self.pub_key {
            return Err(WalletError::IncorrectPassphrase);
        }

        *lock_plain(&self.priv_key_ct) = Some(plaintext);
        Ok(plaintext)
    }

    /// Drops the plaintext cache.  Fails if the record is not encrypted,
    /// since the plaintext would then be the only copy of the key.
    pub(crate) fn lock(&self) -> Result<(), WalletError> {
        if !self.flags.encrypted {
            return Err(WalletError::InvalidData(
                "unable to lock unencrypted address",
            ));
        }
        self.clear_plaintext();
        Ok(())
    }

    pub(crate) fn clear_plaintext(&self) {
        let mut guard = lock_plain(&self.priv_key_ct);
        if let Some(plaintext) = guard.as_mut() {
            plaintext.zeroize();
        }
        *guard = None;
    }

    pub(crate) fn has_plaintext(&self) -> bool {
        lock_plain(&self.priv_key_ct).is_some()
    }

    /// Base58Check payment address for this record.
    pub fn address(&self, net: Network) -> String {
        pubkey_hash_to_address(&self.pub_key_hash, net)
    }

    pub(crate) fn info(&self, net: Network) -> AddressInfo {
        AddressInfo {
            address: self.address(net),
            addr_hash: self.pub_key_hash,
            compressed: self.flags.compressed,
            first_block: self.first_block,
            imported: self.chain_index == IMPORTED_KEY_CHAIN_IDX,
            pubkey: to_hex(&self.pub_key),
        }
    }

    pub(crate) fn encode(&self, encoder: &mut Encoder) -> Result<(), WalletError> {
        encoder.write_bytes(&self.pub_key_hash);
        encoder.write_u32_le(wallet_checksum(&self.pub_key_hash));
        encoder.write_zeros(4); // version reserved
        self.flags.encode(encoder)?;
        encoder.write_bytes(&self.chaincode);
        encoder.write_u32_le(wallet_checksum(&self.chaincode));
        encoder.write_i64_le(self.chain_index);
        encoder.write_i64_le(self.chain_depth);
        encoder.write_bytes(&self.init_vector);
        encoder.write_u32_le(wallet_checksum(&self.init_vector));
        encoder.write_bytes(&self.priv_key);
        encoder.write_u32_le(wallet_checksum(&self.priv_key));
        encoder.write_bytes(&self.pub_key);
        encoder.write_u32_le(wallet_checksum(&self.pub_key));
        encoder.write_i64_le(self.first_seen);
        encoder.write_i64_le(self.last_seen);
        encoder.write_i32_le(self.first_block);
        encoder.write_i32_le(self.last_block);
        Ok(())
    }

    pub(crate) fn decode(decoder: &mut Decoder) -> Result<Self, WalletError> {
        let pub_key_hash = decoder.read_fixed::<20>()?;
        let chk_pub_key_hash = decoder.read_u32_le()?;
        decoder.skip(4)?; // version reserved
        let flags = AddrFlags::decode(decoder)?;
        let chaincode = decoder.read_fixed::<32>()?;
        let chk_chaincode = decoder.read_u32_le()?;
        let chain_index = decoder.read_i64_le()?;
        let chain_depth = decoder.read_i64_le()?;
        let init_vector = decoder.read_fixed::<16>()?;
        let chk_init_vector = decoder.read_u32_le()?;
        let priv_key = decoder.read_fixed::<32>()?;
        let chk_priv_key = decoder.read_u32_le()?;
        let pub_key = decode_pubkey(decoder)?;
        let chk_pub_key = decoder.read_u32_le()?;
        let first_seen = decoder.read_i64_le()?;
        let last_seen = decoder.read_i64_le()?;
        let first_block = decoder.read_i32_le()?;
        let last_block = decoder.read_i32_le()?;

        verify_checksum(&pub_key_hash, chk_pub_key_hash)?;
        verify_checksum(&chaincode, chk_chaincode)?;
        verify_checksum(&init_vector, chk_init_vector)?;
        verify_checksum(&priv_key, chk_priv_key)?;
        verify_checksum(&pub_key, chk_pub_key)?;

        Ok(Self {
            pub_key_hash,
            flags,
            chaincode,
            chain_index,
            chain_depth,
            init_vector,
            priv_key,
            pub_key,
            first_seen,
            last_seen,
            first_block,
            last_block,
            priv_key_ct: Mutex::new(None),
        })
    }
}

pub(crate) fn verify_checksum(data: &[u8], expected: u32) -> Result<(), WalletError> {
    if wallet_checksum(data) != expected {
        return Err(WalletError::ChecksumMismatch);
    }
    Ok(())
}

/// Read-only view of an active address.
#[derive(Clone, Debug)]
pub struct AddressInfo {
    pub address: String,
    pub addr_hash: [u8; 20],
    pub compressed: bool,
    pub first_block: i32,
    pub imported: bool,
    pub pubkey: String,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn to_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> BlockStamp {
        BlockStamp {
            height: 100,
            hash: [0x44u8; 32],
        }
    }

    fn encrypted_address() -> (BtcAddress, [u8; 32]) {
        let aes_key = [0x5cu8; 32];
        let mut addr =
            BtcAddress::new([0x11u8; 32], Some([0x22u8; 16]), &stamp(), true).expect("address");
        addr.chain_index = 3;
        addr.chaincode = [0x33u8; 32];
        addr.encrypt(&aes_key).expect("encrypt");
        (addr, aes_key)
    }

    #[test]
    fn encrypt_then_unlock_roundtrips() {
        let (addr, aes_key) = encrypted_address();
        addr.clear_plaintext();
        let plaintext = addr.unlock(&aes_key).expect("unlock");
        assert_eq!(plaintext, [0x11u8; 32]);
        assert!(addr.has_plaintext());

        // Re-encrypting the unlocked plaintext under the same IV must give
        // back the stored ciphertext.
        let again = crate::crypto::encrypt_privkey(&aes_key, &addr.init_vector, &plaintext);
        assert_eq!(again, addr.priv_key);
    }

    #[test]
    fn unlock_rejects_wrong_key() {
        let (addr, _) = encrypted_address();
        addr.clear_plaintext();
        assert!(matches!(
            addr.unlock(&[0x00u8; 32]),
            Err(WalletError::IncorrectPassphrase)
        ));
        assert!(!addr.has_plaintext());
    }

    #[test]
    fn double_encrypt_fails() {
        let (mut addr, aes_key) = encrypted_address();
        assert!(matches!(
            addr.encrypt(&aes_key),
            Err(WalletError::InvalidData(_))
        ));
    }

    #[test]
    fn lock_zeroes_cache() {
        let (addr, aes_key) = encrypted_address();
        addr.unlock(&aes_key).expect("unlock");
        assert!(addr.has_plaintext());
        addr.lock().expect("lock");
        assert!(!addr.has_plaintext());
        // Unlocking again decrypts from the ciphertext.
        assert_eq!(addr.unlock(&aes_key).expect("unlock"), [0x11u8; 32]);
    }

    #[test]
    fn verify_keypairs_requires_plaintext() {
        let (addr, _) = encrypted_address();
        assert!(addr.verify_keypairs().is_ok());
        addr.clear_plaintext();
        assert!(matches!(
            addr.verify_keypairs(),
            Err(WalletError::InvalidData(_))
        ));
    }

    #[test]
    fn codec_roundtrips() {
        let (addr, _) = encrypted_address();
        let mut encoder = Encoder::new();
        addr.encode(&mut encoder).expect("encode");
        let bytes = encoder.into_inner();
        // 20+4+4+8+32+4+8+8+16+4+32+4+33+4+16+8 for a compressed pubkey.
        assert_eq!(bytes.len(), 205);

        let mut decoder = Decoder::new(&bytes);
        let decoded = BtcAddress::decode(&mut decoder).expect("decode");
        assert!(decoder.is_empty());
        assert_eq!(decoded.pub_key_hash, addr.pub_key_hash);
        assert_eq!(decoded.flags, addr.flags);
        assert_eq!(decoded.chaincode, addr.chaincode);
        assert_eq!(decoded.chain_index, addr.chain_index);
        assert_eq!(decoded.init_vector, addr.init_vector);
        assert_eq!(decoded.priv_key, addr.priv_key);
        assert_eq!(decoded.pub_key, addr.pub_key);
        assert_eq!(decoded.first_block, addr.first_block);
        assert!(!decoded.has_plaintext());
    }

    #[test]
    fn codec_rejects_flipped_bits() {
        let (addr, _) = encrypted_address();
        let mut encoder = Encoder::new();
        addr.encode(&mut encoder).expect("encode");
        let clean = encoder.into_inner();

        // One corruption inside each checksummed field.  145 is the first
        // pubkey body byte; the format byte itself fails earlier.
        for offset in [0usize, 36, 88, 108, 145] {
            let mut bytes = clean.clone();
            bytes[offset] ^= 0x80;
            let mut decoder = Decoder::new(&bytes);
            assert!(
                matches!(
                    BtcAddress::decode(&mut decoder),
                    Err(WalletError::ChecksumMismatch)
                ),
                "corruption at offset {offset} must be caught"
            );
        }
    }

    #[test]
    fn decode_rejects_unencrypted_flag() {
        let (addr, _) = encrypted_address();
        let mut encoder = Encoder::new();
        addr.encode(&mut encoder).expect("encode");
        let mut bytes = encoder.into_inner();
        bytes[28] &= !(1 << 2); // clear the encrypted bit

        let mut decoder = Decoder::new(&bytes);
        assert!(matches!(
            BtcAddress::decode(&mut decoder),
            Err(WalletError::InvalidData(_))
        ));
    }

    #[test]
    fn decode_rejects_unknown_pubkey_format() {
        let (addr, _) = encrypted_address();
        let mut encoder = Encoder::new();
        addr.encode(&mut encoder).expect("encode");
        let mut bytes = encoder.into_inner();
        bytes[144] = 0x07; // pubkey format byte

        let mut decoder = Decoder::new(&bytes);
        assert!(matches!(
            BtcAddress::decode(&mut decoder),
            Err(WalletError::InvalidData(_))
        ));
    }

    #[test]
    fn unencrypted_record_refuses_to_serialize() {
        let addr = BtcAddress::new([0x11u8; 32], None, &stamp(), true).expect("address");
        let mut encoder = Encoder::new();
        assert!(matches!(
            addr.encode(&mut encoder),
            Err(WalletError::InvalidData(_))
        ));
    }
}
