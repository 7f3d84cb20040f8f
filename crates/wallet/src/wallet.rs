//! The wallet aggregate: in-memory state, the container codec, and the
//! lock/unlock state machine.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::SecretKey;
use zeroize::Zeroize;

use btcvault_primitives::{
    address_to_pubkey_hash, hash160, pubkey_hash_to_address, Decoder, Encoder, Network,
};

use crate::address::{AddressInfo, BtcAddress, IMPORTED_KEY_CHAIN_IDX, ROOT_KEY_CHAIN_IDX};
use crate::crypto::{chained_privkey, pubkey_from_privkey};
use crate::entry::{
    encode_addr_comment_entry, encode_addr_entry, encode_tx_comment_entry, read_entries, Entry,
    MAX_COMMENT_LEN,
};
use crate::kdf::{
    compute_kdf_parameters, derive_key, KdfParameters, DEFAULT_KDF_COMPUTE_TIME,
    DEFAULT_KDF_MAX_MEM,
};
use crate::recent::{BlockStamp, RecentBlocks, RecentBlocksIter};
use crate::version::{FileVersion, VERS_CURRENT};
use crate::WalletError;

/// `\xbaWALLET\x00`
const FILE_ID: [u8; 8] = [0xba, 0x57, 0x41, 0x4c, 0x4c, 0x45, 0x54, 0x00];

const NAME_BYTES: usize = 32;
const DESC_BYTES: usize = 256;
const RESERVED_BYTES: usize = 256;

/// Size of the slack region between the root address and the appended
/// entries, inherited from Armory's file layout.  The recent-block ring
/// lives at its front.
const UNUSED_SPACE_BYTES: usize = 1024;

pub struct Wallet {
    net: Network,
    flags: WalletFlags,
    uniq_id: [u8; 6],
    create_date: i64,
    name: [u8; NAME_BYTES],
    desc: [u8; DESC_BYTES],
    highest_used: i64,
    kdf_params: KdfParameters,
    recent: RecentBlocks,

    addr_map: BTreeMap<[u8; 20], BtcAddress>,
    addr_comment_map: BTreeMap<[u8; 20], Vec<u8>>,
    tx_comment_map: BTreeMap<[u8; 32], Vec<u8>>,

    // Not serialized: the AES key while unlocked, and the bookkeeping
    // derived from the address entries.
    secret: Mutex<Option<[u8; 32]>>,
    chain_idx_map: BTreeMap<i64, [u8; 20]>,
    imported_addrs: Vec<[u8; 20]>,
    last_chain_idx: i64,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct WalletFlags {
    use_encryption: bool,
    watching_only: bool,
}

impl WalletFlags {
    fn encode(&self, encoder: &mut Encoder) {
        let mut raw = [0u8; 8];
        if self.use_encryption {
            raw[0] = 1;
        }
        if self.watching_only {
            raw[1] = 1;
        }
        encoder.write_bytes(&raw);
    }

    fn decode(decoder: &mut Decoder) -> Result<Self, WalletError> {
        let raw = decoder.read_fixed::<8>()?;
        Ok(Self {
            use_encryption: raw[0] != 0,
            watching_only: raw[1] != 0,
        })
    }
}

fn lock_secret(secret: &Mutex<Option<[u8; 32]>>) -> MutexGuard<'_, Option<[u8; 32]>> {
    secret.lock().unwrap_or_else(|err| err.into_inner())
}

impl Wallet {
    /// Creates a new wallet with a random root key and chaincode, encrypts
    /// everything under `passphrase`, and pre-generates `keypool_size`
    /// chained addresses.  The wallet is returned unlocked.
    pub fn new(
        name: &str,
        desc: &str,
        passphrase: &[u8],
        net: Network,
        created_at: &BlockStamp,
        keypool_size: usize,
    ) -> Result<Self, WalletError> {
        if name.len() > NAME_BYTES {
            return Err(WalletError::InvalidData("name exceeds 32 byte maximum size"));
        }
        if desc.len() > DESC_BYTES {
            return Err(WalletError::InvalidData(
                "desc exceeds 256 byte maximum size",
            ));
        }

        let mut rootkey = [0u8; 32];
        OsRng.fill_bytes(&mut rootkey);
        let mut chaincode = [0u8; 32];
        OsRng.fill_bytes(&mut chaincode);
        let mut uniq_id = [0u8; 6];
        OsRng.fill_bytes(&mut uniq_id);

        let mut root = BtcAddress::new_root(rootkey, None, chaincode, created_at)?;
        rootkey.zeroize();
        root.verify_keypairs()?;

        let kdf_params = compute_kdf_parameters(DEFAULT_KDF_COMPUTE_TIME, DEFAULT_KDF_MAX_MEM)?;
        let mut aes_key = derive_key(passphrase, &kdf_params);
        root.encrypt(&aes_key)?;

        let mut name_bytes = [0u8; NAME_BYTES];
        name_bytes[..name.len()].copy_from_slice(name.as_bytes());
        let mut desc_bytes = [0u8; DESC_BYTES];
        desc_bytes[..desc.len()].copy_from_slice(desc.as_bytes());

        let mut wallet = Wallet {
            net,
            flags: WalletFlags {
                use_encryption: true,
                watching_only: false,
            },
            uniq_id,
            create_date: unix_now(),
            name: name_bytes,
            desc: desc_bytes,
            highest_used: ROOT_KEY_CHAIN_IDX,
            kdf_params,
            recent: RecentBlocks {
                last_height: created_at.height,
                hashes: vec![created_at.hash],
            },
            addr_map: BTreeMap::new(),
            addr_comment_map: BTreeMap::new(),
            tx_comment_map: BTreeMap::new(),
            secret: Mutex::new(None),
            chain_idx_map: BTreeMap::new(),
            imported_addrs: Vec::new(),
            last_chain_idx: ROOT_KEY_CHAIN_IDX,
        };

        let root_hash = root.pub_key_hash;
        wallet.addr_map.insert(root_hash, root);
        wallet.chain_idx_map.insert(ROOT_KEY_CHAIN_IDX, root_hash);

        wallet.extend_keypool(keypool_size, &aes_key, created_at)?;

        *lock_secret(&wallet.secret) = Some(aes_key);
        aes_key.zeroize();
        Ok(wallet)
    }

    /// Serializes the wallet into the container format, always stamping
    /// the current file version.
    pub fn encode(&self) -> Result<Vec<u8>, WalletError> {
        let mut encoder = Encoder::new();
        encoder.write_bytes(&FILE_ID);
        VERS_CURRENT.encode(&mut encoder);
        encoder.write_bytes(&self.net.magic());
        self.flags.encode(&mut encoder);
        encoder.write_bytes(&self.uniq_id);
        encoder.write_i64_le(self.create_date);
        encoder.write_bytes(&self.name);
        encoder.write_bytes(&self.desc);
        encoder.write_i64_le(self.highest_used);
        self.kdf_params.encode(&mut encoder);
        encoder.write_zeros(RESERVED_BYTES);
        self.key_generator()?.encode(&mut encoder)?;
        encode_unused_space(&self.recent, &mut encoder)?;

        // Chained addresses in chain order; the root already sits in the
        // header.
        for (index, hash) in &self.chain_idx_map {
            if *index < 0 {
                continue;
            }
            let addr = self.addr_map.get(hash).ok_or(WalletError::InvalidData(
                "chain index map entry missing from address map",
            ))?;
            encode_addr_entry(&mut encoder, addr)?;
        }
        // Imported addresses in no particular order.
        for addr in self.addr_map.values() {
            if addr.chain_index == IMPORTED_KEY_CHAIN_IDX {
                encode_addr_entry(&mut encoder, addr)?;
            }
        }
        for (hash, comment) in &self.addr_comment_map {
            encode_addr_comment_entry(&mut encoder, hash, comment)?;
        }
        for (hash, comment) in &self.tx_comment_map {
            encode_tx_comment_entry(&mut encoder, hash, comment)?;
        }
        Ok(encoder.into_inner())
    }

    /// Parses a wallet from `decoder`.  On failure the decoder's
    /// [`Decoder::position`] reports how many bytes were consumed.
    pub fn decode(decoder: &mut Decoder) -> Result<Self, WalletError> {
        let id = decoder.read_fixed::<8>()?;
        if id != FILE_ID {
            return Err(WalletError::InvalidData("unknown wallet file ID"));
        }
        let version = FileVersion::decode(decoder)?;
        let magic = decoder.read_fixed::<4>()?;
        let net = Network::from_magic(magic)
            .ok_or(WalletError::InvalidData("unrecognized network magic"))?;
        let flags = WalletFlags::decode(decoder)?;
        let uniq_id = decoder.read_fixed::<6>()?;
        let create_date = decoder.read_i64_le()?;
        let name = decoder.read_fixed::<NAME_BYTES>()?;
        let desc = decoder.read_fixed::<DESC_BYTES>()?;
        let highest_used = decoder.read_i64_le()?;
        let kdf_params = KdfParameters::decode(decoder)?;
        decoder.skip(RESERVED_BYTES)?;
        let key_generator = BtcAddress::decode(decoder)?;
        let recent = decode_unused_space(version, decoder)?;
        let entries = read_entries(decoder)?;

        let mut wallet = Wallet {
            net,
            flags,
            uniq_id,
            create_date,
            name,
            desc,
            highest_used,
            kdf_params,
            recent,
            addr_map: BTreeMap::new(),
            addr_comment_map: BTreeMap::new(),
            tx_comment_map: BTreeMap::new(),
            secret: Mutex::new(None),
            chain_idx_map: BTreeMap::new(),
            imported_addrs: Vec::new(),
            last_chain_idx: ROOT_KEY_CHAIN_IDX,
        };

        let root_hash = key_generator.pub_key_hash;
        wallet.addr_map.insert(root_hash, key_generator);
        wallet.chain_idx_map.insert(ROOT_KEY_CHAIN_IDX, root_hash);

        for entry in entries {
            match entry {
                Entry::Addr(e) => {
                    let hash = e.addr.pub_key_hash;
                    if e.addr.chain_index == IMPORTED_KEY_CHAIN_IDX {
                        wallet.imported_addrs.push(hash);
                    } else {
                        wallet.chain_idx_map.insert(e.addr.chain_index, hash);
                        if wallet.last_chain_idx < e.addr.chain_index {
                            wallet.last_chain_idx = e.addr.chain_index;
                        }
                    }
                    wallet.addr_map.insert(hash, e.addr);
                }
                Entry::AddrComment(e) => {
                    wallet.addr_comment_map.insert(e.pub_key_hash, e.comment);
                }
                Entry::TxComment(e) => {
                    wallet.tx_comment_map.insert(e.tx_hash, e.comment);
                }
            }
        }

        Ok(wallet)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        let mut decoder = Decoder::new(bytes);
        Self::decode(&mut decoder)
    }

    /// Loads a wallet file, checking it belongs to `expected_net`.
    pub fn read_from_path(path: &Path, expected_net: Network) -> Result<Self, WalletError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(WalletError::WalletDoesNotExist)
            }
            Err(err) => return Err(WalletError::Io(err)),
        };
        let wallet = Self::from_bytes(&bytes)?;
        if wallet.net != expected_net {
            return Err(WalletError::NetworkMismatch {
                expected: expected_net,
                found: wallet.net,
            });
        }
        btcvault_log::log_info!(
            "loaded wallet \"{}\" with {} addresses",
            wallet.name(),
            wallet.addr_map.len()
        );
        Ok(wallet)
    }

    /// Writes the wallet through a temp file and rename, so a failed write
    /// never clobbers an existing file.
    pub fn write_to_path(&self, path: &Path) -> Result<(), WalletError> {
        let bytes = self.encode()?;
        write_file_atomic(path, &bytes)?;
        btcvault_log::log_info!("saved wallet \"{}\" ({} bytes)", self.name(), bytes.len());
        Ok(())
    }

    /// Derives the AES key from `passphrase` and unlocks the root address
    /// with it.  On success the key is retained for later decryptions.
    pub fn unlock(&self, passphrase: &[u8]) -> Result<(), WalletError> {
        let mut key = derive_key(passphrase, &self.kdf_params);
        let root = self.key_generator()?;
        match root.unlock(&key) {
            Ok(mut plaintext) => plaintext.zeroize(),
            Err(err) => {
                key.zeroize();
                return Err(err);
            }
        }

        let mut guard = lock_secret(&self.secret);
        if let Some(old) = guard.as_mut() {
            old.zeroize();
        }
        *guard = Some(key);
        key.zeroize();
        Ok(())
    }

    /// Best-effort removal of all secret key material.  Fails with
    /// [`WalletError::WalletLocked`] when already locked, but clears the
    /// per-address plaintext caches regardless.
    pub fn lock(&self) -> Result<(), WalletError> {
        let result = {
            let mut guard = lock_secret(&self.secret);
            match guard.as_mut() {
                Some(key) => {
                    key.zeroize();
                    *guard = None;
                    Ok(())
                }
                None => Err(WalletError::WalletLocked),
            }
        };

        for addr in self.addr_map.values() {
            addr.clear_plaintext();
        }
        result
    }

    pub fn is_locked(&self) -> bool {
        lock_secret(&self.secret).is_none()
    }

    /// Hands out the next chained address, extending the keypool by
    /// `keypool_size` when it has run dry (which requires the wallet to be
    /// unlocked).
    pub fn next_chained_address(
        &mut self,
        bs: &BlockStamp,
        keypool_size: usize,
    ) -> Result<String, WalletError> {
        if !self.chain_idx_map.contains_key(&(self.highest_used + 1)) {
            let mut aes_key = self.secret_key_copy()?;
            let extended = self.extend_keypool(keypool_size, &aes_key, bs);
            aes_key.zeroize();
            extended?;
            if !self.chain_idx_map.contains_key(&(self.highest_used + 1)) {
                return Err(WalletError::InvalidData(
                    "chain index map improperly updated",
                ));
            }
        }

        let next_hash = self
            .chain_idx_map
            .get(&(self.highest_used + 1))
            .copied()
            .ok_or(WalletError::InvalidData("cannot find generated address"))?;
        let addr = self
            .addr_map
            .get(&next_hash)
            .ok_or(WalletError::InvalidData("cannot find generated address"))?;
        self.highest_used += 1;
        Ok(addr.address(self.net))
    }

    /// The most recently handed out chained address, or the root address
    /// when none has been requested yet.
    pub fn last_chained_address(&self) -> Option<String> {
        let hash = self.chain_idx_map.get(&self.highest_used)?;
        let addr = self.addr_map.get(hash)?;
        Some(addr.address(self.net))
    }

    /// Grows the keypool by `n` chained addresses, each derived from its
    /// predecessor and encrypted under `aes_key`.
    fn extend_keypool(
        &mut self,
        n: usize,
        aes_key: &[u8; 32],
        bs: &BlockStamp,
    ) -> Result<(), WalletError> {
        let last_hash = self
            .chain_idx_map
            .get(&self.last_chain_idx)
            .copied()
            .ok_or(WalletError::InvalidData(
                "expected last chained address not found",
            ))?;
        let parent = self.addr_map.get(&last_hash).ok_or(WalletError::InvalidData(
            "expected last chained address not found",
        ))?;

        let mut privkey = parent.unlock(aes_key)?;
        let chaincode = parent.chaincode;
        let mut parent_pubkey = parent.pub_key.clone();
        let mut parent_index = parent.chain_index;

        for _ in 0..n {
            let child = chained_privkey(&privkey, Some(&parent_pubkey), &chaincode)?;
            privkey.zeroize();
            privkey = child;

            let mut addr = BtcAddress::new(privkey, None, bs, true)?;
            addr.verify_keypairs()?;
            addr.encrypt(aes_key)?;
            addr.chain_index = parent_index + 1;
            // Every chained address carries its own copy of the root
            // chaincode; the field round-trips per address even though the
            // values are all equal.
            addr.chaincode = chaincode;

            parent_pubkey = addr.pub_key.clone();
            parent_index = addr.chain_index;
            let hash = addr.pub_key_hash;
            self.chain_idx_map.insert(addr.chain_index, hash);
            self.addr_map.insert(hash, addr);
            self.last_chain_idx += 1;
        }
        privkey.zeroize();
        Ok(())
    }

    /// Imports an out-of-chain private key, encrypting it under the
    /// wallet's AES key.  Returns the payment address string.
    pub fn import_private_key(
        &mut self,
        privkey: &[u8; 32],
        compressed: bool,
        bs: &BlockStamp,
    ) -> Result<String, WalletError> {
        let pubkey = pubkey_from_privkey(privkey, compressed)?;
        let pkh = hash160(&pubkey);
        if self.addr_map.contains_key(&pkh) {
            return Err(WalletError::Duplicate);
        }

        let mut aes_key = self.secret_key_copy()?;
        let result = (|| -> Result<BtcAddress, WalletError> {
            let mut addr = BtcAddress::new(*privkey, None, bs, compressed)?;
            addr.chain_index = IMPORTED_KEY_CHAIN_IDX;
            addr.encrypt(&aes_key)?;
            Ok(addr)
        })();
        aes_key.zeroize();
        let addr = result?;

        let hash = addr.pub_key_hash;
        self.addr_map.insert(hash, addr);
        self.imported_addrs.push(hash);
        Ok(pubkey_hash_to_address(&hash, self.net))
    }

    /// The private key behind a payment address.  Requires an unlocked
    /// wallet; decryption is verified against the stored public key.
    pub fn address_key(&self, address: &str) -> Result<SecretKey, WalletError> {
        let pkh = address_to_pubkey_hash(address, self.net)
            .map_err(|_| WalletError::InvalidData("unsupported address"))?;
        let addr = self
            .addr_map
            .get(&pkh)
            .ok_or(WalletError::AddressNotFound)?;
        if !addr.flags.has_pub_key {
            return Err(WalletError::InvalidData("no public key for address"));
        }
        if !addr.flags.has_priv_key {
            return Err(WalletError::InvalidData("no private key for address"));
        }

        let mut aes_key = self.secret_key_copy()?;
        let unlocked = addr.unlock(&aes_key);
        aes_key.zeroize();
        let mut plaintext = unlocked?;
        let key = SecretKey::from_slice(&plaintext).map_err(|_| WalletError::InvalidSecretKey);
        plaintext.zeroize();
        key
    }

    pub fn address_info(&self, address: &str) -> Result<AddressInfo, WalletError> {
        let pkh = address_to_pubkey_hash(address, self.net)
            .map_err(|_| WalletError::InvalidData("unsupported address"))?;
        let addr = self
            .addr_map
            .get(&pkh)
            .ok_or(WalletError::AddressNotFound)?;
        Ok(addr.info(self.net))
    }

    /// All addresses handed out so far, keyed by payment address.  Unused
    /// keypool addresses are not included.
    pub fn active_addresses(&self) -> BTreeMap<String, AddressInfo> {
        self.sorted_active_addresses()
            .into_iter()
            .map(|info| (info.address.clone(), info))
            .collect()
    }

    /// Active addresses in chain order (root first), then imported
    /// addresses in insertion order.
    pub fn sorted_active_addresses(&self) -> Vec<AddressInfo> {
        let mut infos = Vec::new();
        for index in ROOT_KEY_CHAIN_IDX..=self.highest_used {
            let Some(hash) = self.chain_idx_map.get(&index) else {
                continue;
            };
            if let Some(addr) = self.addr_map.get(hash) {
                infos.push(addr.info(self.net));
            }
        }
        for hash in &self.imported_addrs {
            if let Some(addr) = self.addr_map.get(hash) {
                infos.push(addr.info(self.net));
            }
        }
        infos
    }

    /// Marks the wallet in sync with `bs`.  A rollback onto a hash the
    /// ring already holds truncates everything after it; a rollback onto
    /// an unknown hash, or any gap in heights, resets the ring.
    pub fn set_synced_with(&mut self, bs: &BlockStamp) {
        self.recent.sync_to(bs);
    }

    /// The block the wallet is currently synced to, with height −1 when
    /// nothing is recorded.
    pub fn synced_with(&self) -> BlockStamp {
        self.recent.synced_with()
    }

    /// Iterator over recently seen blocks, starting at the newest.
    pub fn iterate_recent_blocks(&self) -> Option<RecentBlocksIter<'_>> {
        self.recent.iter()
    }

    /// The earliest block height any wallet address could have appeared
    /// in.  Imported keys may predate the wallet itself.
    pub fn earliest_block_height(&self) -> i32 {
        let mut height = match self.key_generator() {
            Ok(root) => root.first_block,
            Err(_) => 0,
        };
        for hash in &self.imported_addrs {
            if let Some(addr) = self.addr_map.get(hash) {
                if addr.first_block < height {
                    height = addr.first_block;
                    if height == 0 {
                        break;
                    }
                }
            }
        }
        height
    }

    /// Raise-only correction of the creation-time block height guess.
    pub fn set_better_earliest_block_height(&mut self, height: i32) {
        let Some(root_hash) = self.chain_idx_map.get(&ROOT_KEY_CHAIN_IDX).copied() else {
            return;
        };
        if let Some(root) = self.addr_map.get_mut(&root_hash) {
            if height > root.first_block {
                root.first_block = height;
            }
        }
    }

    /// Attaches a comment to a payment address.  An empty comment removes
    /// any existing one.
    pub fn set_address_comment(&mut self, address: &str, comment: &[u8]) -> Result<(), WalletError> {
        if comment.len() > MAX_COMMENT_LEN {
            return Err(WalletError::MalformedEntry);
        }
        let pkh = address_to_pubkey_hash(address, self.net)
            .map_err(|_| WalletError::InvalidData("unsupported address"))?;
        if comment.is_empty() {
            self.addr_comment_map.remove(&pkh);
        } else {
            self.addr_comment_map.insert(pkh, comment.to_vec());
        }
        Ok(())
    }

    pub fn address_comment(&self, address: &str) -> Option<&[u8]> {
        let pkh = address_to_pubkey_hash(address, self.net).ok()?;
        self.addr_comment_map.get(&pkh).map(Vec::as_slice)
    }

    /// Attaches a comment to a transaction hash.  An empty comment removes
    /// any existing one.
    pub fn set_tx_comment(&mut self, tx_hash: &[u8; 32], comment: &[u8]) -> Result<(), WalletError> {
        if comment.len() > MAX_COMMENT_LEN {
            return Err(WalletError::MalformedEntry);
        }
        if comment.is_empty() {
            self.tx_comment_map.remove(tx_hash);
        } else {
            self.tx_comment_map.insert(*tx_hash, comment.to_vec());
        }
        Ok(())
    }

    pub fn tx_comment(&self, tx_hash: &[u8; 32]) -> Option<&[u8]> {
        self.tx_comment_map.get(tx_hash).map(Vec::as_slice)
    }

    /// Unix time the wallet was created.
    pub fn create_date(&self) -> i64 {
        self.create_date
    }

    /// The wallet name, trimmed at the first NUL of its padded field.
    pub fn name(&self) -> String {
        trimmed_string(&self.name)
    }

    pub fn description(&self) -> String {
        trimmed_string(&self.desc)
    }

    pub fn net(&self) -> Network {
        self.net
    }

    fn key_generator(&self) -> Result<&BtcAddress, WalletError> {
        self.chain_idx_map
            .get(&ROOT_KEY_CHAIN_IDX)
            .and_then(|hash| self.addr_map.get(hash))
            .ok_or(WalletError::InvalidData("wallet root address missing"))
    }

    /// Copies the AES key out from under the mutex, so callers stay safe
    /// against a concurrent lock zeroing the original.
    fn secret_key_copy(&self) -> Result<[u8; 32], WalletError> {
        let guard = lock_secret(&self.secret);
        (*guard).ok_or(WalletError::WalletLocked)
    }
}

fn decode_unused_space(
    version: FileVersion,
    decoder: &mut Decoder,
) -> Result<RecentBlocks, WalletError> {
    let start = decoder.position();
    let recent = RecentBlocks::decode_from_version(version, decoder)?;
    let consumed = decoder.position() - start;
    if consumed > UNUSED_SPACE_BYTES {
        return Err(WalletError::InvalidData(
            "read too much from the unused space region",
        ));
    }
    decoder.skip(UNUSED_SPACE_BYTES - consumed)?;
    Ok(recent)
}

fn encode_unused_space(recent: &RecentBlocks, encoder: &mut Encoder) -> Result<(), WalletError> {
    let start = encoder.len();
    recent.encode(encoder)?;
    let written = encoder.len() - start;
    if written > UNUSED_SPACE_BYTES {
        return Err(WalletError::InvalidData(
            "wrote too much to the unused space region",
        ));
    }
    encoder.write_zeros(UNUSED_SPACE_BYTES - written);
    Ok(())
}

fn write_file_atomic(path: &Path, bytes: &[u8]) -> Result<(), WalletError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    if fs::rename(&tmp, path).is_err() {
        let _ = fs::remove_file(path);
        fs::rename(&tmp, path)?;
    }
    Ok(())
}

fn trimmed_string(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
