//! Memory-hard passphrase key derivation in the style of scrypt's ROMix,
//! with self-calibrating cost parameters.

use std::time::Instant;

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use btcvault_primitives::{sha512, wallet_checksum, Decoder, Encoder};

use crate::WalletError;

/// Length in bytes of the derived AES key.
pub const KDF_OUTPUT_BYTES: usize = 32;

/// Target wall-clock seconds for a full derivation when calibrating.
pub const DEFAULT_KDF_COMPUTE_TIME: f64 = 0.25;

/// Ceiling on the lookup-table size when calibrating.
pub const DEFAULT_KDF_MAX_MEM: u64 = 32 * 1024 * 1024;

const SHA512_SIZE: usize = 64;

/// Serialized size of the parameter block, padding included.
const KDF_REGION_BYTES: usize = 256;

/// Checksummed payload: mem (8) + n_iter (4) + salt (32).
const KDF_CHECKED_BYTES: usize = 44;

/// Largest lookup table accepted from a wallet file, so a hostile header
/// cannot force an arbitrarily large allocation.
const MAX_FILE_MEM: u64 = 1 << 30;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KdfParameters {
    mem: u64,
    n_iter: u32,
    salt: [u8; 32],
}

impl KdfParameters {
    pub fn new(mem: u64, n_iter: u32, salt: [u8; 32]) -> Result<Self, WalletError> {
        if mem < 1024 || mem > MAX_FILE_MEM || mem % SHA512_SIZE as u64 != 0 {
            return Err(WalletError::InvalidData(
                "kdf memory requirement out of range",
            ));
        }
        if n_iter == 0 {
            return Err(WalletError::InvalidData(
                "kdf iteration count must be nonzero",
            ));
        }
        Ok(Self { mem, n_iter, salt })
    }

    pub fn mem(&self) -> u64 {
        self.mem
    }

    pub fn n_iter(&self) -> u32 {
        self.n_iter
    }

    pub fn salt(&self) -> &[u8; 32] {
        &self.salt
    }

    pub fn encode(&self, encoder: &mut Encoder) {
        let mut checked = Vec::with_capacity(KDF_CHECKED_BYTES);
        checked.extend_from_slice(&self.mem.to_le_bytes());
        checked.extend_from_slice(&self.n_iter.to_le_bytes());
        checked.extend_from_slice(&self.salt);
        encoder.write_bytes(&checked);
        encoder.write_u32_le(wallet_checksum(&checked));
        encoder.write_zeros(KDF_REGION_BYTES - KDF_CHECKED_BYTES - 4);
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self, WalletError> {
        let checked = decoder.read_bytes(KDF_CHECKED_BYTES)?;
        let chk = decoder.read_u32_le()?;
        decoder.skip(KDF_REGION_BYTES - KDF_CHECKED_BYTES - 4)?;
        if wallet_checksum(&checked) != chk {
            return Err(WalletError::ChecksumMismatch);
        }

        let mut inner = Decoder::new(&checked);
        let mem = inner.read_u64_le()?;
        let n_iter = inner.read_u32_le()?;
        let salt = inner.read_fixed::<32>()?;
        Self::new(mem, n_iter, salt)
    }
}

/// One ROMix round: fill a `mem`-byte table with chained SHA-512 blocks,
/// then mix the tail block against data-dependent table lookups.
fn key_one_iter(passphrase: &[u8], salt: &[u8; 32], mem: u64) -> [u8; KDF_OUTPUT_BYTES] {
    let mem = mem as usize;
    let mut salted = Vec::with_capacity(passphrase.len() + salt.len());
    salted.extend_from_slice(passphrase);
    salted.extend_from_slice(salt);
    let seed = sha512(&salted);
    salted.zeroize();

    let mut lut = vec![0u8; mem];
    lut[..SHA512_SIZE].copy_from_slice(&seed);
    let mut offset = 0;
    while offset + SHA512_SIZE < mem {
        let hash = sha512(&lut[offset..offset + SHA512_SIZE]);
        lut[offset + SHA512_SIZE..offset + 2 * SHA512_SIZE].copy_from_slice(&hash);
        offset += SHA512_SIZE;
    }

    // x aliases the final table block for the whole mixing loop.
    let x_start = mem - SHA512_SIZE;
    let seq_ct = (mem / SHA512_SIZE) as u32;
    let n_lookups = seq_ct / 2;
    for _ in 0..n_lookups {
        // Armory reads the index bytes without fixing an endianness; LE is
        // assumed here, as the files in circulation were produced on LE
        // machines.
        let new_idx = u32::from_le_bytes([lut[mem - 4], lut[mem - 3], lut[mem - 2], lut[mem - 1]])
            % seq_ct;
        let v_idx = new_idx as usize * SHA512_SIZE;
        let mut v = [0u8; SHA512_SIZE];
        v.copy_from_slice(&lut[v_idx..v_idx + SHA512_SIZE]);
        for j in 0..SHA512_SIZE {
            lut[x_start + j] ^= v[j];
        }
        v.zeroize();
        let hash = sha512(&lut[x_start..]);
        lut[x_start..].copy_from_slice(&hash);
    }

    let mut out = [0u8; KDF_OUTPUT_BYTES];
    out.copy_from_slice(&lut[x_start..x_start + KDF_OUTPUT_BYTES]);
    // The table is a function of the passphrase and must not outlive the
    // call.
    lut.zeroize();
    out
}

/// Derives the 32-byte AES key for a passphrase, folding [`key_one_iter`]
/// over itself once per configured iteration.
pub fn derive_key(passphrase: &[u8], params: &KdfParameters) -> [u8; KDF_OUTPUT_BYTES] {
    let mut master = key_one_iter(passphrase, &params.salt, params.mem);
    for _ in 1..params.n_iter {
        let next = key_one_iter(&master, &params.salt, params.mem);
        master.zeroize();
        master = next;
    }
    master
}

/// Picks KDF parameters so that a full derivation takes roughly
/// `target_secs` on this machine while allocating at most `max_mem` bytes.
/// Best effort only; the measured machine speed decides the outcome.
pub fn compute_kdf_parameters(
    target_secs: f64,
    max_mem: u64,
) -> Result<KdfParameters, WalletError> {
    let mut salt = [0u8; 32];
    OsRng.fill_bytes(&mut salt);

    let test_key: &[u8] = b"This is an example key to test KDF iteration speed";

    let mut mem = 1024u64;
    let mut approx_secs = 0f64;
    while approx_secs <= target_secs / 4.0 && mem < max_mem {
        mem *= 2;
        let before = Instant::now();
        let mut out = key_one_iter(test_key, &salt, mem);
        approx_secs = before.elapsed().as_secs_f64();
        out.zeroize();
    }

    let mut n_iter = 1u32;
    let mut all_iters_secs = 0f64;
    // The 0.02s floor on the iteration search is inherited from Armory.
    while all_iters_secs < 0.02 {
        n_iter *= 2;
        let before = Instant::now();
        for _ in 0..n_iter {
            let mut out = key_one_iter(test_key, &salt, mem);
            out.zeroize();
        }
        all_iters_secs = before.elapsed().as_secs_f64();
    }

    btcvault_log::log_debug!(
        "kdf calibration settled on mem={mem} n_iter={n_iter} ({all_iters_secs:.3}s measured)"
    );
    KdfParameters::new(mem, n_iter, salt)
}
