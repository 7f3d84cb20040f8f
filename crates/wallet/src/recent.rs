//! Ring of recently seen block hashes with a versioned codec.

use btcvault_primitives::{Decoder, Encoder};

use crate::version::{FileVersion, VERS_20_LAST_BLOCKS};
use crate::WalletError;

/// Capacity of the ring.
pub const MAX_RECENT_BLOCKS: usize = 20;

/// A point on the chain: block height plus block hash.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockStamp {
    pub height: i32,
    pub hash: [u8; 32],
}

/// At most the last 20 seen block hashes, oldest first, together with the
/// height of the most recently seen block.  An empty ring is encoded as
/// `last_height == -1`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct RecentBlocks {
    pub last_height: i32,
    pub hashes: Vec<[u8; 32]>,
}

impl Default for RecentBlocks {
    fn default() -> Self {
        Self {
            last_height: -1,
            hashes: Vec::new(),
        }
    }
}

impl RecentBlocks {
    /// Files older than 1.36 stored only the single most recent block;
    /// newer files carry the counted hash list.
    pub(crate) fn decode_from_version(
        version: FileVersion,
        decoder: &mut Decoder,
    ) -> Result<Self, WalletError> {
        if !version.lt(VERS_20_LAST_BLOCKS) {
            return Self::decode(decoder);
        }

        let last_height = decoder.read_i32_le()?;
        if last_height == -1 {
            return Ok(Self {
                last_height,
                hashes: Vec::new(),
            });
        }
        let hash = decoder.read_fixed::<32>()?;
        Ok(Self {
            last_height,
            hashes: vec![hash],
        })
    }

    pub(crate) fn decode(decoder: &mut Decoder) -> Result<Self, WalletError> {
        let n_blocks = decoder.read_u32_le()? as usize;
        if n_blocks > MAX_RECENT_BLOCKS {
            return Err(WalletError::InvalidData(
                "number of last seen blocks exceeds maximum of 20",
            ));
        }
        if n_blocks == 0 {
            return Ok(Self::default());
        }

        let last_height = decoder.read_i32_le()?;
        if last_height < 0 {
            return Err(WalletError::InvalidData(
                "expected a block but specified height is negative",
            ));
        }

        let mut hashes = Vec::with_capacity(n_blocks);
        for _ in 0..n_blocks {
            hashes.push(decoder.read_fixed::<32>()?);
        }
        Ok(Self {
            last_height,
            hashes,
        })
    }

    pub(crate) fn encode(&self, encoder: &mut Encoder) -> Result<(), WalletError> {
        let n_blocks = self.hashes.len();
        if n_blocks > MAX_RECENT_BLOCKS {
            return Err(WalletError::InvalidData(
                "number of last seen blocks exceeds maximum of 20",
            ));
        }
        if n_blocks != 0 && self.last_height < 0 {
            return Err(WalletError::InvalidData(
                "block hashes are present, but the height is negative",
            ));
        }
        if n_blocks == 0 && self.last_height != -1 {
            return Err(WalletError::InvalidData(
                "no block hashes available, but height is not -1",
            ));
        }

        encoder.write_u32_le(n_blocks as u32);
        if n_blocks == 0 {
            return Ok(());
        }
        encoder.write_i32_le(self.last_height);
        for hash in &self.hashes {
            encoder.write_bytes(hash);
        }
        Ok(())
    }

    /// Marks the ring as synced with `bs`.  A rollback onto a hash the
    /// ring already holds truncates everything after it; a rollback onto
    /// an unknown hash, or any gap in heights, resets the ring.
    pub(crate) fn sync_to(&mut self, bs: &BlockStamp) {
        if bs.height < self.last_height {
            let offset =
                self.hashes.len() as i64 - 1 - (self.last_height as i64 - bs.height as i64);
            if offset >= 0
                && (offset as usize) < self.hashes.len()
                && self.hashes[offset as usize] == bs.hash
            {
                self.last_height = bs.height;
                self.hashes.truncate(offset as usize);
                return;
            }
            btcvault_log::log_debug!(
                "rollback to height {} does not match recorded hashes, resetting ring",
                bs.height
            );
            self.hashes.clear();
        }

        if bs.height != self.last_height + 1 {
            self.hashes.clear();
        }

        self.last_height = bs.height;
        if self.hashes.len() == MAX_RECENT_BLOCKS {
            self.hashes.rotate_left(1);
            self.hashes[MAX_RECENT_BLOCKS - 1] = bs.hash;
        } else {
            self.hashes.push(bs.hash);
        }
    }

    pub(crate) fn synced_with(&self) -> BlockStamp {
        match self.hashes.last() {
            Some(hash) if self.last_height != -1 => BlockStamp {
                height: self.last_height,
                hash: *hash,
            },
            _ => BlockStamp {
                height: -1,
                hash: [0u8; 32],
            },
        }
    }

    /// Iterator starting on the most recently added block, or `None` for
    /// an empty ring.
    pub(crate) fn iter(&self) -> Option<RecentBlocksIter<'_>> {
        if self.last_height == -1 || self.hashes.is_empty() {
            return None;
        }
        Some(RecentBlocksIter {
            recent: self,
            index: self.hashes.len() - 1,
        })
    }
}

/// Bidirectional cursor over the recent-block ring.
pub struct RecentBlocksIter<'a> {
    recent: &'a RecentBlocks,
    index: usize,
}

impl RecentBlocksIter<'_> {
    /// Steps towards newer blocks; false when already at the newest.
    pub fn next(&mut self) -> bool {
        if self.index + 1 >= self.recent.hashes.len() {
            return false;
        }
        self.index += 1;
        true
    }

    /// Steps towards older blocks; false when already at the oldest.
    pub fn prev(&mut self) -> bool {
        if self.index == 0 {
            return false;
        }
        self.index -= 1;
        true
    }

    pub fn block_stamp(&self) -> BlockStamp {
        BlockStamp {
            height: self.recent.last_height
                - (self.recent.hashes.len() - 1 - self.index) as i32,
            hash: self.recent.hashes[self.index],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{VERS_ARMORY, VERS_CURRENT};

    fn hash(n: u8) -> [u8; 32] {
        [n; 32]
    }

    fn stamp(height: i32, n: u8) -> BlockStamp {
        BlockStamp {
            height,
            hash: hash(n),
        }
    }

    fn synced_ring(range: std::ops::RangeInclusive<i32>) -> RecentBlocks {
        let mut recent = RecentBlocks::default();
        for height in range {
            recent.sync_to(&stamp(height, height as u8));
        }
        recent
    }

    #[test]
    fn ring_caps_at_twenty() {
        let recent = synced_ring(1..=25);
        assert_eq!(recent.last_height, 25);
        assert_eq!(recent.hashes.len(), MAX_RECENT_BLOCKS);
        assert_eq!(recent.hashes[0], hash(6));
        assert_eq!(recent.hashes[19], hash(25));
        assert_eq!(recent.synced_with(), stamp(25, 25));
    }

    #[test]
    fn gap_resets_ring() {
        let mut recent = synced_ring(1..=5);
        recent.sync_to(&stamp(9, 9));
        assert_eq!(recent.last_height, 9);
        assert_eq!(recent.hashes, vec![hash(9)]);
    }

    #[test]
    fn same_height_resets_ring() {
        let mut recent = synced_ring(1..=5);
        recent.sync_to(&stamp(5, 0x55));
        assert_eq!(recent.last_height, 5);
        assert_eq!(recent.hashes, vec![hash(0x55)]);
    }

    #[test]
    fn rollback_to_recorded_hash_truncates() {
        let mut recent = synced_ring(1..=25);
        recent.sync_to(&stamp(20, 20));
        assert_eq!(recent.last_height, 20);
        // Everything from the matched slot on is dropped, leaving the
        // hashes for heights 6 through 19.
        assert_eq!(recent.hashes.len(), 14);
        assert_eq!(recent.hashes[0], hash(6));
        assert_eq!(recent.hashes[13], hash(19));
    }

    #[test]
    fn rollback_then_divergent_hash_resets() {
        let mut recent = synced_ring(1..=25);
        recent.sync_to(&stamp(20, 20));
        recent.sync_to(&stamp(20, 0xaa));
        assert_eq!(recent.last_height, 20);
        assert_eq!(recent.hashes, vec![hash(0xaa)]);
    }

    #[test]
    fn rollback_to_unknown_hash_resets() {
        let mut recent = synced_ring(1..=25);
        recent.sync_to(&stamp(20, 0xbb));
        assert_eq!(recent.last_height, 20);
        assert_eq!(recent.hashes, vec![hash(0xbb)]);
    }

    #[test]
    fn empty_ring_reports_unsynced() {
        let recent = RecentBlocks::default();
        assert_eq!(recent.synced_with().height, -1);
        assert!(recent.iter().is_none());
    }

    #[test]
    fn iterator_walks_both_directions() {
        let recent = synced_ring(1..=5);
        let mut iter = recent.iter().expect("iterator");
        assert_eq!(iter.block_stamp(), stamp(5, 5));
        assert!(!iter.next());

        let mut seen = vec![iter.block_stamp().height];
        while iter.prev() {
            seen.push(iter.block_stamp().height);
        }
        assert_eq!(seen, vec![5, 4, 3, 2, 1]);
        assert!(!iter.prev());

        assert!(iter.next());
        assert_eq!(iter.block_stamp(), stamp(2, 2));
    }

    #[test]
    fn codec_roundtrips() {
        let recent = synced_ring(1..=7);
        let mut encoder = Encoder::new();
        recent.encode(&mut encoder).expect("encode");
        let bytes = encoder.into_inner();
        assert_eq!(bytes.len(), 4 + 4 + 7 * 32);

        let mut decoder = Decoder::new(&bytes);
        let decoded =
            RecentBlocks::decode_from_version(VERS_CURRENT, &mut decoder).expect("decode");
        assert_eq!(decoded, recent);
    }

    #[test]
    fn codec_empty_ring() {
        let recent = RecentBlocks::default();
        let mut encoder = Encoder::new();
        recent.encode(&mut encoder).expect("encode");
        let bytes = encoder.into_inner();
        assert_eq!(bytes, vec![0, 0, 0, 0]);

        let mut decoder = Decoder::new(&bytes);
        let decoded = RecentBlocks::decode(&mut decoder).expect("decode");
        assert_eq!(decoded, recent);
    }

    #[test]
    fn decode_rejects_oversized_count() {
        let mut encoder = Encoder::new();
        encoder.write_u32_le(21);
        let bytes = encoder.into_inner();
        let mut decoder = Decoder::new(&bytes);
        assert!(matches!(
            RecentBlocks::decode(&mut decoder),
            Err(WalletError::InvalidData(_))
        ));
    }

    #[test]
    fn old_version_reads_single_stamp() {
        let mut encoder = Encoder::new();
        encoder.write_i32_le(12);
        encoder.write_bytes(&hash(12));
        let bytes = encoder.into_inner();

        let mut decoder = Decoder::new(&bytes);
        let decoded = RecentBlocks::decode_from_version(VERS_ARMORY, &mut decoder).expect("decode");
        assert_eq!(decoded.last_height, 12);
        assert_eq!(decoded.hashes, vec![hash(12)]);

        let mut encoder = Encoder::new();
        encoder.write_i32_le(-1);
        let bytes = encoder.into_inner();
        let mut decoder = Decoder::new(&bytes);
        let decoded = RecentBlocks::decode_from_version(VERS_ARMORY, &mut decoder).expect("decode");
        assert_eq!(decoded, RecentBlocks::default());
    }

    #[test]
    fn encode_enforces_consistency() {
        let mut encoder = Encoder::new();
        let inconsistent = RecentBlocks {
            last_height: 5,
            hashes: Vec::new(),
        };
        assert!(inconsistent.encode(&mut encoder).is_err());

        let negative = RecentBlocks {
            last_height: -1,
            hashes: vec![hash(1)],
        };
        assert!(negative.encode(&mut encoder).is_err());
    }
}
