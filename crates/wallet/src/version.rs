//! Wallet file version and its ordering rules.

use btcvault_primitives::{DecodeError, Decoder, Encoder};

/// Latest file version written by Armory itself.
pub const VERS_ARMORY: FileVersion = FileVersion::new(1, 35, 0, 0);

/// First version that stores the 20 most recently seen block hashes
/// instead of a single synced-with block.
pub const VERS_20_LAST_BLOCKS: FileVersion = FileVersion::new(1, 36, 0, 0);

/// Version stamped on every file this crate writes.
pub const VERS_CURRENT: FileVersion = VERS_20_LAST_BLOCKS;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileVersion {
    pub major: u8,
    pub minor: u8,
    pub bugfix: u8,
    pub autoincrement: u8,
}

impl FileVersion {
    pub const fn new(major: u8, minor: u8, bugfix: u8, autoincrement: u8) -> Self {
        Self {
            major,
            minor,
            bugfix,
            autoincrement,
        }
    }

    pub fn encode(&self, encoder: &mut Encoder) {
        encoder.write_u8(self.major);
        encoder.write_u8(self.minor);
        encoder.write_u8(self.bugfix);
        encoder.write_u8(self.autoincrement);
    }

    pub fn decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let raw = decoder.read_fixed::<4>()?;
        Ok(Self {
            major: raw[0],
            minor: raw[1],
            bugfix: raw[2],
            autoincrement: raw[3],
        })
    }

    /// Whether `self` orders before `other`.
    ///
    /// Each component is checked independently: a smaller later component
    /// makes the result true even when an earlier component is greater, so
    /// e.g. `1.0.0.0` orders before `0.9.0.0`.  Wallet files in the wild
    /// were written against this ordering and it is kept bit-for-bit.
    pub fn lt(self, other: Self) -> bool {
        if self.major < other.major {
            return true;
        }
        if self.minor < other.minor {
            return true;
        }
        if self.bugfix < other.bugfix {
            return true;
        }
        self.autoincrement < other.autoincrement
    }

    /// Whether `self` orders after `other`.  Same component-independent
    /// rules as [`FileVersion::lt`].
    pub fn gt(self, other: Self) -> bool {
        if self.major > other.major {
            return true;
        }
        if self.minor > other.minor {
            return true;
        }
        if self.bugfix > other.bugfix {
            return true;
        }
        self.autoincrement > other.autoincrement
    }
}

impl std::fmt::Display for FileVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.bugfix != 0 || self.autoincrement != 0 {
            write!(f, ".{}", self.bugfix)?;
        }
        if self.autoincrement != 0 {
            write!(f, ".{}", self.autoincrement)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_roundtrips() {
        let mut encoder = Encoder::new();
        VERS_CURRENT.encode(&mut encoder);
        let bytes = encoder.into_inner();
        assert_eq!(bytes, vec![1, 36, 0, 0]);

        let mut decoder = Decoder::new(&bytes);
        let decoded = FileVersion::decode(&mut decoder).unwrap();
        assert_eq!(decoded, VERS_CURRENT);
    }

    #[test]
    fn ordering_checks_components_independently() {
        assert!(VERS_ARMORY.lt(VERS_20_LAST_BLOCKS));
        assert!(!VERS_20_LAST_BLOCKS.lt(VERS_ARMORY));
        assert!(VERS_20_LAST_BLOCKS.gt(VERS_ARMORY));

        // A larger major does not shortcut the later components.
        let a = FileVersion::new(1, 0, 0, 0);
        let b = FileVersion::new(0, 9, 0, 0);
        assert!(a.lt(b));
        assert!(b.lt(a));
    }

    #[test]
    fn display_suppresses_trailing_zeros() {
        assert_eq!(VERS_CURRENT.to_string(), "1.36");
        assert_eq!(FileVersion::new(1, 2, 3, 0).to_string(), "1.2.3");
        assert_eq!(FileVersion::new(1, 2, 0, 4).to_string(), "1.2.0.4");
    }
}
