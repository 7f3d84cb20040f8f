use ripemd::{Digest as RipemdDigest, Ripemd160};
use sha2::{Sha256, Sha512};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

pub fn sha512(data: &[u8]) -> [u8; 64] {
    let digest = Sha512::digest(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = sha256(data);
    let digest = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

/// Field checksum used throughout the wallet file: the first four bytes of
/// the double-SHA256 digest, read little-endian.
pub fn wallet_checksum(data: &[u8]) -> u32 {
    let digest = sha256d(data);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256d_empty_vector() {
        let digest = sha256d(b"");
        assert_eq!(
            digest[..4],
            [0x5d, 0xf6, 0xe0, 0xe2],
            "double-SHA256 of empty input should match the known vector"
        );
    }

    #[test]
    fn wallet_checksum_is_le_prefix_of_sha256d() {
        assert_eq!(wallet_checksum(b""), 0xe2e0f65d);
        let digest = sha256d(b"checksum input");
        let expected = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        assert_eq!(wallet_checksum(b"checksum input"), expected);
    }

    #[test]
    fn hash160_empty_vector() {
        let digest = hash160(b"");
        let expected = [
            0xb4, 0x72, 0xa2, 0x66, 0xd0, 0xbd, 0x89, 0xc1, 0x37, 0x06, 0xa4, 0x13, 0x2c, 0xcf,
            0xb1, 0x6f, 0x7c, 0x3b, 0x9f, 0xcb,
        ];
        assert_eq!(digest, expected);
    }
}
