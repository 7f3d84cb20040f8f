//! Base58Check address and WIF encodings.

use crate::hash::sha256d;
use crate::network::Network;

#[derive(Debug)]
pub enum AddressError {
    InvalidLength,
    InvalidCharacter,
    InvalidChecksum,
    UnknownPrefix,
}

/// Encodes a 20-byte pubkey hash as a pay-to-pubkey-hash address.
pub fn pubkey_hash_to_address(hash: &[u8; 20], network: Network) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(network.p2pkh_version());
    payload.extend_from_slice(hash);
    base58check_encode(&payload)
}

/// Decodes a pay-to-pubkey-hash address back into its 20-byte hash.
pub fn address_to_pubkey_hash(address: &str, network: Network) -> Result<[u8; 20], AddressError> {
    let payload = base58check_decode(address)?;
    if payload.is_empty() {
        return Err(AddressError::InvalidLength);
    }
    if payload[0] != network.p2pkh_version() {
        return Err(AddressError::UnknownPrefix);
    }
    if payload.len() != 21 {
        return Err(AddressError::InvalidLength);
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..21]);
    Ok(hash)
}

pub fn secret_key_to_wif(secret: &[u8; 32], network: Network, compressed: bool) -> String {
    let mut payload = Vec::with_capacity(1 + secret.len() + usize::from(compressed));
    payload.push(network.wif_prefix());
    payload.extend_from_slice(secret);
    if compressed {
        payload.push(0x01);
    }
    base58check_encode(&payload)
}

pub fn wif_to_secret_key(wif: &str, network: Network) -> Result<([u8; 32], bool), AddressError> {
    let payload = base58check_decode(wif)?;
    if payload.is_empty() {
        return Err(AddressError::InvalidLength);
    }
    if payload[0] != network.wif_prefix() {
        return Err(AddressError::UnknownPrefix);
    }

    if payload.len() == 33 {
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&payload[1..33]);
        return Ok((secret, false));
    }

    if payload.len() == 34 && payload[33] == 0x01 {
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&payload[1..33]);
        return Ok((secret, true));
    }

    Err(AddressError::InvalidLength)
}

fn base58check_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    let bytes = base58_decode(input)?;
    if bytes.len() < 4 {
        return Err(AddressError::InvalidLength);
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - 4);
    let digest = sha256d(payload);
    if checksum != &digest[..4] {
        return Err(AddressError::InvalidChecksum);
    }
    Ok(payload.to_vec())
}

fn base58check_encode(payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    let checksum = sha256d(payload);
    data.extend_from_slice(&checksum[..4]);
    base58_encode(&data)
}

fn base58_decode(input: &str) -> Result<Vec<u8>, AddressError> {
    if input.is_empty() {
        return Err(AddressError::InvalidLength);
    }
    let mut bytes = Vec::new();
    for ch in input.bytes() {
        let value = base58_value(ch).ok_or(AddressError::InvalidCharacter)? as u32;
        let mut carry = value;
        for byte in bytes.iter_mut().rev() {
            let val = (*byte as u32) * 58 + carry;
            *byte = (val & 0xff) as u8;
            carry = val >> 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let leading_zeros = input.bytes().take_while(|b| *b == b'1').count();
    let mut out = vec![0u8; leading_zeros];
    out.extend_from_slice(&bytes);
    Ok(out)
}

fn base58_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    if data.is_empty() {
        return String::new();
    }
    let mut digits = vec![0u8];
    for byte in data {
        let mut carry = *byte as u32;
        for digit in digits.iter_mut().rev() {
            let value = (*digit as u32) * 256 + carry;
            *digit = (value % 58) as u8;
            carry = value / 58;
        }
        while carry > 0 {
            digits.insert(0, (carry % 58) as u8);
            carry /= 58;
        }
    }
    let leading_zeros = data.iter().take_while(|b| **b == 0u8).count();
    let mut out = String::with_capacity(leading_zeros + digits.len());
    for _ in 0..leading_zeros {
        out.push('1');
    }
    for digit in digits {
        out.push(ALPHABET[digit as usize] as char);
    }
    out
}

fn base58_value(byte: u8) -> Option<u8> {
    const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    ALPHABET
        .iter()
        .position(|value| *value == byte)
        .map(|pos| pos as u8)
}
