//! Tagged variable-length entries appended after the fixed wallet header.

use btcvault_primitives::{Decoder, Encoder};

use crate::address::BtcAddress;
use crate::WalletError;

/// Largest comment representable with a u16 length prefix.
pub(crate) const MAX_COMMENT_LEN: usize = (1 << 16) - 1;

const ADDR_HEADER: u8 = 0x00;
const ADDR_COMMENT_HEADER: u8 = 0x01;
const TX_COMMENT_HEADER: u8 = 0x02;
const DELETED_HEADER: u8 = 0x04;

pub(crate) enum Entry {
    Addr(AddrEntry),
    AddrComment(AddrCommentEntry),
    TxComment(TxCommentEntry),
}

pub(crate) struct AddrEntry {
    pub addr: BtcAddress,
}

pub(crate) struct AddrCommentEntry {
    pub pub_key_hash: [u8; 20],
    pub comment: Vec<u8>,
}

pub(crate) struct TxCommentEntry {
    pub tx_hash: [u8; 32],
    pub comment: Vec<u8>,
}

/// Reads tagged entries until the end of input.  End of stream at an entry
/// boundary is normal termination; running out mid-entry is not.
pub(crate) fn read_entries(decoder: &mut Decoder) -> Result<Vec<Entry>, WalletError> {
    let mut entries = Vec::new();
    while !decoder.is_empty() {
        let header = decoder.read_u8()?;
        match header {
            ADDR_HEADER => {
                let pub_key_hash = decoder.read_fixed::<20>()?;
                let addr = BtcAddress::decode(decoder)?;
                if pub_key_hash != addr.pub_key_hash {
                    return Err(WalletError::MalformedEntry);
                }
                entries.push(Entry::Addr(AddrEntry { addr }));
            }
            ADDR_COMMENT_HEADER => {
                let pub_key_hash = decoder.read_fixed::<20>()?;
                let len = decoder.read_u16_le()? as usize;
                let comment = decoder.read_bytes(len)?;
                entries.push(Entry::AddrComment(AddrCommentEntry {
                    pub_key_hash,
                    comment,
                }));
            }
            TX_COMMENT_HEADER => {
                let tx_hash = decoder.read_fixed::<32>()?;
                let len = decoder.read_u16_le()? as usize;
                let comment = decoder.read_bytes(len)?;
                entries.push(Entry::TxComment(TxCommentEntry { tx_hash, comment }));
            }
            DELETED_HEADER => {
                // Tombstones carry an opaque payload that still has to be
                // consumed to keep the stream aligned.
                let len = decoder.read_u16_le()? as usize;
                decoder.skip(len)?;
            }
            _ => return Err(WalletError::MalformedEntry),
        }
    }
    Ok(entries)
}

pub(crate) fn encode_addr_entry(
    encoder: &mut Encoder,
    addr: &BtcAddress,
) -> Result<(), WalletError> {
    encoder.write_u8(ADDR_HEADER);
    encoder.write_bytes(&addr.pub_key_hash);
    addr.encode(encoder)
}

pub(crate) fn encode_addr_comment_entry(
    encoder: &mut Encoder,
    pub_key_hash: &[u8; 20],
    comment: &[u8],
) -> Result<(), WalletError> {
    if comment.len() > MAX_COMMENT_LEN {
        return Err(WalletError::MalformedEntry);
    }
    encoder.write_u8(ADDR_COMMENT_HEADER);
    encoder.write_bytes(pub_key_hash);
    encoder.write_u16_le(comment.len() as u16);
    encoder.write_bytes(comment);
    Ok(())
}

pub(crate) fn encode_tx_comment_entry(
    encoder: &mut Encoder,
    tx_hash: &[u8; 32],
    comment: &[u8],
) -> Result<(), WalletError> {
    if comment.len() > MAX_COMMENT_LEN {
        return Err(WalletError::MalformedEntry);
    }
    encoder.write_u8(TX_COMMENT_HEADER);
    encoder.write_bytes(tx_hash);
    encoder.write_u16_le(comment.len() as u16);
    encoder.write_bytes(comment);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use btcvault_primitives::DecodeError;

    #[test]
    fn comment_entries_roundtrip() {
        let mut encoder = Encoder::new();
        encode_addr_comment_entry(&mut encoder, &[0x0au8; 20], b"savings").expect("addr comment");
        encode_tx_comment_entry(&mut encoder, &[0x0bu8; 32], b"rent").expect("tx comment");
        let bytes = encoder.into_inner();

        let mut decoder = Decoder::new(&bytes);
        let entries = read_entries(&mut decoder).expect("read entries");
        assert_eq!(entries.len(), 2);
        match &entries[0] {
            Entry::AddrComment(entry) => {
                assert_eq!(entry.pub_key_hash, [0x0au8; 20]);
                assert_eq!(entry.comment, b"savings");
            }
            _ => panic!("expected an address comment entry"),
        }
        match &entries[1] {
            Entry::TxComment(entry) => {
                assert_eq!(entry.tx_hash, [0x0bu8; 32]);
                assert_eq!(entry.comment, b"rent");
            }
            _ => panic!("expected a tx comment entry"),
        }
    }

    #[test]
    fn deleted_entries_are_skipped() {
        let mut encoder = Encoder::new();
        encoder.write_u8(DELETED_HEADER);
        encoder.write_u16_le(3);
        encoder.write_bytes(&[0xde, 0xad, 0x00]);
        encode_tx_comment_entry(&mut encoder, &[0x0cu8; 32], b"after").expect("tx comment");
        let bytes = encoder.into_inner();

        let mut decoder = Decoder::new(&bytes);
        let entries = read_entries(&mut decoder).expect("read entries");
        assert_eq!(entries.len(), 1);
        assert!(matches!(&entries[0], Entry::TxComment(e) if e.comment == b"after"));
    }

    #[test]
    fn unknown_header_is_malformed() {
        let bytes = [0x07u8];
        let mut decoder = Decoder::new(&bytes);
        assert!(matches!(
            read_entries(&mut decoder),
            Err(WalletError::MalformedEntry)
        ));
    }

    #[test]
    fn truncated_entry_is_an_error() {
        let mut encoder = Encoder::new();
        encode_tx_comment_entry(&mut encoder, &[0x0du8; 32], b"cut short").expect("tx comment");
        let mut bytes = encoder.into_inner();
        bytes.truncate(bytes.len() - 4);

        let mut decoder = Decoder::new(&bytes);
        assert!(matches!(
            read_entries(&mut decoder),
            Err(WalletError::Decode(DecodeError::UnexpectedEof))
        ));
    }

    #[test]
    fn oversized_comment_is_rejected() {
        let long = vec![0u8; MAX_COMMENT_LEN + 1];
        let mut encoder = Encoder::new();
        assert!(matches!(
            encode_addr_comment_entry(&mut encoder, &[0u8; 20], &long),
            Err(WalletError::MalformedEntry)
        ));
        assert!(matches!(
            encode_tx_comment_entry(&mut encoder, &[0u8; 32], &long),
            Err(WalletError::MalformedEntry)
        ));
    }
}
