use btcvault_primitives::{
    address_to_pubkey_hash, pubkey_hash_to_address, secret_key_to_wif, wif_to_secret_key,
    AddressError, Network,
};

#[test]
fn wif_roundtrips_mainnet() {
    let secret = [0x11u8; 32];

    let wif_uncompressed = secret_key_to_wif(&secret, Network::Mainnet, false);
    let (decoded, compressed) =
        wif_to_secret_key(&wif_uncompressed, Network::Mainnet).expect("decode mainnet wif");
    assert_eq!(decoded, secret);
    assert!(!compressed);

    let wif_compressed = secret_key_to_wif(&secret, Network::Mainnet, true);
    let (decoded, compressed) =
        wif_to_secret_key(&wif_compressed, Network::Mainnet).expect("decode mainnet wif");
    assert_eq!(decoded, secret);
    assert!(compressed);
}

#[test]
fn wif_roundtrips_testnet() {
    let secret = [0x22u8; 32];
    let wif = secret_key_to_wif(&secret, Network::Testnet3, true);
    let (decoded, compressed) = wif_to_secret_key(&wif, Network::Testnet3).expect("decode");
    assert_eq!(decoded, secret);
    assert!(compressed);
}

#[test]
fn wif_rejects_wrong_network() {
    let secret = [0x33u8; 32];
    let wif = secret_key_to_wif(&secret, Network::Mainnet, false);
    let err = wif_to_secret_key(&wif, Network::Testnet3).unwrap_err();
    assert!(matches!(err, AddressError::UnknownPrefix));
}

#[test]
fn address_roundtrips() {
    let hash = [0x5au8; 20];
    for net in [Network::Mainnet, Network::Testnet3] {
        let address = pubkey_hash_to_address(&hash, net);
        let decoded = address_to_pubkey_hash(&address, net).expect("decode address");
        assert_eq!(decoded, hash);
    }
}

#[test]
fn zero_hash_mainnet_address_vector() {
    // 0x00 version + twenty zero bytes is the well-known burn address.
    let address = pubkey_hash_to_address(&[0u8; 20], Network::Mainnet);
    assert_eq!(address, "1111111111111111111114oLvT2");
}

#[test]
fn address_rejects_wrong_network() {
    let address = pubkey_hash_to_address(&[0x77u8; 20], Network::Mainnet);
    let err = address_to_pubkey_hash(&address, Network::Testnet3).unwrap_err();
    assert!(matches!(err, AddressError::UnknownPrefix));
}

#[test]
fn address_rejects_corruption() {
    let mut address = pubkey_hash_to_address(&[0x42u8; 20], Network::Mainnet);
    // Swap a character in the checksum region.
    let last = address.pop().expect("nonempty address");
    let replacement = if last == '2' { '3' } else { '2' };
    address.push(replacement);
    let err = address_to_pubkey_hash(&address, Network::Mainnet).unwrap_err();
    assert!(matches!(err, AddressError::InvalidChecksum));

    let err = address_to_pubkey_hash("not-base58-0OIl", Network::Mainnet).unwrap_err();
    assert!(matches!(err, AddressError::InvalidCharacter));
}
