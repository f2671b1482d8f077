//! Minimal ABI plumbing: 4-byte selectors derived from signature strings
//! at call time, plus 32-byte word packing and unpacking. The handful of
//! fixed-layout views and calls this toolkit touches do not justify
//! generated bindings.

use alloy::primitives::{keccak256, Address, Bytes, U256};
use anyhow::{bail, Result};

/// One ABI word.
pub type Word = [u8; 32];

/// First four bytes of the keccak-256 of the canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Build calldata: selector followed by the argument words.
pub fn encode_call(signature: &str, args: &[Word]) -> Bytes {
    let mut data = Vec::with_capacity(4 + args.len() * 32);
    data.extend_from_slice(&selector(signature));
    for word in args {
        data.extend_from_slice(word);
    }
    Bytes::from(data)
}

pub fn word_from_u256(value: U256) -> Word {
    value.to_be_bytes::<32>()
}

pub fn word_from_u64(value: u64) -> Word {
    word_from_u256(U256::from(value))
}

pub fn word_from_address(address: Address) -> Word {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_slice());
    word
}

fn word_at(data: &[u8], index: usize) -> Result<&[u8]> {
    let start = index * 32;
    let end = start + 32;
    if data.len() < end {
        bail!(
            "return data too short: {} bytes, wanted word {}",
            data.len(),
            index
        );
    }
    Ok(&data[start..end])
}

pub fn u256_at(data: &[u8], index: usize) -> Result<U256> {
    Ok(U256::from_be_slice(word_at(data, index)?))
}

/// Decode a word expected to fit in u64 (timestamps, durations). Values
/// beyond u64 saturate rather than abort, so a corrupted duration still
/// surfaces as an anomaly instead of a decode error.
pub fn u64_at(data: &[u8], index: usize) -> Result<u64> {
    let value = u256_at(data, index)?;
    Ok(u64::try_from(value).unwrap_or(u64::MAX))
}

pub fn address_at(data: &[u8], index: usize) -> Result<Address> {
    let word = word_at(data, index)?;
    Ok(Address::from_slice(&word[12..]))
}

pub fn bool_at(data: &[u8], index: usize) -> Result<bool> {
    let word = word_at(data, index)?;
    Ok(word[31] != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_known_erc20_values() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(selector("approve(address,uint256)"), [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(selector("allowance(address,address)"), [0xdd, 0x62, 0xed, 0x3e]);
        assert_eq!(selector("owner()"), [0x8d, 0xa5, 0xcb, 0x5b]);
    }

    #[test]
    fn encode_call_packs_selector_and_words() {
        let data = encode_call("balanceOf(address)", &[word_from_address(Address::ZERO)]);
        assert_eq!(data.len(), 36);
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert!(data[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn words_round_trip() {
        let value = U256::from(31_536_000u64);
        let word = word_from_u256(value);
        assert_eq!(u256_at(&word, 0).unwrap(), value);
        assert_eq!(u64_at(&word, 0).unwrap(), 31_536_000);

        let address: Address = "0xb225C29Da2CaB86991b7e0651c63f0fD5C16613C"
            .parse()
            .unwrap();
        let word = word_from_address(address);
        assert_eq!(address_at(&word, 0).unwrap(), address);
    }

    #[test]
    fn u64_saturates_on_oversized_words() {
        let word = word_from_u256(U256::MAX);
        assert_eq!(u64_at(&word, 0).unwrap(), u64::MAX);
    }

    #[test]
    fn decode_rejects_short_data() {
        let data = [0u8; 40];
        assert!(u256_at(&data, 0).is_ok());
        assert!(u256_at(&data, 1).is_err());
        assert!(bool_at(&data, 2).is_err());
    }

    #[test]
    fn bool_decoding() {
        let mut word = [0u8; 32];
        assert!(!bool_at(&word, 0).unwrap());
        word[31] = 1;
        assert!(bool_at(&word, 0).unwrap());
    }
}
