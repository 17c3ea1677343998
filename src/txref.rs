//! TxRef encoding and decoding.
//!
//! A TxRef is a bech32 string that pins a transaction by its confirming
//! block height and its position inside that block, optionally extended
//! with an output index. The suffix of every DID:MDIP identifier is a TxRef
//! with its `tx1:` / `txtest1:` prefix removed.
//!
//! The bit layout is fixed and shared with every DID already issued, so the
//! group widths and magic values below must never change.

use std::fmt;
use std::str::FromStr;

use bech32::{u5, Variant};
use serde::{Deserialize, Serialize};

use crate::error::ResolutionError;

/// Largest block height representable in a TxRef (24 bits)
pub const MAX_BLOCK_HEIGHT: u32 = 0xFF_FFFF;
/// Largest transaction position representable in a TxRef (15 bits)
pub const MAX_TX_POSITION: u32 = 0x7FFF;
/// Largest output index representable in an extended TxRef (15 bits)
pub const MAX_UTXO_INDEX: u32 = 0x7FFF;

const STANDARD_GROUPS: usize = 9;
const EXTENDED_GROUPS: usize = 12;

/// The network a TxRef points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Mainnet,
    Testnet,
}

impl Chain {
    /// Bech32 human readable part used for this chain
    pub fn hrp(&self) -> &'static str {
        match self {
            Chain::Mainnet => "tx",
            Chain::Testnet => "txtest",
        }
    }

    fn from_hrp(hrp: &str) -> Option<Self> {
        match hrp {
            "tx" => Some(Chain::Mainnet),
            "txtest" => Some(Chain::Testnet),
            _ => None,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Mainnet => f.write_str("mainnet"),
            Chain::Testnet => f.write_str("testnet"),
        }
    }
}

impl FromStr for Chain {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Chain::Mainnet),
            "testnet" | "test" => Ok(Chain::Testnet),
            other => Err(ResolutionError::InvalidConfig(format!("chain '{other}'"))),
        }
    }
}

/// First 5-bit group of every TxRef
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Magic {
    Mainnet = 0x03,
    MainnetExtended = 0x04,
    Testnet = 0x06,
    TestnetExtended = 0x07,
}

impl Magic {
    fn new(chain: Chain, extended: bool) -> Self {
        match (chain, extended) {
            (Chain::Mainnet, false) => Magic::Mainnet,
            (Chain::Mainnet, true) => Magic::MainnetExtended,
            (Chain::Testnet, false) => Magic::Testnet,
            (Chain::Testnet, true) => Magic::TestnetExtended,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x03 => Some(Magic::Mainnet),
            0x04 => Some(Magic::MainnetExtended),
            0x06 => Some(Magic::Testnet),
            0x07 => Some(Magic::TestnetExtended),
            _ => None,
        }
    }

    fn chain(self) -> Chain {
        match self {
            Magic::Mainnet | Magic::MainnetExtended => Chain::Mainnet,
            Magic::Testnet | Magic::TestnetExtended => Chain::Testnet,
        }
    }

    fn is_extended(self) -> bool {
        matches!(self, Magic::MainnetExtended | Magic::TestnetExtended)
    }
}

/// A decoded transaction reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TxRef {
    /// Block height and transaction position only
    #[serde(rename_all = "camelCase")]
    Standard {
        chain: Chain,
        block_height: u32,
        tx_position: u32,
    },
    /// Additionally pins one output of the transaction
    #[serde(rename_all = "camelCase")]
    Extended {
        chain: Chain,
        block_height: u32,
        tx_position: u32,
        utxo_index: u32,
    },
}

impl TxRef {
    /// Builds a TxRef, rejecting values that do not fit the bit layout
    pub fn new(
        chain: Chain,
        block_height: u32,
        tx_position: u32,
        utxo_index: Option<u32>,
    ) -> Result<Self, ResolutionError> {
        let txref = match utxo_index {
            None => TxRef::Standard { chain, block_height, tx_position },
            Some(utxo_index) => TxRef::Extended { chain, block_height, tx_position, utxo_index },
        };
        txref.check_bounds()?;
        Ok(txref)
    }

    pub fn chain(&self) -> Chain {
        match self {
            TxRef::Standard { chain, .. } | TxRef::Extended { chain, .. } => *chain,
        }
    }

    pub fn block_height(&self) -> u32 {
        match self {
            TxRef::Standard { block_height, .. } | TxRef::Extended { block_height, .. } => {
                *block_height
            }
        }
    }

    pub fn tx_position(&self) -> u32 {
        match self {
            TxRef::Standard { tx_position, .. } | TxRef::Extended { tx_position, .. } => {
                *tx_position
            }
        }
    }

    pub fn utxo_index(&self) -> Option<u32> {
        match self {
            TxRef::Standard { .. } => None,
            TxRef::Extended { utxo_index, .. } => Some(*utxo_index),
        }
    }

    pub fn is_extended(&self) -> bool {
        matches!(self, TxRef::Extended { .. })
    }

    fn check_bounds(&self) -> Result<(), ResolutionError> {
        check_field("block height", self.block_height(), MAX_BLOCK_HEIGHT)?;
        check_field("tx position", self.tx_position(), MAX_TX_POSITION)?;
        if let Some(utxo_index) = self.utxo_index() {
            check_field("utxo index", utxo_index, MAX_UTXO_INDEX)?;
        }
        Ok(())
    }

    /// Packs the fields into 5-bit groups
    fn to_groups(&self) -> Result<Vec<u5>, ResolutionError> {
        self.check_bounds()?;

        let magic = Magic::new(self.chain(), self.is_extended());
        let len = if self.is_extended() { EXTENDED_GROUPS } else { STANDARD_GROUPS };
        let mut groups = vec![0u8; len];

        groups[0] = magic as u8;

        // Bit 0 of group 1 is the version bit and stays clear.
        let height = self.block_height();
        groups[1] = ((height & 0xF) << 1) as u8;
        groups[2] = ((height >> 4) & 0x1F) as u8;
        groups[3] = ((height >> 9) & 0x1F) as u8;
        groups[4] = ((height >> 14) & 0x1F) as u8;
        groups[5] = ((height >> 19) & 0x1F) as u8;

        pack_15(&mut groups[6..9], self.tx_position());
        if let Some(utxo_index) = self.utxo_index() {
            pack_15(&mut groups[9..12], utxo_index);
        }

        groups
            .into_iter()
            .map(|g| u5::try_from_u8(g).map_err(|e| ResolutionError::DecodeError(e.to_string())))
            .collect()
    }

    fn from_groups(chain: Chain, groups: &[u8]) -> Result<Self, ResolutionError> {
        let magic = Magic::from_u8(groups[0]).ok_or_else(|| {
            ResolutionError::DecodeError(format!("unknown magic {:#04x}", groups[0]))
        })?;

        let extended = match groups.len() {
            STANDARD_GROUPS => false,
            EXTENDED_GROUPS => true,
            n => return Err(ResolutionError::DecodeError(format!("unexpected length {n}"))),
        };
        if magic.is_extended() != extended {
            return Err(ResolutionError::DecodeError(
                "magic does not match payload length".to_string(),
            ));
        }
        if magic.chain() != chain {
            return Err(ResolutionError::DecodeError(format!(
                "prefix '{}' does not match {} magic",
                chain.hrp(),
                magic.chain()
            )));
        }

        let g = |i: usize| u32::from(groups[i]);
        let block_height = (g(1) >> 1) | (g(2) << 4) | (g(3) << 9) | (g(4) << 14) | (g(5) << 19);
        let tx_position = unpack_15(&groups[6..9]);

        Ok(if extended {
            TxRef::Extended {
                chain,
                block_height,
                tx_position,
                utxo_index: unpack_15(&groups[9..12]),
            }
        } else {
            TxRef::Standard { chain, block_height, tx_position }
        })
    }

    /// Encodes to the grouped, human-shareable form, e.g. `txtest1:xj83-crjq-q8ff-8g4`
    pub fn encode(&self) -> Result<String, ResolutionError> {
        let hrp = self.chain().hrp();
        let raw = bech32::encode(hrp, self.to_groups()?, Variant::Bech32)
            .map_err(|e| ResolutionError::DecodeError(e.to_string()))?;
        Ok(group_for_humans(&raw, hrp.len() + 1))
    }

    /// The grouped payload without its `prefix1:` head, as embedded in DIDs
    pub fn suffix(&self) -> Result<String, ResolutionError> {
        let encoded = self.encode()?;
        match encoded.split_once(':') {
            Some((_, suffix)) => Ok(suffix.to_string()),
            None => Err(ResolutionError::DecodeError(encoded)),
        }
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode().map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl FromStr for TxRef {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

/// Encodes a TxRef from its raw fields
pub fn encode(
    chain: Chain,
    block_height: u32,
    tx_position: u32,
    utxo_index: Option<u32>,
) -> Result<String, ResolutionError> {
    TxRef::new(chain, block_height, tx_position, utxo_index)?.encode()
}

/// Decodes a TxRef, with or without its `-` / `:` separators
pub fn decode(reference: &str) -> Result<TxRef, ResolutionError> {
    let stripped: String = reference
        .trim()
        .chars()
        .filter(|c| *c != '-' && *c != ':')
        .collect();

    let (hrp, data, variant) = bech32::decode(&stripped)
        .map_err(|e| ResolutionError::DecodeError(format!("{reference}: {e}")))?;
    if variant != Variant::Bech32 {
        return Err(ResolutionError::DecodeError(format!(
            "{reference}: bech32m checksum is not a TxRef"
        )));
    }

    let chain = Chain::from_hrp(&hrp).ok_or_else(|| {
        ResolutionError::DecodeError(format!("{reference}: unknown prefix '{hrp}'"))
    })?;
    let groups: Vec<u8> = data.iter().map(|g| g.to_u8()).collect();
    if groups.len() != STANDARD_GROUPS && groups.len() != EXTENDED_GROUPS {
        return Err(ResolutionError::DecodeError(format!(
            "{reference}: unexpected length {}",
            groups.len()
        )));
    }

    TxRef::from_groups(chain, &groups)
}

fn check_field(field: &'static str, value: u32, max: u32) -> Result<(), ResolutionError> {
    if value > max {
        return Err(ResolutionError::EncodeError { field, value, max });
    }
    Ok(())
}

fn pack_15(groups: &mut [u8], value: u32) {
    groups[0] = (value & 0x1F) as u8;
    groups[1] = ((value >> 5) & 0x1F) as u8;
    groups[2] = ((value >> 10) & 0x1F) as u8;
}

fn unpack_15(groups: &[u8]) -> u32 {
    u32::from(groups[0]) | (u32::from(groups[1]) << 5) | (u32::from(groups[2]) << 10)
}

/// Splits `hrp1payload` into `hrp1:xxxx-xxxx-xxxx-xxxx-rest`
fn group_for_humans(raw: &str, head_len: usize) -> String {
    let (head, mut rest) = raw.split_at(head_len);

    let mut parts = Vec::with_capacity(5);
    while parts.len() < 4 && rest.len() > 4 {
        let (chunk, tail) = rest.split_at(4);
        parts.push(chunk);
        rest = tail;
    }
    parts.push(rest);

    format!("{head}:{}", parts.join("-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_testnet_did_suffix() {
        let txref = decode("txtest1:xj83-crjq-q8ff-8g4").unwrap();
        assert_eq!(
            txref,
            TxRef::Standard {
                chain: Chain::Testnet,
                block_height: 1_974_905,
                tx_position: 18,
            }
        );
        assert_eq!(txref.encode().unwrap(), "txtest1:xj83-crjq-q8ff-8g4");
        assert_eq!(txref.suffix().unwrap(), "xj83-crjq-q8ff-8g4");
    }

    #[test]
    fn test_issued_omni_did_suffix() {
        let txref = decode("txtest1:x5d3-cr5q-qqvh-vn5").unwrap();
        assert_eq!(txref.chain(), Chain::Testnet);
        assert_eq!(txref.block_height(), 1_975_002);
        assert_eq!(txref.tx_position(), 20);
        assert_eq!(txref.utxo_index(), None);
    }

    #[test]
    fn test_mainnet_vectors() {
        let test_cases = vec![
            ((0, 0), "tx1:rqqq-qqqq-qmhu-qhp"),
            ((466_793, 2205), "tx1:rjk0-uqay-zsrw-hqe"),
        ];

        for ((height, position), expected) in test_cases {
            assert_eq!(encode(Chain::Mainnet, height, position, None).unwrap(), expected);
            let decoded = decode(expected).unwrap();
            assert_eq!(decoded.chain(), Chain::Mainnet);
            assert_eq!(decoded.block_height(), height);
            assert_eq!(decoded.tx_position(), position);
        }
    }

    #[test]
    fn test_extended_reference() {
        let encoded = encode(Chain::Testnet, 1_746_180, 49, Some(3)).unwrap();
        assert_eq!(encoded, "txtest1:8gsj-2r3p-qrqq-24tt-2s");

        let decoded = decode(&encoded).unwrap();
        assert!(decoded.is_extended());
        assert_eq!(decoded.utxo_index(), Some(3));
        assert_eq!(decoded.block_height(), 1_746_180);
        assert_eq!(decoded.tx_position(), 49);
    }

    #[test]
    fn test_upper_bounds_round_trip() {
        let encoded = encode(Chain::Mainnet, MAX_BLOCK_HEIGHT, MAX_TX_POSITION, Some(MAX_UTXO_INDEX))
            .unwrap();
        assert_eq!(encoded, "tx1:y7ll-llll-llll-m6jt-2a");
        assert_eq!(
            decode(&encoded).unwrap(),
            TxRef::Extended {
                chain: Chain::Mainnet,
                block_height: MAX_BLOCK_HEIGHT,
                tx_position: MAX_TX_POSITION,
                utxo_index: MAX_UTXO_INDEX,
            }
        );
    }

    #[test]
    fn test_round_trip_boundaries() {
        let heights = [0, 1, 0xF, 0x10, 0x1FF, 0x200, 0x7FFFF, 0x80000, MAX_BLOCK_HEIGHT];
        let positions = [0, 1, 0x1F, 0x20, 0x3FF, 0x400, MAX_TX_POSITION];

        for chain in [Chain::Mainnet, Chain::Testnet] {
            for &height in &heights {
                for &position in &positions {
                    for utxo in [None, Some(0), Some(0x155), Some(MAX_UTXO_INDEX)] {
                        let txref = TxRef::new(chain, height, position, utxo).unwrap();
                        assert_eq!(decode(&txref.encode().unwrap()).unwrap(), txref);
                    }
                }
            }
        }
    }

    #[test]
    fn test_bounds_rejection() {
        for chain in [Chain::Mainnet, Chain::Testnet] {
            assert!(matches!(
                encode(chain, MAX_BLOCK_HEIGHT + 1, 0, None),
                Err(ResolutionError::EncodeError { field: "block height", .. })
            ));
            assert!(matches!(
                encode(chain, 0, MAX_TX_POSITION + 1, None),
                Err(ResolutionError::EncodeError { field: "tx position", .. })
            ));
            assert!(matches!(
                encode(chain, 0, 0, Some(MAX_UTXO_INDEX + 1)),
                Err(ResolutionError::EncodeError { field: "utxo index", .. })
            ));
        }
    }

    #[test]
    fn test_hand_built_variant_is_bounds_checked() {
        let txref = TxRef::Standard {
            chain: Chain::Mainnet,
            block_height: u32::MAX,
            tx_position: 0,
        };
        assert!(txref.encode().is_err());
    }

    #[test]
    fn test_separators_are_cosmetic() {
        let inputs = vec![
            "txtest1:xj83-crjq-q8ff-8g4",
            "txtest1xj83crjqq8ff8g4",
            "txtest1:xj83crjqq8ff8g4",
            "TXTEST1:XJ83-CRJQ-Q8FF-8G4",
            "  txtest1-xj83-crjq-q8ff-8g4 ",
        ];
        let expected = decode(inputs[0]).unwrap();
        for input in inputs {
            assert_eq!(decode(input).unwrap(), expected, "input {input}");
        }
    }

    #[test]
    fn test_invalid_references() {
        let invalid = vec![
            "",
            "txtest1:xj83-crjq-q8ff-8g5",  // checksum
            "txtest1:xj83-crjq-q8ff-8gb",  // charset
            "tx1:xj83-crjq-q8ff-8g4",      // hrp/checksum mismatch
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
        ];
        for reference in invalid {
            assert!(
                matches!(decode(reference), Err(ResolutionError::DecodeError(_))),
                "accepted {reference}"
            );
        }
    }

    #[test]
    fn test_magic_must_agree_with_prefix() {
        // Testnet magic packed under the mainnet prefix.
        let groups: Vec<u5> = TxRef::new(Chain::Testnet, 10, 1, None)
            .unwrap()
            .to_groups()
            .unwrap();
        let raw = bech32::encode("tx", groups, Variant::Bech32).unwrap();
        assert!(matches!(decode(&raw), Err(ResolutionError::DecodeError(_))));
    }

    #[test]
    fn test_chain_parsing() {
        assert_eq!("mainnet".parse::<Chain>().unwrap(), Chain::Mainnet);
        assert_eq!("Testnet".parse::<Chain>().unwrap(), Chain::Testnet);
        assert!("regtest".parse::<Chain>().is_err());
    }

    #[test]
    fn test_display_matches_encode() {
        let txref: TxRef = "tx1:rjk0-uqay-zsrw-hqe".parse().unwrap();
        assert_eq!(txref.to_string(), "tx1:rjk0-uqay-zsrw-hqe");
    }
}
