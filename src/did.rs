//! DID parsing and TxRef conversion.
//!
//! This module handles the parsing and validation of DID:MDIP identifiers
//! and their conversion to and from the TxRef they carry.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ResolutionError;
use crate::txref::{self, Chain, TxRef};

const DID_SCHEME: &str = "did";
const DID_METHOD: &str = "mdip";

/// Ledger a DID:MDIP identifier is anchored on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    /// Plain Bitcoin transactions
    Btc,
    /// Omni Layer transactions on Bitcoin
    Omni,
}

impl Anchor {
    fn tag(&self) -> &'static str {
        match self {
            Anchor::Btc => "btc",
            Anchor::Omni => "omni",
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Anchor {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "btc" => Ok(Anchor::Btc),
            "omni" => Ok(Anchor::Omni),
            _ => Err(ResolutionError::InvalidDIDFormat),
        }
    }
}

/// Represents a parsed DID:MDIP identifier, e.g. `did:mdip:btc-xj83-crjq-q8ff-8g4`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdipDid {
    /// The ledger component
    pub anchor: Anchor,
    /// The TxRef payload without its `tx1:` / `txtest1:` prefix
    pub suffix: String,
}

impl MdipDid {
    /// Creates a new MdipDid instance
    pub fn new(anchor: Anchor, suffix: impl Into<String>) -> Self {
        Self {
            anchor,
            suffix: suffix.into(),
        }
    }

    /// Mints the DID naming the transaction `txref` points at
    pub fn from_txref(anchor: Anchor, txref: &TxRef) -> Result<Self, ResolutionError> {
        Ok(Self::new(anchor, txref.suffix()?))
    }

    /// Parses and validates a DID:MDIP string
    pub fn parse(did: &str) -> Result<Self, ResolutionError> {
        let parts: Vec<&str> = did.trim().split(':').collect();
        if parts.len() != 3 || parts[0] != DID_SCHEME || parts[1] != DID_METHOD {
            return Err(ResolutionError::InvalidDIDFormat);
        }

        let (anchor, suffix) = parts[2]
            .split_once('-')
            .ok_or(ResolutionError::InvalidDIDFormat)?;
        let anchor: Anchor = anchor.parse()?;

        if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ResolutionError::InvalidDIDFormat);
        }

        Ok(Self::new(anchor, suffix))
    }

    /// The full TxRef text under `chain`, e.g. `txtest1:xj83-crjq-q8ff-8g4`
    pub fn txref_string(&self, chain: Chain) -> String {
        format!("{}1:{}", chain.hrp(), self.suffix)
    }

    /// Decodes the embedded TxRef under `chain`
    pub fn txref(&self, chain: Chain) -> Result<TxRef, ResolutionError> {
        txref::decode(&self.txref_string(chain))
    }
}

impl fmt::Display for MdipDid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DID_SCHEME}:{DID_METHOD}:{}-{}", self.anchor, self.suffix)
    }
}

impl FromStr for MdipDid {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
