//! Core types for DID:MDIP resolution.
//!
//! This module holds the DID Document shape produced for identifiers without
//! an anchored document, the document pointers read off the ledger, and the
//! resolution result handed back to callers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::did::Anchor;
use crate::txref::Chain;
use crate::walker::ContinuationChain;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A DID Document in the shape MDIP nodes publish by default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DIDDocument {
    /// The context of the DID Document
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// The DID itself
    pub id: String,

    /// Public keys controlling this DID
    #[serde(rename = "publicKey")]
    pub public_key: Vec<PublicKey>,

    /// Authentication key references
    pub authentication: Vec<String>,

    /// Assertion key references
    #[serde(rename = "assertionMethod")]
    pub assertion_method: Vec<String>,
}

/// A public key entry of a DID Document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicKey {
    /// The unique identifier for this key
    pub id: String,

    /// The controller of this key
    pub controller: String,

    /// The type of the key
    #[serde(rename = "type")]
    pub key_type: String,

    /// The key material, as the funding address
    #[serde(rename = "publicKeyBase58")]
    pub public_key_base58: String,
}

impl DIDDocument {
    /// The document implied by a DID whose transaction anchors no pointer:
    /// one secp256k1 key, the creator's address, for both auth and assertions.
    pub fn default_capability(did: &str, address: &str) -> Self {
        let key = |fragment: &str| PublicKey {
            id: format!("{did}#{fragment}"),
            controller: did.to_string(),
            key_type: "EcdsaSecp256k1VerificationKey2019".to_string(),
            public_key_base58: address.to_string(),
        };

        Self {
            context: vec!["https://www.w3.org/ns/did/v1".to_string()],
            id: did.to_string(),
            public_key: vec![key("auth"), key("vc-pubkey")],
            authentication: vec!["#auth".to_string()],
            assertion_method: vec!["#vc-pubkey".to_string()],
        }
    }
}

/// Opaque bytes naming where a DID Document lives, typically a URL or content hash
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentPointer(Vec<u8>);

impl DocumentPointer {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// UTF-8 text if the bytes are valid UTF-8
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl fmt::Display for DocumentPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(text),
            None => f.write_str(&hex::encode(&self.0)),
        }
    }
}

impl fmt::Debug for DocumentPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentPointer({self})")
    }
}

impl Serialize for DocumentPointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where the resolved DID Document comes from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DocumentSource {
    /// A pointer embedded on the ledger
    Pointer { pointer: DocumentPointer },
    /// No pointer anywhere; the default document was derived
    Document { document: DIDDocument },
}

/// Resolution result containing the document source and metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    /// The DID that was resolved
    pub did: String,

    /// The resolved document pointer or derived document
    pub source: DocumentSource,

    /// Update hops followed from the original transaction
    pub continuations: ContinuationChain,

    /// Metadata about the resolution process
    pub metadata: ResolutionMetadata,
}

/// Metadata about the resolution process
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionMetadata {
    /// Content type of the resolved document
    pub content_type: String,

    /// When the document was retrieved
    pub retrieved: DateTime<Utc>,

    /// How long the resolution took
    pub duration: Duration,

    /// Ledger the DID is anchored on
    pub anchor: Anchor,

    /// Network the TxRef was read under
    pub network: Chain,

    /// Transaction the DID names
    pub txid: String,

    /// Output of that transaction the walk started from
    pub utxo_index: u32,

    /// Transaction holding the authoritative pointer
    pub current_txid: String,
}

/// Options for DID resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOptions {
    /// Deadline for the whole resolution; `None` disables it
    pub timeout: Option<Duration>,

    /// Upper bound on blocks the continuation walker may fetch
    pub max_blocks: Option<u64>,
}

impl Default for ResolutionOptions {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            max_blocks: None,
        }
    }
}
