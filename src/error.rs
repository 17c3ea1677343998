//! Error types for DID:MDIP resolution operations.
//!
//! Covers every failure the TxRef codec, the ledger collaborators and the
//! continuation-chain walker can surface. Nothing in this crate retries on
//! its own; callers decide what to do with each variant.

use thiserror::Error;
use url::ParseError;

/// Errors that can occur while encoding, decoding or resolving DID:MDIP identifiers
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// A TxRef field exceeds its fixed bit width
    #[error("TxRef {field} {value} exceeds maximum {max:#x}")]
    EncodeError {
        field: &'static str,
        value: u32,
        max: u32,
    },

    /// The TxRef string is malformed or fails its bech32 checksum
    #[error("Could not decode txref: {0}")]
    DecodeError(String),

    /// The decoded block position holds no transaction
    #[error("No transaction at block height {height}, position {position}")]
    TxNotFound { height: u32, position: u32 },

    /// The transaction has not been confirmed in a block yet
    #[error("Transaction {0} is not confirmed")]
    Unconfirmed(String),

    /// An output was spent but the spend carried no follow-up document
    #[error("DID continuation doc not found at level {level}")]
    ContinuationNotFound { level: u32 },

    /// The walker gave up after scanning the configured number of blocks
    #[error("Block scan limit reached at level {level} after {scanned} blocks")]
    ScanLimitReached { level: u32, scanned: u64 },

    /// The overall resolution deadline elapsed
    #[error("DID resolution timed out")]
    Timeout,

    /// The DID format is invalid
    #[error("Invalid DID format")]
    InvalidDIDFormat,

    /// No ledger is configured for the DID's anchor
    #[error("No ledger configured for {0}")]
    UnsupportedLedger(String),

    /// A required configuration value is absent
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// A configuration value could not be parsed
    #[error("Invalid configuration value for {0}")]
    InvalidConfig(String),

    /// The node answered with a JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node answered with something we could not interpret
    #[error("Unexpected RPC response: {0}")]
    UnexpectedResponse(String),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    /// URL parse error
    #[error("URL parse error: {0}")]
    UrlError(#[from] ParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Hex decoding error
    #[error("Hex decoding error: {0}")]
    HexError(#[from] hex::FromHexError),
}

impl ResolutionError {
    /// Whether the failure may go away on a later attempt against the same input.
    ///
    /// Codec failures never do. A missing transaction may just mean the
    /// node's view was stale or pointed at the wrong network. A broken
    /// continuation chain is a hard protocol failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResolutionError::TxNotFound { .. }
                | ResolutionError::Unconfirmed(_)
                | ResolutionError::ScanLimitReached { .. }
                | ResolutionError::Timeout
                | ResolutionError::RequestError(_)
        )
    }
}
