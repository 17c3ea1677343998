//! Ledger access for DID:MDIP resolution.
//!
//! Resolution only ever reads from the ledger. [`LedgerQuery`] is the whole
//! surface the codec resolver and the continuation walker depend on, so a
//! node client, an indexer or an in-memory fixture can stand behind it.

mod rpc;
#[cfg(test)]
pub(crate) mod mock;

pub use rpc::RpcLedger;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ResolutionError;

/// How much of a block to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Transaction ids only
    Summary,
    /// Transaction bodies with their inputs and outputs
    Full,
}

/// Read-only view of a UTXO ledger
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Returns the output if it exists and is unspent, `None` otherwise
    async fn get_unspent_output(
        &self,
        txid: &str,
        index: u32,
    ) -> Result<Option<UnspentOutput>, ResolutionError>;

    /// Fetches a transaction together with its confirmation details
    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, ResolutionError>;

    /// Hash of the main-chain block at `height`
    async fn get_block_hash_by_height(&self, height: u32) -> Result<String, ResolutionError>;

    /// Fetches a block; with [`Verbosity::Summary`] transactions carry ids only
    async fn get_block_by_hash(
        &self,
        hash: &str,
        verbosity: Verbosity,
    ) -> Result<Block, ResolutionError>;
}

/// Reference to one output of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OutPoint {
    pub txid: String,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: impl Into<String>, index: u32) -> Self {
        Self { txid: txid.into(), index }
    }
}

/// An output reported unspent by the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct UnspentOutput {
    pub outpoint: OutPoint,
    pub value: Option<f64>,
    pub confirmations: u64,
}

/// What an output carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputKind {
    /// A provably unspendable output carrying arbitrary bytes (OP_RETURN)
    Data(Vec<u8>),
    /// A spendable output paying an address
    Value,
    /// Any other script type, named as the node reports it
    Other(String),
}

/// A transaction output
#[derive(Debug, Clone, PartialEq)]
pub struct TxOutput {
    pub index: u32,
    pub kind: OutputKind,
    pub value: Option<f64>,
    /// Addresses the output pays to, if the node could derive any
    pub addresses: Vec<String>,
}

impl TxOutput {
    /// Bytes embedded in a data-carrying output
    pub fn data_payload(&self) -> Option<&[u8]> {
        match &self.kind {
            OutputKind::Data(payload) => Some(payload),
            _ => None,
        }
    }
}

/// A transaction as it appears inside a block
#[derive(Debug, Clone, PartialEq)]
pub struct Tx {
    pub id: String,
    /// Previous outputs this transaction spends; empty for coinbase
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<TxOutput>,
}

impl Tx {
    /// Whether this transaction consumes `outpoint`
    pub fn spends(&self, outpoint: &OutPoint) -> bool {
        self.inputs.iter().any(|input| input == outpoint)
    }

    /// Payload of the data-carrying output; the last one wins if there are several
    pub fn data_payload(&self) -> Option<&[u8]> {
        self.outputs.iter().rev().find_map(TxOutput::data_payload)
    }
}

/// A transaction with its confirmation details
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub tx: Tx,
    /// Confirming block; `None` while the transaction is unconfirmed
    pub blockhash: Option<String>,
    pub confirmations: u64,
}

/// A block and a link to its successor on the main chain
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub hash: String,
    pub height: u32,
    pub transactions: Vec<Tx>,
    pub next_block_hash: Option<String>,
}

impl Block {
    /// Position of `txid` within the block
    pub fn position_of(&self, txid: &str) -> Option<usize> {
        self.transactions.iter().position(|tx| tx.id == txid)
    }
}
