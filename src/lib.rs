//! A resolver for DID:MDIP identifiers.
//!
//! DID:MDIP identifiers name a Bitcoin or Omni Layer transaction through a
//! TxRef, a bech32 encoding of the transaction's block height and position.
//! Resolving one decodes the TxRef, looks the transaction up on the ledger
//! and follows any later spends of its designated output to the most recent
//! document pointer.

mod config;
mod did;
mod error;
mod ledger;
mod resolver;
mod txref;
mod types;
mod walker;

pub use config::{ResolverConfig, RpcEndpoint};
pub use did::{Anchor, MdipDid};
pub use error::ResolutionError;
pub use ledger::{
    Block, LedgerQuery, OutPoint, OutputKind, RawTransaction, RpcLedger, Tx, TxOutput,
    UnspentOutput, Verbosity,
};
pub use resolver::{
    resolve_did, resolve_txref, txid_to_txref, txref_to_txid, ResolvedTx, Resolver,
};
pub use txref::{
    decode, encode, Chain, TxRef, MAX_BLOCK_HEIGHT, MAX_TX_POSITION, MAX_UTXO_INDEX,
};
pub use types::{
    DIDDocument, DocumentPointer, DocumentSource, PublicKey, ResolutionMetadata,
    ResolutionOptions, ResolutionResult,
};
pub use walker::{walk, ContinuationChain, ContinuationRecord, WalkOptions};

/// Resolves a DID:MDIP identifier against the nodes configured in the environment
///
/// # Arguments
/// * `did` - The DID:MDIP identifier to resolve
/// * `options` - Optional resolution parameters; defaults come from the configuration
///
/// # Example
/// ```no_run
/// use mdip_resolver::resolve;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let result = resolve("did:mdip:btc-xj83-crjq-q8ff-8g4", None).await?;
///
///     println!("Resolved DID Document source: {:?}", result.source);
///     Ok(())
/// }
/// ```
pub async fn resolve(
    did: &str,
    options: Option<ResolutionOptions>,
) -> Result<ResolutionResult, ResolutionError> {
    resolve_did(did, options).await
}
