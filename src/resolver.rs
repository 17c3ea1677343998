//! Core DID resolution functionality.
//!
//! This module turns TxRefs into transaction ids and back, and drives the
//! full DID:MDIP read: DID → TxRef → transaction → continuation walk →
//! document pointer, falling back to the original transaction's own data
//! or to a derived default document.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::did::{Anchor, MdipDid};
use crate::error::ResolutionError;
use crate::ledger::{LedgerQuery, RpcLedger, Verbosity};
use crate::txref::{self, Chain, TxRef};
use crate::types::{
    DIDDocument, DocumentPointer, DocumentSource, ResolutionMetadata, ResolutionOptions,
    ResolutionResult,
};
use crate::walker::{self, WalkOptions};

/// Omni Layer payloads start with the `omni` marker, a version and a type
const OMNI_HEADER_LEN: usize = 8;

/// A TxRef resolved to the transaction it names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTx {
    pub txid: String,
    pub chain: Chain,
    /// Designated output; 0 unless the TxRef was extended
    pub utxo_index: u32,
}

/// Looks up the transaction at the TxRef's block height and position
pub async fn resolve_txref<L>(txref: &TxRef, ledger: &L) -> Result<ResolvedTx, ResolutionError>
where
    L: LedgerQuery + ?Sized,
{
    let height = txref.block_height();
    let position = txref.tx_position();

    let hash = ledger.get_block_hash_by_height(height).await?;
    let block = ledger.get_block_by_hash(&hash, Verbosity::Summary).await?;

    let tx = block
        .transactions
        .get(position as usize)
        .ok_or(ResolutionError::TxNotFound { height, position })?;

    debug!(height, position, txid = %tx.id, "txref resolved");

    Ok(ResolvedTx {
        txid: tx.id.clone(),
        chain: txref.chain(),
        utxo_index: txref.utxo_index().unwrap_or(0),
    })
}

/// Decodes `reference` and resolves it to a transaction id
pub async fn txref_to_txid<L>(reference: &str, ledger: &L) -> Result<ResolvedTx, ResolutionError>
where
    L: LedgerQuery + ?Sized,
{
    let txref = txref::decode(reference)?;
    resolve_txref(&txref, ledger).await
}

/// Builds the TxRef of a confirmed transaction
pub async fn txid_to_txref<L>(
    ledger: &L,
    chain: Chain,
    txid: &str,
    utxo_index: Option<u32>,
) -> Result<TxRef, ResolutionError>
where
    L: LedgerQuery + ?Sized,
{
    let raw = ledger.get_raw_transaction(txid).await?;
    let hash = raw
        .blockhash
        .ok_or_else(|| ResolutionError::Unconfirmed(txid.to_string()))?;

    let block = ledger.get_block_by_hash(&hash, Verbosity::Summary).await?;
    let position = block.position_of(txid).ok_or_else(|| {
        ResolutionError::UnexpectedResponse(format!("{txid} missing from block {hash}"))
    })?;

    TxRef::new(
        chain,
        block.height,
        u32::try_from(position).unwrap_or(u32::MAX),
        utxo_index,
    )
}

/// Core resolver for DID:MDIP resolution
pub struct Resolver<L = RpcLedger> {
    /// Network DID suffixes are read under
    network: Chain,
    /// Ledger for `btc-` identifiers
    btc: L,
    /// Ledger for `omni-` identifiers
    omni: Option<L>,
}

impl Resolver<RpcLedger> {
    /// Creates a resolver talking to the configured nodes
    pub fn from_config(config: &ResolverConfig) -> Self {
        let resolver = Self::new(config.network, RpcLedger::from_endpoint(&config.btc));
        match &config.omni {
            Some(omni) => resolver.with_omni(RpcLedger::from_endpoint(omni)),
            None => resolver,
        }
    }
}

impl<L: LedgerQuery> Resolver<L> {
    /// Creates a new Resolver instance for Bitcoin-anchored DIDs
    pub fn new(network: Chain, btc: L) -> Self {
        Self {
            network,
            btc,
            omni: None,
        }
    }

    /// Adds a ledger for Omni-anchored DIDs
    pub fn with_omni(mut self, omni: L) -> Self {
        self.omni = Some(omni);
        self
    }

    /// The ledger backing `anchor`
    pub fn ledger(&self, anchor: Anchor) -> Result<&L, ResolutionError> {
        match anchor {
            Anchor::Btc => Ok(&self.btc),
            Anchor::Omni => self
                .omni
                .as_ref()
                .ok_or_else(|| ResolutionError::UnsupportedLedger(anchor.to_string())),
        }
    }

    /// Resolves a DID:MDIP identifier
    ///
    /// # Example
    /// ```no_run
    /// use mdip_resolver::{Resolver, ResolverConfig, ResolutionOptions};
    ///
    /// #[tokio::main(flavor = "current_thread")]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = ResolverConfig::from_env()?;
    ///     let resolver = Resolver::from_config(&config);
    ///     let result = resolver
    ///         .resolve("did:mdip:btc-xj83-crjq-q8ff-8g4", &ResolutionOptions::default())
    ///         .await?;
    ///     println!("Resolved: {:?}", result.source);
    ///     Ok(())
    /// }
    /// ```
    pub async fn resolve(
        &self,
        did: &str,
        options: &ResolutionOptions,
    ) -> Result<ResolutionResult, ResolutionError> {
        match options.timeout {
            Some(limit) => tokio::time::timeout(limit, self.resolve_unbounded(did, options))
                .await
                .map_err(|_| ResolutionError::Timeout)?,
            None => self.resolve_unbounded(did, options).await,
        }
    }

    async fn resolve_unbounded(
        &self,
        did: &str,
        options: &ResolutionOptions,
    ) -> Result<ResolutionResult, ResolutionError> {
        let start_time = Instant::now();

        let did = MdipDid::parse(did)?;
        let ledger = self.ledger(did.anchor)?;
        let txref = did.txref(self.network)?;

        let origin = resolve_txref(&txref, ledger).await?;
        let continuations = walker::walk(
            ledger,
            &origin.txid,
            origin.utxo_index,
            WalkOptions {
                max_blocks: options.max_blocks,
            },
        )
        .await?;

        let (source, current_txid) = match continuations.last() {
            Some(record) => (
                DocumentSource::Pointer {
                    pointer: record.document_pointer.clone(),
                },
                record.spending_txid.clone(),
            ),
            None => (
                self.original_source(ledger, &did, &origin.txid).await?,
                origin.txid.clone(),
            ),
        };

        let content_type = match source {
            DocumentSource::Pointer { .. } => "text/plain",
            DocumentSource::Document { .. } => "application/did+json",
        };

        info!(%did, txid = %origin.txid, hops = continuations.len(), "DID resolved");

        Ok(ResolutionResult {
            did: did.to_string(),
            source,
            continuations,
            metadata: ResolutionMetadata {
                content_type: content_type.to_string(),
                retrieved: Utc::now(),
                duration: start_time.elapsed(),
                anchor: did.anchor,
                network: self.network,
                txid: origin.txid,
                utxo_index: origin.utxo_index,
                current_txid,
            },
        })
    }

    /// Reads the DID's own transaction when it was never updated
    async fn original_source(
        &self,
        ledger: &L,
        did: &MdipDid,
        txid: &str,
    ) -> Result<DocumentSource, ResolutionError> {
        let raw = ledger.get_raw_transaction(txid).await?;

        if let Some(payload) = raw.tx.data_payload() {
            let payload = match did.anchor {
                Anchor::Btc => payload,
                Anchor::Omni => payload.get(OMNI_HEADER_LEN..).unwrap_or_default(),
            };
            return Ok(DocumentSource::Pointer {
                pointer: DocumentPointer::new(payload),
            });
        }

        warn!(%did, %txid, "no document pointer anchored, deriving default document");

        let funding = raw.tx.inputs.first().ok_or_else(|| {
            ResolutionError::UnexpectedResponse(format!("{txid} has no funding input"))
        })?;
        let funding_tx = ledger.get_raw_transaction(&funding.txid).await?;
        let address = funding_tx
            .tx
            .outputs
            .iter()
            .find(|output| output.index == funding.index)
            .and_then(|output| output.addresses.first())
            .ok_or_else(|| {
                ResolutionError::UnexpectedResponse(format!(
                    "no address on {}:{}",
                    funding.txid, funding.index
                ))
            })?;

        Ok(DocumentSource::Document {
            document: DIDDocument::default_capability(&did.to_string(), address),
        })
    }

    /// Mints the DID of a confirmed transaction on this resolver's network
    pub async fn txid_to_did(
        &self,
        anchor: Anchor,
        txid: &str,
        utxo_index: Option<u32>,
    ) -> Result<MdipDid, ResolutionError> {
        let txref = txid_to_txref(self.ledger(anchor)?, self.network, txid, utxo_index).await?;
        MdipDid::from_txref(anchor, &txref)
    }
}

/// Convenience function for resolving a DID with configuration from the environment
pub async fn resolve_did(
    did: &str,
    options: Option<ResolutionOptions>,
) -> Result<ResolutionResult, ResolutionError> {
    let config = ResolverConfig::from_env()?;
    let options = options.unwrap_or_else(|| config.resolution_options());
    Resolver::from_config(&config).resolve(did, &options).await
}
