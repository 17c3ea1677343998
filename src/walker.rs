//! Continuation-chain walking.
//!
//! A DID is updated by spending the designated output of its current
//! transaction in a new transaction that carries a fresh document pointer
//! in an OP_RETURN output. The walker follows those spends forward until it
//! reaches an output that is still unspent. All walk state lives in the
//! call, so concurrent walks never interfere and a dropped future leaves
//! nothing behind.

use serde::Serialize;
use tracing::debug;

use crate::error::ResolutionError;
use crate::ledger::{LedgerQuery, OutPoint, Tx, Verbosity};
use crate::types::DocumentPointer;

/// One update hop
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationRecord {
    /// 1-based hop counter
    pub level: u32,
    pub spending_txid: String,
    /// Output of the spending transaction the next hop continues from
    pub spending_output_index: u32,
    pub document_pointer: DocumentPointer,
    /// Block that confirmed the spend
    pub block_hash: String,
}

/// Hops in the order they happened; empty when the original output is unspent
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ContinuationChain {
    records: Vec<ContinuationRecord>,
}

impl ContinuationChain {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// The hop holding the authoritative document pointer
    pub fn last(&self) -> Option<&ContinuationRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContinuationRecord> {
        self.records.iter()
    }

    fn next_level(&self) -> u32 {
        self.records.len() as u32 + 1
    }
}

impl<'a> IntoIterator for &'a ContinuationChain {
    type Item = &'a ContinuationRecord;
    type IntoIter = std::slice::Iter<'a, ContinuationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Limits for a single walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOptions {
    /// Maximum number of blocks fetched across the whole walk
    pub max_blocks: Option<u64>,
}

/// Follows the spends of `(txid, output_index)` to the current document pointer
pub async fn walk<L>(
    ledger: &L,
    txid: &str,
    output_index: u32,
    options: WalkOptions,
) -> Result<ContinuationChain, ResolutionError>
where
    L: LedgerQuery + ?Sized,
{
    let mut chain = ContinuationChain::default();
    let mut current = OutPoint::new(txid, output_index);
    let mut scanned: u64 = 0;

    loop {
        if ledger
            .get_unspent_output(&current.txid, current.index)
            .await?
            .is_some()
        {
            debug!(txid = %current.txid, index = current.index, hops = chain.len(), "output unspent");
            return Ok(chain);
        }

        let level = chain.next_level();
        let raw = ledger.get_raw_transaction(&current.txid).await?;
        // An unconfirmed transaction cannot have a confirmed spender.
        let start = raw
            .blockhash
            .ok_or(ResolutionError::ContinuationNotFound { level })?;

        let (spender, block_hash) =
            find_spender(ledger, &current, start, level, &mut scanned, options).await?;

        let payload = spender
            .data_payload()
            .ok_or(ResolutionError::ContinuationNotFound { level })?;
        let document_pointer = DocumentPointer::new(payload);
        let next_index = spender.outputs.first().map_or(0, |output| output.index);

        debug!(level, spender = %spender.id, pointer = %document_pointer, "continuation found");

        chain.records.push(ContinuationRecord {
            level,
            spending_txid: spender.id.clone(),
            spending_output_index: next_index,
            document_pointer,
            block_hash,
        });
        current = OutPoint::new(spender.id, next_index);
    }
}

/// Scans forward from `block_hash` for the transaction spending `outpoint`
async fn find_spender<L>(
    ledger: &L,
    outpoint: &OutPoint,
    mut block_hash: String,
    level: u32,
    scanned: &mut u64,
    options: WalkOptions,
) -> Result<(Tx, String), ResolutionError>
where
    L: LedgerQuery + ?Sized,
{
    loop {
        if options.max_blocks.is_some_and(|max| *scanned >= max) {
            return Err(ResolutionError::ScanLimitReached {
                level,
                scanned: *scanned,
            });
        }

        let block = ledger.get_block_by_hash(&block_hash, Verbosity::Full).await?;
        *scanned += 1;

        if let Some(spender) = block.transactions.into_iter().find(|tx| tx.spends(outpoint)) {
            return Ok((spender, block.hash));
        }

        match block.next_block_hash {
            Some(next) => block_hash = next,
            None => {
                debug!(txid = %outpoint.txid, index = outpoint.index, level, "reached chain tip without a spender");
                return Err(ResolutionError::ContinuationNotFound { level });
            }
        }
    }
}
