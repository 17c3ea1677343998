//! In-memory ledger used by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{
    Block, LedgerQuery, OutPoint, OutputKind, RawTransaction, Tx, TxOutput, UnspentOutput,
    Verbosity,
};
use crate::error::ResolutionError;

/// A linear chain of blocks. Outputs are unspent unless some transaction in
/// the chain spends them or they were marked spent explicitly. Data outputs
/// never enter the UTXO set, as on a real node.
#[derive(Default)]
pub struct MockLedger {
    blocks: Vec<Block>,
    start_height: u32,
    forced_spent: HashSet<OutPoint>,
    unconfirmed: HashSet<String>,
    block_fetches: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(height: u32) -> Self {
        Self {
            start_height: height,
            ..Self::default()
        }
    }

    /// Appends a block and returns its hash
    pub fn push_block(&mut self, transactions: Vec<Tx>) -> String {
        let height = self.start_height + self.blocks.len() as u32;
        let hash = format!("{height:064x}");
        if let Some(last) = self.blocks.last_mut() {
            last.next_block_hash = Some(hash.clone());
        }
        self.blocks.push(Block {
            hash: hash.clone(),
            height,
            transactions,
            next_block_hash: None,
        });
        hash
    }

    /// Reports the output spent even though no block spends it
    pub fn mark_spent(&mut self, txid: &str, index: u32) {
        self.forced_spent.insert(OutPoint::new(txid, index));
    }

    /// Reports the transaction as sitting in the mempool
    pub fn mark_unconfirmed(&mut self, txid: &str) {
        self.unconfirmed.insert(txid.to_string());
    }

    pub fn block_fetches(&self) -> usize {
        self.block_fetches.load(Ordering::SeqCst)
    }

    fn locate(&self, txid: &str) -> Option<(&Block, &Tx)> {
        self.blocks.iter().find_map(|block| {
            block
                .transactions
                .iter()
                .find(|tx| tx.id == txid)
                .map(|tx| (block, tx))
        })
    }

    fn is_spent(&self, outpoint: &OutPoint) -> bool {
        self.forced_spent.contains(outpoint)
            || self
                .blocks
                .iter()
                .flat_map(|block| block.transactions.iter())
                .any(|tx| tx.spends(outpoint))
    }

    fn tip_height(&self) -> u32 {
        self.start_height + self.blocks.len().saturating_sub(1) as u32
    }
}

#[async_trait]
impl LedgerQuery for MockLedger {
    async fn get_unspent_output(
        &self,
        txid: &str,
        index: u32,
    ) -> Result<Option<UnspentOutput>, ResolutionError> {
        let outpoint = OutPoint::new(txid, index);
        let Some((block, tx)) = self.locate(txid) else {
            return Ok(None);
        };
        let Some(output) = tx.outputs.iter().find(|o| o.index == index) else {
            return Ok(None);
        };
        if output.data_payload().is_some() || self.is_spent(&outpoint) {
            return Ok(None);
        }
        Ok(Some(UnspentOutput {
            outpoint,
            value: output.value,
            confirmations: u64::from(self.tip_height() - block.height + 1),
        }))
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, ResolutionError> {
        let (block, tx) = self.locate(txid).ok_or_else(|| ResolutionError::Rpc {
            code: -5,
            message: "No such mempool or blockchain transaction".to_string(),
        })?;
        if self.unconfirmed.contains(txid) {
            return Ok(RawTransaction {
                tx: tx.clone(),
                blockhash: None,
                confirmations: 0,
            });
        }
        Ok(RawTransaction {
            tx: tx.clone(),
            blockhash: Some(block.hash.clone()),
            confirmations: u64::from(self.tip_height() - block.height + 1),
        })
    }

    async fn get_block_hash_by_height(&self, height: u32) -> Result<String, ResolutionError> {
        self.blocks
            .iter()
            .find(|block| block.height == height)
            .map(|block| block.hash.clone())
            .ok_or_else(|| ResolutionError::Rpc {
                code: -8,
                message: "Block height out of range".to_string(),
            })
    }

    async fn get_block_by_hash(
        &self,
        hash: &str,
        verbosity: Verbosity,
    ) -> Result<Block, ResolutionError> {
        self.block_fetches.fetch_add(1, Ordering::SeqCst);
        let block = self
            .blocks
            .iter()
            .find(|block| block.hash == hash)
            .ok_or_else(|| ResolutionError::Rpc {
                code: -5,
                message: "Block not found".to_string(),
            })?;
        let mut block = block.clone();
        if verbosity == Verbosity::Summary {
            for tx in &mut block.transactions {
                tx.inputs.clear();
                tx.outputs.clear();
            }
        }
        Ok(block)
    }
}

/// A transaction spending `inputs` with one value output at index 0
pub fn value_tx(id: &str, inputs: &[(&str, u32)]) -> Tx {
    Tx {
        id: id.to_string(),
        inputs: inputs.iter().map(|(txid, n)| OutPoint::new(*txid, *n)).collect(),
        outputs: vec![TxOutput {
            index: 0,
            kind: OutputKind::Value,
            value: Some(0.00000546),
            addresses: vec!["mk8upnrspWBXjJBV4o1wJ2Qf5KkhHDrz41".to_string()],
        }],
    }
}

/// Like [`value_tx`] with an OP_RETURN output carrying `payload` at index 1
pub fn data_tx(id: &str, inputs: &[(&str, u32)], payload: &[u8]) -> Tx {
    let mut tx = value_tx(id, inputs);
    tx.outputs.push(TxOutput {
        index: 1,
        kind: OutputKind::Data(payload.to_vec()),
        value: Some(0.0),
        addresses: vec![],
    });
    tx
}

/// A coinbase transaction
pub fn coinbase(id: &str) -> Tx {
    value_tx(id, &[])
}
