//! Response graph reconstruction.
//!
//! The engine returns flat, ordered collections of transactions, transfers
//! or outputs. Before serialization the bridge regroups them under their
//! blocks so the host receives each block exactly once, with its
//! transactions nested inside in input order. Block identity is the shared
//! `Arc<BlockHeader>` pointer: two blocks with equal fields but separate
//! allocations stay separate, and a block shared by many transactions is
//! emitted once.
//!
//! Transactions without a block (unconfirmed) are collected into a single
//! lazily-created pending block, which takes the list position of the
//! first unconfirmed item encountered.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{BridgeError, BridgeResult};
use crate::model::{BlockHeader, OutputRecord, TransferRecord, TxWallet};

/// Serialized block grouping: header fields plus owned transaction list.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDto {
    // flattened so block fields sit at the top level; None emits nothing
    #[serde(flatten)]
    pub header: Option<Arc<BlockHeader>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub txs: Vec<Arc<TxWallet>>,
}

#[derive(Debug, Default, Serialize)]
pub struct BlocksEnvelope {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<BlockDto>,
}

pub struct ResponseGraphBuilder {
    blocks: Vec<BlockDto>,
    // Arc pointer address -> position in `blocks`.
    seen_blocks: HashMap<usize, usize>,
    // txs already attached somewhere; a tx belongs to exactly one block.
    seen_txs: HashSet<usize>,
    pending: Option<usize>,
}

impl ResponseGraphBuilder {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            seen_blocks: HashMap::new(),
            seen_txs: HashSet::new(),
            pending: None,
        }
    }

    /// Attach `tx` to its block, synthesizing the pending block if it has
    /// none. Re-visiting a tx already attached (shared by several
    /// transfers or outputs) is a no-op.
    pub fn add_tx(&mut self, tx: &Arc<TxWallet>) {
        let tx_identity = Arc::as_ptr(tx) as usize;
        if !self.seen_txs.insert(tx_identity) {
            return;
        }
        let slot = match &tx.block {
            Some(header) => {
                let block_identity = Arc::as_ptr(header) as usize;
                match self.seen_blocks.get(&block_identity) {
                    Some(&index) => index,
                    None => {
                        let index = self.blocks.len();
                        self.blocks.push(BlockDto {
                            header: Some(Arc::clone(header)),
                            txs: Vec::new(),
                        });
                        self.seen_blocks.insert(block_identity, index);
                        index
                    }
                }
            }
            None => match self.pending {
                Some(index) => index,
                None => {
                    let index = self.blocks.len();
                    self.blocks.push(BlockDto {
                        header: None,
                        txs: Vec::new(),
                    });
                    self.pending = Some(index);
                    index
                }
            },
        };
        self.blocks[slot].txs.push(Arc::clone(tx));
    }

    /// As [`add_tx`](Self::add_tx) but an unconfirmed tx is a hard error:
    /// output-level queries never expect one, and getting one signals an
    /// inconsistent engine response.
    pub fn add_confirmed_tx(&mut self, tx: &Arc<TxWallet>) -> BridgeResult<()> {
        if tx.block.is_none() {
            return Err(BridgeError::Application(
                "unconfirmed output returned by engine".to_string(),
            ));
        }
        self.add_tx(tx);
        Ok(())
    }

    pub fn into_blocks(self) -> Vec<BlockDto> {
        self.blocks
    }
}

impl Default for ResponseGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn blocks_for_txs(txs: &[Arc<TxWallet>]) -> Vec<BlockDto> {
    let mut builder = ResponseGraphBuilder::new();
    for tx in txs {
        builder.add_tx(tx);
    }
    builder.into_blocks()
}

pub fn blocks_for_transfers(transfers: &[TransferRecord]) -> Vec<BlockDto> {
    let mut builder = ResponseGraphBuilder::new();
    for transfer in transfers {
        builder.add_tx(&transfer.tx);
    }
    builder.into_blocks()
}

pub fn blocks_for_outputs(outputs: &[OutputRecord]) -> BridgeResult<Vec<BlockDto>> {
    let mut builder = ResponseGraphBuilder::new();
    for output in outputs {
        builder.add_confirmed_tx(&output.tx)?;
    }
    Ok(builder.into_blocks())
}

/// Sweep results are wrapped in one synthesized block regardless of
/// confirmation state; no block is emitted when there are no txs.
pub fn single_block(txs: Vec<Arc<TxWallet>>) -> Vec<BlockDto> {
    if txs.is_empty() {
        return Vec::new();
    }
    vec![BlockDto { header: None, txs }]
}

pub fn encode_blocks(blocks: Vec<BlockDto>) -> BridgeResult<String> {
    crate::query::encode(&BlocksEnvelope { blocks })
}
