//! Domain aggregates copied out of the engine per call, and the envelopes
//! they serialize into.
//!
//! Blocks are shared by identity: a transaction holds an
//! `Arc<BlockHeader>` and never a copy, so a response graph can represent
//! "one block, many transactions" without duplicating block data. All
//! interchange payloads are camelCase JSON; absent fields are omitted
//! rather than serialized as null.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Network selector matching the native engine's numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkType {
    Mainnet,
    Testnet,
    Stagenet,
}

impl NetworkType {
    pub fn as_i32(self) -> i32 {
        match self {
            NetworkType::Mainnet => 0,
            NetworkType::Testnet => 1,
            NetworkType::Stagenet => 2,
        }
    }

    pub fn from_i32(value: i32) -> BridgeResult<Self> {
        match value {
            0 => Ok(NetworkType::Mainnet),
            1 => Ok(NetworkType::Testnet),
            2 => Ok(NetworkType::Stagenet),
            other => Err(BridgeError::InvalidArgument(format!(
                "unknown network type {other}"
            ))),
        }
    }
}

/// Confirmed-block identity. Shared between every transaction the engine
/// returned for that block; the graph builder de-duplicates by the `Arc`
/// pointer, not by field equality.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl BlockHeader {
    pub fn at_height(height: u64) -> Arc<Self> {
        Arc::new(Self {
            height: Some(height),
            hash: None,
            timestamp: None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Destination {
    pub address: String,
    pub amount: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingTransfer {
    pub amount: u64,
    pub account_index: u32,
    pub subaddress_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingTransfer {
    pub amount: u64,
    pub account_index: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subaddress_indices: Vec<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<Destination>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputWallet {
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    pub account_index: u32,
    pub subaddress_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_image: Option<KeyImage>,
    pub is_spent: bool,
}

/// Wallet-scoped transaction. `block` is structural parentage, carried out
/// of band of serialization: the graph builder decides which block emits
/// the tx, so serializing a tx never re-emits its block.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxWallet {
    pub hash: String,
    #[serde(skip)]
    pub block: Option<Arc<BlockHeader>>,
    pub is_confirmed: bool,
    pub in_tx_pool: bool,
    pub is_relayed: bool,
    pub is_failed: bool,
    pub is_coinbase: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub incoming_transfers: Vec<IncomingTransfer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outgoing_transfer: Option<OutgoingTransfer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputWallet>,
}

impl TxWallet {
    /// Minimal unconfirmed tx, handy for engines and tests.
    pub fn unconfirmed(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            block: None,
            is_confirmed: false,
            in_tx_pool: true,
            is_relayed: true,
            is_failed: false,
            is_coinbase: false,
            fee: None,
            payment_id: None,
            unlock_height: None,
            note: None,
            metadata: None,
            incoming_transfers: Vec::new(),
            outgoing_transfer: None,
            outputs: Vec::new(),
        }
    }

    pub fn confirmed(hash: impl Into<String>, block: Arc<BlockHeader>) -> Self {
        Self {
            block: Some(block),
            is_confirmed: true,
            in_tx_pool: false,
            ..Self::unconfirmed(hash)
        }
    }
}

/// Transfer query result item. The transfer data itself is nested in the
/// owning tx (`incoming_transfers` / `outgoing_transfer`); the record pins
/// which tx the item belongs to, mirroring the engine's shared ownership.
#[derive(Clone, Debug)]
pub struct TransferRecord {
    pub tx: Arc<TxWallet>,
    pub is_incoming: bool,
}

/// Output query result item; the output data lives in `tx.outputs`, and
/// several records may pin the same tx.
#[derive(Clone, Debug)]
pub struct OutputRecord {
    pub tx: Arc<TxWallet>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subaddress {
    pub account_index: u32,
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub balance: u64,
    pub unlocked_balance: u64,
    pub num_unspent_outputs: u64,
    pub is_used: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_address: Option<String>,
    pub balance: u64,
    pub unlocked_balance: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subaddresses: Vec<Subaddress>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KeyImage {
    pub hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RpcConnection {
    pub uri: String,
    pub username: String,
    pub password: String,
}

// ---- result echoes ----

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub num_blocks_fetched: u64,
    pub received_money: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyImageImportResult {
    pub height: u64,
    pub spent_amount: u64,
    pub unspent_amount: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofCheck {
    pub is_good: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_confirmations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_tx_pool: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_amount: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegratedAddress {
    pub standard_address: String,
    pub payment_id: String,
    pub integrated_address: String,
}

// ---- envelopes ----

#[derive(Debug, Default, Serialize)]
pub struct AccountsEnvelope {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<Account>,
}

#[derive(Debug, Default, Serialize)]
pub struct SubaddressesEnvelope {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subaddresses: Vec<Subaddress>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyImagesEnvelope {
    #[serde(rename = "keyImages", default, skip_serializing_if = "Vec::is_empty")]
    pub key_images: Vec<KeyImage>,
}
