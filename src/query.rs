//! Request/filter codec.
//!
//! Interchange payloads are decoded into typed filter structures before
//! the engine is queried. An absent or empty payload means "match
//! everything"; a malformed payload, an unknown field, or a type mismatch
//! is an invalid-argument failure and applies nothing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::model::{Destination, KeyImage, KeyImagesEnvelope};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct TxQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_confirmed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_tx_pool: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_incoming: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_outgoing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_failed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_coinbase: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_outputs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_query: Option<Box<TransferQuery>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct TransferQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_incoming: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaddress_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaddress_indices: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_destinations: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destinations: Option<Vec<Destination>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_query: Option<Box<TxQuery>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct OutputQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaddress_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaddress_indices: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_spent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_image: Option<KeyImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_query: Option<Box<TxQuery>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SendRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<Destination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subaddress_indices: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ring_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub below_amount: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub do_not_relay: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn decode<T: DeserializeOwned + Default>(payload: Option<&str>) -> BridgeResult<T> {
    let text = match payload {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Ok(T::default()),
    };
    serde_json::from_str(text)
        .map_err(|err| BridgeError::InvalidArgument(format!("malformed request payload: {err}")))
}

pub fn decode_tx_query(payload: Option<&str>) -> BridgeResult<TxQuery> {
    decode(payload)
}

pub fn decode_transfer_query(payload: Option<&str>) -> BridgeResult<TransferQuery> {
    decode(payload)
}

pub fn decode_output_query(payload: Option<&str>) -> BridgeResult<OutputQuery> {
    decode(payload)
}

pub fn decode_send_request(payload: Option<&str>) -> BridgeResult<SendRequest> {
    decode(payload)
}

pub fn decode_key_images(payload: Option<&str>) -> BridgeResult<Vec<KeyImage>> {
    let envelope: KeyImagesEnvelope = decode(payload)?;
    Ok(envelope.key_images)
}

/// A plain JSON string array; absent/empty payload decodes to no entries.
pub fn decode_string_array(payload: Option<&str>) -> BridgeResult<Vec<String>> {
    decode(payload)
}

/// A plain JSON array of indices; absent/empty payload decodes to no entries.
pub fn decode_u32_array(payload: Option<&str>) -> BridgeResult<Vec<u32>> {
    decode(payload)
}

pub fn encode<T: Serialize>(value: &T) -> BridgeResult<String> {
    serde_json::to_string(value)
        .map_err(|err| BridgeError::Application(format!("failed to serialize response: {err}")))
}
