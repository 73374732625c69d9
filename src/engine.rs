//! The native wallet engine seam.
//!
//! The engine's cryptography, sync logic and transaction construction live
//! outside this crate; the bridge consumes them through [`WalletEngine`]
//! and constructs instances through the process-wide [`EngineBackend`].
//! Every fallible operation reports an [`EngineError`], translated to the
//! host taxonomy at the boundary.

use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use zeroize::Zeroizing;

use crate::error::{BridgeError, BridgeResult, EngineError};
use crate::listener::ListenerAdapter;
use crate::model::{
    Account, IntegratedAddress, KeyImage, KeyImageImportResult, NetworkType, OutputRecord,
    ProofCheck, RpcConnection, Subaddress, SyncResult, TransferRecord, TxWallet,
};
use crate::query::{OutputQuery, SendRequest, TransferQuery, TxQuery};

pub type EngineResult<T> = Result<T, EngineError>;

/// One live native wallet instance. Exclusively owned by the handle that
/// was issued for it; dropping the box is the only way it is released.
pub trait WalletEngine: Send {
    fn path(&self) -> String;
    fn network_type(&self) -> NetworkType;
    fn mnemonic(&self) -> EngineResult<String>;
    fn language(&self) -> EngineResult<String>;
    fn languages(&self) -> EngineResult<Vec<String>>;

    fn public_view_key(&self) -> EngineResult<String>;
    fn private_view_key(&self) -> EngineResult<String>;
    fn public_spend_key(&self) -> EngineResult<String>;
    fn private_spend_key(&self) -> EngineResult<String>;

    fn daemon_connection(&self) -> Option<RpcConnection>;
    fn set_daemon_connection(&mut self, connection: RpcConnection) -> EngineResult<()>;

    fn height(&self) -> u64;
    fn chain_height(&self) -> EngineResult<u64>;
    fn restore_height(&self) -> u64;
    fn set_restore_height(&mut self, height: u64) -> EngineResult<()>;

    /// Blocks the calling thread for the full sync pass; progress and new
    /// blocks arrive through the installed listener on the engine's own
    /// worker thread.
    fn sync(&mut self, start_height: u64) -> EngineResult<SyncResult>;

    /// Install or clear the event listener. The engine must stop invoking
    /// a previously installed adapter before this returns.
    fn set_listener(&mut self, listener: Option<Arc<ListenerAdapter>>);

    fn balance(&self, account: Option<u32>, subaddress: Option<u32>) -> EngineResult<u64>;
    fn unlocked_balance(&self, account: Option<u32>, subaddress: Option<u32>) -> EngineResult<u64>;

    fn address(&self, account: u32, subaddress: u32) -> EngineResult<String>;
    fn address_index(&self, address: &str) -> EngineResult<Subaddress>;
    fn integrated_address(
        &self,
        standard_address: &str,
        payment_id: &str,
    ) -> EngineResult<IntegratedAddress>;
    fn decode_integrated_address(&self, integrated: &str) -> EngineResult<IntegratedAddress>;

    fn accounts(&self, include_subaddresses: bool, tag: &str) -> EngineResult<Vec<Account>>;
    fn account(&self, index: u32, include_subaddresses: bool) -> EngineResult<Account>;
    fn create_account(&mut self, label: &str) -> EngineResult<Account>;
    fn subaddresses(&self, account: u32, indices: &[u32]) -> EngineResult<Vec<Subaddress>>;
    fn create_subaddress(&mut self, account: u32, label: &str) -> EngineResult<Subaddress>;

    fn txs(&self, query: &TxQuery) -> EngineResult<Vec<Arc<TxWallet>>>;
    fn transfers(&self, query: &TransferQuery) -> EngineResult<Vec<TransferRecord>>;
    fn outputs(&self, query: &OutputQuery) -> EngineResult<Vec<OutputRecord>>;

    fn outputs_hex(&self) -> EngineResult<String>;
    fn import_outputs_hex(&mut self, outputs_hex: &str) -> EngineResult<u32>;
    fn key_images(&self) -> EngineResult<Vec<KeyImage>>;
    fn import_key_images(&mut self, key_images: &[KeyImage]) -> EngineResult<KeyImageImportResult>;

    fn send_split(&mut self, request: &SendRequest) -> EngineResult<Vec<Arc<TxWallet>>>;
    fn sweep_output(&mut self, request: &SendRequest) -> EngineResult<Arc<TxWallet>>;
    fn sweep_dust(&mut self, do_not_relay: bool) -> EngineResult<Vec<Arc<TxWallet>>>;
    fn relay_txs(&mut self, tx_metadatas: &[String]) -> EngineResult<Vec<String>>;

    fn tx_notes(&self, tx_hashes: &[String]) -> EngineResult<Vec<String>>;
    fn set_tx_notes(&mut self, tx_hashes: &[String], notes: &[String]) -> EngineResult<()>;

    fn sign(&self, message: &str) -> EngineResult<String>;
    fn verify(&self, message: &str, address: &str, signature: &str) -> EngineResult<bool>;

    fn tx_key(&self, tx_hash: &str) -> EngineResult<String>;
    fn check_tx_key(&self, tx_hash: &str, tx_key: &str, address: &str)
        -> EngineResult<ProofCheck>;
    fn tx_proof(&self, tx_hash: &str, address: &str, message: &str) -> EngineResult<String>;
    fn check_tx_proof(
        &self,
        tx_hash: &str,
        address: &str,
        message: &str,
        signature: &str,
    ) -> EngineResult<ProofCheck>;
    fn spend_proof(&self, tx_hash: &str, message: &str) -> EngineResult<String>;
    fn check_spend_proof(
        &self,
        tx_hash: &str,
        message: &str,
        signature: &str,
    ) -> EngineResult<bool>;
    fn reserve_proof_wallet(&self, message: &str) -> EngineResult<String>;
    fn reserve_proof_account(
        &self,
        account: u32,
        amount: u64,
        message: &str,
    ) -> EngineResult<String>;
    fn check_reserve_proof(
        &self,
        address: &str,
        message: &str,
        signature: &str,
    ) -> EngineResult<ProofCheck>;

    fn create_payment_uri(&self, request: &SendRequest) -> EngineResult<String>;
    fn parse_payment_uri(&self, uri: &str) -> EngineResult<SendRequest>;

    fn attribute(&self, key: &str) -> EngineResult<String>;
    fn set_attribute(&mut self, key: &str, value: &str) -> EngineResult<()>;

    fn start_mining(
        &mut self,
        num_threads: u64,
        background_mining: bool,
        ignore_battery: bool,
    ) -> EngineResult<()>;
    fn stop_mining(&mut self) -> EngineResult<()>;

    fn save(&mut self) -> EngineResult<()>;
    fn move_to(&mut self, path: &str, password: &str) -> EngineResult<()>;

    /// Flush and release native resources before the instance is dropped.
    fn close(&mut self) -> EngineResult<()>;
}

/// Constructs engine instances. Installed once at module load.
pub trait EngineBackend: Send + Sync {
    fn wallet_exists(&self, path: &str) -> EngineResult<bool>;

    fn open_wallet(
        &self,
        path: &str,
        password: Zeroizing<String>,
        network: NetworkType,
    ) -> EngineResult<Box<dyn WalletEngine>>;

    fn create_random(
        &self,
        path: &str,
        password: Zeroizing<String>,
        network: NetworkType,
        daemon: Option<RpcConnection>,
        language: &str,
    ) -> EngineResult<Box<dyn WalletEngine>>;

    fn create_from_mnemonic(
        &self,
        path: &str,
        password: Zeroizing<String>,
        mnemonic: Zeroizing<String>,
        network: NetworkType,
        restore_height: u64,
    ) -> EngineResult<Box<dyn WalletEngine>>;

    #[allow(clippy::too_many_arguments)]
    fn create_from_keys(
        &self,
        path: &str,
        password: Zeroizing<String>,
        address: &str,
        view_key: Zeroizing<String>,
        spend_key: Zeroizing<String>,
        network: NetworkType,
        restore_height: u64,
        language: &str,
    ) -> EngineResult<Box<dyn WalletEngine>>;
}

static BACKEND: Lazy<RwLock<Option<Arc<dyn EngineBackend>>>> = Lazy::new(|| RwLock::new(None));

/// Install the engine backend. Replaces any previously installed one.
pub fn install_backend(backend: Arc<dyn EngineBackend>) {
    if let Ok(mut slot) = BACKEND.write() {
        *slot = Some(backend);
    }
}

/// Drop the backend at module unload. Live engine handles keep their
/// instances; only construction is disabled.
pub fn shutdown_backend() {
    if let Ok(mut slot) = BACKEND.write() {
        *slot = None;
    }
}

pub fn current_backend() -> BridgeResult<Arc<dyn EngineBackend>> {
    let slot = match BACKEND.read() {
        Ok(slot) => slot,
        Err(poisoned) => poisoned.into_inner(),
    };
    slot.as_ref()
        .map(Arc::clone)
        .ok_or_else(|| BridgeError::Application("no engine backend installed".to_string()))
}
