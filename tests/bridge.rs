//! End-to-end exercises of the extern "C" surface against a mock engine
//! backend: construction, queries, listener replacement and teardown, and
//! the error reporting contract.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;
use zeroize::Zeroizing;

use walletbridge::engine::{EngineBackend, EngineResult, WalletEngine};
use walletbridge::error::{
    EngineError, ERR_APPLICATION, ERR_INVALID_ARGUMENT, ERR_INVALID_HANDLE, OK,
};
use walletbridge::ffi;
use walletbridge::listener::{ListenerAdapter, WalletListenerCallbacks};
use walletbridge::model::{
    Account, BlockHeader, IntegratedAddress, KeyImage, KeyImageImportResult, NetworkType,
    OutputRecord, OutputWallet, ProofCheck, RpcConnection, Subaddress, SyncResult, TransferRecord,
    TxWallet,
};
use walletbridge::query::{OutputQuery, SendRequest, TransferQuery, TxQuery};

// The last-error slot and the backend slot are process-wide; run the FFI
// tests one at a time.
static FFI_GUARD: Mutex<()> = Mutex::new(());

fn ffi_lock() -> MutexGuard<'static, ()> {
    match FFI_GUARD.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// Adapters installed through set_listener, keyed by wallet path, so tests
// can inject engine events from arbitrary threads.
static ADAPTERS: Lazy<Mutex<HashMap<String, Arc<ListenerAdapter>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn installed_adapter(path: &str) -> Option<Arc<ListenerAdapter>> {
    ADAPTERS.lock().unwrap().get(path).cloned()
}

static CLOSED_PATHS: Lazy<Mutex<Vec<String>>> = Lazy::new(|| Mutex::new(Vec::new()));

struct MockEngine {
    path: String,
    network: NetworkType,
    restore_height: u64,
    daemon: Option<RpcConnection>,
    attributes: HashMap<String, String>,
}

impl MockEngine {
    fn boxed(path: &str, network: NetworkType) -> Box<dyn WalletEngine> {
        Box::new(Self {
            path: path.to_string(),
            network,
            restore_height: 0,
            daemon: None,
            attributes: HashMap::new(),
        })
    }

    fn fixture_txs() -> Vec<Arc<TxWallet>> {
        let block_100 = BlockHeader::at_height(100);
        vec![
            Arc::new(TxWallet::confirmed("aa11", Arc::clone(&block_100))),
            Arc::new(TxWallet::confirmed("bb22", Arc::clone(&block_100))),
            Arc::new(TxWallet::unconfirmed("cc33")),
        ]
    }

    fn fixture_subaddress(account: u32, index: u32) -> Subaddress {
        Subaddress {
            account_index: account,
            index,
            label: None,
            address: Some(format!("addr:{account}:{index}")),
            balance: 0,
            unlocked_balance: 0,
            num_unspent_outputs: 0,
            is_used: false,
        }
    }
}

impl WalletEngine for MockEngine {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn network_type(&self) -> NetworkType {
        self.network
    }

    fn mnemonic(&self) -> EngineResult<String> {
        Ok("mock mnemonic words".to_string())
    }

    fn language(&self) -> EngineResult<String> {
        Ok("English".to_string())
    }

    fn languages(&self) -> EngineResult<Vec<String>> {
        Ok(vec!["English".to_string(), "Deutsch".to_string()])
    }

    fn public_view_key(&self) -> EngineResult<String> {
        Ok("pub-view".to_string())
    }

    fn private_view_key(&self) -> EngineResult<String> {
        Ok("priv-view".to_string())
    }

    fn public_spend_key(&self) -> EngineResult<String> {
        Ok("pub-spend".to_string())
    }

    fn private_spend_key(&self) -> EngineResult<String> {
        Ok("priv-spend".to_string())
    }

    fn daemon_connection(&self) -> Option<RpcConnection> {
        self.daemon.clone()
    }

    fn set_daemon_connection(&mut self, connection: RpcConnection) -> EngineResult<()> {
        self.daemon = Some(connection);
        Ok(())
    }

    fn height(&self) -> u64 {
        101
    }

    fn chain_height(&self) -> EngineResult<u64> {
        Ok(250)
    }

    fn restore_height(&self) -> u64 {
        self.restore_height
    }

    fn set_restore_height(&mut self, height: u64) -> EngineResult<()> {
        self.restore_height = height;
        Ok(())
    }

    fn sync(&mut self, start_height: u64) -> EngineResult<SyncResult> {
        if let Some(adapter) = installed_adapter(&self.path) {
            adapter.notify_sync_progress(start_height, start_height, 250, 0.5, "syncing");
            adapter.notify_new_block(start_height + 1);
        }
        Ok(SyncResult {
            num_blocks_fetched: 250 - start_height,
            received_money: false,
        })
    }

    fn set_listener(&mut self, listener: Option<Arc<ListenerAdapter>>) {
        let mut adapters = ADAPTERS.lock().unwrap();
        match listener {
            Some(adapter) => {
                adapters.insert(self.path.clone(), adapter);
            }
            None => {
                adapters.remove(&self.path);
            }
        }
    }

    fn balance(&self, account: Option<u32>, _subaddress: Option<u32>) -> EngineResult<u64> {
        Ok(match account {
            None => 123_456_789_000,
            Some(_) => 1_000_000,
        })
    }

    fn unlocked_balance(&self, _account: Option<u32>, _subaddress: Option<u32>) -> EngineResult<u64> {
        Ok(120_000_000_000)
    }

    fn address(&self, account: u32, subaddress: u32) -> EngineResult<String> {
        Ok(format!("addr:{account}:{subaddress}"))
    }

    fn address_index(&self, address: &str) -> EngineResult<Subaddress> {
        if address.starts_with("addr:") {
            Ok(Self::fixture_subaddress(0, 1))
        } else {
            Err(EngineError::Failure(format!("unknown address {address}")))
        }
    }

    fn integrated_address(
        &self,
        standard_address: &str,
        payment_id: &str,
    ) -> EngineResult<IntegratedAddress> {
        Ok(IntegratedAddress {
            standard_address: standard_address.to_string(),
            payment_id: payment_id.to_string(),
            integrated_address: format!("{standard_address}+{payment_id}"),
        })
    }

    fn decode_integrated_address(&self, integrated: &str) -> EngineResult<IntegratedAddress> {
        Ok(IntegratedAddress {
            standard_address: "std".to_string(),
            payment_id: "pid".to_string(),
            integrated_address: integrated.to_string(),
        })
    }

    fn accounts(&self, include_subaddresses: bool, _tag: &str) -> EngineResult<Vec<Account>> {
        Ok(vec![Account {
            index: 0,
            label: Some("primary".to_string()),
            primary_address: Some("addr:0:0".to_string()),
            balance: 5,
            unlocked_balance: 5,
            subaddresses: if include_subaddresses {
                vec![Self::fixture_subaddress(0, 0)]
            } else {
                Vec::new()
            },
        }])
    }

    fn account(&self, index: u32, _include_subaddresses: bool) -> EngineResult<Account> {
        Ok(Account {
            index,
            label: None,
            primary_address: None,
            balance: 0,
            unlocked_balance: 0,
            subaddresses: Vec::new(),
        })
    }

    fn create_account(&mut self, label: &str) -> EngineResult<Account> {
        Ok(Account {
            index: 1,
            label: Some(label.to_string()),
            primary_address: None,
            balance: 0,
            unlocked_balance: 0,
            subaddresses: Vec::new(),
        })
    }

    fn subaddresses(&self, account: u32, indices: &[u32]) -> EngineResult<Vec<Subaddress>> {
        Ok(indices
            .iter()
            .map(|&index| Self::fixture_subaddress(account, index))
            .collect())
    }

    fn create_subaddress(&mut self, account: u32, _label: &str) -> EngineResult<Subaddress> {
        Ok(Self::fixture_subaddress(account, 2))
    }

    fn txs(&self, query: &TxQuery) -> EngineResult<Vec<Arc<TxWallet>>> {
        let txs = Self::fixture_txs();
        Ok(match &query.hash {
            Some(hash) => txs.into_iter().filter(|tx| &tx.hash == hash).collect(),
            None => txs,
        })
    }

    fn transfers(&self, _query: &TransferQuery) -> EngineResult<Vec<TransferRecord>> {
        let tx = Arc::new(TxWallet::confirmed("dd44", BlockHeader::at_height(120)));
        Ok(vec![
            TransferRecord {
                tx: Arc::clone(&tx),
                is_incoming: true,
            },
            TransferRecord {
                tx,
                is_incoming: false,
            },
        ])
    }

    fn outputs(&self, query: &OutputQuery) -> EngineResult<Vec<OutputRecord>> {
        // is_spent filter doubles as the trigger for an inconsistent
        // response: a spent "output" without a confirming block.
        let tx = if query.is_spent == Some(true) {
            TxWallet::unconfirmed("ee55")
        } else {
            let mut tx = TxWallet::confirmed("ee55", BlockHeader::at_height(130));
            tx.outputs = vec![OutputWallet {
                amount: 77,
                index: Some(3),
                account_index: 0,
                subaddress_index: 0,
                key_image: None,
                is_spent: false,
            }];
            tx
        };
        Ok(vec![OutputRecord { tx: Arc::new(tx) }])
    }

    fn outputs_hex(&self) -> EngineResult<String> {
        Ok("00aaff".to_string())
    }

    fn import_outputs_hex(&mut self, outputs_hex: &str) -> EngineResult<u32> {
        Ok((outputs_hex.len() / 2) as u32)
    }

    fn key_images(&self) -> EngineResult<Vec<KeyImage>> {
        Ok(vec![KeyImage {
            hex: "ki00".to_string(),
            signature: Some("sig00".to_string()),
        }])
    }

    fn import_key_images(&mut self, key_images: &[KeyImage]) -> EngineResult<KeyImageImportResult> {
        Ok(KeyImageImportResult {
            height: 100,
            spent_amount: key_images.len() as u64,
            unspent_amount: 0,
        })
    }

    fn send_split(&mut self, request: &SendRequest) -> EngineResult<Vec<Arc<TxWallet>>> {
        if request.destinations.is_empty() {
            return Err(EngineError::Failure("no destinations".to_string()));
        }
        Ok(vec![Arc::new(TxWallet::unconfirmed("send01"))])
    }

    fn sweep_output(&mut self, _request: &SendRequest) -> EngineResult<Arc<TxWallet>> {
        Ok(Arc::new(TxWallet::unconfirmed("sweep01")))
    }

    fn sweep_dust(&mut self, _do_not_relay: bool) -> EngineResult<Vec<Arc<TxWallet>>> {
        Ok(Vec::new())
    }

    fn relay_txs(&mut self, tx_metadatas: &[String]) -> EngineResult<Vec<String>> {
        Ok(tx_metadatas
            .iter()
            .map(|metadata| format!("hash-of-{metadata}"))
            .collect())
    }

    fn tx_notes(&self, tx_hashes: &[String]) -> EngineResult<Vec<String>> {
        Ok(tx_hashes.iter().map(|_| String::new()).collect())
    }

    fn set_tx_notes(&mut self, _tx_hashes: &[String], _notes: &[String]) -> EngineResult<()> {
        Ok(())
    }

    fn sign(&self, message: &str) -> EngineResult<String> {
        Ok(format!("signed:{message}"))
    }

    fn verify(&self, _message: &str, _address: &str, signature: &str) -> EngineResult<bool> {
        Ok(signature.starts_with("signed:"))
    }

    fn tx_key(&self, _tx_hash: &str) -> EngineResult<String> {
        Ok("txkey".to_string())
    }

    fn check_tx_key(
        &self,
        _tx_hash: &str,
        _tx_key: &str,
        _address: &str,
    ) -> EngineResult<ProofCheck> {
        Ok(ProofCheck {
            is_good: true,
            num_confirmations: Some(1),
            in_tx_pool: Some(false),
            received_amount: Some(42),
        })
    }

    fn tx_proof(&self, _tx_hash: &str, _address: &str, _message: &str) -> EngineResult<String> {
        Ok("txproof".to_string())
    }

    fn check_tx_proof(
        &self,
        _tx_hash: &str,
        _address: &str,
        _message: &str,
        _signature: &str,
    ) -> EngineResult<ProofCheck> {
        Ok(ProofCheck {
            is_good: false,
            num_confirmations: None,
            in_tx_pool: None,
            received_amount: None,
        })
    }

    fn spend_proof(&self, _tx_hash: &str, _message: &str) -> EngineResult<String> {
        Ok("spendproof".to_string())
    }

    fn check_spend_proof(
        &self,
        _tx_hash: &str,
        _message: &str,
        signature: &str,
    ) -> EngineResult<bool> {
        Ok(signature == "spendproof")
    }

    fn reserve_proof_wallet(&self, _message: &str) -> EngineResult<String> {
        Ok("reserve-all".to_string())
    }

    fn reserve_proof_account(
        &self,
        account: u32,
        amount: u64,
        _message: &str,
    ) -> EngineResult<String> {
        Ok(format!("reserve-{account}-{amount}"))
    }

    fn check_reserve_proof(
        &self,
        _address: &str,
        _message: &str,
        _signature: &str,
    ) -> EngineResult<ProofCheck> {
        Ok(ProofCheck {
            is_good: true,
            num_confirmations: None,
            in_tx_pool: None,
            received_amount: Some(9),
        })
    }

    fn create_payment_uri(&self, request: &SendRequest) -> EngineResult<String> {
        let address = request
            .destinations
            .first()
            .map(|destination| destination.address.as_str())
            .unwrap_or("");
        Ok(format!("pay:{address}"))
    }

    fn parse_payment_uri(&self, uri: &str) -> EngineResult<SendRequest> {
        Ok(SendRequest {
            payment_id: Some(uri.to_string()),
            ..SendRequest::default()
        })
    }

    fn attribute(&self, key: &str) -> EngineResult<String> {
        self.attributes
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::Failure(format!("no attribute {key}")))
    }

    fn set_attribute(&mut self, key: &str, value: &str) -> EngineResult<()> {
        self.attributes.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn start_mining(
        &mut self,
        _num_threads: u64,
        _background_mining: bool,
        _ignore_battery: bool,
    ) -> EngineResult<()> {
        Ok(())
    }

    fn stop_mining(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn save(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn move_to(&mut self, path: &str, _password: &str) -> EngineResult<()> {
        self.path = path.to_string();
        Ok(())
    }

    fn close(&mut self) -> EngineResult<()> {
        CLOSED_PATHS.lock().unwrap().push(self.path.clone());
        Ok(())
    }
}

struct MockBackend;

impl EngineBackend for MockBackend {
    fn wallet_exists(&self, path: &str) -> EngineResult<bool> {
        Ok(path.contains("existing"))
    }

    fn open_wallet(
        &self,
        path: &str,
        _password: Zeroizing<String>,
        network: NetworkType,
    ) -> EngineResult<Box<dyn WalletEngine>> {
        Ok(MockEngine::boxed(path, network))
    }

    fn create_random(
        &self,
        path: &str,
        _password: Zeroizing<String>,
        network: NetworkType,
        _daemon: Option<RpcConnection>,
        _language: &str,
    ) -> EngineResult<Box<dyn WalletEngine>> {
        Ok(MockEngine::boxed(path, network))
    }

    fn create_from_mnemonic(
        &self,
        path: &str,
        _password: Zeroizing<String>,
        mnemonic: Zeroizing<String>,
        network: NetworkType,
        restore_height: u64,
    ) -> EngineResult<Box<dyn WalletEngine>> {
        if mnemonic.trim().is_empty() {
            return Err(EngineError::Failure("empty mnemonic".to_string()));
        }
        let mut engine = MockEngine::boxed(path, network);
        engine.set_restore_height(restore_height)?;
        Ok(engine)
    }

    fn create_from_keys(
        &self,
        path: &str,
        _password: Zeroizing<String>,
        _address: &str,
        _view_key: Zeroizing<String>,
        _spend_key: Zeroizing<String>,
        network: NetworkType,
        restore_height: u64,
        _language: &str,
    ) -> EngineResult<Box<dyn WalletEngine>> {
        let mut engine = MockEngine::boxed(path, network);
        engine.set_restore_height(restore_height)?;
        Ok(engine)
    }
}

fn install_mock_backend() {
    walletbridge::install_backend(Arc::new(MockBackend));
}

// ---- FFI call helpers ----

fn cstring(text: &str) -> CString {
    CString::new(text).unwrap()
}

fn take_string(ptr_: *mut c_char) -> Option<String> {
    if ptr_.is_null() {
        return None;
    }
    let text = unsafe { CStr::from_ptr(ptr_) }.to_str().unwrap().to_string();
    ffi::walletbridge_free_cstr(ptr_);
    Some(text)
}

fn last_error() -> String {
    take_string(ffi::walletbridge_last_error_message()).unwrap_or_default()
}

fn open_wallet(path: &str) -> u64 {
    let path = cstring(path);
    let password = cstring("pw");
    let mut handle = 0u64;
    let code = ffi::wallet_open(path.as_ptr(), password.as_ptr(), 0, &mut handle);
    assert_eq!(code, OK, "open failed: {}", last_error());
    assert_ne!(handle, 0);
    handle
}

// ---- listener probe ----

struct CallbackProbe {
    new_blocks: AtomicUsize,
    last_height: AtomicU64,
    progress_events: AtomicUsize,
    retains: AtomicUsize,
    releases: AtomicUsize,
}

impl CallbackProbe {
    fn leaked() -> &'static Self {
        Box::leak(Box::new(Self {
            new_blocks: AtomicUsize::new(0),
            last_height: AtomicU64::new(0),
            progress_events: AtomicUsize::new(0),
            retains: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }))
    }

    fn callbacks(&'static self) -> WalletListenerCallbacks {
        WalletListenerCallbacks {
            context: self as *const Self as *mut c_void,
            on_new_block: Some(probe_on_new_block),
            on_sync_progress: Some(probe_on_sync_progress),
            retain: Some(probe_retain),
            release: Some(probe_release),
        }
    }
}

unsafe extern "C" fn probe_on_new_block(context: *mut c_void, height: u64) {
    let probe = &*(context as *const CallbackProbe);
    probe.new_blocks.fetch_add(1, Ordering::SeqCst);
    probe.last_height.store(height, Ordering::SeqCst);
}

unsafe extern "C" fn probe_on_sync_progress(
    context: *mut c_void,
    _height: u64,
    _start_height: u64,
    _end_height: u64,
    _percent_done: f64,
    message: *const c_char,
) {
    let probe = &*(context as *const CallbackProbe);
    // Counted only for a well-formed message; an assert here would panic
    // across the C boundary.
    if !message.is_null() {
        probe.progress_events.fetch_add(1, Ordering::SeqCst);
    }
}

unsafe extern "C" fn probe_retain(context: *mut c_void) {
    let probe = &*(context as *const CallbackProbe);
    probe.retains.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn probe_release(context: *mut c_void) {
    let probe = &*(context as *const CallbackProbe);
    probe.releases.fetch_add(1, Ordering::SeqCst);
}

fn set_listener(handle: u64, callbacks: Option<WalletListenerCallbacks>) -> u64 {
    let mut listener_handle = 0u64;
    let code = match callbacks {
        Some(callbacks) => ffi::wallet_set_listener(handle, &callbacks, &mut listener_handle),
        None => ffi::wallet_set_listener(handle, ptr::null(), &mut listener_handle),
    };
    assert_eq!(code, OK, "set_listener failed: {}", last_error());
    listener_handle
}

// ---- tests ----

#[test]
fn open_query_close_round_trip() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/alpha");

    let path = take_string(ffi::wallet_get_path(handle)).unwrap();
    assert_eq!(path, "wallets/alpha");

    let mut network = -1i32;
    assert_eq!(ffi::wallet_get_network_type(handle, &mut network), OK);
    assert_eq!(network, 0);

    let mut height = 0u64;
    assert_eq!(ffi::wallet_get_height(handle, &mut height), OK);
    assert_eq!(height, 101);

    // Two confirmed txs share block 100; the third is unconfirmed and
    // lands in a synthesized headerless block.
    let blocks_json = take_string(ffi::wallet_get_txs(handle, ptr::null())).unwrap();
    let value: serde_json::Value = serde_json::from_str(&blocks_json).unwrap();
    let blocks = value["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0]["height"], 100);
    assert_eq!(blocks[0]["txs"].as_array().unwrap().len(), 2);
    assert!(blocks[1].get("height").is_none());
    assert_eq!(blocks[1]["txs"][0]["hash"], "cc33");

    assert_eq!(ffi::wallet_close(handle), OK);
    assert!(CLOSED_PATHS
        .lock()
        .unwrap()
        .contains(&"wallets/alpha".to_string()));
}

#[test]
fn stale_handle_is_rejected_after_close() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/beta");
    assert_eq!(ffi::wallet_close(handle), OK);

    assert!(ffi::wallet_get_path(handle).is_null());
    assert!(last_error().contains("handle"));

    let mut height = 0u64;
    assert_eq!(
        ffi::wallet_get_height(handle, &mut height),
        ERR_INVALID_HANDLE
    );
    // Double close reports the same category.
    assert_eq!(ffi::wallet_close(handle), ERR_INVALID_HANDLE);
}

#[test]
fn handles_are_never_reissued() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let first = open_wallet("wallets/gamma");
    assert_eq!(ffi::wallet_close(first), OK);
    let second = open_wallet("wallets/gamma");
    assert_ne!(first, second);
    assert_eq!(ffi::wallet_close(second), OK);
}

#[test]
fn invalid_arguments_are_reported_with_messages() {
    let _ffi = ffi_lock();
    install_mock_backend();

    let mut handle = 0u64;
    let password = cstring("pw");
    assert_eq!(
        ffi::wallet_open(ptr::null(), password.as_ptr(), 0, &mut handle),
        ERR_INVALID_ARGUMENT
    );
    assert!(last_error().contains("path"));

    let path = cstring("wallets/delta");
    assert_eq!(
        ffi::wallet_open(path.as_ptr(), password.as_ptr(), 9, &mut handle),
        ERR_INVALID_ARGUMENT
    );
    assert!(last_error().contains("network"));

    let handle = open_wallet("wallets/delta");
    let bad_filter = cstring(r#"{"bogusField":true}"#);
    assert!(ffi::wallet_get_txs(handle, bad_filter.as_ptr()).is_null());
    assert!(last_error().contains("malformed"));

    // A successful call clears the sticky message.
    take_string(ffi::wallet_get_path(handle)).unwrap();
    assert!(take_string(ffi::walletbridge_last_error_message()).is_none());
    assert_eq!(ffi::wallet_close(handle), OK);
}

#[test]
fn engine_failures_surface_as_application_errors() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/epsilon");

    // No destinations makes the mock engine refuse the spend.
    let empty_request = cstring("{}");
    assert!(ffi::wallet_send_split(handle, empty_request.as_ptr()).is_null());
    assert!(last_error().contains("no destinations"));

    let missing_attribute = cstring("unset-key");
    assert!(ffi::wallet_get_attribute(handle, missing_attribute.as_ptr()).is_null());
    assert!(last_error().contains("unset-key"));

    assert_eq!(ffi::wallet_close(handle), OK);
}

#[test]
fn unconfirmed_output_from_engine_is_an_application_error() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/zeta");

    let spent_filter = cstring(r#"{"isSpent":true}"#);
    assert!(ffi::wallet_get_outputs(handle, spent_filter.as_ptr()).is_null());
    assert!(last_error().contains("unconfirmed output"));

    // The confirmed variant serializes normally.
    let blocks_json = take_string(ffi::wallet_get_outputs(handle, ptr::null())).unwrap();
    let value: serde_json::Value = serde_json::from_str(&blocks_json).unwrap();
    assert_eq!(value["blocks"][0]["height"], 130);
    assert_eq!(value["blocks"][0]["txs"][0]["outputs"][0]["amount"], 77);

    assert_eq!(ffi::wallet_close(handle), OK);
}

#[test]
fn balances_are_decimal_strings() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/eta");

    assert_eq!(
        take_string(ffi::wallet_get_balance(handle)).unwrap(),
        "123456789000"
    );
    assert_eq!(
        take_string(ffi::wallet_get_account_balance(handle, 2)).unwrap(),
        "1000000"
    );
    assert_eq!(
        take_string(ffi::wallet_get_unlocked_balance(handle)).unwrap(),
        "120000000000"
    );

    assert_eq!(ffi::wallet_close(handle), OK);
}

#[test]
fn wallet_exists_and_version() {
    let _ffi = ffi_lock();
    install_mock_backend();

    let mut exists = 0u8;
    let present = cstring("wallets/existing-one");
    assert_eq!(ffi::wallet_exists(present.as_ptr(), &mut exists), OK);
    assert_eq!(exists, 1);
    let absent = cstring("wallets/missing");
    assert_eq!(ffi::wallet_exists(absent.as_ptr(), &mut exists), OK);
    assert_eq!(exists, 0);

    let version = take_string(ffi::walletbridge_version()).unwrap();
    assert!(!version.is_empty());
}

#[test]
fn listener_install_deliver_replace_and_clear() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/theta");

    let first = CallbackProbe::leaked();
    let first_handle = set_listener(handle, Some(first.callbacks()));
    assert_ne!(first_handle, 0);
    assert_eq!(first.retains.load(Ordering::SeqCst), 1);

    // Sync drives both event kinds through the installed adapter.
    let sync_json = take_string(ffi::wallet_sync(handle, 200)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&sync_json).unwrap();
    assert_eq!(value["numBlocksFetched"], 50);
    assert_eq!(first.new_blocks.load(Ordering::SeqCst), 1);
    assert_eq!(first.last_height.load(Ordering::SeqCst), 201);
    assert_eq!(first.progress_events.load(Ordering::SeqCst), 1);

    // Replacement releases the old context and routes events exclusively
    // to the new listener.
    let second = CallbackProbe::leaked();
    let second_handle = set_listener(handle, Some(second.callbacks()));
    assert_ne!(second_handle, first_handle);
    assert_eq!(first.releases.load(Ordering::SeqCst), 1);
    take_string(ffi::wallet_sync(handle, 200)).unwrap();
    assert_eq!(first.new_blocks.load(Ordering::SeqCst), 1);
    assert_eq!(second.new_blocks.load(Ordering::SeqCst), 1);

    // Clearing releases the second context and stops delivery entirely.
    assert_eq!(set_listener(handle, None), 0);
    assert_eq!(second.releases.load(Ordering::SeqCst), 1);
    take_string(ffi::wallet_sync(handle, 200)).unwrap();
    assert_eq!(second.new_blocks.load(Ordering::SeqCst), 1);

    assert_eq!(ffi::wallet_close(handle), OK);
}

#[test]
fn replaced_listener_never_fires_even_from_a_live_worker() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/iota");

    let first = CallbackProbe::leaked();
    set_listener(handle, Some(first.callbacks()));
    let stale_adapter = installed_adapter("wallets/iota").unwrap();

    // A worker keeps delivering through the adapter it captured while the
    // main thread swaps listeners underneath it.
    let worker = {
        let adapter = Arc::clone(&stale_adapter);
        std::thread::spawn(move || {
            for height in 0..200u64 {
                adapter.notify_new_block(height);
            }
        })
    };
    let second = CallbackProbe::leaked();
    set_listener(handle, Some(second.callbacks()));
    worker.join().unwrap();

    // Replacement has completed: the first context is released and later
    // deliveries through the stale adapter are dropped at the sentinel.
    assert_eq!(first.releases.load(Ordering::SeqCst), 1);
    let settled = first.new_blocks.load(Ordering::SeqCst);
    stale_adapter.notify_new_block(9999);
    assert_eq!(first.new_blocks.load(Ordering::SeqCst), settled);
    assert_ne!(first.last_height.load(Ordering::SeqCst), 9999);

    assert_eq!(ffi::wallet_close(handle), OK);
}

#[test]
fn close_detaches_the_listener() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/kappa");

    let probe = CallbackProbe::leaked();
    set_listener(handle, Some(probe.callbacks()));
    let adapter = installed_adapter("wallets/kappa").unwrap();

    assert_eq!(ffi::wallet_close(handle), OK);
    assert!(adapter.is_detached());
    assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
    adapter.notify_new_block(5);
    assert_eq!(probe.new_blocks.load(Ordering::SeqCst), 0);
}

#[test]
fn envelopes_omit_empty_collections() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/lambda");

    // Sweep dust with nothing to sweep: empty object, no blocks key.
    let swept = take_string(ffi::wallet_sweep_dust(handle, 1)).unwrap();
    assert_eq!(swept, "{}");

    // Subaddresses for no indices: empty object as well.
    let none = take_string(ffi::wallet_get_subaddresses(handle, 0, ptr::null())).unwrap();
    assert_eq!(none, "{}");

    let indices = cstring("[0,2]");
    let some = take_string(ffi::wallet_get_subaddresses(handle, 0, indices.as_ptr())).unwrap();
    let value: serde_json::Value = serde_json::from_str(&some).unwrap();
    assert_eq!(value["subaddresses"].as_array().unwrap().len(), 2);
    assert_eq!(value["subaddresses"][1]["index"], 2);

    assert_eq!(ffi::wallet_close(handle), OK);
}

#[test]
fn daemon_connection_round_trips_as_array() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/mu");

    assert_eq!(
        take_string(ffi::wallet_get_daemon_connection(handle)).unwrap(),
        "[]"
    );

    let uri = cstring("http://localhost:38081");
    let user = cstring("u");
    let pass = cstring("p");
    assert_eq!(
        ffi::wallet_set_daemon_connection(handle, uri.as_ptr(), user.as_ptr(), pass.as_ptr()),
        OK
    );
    assert_eq!(
        take_string(ffi::wallet_get_daemon_connection(handle)).unwrap(),
        r#"["http://localhost:38081","u","p"]"#
    );

    assert_eq!(ffi::wallet_close(handle), OK);
}

#[test]
fn sweep_wraps_txs_in_one_synthesized_block() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/nu");

    let request = cstring(r#"{"keyImage":"ki00"}"#);
    let swept = take_string(ffi::wallet_sweep_output(handle, request.as_ptr())).unwrap();
    let value: serde_json::Value = serde_json::from_str(&swept).unwrap();
    let blocks = value["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].get("height").is_none());
    assert_eq!(blocks[0]["txs"][0]["hash"], "sweep01");

    assert_eq!(ffi::wallet_close(handle), OK);
}

#[test]
fn mismatched_tx_notes_are_rejected() {
    let _ffi = ffi_lock();
    install_mock_backend();
    let handle = open_wallet("wallets/xi");

    let hashes = cstring(r#"["aa","bb"]"#);
    let notes = cstring(r#"["only one"]"#);
    assert_eq!(
        ffi::wallet_set_tx_notes(handle, hashes.as_ptr(), notes.as_ptr()),
        ERR_INVALID_ARGUMENT
    );

    assert_eq!(ffi::wallet_close(handle), OK);
}

#[test]
fn no_backend_installed_is_an_application_error() {
    let _ffi = ffi_lock();
    walletbridge::shutdown_backend();
    let path = cstring("wallets/omicron");
    let password = cstring("pw");
    let mut handle = 0u64;
    assert_eq!(
        ffi::wallet_open(path.as_ptr(), password.as_ptr(), 0, &mut handle),
        ERR_APPLICATION
    );
    assert!(last_error().contains("backend"));
    install_mock_backend();
}
