//! Host-facing extern "C" surface.
//!
//! Every entry point follows the same discipline: clear the last-error
//! slot, validate pointers and UTF-8, resolve the handle through the
//! registry, run the operation, and translate any failure into a negative
//! code (message retrievable via `walletbridge_last_error_message`) before
//! control returns to the host. String results are heap CStrings the host
//! must free with `walletbridge_free_cstr`. Nothing crosses the boundary
//! untranslated, neither error values nor panics.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use once_cell::sync::Lazy;
use zeroize::Zeroizing;

use crate::engine::{current_backend, WalletEngine};
use crate::error::{
    clear_last_error, last_error_message, record_error, BridgeError, BridgeResult, OK,
};
use crate::graph;
use crate::listener::{
    install_runtime, shutdown_runtime, HostCallError, HostListener, HostRuntime, ListenerAdapter,
    ThreadAttachment, VTableListener, WalletListenerCallbacks,
};
use crate::model::{KeyImagesEnvelope, NetworkType, RpcConnection};
use crate::query;
use crate::registry::{Handle, HandleRegistry};

/// One registered engine instance plus its currently installed listener
/// handle. The cell mutex serializes operations against the instance and
/// lets the registry lock be released before any engine call runs.
struct EngineCell {
    engine: Box<dyn WalletEngine>,
    listener: Option<Handle>,
}

static ENGINES: Lazy<HandleRegistry<Arc<Mutex<EngineCell>>>> = Lazy::new(HandleRegistry::new);
static LISTENERS: Lazy<HandleRegistry<Arc<ListenerAdapter>>> = Lazy::new(HandleRegistry::new);

fn lock_cell(cell: &Arc<Mutex<EngineCell>>) -> MutexGuard<'_, EngineCell> {
    match cell.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn with_engine<R>(
    handle: Handle,
    f: impl FnOnce(&mut EngineCell) -> BridgeResult<R>,
) -> BridgeResult<R> {
    // Clone the cell out so the registry lock is not held across the
    // engine call; a blocking sync on one handle must not stall others.
    let cell = ENGINES.with(handle, |cell| Ok(Arc::clone(cell)))?;
    let mut guard = lock_cell(&cell);
    f(&mut guard)
}

fn register_engine(engine: Box<dyn WalletEngine>) -> Handle {
    ENGINES.insert(Arc::new(Mutex::new(EngineCell {
        engine,
        listener: None,
    })))
}

// ---- argument/result plumbing ----

fn required_str<'a>(ptr_: *const c_char, what: &str) -> BridgeResult<&'a str> {
    if ptr_.is_null() {
        return Err(BridgeError::InvalidArgument(format!(
            "{what} pointer was null"
        )));
    }
    unsafe { CStr::from_ptr(ptr_) }
        .to_str()
        .map_err(|_| BridgeError::InvalidArgument(format!("{what} contained invalid UTF-8")))
}

fn optional_str<'a>(ptr_: *const c_char, what: &str) -> BridgeResult<Option<&'a str>> {
    if ptr_.is_null() {
        return Ok(None);
    }
    required_str(ptr_, what).map(Some)
}

fn optional_or_empty<'a>(ptr_: *const c_char, what: &str) -> BridgeResult<&'a str> {
    Ok(optional_str(ptr_, what)?.unwrap_or(""))
}

fn write_out<T>(out: *mut T, value: T, what: &str) -> BridgeResult<()> {
    if out.is_null() {
        return Err(BridgeError::InvalidArgument(format!(
            "{what} output pointer was null"
        )));
    }
    unsafe { *out = value };
    Ok(())
}

fn into_cstring_ptr(text: String) -> *mut c_char {
    CString::new(text)
        .unwrap_or_else(|_| {
            CString::new("result contained interior NUL").expect("fallback cstring is valid")
        })
        .into_raw()
}

/// Outermost translation for code-returning entry points: every error and
/// every panic becomes a recorded negative code.
fn guarded(name: &str, body: impl FnOnce() -> BridgeResult<c_int>) -> c_int {
    clear_last_error();
    debug!("{name}");
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => record_error(&err),
        Err(_) => record_error(&BridgeError::Unknown),
    }
}

/// As [`guarded`] for string-returning entry points; failure returns null
/// with the code's message recorded.
fn guarded_string(name: &str, body: impl FnOnce() -> BridgeResult<String>) -> *mut c_char {
    clear_last_error();
    debug!("{name}");
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(text)) => into_cstring_ptr(text),
        Ok(Err(err)) => {
            record_error(&err);
            ptr::null_mut()
        }
        Err(_) => {
            record_error(&BridgeError::Unknown);
            ptr::null_mut()
        }
    }
}

// ---- process surface ----

#[no_mangle]
pub extern "C" fn walletbridge_version() -> *mut c_char {
    into_cstring_ptr(env!("CARGO_PKG_VERSION").to_string())
}

#[no_mangle]
pub extern "C" fn walletbridge_free_cstr(ptr_: *mut c_char) -> c_int {
    if ptr_.is_null() {
        return OK;
    }
    unsafe {
        drop(CString::from_raw(ptr_));
    }
    OK
}

#[no_mangle]
pub extern "C" fn walletbridge_last_error_message() -> *mut c_char {
    match last_error_message() {
        Some(text) => into_cstring_ptr(text),
        None => ptr::null_mut(),
    }
}

/// 0 = thread was already attached, 1 = newly attached, negative = failure.
pub type RuntimeAttachFn = unsafe extern "C" fn() -> c_int;
pub type RuntimeDetachFn = unsafe extern "C" fn();

struct FfiRuntime {
    attach: RuntimeAttachFn,
    detach: Option<RuntimeDetachFn>,
}

impl HostRuntime for FfiRuntime {
    fn attach_current_thread(&self) -> Result<ThreadAttachment, HostCallError> {
        let status = unsafe { (self.attach)() };
        if status < 0 {
            return Err(HostCallError(format!(
                "host runtime attach failed with status {status}"
            )));
        }
        if status == 0 {
            return Ok(ThreadAttachment::already_attached());
        }
        match self.detach {
            Some(detach) => Ok(ThreadAttachment::newly_attached(move || unsafe {
                detach()
            })),
            None => Ok(ThreadAttachment::already_attached()),
        }
    }
}

/// Install the host runtime descriptor for callback deliveries. Passing a
/// null attach function resets to the no-op runtime.
#[no_mangle]
pub extern "C" fn walletbridge_runtime_init(
    attach: Option<RuntimeAttachFn>,
    detach: Option<RuntimeDetachFn>,
) -> c_int {
    guarded("walletbridge_runtime_init", || {
        match attach {
            Some(attach) => install_runtime(Arc::new(FfiRuntime { attach, detach })),
            None => shutdown_runtime(),
        }
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn walletbridge_runtime_shutdown() -> c_int {
    guarded("walletbridge_runtime_shutdown", || {
        shutdown_runtime();
        Ok(OK)
    })
}

// ---- construction ----

#[no_mangle]
pub extern "C" fn wallet_exists(path: *const c_char, out_exists: *mut u8) -> c_int {
    guarded("wallet_exists", || {
        let path = required_str(path, "path")?;
        let exists = current_backend()?.wallet_exists(path)?;
        write_out(out_exists, exists as u8, "exists")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_open(
    path: *const c_char,
    password: *const c_char,
    network_type: i32,
    out_handle: *mut u64,
) -> c_int {
    guarded("wallet_open", || {
        let path = required_str(path, "path")?;
        let password = Zeroizing::new(optional_or_empty(password, "password")?.to_string());
        let network = NetworkType::from_i32(network_type)?;
        let engine = current_backend()?.open_wallet(path, password, network)?;
        write_out(out_handle, register_engine(engine), "handle")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_create_random(
    path: *const c_char,
    password: *const c_char,
    network_type: i32,
    daemon_uri: *const c_char,
    daemon_username: *const c_char,
    daemon_password: *const c_char,
    language: *const c_char,
    out_handle: *mut u64,
) -> c_int {
    guarded("wallet_create_random", || {
        let path = optional_or_empty(path, "path")?;
        let password = Zeroizing::new(optional_or_empty(password, "password")?.to_string());
        let network = NetworkType::from_i32(network_type)?;
        let daemon = match optional_str(daemon_uri, "daemon uri")? {
            Some(uri) => Some(RpcConnection {
                uri: uri.to_string(),
                username: optional_or_empty(daemon_username, "daemon username")?.to_string(),
                password: optional_or_empty(daemon_password, "daemon password")?.to_string(),
            }),
            None => None,
        };
        let language = optional_or_empty(language, "language")?;
        let engine = current_backend()?.create_random(path, password, network, daemon, language)?;
        write_out(out_handle, register_engine(engine), "handle")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_create_from_mnemonic(
    path: *const c_char,
    password: *const c_char,
    mnemonic: *const c_char,
    network_type: i32,
    restore_height: u64,
    out_handle: *mut u64,
) -> c_int {
    guarded("wallet_create_from_mnemonic", || {
        let path = optional_or_empty(path, "path")?;
        let password = Zeroizing::new(optional_or_empty(password, "password")?.to_string());
        let mnemonic = Zeroizing::new(required_str(mnemonic, "mnemonic")?.to_string());
        let network = NetworkType::from_i32(network_type)?;
        let engine = current_backend()?.create_from_mnemonic(
            path,
            password,
            mnemonic,
            network,
            restore_height,
        )?;
        write_out(out_handle, register_engine(engine), "handle")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_create_from_keys(
    path: *const c_char,
    password: *const c_char,
    address: *const c_char,
    view_key: *const c_char,
    spend_key: *const c_char,
    network_type: i32,
    restore_height: u64,
    language: *const c_char,
    out_handle: *mut u64,
) -> c_int {
    guarded("wallet_create_from_keys", || {
        let path = optional_or_empty(path, "path")?;
        let password = Zeroizing::new(optional_or_empty(password, "password")?.to_string());
        let address = optional_or_empty(address, "address")?;
        let view_key = Zeroizing::new(optional_or_empty(view_key, "view key")?.to_string());
        let spend_key = Zeroizing::new(optional_or_empty(spend_key, "spend key")?.to_string());
        let network = NetworkType::from_i32(network_type)?;
        let language = optional_or_empty(language, "language")?;
        let engine = current_backend()?.create_from_keys(
            path,
            password,
            address,
            view_key,
            spend_key,
            network,
            restore_height,
            language,
        )?;
        write_out(out_handle, register_engine(engine), "handle")?;
        Ok(OK)
    })
}

// ---- instance metadata ----

#[no_mangle]
pub extern "C" fn wallet_get_path(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_path", || {
        with_engine(handle, |cell| Ok(cell.engine.path()))
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_network_type(handle: u64, out_network: *mut i32) -> c_int {
    guarded("wallet_get_network_type", || {
        let network = with_engine(handle, |cell| Ok(cell.engine.network_type()))?;
        write_out(out_network, network.as_i32(), "network type")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_mnemonic(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_mnemonic", || {
        with_engine(handle, |cell| Ok(cell.engine.mnemonic()?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_language(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_language", || {
        with_engine(handle, |cell| Ok(cell.engine.language()?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_languages(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_languages", || {
        let languages = with_engine(handle, |cell| Ok(cell.engine.languages()?))?;
        query::encode(&languages)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_public_view_key(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_public_view_key", || {
        with_engine(handle, |cell| Ok(cell.engine.public_view_key()?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_private_view_key(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_private_view_key", || {
        with_engine(handle, |cell| Ok(cell.engine.private_view_key()?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_public_spend_key(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_public_spend_key", || {
        with_engine(handle, |cell| Ok(cell.engine.public_spend_key()?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_private_spend_key(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_private_spend_key", || {
        with_engine(handle, |cell| Ok(cell.engine.private_spend_key()?))
    })
}

// ---- daemon connection ----

/// Returns a JSON array `[uri, username, password]`, or `[]` when no
/// daemon connection is configured.
#[no_mangle]
pub extern "C" fn wallet_get_daemon_connection(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_daemon_connection", || {
        let connection = with_engine(handle, |cell| Ok(cell.engine.daemon_connection()))?;
        match connection {
            Some(connection) => {
                query::encode(&[connection.uri, connection.username, connection.password])
            }
            None => query::encode(&Vec::<String>::new()),
        }
    })
}

#[no_mangle]
pub extern "C" fn wallet_set_daemon_connection(
    handle: u64,
    uri: *const c_char,
    username: *const c_char,
    password: *const c_char,
) -> c_int {
    guarded("wallet_set_daemon_connection", || {
        let connection = RpcConnection {
            uri: optional_or_empty(uri, "uri")?.to_string(),
            username: optional_or_empty(username, "username")?.to_string(),
            password: optional_or_empty(password, "password")?.to_string(),
        };
        with_engine(handle, |cell| {
            cell.engine.set_daemon_connection(connection)?;
            Ok(OK)
        })
    })
}

// ---- heights and sync ----

#[no_mangle]
pub extern "C" fn wallet_get_height(handle: u64, out_height: *mut u64) -> c_int {
    guarded("wallet_get_height", || {
        let height = with_engine(handle, |cell| Ok(cell.engine.height()))?;
        write_out(out_height, height, "height")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_chain_height(handle: u64, out_height: *mut u64) -> c_int {
    guarded("wallet_get_chain_height", || {
        let height = with_engine(handle, |cell| Ok(cell.engine.chain_height()?))?;
        write_out(out_height, height, "chain height")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_restore_height(handle: u64, out_height: *mut u64) -> c_int {
    guarded("wallet_get_restore_height", || {
        let height = with_engine(handle, |cell| Ok(cell.engine.restore_height()))?;
        write_out(out_height, height, "restore height")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_set_restore_height(handle: u64, height: u64) -> c_int {
    guarded("wallet_set_restore_height", || {
        with_engine(handle, |cell| {
            cell.engine.set_restore_height(height)?;
            Ok(OK)
        })
    })
}

/// Blocks until the sync pass completes; returns the sync result echo.
#[no_mangle]
pub extern "C" fn wallet_sync(handle: u64, start_height: u64) -> *mut c_char {
    guarded_string("wallet_sync", || {
        let result = with_engine(handle, |cell| Ok(cell.engine.sync(start_height)?))?;
        query::encode(&result)
    })
}

// ---- listener ----

/// Replace the engine's listener. The previous adapter (if any) is
/// detached from the engine, cleared, and released before the new one is
/// installed. A null/empty callbacks table clears the listener; the new
/// listener handle (or 0 for none) is written to `out_listener`.
#[no_mangle]
pub extern "C" fn wallet_set_listener(
    handle: u64,
    callbacks: *const WalletListenerCallbacks,
    out_listener: *mut u64,
) -> c_int {
    guarded("wallet_set_listener", || {
        write_out(out_listener, 0u64, "listener handle")?;
        let incoming = if callbacks.is_null() {
            None
        } else {
            VTableListener::new(unsafe { *callbacks })
        };
        with_engine(handle, |cell| {
            cell.engine.set_listener(None);
            if let Some(old) = cell.listener.take() {
                if let Ok(adapter) = LISTENERS.remove(old) {
                    adapter.detach();
                }
            }
            if let Some(listener) = incoming {
                let adapter = ListenerAdapter::new(Arc::new(listener) as Arc<dyn HostListener>);
                cell.engine.set_listener(Some(Arc::clone(&adapter)));
                let listener_handle = LISTENERS.insert(adapter);
                cell.listener = Some(listener_handle);
                unsafe { *out_listener = listener_handle };
            }
            Ok(OK)
        })
    })
}

// ---- balances ----

fn balance_string(
    handle: u64,
    account: Option<u32>,
    subaddress: Option<u32>,
    unlocked: bool,
) -> BridgeResult<String> {
    let balance = with_engine(handle, |cell| {
        Ok(if unlocked {
            cell.engine.unlocked_balance(account, subaddress)?
        } else {
            cell.engine.balance(account, subaddress)?
        })
    })?;
    // decimal text so 64-bit amounts survive hosts without u64
    Ok(balance.to_string())
}

#[no_mangle]
pub extern "C" fn wallet_get_balance(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_balance", || {
        balance_string(handle, None, None, false)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_account_balance(handle: u64, account: u32) -> *mut c_char {
    guarded_string("wallet_get_account_balance", || {
        balance_string(handle, Some(account), None, false)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_subaddress_balance(
    handle: u64,
    account: u32,
    subaddress: u32,
) -> *mut c_char {
    guarded_string("wallet_get_subaddress_balance", || {
        balance_string(handle, Some(account), Some(subaddress), false)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_unlocked_balance(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_unlocked_balance", || {
        balance_string(handle, None, None, true)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_account_unlocked_balance(handle: u64, account: u32) -> *mut c_char {
    guarded_string("wallet_get_account_unlocked_balance", || {
        balance_string(handle, Some(account), None, true)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_subaddress_unlocked_balance(
    handle: u64,
    account: u32,
    subaddress: u32,
) -> *mut c_char {
    guarded_string("wallet_get_subaddress_unlocked_balance", || {
        balance_string(handle, Some(account), Some(subaddress), true)
    })
}

// ---- addresses, accounts, subaddresses ----

#[no_mangle]
pub extern "C" fn wallet_get_address(handle: u64, account: u32, subaddress: u32) -> *mut c_char {
    guarded_string("wallet_get_address", || {
        with_engine(handle, |cell| Ok(cell.engine.address(account, subaddress)?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_address_index(handle: u64, address: *const c_char) -> *mut c_char {
    guarded_string("wallet_get_address_index", || {
        let address = required_str(address, "address")?;
        let subaddress = with_engine(handle, |cell| Ok(cell.engine.address_index(address)?))?;
        query::encode(&subaddress)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_integrated_address(
    handle: u64,
    standard_address: *const c_char,
    payment_id: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_get_integrated_address", || {
        let standard_address = optional_or_empty(standard_address, "standard address")?;
        let payment_id = optional_or_empty(payment_id, "payment id")?;
        let integrated = with_engine(handle, |cell| {
            Ok(cell.engine.integrated_address(standard_address, payment_id)?)
        })?;
        query::encode(&integrated)
    })
}

#[no_mangle]
pub extern "C" fn wallet_decode_integrated_address(
    handle: u64,
    integrated_address: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_decode_integrated_address", || {
        let integrated_address = required_str(integrated_address, "integrated address")?;
        let decoded = with_engine(handle, |cell| {
            Ok(cell.engine.decode_integrated_address(integrated_address)?)
        })?;
        query::encode(&decoded)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_accounts(
    handle: u64,
    include_subaddresses: u8,
    tag: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_get_accounts", || {
        let tag = optional_or_empty(tag, "tag")?;
        let accounts = with_engine(handle, |cell| {
            Ok(cell.engine.accounts(include_subaddresses != 0, tag)?)
        })?;
        query::encode(&crate::model::AccountsEnvelope { accounts })
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_account(
    handle: u64,
    account: u32,
    include_subaddresses: u8,
) -> *mut c_char {
    guarded_string("wallet_get_account", || {
        let account = with_engine(handle, |cell| {
            Ok(cell.engine.account(account, include_subaddresses != 0)?)
        })?;
        query::encode(&account)
    })
}

#[no_mangle]
pub extern "C" fn wallet_create_account(handle: u64, label: *const c_char) -> *mut c_char {
    guarded_string("wallet_create_account", || {
        let label = optional_or_empty(label, "label")?;
        let account = with_engine(handle, |cell| Ok(cell.engine.create_account(label)?))?;
        query::encode(&account)
    })
}

/// `indices` is an optional JSON array of subaddress indices; absent means
/// all subaddresses of the account.
#[no_mangle]
pub extern "C" fn wallet_get_subaddresses(
    handle: u64,
    account: u32,
    indices: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_get_subaddresses", || {
        let indices = query::decode_u32_array(optional_str(indices, "indices")?)?;
        let subaddresses = with_engine(handle, |cell| {
            Ok(cell.engine.subaddresses(account, &indices)?)
        })?;
        query::encode(&crate::model::SubaddressesEnvelope { subaddresses })
    })
}

#[no_mangle]
pub extern "C" fn wallet_create_subaddress(
    handle: u64,
    account: u32,
    label: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_create_subaddress", || {
        let label = optional_or_empty(label, "label")?;
        let subaddress = with_engine(handle, |cell| {
            Ok(cell.engine.create_subaddress(account, label)?)
        })?;
        query::encode(&subaddress)
    })
}

// ---- queries ----

#[no_mangle]
pub extern "C" fn wallet_get_txs(handle: u64, filter: *const c_char) -> *mut c_char {
    guarded_string("wallet_get_txs", || {
        let tx_query = query::decode_tx_query(optional_str(filter, "tx filter")?)?;
        let txs = with_engine(handle, |cell| Ok(cell.engine.txs(&tx_query)?))?;
        graph::encode_blocks(graph::blocks_for_txs(&txs))
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_transfers(handle: u64, filter: *const c_char) -> *mut c_char {
    guarded_string("wallet_get_transfers", || {
        let transfer_query = query::decode_transfer_query(optional_str(filter, "transfer filter")?)?;
        let transfers = with_engine(handle, |cell| Ok(cell.engine.transfers(&transfer_query)?))?;
        graph::encode_blocks(graph::blocks_for_transfers(&transfers))
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_outputs(handle: u64, filter: *const c_char) -> *mut c_char {
    guarded_string("wallet_get_outputs", || {
        let output_query = query::decode_output_query(optional_str(filter, "output filter")?)?;
        let outputs = with_engine(handle, |cell| Ok(cell.engine.outputs(&output_query)?))?;
        graph::encode_blocks(graph::blocks_for_outputs(&outputs)?)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_outputs_hex(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_outputs_hex", || {
        with_engine(handle, |cell| Ok(cell.engine.outputs_hex()?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_import_outputs_hex(
    handle: u64,
    outputs_hex: *const c_char,
    out_imported: *mut u32,
) -> c_int {
    guarded("wallet_import_outputs_hex", || {
        let outputs_hex = optional_or_empty(outputs_hex, "outputs hex")?;
        let imported = with_engine(handle, |cell| {
            Ok(cell.engine.import_outputs_hex(outputs_hex)?)
        })?;
        write_out(out_imported, imported, "imported count")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_key_images(handle: u64) -> *mut c_char {
    guarded_string("wallet_get_key_images", || {
        let key_images = with_engine(handle, |cell| Ok(cell.engine.key_images()?))?;
        query::encode(&KeyImagesEnvelope { key_images })
    })
}

#[no_mangle]
pub extern "C" fn wallet_import_key_images(handle: u64, payload: *const c_char) -> *mut c_char {
    guarded_string("wallet_import_key_images", || {
        let key_images = query::decode_key_images(optional_str(payload, "key images")?)?;
        let result = with_engine(handle, |cell| {
            Ok(cell.engine.import_key_images(&key_images)?)
        })?;
        query::encode(&result)
    })
}

// ---- spending ----

#[no_mangle]
pub extern "C" fn wallet_send_split(handle: u64, request: *const c_char) -> *mut c_char {
    guarded_string("wallet_send_split", || {
        let request = query::decode_send_request(optional_str(request, "send request")?)?;
        let txs = with_engine(handle, |cell| Ok(cell.engine.send_split(&request)?))?;
        graph::encode_blocks(graph::blocks_for_txs(&txs))
    })
}

#[no_mangle]
pub extern "C" fn wallet_sweep_output(handle: u64, request: *const c_char) -> *mut c_char {
    guarded_string("wallet_sweep_output", || {
        let request = query::decode_send_request(optional_str(request, "sweep request")?)?;
        let tx = with_engine(handle, |cell| Ok(cell.engine.sweep_output(&request)?))?;
        graph::encode_blocks(graph::single_block(vec![tx]))
    })
}

#[no_mangle]
pub extern "C" fn wallet_sweep_dust(handle: u64, do_not_relay: u8) -> *mut c_char {
    guarded_string("wallet_sweep_dust", || {
        let txs = with_engine(handle, |cell| Ok(cell.engine.sweep_dust(do_not_relay != 0)?))?;
        graph::encode_blocks(graph::single_block(txs))
    })
}

/// `metadatas` is a JSON array of tx metadata strings; returns a JSON
/// array of relayed tx hashes.
#[no_mangle]
pub extern "C" fn wallet_relay_txs(handle: u64, metadatas: *const c_char) -> *mut c_char {
    guarded_string("wallet_relay_txs", || {
        let metadatas = query::decode_string_array(optional_str(metadatas, "tx metadatas")?)?;
        let hashes = with_engine(handle, |cell| Ok(cell.engine.relay_txs(&metadatas)?))?;
        query::encode(&hashes)
    })
}

// ---- notes, signing, proofs ----

#[no_mangle]
pub extern "C" fn wallet_get_tx_notes(handle: u64, tx_hashes: *const c_char) -> *mut c_char {
    guarded_string("wallet_get_tx_notes", || {
        let tx_hashes = query::decode_string_array(optional_str(tx_hashes, "tx hashes")?)?;
        let notes = with_engine(handle, |cell| Ok(cell.engine.tx_notes(&tx_hashes)?))?;
        query::encode(&notes)
    })
}

#[no_mangle]
pub extern "C" fn wallet_set_tx_notes(
    handle: u64,
    tx_hashes: *const c_char,
    notes: *const c_char,
) -> c_int {
    guarded("wallet_set_tx_notes", || {
        let tx_hashes = query::decode_string_array(optional_str(tx_hashes, "tx hashes")?)?;
        let notes = query::decode_string_array(optional_str(notes, "notes")?)?;
        if tx_hashes.len() != notes.len() {
            return Err(BridgeError::InvalidArgument(format!(
                "{} tx hashes but {} notes",
                tx_hashes.len(),
                notes.len()
            )));
        }
        with_engine(handle, |cell| {
            cell.engine.set_tx_notes(&tx_hashes, &notes)?;
            Ok(OK)
        })
    })
}

#[no_mangle]
pub extern "C" fn wallet_sign(handle: u64, message: *const c_char) -> *mut c_char {
    guarded_string("wallet_sign", || {
        let message = optional_or_empty(message, "message")?;
        with_engine(handle, |cell| Ok(cell.engine.sign(message)?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_verify(
    handle: u64,
    message: *const c_char,
    address: *const c_char,
    signature: *const c_char,
    out_good: *mut u8,
) -> c_int {
    guarded("wallet_verify", || {
        let message = optional_or_empty(message, "message")?;
        let address = optional_or_empty(address, "address")?;
        let signature = optional_or_empty(signature, "signature")?;
        let good = with_engine(handle, |cell| {
            Ok(cell.engine.verify(message, address, signature)?)
        })?;
        write_out(out_good, good as u8, "verification")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_tx_key(handle: u64, tx_hash: *const c_char) -> *mut c_char {
    guarded_string("wallet_get_tx_key", || {
        let tx_hash = required_str(tx_hash, "tx hash")?;
        with_engine(handle, |cell| Ok(cell.engine.tx_key(tx_hash)?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_check_tx_key(
    handle: u64,
    tx_hash: *const c_char,
    tx_key: *const c_char,
    address: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_check_tx_key", || {
        let tx_hash = required_str(tx_hash, "tx hash")?;
        let tx_key = required_str(tx_key, "tx key")?;
        let address = required_str(address, "address")?;
        let check = with_engine(handle, |cell| {
            Ok(cell.engine.check_tx_key(tx_hash, tx_key, address)?)
        })?;
        query::encode(&check)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_tx_proof(
    handle: u64,
    tx_hash: *const c_char,
    address: *const c_char,
    message: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_get_tx_proof", || {
        let tx_hash = required_str(tx_hash, "tx hash")?;
        let address = optional_or_empty(address, "address")?;
        let message = optional_or_empty(message, "message")?;
        with_engine(handle, |cell| {
            Ok(cell.engine.tx_proof(tx_hash, address, message)?)
        })
    })
}

#[no_mangle]
pub extern "C" fn wallet_check_tx_proof(
    handle: u64,
    tx_hash: *const c_char,
    address: *const c_char,
    message: *const c_char,
    signature: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_check_tx_proof", || {
        let tx_hash = required_str(tx_hash, "tx hash")?;
        let address = optional_or_empty(address, "address")?;
        let message = optional_or_empty(message, "message")?;
        let signature = required_str(signature, "signature")?;
        let check = with_engine(handle, |cell| {
            Ok(cell
                .engine
                .check_tx_proof(tx_hash, address, message, signature)?)
        })?;
        query::encode(&check)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_spend_proof(
    handle: u64,
    tx_hash: *const c_char,
    message: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_get_spend_proof", || {
        let tx_hash = required_str(tx_hash, "tx hash")?;
        let message = optional_or_empty(message, "message")?;
        with_engine(handle, |cell| Ok(cell.engine.spend_proof(tx_hash, message)?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_check_spend_proof(
    handle: u64,
    tx_hash: *const c_char,
    message: *const c_char,
    signature: *const c_char,
    out_good: *mut u8,
) -> c_int {
    guarded("wallet_check_spend_proof", || {
        let tx_hash = required_str(tx_hash, "tx hash")?;
        let message = optional_or_empty(message, "message")?;
        let signature = required_str(signature, "signature")?;
        let good = with_engine(handle, |cell| {
            Ok(cell.engine.check_spend_proof(tx_hash, message, signature)?)
        })?;
        write_out(out_good, good as u8, "proof check")?;
        Ok(OK)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_reserve_proof_wallet(
    handle: u64,
    message: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_get_reserve_proof_wallet", || {
        let message = optional_or_empty(message, "message")?;
        with_engine(handle, |cell| Ok(cell.engine.reserve_proof_wallet(message)?))
    })
}

/// `amount` is a decimal string so full 64-bit amounts survive hosts
/// without unsigned 64-bit integers.
#[no_mangle]
pub extern "C" fn wallet_get_reserve_proof_account(
    handle: u64,
    account: u32,
    amount: *const c_char,
    message: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_get_reserve_proof_account", || {
        let amount_text = required_str(amount, "amount")?;
        let amount = amount_text.trim().parse::<u64>().map_err(|_| {
            BridgeError::InvalidArgument(format!("bad reserve amount {amount_text:?}"))
        })?;
        let message = optional_or_empty(message, "message")?;
        with_engine(handle, |cell| {
            Ok(cell.engine.reserve_proof_account(account, amount, message)?)
        })
    })
}

#[no_mangle]
pub extern "C" fn wallet_check_reserve_proof(
    handle: u64,
    address: *const c_char,
    message: *const c_char,
    signature: *const c_char,
) -> *mut c_char {
    guarded_string("wallet_check_reserve_proof", || {
        let address = required_str(address, "address")?;
        let message = optional_or_empty(message, "message")?;
        let signature = required_str(signature, "signature")?;
        let check = with_engine(handle, |cell| {
            Ok(cell.engine.check_reserve_proof(address, message, signature)?)
        })?;
        query::encode(&check)
    })
}

// ---- payment uris, attributes, mining ----

#[no_mangle]
pub extern "C" fn wallet_create_payment_uri(handle: u64, request: *const c_char) -> *mut c_char {
    guarded_string("wallet_create_payment_uri", || {
        let request = query::decode_send_request(optional_str(request, "send request")?)?;
        with_engine(handle, |cell| Ok(cell.engine.create_payment_uri(&request)?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_parse_payment_uri(handle: u64, uri: *const c_char) -> *mut c_char {
    guarded_string("wallet_parse_payment_uri", || {
        let uri = required_str(uri, "uri")?;
        let request = with_engine(handle, |cell| Ok(cell.engine.parse_payment_uri(uri)?))?;
        query::encode(&request)
    })
}

#[no_mangle]
pub extern "C" fn wallet_get_attribute(handle: u64, key: *const c_char) -> *mut c_char {
    guarded_string("wallet_get_attribute", || {
        let key = required_str(key, "key")?;
        with_engine(handle, |cell| Ok(cell.engine.attribute(key)?))
    })
}

#[no_mangle]
pub extern "C" fn wallet_set_attribute(
    handle: u64,
    key: *const c_char,
    value: *const c_char,
) -> c_int {
    guarded("wallet_set_attribute", || {
        let key = required_str(key, "key")?;
        let value = required_str(value, "value")?;
        with_engine(handle, |cell| {
            cell.engine.set_attribute(key, value)?;
            Ok(OK)
        })
    })
}

#[no_mangle]
pub extern "C" fn wallet_start_mining(
    handle: u64,
    num_threads: u64,
    background_mining: u8,
    ignore_battery: u8,
) -> c_int {
    guarded("wallet_start_mining", || {
        with_engine(handle, |cell| {
            cell.engine
                .start_mining(num_threads, background_mining != 0, ignore_battery != 0)?;
            Ok(OK)
        })
    })
}

#[no_mangle]
pub extern "C" fn wallet_stop_mining(handle: u64) -> c_int {
    guarded("wallet_stop_mining", || {
        with_engine(handle, |cell| {
            cell.engine.stop_mining()?;
            Ok(OK)
        })
    })
}

// ---- persistence and teardown ----

#[no_mangle]
pub extern "C" fn wallet_save(handle: u64) -> c_int {
    guarded("wallet_save", || {
        with_engine(handle, |cell| {
            cell.engine.save()?;
            Ok(OK)
        })
    })
}

#[no_mangle]
pub extern "C" fn wallet_move_to(
    handle: u64,
    path: *const c_char,
    password: *const c_char,
) -> c_int {
    guarded("wallet_move_to", || {
        let path = required_str(path, "path")?;
        let password = optional_or_empty(password, "password")?;
        with_engine(handle, |cell| {
            cell.engine.move_to(path, password)?;
            Ok(OK)
        })
    })
}

/// Destroy the engine behind `handle`. Any installed listener is detached
/// first so the engine's background thread cannot reach a dangling host
/// reference; the handle is invalid from this point on and never reissued.
#[no_mangle]
pub extern "C" fn wallet_close(handle: u64) -> c_int {
    guarded("wallet_close", || {
        let cell = ENGINES.remove(handle)?;
        let mut guard = lock_cell(&cell);
        guard.engine.set_listener(None);
        if let Some(listener) = guard.listener.take() {
            if let Ok(adapter) = LISTENERS.remove(listener) {
                adapter.detach();
            }
        }
        guard.engine.close()?;
        Ok(OK)
    })
}
