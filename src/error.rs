//! Failure taxonomy and boundary translation.
//!
//! The engine signals failures as [`EngineError`]; the bridge translates
//! them into the host-visible [`BridgeError`] categories at the outermost
//! boundary call, never deeper. At the extern "C" surface each category
//! flattens to a stable negative code, with the human-readable message
//! parked in a process-wide slot the host can fetch separately.

use std::os::raw::c_int;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use thiserror::Error;

/// Failure signals of the external wallet engine.
///
/// The engine lives outside this crate; these are the only three shapes of
/// failure it reports across the seam.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine allocation failure")]
    OutOfMemory,
    #[error("engine i/o failure: {0}")]
    Io(String),
    #[error("{0}")]
    Failure(String),
}

/// Host-visible error categories.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid or destroyed handle {0}")]
    InvalidHandle(u64),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),
    #[error("i/o failure: {0}")]
    Io(String),
    #[error("{0}")]
    Application(String),
    #[error("unidentified native failure")]
    Unknown,
}

impl From<EngineError> for BridgeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::OutOfMemory => {
                BridgeError::ResourceExhaustion("engine allocation failure".to_string())
            }
            EngineError::Io(message) => BridgeError::Io(message),
            EngineError::Failure(message) => BridgeError::Application(message),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

pub const OK: c_int = 0;
pub const ERR_UNKNOWN: c_int = -1;
pub const ERR_INVALID_HANDLE: c_int = -2;
pub const ERR_INVALID_ARGUMENT: c_int = -3;
pub const ERR_RESOURCE_EXHAUSTION: c_int = -4;
pub const ERR_IO: c_int = -5;
pub const ERR_APPLICATION: c_int = -6;

impl BridgeError {
    pub fn code(&self) -> c_int {
        match self {
            BridgeError::InvalidHandle(_) => ERR_INVALID_HANDLE,
            BridgeError::InvalidArgument(_) => ERR_INVALID_ARGUMENT,
            BridgeError::ResourceExhaustion(_) => ERR_RESOURCE_EXHAUSTION,
            BridgeError::Io(_) => ERR_IO,
            BridgeError::Application(_) => ERR_APPLICATION,
            BridgeError::Unknown => ERR_UNKNOWN,
        }
    }
}

static LAST_ERROR_MESSAGE: Lazy<Mutex<Option<String>>> = Lazy::new(|| Mutex::new(None));

pub fn set_last_error<S: Into<String>>(message: S) {
    if let Ok(mut slot) = LAST_ERROR_MESSAGE.lock() {
        *slot = Some(message.into());
    }
}

pub fn clear_last_error() {
    if let Ok(mut slot) = LAST_ERROR_MESSAGE.lock() {
        *slot = None;
    }
}

pub fn last_error_message() -> Option<String> {
    LAST_ERROR_MESSAGE
        .lock()
        .map(|slot| slot.clone())
        .unwrap_or(None)
}

/// Record the error message and return its code for the boundary return.
pub fn record_error(err: &BridgeError) -> c_int {
    set_last_error(err.to_string());
    err.code()
}
