//! Handle arena for natively-owned objects.
//!
//! The host only ever sees opaque `u64` handles; this registry is the sole
//! place that converts between a handle and the live object it owns.
//! Handles come from a process-wide counter and are never reused, so a
//! stale handle can only ever miss the map and fail with `InvalidHandle`,
//! it can never alias a younger object.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::{BridgeError, BridgeResult};

pub type Handle = u64;

/// Handle 0 is reserved as "no object" on the FFI surface.
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> Handle {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

pub struct HandleRegistry<T> {
    slots: Mutex<HashMap<Handle, T>>,
}

impl<T> HandleRegistry<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Handle, T>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert(&self, value: T) -> Handle {
        let handle = next_handle();
        self.lock().insert(handle, value);
        handle
    }

    /// Run `f` against the object behind `handle`.
    ///
    /// The registry lock is held for the duration of the call; the host
    /// serializes operations per handle, so this only ever contends with
    /// create/destroy of other handles and with listener install.
    pub fn with<R>(&self, handle: Handle, f: impl FnOnce(&T) -> BridgeResult<R>) -> BridgeResult<R> {
        let slots = self.lock();
        match slots.get(&handle) {
            Some(value) => f(value),
            None => Err(BridgeError::InvalidHandle(handle)),
        }
    }

    pub fn with_mut<R>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut T) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let mut slots = self.lock();
        match slots.get_mut(&handle) {
            Some(value) => f(value),
            None => Err(BridgeError::InvalidHandle(handle)),
        }
    }

    /// Remove and return the owned object, invalidating the handle.
    pub fn remove(&self, handle: Handle) -> BridgeResult<T> {
        self.lock()
            .remove(&handle)
            .ok_or(BridgeError::InvalidHandle(handle))
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.lock().contains_key(&handle)
    }
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
