//! Callback relay from native engine worker threads into the host.
//!
//! Engine events fire on threads the host runtime has never seen. Every
//! delivery therefore: takes the adapter lock, checks the detached
//! sentinel, attaches the calling thread to the host runtime for the
//! duration of the call, and contains any failure inside the delivery so
//! nothing propagates back into native code. Detach clears the host
//! reference under the same lock, so a delivery either completes against
//! the old still-valid reference or observes the sentinel and skips; it
//! can never touch a released reference.

use std::os::raw::{c_char, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::warn;
use once_cell::sync::Lazy;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HostCallError(pub String);

/// Host-side callback object, as seen by the bridge.
pub trait HostListener: Send + Sync {
    fn on_new_block(&self, height: u64) -> Result<(), HostCallError>;

    fn on_sync_progress(
        &self,
        height: u64,
        start_height: u64,
        end_height: u64,
        percent_done: f64,
        message: &str,
    ) -> Result<(), HostCallError>;
}

/// Scoped attachment of the calling thread to the host runtime.
///
/// Dropping the guard detaches the thread only if this call attached it;
/// a thread the runtime already knew stays attached.
pub struct ThreadAttachment {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ThreadAttachment {
    pub fn already_attached() -> Self {
        Self { detach: None }
    }

    pub fn newly_attached(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }
}

impl Drop for ThreadAttachment {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

/// The host runtime descriptor: knows how to register foreign threads.
pub trait HostRuntime: Send + Sync {
    fn attach_current_thread(&self) -> Result<ThreadAttachment, HostCallError>;
}

/// Runtime that needs no thread registration (single-runtime hosts, tests).
pub struct NoopRuntime;

impl HostRuntime for NoopRuntime {
    fn attach_current_thread(&self) -> Result<ThreadAttachment, HostCallError> {
        Ok(ThreadAttachment::already_attached())
    }
}

static HOST_RUNTIME: Lazy<RwLock<Arc<dyn HostRuntime>>> =
    Lazy::new(|| RwLock::new(Arc::new(NoopRuntime)));

/// Install the process-wide host runtime descriptor. Called once at module
/// load by the embedder.
pub fn install_runtime(runtime: Arc<dyn HostRuntime>) {
    if let Ok(mut slot) = HOST_RUNTIME.write() {
        *slot = runtime;
    }
}

/// Reset to the no-op runtime at module unload.
pub fn shutdown_runtime() {
    install_runtime(Arc::new(NoopRuntime));
}

fn current_runtime() -> Arc<dyn HostRuntime> {
    match HOST_RUNTIME.read() {
        Ok(slot) => Arc::clone(&slot),
        Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
}

/// Forwards engine events to the host callback object until detached.
///
/// State machine: the slot starts populated (installed) and `detach`
/// clears it to the `None` sentinel, which is terminal.
pub struct ListenerAdapter {
    slot: Mutex<Option<Arc<dyn HostListener>>>,
}

impl ListenerAdapter {
    pub fn new(listener: Arc<dyn HostListener>) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Some(listener)),
        })
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<dyn HostListener>>> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Clear the host reference under the lock. The reference itself is
    /// released (dropped) after the lock is out of scope; any delivery
    /// racing with this either already holds the lock and finishes against
    /// the old reference, or sees the sentinel and skips.
    pub fn detach(&self) {
        let released = self.lock_slot().take();
        drop(released);
    }

    pub fn is_detached(&self) -> bool {
        self.lock_slot().is_none()
    }

    pub fn notify_new_block(&self, height: u64) {
        self.deliver("onNewBlock", |listener| listener.on_new_block(height));
    }

    pub fn notify_sync_progress(
        &self,
        height: u64,
        start_height: u64,
        end_height: u64,
        percent_done: f64,
        message: &str,
    ) {
        self.deliver("onSyncProgress", |listener| {
            listener.on_sync_progress(height, start_height, end_height, percent_done, message)
        });
    }

    fn deliver(
        &self,
        event: &str,
        call: impl FnOnce(&dyn HostListener) -> Result<(), HostCallError>,
    ) {
        // Lock held across the host call: detach cannot interleave.
        let guard = self.lock_slot();
        let listener = match guard.as_ref() {
            Some(listener) => listener,
            None => return,
        };
        let _attachment = match current_runtime().attach_current_thread() {
            Ok(attachment) => attachment,
            Err(err) => {
                warn!("dropping {event}: failed to attach thread to host runtime: {err}");
                return;
            }
        };
        match catch_unwind(AssertUnwindSafe(|| call(listener.as_ref()))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("host {event} callback failed: {err}"),
            Err(_) => warn!("host {event} callback panicked; panic contained at the boundary"),
        }
    }
}

// ---- C callback surface ----

/// Host callback table crossing the C boundary. `context` is an opaque
/// host-owned pointer passed back on every call; `retain`/`release`
/// bracket the bridge's ownership of it (the C analog of taking and
/// deleting a global reference).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct WalletListenerCallbacks {
    pub context: *mut c_void,
    pub on_new_block: Option<unsafe extern "C" fn(context: *mut c_void, height: u64)>,
    pub on_sync_progress: Option<
        unsafe extern "C" fn(
            context: *mut c_void,
            height: u64,
            start_height: u64,
            end_height: u64,
            percent_done: f64,
            message: *const c_char,
        ),
    >,
    pub retain: Option<unsafe extern "C" fn(context: *mut c_void)>,
    pub release: Option<unsafe extern "C" fn(context: *mut c_void)>,
}

/// Adapts the C callback table to [`HostListener`], retaining the host
/// context for as long as the adapter owns it.
pub struct VTableListener {
    callbacks: WalletListenerCallbacks,
}

// The host contract for WalletListenerCallbacks requires the table to be
// callable from any thread; deliveries are additionally serialized by the
// adapter lock.
unsafe impl Send for VTableListener {}
unsafe impl Sync for VTableListener {}

impl VTableListener {
    /// Returns `None` when the table carries no callbacks at all, which
    /// the surface treats the same as clearing the listener.
    pub fn new(callbacks: WalletListenerCallbacks) -> Option<Self> {
        if callbacks.on_new_block.is_none() && callbacks.on_sync_progress.is_none() {
            return None;
        }
        if let Some(retain) = callbacks.retain {
            unsafe { retain(callbacks.context) };
        }
        Some(Self { callbacks })
    }
}

impl HostListener for VTableListener {
    fn on_new_block(&self, height: u64) -> Result<(), HostCallError> {
        if let Some(on_new_block) = self.callbacks.on_new_block {
            unsafe { on_new_block(self.callbacks.context, height) };
        }
        Ok(())
    }

    fn on_sync_progress(
        &self,
        height: u64,
        start_height: u64,
        end_height: u64,
        percent_done: f64,
        message: &str,
    ) -> Result<(), HostCallError> {
        if let Some(on_sync_progress) = self.callbacks.on_sync_progress {
            let message = std::ffi::CString::new(message)
                .map_err(|_| HostCallError("progress message contained NUL".to_string()))?;
            unsafe {
                on_sync_progress(
                    self.callbacks.context,
                    height,
                    start_height,
                    end_height,
                    percent_done,
                    message.as_ptr(),
                )
            };
        }
        Ok(())
    }
}

impl Drop for VTableListener {
    fn drop(&mut self) {
        if let Some(release) = self.callbacks.release {
            unsafe { release(self.callbacks.context) };
        }
    }
}
