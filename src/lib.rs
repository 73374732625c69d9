//! Bridge between a managed host runtime and a native wallet engine.
//!
//! The crate owns three concerns and nothing else:
//!
//! * **Handle lifecycle**: engine instances live in a process-wide
//!   registry and are addressed by opaque `u64` handles that are never
//!   reissued; see [`registry`].
//! * **Callback relay**: engine events fire on native worker threads and
//!   are delivered into the host runtime through a detachable adapter;
//!   see [`listener`].
//! * **Response-graph serialization**: flat query results are regrouped
//!   under their shared blocks before crossing the boundary as JSON; see
//!   [`graph`].
//!
//! The wallet engine itself is external: embedders install an
//! [`engine::EngineBackend`] at load time, and every entry point in
//! [`ffi`] reaches the engine through it. Nothing crosses the C boundary
//! untranslated, neither error values nor panics.

pub mod engine;
pub mod error;
pub mod ffi;
pub mod graph;
pub mod listener;
pub mod model;
pub mod query;
pub mod registry;

pub use engine::{install_backend, shutdown_backend, EngineBackend, EngineResult, WalletEngine};
pub use error::{BridgeError, BridgeResult, EngineError};
pub use listener::{
    install_runtime, shutdown_runtime, HostListener, HostRuntime, ListenerAdapter,
    WalletListenerCallbacks,
};
pub use registry::Handle;
