//! Keeps live preview surfaces and the authoritative document text in
//! lockstep. Surfaces submit structural edits over a small JSON protocol;
//! per-document workers re-resolve each edit against the current text,
//! apply it through the host with optimistic concurrency, and route
//! renders and range resyncs back to every attached surface.

pub mod config;
pub mod errors;
pub mod host;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod watcher;

mod clipboard;
mod driver;
mod queue;
mod router;

pub use config::SyncConfig;
pub use errors::{HostError, SyncError, SyncResult};
pub use host::{
    ClipboardService, FormatterService, MemoryHost, NoFormatter, TextHost, VersionedText,
};
pub use protocol::{EngineMessage, PasteRequest, SelectionKind, SurfaceMessage};
pub use registry::{Registry, RouteEntry, SurfaceId};
pub use server::{SyncContext, SyncServer};
pub use watcher::{ResourceWatcher, WatcherError};
