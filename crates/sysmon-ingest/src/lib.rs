/// SysMon Ingest — shared-memory snapshot reader and diagnostics client.
///
/// Consumes the telemetry block a system monitor publishes in shared memory
/// and the framed JSON it writes to its diagnostics endpoint. The crate has
/// no UI dependencies; `sysmon-probe` is one frontend.
///
/// # Modules
///
/// - [`model`] — Decoded snapshot records for both producer layouts.
/// - [`layout`] — Offset tables, the layout registry, decoders and inspector.
/// - [`region`] — Region handle traits, the name locator, in-memory regions.
/// - [`reader`] — `SnapshotReader` and the torn-read consistency guard.
/// - [`poller`] — Periodic background polling over a channel.
/// - [`diagnostics`] — Reconnecting framed-stream client.
/// - [`config`] — TOML configuration with defaults.
/// - [`platform`] — Windows file mapping / named pipe, POSIX mmap / socket.
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod layout;
pub mod model;
pub mod platform;
pub mod poller;
pub mod reader;
pub mod region;

pub use config::IngestConfig;
pub use diagnostics::{start_diagnostics, DiagnosticsEvent, DiagnosticsHandle, PipeConnector};
pub use model::{DiagnosticSnapshot, LayoutRevision, Snapshot};
pub use poller::{start_poller, PollEvent, PollerHandle};
pub use reader::{ReaderState, SnapshotReader};
