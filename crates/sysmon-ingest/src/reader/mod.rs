/// Snapshot reader: owns the region handle and turns it into snapshots.
///
/// The region is opened lazily on the first [`SnapshotReader::read`] and
/// re-opened after any failure, so a consumer can start before the producer
/// and survive producer restarts. All region access is serialized by one
/// internal mutex; the reader can be shared behind an `Arc`.
mod guard;

pub use guard::{ConsistencyGuard, StableRead};

use crate::config::IngestConfig;
use crate::layout::{self, LayoutReport};
use crate::model::Snapshot;
use crate::region::{RegionLocator, RegionOpener, SharedRegion};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Connection state of a [`SnapshotReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderState {
    /// No open attempt yet, or closed by [`SnapshotReader::shutdown`].
    Uninitialized,
    /// A region is mapped.
    Connected { name: String },
    /// The last open or read failed; the next read retries.
    Disconnected,
}

struct Inner {
    state: ReaderState,
    region: Option<Box<dyn SharedRegion>>,
    last_error: Option<String>,
}

pub struct SnapshotReader {
    opener: Box<dyn RegionOpener>,
    guard: ConsistencyGuard,
    inner: Mutex<Inner>,
}

impl SnapshotReader {
    pub fn new(opener: impl RegionOpener + 'static, guard: ConsistencyGuard) -> Self {
        Self {
            opener: Box::new(opener),
            guard,
            inner: Mutex::new(Inner {
                state: ReaderState::Uninitialized,
                region: None,
                last_error: None,
            }),
        }
    }

    /// Reader over the platform region named in `config`.
    pub fn from_config(config: &IngestConfig) -> Self {
        let locator =
            RegionLocator::new(config.region.names.clone()).with_shm_dir(&config.region.shm_dir);
        Self::new(locator, ConsistencyGuard::from_config(&config.consistency))
    }

    /// Open the region now. Returns `true` when connected.
    ///
    /// Calling this is optional; [`read`](Self::read) connects on demand.
    pub fn initialize(&self) -> bool {
        let mut inner = self.inner.lock();
        self.connect(&mut inner)
    }

    /// Take one snapshot.
    ///
    /// `None` when the region is unavailable or does not decode; see
    /// [`last_error`](Self::last_error) for why. A decode failure releases the
    /// region so the next call resolves it again.
    pub fn read(&self) -> Option<Snapshot> {
        let mut inner = self.inner.lock();
        if inner.region.is_none() && !self.connect(&mut inner) {
            return None;
        }

        let result = match inner.region.as_deref() {
            Some(region) => self.guard.read_stable(region),
            None => return None,
        };

        match result {
            Ok(read) => {
                if read.retries > 0 {
                    debug!(retries = read.retries, "snapshot read after retries");
                }
                inner.last_error = None;
                Some(read.snapshot)
            }
            Err(e) => {
                warn!("snapshot read failed: {e}");
                Self::release(&mut inner, ReaderState::Disconnected);
                inner.last_error = Some(e.to_string());
                None
            }
        }
    }

    /// Structural report on the current region contents.
    pub fn inspect(&self) -> Option<LayoutReport> {
        let mut inner = self.inner.lock();
        if inner.region.is_none() && !self.connect(&mut inner) {
            return None;
        }
        inner
            .region
            .as_deref()
            .map(|region| layout::inspect(&region.copy_all()))
    }

    pub fn state(&self) -> ReaderState {
        self.inner.lock().state.clone()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.inner.lock().state, ReaderState::Connected { .. })
    }

    /// Human-readable reason for the most recent failure, cleared by the
    /// next successful read.
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Release the region. A later read reconnects.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        Self::release(&mut inner, ReaderState::Uninitialized);
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn connect(&self, inner: &mut Inner) -> bool {
        match self.opener.open() {
            Ok(region) => {
                if inner.state != ReaderState::Uninitialized {
                    info!(name = region.name(), "reconnected to shared memory");
                }
                inner.state = ReaderState::Connected {
                    name: region.name().to_owned(),
                };
                inner.region = Some(region);
                inner.last_error = None;
                true
            }
            Err(e) => {
                debug!("shared memory unavailable: {e}");
                inner.region = None;
                inner.state = ReaderState::Disconnected;
                inner.last_error = Some(e.to_string());
                false
            }
        }
    }

    fn release(inner: &mut Inner, state: ReaderState) {
        if let Some(region) = inner.region.take() {
            debug!(name = region.name(), "releasing shared memory");
        }
        inner.state = state;
    }
}
