/// Read-only access to the producer's shared-memory region.
///
/// [`SharedRegion`] is one mapped view; [`RegionOpener`] produces views and
/// is the seam the reader is tested through. [`RegionLocator`] is the real
/// opener: it tries the configured names in order on the platform backend.
use crate::error::OpenError;
use crate::platform;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Region names, most specific first.
pub const DEFAULT_REGION_NAMES: [&str; 3] = [
    r"Global\SystemMonitorSharedMemory",
    r"Local\SystemMonitorSharedMemory",
    "SystemMonitorSharedMemory",
];

/// Directory holding POSIX shared-memory objects.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// A mapped, read-only view of the shared region.
///
/// The producer may write to the underlying memory at any time; callers get
/// bytes by copying, never by borrowing.
pub trait SharedRegion: Send {
    /// The name the region was opened under.
    fn name(&self) -> &str;

    /// Size of the view in bytes.
    fn len(&self) -> usize;

    /// Copy up to `buf.len()` bytes starting at `offset` into `buf`.
    /// Returns the number of bytes copied (short at the end of the view).
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the whole view.
    fn copy_all(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.len()];
        let n = self.read_at(0, &mut buf);
        buf.truncate(n);
        buf
    }

    /// Read a little-endian `u32` from the live view.
    fn read_u32(&self, offset: usize) -> Option<u32> {
        let mut bytes = [0u8; 4];
        (self.read_at(offset, &mut bytes) == 4).then(|| u32::from_le_bytes(bytes))
    }
}

/// Produces [`SharedRegion`] views.
pub trait RegionOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn SharedRegion>, OpenError>;
}

// ── Platform locator ──────────────────────────────────────────────────────────

/// Opens the first available region out of an ordered list of names.
#[derive(Debug, Clone)]
pub struct RegionLocator {
    names: Vec<String>,
    shm_dir: PathBuf,
}

impl Default for RegionLocator {
    fn default() -> Self {
        Self::new(DEFAULT_REGION_NAMES.iter().map(|s| s.to_string()).collect())
    }
}

impl RegionLocator {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            shm_dir: PathBuf::from(DEFAULT_SHM_DIR),
        }
    }

    /// Directory to resolve names in on POSIX. Ignored on Windows.
    pub fn with_shm_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shm_dir = dir.into();
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn shm_dir(&self) -> &Path {
        &self.shm_dir
    }
}

impl RegionOpener for RegionLocator {
    fn open(&self) -> Result<Box<dyn SharedRegion>, OpenError> {
        open_first(&self.names, |name| platform::open_region(name, &self.shm_dir))
    }
}

/// Try `names` in order. Access denied on one name moves on to the next.
fn open_first<F>(names: &[String], mut open: F) -> Result<Box<dyn SharedRegion>, OpenError>
where
    F: FnMut(&str) -> Result<Box<dyn SharedRegion>, OpenError>,
{
    for name in names {
        match open(name) {
            Ok(region) => {
                info!(name = %name, len = region.len(), "opened shared memory");
                return Ok(region);
            }
            Err(e @ OpenError::AccessDenied { .. }) => warn!("{e}, trying next name"),
            Err(e) => debug!("{e}"),
        }
    }
    Err(OpenError::NotFound {
        tried: names.to_vec(),
    })
}

// ── In-memory region ──────────────────────────────────────────────────────────

/// A region backed by a shared byte buffer.
///
/// Clones share the same buffer, so a test (or an in-process producer) can
/// keep a handle and rewrite the contents while a reader holds the region.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    name: String,
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl MemoryRegion {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Replace the contents.
    pub fn store(&self, bytes: Vec<u8>) {
        *self.bytes.write() = bytes;
    }

    /// Modify the contents in place.
    pub fn update(&self, f: impl FnOnce(&mut Vec<u8>)) {
        f(&mut self.bytes.write());
    }
}

impl SharedRegion for MemoryRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.bytes.read().len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let bytes = self.bytes.read();
        let Some(src) = bytes.get(offset..) else {
            return 0;
        };
        let n = src.len().min(buf.len());
        buf[..n].copy_from_slice(&src[..n]);
        n
    }
}

/// Opener for a [`MemoryRegion`] that can be published and withdrawn,
/// emulating a producer that starts and stops.
#[derive(Debug, Clone, Default)]
pub struct MemoryOpener {
    region: Arc<RwLock<Option<MemoryRegion>>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, region: MemoryRegion) {
        *self.region.write() = Some(region);
    }

    pub fn withdraw(&self) {
        *self.region.write() = None;
    }
}

impl RegionOpener for MemoryOpener {
    fn open(&self) -> Result<Box<dyn SharedRegion>, OpenError> {
        match self.region.read().as_ref() {
            Some(region) => Ok(Box::new(region.clone())),
            None => Err(OpenError::NotFound {
                tried: vec!["<memory>".to_owned()],
            }),
        }
    }
}
