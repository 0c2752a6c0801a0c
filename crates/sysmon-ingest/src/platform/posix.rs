/// POSIX backend: shared memory as a file under the shm directory, mapped
/// read-only with `memmap2`, and diagnostics over a Unix domain socket.
use super::open_error;
use crate::error::OpenError;
use crate::region::SharedRegion;
use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// A read-only mapping of a shm file.
pub(crate) struct MappedFile {
    name: String,
    mmap: Mmap,
}

impl SharedRegion for MappedFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.mmap.len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let len = self.mmap.len();
        if offset >= len {
            return 0;
        }
        let n = buf.len().min(len - offset);
        // SAFETY: `offset + n <= len` keeps the source inside the mapping.
        // The producer may write concurrently; the copy is raw bytes and the
        // consistency guard decides whether it can be trusted.
        unsafe {
            std::ptr::copy_nonoverlapping(self.mmap.as_ptr().add(offset), buf.as_mut_ptr(), n);
        }
        n
    }

    fn read_u32(&self, offset: usize) -> Option<u32> {
        if offset.checked_add(4)? > self.mmap.len() {
            return None;
        }
        // SAFETY: bounds checked above; volatile so the load is not elided
        // or merged with an earlier copy of the same bytes.
        let value = unsafe {
            std::ptr::read_volatile(self.mmap.as_ptr().add(offset) as *const [u8; 4])
        };
        Some(u32::from_le_bytes(value))
    }
}

/// `Global\Name` and `Local\Name` both resolve to `<shm_dir>/Name`.
fn file_name(name: &str) -> &str {
    name.rsplit('\\').next().unwrap_or(name)
}

pub(crate) fn open_region(name: &str, shm_dir: &Path) -> Result<Box<dyn SharedRegion>, OpenError> {
    let path = shm_dir.join(file_name(name));
    debug!(name, path = %path.display(), "opening shared memory file");

    let file = File::open(&path).map_err(|e| open_error(name, e))?;
    // SAFETY: the mapping is read-only; the file may still change underneath
    // it, which is why every access goes through a copy.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| open_error(name, e))?;

    Ok(Box::new(MappedFile {
        name: name.to_owned(),
        mmap,
    }))
}

/// Connect to the diagnostics socket. `UnixStream` has no connect timeout;
/// a missing or refusing socket fails immediately, so `_timeout` is unused.
pub(crate) fn connect_socket(
    path: &str,
    _timeout: Duration,
) -> io::Result<Box<dyn io::Read + Send>> {
    let stream = UnixStream::connect(path)?;
    Ok(Box::new(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn session_prefixes_map_to_one_file() {
        assert_eq!(file_name(r"Global\SystemMonitorSharedMemory"), "SystemMonitorSharedMemory");
        assert_eq!(file_name("SystemMonitorSharedMemory"), "SystemMonitorSharedMemory");
    }

    #[test]
    fn maps_file_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("region")).unwrap();
        file.write_all(&[9, 0, 0, 0, 42, 0, 0, 0]).unwrap();
        file.flush().unwrap();

        let region = open_region(r"Local\region", dir.path()).unwrap();
        assert_eq!(region.name(), r"Local\region");
        assert_eq!(region.len(), 8);
        assert_eq!(region.read_u32(4), Some(42));
        assert_eq!(region.copy_all(), vec![9, 0, 0, 0, 42, 0, 0, 0]);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            open_region("absent", dir.path()),
            Err(OpenError::NotFound { .. })
        ));
    }
}
