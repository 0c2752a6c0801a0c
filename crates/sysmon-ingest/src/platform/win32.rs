/// Windows backend: named file mappings and the diagnostics named pipe.
///
/// The mapping is opened with `FILE_MAP_READ` only. The view size comes from
/// `VirtualQuery`, since a named mapping does not expose its size directly.
use super::open_error;
use crate::error::OpenError;
use crate::region::SharedRegion;
use std::fs::OpenOptions;
use std::io;
use std::time::Duration;
use tracing::debug;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Memory::{
    MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, VirtualQuery, FILE_MAP_READ,
    MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS,
};
use windows::Win32::System::Pipes::WaitNamedPipeW;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0u16)).collect()
}

/// A read-only view of a named file mapping.
pub(crate) struct MappedView {
    name: String,
    mapping: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
    len: usize,
}

// SAFETY: the handle and view are owned exclusively by this struct and only
// read through copies; Win32 handles are not tied to the opening thread.
unsafe impl Send for MappedView {}

impl MappedView {
    fn base(&self) -> *const u8 {
        self.view.Value as *const u8
    }
}

impl SharedRegion for MappedView {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> usize {
        self.len
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        if offset >= self.len {
            return 0;
        }
        let n = buf.len().min(self.len - offset);
        // SAFETY: `offset + n <= len`, and `len` was measured on this view.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(offset), buf.as_mut_ptr(), n);
        }
        n
    }

    fn read_u32(&self, offset: usize) -> Option<u32> {
        if offset.checked_add(4)? > self.len {
            return None;
        }
        // SAFETY: bounds checked above.
        let value = unsafe { std::ptr::read_volatile(self.base().add(offset) as *const [u8; 4]) };
        Some(u32::from_le_bytes(value))
    }
}

impl Drop for MappedView {
    fn drop(&mut self) {
        unsafe {
            let _ = UnmapViewOfFile(self.view);
            let _ = CloseHandle(self.mapping);
        }
        debug!(name = %self.name, "closed shared memory");
    }
}

pub(crate) fn open_region(name: &str) -> Result<Box<dyn SharedRegion>, OpenError> {
    let wide_name = wide(name);

    let mapping = unsafe {
        OpenFileMappingW(FILE_MAP_READ.0, false, PCWSTR(wide_name.as_ptr()))
            .map_err(|e| open_error(name, io::Error::from(e)))?
    };

    let view = unsafe { MapViewOfFile(mapping, FILE_MAP_READ, 0, 0, 0) };
    if view.Value.is_null() {
        let err = io::Error::last_os_error();
        unsafe {
            let _ = CloseHandle(mapping);
        }
        return Err(open_error(name, err));
    }

    let mut info = MEMORY_BASIC_INFORMATION::default();
    let written = unsafe {
        VirtualQuery(
            Some(view.Value as *const _),
            &mut info,
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };
    // Region size is page-rounded; decoders only read the prefix they know.
    let len = if written == 0 { 0 } else { info.RegionSize };

    Ok(Box::new(MappedView {
        name: name.to_owned(),
        mapping,
        view,
        len,
    }))
}

/// Wait for a pipe instance to become available, then open it for reading.
pub(crate) fn connect_pipe(path: &str, timeout: Duration) -> io::Result<Box<dyn io::Read + Send>> {
    let wide_path = wide(path);
    let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);

    let ready = unsafe { WaitNamedPipeW(PCWSTR(wide_path.as_ptr()), timeout_ms) };
    if !ready.as_bool() {
        return Err(io::Error::last_os_error());
    }

    let pipe = OpenOptions::new().read(true).open(path)?;
    Ok(Box::new(pipe))
}
