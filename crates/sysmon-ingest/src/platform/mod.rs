/// Platform backends: shared-memory mapping and the diagnostics endpoint.
///
/// Windows uses named file mappings and a named pipe. POSIX maps a file under
/// the shm directory and connects to a Unix domain socket.
use crate::error::OpenError;
use crate::region::SharedRegion;
use std::io;
use std::path::Path;
use std::time::Duration;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod win32;

/// Default diagnostics endpoint name.
pub const DEFAULT_DIAGNOSTICS_ENDPOINT: &str = "SysMonDiag";

/// Open one shared-memory region read-only.
pub(crate) fn open_region(name: &str, shm_dir: &Path) -> Result<Box<dyn SharedRegion>, OpenError> {
    #[cfg(windows)]
    {
        let _ = shm_dir;
        win32::open_region(name)
    }
    #[cfg(unix)]
    {
        posix::open_region(name, shm_dir)
    }
    #[cfg(not(any(windows, unix)))]
    {
        let _ = shm_dir;
        Err(OpenError::Io {
            name: name.to_owned(),
            source: io::Error::new(io::ErrorKind::Unsupported, "no shared-memory backend"),
        })
    }
}

/// Platform path of a diagnostics endpoint name: `\\.\pipe\<name>` on
/// Windows, `/tmp/<name>` elsewhere. Names containing a path separator are
/// used as-is.
///
/// The default therefore resolves to `/tmp/SysMonDiag` on POSIX. Producers
/// built for Linux and macOS listen on `/tmp/tcmt_diag.sock` instead; set
/// `[diagnostics] endpoint` to that path to follow them.
pub fn endpoint_path(endpoint: &str) -> String {
    if endpoint.contains(['/', '\\']) {
        return endpoint.to_owned();
    }
    if cfg!(windows) {
        format!(r"\\.\pipe\{endpoint}")
    } else {
        format!("/tmp/{endpoint}")
    }
}

/// Open the diagnostics endpoint for reading.
pub(crate) fn connect_endpoint(
    path: &str,
    timeout: Duration,
) -> io::Result<Box<dyn io::Read + Send>> {
    #[cfg(windows)]
    {
        win32::connect_pipe(path, timeout)
    }
    #[cfg(unix)]
    {
        posix::connect_socket(path, timeout)
    }
    #[cfg(not(any(windows, unix)))]
    {
        let _ = (path, timeout);
        Err(io::Error::new(io::ErrorKind::Unsupported, "no diagnostics backend"))
    }
}

/// Map an OS error from opening `name` to an [`OpenError`].
fn open_error(name: &str, err: io::Error) -> OpenError {
    match err.kind() {
        io::ErrorKind::NotFound => OpenError::NotFound {
            tried: vec![name.to_owned()],
        },
        io::ErrorKind::PermissionDenied => OpenError::AccessDenied {
            name: name.to_owned(),
        },
        _ => OpenError::Io {
            name: name.to_owned(),
            source: err,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_names_expand_per_platform() {
        let path = endpoint_path("SysMonDiag");
        if cfg!(windows) {
            assert_eq!(path, r"\\.\pipe\SysMonDiag");
        } else {
            assert_eq!(path, "/tmp/SysMonDiag");
        }
        assert_eq!(endpoint_path("/run/sysmon.sock"), "/run/sysmon.sock");
        assert_eq!(endpoint_path("/tmp/tcmt_diag.sock"), "/tmp/tcmt_diag.sock");
    }

    #[test]
    fn os_errors_map_to_open_errors() {
        let e = open_error("x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(e, OpenError::AccessDenied { name } if name == "x"));
        let e = open_error("x", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(e, OpenError::NotFound { .. }));
        let e = open_error("x", io::Error::from(io::ErrorKind::InvalidData));
        assert!(matches!(e, OpenError::Io { .. }));
    }
}
