use std::io;
use std::path::Path;

/// Bytes available to an unprivileged writer under a mounted path.
pub trait FreeSpace: Send + Sync {
    /// Zero when the query fails.
    fn free_bytes(&self, path: &Path) -> u64;
}

impl<F> FreeSpace for F
where
    F: Fn(&Path) -> u64 + Send + Sync,
{
    fn free_bytes(&self, path: &Path) -> u64 {
        self(path)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFreeSpace;

impl FreeSpace for SystemFreeSpace {
    fn free_bytes(&self, path: &Path) -> u64 {
        query_free_bytes(path).unwrap_or(0)
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        fn query_free_bytes(path: &Path) -> io::Result<u64> {
            use std::ffi::CString;
            use std::os::unix::ffi::OsStrExt;

            let path_for_cstring = if path.as_os_str().is_empty() { Path::new(".") } else { path };
            let c_path = CString::new(path_for_cstring.as_os_str().as_bytes())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("Invalid path for CString: {}", e)))?;
            let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
            if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat as *mut _) } != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
        }
    } else if #[cfg(windows)] {
        fn query_free_bytes(path: &Path) -> io::Result<u64> {
            use std::os::windows::ffi::OsStrExt;
            use winapi::um::fileapi::GetDiskFreeSpaceExW;
            use winapi::um::winnt::ULARGE_INTEGER;

            let path_for_api = if path.as_os_str().is_empty() { Path::new(".") } else { path };
            let wide: Vec<u16> = path_for_api.as_os_str().encode_wide().chain(Some(0)).collect();
            let mut free_bytes_available: ULARGE_INTEGER = unsafe { std::mem::zeroed() };
            let mut total_number_of_bytes: ULARGE_INTEGER = unsafe { std::mem::zeroed() };
            let mut total_number_of_free_bytes: ULARGE_INTEGER = unsafe { std::mem::zeroed() };
            if unsafe {
                GetDiskFreeSpaceExW(
                    wide.as_ptr(),
                    &mut free_bytes_available,
                    &mut total_number_of_bytes,
                    &mut total_number_of_free_bytes,
                )
            } == 0
            {
                return Err(io::Error::last_os_error());
            }
            Ok(unsafe { *free_bytes_available.QuadPart() })
        }
    } else {
        fn query_free_bytes(_path: &Path) -> io::Result<u64> {
            Err(io::Error::new(io::ErrorKind::Unsupported, "free space query unsupported on this OS"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reports_space_for_existing_dir() {
        let dir = tempdir().unwrap();
        assert!(SystemFreeSpace.free_bytes(dir.path()) > 0);
    }

    #[test]
    fn missing_path_is_zero() {
        let dir = tempdir().unwrap();
        let gone = dir.path().join("not").join("here");
        assert_eq!(SystemFreeSpace.free_bytes(&gone), 0);
    }

    #[test]
    fn closures_act_as_capability() {
        let fixed = |_: &Path| 42u64;
        assert_eq!(fixed.free_bytes(Path::new("/anywhere")), 42);
    }
}
