//! Resident memory probes

use std::io;

const BYTES_PER_MEGABYTE: u64 = 1024 * 1024;

/// Source of the current process's resident memory, in whole megabytes.
#[cfg_attr(test, mockall::automock)]
pub trait MemoryProbe: Send + Sync {
    fn resident_megabytes(&self) -> io::Result<u64>;
}

impl<F> MemoryProbe for F
where
    F: Fn() -> io::Result<u64> + Send + Sync,
{
    fn resident_megabytes(&self) -> io::Result<u64> {
        self()
    }
}

/// Reads the resident set size of the calling process from the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemory;

impl MemoryProbe for ProcessMemory {
    fn resident_megabytes(&self) -> io::Result<u64> {
        resident_bytes().map(|bytes| bytes / BYTES_PER_MEGABYTE)
    }
}

/// Current RSS from `/proc/self/statm` (resident pages * page size)
#[cfg(target_os = "linux")]
fn resident_bytes() -> io::Result<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm")?;
    let resident_pages = parse_statm_resident(&statm).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected /proc/self/statm contents: {:?}", statm.trim()),
        )
    })?;

    // SAFETY: sysconf has no preconditions and only reads system configuration.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(resident_pages * page_size as u64)
}

/// Peak RSS via getrusage; the closest portable figure outside Linux
#[cfg(all(unix, not(target_os = "linux")))]
fn resident_bytes() -> io::Result<u64> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: usage points to writable memory sized for a rusage struct.
    let ret = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: getrusage returned 0, so the struct is initialized.
    let max_rss = unsafe { usage.assume_init() }.ru_maxrss.max(0) as u64;

    // macOS reports bytes, the BSDs report kilobytes
    if cfg!(target_os = "macos") || cfg!(target_os = "ios") {
        Ok(max_rss)
    } else {
        Ok(max_rss * 1024)
    }
}

#[cfg(not(unix))]
fn resident_bytes() -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "resident memory query is not supported on this platform",
    ))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_statm_resident(statm: &str) -> Option<u64> {
    statm.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statm_resident() {
        assert_eq!(parse_statm_resident("12345 678 90 1 0 200 0\n"), Some(678));
        assert_eq!(parse_statm_resident("12345"), None);
        assert_eq!(parse_statm_resident("12345 abc"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_memory_reports_nonzero() {
        let mb = ProcessMemory.resident_megabytes().unwrap();
        // A test binary always has at least a megabyte resident
        assert!(mb >= 1, "resident memory was {} MB", mb);
    }

    #[test]
    fn test_closure_probe() {
        let probe = || -> io::Result<u64> { Ok(42) };
        assert_eq!(probe.resident_megabytes().unwrap(), 42);
    }

    #[test]
    fn test_mock_probe() {
        let mut probe = MockMemoryProbe::new();
        probe
            .expect_resident_megabytes()
            .times(1)
            .returning(|| Err(io::Error::other("no procfs")));
        assert!(probe.resident_megabytes().is_err());
    }
}
