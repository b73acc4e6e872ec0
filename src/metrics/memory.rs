use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, warn};

use super::error::SampleError;
use super::types::{MemoryUsage, SampleEnvelope};

/// Virtual-memory page counts. All counts are in pages of `page_size` bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageStats {
    pub active: u64,
    pub inactive: u64,
    pub wired: u64,
    pub page_size: u64,
}

impl PageStats {
    pub fn used_bytes(&self) -> u64 {
        self.active
            .saturating_add(self.inactive)
            .saturating_add(self.wired)
            .saturating_mul(self.page_size)
    }
}

pub trait PageStatsSource {
    fn read_page_stats(&self) -> Result<PageStats, SampleError>;

    /// Installed physical memory in bytes.
    fn physical_memory(&self) -> Result<u64, SampleError>;

    fn source_name(&self) -> &'static str {
        "page-stats"
    }
}

impl<T: PageStatsSource + ?Sized> PageStatsSource for Box<T> {
    fn read_page_stats(&self) -> Result<PageStats, SampleError> {
        (**self).read_page_stats()
    }

    fn physical_memory(&self) -> Result<u64, SampleError> {
        (**self).physical_memory()
    }

    fn source_name(&self) -> &'static str {
        (**self).source_name()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HostPageStats;

impl PageStatsSource for HostPageStats {
    fn read_page_stats(&self) -> Result<PageStats, SampleError> {
        read_host_page_stats()
    }

    fn physical_memory(&self) -> Result<u64, SampleError> {
        physical_memory_bytes()
    }

    fn source_name(&self) -> &'static str {
        if cfg!(target_os = "macos") {
            "mach::host_statistics64"
        } else if cfg!(target_os = "linux") {
            "procfs::meminfo"
        } else {
            "unsupported"
        }
    }
}

/// Installed physical memory, as reported by the OS.
pub fn physical_memory_bytes() -> Result<u64, SampleError> {
    #[cfg(target_os = "macos")]
    {
        mach::read_sysctl_u64("hw.memsize")
    }
    #[cfg(not(target_os = "macos"))]
    {
        let mut system = sysinfo::System::new();
        system.refresh_memory();
        match system.total_memory() {
            0 => Err(SampleError::Unsupported("physical memory size")),
            total => Ok(total),
        }
    }
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
fn page_size() -> u64 {
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw > 0 {
        raw as u64
    } else {
        4096
    }
}

#[cfg(target_os = "macos")]
fn read_host_page_stats() -> Result<PageStats, SampleError> {
    let stats = mach::read_vm_statistics()?;
    Ok(PageStats {
        active: stats.active_count as u64,
        inactive: stats.inactive_count as u64,
        wired: stats.wire_count as u64,
        page_size: page_size(),
    })
}

#[cfg(target_os = "linux")]
fn read_host_page_stats() -> Result<PageStats, SampleError> {
    let path = "/proc/meminfo";
    let text =
        std::fs::read_to_string(path).map_err(|err| SampleError::Io(path.to_string(), err))?;
    parse_meminfo(&text, page_size())
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn read_host_page_stats() -> Result<PageStats, SampleError> {
    Err(SampleError::Unsupported("virtual memory page statistics"))
}

/// Reads `Active`, `Inactive` and `Unevictable` (the closest thing Linux has
/// to wired memory) from `/proc/meminfo` and converts the kB figures into
/// pages of `page_size` bytes.
pub fn parse_meminfo(text: &str, page_size: u64) -> Result<PageStats, SampleError> {
    if page_size == 0 {
        return Err(SampleError::Parse("/proc/meminfo", "page size is zero".into()));
    }

    let mut active = None;
    let mut inactive = None;
    let mut unevictable = None;

    for line in text.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let slot = match key.trim() {
            "Active" => &mut active,
            "Inactive" => &mut inactive,
            "Unevictable" => &mut unevictable,
            _ => continue,
        };
        let kb = rest
            .split_whitespace()
            .next()
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| SampleError::Parse("/proc/meminfo", format!("bad {} line", key)))?;
        *slot = Some(kb);
    }

    let to_pages = |kb: u64| kb.saturating_mul(1024) / page_size;
    let active = active
        .ok_or_else(|| SampleError::Parse("/proc/meminfo", "missing Active".into()))?;
    let inactive = inactive
        .ok_or_else(|| SampleError::Parse("/proc/meminfo", "missing Inactive".into()))?;

    Ok(PageStats {
        active: to_pages(active),
        inactive: to_pages(inactive),
        wired: to_pages(unevictable.unwrap_or(0)),
        page_size,
    })
}

/// Bytes of memory in use: active, inactive and wired pages.
pub struct MemoryUsageSampler<P = HostPageStats> {
    source: P,
    physical_bytes: u64,
}

impl MemoryUsageSampler<HostPageStats> {
    pub fn new() -> Self {
        Self::with_source(HostPageStats)
    }
}

impl Default for MemoryUsageSampler<HostPageStats> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PageStatsSource> MemoryUsageSampler<P> {
    /// Reads physical memory once; it does not change while the host is up.
    pub fn with_source(source: P) -> Self {
        let physical_bytes = match source.physical_memory() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("physical memory size unavailable: {}", err);
                0
            }
        };
        MemoryUsageSampler {
            source,
            physical_bytes,
        }
    }

    pub fn physical_bytes(&self) -> u64 {
        self.physical_bytes
    }

    pub fn read_usage(&self) -> Result<MemoryUsage, SampleError> {
        let stats = self.source.read_page_stats()?;
        let mut used_bytes = stats.used_bytes();
        if self.physical_bytes > 0 && used_bytes > self.physical_bytes {
            debug!(
                "page counts report {} bytes in use, above {} physical; clamping",
                used_bytes, self.physical_bytes
            );
            used_bytes = self.physical_bytes;
        }
        Ok(MemoryUsage {
            used_bytes,
            physical_bytes: self.physical_bytes,
        })
    }

    pub fn read_used_bytes(&self) -> Result<u64, SampleError> {
        self.read_usage().map(|usage| usage.used_bytes)
    }

    /// Fail-soft [`read_used_bytes`](Self::read_used_bytes). A return of 0
    /// means the reading is unknown, not that no memory is in use.
    pub fn sample_used_bytes(&self) -> u64 {
        match self.read_used_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("memory page statistics unavailable: {}", err);
                0
            }
        }
    }

    pub fn collect_sample(&self, valid_for: Duration) -> SampleEnvelope<MemoryUsage> {
        let started = Instant::now();
        let source = self.source.source_name();
        let result = self.read_usage();
        let now = Utc::now();
        let latency = started.elapsed();
        match result {
            Ok(usage) => SampleEnvelope::fresh(usage, now, valid_for, latency, source),
            Err(err) => SampleEnvelope::errored(now, valid_for, latency, source, err.to_string()),
        }
    }
}

#[cfg(target_os = "macos")]
mod mach {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::ptr;

    use libc::{
        c_void, host_statistics64, mach_msg_type_number_t, vm_statistics64, HOST_VM_INFO64,
        HOST_VM_INFO64_COUNT,
    };

    use super::super::error::SampleError;

    pub(super) fn read_vm_statistics() -> Result<vm_statistics64, SampleError> {
        unsafe {
            #[allow(deprecated)]
            let host = libc::mach_host_self();

            let mut stats = MaybeUninit::<vm_statistics64>::uninit();
            let mut count: mach_msg_type_number_t = HOST_VM_INFO64_COUNT;
            let result = host_statistics64(
                host,
                HOST_VM_INFO64,
                stats.as_mut_ptr() as *mut _,
                &mut count,
            );
            if result != 0 {
                return Err(SampleError::MachCallFailed("host_statistics64", result));
            }
            Ok(stats.assume_init())
        }
    }

    pub(super) fn read_sysctl_u64(name: &str) -> Result<u64, SampleError> {
        let c_name = CString::new(name).map_err(|err| {
            SampleError::SysctlError(
                name.to_string(),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, err),
            )
        })?;
        let mut size: libc::size_t = std::mem::size_of::<u64>() as libc::size_t;
        let mut value: u64 = 0;
        let result = unsafe {
            libc::sysctlbyname(
                c_name.as_ptr(),
                &mut value as *mut u64 as *mut c_void,
                &mut size as *mut libc::size_t,
                ptr::null_mut(),
                0,
            )
        };
        if result != 0 {
            return Err(SampleError::SysctlError(
                name.to_string(),
                std::io::Error::last_os_error(),
            ));
        }
        Ok(value)
    }
}
