//! Raw CPU tick counters straight from the OS.

use super::error::SampleError;
use super::types::TickSnapshot;

/// Width of the counters a [`TickSource`] reads. Narrow counters wrap back
/// to zero long before the host reboots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterWidth {
    Bits32,
    Bits64,
}

impl CounterWidth {
    /// Ticks that elapsed between two readings of one counter.
    ///
    /// A 32-bit counter that reads lower than before is taken to have wrapped
    /// once, unless the wrapped distance covers more than half the range; that
    /// is treated as a reset, like any 64-bit counter that went backwards, and
    /// contributes no ticks.
    pub fn elapsed(self, prev: u64, cur: u64) -> u64 {
        match self {
            CounterWidth::Bits64 => cur.saturating_sub(prev),
            CounterWidth::Bits32 => {
                if cur >= prev {
                    return cur - prev;
                }
                let wrapped = (cur as u32).wrapping_sub(prev as u32);
                if prev > u32::MAX as u64 || wrapped > u32::MAX / 2 {
                    0
                } else {
                    wrapped as u64
                }
            }
        }
    }
}

/// Anything that can produce a fresh [`TickSnapshot`]. Implementations hold
/// no state between reads.
pub trait TickSource {
    fn read_ticks(&self) -> Result<TickSnapshot, SampleError>;

    fn counter_width(&self) -> CounterWidth {
        CounterWidth::Bits64
    }
}

impl<T: TickSource + ?Sized> TickSource for Box<T> {
    fn read_ticks(&self) -> Result<TickSnapshot, SampleError> {
        (**self).read_ticks()
    }

    fn counter_width(&self) -> CounterWidth {
        (**self).counter_width()
    }
}

/// The tick counters of the machine this process runs on.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostTickSource;

impl TickSource for HostTickSource {
    fn read_ticks(&self) -> Result<TickSnapshot, SampleError> {
        read_host_ticks()
    }

    // HOST_CPU_LOAD_INFO reports natural_t counters.
    fn counter_width(&self) -> CounterWidth {
        if cfg!(target_os = "macos") {
            CounterWidth::Bits32
        } else {
            CounterWidth::Bits64
        }
    }
}

#[cfg(target_os = "macos")]
fn read_host_ticks() -> Result<TickSnapshot, SampleError> {
    mach::read_cpu_load()
}

#[cfg(target_os = "linux")]
fn read_host_ticks() -> Result<TickSnapshot, SampleError> {
    let path = "/proc/stat";
    let text =
        std::fs::read_to_string(path).map_err(|err| SampleError::Io(path.to_string(), err))?;
    parse_proc_stat(&text)
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn read_host_ticks() -> Result<TickSnapshot, SampleError> {
    Err(SampleError::Unsupported("cpu tick counters"))
}

/// Parses the aggregate `cpu` line of `/proc/stat`.
///
/// Columns are `user nice system idle ...`; everything after `idle` is
/// ignored.
pub fn parse_proc_stat(text: &str) -> Result<TickSnapshot, SampleError> {
    let line = text
        .lines()
        .find(|line| line.split_whitespace().next() == Some("cpu"))
        .ok_or_else(|| SampleError::Parse("/proc/stat", "missing aggregate cpu line".into()))?;

    let mut fields = line.split_whitespace().skip(1).map(|field| {
        field
            .parse::<u64>()
            .map_err(|err| SampleError::Parse("/proc/stat", format!("{:?}: {}", field, err)))
    });
    let mut next = |name: &str| {
        fields.next().unwrap_or_else(|| {
            Err(SampleError::Parse(
                "/proc/stat",
                format!("cpu line has no {} column", name),
            ))
        })
    };

    let user = next("user")?;
    let nice = next("nice")?;
    let system = next("system")?;
    let idle = next("idle")?;

    Ok(TickSnapshot {
        user,
        system,
        idle,
        nice,
    })
}

#[cfg(target_os = "macos")]
mod mach {
    use std::mem::MaybeUninit;

    use libc::{c_int, kern_return_t, mach_msg_type_number_t, mach_port_t};

    use super::super::error::SampleError;
    use super::super::types::TickSnapshot;

    const HOST_CPU_LOAD_INFO: c_int = 3;
    const CPU_STATE_USER: usize = 0;
    const CPU_STATE_SYSTEM: usize = 1;
    const CPU_STATE_IDLE: usize = 2;
    const CPU_STATE_NICE: usize = 3;
    const CPU_STATE_MAX: usize = 4;

    #[repr(C)]
    struct HostCpuLoadInfo {
        cpu_ticks: [u32; CPU_STATE_MAX],
    }

    extern "C" {
        fn host_statistics(
            host_priv: mach_port_t,
            flavor: c_int,
            host_info_out: *mut c_int,
            host_info_out_cnt: *mut mach_msg_type_number_t,
        ) -> kern_return_t;
    }

    pub(super) fn read_cpu_load() -> Result<TickSnapshot, SampleError> {
        let mut info = MaybeUninit::<HostCpuLoadInfo>::uninit();
        let mut count = (std::mem::size_of::<HostCpuLoadInfo>() / std::mem::size_of::<c_int>())
            as mach_msg_type_number_t;

        let info = unsafe {
            #[allow(deprecated)]
            let host = libc::mach_host_self();
            let result = host_statistics(
                host,
                HOST_CPU_LOAD_INFO,
                info.as_mut_ptr() as *mut c_int,
                &mut count,
            );
            if result != 0 {
                return Err(SampleError::MachCallFailed("host_statistics", result));
            }
            info.assume_init()
        };

        Ok(TickSnapshot {
            user: info.cpu_ticks[CPU_STATE_USER] as u64,
            system: info.cpu_ticks[CPU_STATE_SYSTEM] as u64,
            idle: info.cpu_ticks[CPU_STATE_IDLE] as u64,
            nice: info.cpu_ticks[CPU_STATE_NICE] as u64,
        })
    }
}
