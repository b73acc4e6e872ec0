use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use sysinfo::Disks;

use super::error::SampleError;
use super::types::VolumeInfo;
use crate::config::{SamplerConfig, SAMPLER_CONFIG};

/// Source of mount points, in mount-table order.
pub trait MountTable {
    fn mount_points(&self) -> Result<Vec<PathBuf>, SampleError>;
}

/// Per-volume capacity queries. Each call goes to the filesystem.
pub trait CapacityProbe {
    fn total_bytes(&self, path: &Path) -> Result<u64, SampleError>;
    fn available_bytes(&self, path: &Path) -> Result<u64, SampleError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SysinfoMountTable;

impl MountTable for SysinfoMountTable {
    fn mount_points(&self) -> Result<Vec<PathBuf>, SampleError> {
        let disks = Disks::new_with_refreshed_list();
        Ok(disks
            .list()
            .iter()
            .map(|disk| disk.mount_point().to_path_buf())
            .collect())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StatvfsProbe;

impl CapacityProbe for StatvfsProbe {
    fn total_bytes(&self, path: &Path) -> Result<u64, SampleError> {
        let stats = statvfs(path)?;
        Ok((stats.f_blocks as u64).saturating_mul(stats.f_frsize as u64))
    }

    fn available_bytes(&self, path: &Path) -> Result<u64, SampleError> {
        let stats = statvfs(path)?;
        Ok((stats.f_bavail as u64).saturating_mul(stats.f_frsize as u64))
    }
}

#[cfg(unix)]
fn statvfs(path: &Path) -> Result<libc::statvfs, SampleError> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|err| {
        SampleError::Io(
            path.display().to_string(),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, err),
        )
    })?;
    let mut stats = MaybeUninit::<libc::statvfs>::uninit();
    let result = unsafe { libc::statvfs(c_path.as_ptr(), stats.as_mut_ptr()) };
    if result != 0 {
        return Err(SampleError::Io(
            path.display().to_string(),
            std::io::Error::last_os_error(),
        ));
    }
    Ok(unsafe { stats.assume_init() })
}

#[cfg(not(unix))]
struct NoStatvfs {
    f_blocks: u64,
    f_bavail: u64,
    f_frsize: u64,
}

#[cfg(not(unix))]
fn statvfs(_: &Path) -> Result<NoStatvfs, SampleError> {
    Err(SampleError::Unsupported("volume capacity"))
}

/// Hidden volumes are system mounts a user never browses: anything under a
/// dot-directory or one of `prefixes`.
pub fn is_hidden_mount(path: &Path, prefixes: &[PathBuf]) -> bool {
    let dotted = path.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    });
    dotted || prefixes.iter().any(|prefix| path.starts_with(prefix))
}

/// Largest total capacity in `volumes`, 0 when there are none.
pub fn max_total_capacity(volumes: &[VolumeInfo]) -> u64 {
    volumes
        .iter()
        .map(|volume| volume.total_bytes)
        .max()
        .unwrap_or(0)
}

/// Lists mounted volumes and their capacity. Nothing is cached: every call
/// re-reads the mount table and re-queries every volume.
pub struct VolumeEnumerator<M = SysinfoMountTable, C = StatvfsProbe> {
    mounts: M,
    probe: C,
    hidden_prefixes: Vec<PathBuf>,
}

impl VolumeEnumerator<SysinfoMountTable, StatvfsProbe> {
    pub fn new() -> Self {
        Self::from_config(&SAMPLER_CONFIG)
    }

    pub fn from_config(config: &SamplerConfig) -> Self {
        Self::with_sources(
            SysinfoMountTable,
            StatvfsProbe,
            config.hidden_mount_prefixes.iter().map(PathBuf::from).collect(),
        )
    }
}

impl Default for VolumeEnumerator<SysinfoMountTable, StatvfsProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: MountTable, C: CapacityProbe> VolumeEnumerator<M, C> {
    pub fn with_sources(mounts: M, probe: C, hidden_prefixes: Vec<PathBuf>) -> Self {
        VolumeEnumerator {
            mounts,
            probe,
            hidden_prefixes,
        }
    }

    /// Visible volumes in mount-table order, each mount point at most once.
    /// A failed capacity query reports 0 for that field only.
    pub fn list_volumes(&self) -> Vec<VolumeInfo> {
        let mounts = match self.mounts.mount_points() {
            Ok(mounts) => mounts,
            Err(err) => {
                warn!("mount table unavailable: {}", err);
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        mounts
            .into_iter()
            .filter(|path| !is_hidden_mount(path, &self.hidden_prefixes))
            .filter(|path| seen.insert(path.clone()))
            .map(|path| self.volume_info(path))
            .collect()
    }

    pub fn volume_info(&self, path: impl Into<PathBuf>) -> VolumeInfo {
        let path = path.into();
        let total_bytes = self.probe.total_bytes(&path).unwrap_or_else(|err| {
            debug!("total capacity of {} unavailable: {}", path.display(), err);
            0
        });
        let free_bytes = self.probe.available_bytes(&path).unwrap_or_else(|err| {
            debug!("free capacity of {} unavailable: {}", path.display(), err);
            0
        });
        VolumeInfo::new(path, total_bytes, free_bytes)
    }

    pub fn max_total_capacity(&self) -> u64 {
        max_total_capacity(&self.list_volumes())
    }
}
