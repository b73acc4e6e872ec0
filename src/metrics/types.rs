use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SampleEnvelope<T> {
    pub value: Option<T>,
    pub collected_at: DateTime<Utc>,
    pub valid_for_ms: u32,
    pub source: String,
    pub latency_ms: u32,
    pub error: Option<String>,
}

impl<T> SampleEnvelope<T> {
    pub fn fresh(
        value: T,
        collected_at: DateTime<Utc>,
        valid_for: Duration,
        latency: Duration,
        source: &str,
    ) -> Self {
        SampleEnvelope {
            value: Some(value),
            collected_at,
            valid_for_ms: clamp_ms(valid_for),
            source: source.to_string(),
            latency_ms: clamp_ms(latency),
            error: None,
        }
    }

    pub fn errored(
        collected_at: DateTime<Utc>,
        valid_for: Duration,
        latency: Duration,
        source: &str,
        error: String,
    ) -> Self {
        SampleEnvelope {
            value: None,
            collected_at,
            valid_for_ms: clamp_ms(valid_for),
            source: source.to_string(),
            latency_ms: clamp_ms(latency),
            error: Some(error),
        }
    }

    pub(crate) fn pending(valid_for: Duration) -> Self {
        SampleEnvelope {
            value: None,
            collected_at: Utc::now(),
            valid_for_ms: clamp_ms(valid_for),
            source: "uninitialized".to_string(),
            latency_ms: 0,
            error: Some("metrics sampler not yet initialised".to_string()),
        }
    }
}

fn clamp_ms(duration: Duration) -> u32 {
    duration.as_millis().min(u32::MAX as u128) as u32
}

/// Raw cumulative CPU tick counters, summed over all processors.
///
/// Counters only grow while the host is up; a smaller reading than the
/// previous one means a reboot or, for 32-bit sources, a counter wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub user: u64,
    pub system: u64,
    pub idle: u64,
    pub nice: u64,
}

/// CPU utilisation over one sampling interval, in percent.
///
/// `nice` time is folded into `user`. When any ticks elapsed the three fields
/// sum to 100; when none did they are all zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    pub user: f64,
    pub system: f64,
    pub idle: f64,
}

impl CpuUsage {
    pub const ZERO: CpuUsage = CpuUsage {
        user: 0.0,
        system: 0.0,
        idle: 0.0,
    };

    pub fn is_all_zero(&self) -> bool {
        self.user == 0.0 && self.system == 0.0 && self.idle == 0.0
    }
}

impl fmt::Display for CpuUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user {:.2}% system {:.2}% idle {:.2}%",
            self.user, self.system, self.idle
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub physical_bytes: u64,
}

impl MemoryUsage {
    pub fn free_bytes(&self) -> u64 {
        self.physical_bytes.saturating_sub(self.used_bytes)
    }

    pub fn used_percent(&self) -> f64 {
        if self.physical_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.physical_bytes as f64 * 100.0
    }
}

impl fmt::Display for MemoryUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "used {} ({:.1}%) free {} of {}",
            ByteSize::b(self.used_bytes),
            self.used_percent(),
            ByteSize::b(self.free_bytes()),
            ByteSize::b(self.physical_bytes)
        )
    }
}

/// Capacity of one mounted volume at the moment it was queried.
///
/// Identity is the whole record: two reads of the same mount compare equal
/// only if their capacities did not change in between.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub path: PathBuf,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl VolumeInfo {
    /// `free_bytes` is clamped to `total_bytes`.
    pub fn new(path: impl Into<PathBuf>, total_bytes: u64, free_bytes: u64) -> Self {
        VolumeInfo {
            path: path.into(),
            total_bytes,
            free_bytes: free_bytes.min(total_bytes),
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    pub fn used_fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 / self.total_bytes as f64
    }

    pub fn is_last(&self, volumes: &[VolumeInfo]) -> bool {
        volumes.last() == Some(self)
    }
}

impl fmt::Display for VolumeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: used {} free {} of {}",
            self.path.display(),
            ByteSize::b(self.used_bytes()),
            ByteSize::b(self.free_bytes),
            ByteSize::b(self.total_bytes)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CpuField {
    System,
    User,
}

impl CpuField {
    pub fn as_str(&self) -> &'static str {
        match self {
            CpuField::System => "System",
            CpuField::User => "User",
        }
    }
}

impl fmt::Display for CpuField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point of a charted series.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesSample {
    pub field: CpuField,
    pub time: DateTime<Utc>,
    pub amount: f64,
}

impl TimeSeriesSample {
    pub fn new(field: CpuField, time: DateTime<Utc>, amount: f64) -> Self {
        TimeSeriesSample {
            field,
            time,
            amount,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub captured_at: DateTime<Utc>,
    pub cpu: SampleEnvelope<CpuUsage>,
    pub memory: SampleEnvelope<MemoryUsage>,
    pub cpu_history: Vec<TimeSeriesSample>,
}

impl MetricsSnapshot {
    pub fn stale(cpu_period: Duration, memory_period: Duration) -> Self {
        MetricsSnapshot {
            captured_at: Utc::now(),
            cpu: SampleEnvelope::pending(cpu_period),
            memory: SampleEnvelope::pending(memory_period),
            cpu_history: Vec::new(),
        }
    }
}
