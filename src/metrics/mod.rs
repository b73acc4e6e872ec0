mod cpu;
mod error;
mod history;
mod memory;
mod monitor;
mod sampler;
mod ticks;
mod types;
mod volume;

pub use cpu::{usage_between, usage_between_with, CpuUsageSampler};
pub use error::SampleError;
pub use history::{TimeSeriesBuffer, DEFAULT_HISTORY_CAPACITY};
pub use memory::{
    parse_meminfo, physical_memory_bytes, HostPageStats, MemoryUsageSampler, PageStats,
    PageStatsSource,
};
pub use monitor::{is_sensor_glitch, CpuStream, MemoryStream};
pub use sampler::{MetricsSampler, MetricsSamplerHandle};
pub use ticks::{parse_proc_stat, CounterWidth, HostTickSource, TickSource};
pub use types::{
    CpuField, CpuUsage, MemoryUsage, MetricsSnapshot, SampleEnvelope, TickSnapshot,
    TimeSeriesSample, VolumeInfo,
};
pub use volume::{
    is_hidden_mount, max_total_capacity, CapacityProbe, MountTable, StatvfsProbe,
    SysinfoMountTable, VolumeEnumerator,
};
