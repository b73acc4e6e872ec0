pub mod config;
pub mod metrics;

pub use config::{ConfigError, SamplerConfig, MAX_HISTORY_CAPACITY, SAMPLER_CONFIG};
pub use metrics::{
    max_total_capacity, CpuUsage, CpuUsageSampler, MemoryUsage, MemoryUsageSampler,
    MetricsSampler, MetricsSnapshot, SampleError, TimeSeriesBuffer, TimeSeriesSample,
    VolumeEnumerator, VolumeInfo,
};
