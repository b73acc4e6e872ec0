use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::cpu::CpuUsageSampler;
use super::history::TimeSeriesBuffer;
use super::memory::{HostPageStats, MemoryUsageSampler, PageStatsSource};
use super::ticks::{HostTickSource, TickSource};
use super::types::{CpuField, CpuUsage, MemoryUsage, SampleEnvelope, TimeSeriesSample};

/// Treats a reading where user, system and idle are all exactly zero as a
/// sensor glitch.
///
/// This is a heuristic. A zero-tick interval, a failed read and an interval
/// that really rounded to zero everywhere all look the same here, and all
/// three are dropped.
pub fn is_sensor_glitch(usage: &CpuUsage) -> bool {
    usage.is_all_zero()
}

/// CPU stream state: the sampler, the latest accepted reading and the
/// charted history.
pub struct CpuStream<S = HostTickSource> {
    sampler: CpuUsageSampler<S>,
    history: TimeSeriesBuffer,
    current: Option<CpuUsage>,
}

impl CpuStream<HostTickSource> {
    pub fn new(history_capacity: usize) -> Self {
        Self::with_sampler(CpuUsageSampler::new(), history_capacity)
    }
}

impl<S: TickSource> CpuStream<S> {
    pub fn with_sampler(sampler: CpuUsageSampler<S>, history_capacity: usize) -> Self {
        CpuStream {
            sampler,
            history: TimeSeriesBuffer::new(history_capacity),
            current: None,
        }
    }

    /// Takes one reading stamped `at`. Glitch readings leave both the
    /// current value and the history untouched and return `None`.
    pub fn record(&mut self, at: DateTime<Utc>) -> Option<CpuUsage> {
        let usage = self.sampler.sample();
        if is_sensor_glitch(&usage) {
            debug!("discarding all-zero cpu reading");
            return None;
        }

        self.current = Some(usage);
        self.history
            .append(TimeSeriesSample::new(CpuField::System, at, usage.system));
        self.history
            .append(TimeSeriesSample::new(CpuField::User, at, usage.user));
        Some(usage)
    }

    pub fn current(&self) -> Option<CpuUsage> {
        self.current
    }

    pub fn history(&self) -> &TimeSeriesBuffer {
        &self.history
    }
}

/// Memory stream state: only the latest reading is kept.
pub struct MemoryStream<P = HostPageStats> {
    sampler: MemoryUsageSampler<P>,
    current: Option<MemoryUsage>,
}

impl MemoryStream<HostPageStats> {
    pub fn new() -> Self {
        Self::with_sampler(MemoryUsageSampler::new())
    }
}

impl Default for MemoryStream<HostPageStats> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PageStatsSource> MemoryStream<P> {
    pub fn with_sampler(sampler: MemoryUsageSampler<P>) -> Self {
        MemoryStream {
            sampler,
            current: None,
        }
    }

    pub fn record(&mut self, valid_for: Duration) -> SampleEnvelope<MemoryUsage> {
        let envelope = self.sampler.collect_sample(valid_for);
        if let Some(err) = envelope.error.as_ref() {
            warn!("memory sampler error: {}", err);
        }
        self.current = envelope.value;
        envelope
    }

    /// Latest used-bytes figure; 0 when the last read failed.
    pub fn current_used_bytes(&self) -> u64 {
        self.current.map(|usage| usage.used_bytes).unwrap_or(0)
    }

    pub fn current(&self) -> Option<MemoryUsage> {
        self.current
    }

    pub fn physical_bytes(&self) -> u64 {
        self.sampler.physical_bytes()
    }
}
