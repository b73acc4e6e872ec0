use log::warn;

use super::error::SampleError;
use super::ticks::{CounterWidth, HostTickSource, TickSource};
use super::types::{CpuUsage, TickSnapshot};

/// Percentages of the ticks that elapsed between `prev` and `cur`.
///
/// A counter that went backwards contributes no ticks. With no elapsed ticks
/// at all the result is [`CpuUsage::ZERO`].
pub fn usage_between(prev: &TickSnapshot, cur: &TickSnapshot) -> CpuUsage {
    usage_between_with(prev, cur, CounterWidth::Bits64)
}

/// [`usage_between`] for counters of the given width; see
/// [`CounterWidth::elapsed`] for how wraps and resets are told apart.
pub fn usage_between_with(
    prev: &TickSnapshot,
    cur: &TickSnapshot,
    width: CounterWidth,
) -> CpuUsage {
    let user = width.elapsed(prev.user, cur.user) as f64;
    let system = width.elapsed(prev.system, cur.system) as f64;
    let idle = width.elapsed(prev.idle, cur.idle) as f64;
    let nice = width.elapsed(prev.nice, cur.nice) as f64;

    let total = user + system + idle + nice;
    if total == 0.0 {
        return CpuUsage::ZERO;
    }

    CpuUsage {
        user: (user + nice) / total * 100.0,
        system: system / total * 100.0,
        idle: idle / total * 100.0,
    }
}

/// Turns cumulative tick counters into per-interval utilisation.
///
/// Each call measures the interval since the previous successful call, so the
/// first call reports the average since boot.
pub struct CpuUsageSampler<S = HostTickSource> {
    source: S,
    previous: TickSnapshot,
}

impl CpuUsageSampler<HostTickSource> {
    pub fn new() -> Self {
        Self::with_source(HostTickSource)
    }
}

impl Default for CpuUsageSampler<HostTickSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TickSource> CpuUsageSampler<S> {
    pub fn with_source(source: S) -> Self {
        CpuUsageSampler {
            source,
            previous: TickSnapshot::default(),
        }
    }

    /// Reads the counters and reports usage since the last reading. On a
    /// failed read the previous snapshot is kept and the error returned.
    pub fn try_sample(&mut self) -> Result<CpuUsage, SampleError> {
        let current = self.source.read_ticks()?;
        let width = self.source.counter_width();
        let usage = usage_between_with(&self.previous, &current, width);
        self.previous = current;
        Ok(usage)
    }

    /// Fail-soft [`try_sample`](Self::try_sample): a failed read yields
    /// [`CpuUsage::ZERO`].
    pub fn sample(&mut self) -> CpuUsage {
        match self.try_sample() {
            Ok(usage) => usage,
            Err(err) => {
                warn!("cpu tick read failed: {}", err);
                CpuUsage::ZERO
            }
        }
    }

    pub fn previous(&self) -> TickSnapshot {
        self.previous
    }
}
