use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::info;
use tokio::select;
use tokio::sync::{Notify, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::memory::{HostPageStats, PageStatsSource};
use super::monitor::{CpuStream, MemoryStream};
use super::ticks::{HostTickSource, TickSource};
use super::types::{MetricsSnapshot, SampleEnvelope};
use crate::config::SamplerConfig;

const CPU_SOURCE: &str = "host::cpu_ticks";

pub struct MetricsSamplerHandle {
    snapshot: Arc<RwLock<MetricsSnapshot>>,
    ready: Arc<AtomicBool>,
    notify_ready: Arc<Notify>,
    cancel: CancellationToken,
    _runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl MetricsSamplerHandle {
    /// Samples this host with the given periods and history size.
    pub fn spawn(config: &SamplerConfig) -> std::io::Result<Self> {
        let config = config.validated();
        Self::spawn_with(
            &config,
            CpuStream::<HostTickSource>::new(config.history_capacity),
            MemoryStream::<HostPageStats>::new(),
        )
    }

    /// Runs on the current tokio runtime if there is one, otherwise on a
    /// private runtime owned by the handle.
    pub fn spawn_with<S, P>(
        config: &SamplerConfig,
        cpu: CpuStream<S>,
        memory: MemoryStream<P>,
    ) -> std::io::Result<Self>
    where
        S: TickSource + Send + 'static,
        P: PageStatsSource + Send + 'static,
    {
        let config = config.validated();
        let cpu_period = Duration::from_millis(config.cpu_period_ms);
        let memory_period = Duration::from_millis(config.memory_period_ms);

        let snapshot = Arc::new(RwLock::new(MetricsSnapshot::stale(
            cpu_period,
            memory_period,
        )));
        let ready = Arc::new(AtomicBool::new(false));
        let notify_ready = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let inner = Arc::new(MetricsSamplerInner {
            snapshot: Arc::clone(&snapshot),
            ready: Arc::clone(&ready),
            notify_ready: Arc::clone(&notify_ready),
            cancel: cancel.clone(),
            cpu_period,
            memory_period,
        });

        let fut = MetricsSamplerInner::run(inner, cpu, memory);

        let runtime_guard = match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(fut);
                None
            }
            Err(_) => {
                let runtime = Arc::new(
                    tokio::runtime::Builder::new_multi_thread()
                        .worker_threads(1)
                        .enable_all()
                        .build()?,
                );
                runtime.spawn(fut);
                Some(runtime)
            }
        };

        Ok(MetricsSamplerHandle {
            snapshot,
            ready,
            notify_ready,
            cancel,
            _runtime: runtime_guard,
        })
    }

    pub async fn latest_snapshot(&self) -> MetricsSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Resolves once the first reading of every stream has been published.
    pub async fn wait_until_ready(&self) {
        let notified = self.notify_ready.notified();
        if self.ready.load(Ordering::SeqCst) {
            return;
        }
        notified.await;
    }

    /// Stops both timers. Nothing is flushed; state is in memory only.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct MetricsSamplerInner {
    snapshot: Arc<RwLock<MetricsSnapshot>>,
    ready: Arc<AtomicBool>,
    notify_ready: Arc<Notify>,
    cancel: CancellationToken,
    cpu_period: Duration,
    memory_period: Duration,
}

impl MetricsSamplerInner {
    async fn run<S, P>(self: Arc<Self>, mut cpu: CpuStream<S>, mut memory: MemoryStream<P>)
    where
        S: TickSource,
        P: PageStatsSource,
    {
        info!(
            "metrics sampler started (cpu every {:?}, memory every {:?})",
            self.cpu_period, self.memory_period
        );
        let mut current = MetricsSnapshot::stale(self.cpu_period, self.memory_period);

        self.sample_cpu(&mut cpu, &mut current);
        self.sample_memory(&mut memory, &mut current);
        self.store_snapshot(&current).await;
        self.ready.store(true, Ordering::SeqCst);
        self.notify_ready.notify_waiters();

        let mut cpu_interval = interval(self.cpu_period);
        cpu_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        cpu_interval.tick().await;

        let mut memory_interval = interval(self.memory_period);
        memory_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        memory_interval.tick().await;

        loop {
            select! {
                _ = self.cancel.cancelled() => {
                    break;
                }
                _ = cpu_interval.tick() => {
                    if self.sample_cpu(&mut cpu, &mut current) {
                        self.store_snapshot(&current).await;
                    }
                }
                _ = memory_interval.tick() => {
                    self.sample_memory(&mut memory, &mut current);
                    self.store_snapshot(&current).await;
                }
            }
        }

        info!("metrics sampler stopped");
    }

    /// Returns whether the reading was accepted; a glitch leaves `current`
    /// as it was.
    fn sample_cpu<S: TickSource>(
        &self,
        cpu: &mut CpuStream<S>,
        current: &mut MetricsSnapshot,
    ) -> bool {
        let started = Instant::now();
        let now = Utc::now();
        let Some(usage) = cpu.record(now) else {
            return false;
        };
        current.cpu = SampleEnvelope::fresh(
            usage,
            now,
            self.cpu_period,
            started.elapsed(),
            CPU_SOURCE,
        );
        current.cpu_history = cpu.history().to_vec();
        current.captured_at = now;
        true
    }

    fn sample_memory<P: PageStatsSource>(
        &self,
        memory: &mut MemoryStream<P>,
        current: &mut MetricsSnapshot,
    ) {
        current.memory = memory.record(self.memory_period);
        current.captured_at = Utc::now();
    }

    async fn store_snapshot(&self, snapshot: &MetricsSnapshot) {
        let mut guard = self.snapshot.write().await;
        *guard = snapshot.clone();
    }
}

pub type MetricsSampler = MetricsSamplerHandle;

impl Drop for MetricsSamplerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
