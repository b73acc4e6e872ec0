use std::cell::Cell;
use std::path::{Path, PathBuf};

use chrono::Utc;
use host_monitor_lib::metrics::{
    CapacityProbe, CpuField, CpuStream, CpuUsageSampler, MountTable, SampleError, TickSnapshot,
    TickSource, VolumeEnumerator,
};
use host_monitor_lib::{max_total_capacity, VolumeInfo};

/// Replays two fixed readings, then keeps returning the last one.
struct TwoReadings {
    calls: Cell<usize>,
    first: TickSnapshot,
    second: TickSnapshot,
}

impl TickSource for TwoReadings {
    fn read_ticks(&self) -> Result<TickSnapshot, SampleError> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        Ok(if call == 0 { self.first } else { self.second })
    }
}

fn scenario() -> TwoReadings {
    TwoReadings {
        calls: Cell::new(0),
        first: TickSnapshot {
            user: 100,
            system: 50,
            idle: 800,
            nice: 0,
        },
        second: TickSnapshot {
            user: 150,
            system: 60,
            idle: 840,
            nice: 0,
        },
    }
}

#[test]
fn second_reading_reports_the_interval_between_readings() {
    let mut sampler = CpuUsageSampler::with_source(scenario());
    sampler.sample();

    let usage = sampler.sample();
    assert!((usage.user - 50.0).abs() < 1e-9);
    assert!((usage.system - 10.0).abs() < 1e-9);
    assert!((usage.idle - 40.0).abs() < 1e-9);

    // Nothing elapsed since the last read.
    assert!(sampler.sample().is_all_zero());
}

#[test]
fn stream_history_holds_system_then_user_per_accepted_reading() {
    let mut stream = CpuStream::with_sampler(CpuUsageSampler::with_source(scenario()), 240);
    let first = Utc::now();
    assert!(stream.record(first).is_some());
    let second = Utc::now();
    assert!(stream.record(second).is_some());
    assert!(stream.record(Utc::now()).is_none());

    let history: Vec<_> = stream.history().as_sequence().collect();
    assert_eq!(history.len(), 4);
    assert_eq!(history[2].field, CpuField::System);
    assert_eq!(history[2].time, second);
    assert!((history[2].amount - 10.0).abs() < 1e-9);
    assert_eq!(history[3].field, CpuField::User);
    assert!((history[3].amount - 50.0).abs() < 1e-9);
}

struct StaticMounts;

impl MountTable for StaticMounts {
    fn mount_points(&self) -> Result<Vec<PathBuf>, SampleError> {
        Ok(vec![
            PathBuf::from("/"),
            PathBuf::from("/System/Volumes/VM"),
            PathBuf::from("/Volumes/Data"),
        ])
    }
}

/// Reports a shrinking free figure on every query, like a disk being filled.
struct FillingDisk {
    free: Cell<u64>,
}

impl CapacityProbe for FillingDisk {
    fn total_bytes(&self, _: &Path) -> Result<u64, SampleError> {
        Ok(1000)
    }

    fn available_bytes(&self, _: &Path) -> Result<u64, SampleError> {
        let free = self.free.get();
        self.free.set(free.saturating_sub(100));
        Ok(free)
    }
}

#[test]
fn volumes_are_requeried_on_every_listing() {
    let enumerator = VolumeEnumerator::with_sources(
        StaticMounts,
        FillingDisk {
            free: Cell::new(400),
        },
        vec![PathBuf::from("/System/Volumes")],
    );

    let before = enumerator.list_volumes();
    assert_eq!(
        before,
        vec![VolumeInfo::new("/", 1000, 400), VolumeInfo::new("/Volumes/Data", 1000, 300)]
    );
    assert_eq!(before[0].used_bytes(), 600);

    let after = enumerator.list_volumes();
    assert_eq!(after[0].free_bytes, 200);
    assert_ne!(before, after);
    assert_eq!(max_total_capacity(&after), 1000);
}
