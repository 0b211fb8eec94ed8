//! Reader for the cgroup v1 `cpu` subsystem.
//!
//! Covers the CFS bandwidth files (`cpu.cfs_period_us`, `cpu.cfs_quota_us`,
//! `cpu.shares`), the realtime scheduler files (`cpu.rt_period_us`,
//! `cpu.rt_runtime_us`), and the `cpu.stat` throttling counters. A quota of
//! `-1` (unlimited) parses to 0.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Serialize;

use crate::cgroup::error::{Error, Result};
use crate::cgroup::parse::{self, KeyValueTable};
use crate::cgroup::paths::{ControllerPath, cgroup_id};
use crate::fsutil;

/// `cpu` subsystem scheduler limits and throttling counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CpuSubsystem {
    /// Cgroup name (last segment of the path).
    pub id: String,
    /// Cgroup path relative to the subsystem mountpoint.
    pub path: String,
    pub cfs: CfsLimits,
    pub rt: RtLimits,
    pub stats: ThrottleStats,
}

/// Completely Fair Scheduler bandwidth limits.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CfsLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_us: Option<u64>,
    /// `0` means unlimited (the kernel reports `-1`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota_us: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shares: Option<u64>,
}

/// Realtime scheduler limits.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RtLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_us: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_us: Option<u64>,
}

/// Throttling counters from `cpu.stat`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ThrottleStats {
    /// Number of enforcement periods that have elapsed.
    pub periods: u64,
    /// Number of periods in which the group was throttled.
    pub throttled_periods: u64,
    /// Total time the group was throttled, nanoseconds.
    pub throttled_ns: u64,
}

type Setter = fn(&mut ThrottleStats, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(3);

    m.insert("nr_periods", |s, v| s.periods = v);
    m.insert("nr_throttled", |s, v| s.throttled_periods = v);
    m.insert("throttled_time", |s, v| s.throttled_ns = v);

    m
});

impl KeyValueTable for ThrottleStats {
    fn setters() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}

impl CpuSubsystem {
    pub(crate) fn read(cp: &ControllerPath) -> Result<Self> {
        let dir = &cp.full_path;
        let mut cpu = Self {
            id: cgroup_id(&cp.path),
            path: cp.path.clone(),
            ..Default::default()
        };

        cpu.cfs.period_us = parse::read_uint_file(&dir.join("cpu.cfs_period_us"))?;
        cpu.cfs.quota_us = parse::read_uint_file(&dir.join("cpu.cfs_quota_us"))?;
        cpu.cfs.shares = parse::read_uint_file(&dir.join("cpu.shares"))?;
        cpu.rt.period_us = parse::read_uint_file(&dir.join("cpu.rt_period_us"))?;
        cpu.rt.runtime_us = parse::read_uint_file(&dir.join("cpu.rt_runtime_us"))?;

        let stat_path = dir.join("cpu.stat");
        if let Some(reader) = fsutil::open_optional_reader(&stat_path)? {
            cpu.stats = ThrottleStats::from_reader(reader)
                .map_err(|source| Error::parse(&stat_path, source))?;
        }

        Ok(cpu)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn controller_path(dir: &TempDir) -> ControllerPath {
        ControllerPath {
            path: "/docker/abc123".to_owned(),
            full_path: dir.path().to_path_buf(),
            v2: false,
        }
    }

    #[test]
    fn test_read_full_cpu_subsystem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cpu.cfs_period_us"), "100000\n").unwrap();
        std::fs::write(dir.path().join("cpu.cfs_quota_us"), "50000\n").unwrap();
        std::fs::write(dir.path().join("cpu.shares"), "1024\n").unwrap();
        std::fs::write(dir.path().join("cpu.rt_period_us"), "1000000\n").unwrap();
        std::fs::write(dir.path().join("cpu.rt_runtime_us"), "0\n").unwrap();
        std::fs::write(
            dir.path().join("cpu.stat"),
            "nr_periods 2441\nnr_throttled 13\nthrottled_time 21240624\n",
        )
        .unwrap();

        let cpu = CpuSubsystem::read(&controller_path(&dir)).unwrap();
        assert_eq!(cpu.id, "abc123");
        assert_eq!(cpu.path, "/docker/abc123");
        assert_eq!(cpu.cfs.period_us, Some(100_000));
        assert_eq!(cpu.cfs.quota_us, Some(50_000));
        assert_eq!(cpu.cfs.shares, Some(1024));
        assert_eq!(cpu.rt.period_us, Some(1_000_000));
        assert_eq!(cpu.rt.runtime_us, Some(0));
        assert_eq!(cpu.stats.periods, 2441);
        assert_eq!(cpu.stats.throttled_periods, 13);
        assert_eq!(cpu.stats.throttled_ns, 21_240_624);
    }

    #[test]
    fn test_negative_quota_means_unlimited() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cpu.cfs_quota_us"), "-1\n").unwrap();

        let cpu = CpuSubsystem::read(&controller_path(&dir)).unwrap();
        assert_eq!(cpu.cfs.quota_us, Some(0));
    }

    #[test]
    fn test_missing_files_leave_fields_absent() {
        let dir = TempDir::new().unwrap();
        let cpu = CpuSubsystem::read(&controller_path(&dir)).unwrap();
        assert_eq!(cpu.cfs.period_us, None);
        assert_eq!(cpu.cfs.quota_us, None);
        assert_eq!(cpu.stats, ThrottleStats::default());
    }

    #[test]
    fn test_malformed_stat_is_hard_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cpu.stat"), "nr_periods not-a-number\n").unwrap();
        let err = CpuSubsystem::read(&controller_path(&dir)).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
