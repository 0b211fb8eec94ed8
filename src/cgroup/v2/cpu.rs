//! Reader for the cgroup v2 `cpu` controller.
//!
//! `cpu.stat` reports times in microseconds; usage values are converted to
//! nanoseconds at read time so percentage math is shared with the v1 path.
//! Throttling counters keep the kernel's units.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Serialize;

use crate::cgroup::CpuUsage;
use crate::cgroup::error::{Error, Result};
use crate::cgroup::parse::{self, KeyValueTable, Pressure};
use crate::cgroup::paths::{ControllerPath, cgroup_id};
use crate::fsutil;

/// `cpu` controller accounting.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CpuSubsystem {
    pub id: String,
    pub path: String,
    pub usage: CpuUsage,
    pub user: CpuUsage,
    pub system: CpuUsage,
    pub stats: CpuStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<Pressure>,
}

/// Bandwidth throttling counters from `cpu.stat`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CpuStats {
    pub periods: u64,
    pub throttled_periods: u64,
    pub throttled_us: u64,
}

/// Raw `cpu.stat` table, kernel units (microseconds).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct StatTable {
    usage_usec: u64,
    user_usec: u64,
    system_usec: u64,
    nr_periods: u64,
    nr_throttled: u64,
    throttled_usec: u64,
}

type Setter = fn(&mut StatTable, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(6);

    m.insert("usage_usec", |s, v| s.usage_usec = v);
    m.insert("user_usec", |s, v| s.user_usec = v);
    m.insert("system_usec", |s, v| s.system_usec = v);
    m.insert("nr_periods", |s, v| s.nr_periods = v);
    m.insert("nr_throttled", |s, v| s.nr_throttled = v);
    m.insert("throttled_usec", |s, v| s.throttled_usec = v);

    m
});

impl KeyValueTable for StatTable {
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

        let stat_path = dir.join("cpu.stat");
        if let Some(reader) = fsutil::open_optional_reader(&stat_path)? {
            let table =
                StatTable::from_reader(reader).map_err(|source| Error::parse(&stat_path, source))?;
            cpu.usage.ns = Some(table.usage_usec.saturating_mul(1000));
            cpu.user.ns = Some(table.user_usec.saturating_mul(1000));
            cpu.system.ns = Some(table.system_usec.saturating_mul(1000));
            cpu.stats = CpuStats {
                periods: table.nr_periods,
                throttled_periods: table.nr_throttled,
                throttled_us: table.throttled_usec,
            };
        }

        cpu.pressure = parse::read_pressure_file(&dir.join("cpu.pressure"))?;

        Ok(cpu)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn controller_path(dir: &TempDir) -> ControllerPath {
        ControllerPath {
            path: "/system.slice/docker-abc123.scope".to_owned(),
            full_path: dir.path().to_path_buf(),
            v2: true,
        }
    }

    #[test]
    fn test_read_cpu_stat_converts_to_ns() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("cpu.stat"),
            "\
usage_usec 120000
user_usec 80000
system_usec 40000
nr_periods 123
nr_throttled 1
throttled_usec 18446744073709551615
",
        )
        .unwrap();

        let cpu = CpuSubsystem::read(&controller_path(&dir)).unwrap();
        assert_eq!(cpu.id, "docker-abc123.scope");
        assert_eq!(cpu.usage.ns, Some(120_000_000));
        assert_eq!(cpu.user.ns, Some(80_000_000));
        assert_eq!(cpu.system.ns, Some(40_000_000));
        assert_eq!(cpu.stats.periods, 123);
        assert_eq!(cpu.stats.throttled_periods, 1);
        assert_eq!(cpu.stats.throttled_us, u64::MAX);
        assert!(cpu.pressure.is_none());
    }

    #[test]
    fn test_huge_usage_saturates_instead_of_overflowing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("cpu.stat"),
            "usage_usec 18446744073709551615\nuser_usec 1\nsystem_usec 1\n",
        )
        .unwrap();

        let cpu = CpuSubsystem::read(&controller_path(&dir)).unwrap();
        assert_eq!(cpu.usage.ns, Some(u64::MAX));
        assert_eq!(cpu.user.ns, Some(1000));
    }

    #[test]
    fn test_read_cpu_pressure() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("cpu.pressure"),
            "some avg10=3.00 avg60=2.10 avg300=4.00 total=1154482\n",
        )
        .unwrap();

        let cpu = CpuSubsystem::read(&controller_path(&dir)).unwrap();
        let some = cpu.pressure.unwrap().some.unwrap();
        assert_eq!(some.ten, 3.00);
        assert_eq!(some.total, 1_154_482);
    }

    #[test]
    fn test_missing_files_leave_fields_absent() {
        let dir = TempDir::new().unwrap();
        let cpu = CpuSubsystem::read(&controller_path(&dir)).unwrap();
        assert_eq!(cpu.usage.ns, None);
        assert_eq!(cpu.stats, CpuStats::default());
        assert!(cpu.pressure.is_none());
    }
}
