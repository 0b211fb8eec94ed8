//! Reader for the cgroup v1 `cpuacct` (CPU accounting) subsystem.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use serde::Serialize;

use crate::cgroup::CpuUsage;
use crate::cgroup::error::{Error, Result};
use crate::cgroup::parse::{self, KeyValueTable};
use crate::cgroup::paths::{ControllerPath, cgroup_id};
use crate::fsutil;
use crate::sys::SysConf;

/// CPU time consumed by the cgroup, from `cpuacct.usage`, `cpuacct.stat`
/// and `cpuacct.usage_percpu`.
///
/// `cpuacct.stat` reports user/system time in clock ticks; both are
/// converted to nanoseconds at read time. Percentage fields are filled in
/// by [`crate::cgroup::Snapshot::fill_percentages`].
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CpuAccountingSubsystem {
    pub id: String,
    pub path: String,
    pub total: CpuUsage,
    pub user: CpuUsage,
    pub system: CpuUsage,
    /// Per-core usage in nanoseconds, keyed by 1-based core index for
    /// backward compatibility with existing consumers.
    pub usage_percpu_ns: BTreeMap<String, u64>,
}

/// Raw `cpuacct.stat` values, in clock ticks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct AcctTicks {
    user: u64,
    system: u64,
}

type Setter = fn(&mut AcctTicks, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(2);

    m.insert("user", |s, v| s.user = v);
    m.insert("system", |s, v| s.system = v);

    m
});

impl KeyValueTable for AcctTicks {
    fn setters() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}

impl CpuAccountingSubsystem {
    pub(crate) fn read(cp: &ControllerPath, sys: &SysConf) -> Result<Self> {
        let dir = &cp.full_path;
        let mut acct = Self {
            id: cgroup_id(&cp.path),
            path: cp.path.clone(),
            ..Default::default()
        };

        acct.total.ns = parse::read_uint_file(&dir.join("cpuacct.usage"))?;

        let stat_path = dir.join("cpuacct.stat");
        if let Some(reader) = fsutil::open_optional_reader(&stat_path)? {
            let ticks = AcctTicks::from_reader(reader)
                .map_err(|source| Error::parse(&stat_path, source))?;
            acct.user.ns = Some(sys.ticks_to_ns(ticks.user));
            acct.system.ns = Some(sys.ticks_to_ns(ticks.system));
        }

        let percpu_path = dir.join("cpuacct.usage_percpu");
        if let Some(contents) = fsutil::read_optional(&percpu_path)? {
            for (index, raw) in contents.split_whitespace().enumerate() {
                let value = parse::parse_uint(raw)
                    .map_err(|source| Error::parse(&percpu_path, source))?;
                acct.usage_percpu_ns.insert((index + 1).to_string(), value);
            }
        }

        Ok(acct)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const SYS: SysConf = SysConf {
        ticks_per_sec: 100,
        logical_cpus: 4,
    };

    fn controller_path(dir: &TempDir) -> ControllerPath {
        ControllerPath {
            path: "/docker/abc123".to_owned(),
            full_path: dir.path().to_path_buf(),
            v2: false,
        }
    }

    #[test]
    fn test_read_cpuacct_subsystem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cpuacct.usage"), "95996653175161\n").unwrap();
        std::fs::write(dir.path().join("cpuacct.stat"), "user 8003231\nsystem 1053222\n")
            .unwrap();
        std::fs::write(
            dir.path().join("cpuacct.usage_percpu"),
            "23564408868869 23441073480637 24527239478921 24463931346734\n",
        )
        .unwrap();

        let acct = CpuAccountingSubsystem::read(&controller_path(&dir), &SYS).unwrap();
        assert_eq!(acct.total.ns, Some(95_996_653_175_161));
        // clock ticks at 100 Hz are 10ms each
        assert_eq!(acct.user.ns, Some(8_003_231 * 10_000_000));
        assert_eq!(acct.system.ns, Some(1_053_222 * 10_000_000));

        assert_eq!(acct.usage_percpu_ns.len(), 4);
        assert_eq!(
            acct.usage_percpu_ns.get("1").copied(),
            Some(23_564_408_868_869)
        );
        assert_eq!(
            acct.usage_percpu_ns.get("4").copied(),
            Some(24_463_931_346_734)
        );
        assert!(acct.total.pct.is_none());
    }

    #[test]
    fn test_missing_files_leave_fields_absent() {
        let dir = TempDir::new().unwrap();
        let acct = CpuAccountingSubsystem::read(&controller_path(&dir), &SYS).unwrap();
        assert_eq!(acct.total.ns, None);
        assert_eq!(acct.user.ns, None);
        assert!(acct.usage_percpu_ns.is_empty());
    }

    #[test]
    fn test_malformed_percpu_is_hard_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cpuacct.usage_percpu"), "123 garbage\n").unwrap();
        let err = CpuAccountingSubsystem::read(&controller_path(&dir), &SYS).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
