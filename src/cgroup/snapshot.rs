//! Versioned accounting snapshots and derived CPU percentages.

use std::time::SystemTime;

use serde::Serialize;

use crate::sys::SysConf;

use super::CpuUsage;
use super::{v1, v2};

/// Which cgroup hierarchy a process is accounted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CgroupsVersion {
    V1,
    V2,
}

/// Accounting read from the v1 (legacy) hierarchies.
///
/// `id` and `path` are filled only when every resolved controller reported
/// the same relative cgroup path; on disagreement both stay empty and the
/// per-controller values remain authoritative.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct StatsV1 {
    pub id: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<v1::CpuSubsystem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpuacct: Option<v1::CpuAccountingSubsystem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<v1::MemorySubsystem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blkio: Option<v1::BlkioSubsystem>,
}

/// Accounting read from the v2 (unified) hierarchy.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct StatsV2 {
    pub id: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<v2::CpuSubsystem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<v2::MemorySubsystem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub io: Option<v2::IoSubsystem>,
}

/// One point-in-time accounting snapshot for a process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    V1(StatsV1),
    V2(StatsV2),
}

impl Snapshot {
    pub fn version(&self) -> CgroupsVersion {
        match self {
            Self::V1(_) => CgroupsVersion::V1,
            Self::V2(_) => CgroupsVersion::V2,
        }
    }

    /// Flattens the snapshot into a generic JSON map for the event
    /// serializer.
    pub fn to_map(&self) -> serde_json::Result<serde_json::Map<String, serde_json::Value>> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "snapshot serialized to non-object value: {other}"
            ))),
        }
    }

    /// Derives CPU utilization percentages from a previous snapshot of the
    /// same process.
    ///
    /// A version mismatch between the two snapshots or missing CPU
    /// accounting on either side leaves the snapshot unchanged; the first
    /// poll of a process has no previous sample and must not fail.
    pub fn fill_percentages(
        &mut self,
        previous: &Snapshot,
        cur_time: SystemTime,
        prev_time: SystemTime,
        sys: &SysConf,
    ) {
        let wall_ns = match cur_time.duration_since(prev_time) {
            Ok(delta) if !delta.is_zero() => delta.as_nanos() as u64,
            _ => {
                log::debug!("non-positive wall-clock delta between snapshots, skipping");
                return;
            }
        };

        match (self, previous) {
            (Self::V1(cur), Self::V1(prev)) => {
                let (Some(acct), Some(prev_acct)) = (cur.cpuacct.as_mut(), prev.cpuacct.as_ref())
                else {
                    log::debug!("cpuacct missing on one side, skipping percentages");
                    return;
                };
                let cores = if acct.usage_percpu_ns.is_empty() {
                    sys.logical_cpus
                } else {
                    acct.usage_percpu_ns.len()
                };
                fill_usage(&mut acct.total, &prev_acct.total, wall_ns, cores);
                fill_usage(&mut acct.user, &prev_acct.user, wall_ns, cores);
                fill_usage(&mut acct.system, &prev_acct.system, wall_ns, cores);
            }
            (Self::V2(cur), Self::V2(prev)) => {
                let (Some(cpu), Some(prev_cpu)) = (cur.cpu.as_mut(), prev.cpu.as_ref()) else {
                    log::debug!("cpu controller missing on one side, skipping percentages");
                    return;
                };
                let cores = sys.logical_cpus;
                fill_usage(&mut cpu.usage, &prev_cpu.usage, wall_ns, cores);
                fill_usage(&mut cpu.user, &prev_cpu.user, wall_ns, cores);
                fill_usage(&mut cpu.system, &prev_cpu.system, wall_ns, cores);
            }
            _ => {
                log::debug!("cgroup version changed between snapshots, skipping percentages");
            }
        }
    }
}

fn fill_usage(cur: &mut CpuUsage, prev: &CpuUsage, wall_ns: u64, cores: usize) {
    let (Some(cur_ns), Some(prev_ns)) = (cur.ns, prev.ns) else {
        return;
    };
    let cores = cores.max(1);
    let raw = cur_ns.saturating_sub(prev_ns) as f64 / wall_ns as f64;
    cur.pct = Some(round4(raw));
    cur.norm_pct = Some(round4(raw / cores as f64));
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
