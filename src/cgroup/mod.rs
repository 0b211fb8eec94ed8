//! Cgroup resource accounting for processes.
//!
//! A [`Reader`] resolves which cgroup (v1 or v2) a PID belongs to, reads the
//! controller interface files and aggregates them into a versioned
//! [`Snapshot`]. CPU utilization percentages are derived by comparing two
//! snapshots with [`Snapshot::fill_percentages`].

pub mod error;
pub mod parse;
mod paths;
mod reader;
mod snapshot;
pub mod v1;
pub mod v2;

use serde::Serialize;

pub use error::{Error, Result};
pub use parse::{Pressure, StallMetrics};
pub use paths::{ControllerPath, PathList};
pub use reader::{Reader, ReaderOptions};
pub use snapshot::{CgroupsVersion, Snapshot, StatsV1, StatsV2};

/// CPU time with derived utilization percentages.
///
/// Readers fill in `ns` only; `pct` and `norm_pct` stay absent until
/// [`Snapshot::fill_percentages`] computes them from a previous snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct CpuUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ns: Option<u64>,
    /// Fraction of wall-clock time spent on CPU; can exceed 1.0 on
    /// multi-core hosts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct: Option<f64>,
    /// `pct` normalized by the number of cores, capped at 1.0 in practice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub norm_pct: Option<f64>,
}
