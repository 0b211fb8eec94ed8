//! cgstats: cgroup resource accounting for a host metrics collector.
//!
//! The crate reads the kernel's cgroup interface files (both the legacy v1
//! hierarchies and the v2 unified hierarchy) and turns them into typed
//! per-process snapshots. A [`cgroup::Reader`] is built once per host,
//! discovers the cgroup mounts through `/proc/cgroups` and
//! `/proc/self/mountinfo`, and resolves each PID's controllers via
//! `/proc/<pid>/cgroup`.
//!
//! All of `/proc` and `/sys` access goes through a configurable rootfs
//! prefix so a collector running inside a container can observe the host
//! through a bind mount (e.g. `/hostfs`).
//!
//! ```no_run
//! use cgstats::cgroup::{Reader, ReaderOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reader = Reader::new(ReaderOptions::default())?;
//! if let Some(snapshot) = reader.stats_for_pid(1234)? {
//!     println!("{:?}", snapshot.to_map()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cgroup;
pub mod fsutil;
pub mod mountinfo;
pub mod sys;
