//! Discovery of cgroup mountpoints on the host.
//!
//! Linux exposes cgroup hierarchies as mounted pseudo-filesystems. Which
//! hierarchies exist, and where, is answered by two files:
//!
//! - `/proc/cgroups` lists the controllers (subsystems) the running kernel
//!   supports, and whether each is enabled.
//! - `/proc/self/mountinfo` lists every mount visible to the process,
//!   including `cgroup` (v1, one mount per hierarchy) and `cgroup2`
//!   (the single unified hierarchy) mounts.
//!
//! This module parses both into a [`Mountpoints`] table that maps each v1
//! subsystem to its mountpoint and records the v2 unified mountpoint, if
//! any. The table is built once per [`crate::cgroup::Reader`] and used to
//! resolve per-process controller paths.

mod error;
mod mounts;
mod parser;

pub use error::{Error, Result};
pub use mounts::{Mountpoints, subsystem_mountpoints, supported_subsystems};
pub use parser::{MountEntry, ParseError, parse_mount_entry};
