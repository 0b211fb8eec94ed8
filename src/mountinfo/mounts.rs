//! Kernel subsystem discovery and cgroup mountpoint resolution.
//!
//! [`supported_subsystems`] reads `/proc/cgroups` to learn which cgroup v1
//! subsystems the kernel supports and has enabled. [`subsystem_mountpoints`]
//! reads `/proc/self/mountinfo` and maps each supported subsystem to the
//! hierarchy it is mounted on, plus the unified (v2) mountpoint when one
//! exists. Both take a rootfs prefix so a collector running inside a
//! container can observe the host through a bind mount (e.g. `/hostfs`).

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::fsutil;

use super::parser::parse_mount_entry;
use super::{Error, Result};

/// Where each cgroup hierarchy is mounted on this host.
///
/// Built once per reader; the table is not invalidated if mounts change
/// afterwards.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Mountpoints {
    /// v1 subsystem name to the mountpoint of the hierarchy it is attached
    /// to. Co-mounted subsystems (e.g. `cpu,cpuacct`) map to the same path.
    pub v1: HashMap<String, PathBuf>,
    /// Mountpoint of the unified (v2) hierarchy, if mounted.
    pub v2: Option<PathBuf>,
}

/// Returns the set of cgroup subsystems the kernel supports and has enabled,
/// from `<rootfs>/proc/cgroups`.
///
/// # Errors
///
/// Returns [`Error::CgroupsUnsupported`] when the file does not exist, which
/// is the sentinel for "this host has no cgroup support".
pub fn supported_subsystems(rootfs: impl AsRef<Path>) -> Result<HashSet<String>> {
    let path = rootfs.as_ref().join("proc/cgroups");
    let reader = match fsutil::open_optional_reader(&path)? {
        Some(reader) => reader,
        None => return Err(Error::CgroupsUnsupported { path }),
    };
    supported_subsystems_from_reader(reader, &path)
}

/// Parses `/proc/cgroups` content. Format, one subsystem per line:
///
/// ```text
/// #subsys_name    hierarchy       num_cgroups     enabled
/// cpu             2               125             1
/// ```
fn supported_subsystems_from_reader<R: BufRead>(
    mut reader: R,
    origin: &Path,
) -> Result<HashSet<String>> {
    let mut subsystems = HashSet::new();
    let mut line = String::new();

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            let mut fields = trimmed.split_whitespace();
            let (name, enabled) = match (fields.next(), fields.nth(2)) {
                (Some(name), Some(enabled)) => (name, enabled),
                _ => {
                    return Err(Error::MalformedSubsystem {
                        path: origin.to_path_buf(),
                        line: trimmed.to_owned(),
                    });
                }
            };
            if enabled != "0" {
                subsystems.insert(name.to_owned());
            }
        }
        line.clear();
    }

    Ok(subsystems)
}

/// Builds the [`Mountpoints`] table from `<rootfs>/proc/self/mountinfo`.
///
/// Only mounts under `rootfs` are considered; a containerized collector can
/// see mounts belonging to other namespaces, which must not be mistaken for
/// host hierarchies. For `cgroup` mounts, each super-option naming a
/// supported subsystem (including the `name=X` alias form) is mapped to the
/// mount point; the first mount seen per subsystem wins. For `cgroup2`
/// mounts, the first mount point is recorded as the unified hierarchy.
pub fn subsystem_mountpoints(
    rootfs: impl AsRef<Path>,
    subsystems: &HashSet<String>,
) -> Result<Mountpoints> {
    let rootfs = rootfs.as_ref();
    let path = rootfs.join("proc/self/mountinfo");
    let reader = fsutil::open_file_reader(&path)?;
    subsystem_mountpoints_from_reader(reader, &path, rootfs, subsystems)
}

fn subsystem_mountpoints_from_reader<R: BufRead>(
    mut reader: R,
    origin: &Path,
    rootfs: &Path,
    subsystems: &HashSet<String>,
) -> Result<Mountpoints> {
    let mut mounts = Mountpoints::default();
    let mut line = String::with_capacity(256);

    while reader
        .read_line(&mut line)
        .map_err(|source| Error::ReadLine {
            path: origin.to_path_buf(),
            source,
        })?
        != 0
    {
        let entry = parse_mount_entry(line.trim_end()).map_err(|source| Error::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        if entry.fs_type != "cgroup" && entry.fs_type != "cgroup2" {
            line.clear();
            continue;
        }

        if !Path::new(entry.mount_point).starts_with(rootfs) {
            log::debug!(
                "skipping cgroup mount `{}` outside root `{}`",
                entry.mount_point,
                rootfs.display()
            );
            line.clear();
            continue;
        }

        if entry.fs_type == "cgroup" {
            for option in entry.super_options.split(',') {
                // named hierarchies appear as `name=<subsystem>`
                let name = option.strip_prefix("name=").unwrap_or(option);
                if subsystems.contains(name) && !mounts.v1.contains_key(name) {
                    mounts
                        .v1
                        .insert(name.to_owned(), PathBuf::from(entry.mount_point));
                }
            }
        } else if mounts.v2.is_none() {
            log::debug!("found unified cgroup hierarchy at `{}`", entry.mount_point);
            mounts.v2 = Some(PathBuf::from(entry.mount_point));
        }

        line.clear();
    }

    Ok(mounts)
}
