//! Resolution of a process's cgroup membership to filesystem paths.
//!
//! `/proc/<pid>/cgroup` lists one line per hierarchy the process belongs to,
//! in the form `hierarchy-id:subsystem-list:path`. On v1 the subsystem list
//! names the controllers sharing that hierarchy (co-mounted controllers
//! share one path); on v2 the line is the `0::<path>` marker and the active
//! controllers must be discovered by listing the cgroup directory for
//! `*.stat` files.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::fsutil;
use crate::mountinfo::Mountpoints;

use super::error::{Error, Result};
use super::parse::ParseError;

/// Resolved location of one controller for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerPath {
    /// Cgroup path relative to the controller mountpoint (or the configured
    /// hierarchy override).
    pub path: String,
    /// Absolute path of the controller directory.
    pub full_path: PathBuf,
    /// True when the path belongs to the unified (v2) hierarchy.
    pub v2: bool,
}

/// Controller paths for one process, kept separate per cgroup version.
///
/// A hybrid host can expose both hierarchies at once, so the two namespaces
/// are never merged.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PathList {
    pub v1: HashMap<String, ControllerPath>,
    pub v2: HashMap<String, ControllerPath>,
}

impl PathList {
    pub fn is_empty(&self) -> bool {
        self.v1.is_empty() && self.v2.is_empty()
    }
}

/// One parsed line of `/proc/<pid>/cgroup`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct CgroupLine<'a> {
    pub subsystems: &'a str,
    pub path: &'a str,
    /// True for the `0::<path>` unified-hierarchy marker.
    pub unified: bool,
}

pub(crate) fn parse_cgroup_line(line: &str) -> std::result::Result<CgroupLine<'_>, ParseError> {
    let mut parts = line.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(hierarchy), Some(subsystems), Some(path)) => Ok(CgroupLine {
            subsystems,
            path,
            unified: hierarchy == "0" && subsystems.is_empty(),
        }),
        _ => Err(ParseError::KeyValueFormat {
            line: line.to_owned(),
        }),
    }
}

/// Configuration for path resolution, borrowed from the reader.
pub(crate) struct Resolver<'a> {
    pub rootfs: &'a Path,
    pub mounts: &'a Mountpoints,
    pub hierarchy_override: Option<&'a str>,
    pub ignore_root_cgroups: bool,
}

impl Resolver<'_> {
    /// Resolves the controller paths of `pid` from `/proc/<pid>/cgroup`.
    pub(crate) fn process_cgroup_paths(&self, pid: u32) -> Result<PathList> {
        let proc_path = self.rootfs.join(format!("proc/{pid}/cgroup"));
        let reader = fsutil::open_file_reader(&proc_path)?;
        self.collect(reader, &proc_path)
    }

    fn collect<R: BufRead>(&self, reader: R, origin: &Path) -> Result<PathList> {
        let mut paths = PathList::default();

        for line in reader.lines() {
            let line = line.map_err(|source| Error::io(origin, source))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let parsed =
                parse_cgroup_line(trimmed).map_err(|source| Error::parse(origin, source))?;

            if parsed.unified {
                self.collect_v2(&parsed, &mut paths)?;
            } else {
                self.collect_v1(&parsed, &mut paths);
            }
        }

        Ok(paths)
    }

    fn collect_v1(&self, line: &CgroupLine<'_>, paths: &mut PathList) {
        for subsystem in line.subsystems.split(',') {
            let name = subsystem.strip_prefix("name=").unwrap_or(subsystem);
            let Some(mountpoint) = self.mounts.v1.get(name) else {
                log::debug!("no mountpoint for v1 subsystem `{name}`, skipping");
                continue;
            };
            let rel = self.hierarchy_override.unwrap_or(line.path);
            if self.ignore_root_cgroups && rel == "/" {
                continue;
            }
            paths.v1.insert(
                name.to_owned(),
                ControllerPath {
                    path: rel.to_owned(),
                    full_path: join_rel(mountpoint, rel),
                    v2: false,
                },
            );
        }
    }

    fn collect_v2(&self, line: &CgroupLine<'_>, paths: &mut PathList) -> Result<()> {
        // A containerized collector may not see the host's unified mount in
        // its own namespace; the hierarchy override tells it where to look.
        let (rel, full_path) = match (&self.mounts.v2, self.hierarchy_override) {
            (Some(unified), _) => (line.path, join_rel(unified, line.path)),
            (None, Some(override_path)) => (
                override_path,
                join_rel(&self.rootfs.join("sys/fs/cgroup"), override_path),
            ),
            (None, None) => {
                log::warn!(
                    "no unified cgroup mountpoint known and no hierarchy override configured, \
                     skipping v2 entry `{}`",
                    line.path
                );
                return Ok(());
            }
        };

        if self.ignore_root_cgroups && rel == "/" {
            return Ok(());
        }

        // v2 does not enumerate active controllers per process; every
        // `<controller>.stat` file in the cgroup directory is evidence that
        // the controller is active there.
        let entries =
            std::fs::read_dir(&full_path).map_err(|source| Error::io(&full_path, source))?;
        for entry in entries {
            let entry = entry.map_err(|source| Error::io(&full_path, source))?;
            let name = entry.file_name();
            let Some(controller) = name.to_str().and_then(|n| n.strip_suffix(".stat")) else {
                continue;
            };
            paths.v2.insert(
                controller.to_owned(),
                ControllerPath {
                    path: rel.to_owned(),
                    full_path: full_path.clone(),
                    v2: true,
                },
            );
        }

        Ok(())
    }
}

/// Joins a cgroup-relative path onto a mountpoint. The relative path always
/// begins with `/`, which `PathBuf::join` would treat as absolute.
pub(crate) fn join_rel(base: &Path, rel: &str) -> PathBuf {
    base.join(rel.trim_start_matches('/'))
}

/// The cgroup name: the last segment of the relative path, or `/` for the
/// root cgroup.
pub(crate) fn cgroup_id(path: &str) -> String {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("/")
        .to_owned()
}
