//! The cgroup accounting reader: mount discovery, version detection and
//! per-PID snapshot aggregation.

use std::io::BufRead;
use std::path::PathBuf;

use crate::fsutil;
use crate::mountinfo::{self, Mountpoints};
use crate::sys::SysConf;

use super::error::{Error, Result};
use super::paths::{ControllerPath, PathList, Resolver, cgroup_id, parse_cgroup_line};
use super::snapshot::{CgroupsVersion, Snapshot, StatsV1, StatsV2};
use super::v2::DeviceIndex;
use super::{v1, v2};

/// Reader configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Filesystem root to observe through; a containerized collector points
    /// this at the host bind mount (e.g. `/hostfs`).
    pub rootfs: PathBuf,
    /// Skip any controller whose cgroup path is `/`: processes in the root
    /// cgroup are not subject to resource accounting worth reporting. Note
    /// that a `cgroups_hierarchy_override` of `/` replaces the path before
    /// this check, so combining the two skips every controller.
    pub ignore_root_cgroups: bool,
    /// Replaces the cgroup path reported by `/proc/<pid>/cgroup`, for
    /// collectors whose own namespace hides the host path.
    pub cgroups_hierarchy_override: Option<String>,
    /// Resolve `major:minor` pairs in v2 `io.stat` to device names via a
    /// one-time scan of `<rootfs>/dev`.
    pub resolve_device_names: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            rootfs: PathBuf::from("/"),
            ignore_root_cgroups: false,
            cgroups_hierarchy_override: None,
            resolve_device_names: true,
        }
    }
}

/// Reads cgroup accounting for processes.
///
/// Mount discovery and the device index run once at construction; a `Reader`
/// does not pick up hierarchies mounted afterwards.
#[derive(Debug)]
pub struct Reader {
    options: ReaderOptions,
    mounts: Mountpoints,
    sys: SysConf,
    devices: Option<DeviceIndex>,
}

impl Reader {
    /// Discovers the host's cgroup mounts and builds a reader.
    ///
    /// # Errors
    ///
    /// Returns an error whose [`Error::is_cgroups_unsupported`] is true when
    /// the host has no cgroup support at all.
    pub fn new(options: ReaderOptions) -> Result<Self> {
        let subsystems = mountinfo::supported_subsystems(&options.rootfs)?;
        let mounts = mountinfo::subsystem_mountpoints(&options.rootfs, &subsystems)?;
        let devices = if options.resolve_device_names {
            Some(DeviceIndex::new(&options.rootfs.join("dev"))?)
        } else {
            None
        };

        Ok(Self {
            options,
            mounts,
            sys: SysConf::detect(),
            devices,
        })
    }

    /// Host facts used for percentage normalization, shared with
    /// [`Snapshot::fill_percentages`].
    pub fn sysconf(&self) -> &SysConf {
        &self.sys
    }

    /// Determines which hierarchy version accounts for `pid`.
    ///
    /// A process is on v2 only when every line of `/proc/<pid>/cgroup` is
    /// the unified marker; any v1 hierarchy line decides for v1, so a single
    /// snapshot never mixes versions.
    pub fn cgroups_version(&self, pid: u32) -> Result<CgroupsVersion> {
        let path = self.options.rootfs.join(format!("proc/{pid}/cgroup"));
        let reader = fsutil::open_file_reader(&path)?;
        for line in reader.lines() {
            let line = line.map_err(|source| Error::io(&path, source))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let parsed =
                parse_cgroup_line(trimmed).map_err(|source| Error::parse(&path, source))?;
            if !parsed.unified {
                return Ok(CgroupsVersion::V1);
            }
        }
        Ok(CgroupsVersion::V2)
    }

    /// Resolves the controller paths of `pid`, honoring the rootfs, the
    /// hierarchy override and `ignore_root_cgroups`.
    pub fn process_cgroup_paths(&self, pid: u32) -> Result<PathList> {
        self.resolver().process_cgroup_paths(pid)
    }

    /// Reads a full accounting snapshot for `pid`, dispatching on its
    /// hierarchy version. Returns `Ok(None)` when no known controller is
    /// attached to the process.
    pub fn stats_for_pid(&self, pid: u32) -> Result<Option<Snapshot>> {
        match self.cgroups_version(pid)? {
            CgroupsVersion::V1 => Ok(self.v1_stats_for_process(pid)?.map(Snapshot::V1)),
            CgroupsVersion::V2 => Ok(self.v2_stats_for_process(pid)?.map(Snapshot::V2)),
        }
    }

    /// Reads v1 accounting for `pid`. Returns `Ok(None)` when none of the
    /// supported subsystems resolve for the process.
    pub fn v1_stats_for_process(&self, pid: u32) -> Result<Option<StatsV1>> {
        let paths = self.resolver().process_cgroup_paths(pid)?;
        let mut stats = StatsV1::default();
        let mut used: Vec<&ControllerPath> = Vec::new();

        if let Some(cp) = paths.v1.get("cpu") {
            stats.cpu = Some(v1::CpuSubsystem::read(cp)?);
            used.push(cp);
        }
        if let Some(cp) = paths.v1.get("cpuacct") {
            stats.cpuacct = Some(v1::CpuAccountingSubsystem::read(cp, &self.sys)?);
            used.push(cp);
        }
        if let Some(cp) = paths.v1.get("memory") {
            stats.memory = Some(v1::MemorySubsystem::read(cp)?);
            used.push(cp);
        }
        if let Some(cp) = paths.v1.get("blkio") {
            stats.blkio = Some(v1::BlkioSubsystem::read(cp)?);
            used.push(cp);
        }

        if used.is_empty() {
            return Ok(None);
        }
        (stats.id, stats.path) = common_identity(&used);
        Ok(Some(stats))
    }

    /// Reads v2 accounting for `pid`. Returns `Ok(None)` when none of the
    /// supported controllers resolve for the process.
    pub fn v2_stats_for_process(&self, pid: u32) -> Result<Option<StatsV2>> {
        let paths = self.resolver().process_cgroup_paths(pid)?;
        let mut stats = StatsV2::default();
        let mut used: Vec<&ControllerPath> = Vec::new();

        if let Some(cp) = paths.v2.get("cpu") {
            stats.cpu = Some(v2::CpuSubsystem::read(cp)?);
            used.push(cp);
        }
        if let Some(cp) = paths.v2.get("memory") {
            stats.memory = Some(v2::MemorySubsystem::read(cp)?);
            used.push(cp);
        }
        if let Some(cp) = paths.v2.get("io") {
            stats.io = Some(v2::IoSubsystem::read(cp, self.devices.as_ref())?);
            used.push(cp);
        }

        if used.is_empty() {
            return Ok(None);
        }
        (stats.id, stats.path) = common_identity(&used);
        Ok(Some(stats))
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            rootfs: &self.options.rootfs,
            mounts: &self.mounts,
            hierarchy_override: self.options.cgroups_hierarchy_override.as_deref(),
            ignore_root_cgroups: self.options.ignore_root_cgroups,
        }
    }
}

/// The shared `{id, path}` of a snapshot: set only when every controller
/// that produced data reported the same relative path, empty otherwise.
fn common_identity(used: &[&ControllerPath]) -> (String, String) {
    let Some((first, rest)) = used.split_first() else {
        return (String::new(), String::new());
    };
    if rest.iter().all(|cp| cp.path == first.path) {
        (cgroup_id(&first.path), first.path.clone())
    } else {
        log::debug!("controllers disagree on the cgroup path, leaving identity empty");
        (String::new(), String::new())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;

    const CGROUP_PATH: &str = "/docker/abc123";

    /// Lays out a v1 Docker-style cgroup tree under a fake rootfs.
    fn v1_rootfs(pid: u32) -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let proc_pid = root.join(format!("proc/{pid}"));
        std::fs::create_dir_all(root.join("proc/self")).unwrap();
        std::fs::create_dir_all(&proc_pid).unwrap();

        std::fs::write(
            root.join("proc/cgroups"),
            "\
#subsys_name\thierarchy\tnum_cgroups\tenabled
cpu\t2\t125\t1
cpuacct\t2\t125\t1
memory\t5\t226\t1
blkio\t4\t125\t1
",
        )
        .unwrap();

        let mut mountinfo = String::new();
        for (id, subsystem) in [(30, "cpu,cpuacct"), (31, "memory"), (32, "blkio")] {
            let mount_point = root.join("sys/fs/cgroup").join(subsystem);
            mountinfo.push_str(&format!(
                "{id} 25 0:{id} / {} rw,nosuid shared:{id} - cgroup cgroup rw,{subsystem}\n",
                mount_point.display()
            ));
        }
        std::fs::write(root.join("proc/self/mountinfo"), mountinfo).unwrap();

        std::fs::write(
            proc_pid.join("cgroup"),
            format!(
                "4:blkio:{CGROUP_PATH}\n5:memory:{CGROUP_PATH}\n2:cpu,cpuacct:{CGROUP_PATH}\n"
            ),
        )
        .unwrap();

        for hierarchy in ["cpu,cpuacct", "memory", "blkio"] {
            let dir = root
                .join("sys/fs/cgroup")
                .join(hierarchy)
                .join(CGROUP_PATH.trim_start_matches('/'));
            std::fs::create_dir_all(&dir).unwrap();
            populate_v1_controller(&dir);
        }

        tmp
    }

    fn populate_v1_controller(dir: &Path) {
        std::fs::write(dir.join("cpu.cfs_period_us"), "100000\n").unwrap();
        std::fs::write(dir.join("cpu.cfs_quota_us"), "-1\n").unwrap();
        std::fs::write(
            dir.join("cpu.stat"),
            "nr_periods 2441\nnr_throttled 13\nthrottled_time 21240624\n",
        )
        .unwrap();
        std::fs::write(dir.join("cpuacct.usage"), "95996653175161\n").unwrap();
        std::fs::write(dir.join("cpuacct.stat"), "user 8003231\nsystem 1053222\n").unwrap();
        std::fs::write(dir.join("cpuacct.usage_percpu"), "23564408868869 23441073480637\n")
            .unwrap();
        std::fs::write(dir.join("memory.usage_in_bytes"), "47472640\n").unwrap();
        std::fs::write(dir.join("memory.limit_in_bytes"), "-1\n").unwrap();
        std::fs::write(dir.join("memory.stat"), "cache 233803776\nrss 36077568\n").unwrap();
        std::fs::write(
            dir.join("blkio.throttle.io_service_bytes"),
            "253:1 Read 4608\n253:1 Write 1517568\nTotal 1522176\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("blkio.throttle.io_serviced"),
            "253:1 Read 2\n253:1 Write 385\nTotal 387\n",
        )
        .unwrap();
    }

    /// Lays out a v2 unified tree under a fake rootfs.
    fn v2_rootfs(pid: u32) -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let proc_pid = root.join(format!("proc/{pid}"));
        std::fs::create_dir_all(root.join("proc/self")).unwrap();
        std::fs::create_dir_all(&proc_pid).unwrap();

        std::fs::write(
            root.join("proc/cgroups"),
            "#subsys_name\thierarchy\tnum_cgroups\tenabled\ncpu\t0\t1\t1\nmemory\t0\t1\t1\n",
        )
        .unwrap();

        let unified = root.join("sys/fs/cgroup");
        std::fs::write(
            root.join("proc/self/mountinfo"),
            format!(
                "35 25 0:30 / {} rw,nosuid,nodev - cgroup2 cgroup2 rw,nsdelegate\n",
                unified.display()
            ),
        )
        .unwrap();

        std::fs::write(proc_pid.join("cgroup"), "0::/system.slice/app.scope\n").unwrap();

        let cgroup_dir = unified.join("system.slice/app.scope");
        std::fs::create_dir_all(&cgroup_dir).unwrap();
        std::fs::write(
            cgroup_dir.join("cpu.stat"),
            "usage_usec 120000\nuser_usec 80000\nsystem_usec 40000\n",
        )
        .unwrap();
        std::fs::write(cgroup_dir.join("memory.stat"), "anon 36069376\nfile 233803776\n")
            .unwrap();
        std::fs::write(cgroup_dir.join("memory.current"), "269873152\n").unwrap();
        std::fs::write(cgroup_dir.join("memory.max"), "max\n").unwrap();
        std::fs::write(
            cgroup_dir.join("io.stat"),
            "253:1 rbytes=4608 wbytes=1517568 rios=2 wios=385 dbytes=0 dios=0\n",
        )
        .unwrap();

        tmp
    }

    fn reader_for(root: &Path) -> Reader {
        Reader::new(ReaderOptions {
            rootfs: root.to_path_buf(),
            resolve_device_names: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_v1_end_to_end() {
        let tmp = v1_rootfs(1234);
        let reader = reader_for(tmp.path());

        assert_eq!(reader.cgroups_version(1234).unwrap(), CgroupsVersion::V1);

        let snapshot = reader.stats_for_pid(1234).unwrap().unwrap();
        assert_eq!(snapshot.version(), CgroupsVersion::V1);
        let Snapshot::V1(stats) = snapshot else {
            unreachable!()
        };

        assert_eq!(stats.id, "abc123");
        assert_eq!(stats.path, CGROUP_PATH);

        let cpu = stats.cpu.unwrap();
        assert_eq!(cpu.cfs.period_us, Some(100_000));
        assert_eq!(cpu.cfs.quota_us, Some(0));
        assert_eq!(cpu.stats.periods, 2441);

        let acct = stats.cpuacct.unwrap();
        assert_eq!(acct.total.ns, Some(95_996_653_175_161));
        assert_eq!(acct.usage_percpu_ns.len(), 2);

        let memory = stats.memory.unwrap();
        assert_eq!(memory.mem.usage_bytes, Some(47_472_640));
        assert_eq!(memory.mem.limit_bytes, Some(0));
        assert_eq!(memory.stats.cache, 233_803_776);

        let blkio = stats.blkio.unwrap();
        assert_eq!(blkio.total.bytes, 4608 + 1_517_568);
        assert_eq!(blkio.total.ios, 2 + 385);
    }

    #[test]
    fn test_v2_end_to_end() {
        let tmp = v2_rootfs(42);
        let reader = reader_for(tmp.path());

        assert_eq!(reader.cgroups_version(42).unwrap(), CgroupsVersion::V2);

        let snapshot = reader.stats_for_pid(42).unwrap().unwrap();
        let Snapshot::V2(stats) = snapshot else {
            unreachable!()
        };

        assert_eq!(stats.id, "app.scope");
        assert_eq!(stats.path, "/system.slice/app.scope");
        assert_eq!(stats.cpu.as_ref().unwrap().usage.ns, Some(120_000_000));
        assert_eq!(
            stats.memory.as_ref().unwrap().mem.current_bytes,
            Some(269_873_152)
        );
        assert_eq!(stats.io.as_ref().unwrap().stats["253:1"].write_ios, 385);
    }

    #[test]
    fn test_hybrid_cgroup_file_resolves_to_v1_only() {
        let tmp = v1_rootfs(1234);
        let root = tmp.path();

        // a unified mount exists alongside the v1 hierarchies
        let unified = root.join("sys/fs/cgroup/unified");
        let cgroup_dir = unified.join("docker/abc123");
        std::fs::create_dir_all(&cgroup_dir).unwrap();
        std::fs::write(cgroup_dir.join("cpu.stat"), "usage_usec 120000\n").unwrap();

        let mountinfo_path = root.join("proc/self/mountinfo");
        let mut mountinfo = std::fs::read_to_string(&mountinfo_path).unwrap();
        mountinfo.push_str(&format!(
            "40 25 0:40 / {} rw,nosuid - cgroup2 cgroup2 rw,nsdelegate\n",
            unified.display()
        ));
        std::fs::write(&mountinfo_path, mountinfo).unwrap();

        // the PID's cgroup file carries both v1 lines and the v2 marker
        let cgroup_file = root.join("proc/1234/cgroup");
        let mut contents = std::fs::read_to_string(&cgroup_file).unwrap();
        contents.push_str("0::/docker/abc123\n");
        std::fs::write(&cgroup_file, contents).unwrap();

        let reader = reader_for(root);
        // any v1 hierarchy line decides for v1
        assert_eq!(reader.cgroups_version(1234).unwrap(), CgroupsVersion::V1);

        let snapshot = reader.stats_for_pid(1234).unwrap().unwrap();
        assert_eq!(snapshot.version(), CgroupsVersion::V1);
        let Snapshot::V1(stats) = snapshot else {
            unreachable!()
        };
        assert!(stats.cpu.is_some());
        assert!(stats.memory.is_some());
    }

    #[test]
    fn test_repeated_reads_are_identical() {
        let tmp = v1_rootfs(1234);
        let reader = reader_for(tmp.path());

        let first = reader.stats_for_pid(1234).unwrap().unwrap();
        let second = reader.stats_for_pid(1234).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_proc_cgroups_surfaces_the_sentinel() {
        let tmp = TempDir::new().unwrap();
        let err = Reader::new(ReaderOptions {
            rootfs: tmp.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.is_cgroups_unsupported());
    }

    #[test]
    fn test_unknown_controllers_yield_none() {
        let tmp = v1_rootfs(1234);
        // a PID whose cgroup file names only hierarchies we do not read
        let proc_pid = tmp.path().join("proc/99");
        std::fs::create_dir_all(&proc_pid).unwrap();
        std::fs::write(proc_pid.join("cgroup"), "7:freezer:/docker/abc123\n").unwrap();

        let reader = reader_for(tmp.path());
        assert!(reader.stats_for_pid(99).unwrap().is_none());
    }

    #[test]
    fn test_ignore_root_cgroups() {
        let tmp = v1_rootfs(1234);
        let proc_pid = tmp.path().join("proc/7");
        std::fs::create_dir_all(&proc_pid).unwrap();
        std::fs::write(proc_pid.join("cgroup"), "2:cpu,cpuacct:/\n5:memory:/\n").unwrap();
        for hierarchy in ["cpu,cpuacct", "memory"] {
            populate_v1_controller(&tmp.path().join("sys/fs/cgroup").join(hierarchy));
        }

        let reader = Reader::new(ReaderOptions {
            rootfs: tmp.path().to_path_buf(),
            ignore_root_cgroups: true,
            resolve_device_names: false,
            ..Default::default()
        })
        .unwrap();
        assert!(reader.stats_for_pid(7).unwrap().is_none());
    }

    #[test]
    fn test_common_identity_empty_on_disagreement() {
        let a = ControllerPath {
            path: "/docker/abc".to_owned(),
            full_path: PathBuf::from("/sys/fs/cgroup/cpu/docker/abc"),
            v2: false,
        };
        let b = ControllerPath {
            path: "/docker/xyz".to_owned(),
            full_path: PathBuf::from("/sys/fs/cgroup/memory/docker/xyz"),
            v2: false,
        };

        assert_eq!(
            common_identity(&[&a, &b]),
            (String::new(), String::new())
        );
        assert_eq!(
            common_identity(&[&a]),
            ("abc".to_owned(), "/docker/abc".to_owned())
        );
    }
}
