//! Reader for the cgroup v1 `memory` subsystem.
//!
//! Four accounting families share one file layout: plain memory (`memory.*`),
//! memory+swap (`memory.memsw.*`), kernel memory (`memory.kmem.*`) and
//! kernel TCP buffer memory (`memory.kmem.tcp.*`). Each exposes usage,
//! high-water mark, limit and a limit-hit counter. `memory.stat` adds the
//! detailed breakdown.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use serde::Serialize;

use crate::cgroup::error::{Error, Result};
use crate::cgroup::parse::{self, KeyValueTable};
use crate::cgroup::paths::{ControllerPath, cgroup_id};
use crate::fsutil;

/// `memory` subsystem accounting.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MemorySubsystem {
    pub id: String,
    pub path: String,
    /// Plain memory accounting (`memory.*`).
    pub mem: MemoryData,
    /// Memory+swap accounting (`memory.memsw.*`).
    pub memsw: MemoryData,
    /// Kernel memory accounting (`memory.kmem.*`).
    pub kmem: MemoryData,
    /// Kernel TCP buffer accounting (`memory.kmem.tcp.*`).
    pub kmem_tcp: MemoryData,
    pub stats: MemoryStats,
}

/// One accounting family: usage, high-water mark, limit, limit-hit count.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_usage_bytes: Option<u64>,
    /// `0` means unlimited (the kernel reports `-1` or a page-rounded
    /// "infinite" value).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_bytes: Option<u64>,
    /// Times the limit was hit (`<prefix>.failcnt`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<u64>,
}

impl MemoryData {
    fn read(dir: &Path, prefix: &str) -> Result<Self> {
        Ok(Self {
            usage_bytes: parse::read_uint_file(&dir.join(format!("{prefix}.usage_in_bytes")))?,
            max_usage_bytes: parse::read_uint_file(
                &dir.join(format!("{prefix}.max_usage_in_bytes")),
            )?,
            limit_bytes: parse::read_uint_file(&dir.join(format!("{prefix}.limit_in_bytes")))?,
            failures: parse::read_uint_file(&dir.join(format!("{prefix}.failcnt")))?,
        })
    }
}

/// Breakdown from `memory.stat`. Unrecognized keys are ignored.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub cache: u64,
    pub rss: u64,
    pub rss_huge: u64,
    pub mapped_file: u64,
    pub swap: u64,
    pub dirty: u64,
    pub writeback: u64,
    pub pages_in: u64,
    pub pages_out: u64,
    pub page_faults: u64,
    pub major_page_faults: u64,
    pub active_anon: u64,
    pub inactive_anon: u64,
    pub active_file: u64,
    pub inactive_file: u64,
    pub unevictable: u64,
    pub hierarchical_memory_limit: u64,
    pub hierarchical_memsw_limit: u64,
}

type Setter = fn(&mut MemoryStats, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(18);

    m.insert("cache", (|s, v| s.cache = v) as Setter);
    m.insert("rss", |s, v| s.rss = v);
    m.insert("rss_huge", |s, v| s.rss_huge = v);
    m.insert("mapped_file", |s, v| s.mapped_file = v);
    m.insert("swap", |s, v| s.swap = v);
    m.insert("dirty", |s, v| s.dirty = v);
    m.insert("writeback", |s, v| s.writeback = v);
    m.insert("pgpgin", |s, v| s.pages_in = v);
    m.insert("pgpgout", |s, v| s.pages_out = v);
    m.insert("pgfault", |s, v| s.page_faults = v);
    m.insert("pgmajfault", |s, v| s.major_page_faults = v);
    m.insert("active_anon", |s, v| s.active_anon = v);
    m.insert("inactive_anon", |s, v| s.inactive_anon = v);
    m.insert("active_file", |s, v| s.active_file = v);
    m.insert("inactive_file", |s, v| s.inactive_file = v);
    m.insert("unevictable", |s, v| s.unevictable = v);
    m.insert("hierarchical_memory_limit", |s, v| {
        s.hierarchical_memory_limit = v
    });
    m.insert("hierarchical_memsw_limit", |s, v| {
        s.hierarchical_memsw_limit = v
    });

    m
});

impl KeyValueTable for MemoryStats {
    fn setters() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}

impl MemorySubsystem {
    pub(crate) fn read(cp: &ControllerPath) -> Result<Self> {
        let dir = &cp.full_path;
        let mut memory = Self {
            id: cgroup_id(&cp.path),
            path: cp.path.clone(),
            ..Default::default()
        };

        memory.mem = MemoryData::read(dir, "memory")?;
        memory.memsw = MemoryData::read(dir, "memory.memsw")?;
        memory.kmem = MemoryData::read(dir, "memory.kmem")?;
        memory.kmem_tcp = MemoryData::read(dir, "memory.kmem.tcp")?;

        let stat_path = dir.join("memory.stat");
        if let Some(reader) = fsutil::open_optional_reader(&stat_path)? {
            memory.stats = MemoryStats::from_reader(reader)
                .map_err(|source| Error::parse(&stat_path, source))?;
        }

        Ok(memory)
    }
}
