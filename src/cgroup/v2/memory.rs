//! Reader for the cgroup v2 `memory` controller.
//!
//! Two accounting families share one file layout: plain memory (`memory.*`)
//! and swap (`memory.swap.*`). Limit files (`.high`, `.max`) hold either a
//! byte count or the literal `max`, modelled as [`MemLimit`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use serde::{Serialize, Serializer};

use crate::cgroup::error::{Error, Result};
use crate::cgroup::parse::{self, KeyValueTable, ParseError};
use crate::cgroup::paths::{ControllerPath, cgroup_id};
use crate::fsutil;

/// `memory` controller accounting.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MemorySubsystem {
    pub id: String,
    pub path: String,
    /// Plain memory accounting (`memory.*`).
    pub mem: MemoryData,
    /// Swap accounting (`memory.swap.*`).
    pub swap: MemoryData,
    pub stats: MemoryStats,
}

/// A limit file value: either a byte count or the `max` sentinel meaning
/// unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemLimit {
    Max,
    Bytes(u64),
}

impl Serialize for MemLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Max => serializer.serialize_str("max"),
            Self::Bytes(bytes) => serializer.serialize_u64(*bytes),
        }
    }
}

impl MemLimit {
    fn parse(raw: &str) -> std::result::Result<Self, ParseError> {
        let trimmed = raw.trim();
        if trimmed == "max" {
            return Ok(Self::Max);
        }
        Ok(Self::Bytes(parse::parse_uint(trimmed)?))
    }

    fn read(path: &Path) -> Result<Option<Self>> {
        match fsutil::read_optional(path)? {
            Some(contents) => {
                let limit =
                    Self::parse(&contents).map_err(|source| Error::parse(path, source))?;
                Ok(Some(limit))
            }
            None => Ok(None),
        }
    }
}

/// One accounting family: current usage, protections, limits and events.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<MemLimit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<MemLimit>,
    pub events: MemoryEvents,
}

impl MemoryData {
    fn read(dir: &Path, prefix: &str) -> Result<Self> {
        let mut data = Self {
            current_bytes: parse::read_uint_file(&dir.join(format!("{prefix}.current")))?,
            low_bytes: parse::read_uint_file(&dir.join(format!("{prefix}.low")))?,
            high: MemLimit::read(&dir.join(format!("{prefix}.high")))?,
            max: MemLimit::read(&dir.join(format!("{prefix}.max")))?,
            ..Default::default()
        };

        let events_path = dir.join(format!("{prefix}.events"));
        if let Some(reader) = fsutil::open_optional_reader(&events_path)? {
            data.events = MemoryEvents::from_reader(reader)
                .map_err(|source| Error::parse(&events_path, source))?;
        }

        Ok(data)
    }
}

/// Counters from `memory.events` / `memory.swap.events`. `fail` only exists
/// for swap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryEvents {
    pub low: u64,
    pub high: u64,
    pub max: u64,
    pub oom: u64,
    pub oom_kill: u64,
    pub fail: u64,
}

type EventSetter = fn(&mut MemoryEvents, u64);

static EVENT_SETTERS: LazyLock<HashMap<&'static str, EventSetter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, EventSetter> = HashMap::with_capacity(6);

    m.insert("low", |s, v| s.low = v);
    m.insert("high", |s, v| s.high = v);
    m.insert("max", |s, v| s.max = v);
    m.insert("oom", |s, v| s.oom = v);
    m.insert("oom_kill", |s, v| s.oom_kill = v);
    m.insert("fail", |s, v| s.fail = v);

    m
});

impl KeyValueTable for MemoryEvents {
    fn setters() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &EVENT_SETTERS
    }
}

/// Breakdown from `memory.stat`. Unrecognized keys are ignored.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub anon: u64,
    pub file: u64,
    pub kernel_stack: u64,
    pub pagetables: u64,
    pub percpu: u64,
    pub sock: u64,
    pub shmem: u64,
    pub file_mapped: u64,
    pub file_dirty: u64,
    pub file_writeback: u64,
    pub swapcached: u64,
    pub anon_thp: u64,
    pub file_thp: u64,
    pub shmem_thp: u64,
    pub inactive_anon: u64,
    pub active_anon: u64,
    pub inactive_file: u64,
    pub active_file: u64,
    pub unevictable: u64,
    pub slab_reclaimable: u64,
    pub slab_unreclaimable: u64,
    pub slab: u64,
    pub workingset_refault_anon: u64,
    pub workingset_refault_file: u64,
    pub workingset_activate_anon: u64,
    pub workingset_activate_file: u64,
    pub workingset_restore_anon: u64,
    pub workingset_restore_file: u64,
    pub workingset_nodereclaim: u64,
    pub page_faults: u64,
    pub major_page_faults: u64,
    pub pgrefill: u64,
    pub pgscan: u64,
    pub pgsteal: u64,
    pub pgactivate: u64,
    pub pgdeactivate: u64,
    pub pglazyfree: u64,
    pub pglazyfreed: u64,
    pub thp_fault_alloc: u64,
    pub thp_collapse_alloc: u64,
}

type StatSetter = fn(&mut MemoryStats, u64);

static STAT_SETTERS: LazyLock<HashMap<&'static str, StatSetter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, StatSetter> = HashMap::with_capacity(40);

    m.insert("anon", (|s, v| s.anon = v) as StatSetter);
    m.insert("file", |s, v| s.file = v);
    m.insert("kernel_stack", |s, v| s.kernel_stack = v);
    m.insert("pagetables", |s, v| s.pagetables = v);
    m.insert("percpu", |s, v| s.percpu = v);
    m.insert("sock", |s, v| s.sock = v);
    m.insert("shmem", |s, v| s.shmem = v);
    m.insert("file_mapped", |s, v| s.file_mapped = v);
    m.insert("file_dirty", |s, v| s.file_dirty = v);
    m.insert("file_writeback", |s, v| s.file_writeback = v);
    m.insert("swapcached", |s, v| s.swapcached = v);
    m.insert("anon_thp", |s, v| s.anon_thp = v);
    m.insert("file_thp", |s, v| s.file_thp = v);
    m.insert("shmem_thp", |s, v| s.shmem_thp = v);
    m.insert("inactive_anon", |s, v| s.inactive_anon = v);
    m.insert("active_anon", |s, v| s.active_anon = v);
    m.insert("inactive_file", |s, v| s.inactive_file = v);
    m.insert("active_file", |s, v| s.active_file = v);
    m.insert("unevictable", |s, v| s.unevictable = v);
    m.insert("slab_reclaimable", |s, v| s.slab_reclaimable = v);
    m.insert("slab_unreclaimable", |s, v| s.slab_unreclaimable = v);
    m.insert("slab", |s, v| s.slab = v);
    m.insert("workingset_refault_anon", |s, v| {
        s.workingset_refault_anon = v
    });
    m.insert("workingset_refault_file", |s, v| {
        s.workingset_refault_file = v
    });
    m.insert("workingset_activate_anon", |s, v| {
        s.workingset_activate_anon = v
    });
    m.insert("workingset_activate_file", |s, v| {
        s.workingset_activate_file = v
    });
    m.insert("workingset_restore_anon", |s, v| {
        s.workingset_restore_anon = v
    });
    m.insert("workingset_restore_file", |s, v| {
        s.workingset_restore_file = v
    });
    m.insert("workingset_nodereclaim", |s, v| {
        s.workingset_nodereclaim = v
    });
    m.insert("pgfault", |s, v| s.page_faults = v);
    m.insert("pgmajfault", |s, v| s.major_page_faults = v);
    m.insert("pgrefill", |s, v| s.pgrefill = v);
    m.insert("pgscan", |s, v| s.pgscan = v);
    m.insert("pgsteal", |s, v| s.pgsteal = v);
    m.insert("pgactivate", |s, v| s.pgactivate = v);
    m.insert("pgdeactivate", |s, v| s.pgdeactivate = v);
    m.insert("pglazyfree", |s, v| s.pglazyfree = v);
    m.insert("pglazyfreed", |s, v| s.pglazyfreed = v);
    m.insert("thp_fault_alloc", |s, v| s.thp_fault_alloc = v);
    m.insert("thp_collapse_alloc", |s, v| s.thp_collapse_alloc = v);

    m
});

impl KeyValueTable for MemoryStats {
    fn setters() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &STAT_SETTERS
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
        memory.swap = MemoryData::read(dir, "memory.swap")?;

        let stat_path = dir.join("memory.stat");
        if let Some(reader) = fsutil::open_optional_reader(&stat_path)? {
            memory.stats = MemoryStats::from_reader(reader)
                .map_err(|source| Error::parse(&stat_path, source))?;
        }

        Ok(memory)
    }
}
