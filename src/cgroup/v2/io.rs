//! Reader for the cgroup v2 `io` controller.
//!
//! `io.stat` holds one line per block device:
//!
//! ```text
//! 253:1 rbytes=4608 wbytes=1517568 rios=2 wios=385 dbytes=0 dios=0
//! ```
//!
//! Devices are keyed by name when the `major:minor` pair can be matched
//! against the device index, otherwise by the literal `major:minor`.

use std::collections::{BTreeMap, HashMap};
use std::io::BufRead;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

use serde::Serialize;

use crate::cgroup::error::{Error, Result};
use crate::cgroup::parse::{self, ParseError, Pressure};
use crate::cgroup::paths::{ControllerPath, cgroup_id};
use crate::fsutil;

/// `io` controller accounting.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct IoSubsystem {
    pub id: String,
    pub path: String,
    /// Per-device counters, keyed by device name or `major:minor`.
    pub stats: BTreeMap<String, IoDeviceStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<Pressure>,
}

/// Counters for one device from `io.stat`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IoDeviceStats {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ios: u64,
    pub write_ios: u64,
    pub discard_bytes: u64,
    pub discard_ios: u64,
}

/// Device-number-to-name index built from one scan of `/dev`.
///
/// Built once per [`crate::cgroup::Reader`] rather than walked on every
/// `io.stat` read. The scan descends one directory level, so nodes like
/// `/dev/mapper/vg-root` resolve to `mapper/vg-root`; anything nested
/// deeper falls back to the `major:minor` key.
#[derive(Debug, Default)]
pub struct DeviceIndex {
    names: HashMap<u64, String>,
}

impl DeviceIndex {
    /// Scans `dev_dir` and its immediate subdirectories for block and
    /// character device nodes. A missing directory yields an empty index.
    pub fn new(dev_dir: &Path) -> Result<Self> {
        let mut names = HashMap::new();
        Self::scan(dev_dir, None, &mut names)?;
        Ok(Self { names })
    }

    fn scan(dir: &Path, prefix: Option<&str>, names: &mut HashMap<u64, String>) -> Result<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(Error::io(dir, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|err| Error::io(dir, err))?;
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if file_type.is_dir() {
                if prefix.is_none() {
                    Self::scan(&entry.path(), Some(&name), names)?;
                }
                continue;
            }
            if !file_type.is_block_device() && !file_type.is_char_device() {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let name = match prefix {
                Some(prefix) => format!("{prefix}/{name}"),
                None => name,
            };
            names.entry(metadata.rdev()).or_insert(name);
        }
        Ok(())
    }

    fn resolve(&self, major: u64, minor: u64) -> Option<&str> {
        self.names.get(&mkdev(major, minor)).map(String::as_str)
    }
}

/// Packs a major/minor pair the way glibc `makedev` lays out `st_rdev`.
fn mkdev(major: u64, minor: u64) -> u64 {
    ((major & 0xfff) << 8)
        | (minor & 0xff)
        | ((major & !0xfff) << 32)
        | ((minor & !0xff) << 12)
}

/// Parses one `io.stat` line into a device pair and its counters. Unknown
/// `key=value` fields are ignored.
fn parse_io_line(line: &str) -> std::result::Result<(u64, u64, IoDeviceStats), ParseError> {
    let malformed = || ParseError::BlkioEntry {
        line: line.to_owned(),
    };

    let mut fields = line.split_whitespace();
    let device = fields.next().ok_or_else(malformed)?;
    let (major, minor) = device.split_once(':').ok_or_else(malformed)?;
    let major = parse::parse_uint(major).map_err(|_| malformed())?;
    let minor = parse::parse_uint(minor).map_err(|_| malformed())?;

    let mut stats = IoDeviceStats::default();
    for field in fields {
        let (key, raw) = field.split_once('=').ok_or_else(malformed)?;
        let value = parse::parse_uint(raw).map_err(|_| malformed())?;
        match key {
            "rbytes" => stats.read_bytes = value,
            "wbytes" => stats.write_bytes = value,
            "rios" => stats.read_ios = value,
            "wios" => stats.write_ios = value,
            "dbytes" => stats.discard_bytes = value,
            "dios" => stats.discard_ios = value,
            _ => {}
        }
    }

    Ok((major, minor, stats))
}

impl IoSubsystem {
    pub(crate) fn read(cp: &ControllerPath, devices: Option<&DeviceIndex>) -> Result<Self> {
        let dir = &cp.full_path;
        let mut io = Self {
            id: cgroup_id(&cp.path),
            path: cp.path.clone(),
            ..Default::default()
        };

        let stat_path = dir.join("io.stat");
        if let Some(reader) = fsutil::open_optional_reader(&stat_path)? {
            for line in reader.lines() {
                let line = line.map_err(|err| Error::io(&stat_path, err))?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let (major, minor, stats) =
                    parse_io_line(trimmed).map_err(|source| Error::parse(&stat_path, source))?;
                let key = devices
                    .and_then(|index| index.resolve(major, minor))
                    .map_or_else(|| format!("{major}:{minor}"), str::to_owned);
                io.stats.insert(key, stats);
            }
        }

        io.pressure = parse::read_pressure_file(&dir.join("io.pressure"))?;

        Ok(io)
    }
}
