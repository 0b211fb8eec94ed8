//! Reader for the cgroup v1 `blkio` subsystem.
//!
//! Per-device counters come from `blkio.throttle.io_service_bytes` and
//! `blkio.throttle.io_serviced`; per-device limits from the four
//! `blkio.throttle.{read,write}_{bps,iops}_device` files. Entries look like
//!
//! ```text
//! 253:1 Async 1638912
//! 253:1 Total 2385920
//! 8:0 1048576
//! Total 2385920
//! ```
//!
//! i.e. `major:minor [operation] value`, with per-device `Total` rollups and
//! a trailing grand-total line, both of which are recomputed here instead of
//! trusted.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::cgroup::error::{Error, Result};
use crate::cgroup::parse::{self, ParseError};
use crate::cgroup::paths::{ControllerPath, cgroup_id};
use crate::fsutil;

/// `blkio` subsystem accounting.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BlkioSubsystem {
    pub id: String,
    pub path: String,
    /// Per-device counters and limits, keyed by `major:minor`.
    pub devices: BTreeMap<String, DeviceStats>,
    /// Read+write sums across all devices.
    pub total: TotalIo,
}

/// Counters and throttle limits for one block device.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub bytes: OperationValues,
    pub ios: OperationValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_bps_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_bps_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_iops_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_iops_limit: Option<u64>,
}

/// One counter broken down by I/O direction and submission mode.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct OperationValues {
    pub read: u64,
    pub write: u64,
    #[serde(rename = "async")]
    pub asynchronous: u64,
    pub sync: u64,
}

/// Grand totals across devices, read + write only.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TotalIo {
    pub bytes: u64,
    pub ios: u64,
}

/// One data line from a blkio accounting or limit file.
#[derive(Debug, PartialEq, Eq)]
struct BlkioEntry {
    major: u64,
    minor: u64,
    /// Lowercased operation name, empty for limit files.
    operation: String,
    value: u64,
}

impl BlkioEntry {
    fn device_key(&self) -> String {
        format!("{}:{}", self.major, self.minor)
    }
}

/// Parses `major:minor [operation] value`. The kernel capitalizes operation
/// names; they are lowercased here. Returns `Ok(None)` for the grand `Total`
/// line at the end of accounting files.
fn parse_blkio_line(line: &str) -> std::result::Result<Option<BlkioEntry>, ParseError> {
    let malformed = || ParseError::BlkioEntry {
        line: line.to_owned(),
    };

    let mut fields = line.split_whitespace();
    let device = fields.next().ok_or_else(malformed)?;
    if device == "Total" {
        return Ok(None);
    }
    let (major, minor) = device.split_once(':').ok_or_else(malformed)?;
    let major = parse::parse_uint(major).map_err(|_| malformed())?;
    let minor = parse::parse_uint(minor).map_err(|_| malformed())?;

    let (operation, raw) = match (fields.next(), fields.next(), fields.next()) {
        (Some(raw), None, _) => ("", raw),
        (Some(op), Some(raw), None) => (op, raw),
        _ => return Err(malformed()),
    };
    let value = parse::parse_uint(raw).map_err(|_| malformed())?;

    Ok(Some(BlkioEntry {
        major,
        minor,
        operation: operation.to_ascii_lowercase(),
        value,
    }))
}

impl OperationValues {
    fn apply(&mut self, operation: &str, value: u64) {
        // per-device total and discard rollups are ignored
        match operation {
            "read" => self.read = value,
            "write" => self.write = value,
            "async" => self.asynchronous = value,
            "sync" => self.sync = value,
            _ => {}
        }
    }
}

impl BlkioSubsystem {
    pub(crate) fn read(cp: &ControllerPath) -> Result<Self> {
        let dir = &cp.full_path;
        let mut blkio = Self {
            id: cgroup_id(&cp.path),
            path: cp.path.clone(),
            ..Default::default()
        };

        blkio.collect_counters(&dir.join("blkio.throttle.io_service_bytes"), |d| {
            &mut d.bytes
        })?;
        blkio.collect_counters(&dir.join("blkio.throttle.io_serviced"), |d| &mut d.ios)?;

        blkio.collect_limits(&dir.join("blkio.throttle.read_bps_device"), |d, v| {
            d.read_bps_limit = Some(v);
        })?;
        blkio.collect_limits(&dir.join("blkio.throttle.write_bps_device"), |d, v| {
            d.write_bps_limit = Some(v);
        })?;
        blkio.collect_limits(&dir.join("blkio.throttle.read_iops_device"), |d, v| {
            d.read_iops_limit = Some(v);
        })?;
        blkio.collect_limits(&dir.join("blkio.throttle.write_iops_device"), |d, v| {
            d.write_iops_limit = Some(v);
        })?;

        for device in blkio.devices.values() {
            blkio.total.bytes += device.bytes.read + device.bytes.write;
            blkio.total.ios += device.ios.read + device.ios.write;
        }

        Ok(blkio)
    }

    fn collect_counters(
        &mut self,
        path: &Path,
        select: fn(&mut DeviceStats) -> &mut OperationValues,
    ) -> Result<()> {
        let Some(contents) = fsutil::read_optional(path)? else {
            return Ok(());
        };
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(entry) =
                parse_blkio_line(line).map_err(|source| Error::parse(path, source))?
            else {
                continue;
            };
            let device = self.devices.entry(entry.device_key()).or_default();
            select(device).apply(&entry.operation, entry.value);
        }
        Ok(())
    }

    fn collect_limits(&mut self, path: &Path, set: fn(&mut DeviceStats, u64)) -> Result<()> {
        let Some(contents) = fsutil::read_optional(path)? else {
            return Ok(());
        };
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(entry) =
                parse_blkio_line(line).map_err(|source| Error::parse(path, source))?
            else {
                continue;
            };
            let device = self.devices.entry(entry.device_key()).or_default();
            set(device, entry.value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn controller_path(dir: &TempDir) -> ControllerPath {
        ControllerPath {
            path: "/docker/abc123".to_owned(),
            full_path: dir.path().to_path_buf(),
            v2: false,
        }
    }

    #[test]
    fn test_parse_data_line_with_operation() {
        let entry = parse_blkio_line("253:1 Async 1638912").unwrap().unwrap();
        assert_eq!(entry.major, 253);
        assert_eq!(entry.minor, 1);
        assert_eq!(entry.operation, "async");
        assert_eq!(entry.value, 1_638_912);
    }

    #[test]
    fn test_parse_limit_line_without_operation() {
        let entry = parse_blkio_line("1:2 10088").unwrap().unwrap();
        assert_eq!(entry.major, 1);
        assert_eq!(entry.minor, 2);
        assert_eq!(entry.operation, "");
        assert_eq!(entry.value, 10_088);
    }

    #[test]
    fn test_grand_total_line_is_skipped() {
        assert!(parse_blkio_line("Total 2385920").unwrap().is_none());
    }

    #[test]
    fn test_malformed_lines_are_rejected() {
        assert!(parse_blkio_line("253:1").is_err());
        assert!(parse_blkio_line("no-colon Async 5").is_err());
        assert!(parse_blkio_line("253:1 Async not-a-number").is_err());
        assert!(parse_blkio_line("253:1 Async 5 extra").is_err());
    }

    #[test]
    fn test_read_blkio_subsystem() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("blkio.throttle.io_service_bytes"),
            "\
253:1 Read 4608
253:1 Write 1517568
253:1 Sync 4608
253:1 Async 1517568
253:1 Total 1522176
8:0 Read 4608
8:0 Write 1517568
8:0 Sync 4608
8:0 Async 1517568
8:0 Total 1522176
Total 3044352
",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("blkio.throttle.io_serviced"),
            "\
253:1 Read 2
253:1 Write 385
253:1 Sync 2
253:1 Async 385
253:1 Total 387
8:0 Read 2
8:0 Write 385
8:0 Sync 2
8:0 Async 385
8:0 Total 387
Total 774
",
        )
        .unwrap();
        std::fs::write(dir.path().join("blkio.throttle.read_bps_device"), "8:0 1048576\n")
            .unwrap();

        let blkio = BlkioSubsystem::read(&controller_path(&dir)).unwrap();
        assert_eq!(blkio.id, "abc123");
        assert_eq!(blkio.devices.len(), 2);

        let dm = &blkio.devices["253:1"];
        assert_eq!(dm.bytes.read, 4608);
        assert_eq!(dm.bytes.write, 1_517_568);
        assert_eq!(dm.bytes.asynchronous, 1_517_568);
        assert_eq!(dm.ios.write, 385);
        assert_eq!(dm.read_bps_limit, None);

        let sda = &blkio.devices["8:0"];
        assert_eq!(sda.read_bps_limit, Some(1_048_576));

        // totals are read+write sums, never the kernel Total lines
        assert_eq!(blkio.total.bytes, 2 * (4608 + 1_517_568));
        assert_eq!(blkio.total.ios, 2 * (2 + 385));
    }

    #[test]
    fn test_missing_files_yield_empty_subsystem() {
        let dir = TempDir::new().unwrap();
        let blkio = BlkioSubsystem::read(&controller_path(&dir)).unwrap();
        assert!(blkio.devices.is_empty());
        assert_eq!(blkio.total, TotalIo::default());
    }
}
