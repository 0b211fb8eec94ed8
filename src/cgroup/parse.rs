//! Common parsing utilities shared by all controller readers.
//!
//! Three kernel file shapes recur across cgroup controllers:
//!
//! - single unsigned values, where `-1` means "unlimited" (quota and limit
//!   files) and a missing file means the feature is not compiled in;
//! - `<key> <value>` tables (`cpu.stat`, `memory.stat`, ...), parsed here
//!   through the [`KeyValueTable`] trait with a static key-to-setter map per
//!   implementing struct;
//! - Pressure Stall Information (`*.pressure`) files, one line per stall
//!   class (`some`/`full`) with `avg10`/`avg60`/`avg300`/`total` fields.
//!
//! File-level helpers map a missing file to `Ok(None)` so callers can leave
//! the corresponding fields absent; malformed content is always a hard
//! error.

use std::collections::HashMap;
use std::io::BufRead;
use std::num::ParseIntError;
use std::path::Path;

use serde::Serialize;

use crate::fsutil;

use super::error::{Error, Result};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid unsigned value `{value}`: {source}")]
    InvalidUint {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("expected `<key> <value>` pair, got `{line}`")]
    KeyValueFormat { line: String },

    #[error("invalid value for `{key}`: `{value}`")]
    InvalidKeyValue { key: String, value: String },

    #[error("unparseable pressure line `{line}`")]
    Pressure { line: String },

    #[error("malformed block I/O entry `{line}`")]
    BlkioEntry { line: String },

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses a trimmed string as an unsigned 64-bit integer.
///
/// Negative values parse to `0`: the kernel reports `-1` in quota and limit
/// files to mean "unlimited", which downstream code represents as zero or
/// absent rather than a huge sentinel.
pub fn parse_uint(raw: &str) -> std::result::Result<u64, ParseError> {
    let trimmed = raw.trim();
    match trimmed.parse::<u64>() {
        Ok(value) => Ok(value),
        Err(source) => match trimmed.parse::<i64>() {
            Ok(value) if value < 0 => Ok(0),
            _ => Err(ParseError::InvalidUint {
                value: trimmed.to_owned(),
                source,
            }),
        },
    }
}

/// Reads a single-value accounting file.
///
/// Returns `Ok(None)` when the file does not exist (feature not compiled
/// in). Negative content parses to `Some(0)`, see [`parse_uint`].
pub fn read_uint_file(path: &Path) -> Result<Option<u64>> {
    match fsutil::read_optional(path)? {
        Some(contents) => {
            let value = parse_uint(&contents).map_err(|source| Error::parse(path, source))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Splits a `"<key> <value>"` line. Exactly two whitespace-separated fields
/// are required.
pub fn parse_key_value(line: &str) -> std::result::Result<(&str, u64), ParseError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(key), Some(raw), None) => {
            let value = parse_uint(raw).map_err(|_| ParseError::InvalidKeyValue {
                key: key.to_owned(),
                value: raw.to_owned(),
            })?;
            Ok((key, value))
        }
        _ => Err(ParseError::KeyValueFormat {
            line: line.to_owned(),
        }),
    }
}

/// A struct populated from a `<key> <value>` table file.
///
/// Implementors provide a static map from kernel keys to field setters;
/// unknown keys are ignored so newer kernels do not break parsing.
pub trait KeyValueTable: Default
where
    Self: 'static,
{
    /// Static table mapping kernel keys to field setters.
    fn setters() -> &'static HashMap<&'static str, fn(&mut Self, u64)>;

    /// Parses `<key> <value>` lines from the reader, applying known keys via
    /// the setter table.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] on malformed lines or unparseable values.
    fn from_reader<R: BufRead>(reader: R) -> std::result::Result<Self, ParseError> {
        let mut table = Self::default();
        let setters = Self::setters();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let (key, value) = parse_key_value(trimmed)?;
            if let Some(set) = setters.get(key) {
                set(&mut table, value);
            }
        }
        Ok(table)
    }
}

/// Stall percentages and total stall time for one PSI class.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct StallMetrics {
    /// Ten-second average, percent.
    pub ten: f64,
    /// Sixty-second average, percent.
    pub sixty: f64,
    /// Three-hundred-second average, percent.
    pub three_hundred: f64,
    /// Total stall time in microseconds.
    pub total: u64,
}

/// Pressure Stall Information for one resource.
///
/// CPU pressure exposes only the `some` class; I/O and memory expose both
/// `some` and `full`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct Pressure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub some: Option<StallMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full: Option<StallMetrics>,
}

/// Parses a PSI file, one line per stall class:
///
/// ```text
/// some avg10=3.00 avg60=2.10 avg300=4.00 total=1154482
/// ```
pub fn parse_pressure<R: BufRead>(reader: R) -> std::result::Result<Pressure, ParseError> {
    let mut pressure = Pressure::default();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let (class, metrics) = parse_pressure_line(trimmed)?;
        match class {
            "some" => pressure.some = Some(metrics),
            "full" => pressure.full = Some(metrics),
            _ => {}
        }
    }
    Ok(pressure)
}

/// Reads a `*.pressure` file; a missing file is the normal "no pressure
/// data on this platform" condition and returns `Ok(None)`.
pub fn read_pressure_file(path: &Path) -> Result<Option<Pressure>> {
    match fsutil::open_optional_reader(path)? {
        Some(reader) => {
            let pressure =
                parse_pressure(reader).map_err(|source| Error::parse(path, source))?;
            Ok(Some(pressure))
        }
        None => Ok(None),
    }
}

/// Parses one PSI line. Five fields are scanned (the class plus four
/// metrics); at least three must match or the line is rejected.
fn parse_pressure_line(line: &str) -> std::result::Result<(&str, StallMetrics), ParseError> {
    let mut parts = line.split_whitespace();
    let class = parts.next().ok_or_else(|| ParseError::Pressure {
        line: line.to_owned(),
    })?;

    let mut metrics = StallMetrics::default();
    let mut matched = 1;
    for part in parts {
        let Some((key, raw)) = part.split_once('=') else {
            continue;
        };
        match key {
            "avg10" => {
                if let Ok(value) = raw.parse() {
                    metrics.ten = value;
                    matched += 1;
                }
            }
            "avg60" => {
                if let Ok(value) = raw.parse() {
                    metrics.sixty = value;
                    matched += 1;
                }
            }
            "avg300" => {
                if let Ok(value) = raw.parse() {
                    metrics.three_hundred = value;
                    matched += 1;
                }
            }
            "total" => {
                if let Ok(value) = raw.parse() {
                    metrics.total = value;
                    matched += 1;
                }
            }
            _ => {}
        }
    }

    if matched < 3 {
        return Err(ParseError::Pressure {
            line: line.to_owned(),
        });
    }
    Ok((class, metrics))
}
