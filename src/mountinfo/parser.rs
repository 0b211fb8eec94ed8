//! Mountinfo line parser.
//!
//! Parses lines in `/proc/[pid]/mountinfo` format, see
//! [`proc_pid_mountinfo(5)`](https://man7.org/linux/man-pages/man5/proc_pid_mountinfo.5.html).
//! Only the fields needed for cgroup mount discovery are retained: the mount
//! point (field 5 before the ` - ` separator), and the filesystem type and
//! superblock options after it. The variable-length optional fields between
//! the two sections are skipped, which is why the separator must be located
//! first.

/// The subset of a mountinfo line relevant to cgroup discovery.
#[derive(Debug, PartialEq, Eq)]
pub struct MountEntry<'a> {
    /// Mount point relative to the process's root.
    pub mount_point: &'a str,
    /// Filesystem type (e.g. `cgroup`, `cgroup2`, `ext4`).
    pub fs_type: &'a str,
    /// Comma-separated superblock options. For `cgroup` mounts these name
    /// the subsystems attached to the hierarchy.
    pub super_options: &'a str,
}

/// Errors that may occur when parsing a mountinfo line.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing separator ` - ` in line: `{0}`")]
    MissingSeparator(String),

    #[error("missing `{field}` in line: `{line}`")]
    MissingField {
        field: &'static str,
        line: String,
    },
}

/// Parses a single mountinfo line into a [`MountEntry`].
///
/// # Errors
///
/// Returns a [`ParseError`] if the ` - ` separator or any required field is
/// missing.
pub fn parse_mount_entry(line: &str) -> Result<MountEntry<'_>, ParseError> {
    let (pre, post) = line
        .split_once(" - ")
        .ok_or_else(|| ParseError::MissingSeparator(line.to_owned()))?;

    // mount-id parent-id major:minor root mount-point ...
    let mount_point =
        pre.split_whitespace()
            .nth(4)
            .ok_or_else(|| ParseError::MissingField {
                field: "mount_point",
                line: line.to_owned(),
            })?;

    let mut post_fields = post.split_whitespace();
    let fs_type = post_fields
        .next()
        .ok_or_else(|| ParseError::MissingField {
            field: "fs_type",
            line: line.to_owned(),
        })?;
    // the mount source sits between fs_type and the super options
    let super_options = post_fields
        .nth(1)
        .ok_or_else(|| ParseError::MissingField {
            field: "super_options",
            line: line.to_owned(),
        })?;

    Ok(MountEntry {
        mount_point,
        fs_type,
        super_options,
    })
}
