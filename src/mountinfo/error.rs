use std::path::PathBuf;

use crate::fsutil;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `/proc/cgroups` does not exist: the kernel has no cgroup support at
    /// all. Callers should disable cgroup collection rather than report a
    /// per-call failure.
    #[error("cgroups are not supported on this host (missing `{path}`)")]
    CgroupsUnsupported { path: PathBuf },

    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),

    #[error("failed to read line from `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed subsystem line in `{path}`: `{line}`")]
    MalformedSubsystem { path: PathBuf, line: String },

    #[error("failed to parse line in `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: super::parser::ParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
