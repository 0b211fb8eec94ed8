use std::io;
use std::path::PathBuf;

use crate::{fsutil, mountinfo};

use super::parse::ParseError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Mounts(#[from] mountinfo::Error),

    #[error(transparent)]
    FileOpen(#[from] fsutil::FileOpenError),

    #[error("failed to read `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}

impl Error {
    /// True when the host has no cgroup support at all (`/proc/cgroups` is
    /// absent). Callers use this to disable cgroup collection gracefully
    /// instead of treating the condition as fatal.
    pub fn is_cgroups_unsupported(&self) -> bool {
        matches!(
            self,
            Error::Mounts(mountinfo::Error::CgroupsUnsupported { .. })
        )
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, source: ParseError) -> Self {
        Error::Parse {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
