use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Error that occurs when opening or reading a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to open file `{path}`: {source}")]
pub struct FileOpenError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Opens a file at the given path and wraps it in a [`BufReader`].
///
/// # Errors
///
/// Returns a [`FileOpenError`] if the file cannot be opened.
pub fn open_file_reader(path: impl AsRef<Path>) -> Result<BufReader<File>, FileOpenError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FileOpenError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Opens a file that may legitimately be absent.
///
/// Returns `Ok(None)` if the file does not exist. Kernel accounting files
/// are missing when the corresponding feature is not compiled in or not
/// enabled, which callers must treat as "no data" rather than a failure.
///
/// # Errors
///
/// Returns a [`FileOpenError`] for any open failure other than `NotFound`.
pub fn open_optional_reader(
    path: impl AsRef<Path>,
) -> Result<Option<BufReader<File>>, FileOpenError> {
    let path = path.as_ref();
    match File::open(path) {
        Ok(file) => Ok(Some(BufReader::new(file))),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(FileOpenError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Reads a file to a string, mapping a missing file to `Ok(None)`.
///
/// # Errors
///
/// Returns a [`FileOpenError`] for any failure other than `NotFound`.
pub fn read_optional(path: impl AsRef<Path>) -> Result<Option<String>, FileOpenError> {
    let path = path.as_ref();
    let mut reader = match open_optional_reader(path)? {
        Some(reader) => reader,
        None => return Ok(None),
    };
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .map_err(|source| FileOpenError {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Some(contents))
}
