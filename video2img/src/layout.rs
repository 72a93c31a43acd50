//! The output tree: `base/YYYYMMDD/<source file stem>/`.

use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use video2img_common::utils::fsutils::{clear_dir, ensure_dir};

#[derive(thiserror::Error, Debug)]
#[error("failed to prepare the output directory {path:?}")]
pub struct LayoutError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl LayoutError {
    fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

pub fn batch_root_name(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Prepares the batch root for today, in local time. See [`prepare_batch_root_at`].
pub fn prepare_batch_root(base: impl AsRef<Path>) -> Result<PathBuf, LayoutError> {
    prepare_batch_root_at(base, chrono::Local::now().date_naive())
}

/// Creates `base` if needed, and then an empty `base/YYYYMMDD`. NOTE: anything already
/// in that dated directory, like the output of an earlier run the same day, is deleted.
pub fn prepare_batch_root_at(
    base: impl AsRef<Path>,
    date: NaiveDate,
) -> Result<PathBuf, LayoutError> {
    let base = base.as_ref();
    std::fs::create_dir_all(base).map_err(|e| LayoutError::new(base, e))?;

    let root = base.join(batch_root_name(date));
    clear_dir(&root).map_err(|e| LayoutError::new(&root, e))?;
    Ok(root)
}

/// The name of the output unit of a source file, i.e., its file name without the
/// extension.
pub fn unit_name(source: &Path) -> Option<&OsStr> {
    source.file_stem()
}

/// Creates the output unit for `source` inside `batch_root`, unless it already exists.
pub fn prepare_unit_dir(
    batch_root: impl AsRef<Path>,
    source: impl AsRef<Path>,
) -> Result<PathBuf, LayoutError> {
    let source = source.as_ref();
    let unit = batch_root.as_ref().join(unit_name(source).ok_or_else(|| {
        LayoutError::new(
            source,
            io::Error::new(io::ErrorKind::InvalidInput, "the source has no file name"),
        )
    })?);
    ensure_dir(&unit).map_err(|e| LayoutError::new(&unit, e))?;
    Ok(unit)
}
