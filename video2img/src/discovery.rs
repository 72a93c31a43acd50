use std::{
    io,
    path::{Path, PathBuf},
};

use video2img_common::utils::{fsutils::files_in, natsort::natural_cmp_paths};

#[derive(thiserror::Error, Debug)]
#[error("failed to list the input directory {dir:?}")]
pub struct DiscoveryError {
    pub dir: PathBuf,
    #[source]
    pub source: io::Error,
}

/// All files directly in `input_dir` with one of `extensions`, compared case
/// sensitively, in natural order. Finding nothing is fine.
pub fn discover(
    input_dir: impl AsRef<Path>,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let input_dir = input_dir.as_ref();
    let files: Vec<PathBuf> = files_in(input_dir).map_err(|source| DiscoveryError {
        dir: input_dir.to_path_buf(),
        source,
    })?;

    let mut targets: Vec<PathBuf> = files
        .into_iter()
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.contains(&ext))
        })
        .collect();
    targets.sort_by(|a, b| natural_cmp_paths(a, b));

    log::debug!("Found {} target files in {:?}", targets.len(), input_dir);
    Ok(targets)
}
