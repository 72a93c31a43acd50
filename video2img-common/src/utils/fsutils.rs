use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Clears the directory at path, or creates it
pub fn clear_dir(dir: impl AsRef<Path>) -> io::Result<()> {
    let dir = dir.as_ref();
    match fs::symlink_metadata(dir) {
        Ok(meta) if meta.is_dir() => {
            // TODO: permissions and owner are not preserved when doing it like this. List
            // all entries and remove them one by one instead.
            fs::remove_dir_all(dir)?;
            fs::create_dir(dir)
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "dir is not a dir",
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir(dir),
        Err(e) => Err(e),
    }
}

/// Creates the directory unless it already exists. Someone else creating it at the same
/// time is fine.
pub fn ensure_dir(dir: impl AsRef<Path>) -> io::Result<()> {
    let dir = dir.as_ref();
    match fs::create_dir(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if fs::metadata(dir)?.is_dir() {
                Ok(())
            } else {
                Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "exists but is not a dir",
                ))
            }
        }
        Err(e) => Err(e),
    }
}

/// Collects all regular files directly inside `dir`, does not walk it recursively.
pub fn files_in<R>(dir: impl AsRef<Path>) -> io::Result<R>
where
    R: FromIterator<PathBuf>,
{
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        // NOTE: follows symlinks, dangling ones are skipped
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => files.push(path),
            Ok(_) => (),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (),
            Err(e) => return Err(e),
        }
    }
    Ok(files.into_iter().collect())
}

/// Try to read the file, return None if it doesn't exist
pub fn read_optional_file(path: impl AsRef<Path>) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
        Ok(s) => Ok(Some(s)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clear_dir_removes_everything() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("dir");
        fs::create_dir(&dir)?;
        fs::write(dir.join("file"), "hej")?;
        fs::create_dir(dir.join("sub"))?;

        clear_dir(&dir)?;

        assert!(dir.is_dir());
        assert!(fs::read_dir(&dir)?.next().is_none());
        Ok(())
    }

    #[test]
    fn clear_dir_creates() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("new");
        clear_dir(&dir)?;
        assert!(dir.is_dir());
        Ok(())
    }

    #[test]
    fn clear_dir_refuses_files() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = tmp.path().join("file");
        fs::write(&file, "hej")?;
        assert!(clear_dir(&file).is_err());
        assert!(file.is_file());
        Ok(())
    }

    #[test]
    fn ensure_dir_twice() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("dir");
        ensure_dir(&dir)?;
        fs::write(dir.join("file"), "hej")?;
        ensure_dir(&dir)?;
        assert!(dir.join("file").is_file());
        Ok(())
    }

    #[test]
    fn ensure_dir_racing() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("unit");
        let barrier = std::sync::Barrier::new(8);

        let results: Vec<io::Result<()>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        ensure_dir(&dir)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("did not panic"))
                .collect()
        });

        for res in results {
            res?;
        }
        assert!(dir.is_dir());
        Ok(())
    }

    #[test]
    fn ensure_dir_on_a_file() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = tmp.path().join("file");
        fs::write(&file, "hej")?;
        assert!(ensure_dir(&file).is_err());
        Ok(())
    }

    #[test]
    fn optional_file() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = tmp.path().join("file");
        assert_eq!(None, read_optional_file(&file)?);
        fs::write(&file, "-j 2")?;
        assert_eq!(Some("-j 2".to_string()), read_optional_file(&file)?);
        Ok(())
    }

    #[test]
    fn files_in_skips_dirs() -> io::Result<()> {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join("a"), "")?;
        fs::create_dir(tmp.path().join("sub"))?;
        fs::write(tmp.path().join("sub").join("b"), "")?;

        let files: Vec<PathBuf> = files_in(tmp.path())?;
        assert_eq!(vec![tmp.path().join("a")], files);
        Ok(())
    }
}
