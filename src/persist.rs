use crate::error::{Result, RetrievalError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Bytes written and synced to a temp file next to their destination, not yet visible there.
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    /// Rename the temp file over the destination.
    pub fn persist(self) -> Result<()> {
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| RetrievalError::io(&target, e.error))?;
        sync_parent(&target);
        Ok(())
    }
}

/// Flush the rename itself. Best effort: directories cannot be opened for sync everywhere.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Stage `bytes` for `path`. The directory is created if absent. Dropping the
/// returned handle without calling `persist` removes the temp file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<StagedFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| RetrievalError::io(&dir, e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| RetrievalError::io(&dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| RetrievalError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| RetrievalError::io(tmp.path(), e))?;

    Ok(StagedFile {
        tmp,
        target: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_is_visible_until_persist() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("out.bin");

        let staged = write_atomic(&target, b"payload").unwrap();
        assert!(!target.exists());
        staged.persist().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"payload");
    }

    #[test]
    fn dropped_stage_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        drop(write_atomic(&target, b"payload").unwrap());
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn persist_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        fs::write(&target, b"old").unwrap();
        write_atomic(&target, b"new").unwrap().persist().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }
}
