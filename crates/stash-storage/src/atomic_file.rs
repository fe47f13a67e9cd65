use std::{
    ffi::OsString,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use fd_lock::RwLock;
use stash_core::{Result, StashError};
use tempfile::NamedTempFile;

/// Runs `f` while holding an exclusive OS lock on `<path>.lock`.
///
/// The lock is advisory and shared by every handle and process that goes
/// through this function for the same `path`.
pub fn with_exclusive_lock<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    fs::create_dir_all(parent_dir(path)).map_err(StashError::backend)?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(path))
        .map_err(StashError::backend)?;
    let mut lock = RwLock::new(file);
    let _held = lock.write().map_err(StashError::backend)?;
    f()
}

/// Contents of `path`, or `None` when it does not exist.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StashError::backend(err)),
    }
}

/// Replaces `path` with `bytes` via a temp file in the same directory, so
/// readers see either the old or the new contents.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent).map_err(StashError::backend)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(StashError::backend)?;
    tmp.write_all(bytes).map_err(StashError::backend)?;
    tmp.as_file().sync_all().map_err(StashError::backend)?;
    tmp.persist(path).map_err(|e| StashError::backend(e.error))?;
    Ok(())
}

/// Deletes `path`; a missing file is fine.
pub fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StashError::backend(err)),
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use super::*;

    #[test]
    fn write_atomic_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a").join("b.txt");

        write_atomic(&path, b"first").expect("first write");
        write_atomic(&path, b"second").expect("second write");
        assert_eq!(
            read_optional(&path).expect("read").as_deref(),
            Some(&b"second"[..])
        );

        remove_if_present(&path).expect("remove");
        remove_if_present(&path).expect("remove again");
        assert_eq!(read_optional(&path).expect("read"), None);
    }

    #[test]
    fn lock_file_sits_next_to_the_target() {
        assert_eq!(
            lock_path(Path::new("/tmp/stash/durable.json")),
            PathBuf::from("/tmp/stash/durable.json.lock")
        );
        assert_eq!(parent_dir(Path::new("durable.json")), Path::new("."));
    }

    #[test]
    fn exclusive_lock_serializes_critical_sections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("counter");
        let inside = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        with_exclusive_lock(&path, || {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            let current = read_optional(&path)?
                                .map(|b| String::from_utf8_lossy(&b).parse::<u32>().unwrap_or(0))
                                .unwrap_or(0);
                            write_atomic(&path, (current + 1).to_string().as_bytes())?;
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .expect("locked update");
                    }
                });
            }
        });

        let total = read_optional(&path).expect("read").expect("present");
        assert_eq!(String::from_utf8_lossy(&total), "80");
    }
}
