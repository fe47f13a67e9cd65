use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use stash_core::{RawBackend, Result, StashError};
use tracing::instrument;

use crate::atomic_file::{read_optional, remove_if_present, with_exclusive_lock, write_atomic};

type Entries = IndexMap<String, String>;

/// Durable backend keeping every entry in a single JSON object on disk.
///
/// Mutations hold an OS lock on `<path>.lock` for the whole read-modify-write,
/// so separate handles and processes on the same file never drop each other's
/// keys. Files are replaced atomically; reads take no lock. A missing file is an
/// empty backend.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, mutate: impl FnOnce(&mut Entries)) -> Result<()> {
        with_exclusive_lock(&self.path, || {
            let mut entries = read_entries(&self.path)?;
            mutate(&mut entries);
            let json = serde_json::to_vec(&entries).map_err(StashError::backend)?;
            write_atomic(&self.path, &json)
        })
    }

    fn snapshot(&self) -> Result<Entries> {
        read_entries(&self.path)
    }
}

impl RawBackend for FileBackend {
    #[instrument(skip_all, fields(key = %key))]
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.snapshot()?.get(key).cloned())
    }

    #[instrument(skip_all, fields(key = %key))]
    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    #[instrument(skip_all, fields(key = %key))]
    fn remove_item(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.shift_remove(key);
        })
    }

    #[instrument(skip_all)]
    fn clear(&self) -> Result<()> {
        with_exclusive_lock(&self.path, || remove_if_present(&self.path))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.snapshot()?.len())
    }

    fn key(&self, index: usize) -> Result<Option<String>> {
        Ok(self
            .snapshot()?
            .get_index(index)
            .map(|(key, _)| key.clone()))
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.snapshot()?.into_keys().collect())
    }
}

fn read_entries(path: &Path) -> Result<Entries> {
    let Some(buf) = read_optional(path)? else {
        return Ok(Entries::new());
    };
    if buf.iter().all(u8::is_ascii_whitespace) {
        return Ok(Entries::new());
    }
    serde_json::from_slice(&buf)
        .map_err(|e| StashError::backend(format!("{}: {e}", path.display())))
}
