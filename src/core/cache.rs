//! Memo of content identifiers keyed by file stat info.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use crate::domain::ContentId;

/// The stat fields a cached identifier is valid for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub size: u64,
    pub modified: SystemTime,
}

impl FileStamp {
    /// Stat `path`
    pub fn read(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            size: meta.len(),
            modified: meta.modified()?,
        })
    }
}

/// Cached identifiers by canonical path
#[derive(Debug, Default)]
pub struct IdCache {
    entries: Mutex<HashMap<PathBuf, (FileStamp, ContentId)>>,
}

impl IdCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PathBuf, (FileStamp, ContentId)>> {
        // The map holds no invariants a panicking writer could break
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached identifier for `path`, only if it was stored under `stamp`.
    /// A stale entry is dropped.
    pub fn lookup(&self, path: &Path, stamp: &FileStamp) -> Option<ContentId> {
        let mut entries = self.entries();
        match entries.get(path) {
            Some((cached, id)) if cached == stamp => Some(id.clone()),
            Some(_) => {
                entries.remove(path);
                None
            }
            None => None,
        }
    }

    /// Remember `id` for `path` as of `stamp`
    pub fn store(&self, path: PathBuf, stamp: FileStamp, id: ContentId) {
        self.entries().insert(path, (stamp, id));
    }

    /// Forget `path`; returns whether an entry existed
    pub fn invalidate(&self, path: &Path) -> bool {
        self.entries().remove(path).is_some()
    }

    /// Forget everything
    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
