//! Build items from the filesystem and hand them to storage.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::Identifier;
use crate::domain::{Item, Metadata};
use crate::storage::{StorageEngine, StorageError};

/// Tag holding the file size in bytes
pub const TAG_SIZE: &str = "st_size";

/// Tag holding the modification time (RFC 3339, UTC)
pub const TAG_MTIME: &str = "st_mtime";

/// Errors that can occur while building items from paths
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Only existing files are valid: {0}")]
    NotAFile(PathBuf),

    #[error("Path is a directory and recursion is disabled: {0}")]
    DirectoryNotExpanded(PathBuf),

    #[error("Invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How `generate` treats its starting path
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Keep only files whose full path matches this glob
    pub pattern: Option<glob::Pattern>,

    /// Expand directories into every file below them
    pub recursive: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            pattern: None,
            recursive: true,
        }
    }
}

impl WalkOptions {
    /// Set a path filter from a glob string
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, FactoryError> {
        let compiled = glob::Pattern::new(pattern).map_err(|source| FactoryError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.pattern = Some(compiled);
        Ok(self)
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    fn accepts(&self, path: &Path) -> bool {
        match &self.pattern {
            Some(p) => p.matches_path(path),
            None => true,
        }
    }
}

/// Populates a storage engine from filesystem paths
pub struct FileFactory<'a> {
    storage: &'a dyn StorageEngine,
    identifier: Arc<Identifier>,
}

impl<'a> FileFactory<'a> {
    pub fn new(storage: &'a dyn StorageEngine, identifier: Arc<Identifier>) -> Self {
        Self {
            storage,
            identifier,
        }
    }

    /// Build an item for one existing file, tagged with its size and
    /// modification time and carrying its content id
    pub fn item_from_path(
        &self,
        path: &Path,
        metadata: Option<Metadata>,
    ) -> Result<Item, FactoryError> {
        let path = path.canonicalize()?;
        let stat = fs::metadata(&path)?;
        if !stat.is_file() {
            return Err(FactoryError::NotAFile(path));
        }

        let modified: DateTime<Utc> = stat.modified()?.into();
        let content_id = self.identifier.identify_path(&path)?;

        let mut item = Item::new(path.to_string_lossy())
            .with_metadata(metadata.unwrap_or_default())
            .with_content_id(content_id);
        item.tag_one(TAG_MTIME, modified.to_rfc3339());
        item.tag_one(TAG_SIZE, stat.len().to_string());
        Ok(item)
    }

    /// Items for `path`: the file itself, or every matching file below a
    /// directory when `options.recursive` is set
    pub fn generate(&self, path: &Path, options: &WalkOptions) -> Result<Vec<Item>, FactoryError> {
        let root = path.canonicalize()?;

        if !root.is_dir() {
            return Ok(vec![self.item_from_path(&root, None)?]);
        }
        if !options.recursive {
            return Err(FactoryError::DirectoryNotExpanded(root));
        }

        let mut files = Vec::new();
        walk(&root, &mut files)?;

        let items = files
            .iter()
            .filter(|f| options.accepts(f))
            .map(|f| self.item_from_path(f, None))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(root = %root.display(), found = files.len(), kept = items.len(), "walked directory");
        Ok(items)
    }

    /// Generate items for `path` and add each to storage
    pub fn add(&self, path: &Path, options: &WalkOptions) -> Result<Vec<Item>, FactoryError> {
        let mut stored = Vec::new();
        for item in self.generate(path, options)? {
            stored.push(self.storage.add(item)?);
        }
        info!(path = %path.display(), count = stored.len(), "added items");
        Ok(stored)
    }
}

/// Collect every regular file under `dir`, sorted per directory
fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        let file_type = fs::symlink_metadata(&path)?.file_type();
        if file_type.is_dir() {
            walk(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}
