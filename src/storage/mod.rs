//! Storage engines for tagged items.
//!
//! Two backends share one contract:
//! - `MemoryStorage`: a linear in-process list, for tests and scratch use
//! - `RelationalStorage`: SQLite tables `entity`, `meta` and `link_meta`
//!
//! Both fill a missing content id on `add`, merge metadata additively,
//! emit `ITEM_ADDED` on their event bus, and answer queries with the same
//! wildcard and AND rules (see [`Query`]).

pub mod memory;
pub mod pattern;
pub mod relational;
pub mod schema;

use thiserror::Error;

use crate::core::EventError;
use crate::domain::Item;

pub use memory::MemoryStorage;
pub use pattern::Pattern;
pub use relational::RelationalStorage;

/// Errors that can occur in a storage engine
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("No stored item for url '{url}' with content id {content_id}")]
    NotFound { url: String, content_id: String },

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Unsupported database url: {0}")]
    UnsupportedDatabase(String),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Capability set shared by every backend
pub trait StorageEngine: Send + Sync {
    /// Store `item`, computing its content id if missing. Re-adding the
    /// same `(url, content_id)` merges metadata into the existing record.
    /// Emits on the engine's add channel before returning.
    fn add(&self, item: Item) -> Result<Item, StorageError>;

    /// Items selected by the highest-precedence selector in `query`
    fn get(&self, query: &Query) -> Result<Vec<Item>, StorageError>;

    /// Every stored item
    fn all(&self) -> Result<Vec<Item>, StorageError>;

    /// Union `item`'s metadata into the stored record with the same
    /// `(url, content_id)`. Never removes tags.
    fn update(&self, item: &Item) -> Result<(), StorageError>;
}

/// One metadata filter: a key pattern and the value patterns that must
/// all be present under a matching key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaFilter {
    pub key: String,
    pub values: Vec<String>,
}

/// Selectors for `StorageEngine::get`.
///
/// Only one selector is honored per call, by precedence
/// `content_id > url > metadata > none`. Values containing `*` are
/// wildcard patterns over the whole stored string; anything else must be
/// equal. Metadata filters are ANDed, as are the value patterns within
/// one filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub content_id: Option<String>,
    pub url: Option<String>,
    pub metadata: Vec<MetaFilter>,
}

/// The selector a `Query` resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    ContentId(&'a str),
    Url(&'a str),
    Metadata(&'a [MetaFilter]),
    All,
}

impl Query {
    /// A query selecting everything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_id(mut self, pattern: impl Into<String>) -> Self {
        self.content_id = Some(pattern.into());
        self
    }

    pub fn url(mut self, pattern: impl Into<String>) -> Self {
        self.url = Some(pattern.into());
        self
    }

    /// Require a key matching `key` tagged with a value matching `value`
    pub fn meta(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta_all(key, [value])
    }

    /// Require a key matching `key` tagged with values matching every
    /// pattern in `values`
    pub fn meta_all<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let key = key.into();
        let values = values.into_iter().map(Into::into);
        match self.metadata.iter_mut().find(|f| f.key == key) {
            Some(filter) => filter.values.extend(values),
            None => self.metadata.push(MetaFilter {
                key,
                values: values.collect(),
            }),
        }
        self
    }

    /// Resolve selector precedence
    pub fn selection(&self) -> Selection<'_> {
        if let Some(id) = &self.content_id {
            Selection::ContentId(id)
        } else if let Some(url) = &self.url {
            Selection::Url(url)
        } else if !self.metadata.is_empty() {
            Selection::Metadata(&self.metadata)
        } else {
            Selection::All
        }
    }
}
