//! In-memory storage engine.
//!
//! Items live in an append-only list scanned linearly on every query.
//! Two items are the same record when their `(url, content_id)` pairs are
//! equal; metadata plays no part in that comparison.

use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::pattern::Pattern;
use super::{MetaFilter, Query, Selection, StorageEngine, StorageError};
use crate::core::{channels, EventBus, Identifier, ItemEvent};
use crate::domain::{ContentId, Item, Metadata};

/// Linear in-memory backing store
#[derive(Debug)]
pub struct MemoryStorage {
    items: RwLock<Vec<Item>>,
    bus: Arc<EventBus>,
    identifier: Arc<Identifier>,
    channel: String,
}

impl MemoryStorage {
    /// Create an empty store emitting on `bus`
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            bus,
            identifier: Arc::new(Identifier::new()),
            channel: channels::ITEM_ADDED.to_string(),
        }
    }

    /// Share an identifier engine (and its cache) with other components
    pub fn with_identifier(mut self, identifier: Arc<Identifier>) -> Self {
        self.identifier = identifier;
        self
    }

    /// Emit add events on `channel` instead of `ITEM_ADDED`
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn len(&self) -> usize {
        self.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Item>>, StorageError> {
        self.items.read().map_err(|_| StorageError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Item>>, StorageError> {
        self.items.write().map_err(|_| StorageError::Poisoned)
    }

    fn content_id(&self, item: &Item) -> Result<ContentId, StorageError> {
        match &item.content_id {
            Some(id) => Ok(id.clone()),
            None => Ok(self.identifier.identify_path(Path::new(&item.url))?),
        }
    }
}

impl StorageEngine for MemoryStorage {
    fn add(&self, mut item: Item) -> Result<Item, StorageError> {
        if item.content_id.is_none() {
            item.content_id = Some(self.content_id(&item)?);
        }

        {
            let mut items = self.write()?;
            match items.iter_mut().find(|stored| stored.same_record(&item)) {
                Some(stored) => {
                    debug!(url = %item.url, "merging into existing item");
                    stored.merge_metadata(&item.metadata);
                }
                None => {
                    debug!(url = %item.url, "storing new item");
                    let mut stored = Item {
                        url: item.url.clone(),
                        content_id: item.content_id.clone(),
                        metadata: Metadata::new(),
                    };
                    stored.merge_metadata(&item.metadata);
                    items.push(stored);
                }
            }
        }

        self.bus.emit(
            &self.channel,
            &ItemEvent {
                storage: self,
                item: &item,
            },
        )?;

        Ok(item)
    }

    fn get(&self, query: &Query) -> Result<Vec<Item>, StorageError> {
        let matcher = Matcher::new(query.selection());
        let items = self.read()?;
        Ok(items.iter().filter(|i| matcher.matches(i)).cloned().collect())
    }

    fn all(&self) -> Result<Vec<Item>, StorageError> {
        Ok(self.read()?.clone())
    }

    fn update(&self, item: &Item) -> Result<(), StorageError> {
        let content_id = self.content_id(item)?;
        let mut items = self.write()?;

        let stored = items
            .iter_mut()
            .find(|stored| {
                stored.url == item.url && stored.content_id.as_ref() == Some(&content_id)
            })
            .ok_or_else(|| StorageError::NotFound {
                url: item.url.clone(),
                content_id: content_id.to_string(),
            })?;

        stored.merge_metadata(&item.metadata);
        debug!(url = %item.url, "updated item metadata");
        Ok(())
    }
}

/// A query compiled to patterns once per `get`
enum Matcher {
    ContentId(Pattern),
    Url(Pattern),
    Metadata(Vec<(Pattern, Vec<Pattern>)>),
    All,
}

impl Matcher {
    fn new(selection: Selection<'_>) -> Self {
        match selection {
            Selection::ContentId(p) => Self::ContentId(Pattern::new(p)),
            Selection::Url(p) => Self::Url(Pattern::new(p)),
            Selection::Metadata(filters) => Self::Metadata(
                filters
                    .iter()
                    .map(|MetaFilter { key, values }| {
                        (
                            Pattern::new(key),
                            values.iter().map(|v| Pattern::new(v)).collect(),
                        )
                    })
                    .collect(),
            ),
            Selection::All => Self::All,
        }
    }

    fn matches(&self, item: &Item) -> bool {
        match self {
            Self::ContentId(p) => item
                .content_id
                .as_ref()
                .is_some_and(|id| p.matches(id.as_str())),
            Self::Url(p) => p.matches(&item.url),
            Self::Metadata(filters) => filters.iter().all(|(key, values)| {
                if values.is_empty() {
                    return item.metadata.keys().any(|k| key.matches(k));
                }
                // Every value pattern needs its own matching (key, value) tag
                values.iter().all(|value| {
                    item.metadata.iter().any(|(k, vs)| {
                        key.matches(k) && vs.iter().any(|v| value.matches(v))
                    })
                })
            }),
            Self::All => true,
        }
    }
}
