//! Tagged resources.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::content_id::ContentId;

/// Metadata keyed by tag name. Each key holds its values in insertion
/// order, duplicates included.
pub type Metadata = BTreeMap<String, Vec<String>>;

/// A resource at a location, tagged with key/value metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Where the resource lives (a file path for factory-built items)
    pub url: String,

    /// Identifier of the resource's bytes, filled on first `add`
    pub content_id: Option<ContentId>,

    /// Tags attached to this resource
    #[serde(default)]
    pub metadata: Metadata,
}

/// The pair two items must share to be the same stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemKey<'a> {
    pub url: &'a str,
    pub content_id: Option<&'a ContentId>,
}

impl Item {
    /// Create an untagged item with no identifier
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_id: None,
            metadata: Metadata::new(),
        }
    }

    /// Set a precomputed content identifier
    pub fn with_content_id(mut self, content_id: ContentId) -> Self {
        self.content_id = Some(content_id);
        self
    }

    /// Replace the metadata wholesale
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Builder form of [`Item::tag_one`]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tag_one(key, value);
        self
    }

    /// Append a single value under `key`
    pub fn tag_one(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.entry(key.into()).or_default().push(value.into());
    }

    /// Append every value under `key`, creating the key even when
    /// `values` is empty
    pub fn tag_many<I, V>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.metadata
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    /// Values tagged under `key`
    pub fn values(&self, key: &str) -> &[String] {
        self.metadata.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `(key, value)` is already tagged
    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.values(key).iter().any(|v| v == value)
    }

    /// Identity used for deduplication
    pub fn key(&self) -> ItemKey<'_> {
        ItemKey {
            url: &self.url,
            content_id: self.content_id.as_ref(),
        }
    }

    /// Whether both items describe the same stored record
    pub fn same_record(&self, other: &Item) -> bool {
        self.key() == other.key()
    }

    /// Union `other` into this item's metadata. Values already present
    /// under a key are not repeated; existing values are never removed.
    pub fn merge_metadata(&mut self, other: &Metadata) {
        for (key, values) in other {
            let existing = self.metadata.entry(key.clone()).or_default();
            for value in values {
                if !existing.contains(value) {
                    existing.push(value.clone());
                }
            }
        }
    }

    /// Iterate every `(key, value)` pair
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }
}
