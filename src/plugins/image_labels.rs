//! Label image files as they are added.
//!
//! Items whose url ends in a known image extension get `labels=image`,
//! written back through the storage engine that emitted the event.

use std::path::Path;

use tracing::debug;

use crate::core::{channels, EventBus, EventError, ItemEvent, SubscriptionId};

/// Extensions treated as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "png"];

/// Tag key written by this plugin
pub const LABELS: &str = "labels";

/// Tag value written by this plugin
pub const IMAGE: &str = "image";

/// Whether `url` names an image file
pub fn is_image(url: &str) -> bool {
    Path::new(url)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// The listener body
pub fn label_image(event: &ItemEvent<'_>) -> anyhow::Result<()> {
    let item = event.item;
    if !is_image(&item.url) || item.has_tag(LABELS, IMAGE) {
        return Ok(());
    }

    let mut labelled = item.clone();
    labelled.tag_one(LABELS, IMAGE);
    event.storage.update(&labelled)?;
    debug!(url = %item.url, "labelled image");
    Ok(())
}

/// Subscribe the labeller to `ITEM_ADDED` on `bus`
pub fn register(bus: &EventBus) -> Result<SubscriptionId, EventError> {
    bus.on(channels::ITEM_ADDED, label_image)
}
