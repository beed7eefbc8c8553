//! Enrichment plugins.
//!
//! Plugins are ordinary event listeners: they subscribe to storage
//! channels on an `EventBus` and write extra tags back through the
//! emitting engine.

pub mod image_labels;

use crate::core::{EventBus, EventError};

/// Register every built-in plugin on `bus`
pub fn register_defaults(bus: &EventBus) -> Result<(), EventError> {
    image_labels::register(bus)?;
    Ok(())
}
