//! Domain types for metags.
//!
//! This module contains the core data structures:
//! - ContentId: C4 identifier of a resource's bytes
//! - Item: A located resource and its tags

pub mod content_id;
pub mod item;

// Re-export commonly used types
pub use content_id::ContentId;
pub use item::{Item, ItemKey, Metadata};
