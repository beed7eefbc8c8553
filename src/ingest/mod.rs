//! Filesystem ingestion.
//!
//! The factory turns paths into items and adds them to a storage engine:
//!
//! ```text
//! path → FileFactory → Item (st_size, st_mtime, content id) → StorageEngine::add
//!                                                               ↓
//!                                                          ITEM_ADDED → plugins
//! ```

pub mod factory;

// Re-export key types
pub use factory::{FactoryError, FileFactory, WalkOptions, TAG_MTIME, TAG_SIZE};
