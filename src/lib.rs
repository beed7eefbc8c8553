//! metags - Searchable metadata for content-addressed resources
//!
//! Resources identified by a url are tagged with key/value metadata and
//! indexed by a C4 id derived purely from their bytes.
//!
//! # Architecture
//!
//! - Identical bytes always map to the same 90 character `c4...` id
//! - Storage engines merge tags additively and never delete them
//! - Every `add` fires an event that plugins use to enrich items
//!
//! # Modules
//!
//! - `core`: Identifier engine, id cache, event bus
//! - `domain`: Data structures (Item, ContentId)
//! - `storage`: StorageEngine trait with memory and SQLite backends
//! - `ingest`: Filesystem factory
//! - `plugins`: Enrichment listeners
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Tag every png below a directory
//! metags add ~/photos --pattern '*.png' --tag album=summer
//!
//! # Query by metadata (all filters must match)
//! metags get --meta album=summer --meta labels=image
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod ingest;
pub mod plugins;
pub mod storage;

// Re-export main types at crate root for convenience
pub use core::{channels, EventBus, Identifier, ItemEvent, SubscribeOptions};
pub use domain::{ContentId, Item, Metadata};
pub use ingest::{FileFactory, WalkOptions};
pub use storage::{MemoryStorage, Query, RelationalStorage, StorageEngine, StorageError};
