//! Core engines.
//!
//! This module contains:
//! - Identifier: C4 content ids computed from byte streams
//! - IdCache: Stat-keyed memo of file identifiers
//! - EventBus: Named channels of synchronous listeners

pub mod cache;
pub mod events;
pub mod identifier;

// Re-export commonly used types
pub use cache::{FileStamp, IdCache};
pub use events::{
    channels, EventBus, EventError, ItemEvent, Listener, SubscribeOptions, SubscriptionId,
};
pub use identifier::{identify, identify_bytes, identify_chunked, Identifier, DEFAULT_CHUNK_SIZE};
