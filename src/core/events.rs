//! In-process event bus.
//!
//! Channels are named; each holds an ordered list of listeners. Storage
//! engines emit on a channel after their own effect is complete, and
//! listeners (plugins) may call back into the engine that emitted.
//!
//! Delivery is synchronous and in subscription order. The first listener
//! to fail aborts delivery and its error is returned to the emitter.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::Item;
use crate::storage::StorageEngine;

/// Channel names used by the storage engines
pub mod channels {
    /// Fired by `StorageEngine::add` with the stored item
    pub const ITEM_ADDED: &str = "item_added";
}

/// Errors raised by the event bus
#[derive(Debug, Error)]
pub enum EventError {
    #[error("A listener has already claimed channel '{channel}' exclusively")]
    ExclusiveConflict { channel: String },

    #[error("Listener on channel '{channel}' failed: {source}")]
    Listener {
        channel: String,
        #[source]
        source: anyhow::Error,
    },
}

/// What a storage engine hands to listeners
#[derive(Clone, Copy)]
pub struct ItemEvent<'a> {
    /// The engine that emitted the event
    pub storage: &'a dyn StorageEngine,

    /// The item as returned to the caller
    pub item: &'a Item,
}

impl fmt::Debug for ItemEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemEvent").field("item", self.item).finish_non_exhaustive()
    }
}

/// A callable subscribed to a channel
pub type Listener = Arc<dyn Fn(&ItemEvent<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscription flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// The only listener allowed on the channel; replaces any current ones
    pub exclusive: bool,

    /// Removed from the channel right before its first invocation
    pub one_shot: bool,
}

impl SubscribeOptions {
    pub fn exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::default()
        }
    }

    pub fn one_shot() -> Self {
        Self {
            one_shot: true,
            ..Self::default()
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    listener: Listener,
    one_shot: bool,
}

#[derive(Default)]
struct Channel {
    exclusive: bool,
    subscriptions: Vec<Subscription>,
}

impl Channel {
    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        if self.subscriptions.is_empty() {
            self.exclusive = false;
        }
        self.subscriptions.len() != before
    }
}

/// A set of named channels
#[derive(Default)]
pub struct EventBus {
    channels: Mutex<HashMap<String, Channel>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.channels();
        let counts: HashMap<&str, usize> = channels
            .iter()
            .map(|(name, c)| (name.as_str(), c.subscriptions.len()))
            .collect();
        f.debug_struct("EventBus").field("channels", &counts).finish()
    }
}

impl EventBus {
    /// Create a bus with no channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for sharing one bus between engines and plugins
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, Channel>> {
        // A panicking listener never runs under this lock
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add `listener` to `channel`.
    ///
    /// Fails if the channel is held by an exclusive listener. An exclusive
    /// subscription on a channel with ordinary listeners replaces them.
    pub fn subscribe<F>(
        &self,
        channel: &str,
        options: SubscribeOptions,
        listener: F,
    ) -> Result<SubscriptionId, EventError>
    where
        F: Fn(&ItemEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut channels = self.channels();
        let entry = channels.entry(channel.to_string()).or_default();

        if entry.exclusive {
            return Err(EventError::ExclusiveConflict {
                channel: channel.to_string(),
            });
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription {
            id,
            listener: Arc::new(listener),
            one_shot: options.one_shot,
        };

        if options.exclusive {
            if !entry.subscriptions.is_empty() {
                debug!(
                    channel,
                    replaced = entry.subscriptions.len(),
                    "exclusive listener replaces existing listeners"
                );
            }
            entry.subscriptions.clear();
            entry.exclusive = true;
        }
        entry.subscriptions.push(subscription);

        Ok(id)
    }

    /// Subscribe an ordinary listener
    pub fn on<F>(&self, channel: &str, listener: F) -> Result<SubscriptionId, EventError>
    where
        F: Fn(&ItemEvent<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(channel, SubscribeOptions::default(), listener)
    }

    /// Remove a listener; returns whether it was still subscribed
    pub fn unsubscribe(&self, channel: &str, id: SubscriptionId) -> bool {
        self.channels()
            .get_mut(channel)
            .map(|c| c.remove(id))
            .unwrap_or(false)
    }

    /// Number of listeners currently on `channel`
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels()
            .get(channel)
            .map(|c| c.subscriptions.len())
            .unwrap_or(0)
    }

    /// Invoke every listener on `channel` in subscription order.
    ///
    /// Returns how many listeners ran. Listeners run without the bus lock
    /// held, so they may subscribe, emit, or call back into storage.
    pub fn emit(&self, channel: &str, event: &ItemEvent<'_>) -> Result<usize, EventError> {
        let snapshot: Vec<(SubscriptionId, Listener, bool)> = match self.channels().get(channel) {
            Some(c) => c
                .subscriptions
                .iter()
                .map(|s| (s.id, Arc::clone(&s.listener), s.one_shot))
                .collect(),
            None => return Ok(0),
        };

        let mut delivered = 0;
        for (id, listener, one_shot) in snapshot {
            if one_shot {
                // Claim the one-shot; a concurrent emission may have won it
                let claimed = self
                    .channels()
                    .get_mut(channel)
                    .map(|c| c.remove(id))
                    .unwrap_or(false);
                if !claimed {
                    continue;
                }
            }

            if let Err(source) = listener(event) {
                warn!(channel, url = %event.item.url, error = %source, "listener failed, aborting delivery");
                return Err(EventError::Listener {
                    channel: channel.to_string(),
                    source,
                });
            }
            delivered += 1;
        }

        debug!(channel, delivered, "event delivered");
        Ok(delivered)
    }
}
