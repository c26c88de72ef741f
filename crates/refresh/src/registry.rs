//! Connection registry.
//!
//! Tracks the notification channels of connected clients and broadcasts
//! reload messages to all of them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::ChannelError;

/// One connected client able to receive reload notifications.
///
/// Implementations must not call back into the [`Registry`] from
/// [`send`](Self::send) or [`close`](Self::close): both run while the
/// registry lock is held.
pub trait Channel: Send + Sync {
    /// Queue a message for delivery to the client.
    fn send(&self, message: &str) -> Result<(), ChannelError>;

    /// Close the channel. Closing twice is a no-op.
    fn close(&self);
}

/// Identity of a registered channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of open notification channels.
///
/// All operations take the same lock for their whole duration, so a
/// broadcast never observes a channel halfway through removal.
#[derive(Default)]
pub struct Registry {
    channels: Mutex<HashMap<ChannelId, Arc<dyn Channel>>>,
    next_id: AtomicU64,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel.
    ///
    /// The returned [`Registration`] removes the channel when dropped, so the
    /// owner of the connection wires its close event by dropping it.
    pub fn register<C: Channel + 'static>(self: &Arc<Self>, channel: Arc<C>) -> Registration {
        let channel: Arc<dyn Channel> = channel;
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, channel);
        tracing::debug!(%id, "Registered reload channel");

        Registration {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Remove a channel.
    ///
    /// Returns `false` if the channel was not registered.
    pub fn remove(&self, id: ChannelId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(%id, "Removed reload channel");
        }
        removed
    }

    /// Send a message to every registered channel.
    ///
    /// A failing channel neither stops delivery to the rest nor gets removed;
    /// removal only follows the channel's own close. Returns the number of
    /// channels the message was delivered to.
    pub fn broadcast(&self, message: &str) -> usize {
        let channels = self.lock();
        let mut delivered = 0;

        for (id, channel) in channels.iter() {
            match channel.send(message) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::debug!(%id, error = %e, "Failed to notify reload channel"),
            }
        }

        delivered
    }

    /// Close every channel and empty the registry.
    ///
    /// Returns the number of channels closed.
    pub fn close_all(&self) -> usize {
        let mut channels = self.lock();
        let count = channels.len();

        for (_, channel) in channels.drain() {
            channel.close();
        }

        count
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelId, Arc<dyn Channel>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle that keeps a channel registered.
///
/// Dropping the handle removes the channel. Removal is idempotent, so a
/// channel already swept by [`Registry::close_all`] is left alone.
#[must_use = "dropping the registration removes the channel"]
pub struct Registration {
    id: ChannelId,
    registry: Weak<Registry>,
}

impl Registration {
    /// Identity of the registered channel.
    pub fn id(&self) -> ChannelId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
