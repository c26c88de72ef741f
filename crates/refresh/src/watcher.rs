//! Change watcher.
//!
//! Turns the stream of filesystem events into debounced reload broadcasts.

use std::path::PathBuf;
use std::sync::Arc;

use notify::{Event, RecommendedWatcher, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{FsEventKind, WatchConfig};
use crate::debounce::Debouncer;
use crate::error::RefreshError;
use crate::registry::Registry;

/// Capacity of the channel between the notify callback and the watcher task.
const EVENT_BUFFER: usize = 100;

/// Message broadcast to clients when a reload is due.
pub(crate) const RELOAD_MESSAGE: &str = "";

/// A filesystem event as seen by the watcher.
#[derive(Clone, Debug)]
pub(crate) struct FsEvent {
    pub kind: FsEventKind,
    pub paths: Vec<PathBuf>,
}

impl From<Event> for FsEvent {
    fn from(event: Event) -> Self {
        Self {
            kind: FsEventKind::from(&event.kind),
            paths: event.paths,
        }
    }
}

/// Live subscription to filesystem events.
pub(crate) struct Subscription {
    events: mpsc::Receiver<FsEvent>,
    watcher: Option<RecommendedWatcher>,
}

impl Subscription {
    /// Start watching every configured path.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be created or any path cannot
    /// be watched.
    pub(crate) fn open(config: &WatchConfig) -> Result<Self, RefreshError> {
        let (tx, rx) = mpsc::channel::<FsEvent>(EVENT_BUFFER);

        // Create watcher with callback that sends events to channel
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                // Use blocking_send since callback is sync
                Ok(event) => {
                    let _ = tx.blocking_send(FsEvent::from(event));
                }
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            }
        })?;

        let mode = config.recursive_mode();
        for path in &config.paths {
            watcher.watch(path, mode)?;
        }

        Ok(Self {
            events: rx,
            watcher: Some(watcher),
        })
    }

    /// Subscription fed by an arbitrary channel instead of the filesystem.
    #[cfg(test)]
    pub(crate) fn from_receiver(events: mpsc::Receiver<FsEvent>) -> Self {
        Self {
            events,
            watcher: None,
        }
    }

    /// Wait for the next event. `None` once the subscription has ended.
    async fn next(&mut self) -> Option<FsEvent> {
        self.events.recv().await
    }

    /// Stop watching. Closing twice is a no-op.
    fn close(&mut self) {
        // Dropping the watcher unregisters all paths
        self.watcher.take();
        self.events.close();
    }
}

/// Background task that watches files and broadcasts reloads.
pub(crate) struct ChangeWatcher {
    config: Arc<WatchConfig>,
    registry: Arc<Registry>,
    subscription: Subscription,
    debouncer: Debouncer,
}

impl ChangeWatcher {
    pub(crate) fn new(
        config: Arc<WatchConfig>,
        registry: Arc<Registry>,
        subscription: Subscription,
    ) -> Self {
        let debouncer = Debouncer::new(config.debounce);
        Self {
            config,
            registry,
            subscription,
            debouncer,
        }
    }

    /// Spawn the watcher loop on the current tokio runtime.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Consume events until cancelled or the subscription ends.
    ///
    /// Cancellation is checked on each event and on each timer fire, and
    /// nowhere else: an idle watcher notices it on the next event.
    pub(crate) async fn run(mut self) {
        tracing::info!(
            paths = ?self.config.paths,
            debounce_ms = self.config.debounce.as_millis(),
            recursive = self.config.recursive,
            "Watching for changes"
        );

        loop {
            tokio::select! {
                // Queued events go before an expired timer
                biased;

                event = self.subscription.next() => {
                    let Some(event) = event else {
                        tracing::debug!("Filesystem subscription ended");
                        self.shutdown();
                        break;
                    };
                    if self.config.is_cancelled() {
                        self.shutdown();
                        break;
                    }
                    self.record(&event);
                }
                () = self.debouncer.fired(), if self.debouncer.is_pending() => {
                    if self.config.is_cancelled() {
                        self.shutdown();
                        break;
                    }
                    self.debouncer.reset();
                    self.send();
                }
            }
        }
    }

    /// Handle one event: drop ignored kinds, otherwise arm the debouncer.
    fn record(&mut self, event: &FsEvent) {
        if self.config.is_ignored(event.kind) {
            tracing::trace!(kind = %event.kind, "Ignored filesystem event");
            return;
        }

        if self.debouncer.trigger() {
            tracing::debug!(kind = %event.kind, paths = ?event.paths, "Change detected, reload queued");
        }
    }

    /// Broadcast the reload message to every connected client.
    fn send(&self) {
        let delivered = self.registry.broadcast(RELOAD_MESSAGE);
        tracing::info!(clients = delivered, "Live reload broadcast");
    }

    /// Close the subscription and every channel.
    fn shutdown(&mut self) {
        self.subscription.close();
        self.debouncer.reset();
        let closed = self.registry.close_all();
        tracing::info!(closed_channels = closed, "Stopped watching for changes");
    }
}
