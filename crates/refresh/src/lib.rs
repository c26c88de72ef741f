//! Live reload middleware.
//!
//! Watches files for changes and tells connected browsers to refresh, without
//! the host web server knowing anything about file watching:
//! - a background watcher debounces filesystem events into reload signals
//! - a registry tracks one WebSocket channel per connected browser tab
//! - a request handler upgrades requests ending in `/_r` into such channels
//!
//! # Quick Start
//!
//! ```ignore
//! use axum::Router;
//! use refresh::{RefreshInit, refresh};
//! use tower_http::services::ServeDir;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reload = refresh(RefreshInit::default().with_paths(["public"]))?;
//!
//!     let app = Router::new()
//!         .fallback_service(ServeDir::new("public"))
//!         .layer(axum::middleware::from_fn_with_state(reload, refresh::middleware));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! Without axum middleware, call [`Refresh::handle`] directly and fall
//! through to your own handler on [`Dispatch::Pass`].
//!
//! # Architecture
//!
//! ```text
//! notify ──► ChangeWatcher ──(debounce)──► Registry::broadcast("")
//!                                              │
//! Browser ──GET …/_r──► Refresh::handle        ├─► WebSocket task ──► Browser
//!                          │                   └─► WebSocket task ──► Browser
//!                          └─► upgrade + register
//! ```

mod config;
mod debounce;
mod error;
mod registry;
mod router;
mod watcher;
mod websocket;

use std::sync::Arc;

pub use config::{
    DEFAULT_DEBOUNCE_MS, DEFAULT_IGNORE_KINDS, DEFAULT_PATH, DEFAULT_RECURSIVE, FsEventKind,
    RefreshInit, WatchConfig,
};
pub use error::{ChannelError, RefreshError};
pub use registry::{Channel, ChannelId, Registration, Registry};
pub use router::{Dispatch, RELOAD_PATH_SUFFIX, is_reload_path, middleware};
pub use tokio_util::sync::CancellationToken;

use watcher::{ChangeWatcher, Subscription};

/// Live reload middleware instance.
///
/// Cheap to clone; clones share the same registry and configuration.
#[derive(Clone)]
pub struct Refresh {
    registry: Arc<Registry>,
    config: Arc<WatchConfig>,
}

impl Refresh {
    /// Registry of connected clients.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Resolved watch configuration.
    #[must_use]
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Whether the cancellation token has been set.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.config.is_cancelled()
    }
}

/// Create a live reload middleware and start watching.
///
/// The watcher starts immediately as a background task on the current tokio
/// runtime, so this must be called from within one.
///
/// # Errors
///
/// Returns an error if the options are invalid or the filesystem
/// subscription cannot be opened.
pub fn refresh(init: RefreshInit) -> Result<Refresh, RefreshError> {
    let config = Arc::new(WatchConfig::try_from(init)?);
    let registry = Arc::new(Registry::new());

    let subscription = Subscription::open(&config)?;
    ChangeWatcher::new(Arc::clone(&config), Arc::clone(&registry), subscription).spawn();

    Ok(Refresh { registry, config })
}
