//! HTTP server with live reload.
//!
//! Serves static files from the site root. Requests ending in `/_r` are
//! intercepted by the refresh middleware before they reach the file service.

use std::path::Path;

use axum::Router;
use refresh::{CancellationToken, Refresh};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub(crate) fn create_router(reload: Refresh, root: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(axum::middleware::from_fn_with_state(
            reload,
            refresh::middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Serve until Ctrl-C or until `token` is cancelled.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub(crate) async fn serve(
    listener: TcpListener,
    root: &Path,
    reload: Refresh,
    token: CancellationToken,
) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, root = %root.display(), "Starting server");
    }

    let app = create_router(reload.clone(), root);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(reload, token))
        .await
}

/// Wait for Ctrl-C or cancellation, then stop watching and close sockets.
///
/// Open reload sockets would otherwise keep graceful shutdown waiting.
async fn shutdown_signal(reload: Refresh, token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
                token.cancelled().await;
            }
        }
        () = token.cancelled() => {}
    }
    tracing::info!("Shutdown signal received, stopping server...");

    token.cancel();
    let closed = reload.registry().close_all();
    tracing::debug!(clients = closed, "Closed reload channels");
}
