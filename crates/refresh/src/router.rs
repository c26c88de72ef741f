//! Request interception.
//!
//! Recognizes reload-channel requests by their path suffix and upgrades them
//! to WebSocket connections. Every other request is handed back untouched.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::Refresh;
use crate::websocket;

/// Path suffix of the reload channel endpoint.
pub const RELOAD_PATH_SUFFIX: &str = "/_r";

/// Outcome of [`Refresh::handle`].
#[derive(Debug)]
pub enum Dispatch {
    /// The request opened a reload channel; return this response as-is.
    Upgraded(Response),
    /// Not a reload request; continue normal routing with it.
    Pass(Request),
}

/// Whether a request path targets the reload channel endpoint.
#[must_use]
pub fn is_reload_path(path: &str) -> bool {
    path.ends_with(RELOAD_PATH_SUFFIX)
}

impl Refresh {
    /// Handle one inbound request.
    ///
    /// Returns [`Dispatch::Pass`] with the original request if the path does
    /// not end in `/_r` or watching has been cancelled. Otherwise upgrades the
    /// connection; the socket is registered once the handshake completes.
    ///
    /// # Errors
    ///
    /// Returns the upgrade rejection if a reload request is not a valid
    /// WebSocket handshake.
    pub async fn handle(&self, req: Request) -> Result<Dispatch, WebSocketUpgradeRejection> {
        if !is_reload_path(req.uri().path()) || self.is_cancelled() {
            return Ok(Dispatch::Pass(req));
        }

        let (mut parts, _body) = req.into_parts();
        let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &()).await?;

        let registry = Arc::clone(&self.registry);
        let signal = self.config.signal.clone();
        tracing::debug!(path = %parts.uri.path(), "Upgrading reload channel");

        Ok(Dispatch::Upgraded(upgrade.on_upgrade(move |socket| {
            websocket::handle_socket(socket, registry, signal)
        })))
    }
}

/// axum middleware serving the reload channel in front of other routes.
///
/// ```ignore
/// let app = Router::new()
///     .fallback_service(ServeDir::new("public"))
///     .layer(axum::middleware::from_fn_with_state(refresh, refresh::middleware));
/// ```
pub async fn middleware(State(refresh): State<Refresh>, req: Request, next: Next) -> Response {
    match refresh.handle(req).await {
        Ok(Dispatch::Upgraded(response)) => response,
        Ok(Dispatch::Pass(req)) => next.run(req).await,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected reload channel upgrade");
            rejection.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{StatusCode, header};
    use axum::routing::get;
    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::{RefreshInit, refresh};

    fn start(dir: &tempfile::TempDir, signal: Option<CancellationToken>) -> Refresh {
        let mut init = RefreshInit::default()
            .with_paths([dir.path()])
            .with_debounce_ms(10);
        init.signal = signal;
        refresh(init).unwrap()
    }

    fn app(refresh: Refresh) -> Router {
        Router::new()
            .route("/", get(|| async { "Hello" }))
            .fallback(|| async { StatusCode::NOT_FOUND })
            .layer(axum::middleware::from_fn_with_state(refresh, middleware))
    }

    fn handshake_request(path: &str) -> Request {
        Request::builder()
            .uri(path)
            .header(header::CONNECTION, "upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap()
    }

    async fn wait_for_clients(refresh: &Refresh, expected: usize) {
        for _ in 0..100 {
            if refresh.registry().len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {expected} clients, got {}", refresh.registry().len());
    }

    #[test]
    fn test_is_reload_path() {
        assert!(is_reload_path("/_r"));
        assert!(is_reload_path("/docs/_r"));
        assert!(!is_reload_path("/"));
        assert!(!is_reload_path("/_r/"));
        assert!(!is_reload_path("/x_r"));
        assert!(!is_reload_path("/_reload"));
    }

    #[tokio::test]
    async fn test_unmatched_path_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let refresh = start(&dir, None);
        let req = handshake_request("/index.html");

        let dispatch = refresh.handle(req).await.unwrap();

        let Dispatch::Pass(req) = dispatch else {
            panic!("expected request to pass through");
        };
        assert_eq!(req.uri().path(), "/index.html");
        assert!(req.headers().contains_key(header::SEC_WEBSOCKET_KEY));
        assert!(refresh.registry().is_empty());
    }

    #[tokio::test]
    async fn test_reload_path_after_cancel_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let refresh = start(&dir, Some(token.clone()));
        token.cancel();

        let dispatch = refresh.handle(handshake_request("/_r")).await.unwrap();

        assert!(matches!(dispatch, Dispatch::Pass(_)));
        assert!(refresh.registry().is_empty());
    }

    #[tokio::test]
    async fn test_reload_path_without_handshake_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let refresh = start(&dir, None);
        let req = Request::builder().uri("/_r").body(Body::empty()).unwrap();

        let result = refresh.handle(req).await;

        assert!(result.is_err());
        assert!(refresh.registry().is_empty());
    }

    #[tokio::test]
    async fn test_reload_path_without_connection_upgrade_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let refresh = start(&dir, None);

        // Valid headers, but no underlying connection to take over
        let result = refresh.handle(handshake_request("/_r")).await;

        assert!(matches!(
            result,
            Err(WebSocketUpgradeRejection::ConnectionNotUpgradable(_))
        ));
    }

    #[tokio::test]
    async fn test_middleware_forwards_other_requests() {
        let dir = tempfile::tempdir().unwrap();
        let refresh = start(&dir, None);
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = app(refresh).oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_returns_rejection_response() {
        let dir = tempfile::tempdir().unwrap();
        let refresh = start(&dir, None);
        let req = Request::builder().uri("/_r").body(Body::empty()).unwrap();

        let response = app(refresh).oneshot(req).await.unwrap();

        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_websocket_receives_reload_and_deregisters_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let refresh = start(&dir, None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = app(refresh.clone());
        tokio::spawn(async move { axum::serve(listener, server).await.unwrap() });

        let url = format!("ws://{addr}/_r");
        let (mut client, response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        wait_for_clients(&refresh, 1).await;

        assert_eq!(refresh.registry().broadcast(""), 1);
        let message = client.next().await.unwrap().unwrap();
        assert_eq!(message, ClientMessage::Text(String::new()));

        client.close(None).await.unwrap();
        wait_for_clients(&refresh, 0).await;
    }

    #[tokio::test]
    async fn test_file_change_reaches_websocket_client() {
        let dir = tempfile::tempdir().unwrap();
        let refresh = start(&dir, None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = app(refresh.clone());
        tokio::spawn(async move { axum::serve(listener, server).await.unwrap() });

        let url = format!("ws://{addr}/docs/_r");
        let (mut client, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .unwrap();
        wait_for_clients(&refresh, 1).await;

        std::fs::write(dir.path().join("index.html"), "<h1>changed</h1>").unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(message, ClientMessage::Text(String::new()));
    }

    #[tokio::test]
    async fn test_cancelled_watcher_closes_websocket_on_next_event() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let refresh = start(&dir, Some(token.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = app(refresh.clone());
        tokio::spawn(async move { axum::serve(listener, server).await.unwrap() });

        let url = format!("ws://{addr}/_r");
        let (mut client, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .unwrap();
        wait_for_clients(&refresh, 1).await;

        token.cancel();
        std::fs::write(dir.path().join("index.html"), "bye").unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap();
        assert!(matches!(message, Some(Ok(ClientMessage::Close(_))) | None));
        assert!(refresh.registry().is_empty());
    }
}
