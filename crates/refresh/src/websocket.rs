//! WebSocket notification channel.
//!
//! Each upgraded socket gets a task that forwards queued reload messages to
//! the client and deregisters the socket when it closes.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;
use crate::registry::{Channel, Registration, Registry};

/// Registry-side handle of one WebSocket connection.
///
/// Holds at most one pending reload; further sends while one is queued are
/// absorbed, since every message is the same.
struct WsChannel {
    outbound: mpsc::Sender<String>,
    closed: CancellationToken,
}

impl WsChannel {
    fn new() -> (Self, mpsc::Receiver<String>) {
        let (outbound, queued) = mpsc::channel(1);
        let channel = Self {
            outbound,
            closed: CancellationToken::new(),
        };
        (channel, queued)
    }
}

impl Channel for WsChannel {
    fn send(&self, message: &str) -> Result<(), ChannelError> {
        if self.closed.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        match self.outbound.try_send(message.to_owned()) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(ChannelError::Closed),
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

/// Register `channel` unless watching has been cancelled.
///
/// The signal is checked after insertion: a shutdown sweep that ran before
/// the channel landed in the registry cannot leave it registered.
fn register_live(
    registry: &Arc<Registry>,
    channel: Arc<WsChannel>,
    signal: Option<&CancellationToken>,
) -> Option<Registration> {
    let registration = registry.register(Arc::clone(&channel));

    if signal.is_some_and(CancellationToken::is_cancelled) {
        channel.close();
        drop(registration);
        return None;
    }

    Some(registration)
}

/// Handle an established WebSocket connection.
///
/// Runs until the client goes away or the registry closes the channel. If
/// `signal` is cancelled the socket is closed without staying registered.
pub(crate) async fn handle_socket(
    mut socket: WebSocket,
    registry: Arc<Registry>,
    signal: Option<CancellationToken>,
) {
    let (channel, mut queued) = WsChannel::new();
    let closed = channel.closed.clone();

    let Some(registration) = register_live(&registry, Arc::new(channel), signal.as_ref()) else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    loop {
        tokio::select! {
            // Closed by the registry (shutdown sweep)
            () = closed.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            // Forward reload messages to client
            Some(message) = queued.recv() => {
                tokio::select! {
                    sent = socket.send(Message::Text(message.into())) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                    // Stalled client: give up without a close frame
                    () = closed.cancelled() => break,
                }
            }
            // Drain client messages; any end of stream closes the channel
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Idempotent: a no-op after a shutdown sweep
    drop(registration);
}
