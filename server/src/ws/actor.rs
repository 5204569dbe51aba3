use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::protocol::{self, ProtocolError};
use crate::ws::ConnectionId;

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Detects peers that vanished without a close frame.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code for a pong timeout (going away).
const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code for a message the server cannot interpret (invalid payload data).
const CLOSE_INVALID_PAYLOAD: u16 = 1007;

/// Run the actor-per-connection pattern for an upgraded WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from a bounded mpsc outbox
/// - Reader loop: processes incoming queries, answers them on the outbox
///
/// The outbox sender is registered in the connection registry so ranking
/// snapshots reach this client. Whatever ends the connection (client close,
/// read error, protocol violation, failed write), the registry entry is
/// removed exactly once on the way out.
pub async fn run_connection(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(state.outbox_capacity);

    let connection_id = state.connections.register(tx.clone());

    tracing::info!(
        connection_id = %connection_id,
        peer = %peer,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards outbox messages to the WebSocket sink
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx, state.write_timeout, connection_id));
    let mut writer_finished = false;

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if let Err(TrySendError::Closed(_)) = ping_tx.try_send(Message::Ping(vec![1, 2, 3, 4].into())) {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!(connection_id = %connection_id, "Pong timeout, closing connection");
                    let _ = ping_tx.try_send(Message::Close(Some(CloseFrame {
                        code: CLOSE_GOING_AWAY,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: runs until the client leaves or the writer gives up
    loop {
        tokio::select! {
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(msg)) => {
                    let result = match msg {
                        Message::Text(text) => {
                            protocol::handle_text_message(text.as_str(), &tx, &state, &connection_id)
                        }
                        Message::Binary(data) => {
                            protocol::handle_binary_message(&data, &tx, &state, &connection_id)
                        }
                        Message::Pong(_) => {
                            let _ = pong_tx.send(());
                            Ok(())
                        }
                        // tungstenite answers pings itself
                        Message::Ping(_) => Ok(()),
                        Message::Close(frame) => {
                            tracing::info!(
                                connection_id = %connection_id,
                                reason = ?frame,
                                "Client initiated close"
                            );
                            break;
                        }
                    };
                    if let Err(e) = result {
                        close_for_protocol_error(&tx, &connection_id, &e);
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "WebSocket receive error"
                    );
                    break;
                }
                None => {
                    tracing::info!(connection_id = %connection_id, "WebSocket stream ended");
                    break;
                }
            },
            _ = &mut writer_handle => {
                writer_finished = true;
                tracing::info!(connection_id = %connection_id, "WebSocket writer stopped");
                break;
            }
        }
    }

    ping_handle.abort();
    state.connections.unregister(&connection_id);

    // Let the writer flush anything still queued (such as a close frame),
    // bounded by the write timeout.
    drop(tx);
    if !writer_finished && timeout(state.write_timeout, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }

    tracing::info!(connection_id = %connection_id, peer = %peer, "WebSocket actor stopped");
}

fn close_for_protocol_error(tx: &mpsc::Sender<Message>, connection_id: &ConnectionId, error: &ProtocolError) {
    tracing::warn!(
        connection_id = %connection_id,
        error = %error,
        "Protocol violation, closing connection"
    );
    let _ = tx.try_send(Message::Close(Some(CloseFrame {
        code: CLOSE_INVALID_PAYLOAD,
        reason: "Invalid message".into(),
    })));
}

/// Writer task: receives messages from the outbox and forwards them to the WebSocket sink.
/// Stops on the first failed or timed-out write, or after sending a close frame.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    write_timeout: Duration,
    connection_id: ConnectionId,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        match timeout(write_timeout, ws_sender.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                break;
            }
            Err(_) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "WebSocket write timed out"
                );
                break;
            }
        }
        if closing {
            break;
        }
    }
}
