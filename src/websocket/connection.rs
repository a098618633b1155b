use crate::server::{ConnectionRejected, ConnectionSupervisor, FrameOutcome, OutboundFrame, RelayServer};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long queued frames may take to flush after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) async fn handle_socket(socket: WebSocket, server: Arc<RelayServer>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, rx) = server.outbound_channel();

    let mut supervisor = match ConnectionSupervisor::accept(Arc::clone(&server), addr.ip(), tx) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            tracing::warn!(client_addr = %addr, error = %err, "Refusing WebSocket connection");
            let close = close_message(err.close_code(), ConnectionRejected::CLOSE_REASON);
            if let Err(send_err) = sender.send(close).await {
                tracing::debug!(client_addr = %addr, error = %send_err, "Failed to send rejection close frame");
            }
            return;
        }
    };
    let connection_id = supervisor.id();
    tracing::info!(%connection_id, client_addr = %addr, "WebSocket connection established");

    let mut send_task = tokio::spawn(write_frames(sender, rx));
    let mut writer_finished = false;

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(err)) => {
                        tracing::info!(%connection_id, error = %err, "WebSocket read error");
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        if supervisor.handle_frame(text.as_str()).await == FrameOutcome::Close {
                            break;
                        }
                    }
                    Message::Binary(payload) => {
                        if supervisor.handle_binary(payload.len()).await == FrameOutcome::Close {
                            break;
                        }
                    }
                    Message::Close(frame) => {
                        tracing::info!(%connection_id, ?frame, "WebSocket connection closed by client");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            _ = &mut send_task, if !writer_finished => {
                writer_finished = true;
                tracing::debug!(%connection_id, "WebSocket writer stopped");
                break;
            }
        }
    }

    supervisor.close().await;
    drop(supervisor);

    // The writer exits once every queue handle is gone: ours was just dropped
    // and the registry entry removed by close().
    if !writer_finished
        && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task)
            .await
            .is_err()
    {
        tracing::debug!(%connection_id, "Aborting WebSocket writer after drain timeout");
        send_task.abort();
    }
}

async fn write_frames(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = rx.recv().await {
        match frame {
            OutboundFrame::Text(text) => {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            OutboundFrame::Close { code, reason } => {
                let _ = sender.send(close_message(code, reason)).await;
                break;
            }
        }
    }
    let _ = sender.close().await;
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}
