//! WebSocket transport for the client with bounded reconnect.
//!
//! The transport runs as its own task and talks to the tick loop only through
//! unbounded channels, so a slow or dead link never stalls a tick.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::ws::protocol::{ClientMsg, ProtocolError, ServerMsg};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client failures that end the session
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("server refused admission: {0}")]
    ServerFull(String),

    #[error("connection lost, gave up after {attempts} reconnect attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("connection task stopped unexpectedly")]
    TaskStopped,
}

/// Linear backoff: attempt `n` waits `n * base_delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Delay before `attempt`, or `None` once the budget is spent
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt <= self.max_attempts).then(|| self.delay_for(attempt))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Transport notifications for the tick loop
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Message(ServerMsg),
    Disconnected,
}

/// Tick-loop side of a running transport task
pub struct ConnectionHandle {
    pub outbound: mpsc::UnboundedSender<ClientMsg>,
    pub inbound: mpsc::UnboundedReceiver<ConnectionEvent>,
    pub task: JoinHandle<Result<(), ClientError>>,
}

/// Start the transport task for `url`
pub fn spawn(url: String, policy: ReconnectPolicy) -> ConnectionHandle {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(url, policy, outbound_rx, inbound_tx));
    ConnectionHandle {
        outbound: outbound_tx,
        inbound: inbound_rx,
        task,
    }
}

enum SessionEnd {
    /// Tick loop went away
    Shutdown,
    /// Link dropped, worth reconnecting
    Dropped,
    ServerFull(String),
}

async fn run(
    url: String,
    policy: ReconnectPolicy,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientMsg>,
    inbound_tx: mpsc::UnboundedSender<ConnectionEvent>,
) -> Result<(), ClientError> {
    let mut attempt = 0;

    loop {
        // Poses queued while offline are stale by now
        while outbound_rx.try_recv().is_ok() {}

        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                info!(%url, "Connected to relay");
                attempt = 0;
                if inbound_tx.send(ConnectionEvent::Connected).is_err() {
                    return Ok(());
                }

                match pump(stream, &mut outbound_rx, &inbound_tx).await {
                    SessionEnd::Shutdown => return Ok(()),
                    SessionEnd::ServerFull(message) => return Err(ClientError::ServerFull(message)),
                    SessionEnd::Dropped => {
                        warn!("Connection to relay lost");
                        let _ = inbound_tx.send(ConnectionEvent::Disconnected);
                    }
                }
            }
            Err(e) => {
                warn!(attempt, error = %e, "Failed to connect to relay");
            }
        }

        attempt += 1;
        match policy.next_delay(attempt) {
            Some(delay) => {
                info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");
                tokio::time::sleep(delay).await;
            }
            None => {
                error!(attempts = policy.max_attempts, "Giving up on relay");
                return Err(ClientError::ReconnectExhausted {
                    attempts: policy.max_attempts,
                });
            }
        }
    }
}

async fn pump(
    stream: WsStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientMsg>,
    inbound_tx: &mpsc::UnboundedSender<ConnectionEvent>,
) -> SessionEnd {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                let Some(msg) = outgoing else {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                };
                let text = match msg.encode() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode client message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!(error = %e, "Send failed");
                    return SessionEnd::Dropped;
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => match ServerMsg::decode(&text) {
                        Ok(ServerMsg::ServerFull { message }) => {
                            let _ = inbound_tx.send(ConnectionEvent::Message(ServerMsg::ServerFull {
                                message: message.clone(),
                            }));
                            return SessionEnd::ServerFull(message);
                        }
                        Ok(msg) => {
                            if inbound_tx.send(ConnectionEvent::Message(msg)).is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to parse server message"),
                    },
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "Receive failed");
                        return SessionEnd::Dropped;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        };
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(250)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(750)));
        assert_eq!(policy.next_delay(4), None);
    }

    #[tokio::test]
    async fn unreachable_relay_exhausts_attempts() {
        // nothing listens on port 9 of localhost in test environments
        let handle = spawn(
            "ws://127.0.0.1:9/ws".to_string(),
            ReconnectPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
            },
        );
        let result = handle.task.await.expect("task panicked");
        assert!(matches!(
            result,
            Err(ClientError::ReconnectExhausted { attempts: 2 })
        ));
    }
}
