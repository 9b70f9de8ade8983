use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::sink::SubscriberId;
use super::{StreamError, StreamSink};

pub const DEFAULT_STREAM_ADDR: &str = "127.0.0.1:8765";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
/// How long connection tasks may take to finish after shutdown before they
/// are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// WebSocket endpoint that subscribes every accepted connection to a
/// [`StreamSink`].
///
/// Each connection receives one text message per published record.
/// Incoming messages are ignored apart from close frames.
pub struct StreamServer {
    listener: TcpListener,
    sink: StreamSink,
}

impl StreamServer {
    /// Bind the endpoint. Use port 0 to let the system pick one.
    ///
    /// # Errors
    /// `StreamError::Bind` when the address cannot be bound.
    pub async fn bind(addr: &str, sink: StreamSink) -> Result<Self, StreamError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StreamError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { listener, sink })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, StreamError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop on the current runtime until `shutdown` fires.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "stream endpoint listening");
        }

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let sink = self.sink.clone();
                        let shutdown = shutdown.clone();
                        connections.spawn(serve_connection(stream, peer, sink, shutdown));
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = connections.len(),
                "connections still open after shutdown grace, aborting"
            );
            connections.abort_all();
            while connections.join_next().await.is_some() {}
        }
        info!("stream endpoint closed");
    }
}

/// Removes the subscriber when the connection task ends, including when
/// it is aborted.
struct SubscriberGuard {
    sink: StreamSink,
    id: SubscriberId,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.sink.unsubscribe(self.id);
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    sink: StreamSink,
    shutdown: CancellationToken,
) {
    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream));
    let ws = tokio::select! {
        _ = shutdown.cancelled() => {
            debug!(%peer, "shutdown during websocket handshake");
            return;
        }
        result = handshake => match result {
            Ok(Ok(ws)) => ws,
            Ok(Err(err)) => {
                debug!(%peer, error = %err, "websocket handshake failed");
                return;
            }
            Err(_) => {
                debug!(%peer, "websocket handshake timed out");
                return;
            }
        },
    };

    let mut subscription = sink.subscribe();
    let id = subscription.id();
    let _guard = SubscriberGuard { sink, id };
    info!(%peer, subscriber = id, "subscriber connected");

    let (mut outgoing, mut incoming) = ws.split();
    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, outgoing.send(Message::Close(None))).await;
                break "shutdown";
            }
            payload = subscription.recv() => match payload {
                Some(payload) => {
                    let sent = tokio::select! {
                        _ = shutdown.cancelled() => break "shutdown",
                        sent = outgoing.send(Message::Text(payload.to_string())) => sent,
                    };
                    if let Err(err) = sent {
                        debug!(subscriber = id, error = %err, "send failed");
                        break "send failed";
                    }
                }
                None => break "dropped by sink",
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | None => break "closed by peer",
                Some(Err(err)) => {
                    debug!(subscriber = id, error = %err, "receive failed");
                    break "receive failed";
                }
                Some(Ok(_)) => {}
            },
        }
    };

    info!(%peer, subscriber = id, reason, "subscriber disconnected");
}
