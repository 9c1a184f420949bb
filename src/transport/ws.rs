//! WebSocket server fanning broadcasts out to every connected client

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use sandbox_app::{Broadcaster, ChannelSubscriber};
use sandbox_core::prelude::*;

/// First text frame every client receives
pub const WELCOME_MESSAGE: &str = "Welcome to the WebSocket server!";

/// Accepts WebSocket clients and registers each as a broadcast subscriber
pub struct WsServer {
    listener: TcpListener,
    broadcaster: Arc<Broadcaster>,
}

impl WsServer {
    pub async fn bind(address: &str, broadcaster: Arc<Broadcaster>) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| Error::transport(format!("failed to bind {}: {}", address, e)))?;
        Ok(Self {
            listener,
            broadcaster,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop until `shutdown` flips to true or its sender is dropped
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.serve(shutdown))
    }

    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) {
        if let Ok(address) = self.local_addr() {
            info!("WebSocket server listening on ws://{}", address);
        }

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(handle_connection(
                            stream,
                            peer,
                            Arc::clone(&self.broadcaster),
                        ));
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("WebSocket server stopped");
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, broadcaster: Arc<Broadcaster>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            debug!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    if let Err(e) = ws_sink.send(WsMessage::Text(WELCOME_MESSAGE.into())).await {
        debug!("Failed to greet {}: {}", peer, e);
        return;
    }

    let (subscriber, mut payloads) = ChannelSubscriber::channel();
    let id = broadcaster.subscribe(Arc::new(subscriber));
    info!("Client {} connected (subscriber {})", peer, id);

    loop {
        tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    debug!("Received message from {}: {}", peer, text.as_str());
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket read error from {}: {}", peer, e);
                    break;
                }
            },
            payload = payloads.recv() => match payload {
                Some(payload) => {
                    if let Err(e) = ws_sink.send(WsMessage::Text(payload.into())).await {
                        debug!("WebSocket write to {} failed: {}", peer, e);
                        break;
                    }
                }
                None => break,
            },
        }
    }

    broadcaster.unsubscribe(id);
    if let Err(e) = ws_sink.close().await {
        debug!("Close handshake with {} failed: {}", peer, e);
    }
    info!("Client {} disconnected", peer);
}
