//! Fan-out of structured events to transport subscribers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;

use sandbox_core::prelude::*;
use sandbox_core::BroadcastMessage;

use crate::debounce::DebounceBuffer;

/// Default quiet window for [`Broadcaster::buffered_broadcast`]
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(500);

/// A connected peer that receives serialized broadcast payloads
pub trait Subscriber: Send + Sync {
    fn is_open(&self) -> bool;

    fn send(&self, payload: &str) -> Result<()>;
}

/// Subscriber backed by an unbounded channel; the receiving half is drained
/// by the transport connection task.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSubscriber {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Subscriber for ChannelSubscriber {
    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    fn send(&self, payload: &str) -> Result<()> {
        self.tx
            .send(payload.to_string())
            .map_err(|_| Error::channel_send("subscriber channel closed"))
    }
}

pub type SubscriberId = u64;

#[derive(Default)]
struct Subscribers {
    entries: RwLock<Vec<(SubscriberId, Arc<dyn Subscriber>)>>,
}

impl Subscribers {
    /// Send `payload` to every open subscriber; returns how many accepted it
    fn send_all(&self, payload: &str) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        for (id, subscriber) in entries.iter() {
            if !subscriber.is_open() {
                continue;
            }
            match subscriber.send(payload) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Dropping broadcast for subscriber {}: {}", id, e),
            }
        }
        delivered
    }
}

fn encode(messages: &[BroadcastMessage]) -> Option<String> {
    match serde_json::to_string(messages) {
        Ok(payload) => Some(payload),
        Err(e) => {
            error!("Failed to encode broadcast: {}", e);
            None
        }
    }
}

/// Delivers [`BroadcastMessage`]s to every open subscriber as a JSON array.
///
/// `broadcast` sends `[message]` immediately; `buffered_broadcast` coalesces
/// messages over a cooldown window and sends them as one array. Closed
/// subscribers are skipped silently.
pub struct Broadcaster {
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
    buffer: DebounceBuffer<BroadcastMessage>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscriber_count())
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl Broadcaster {
    pub fn new(cooldown: Duration) -> Self {
        let subscribers = Arc::new(Subscribers::default());
        let sink = Arc::clone(&subscribers);
        let buffer = DebounceBuffer::new(cooldown, move |messages: Vec<BroadcastMessage>| {
            if let Some(payload) = encode(&messages) {
                let delivered = sink.send_all(&payload);
                trace!(
                    "Flushed {} buffered messages to {} subscribers",
                    messages.len(),
                    delivered
                );
            }
        });

        Self {
            subscribers,
            next_id: AtomicU64::new(1),
            buffer,
        }
    }

    /// Register a subscriber; the id is used to remove it again
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, subscriber));
        debug!("Subscriber {} connected", id);
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
        debug!("Subscriber {} disconnected", id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Send `[message]` to every open subscriber now
    pub fn broadcast(&self, message: BroadcastMessage) {
        if let Some(payload) = encode(std::slice::from_ref(&message)) {
            let delivered = self.subscribers.send_all(&payload);
            trace!("Broadcast {:?} to {} subscribers", message.event, delivered);
        }
    }

    /// Queue `message` for the next cooldown flush
    pub fn buffered_broadcast(&self, message: BroadcastMessage) {
        self.buffer.add(message);
    }

    /// Deliver buffered messages without waiting for the cooldown
    pub fn flush(&self) {
        self.buffer.flush();
    }
}
