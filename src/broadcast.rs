//! # Broadcast Hub
//!
//! Best-effort fan-out of telemetry messages to UI subscribers.
//!
//! A transport (e.g. a WebSocket server) registers one [`Subscriber`] per
//! connected client. Every message is serialized once and offered to each
//! subscriber; a slow or broken subscriber loses the message, others are not
//! affected and the caller never sees an error. Closed subscribers are
//! dropped on the next broadcast.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::record::{MessageType, Record};

/// Default limit of concurrent subscribers
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 3;

/// Why a single delivery failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubscriberError {
    #[error("subscriber queue is full")]
    Full,

    #[error("subscriber is closed")]
    Closed,
}

/// Receiving end of broadcast messages
#[cfg_attr(test, mockall::automock)]
pub trait Subscriber: Send {
    /// Deliver one serialized message without blocking
    fn send(&self, message: &str) -> std::result::Result<(), SubscriberError>;

    /// Whether the subscriber is gone for good
    fn is_closed(&self) -> bool;
}

/// Subscriber backed by a bounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::Sender<String>,
}

impl ChannelSubscriber {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

impl Subscriber for ChannelSubscriber {
    fn send(&self, message: &str) -> std::result::Result<(), SubscriberError> {
        self.tx.try_send(message.to_string()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SubscriberError::Full,
            mpsc::error::TrySendError::Closed(_) => SubscriberError::Closed,
        })
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Handle identifying a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    message_type: MessageType,
    payload: &'a Value,
}

struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriberId, Box<dyn Subscriber>)>,
}

/// Fan-out point between telemetry jobs and UI transports
pub struct BroadcastHub {
    subscribers: Mutex<Subscribers>,
    max_subscribers: usize,
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("subscribers", &self.len())
            .field("max_subscribers", &self.max_subscribers)
            .finish()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUBSCRIBERS)
    }
}

impl BroadcastHub {
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            subscribers: Mutex::new(Subscribers {
                next_id: 0,
                entries: Vec::new(),
            }),
            max_subscribers,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::TooManySubscribers`] when the limit is reached
    pub fn subscribe(&self, subscriber: Box<dyn Subscriber>) -> Result<SubscriberId> {
        let mut subscribers = self.lock();
        subscribers.entries.retain(|(_, s)| !s.is_closed());

        if subscribers.entries.len() >= self.max_subscribers {
            warn!(
                "Too many subscribers: {} (limit {})",
                subscribers.entries.len(),
                self.max_subscribers
            );
            return Err(TelemetryError::TooManySubscribers(self.max_subscribers));
        }

        let id = SubscriberId(subscribers.next_id);
        subscribers.next_id += 1;
        subscribers.entries.push((id, subscriber));
        info!("New subscriber {:?} ({} total)", id, subscribers.entries.len());
        Ok(id)
    }

    /// Register a channel subscriber and return its receiving end
    ///
    /// # Examples
    ///
    /// ```
    /// use greybike::broadcast::BroadcastHub;
    /// use greybike::record::MessageType;
    ///
    /// let hub = BroadcastHub::new(3);
    /// let (_id, mut rx) = hub.subscribe_channel(16)?;
    /// hub.broadcast(MessageType::Event, serde_json::json!({"log": "rotated"}));
    /// assert!(rx.try_recv().is_ok());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn subscribe_channel(&self, queue: usize) -> Result<(SubscriberId, mpsc::Receiver<String>)> {
        let (tx, rx) = mpsc::channel(queue.max(1));
        let id = self.subscribe(Box::new(ChannelSubscriber::new(tx)))?;
        Ok((id, rx))
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.entries.len();
        subscribers.entries.retain(|(sid, _)| *sid != id);
        let removed = subscribers.entries.len() != before;
        if removed {
            info!("Subscriber {:?} removed", id);
        }
        removed
    }

    /// Send a message to every subscriber
    ///
    /// Returns the number of successful deliveries.
    pub fn broadcast(&self, message_type: MessageType, payload: Value) -> usize {
        let envelope = Envelope {
            message_type,
            payload: &payload,
        };
        let text = match serde_json::to_string(&envelope) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize {} message: {}", message_type, e);
                return 0;
            }
        };

        let mut subscribers = self.lock();
        let mut delivered = 0;
        subscribers.entries.retain(|(id, subscriber)| match subscriber.send(&text) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(SubscriberError::Full) => {
                debug!("Subscriber {:?} is lagging, dropped {} message", id, message_type);
                true
            }
            Err(SubscriberError::Closed) => {
                info!("Subscriber {:?} closed, removing", id);
                false
            }
        });
        delivered
    }

    /// Serialize a record and broadcast it under its own message type
    pub fn broadcast_record<T: Record>(&self, record: &T) -> usize {
        match serde_json::to_value(record) {
            Ok(payload) => self.broadcast(record.message_type(), payload),
            Err(e) => {
                warn!("Failed to serialize {} record: {}", record.message_type(), e);
                0
            }
        }
    }

    /// Number of registered subscribers
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_subscribers(&self) -> usize {
        self.max_subscribers
    }
}
