//! Broadcast bus for observers.
//!
//! Every published event goes to every attached observer. Each observer has
//! its own queue and delivery task, and every delivery runs under a timeout,
//! so a slow or broken observer never delays the publisher or the other
//! observers. Failures are logged and otherwise dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Names of the events published on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    /// The account list changed. Published by the account collaborator.
    UserListUpdated,
    /// A device record changed.
    DeviceUpdated,
    /// A raw reading was stored.
    NewSensorData,
    /// A summary was stored.
    NewAvgData,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::UserListUpdated => "userListUpdated",
            EventName::DeviceUpdated => "deviceUpdated",
            EventName::NewSensorData => "newSensorData",
            EventName::NewAvgData => "newAvgData",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event as observers receive it: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusEvent {
    pub event: EventName,
    pub data: serde_json::Value,
}

impl BusEvent {
    pub fn new<T: Serialize>(event: EventName, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            event,
            data: serde_json::to_value(payload)?,
        })
    }

    /// The JSON text frame sent to WebSocket observers.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Why a delivery to one observer failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("observer is closed")]
    Closed,
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Something that wants to hear about bus events.
#[async_trait]
pub trait Observer: Send + Sync {
    async fn notify(&self, event: &BusEvent) -> Result<(), DeliveryError>;
}

/// Observer backed by a bounded channel of JSON frames.
///
/// Used for WebSocket clients: the connection's writer task owns the receiver.
pub struct ChannelObserver {
    tx: mpsc::Sender<String>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Create an observer and the receiver its frames arrive on.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Observer for ChannelObserver {
    async fn notify(&self, event: &BusEvent) -> Result<(), DeliveryError> {
        let frame = event.to_frame()?;
        self.tx.send(frame).await.map_err(|_| DeliveryError::Closed)
    }
}

/// Handle returned by [`Bus::attach`], used to detach later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Fan-out of domain events to the attached observers.
///
/// Each observer owns a bounded queue drained by its own delivery task, so
/// events reach an observer in publish order. Publishing never waits: a full
/// queue drops the event for that observer only.
pub struct Bus {
    observers: RwLock<HashMap<u64, mpsc::Sender<Arc<BusEvent>>>>,
    next_id: AtomicU64,
    delivery_timeout: Duration,
    queue_size: usize,
}

impl Bus {
    pub fn new(delivery_timeout: Duration, queue_size: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            delivery_timeout,
            queue_size: queue_size.max(1),
        }
    }

    /// Attach an observer and start its delivery task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, queue) = mpsc::channel(self.queue_size);
        tokio::spawn(deliver(id, observer, queue, self.delivery_timeout));

        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        debug!("Observer {} attached", id);
        ObserverId(id)
    }

    /// Returns whether the observer was attached.
    ///
    /// Events already queued for the observer are still delivered.
    pub fn detach(&self, id: ObserverId) -> bool {
        let removed = self
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id.0)
            .is_some();
        if removed {
            debug!("Observer {} detached", id.0);
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Publish a payload under an event name.
    ///
    /// Returns how many observers the event was queued for.
    pub fn publish<T: Serialize>(&self, event: EventName, payload: &T) -> usize {
        match BusEvent::new(event, payload) {
            Ok(event) => self.publish_event(event),
            Err(e) => {
                warn!("Failed to encode {} payload: {}", event, e);
                0
            }
        }
    }

    /// Publish a prepared event.
    pub fn publish_event(&self, event: BusEvent) -> usize {
        let event = Arc::new(event);
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);

        if observers.is_empty() {
            debug!("No observers for {}", event.event);
            return 0;
        }

        let mut queued = 0;
        for (id, queue) in observers.iter() {
            match queue.try_send(Arc::clone(&event)) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Observer {} is falling behind, dropping {}", id, event.event);
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Observer {} delivery stopped, dropping {}", id, event.event);
                }
            }
        }
        queued
    }
}

/// Drain one observer's queue in order, each delivery under the timeout.
async fn deliver(
    id: u64,
    observer: Arc<dyn Observer>,
    mut queue: mpsc::Receiver<Arc<BusEvent>>,
    timeout: Duration,
) {
    while let Some(event) = queue.recv().await {
        match tokio::time::timeout(timeout, observer.notify(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Failed to deliver {} to observer {}: {}", event.event, id, e);
            }
            Err(_) => {
                warn!(
                    "Timed out delivering {} to observer {} after {:?}",
                    event.event, id, timeout
                );
            }
        }
    }
    debug!("Observer {} delivery finished", id);
}
