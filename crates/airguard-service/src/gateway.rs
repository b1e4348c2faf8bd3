//! The single device gateway session.
//!
//! One physical device at a time holds the gateway. A new attach replaces
//! the current session, which drops its outbound queue; that session's writer
//! then sees the queue close and shuts its socket. Sends are best effort:
//! the frame is queued from a spawned task bounded by the send timeout, and
//! failures only produce a warning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use airguard_types::{CredentialDelivery, GatewayMessage, OperationDuration, RelayCommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct SessionHandle {
    id: u64,
    tx: mpsc::Sender<String>,
}

/// The receiving half of an attached session, owned by its socket writer.
#[derive(Debug)]
pub struct GatewaySession {
    /// Monotonic session id, used to detach only the current session.
    pub id: u64,
    /// Outbound JSON frames for the device.
    pub outbound: mpsc::Receiver<String>,
}

/// Holds at most one live device session for the whole process.
#[derive(Debug)]
pub struct Gateway {
    slot: Mutex<Option<SessionHandle>>,
    next_id: AtomicU64,
    send_timeout: Duration,
    queue_size: usize,
}

impl Gateway {
    pub fn new(send_timeout: Duration, queue_size: usize) -> Self {
        Self {
            slot: Mutex::new(None),
            next_id: AtomicU64::new(1),
            send_timeout,
            queue_size: queue_size.max(1),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a new session, replacing any current one.
    pub fn attach(&self) -> GatewaySession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, outbound) = mpsc::channel(self.queue_size);

        let previous = self.slot().replace(SessionHandle { id, tx });
        match previous {
            Some(old) => info!("Device session {} attached, replacing session {}", id, old.id),
            None => info!("Device session {} attached", id),
        }

        GatewaySession { id, outbound }
    }

    /// Clear the slot if `session_id` is still the current session.
    ///
    /// Returns whether the slot was cleared.
    pub fn detach(&self, session_id: u64) -> bool {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(current) if current.id == session_id => {
                *slot = None;
                info!("Device session {} detached", session_id);
                true
            }
            _ => {
                debug!("Ignoring detach of superseded session {}", session_id);
                false
            }
        }
    }

    pub fn is_attached(&self) -> bool {
        self.slot().is_some()
    }

    /// Whether `session_id` is the session currently holding the slot.
    pub fn is_current(&self, session_id: u64) -> bool {
        self.slot().as_ref().is_some_and(|s| s.id == session_id)
    }

    /// Id of the current session, if any.
    pub fn current_session(&self) -> Option<u64> {
        self.slot().as_ref().map(|s| s.id)
    }

    /// Deliver an account token to the device.
    pub fn send_credential(&self, token: &str) -> Option<JoinHandle<bool>> {
        self.dispatch(CredentialDelivery::new(token).into())
    }

    /// Forward a relay command to the device. A missing duration means the default.
    pub fn send_command(
        &self,
        relay_state: bool,
        operation_duration: Option<OperationDuration>,
    ) -> Option<JoinHandle<bool>> {
        self.dispatch(RelayCommand::new(relay_state, operation_duration).into())
    }

    /// Queue a message for the current session from a spawned task.
    ///
    /// Returns `None` when nothing was dispatched. The handle resolves to
    /// whether the frame was queued before the timeout.
    fn dispatch(&self, message: GatewayMessage) -> Option<JoinHandle<bool>> {
        let kind = message.kind();
        let Some(session) = self.slot().clone() else {
            warn!("No device attached, dropping {} message", kind);
            return None;
        };

        let frame = match message.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode {} message: {}", kind, e);
                return None;
            }
        };

        let timeout = self.send_timeout;
        Some(tokio::spawn(async move {
            match tokio::time::timeout(timeout, session.tx.send(frame)).await {
                Ok(Ok(())) => {
                    debug!("Queued {} message for session {}", kind, session.id);
                    true
                }
                Ok(Err(_)) => {
                    warn!(
                        "Device session {} closed before {} message was sent",
                        session.id, kind
                    );
                    false
                }
                Err(_) => {
                    warn!(
                        "Timed out sending {} message to session {} after {:?}",
                        kind, session.id, timeout
                    );
                    false
                }
            }
        }))
    }
}
