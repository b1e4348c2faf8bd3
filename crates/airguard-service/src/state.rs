//! Application state shared across handlers.
//!
//! # Locking
//!
//! - `store` is a tokio `Mutex`; hold it only for the synchronous store call.
//! - `gateway` and `bus` guard their own membership internally and never
//!   hold a lock across an await.
//! - Side effects (relay commands, bus events) are issued after the store
//!   lock is released.

use std::sync::Arc;

use airguard_store::Store;
use tokio::sync::{Mutex, RwLock};

use crate::auth::{Authenticator, StaticTokens};
use crate::bus::Bus;
use crate::config::Config;
use crate::gateway::Gateway;

/// Shared application state.
pub struct AppState {
    /// The data store.
    pub store: Mutex<Store>,
    /// Configuration.
    pub config: RwLock<Config>,
    /// The single device gateway session.
    pub gateway: Gateway,
    /// Observer fan-out.
    pub bus: Bus,
    /// Bearer token resolution.
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// Create state that authenticates against the configured token table.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        let auth = Arc::new(StaticTokens::from_config(&config.auth));
        Self::with_authenticator(store, config, auth)
    }

    /// Create state with an external authenticator.
    pub fn with_authenticator(
        store: Store,
        config: Config,
        auth: Arc<dyn Authenticator>,
    ) -> Arc<Self> {
        let gateway = Gateway::new(config.gateway.send_timeout(), config.gateway.queue_size);
        let bus = Bus::new(
            config.broadcast.delivery_timeout(),
            config.broadcast.observer_buffer,
        );
        Arc::new(Self {
            store: Mutex::new(store),
            config: RwLock::new(config),
            gateway,
            bus,
            auth,
        })
    }
}
