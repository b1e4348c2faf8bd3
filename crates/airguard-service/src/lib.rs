//! Device gateway, broadcast bus and HTTP REST API for airguard sensors.
//!
//! This crate provides a service that:
//! - Keeps a registry of devices with one connected device per account
//! - Holds a single WebSocket session to the relay device and forwards
//!   credentials and relay commands to it
//! - Stores sensor readings and computes hourly and daily averages
//! - Pushes registry, reading and average events to WebSocket observers
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check (no auth required)
//! - `POST /api/auth/login` - Confirm a token and deliver it to the device
//! - `POST /api/device`, `GET /api/device` - Register and list devices
//! - `GET|PUT|DELETE /api/device/{id}` - Device lookup, update and removal
//! - `PATCH /api/device/{id}/enable-disable` - Admin connect toggle
//! - `POST /api/sensorData`, `GET /api/sensorData`, `GET /api/sensorData/latest`
//! - `POST /api/average`, `GET /api/average?type=hourly|daily`
//! - `POST /api/average/{deviceId}/compute?type=hourly|daily`
//! - `WS /esp32` - Device gateway session
//! - `WS /api/ws` - Event stream for observers
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/airguard/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [gateway]
//! path = "/esp32"
//! send_timeout_ms = 5000
//!
//! [aggregation]
//! hourly_interval_secs = 3600
//! daily_interval_secs = 86400
//!
//! [[auth.tokens]]
//! token = "a-long-random-bearer-token"
//! account = "alice"
//! role = "admin"
//! ```

pub mod aggregator;
pub mod api;
pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod registry;
pub mod state;
pub mod ws;

pub use aggregator::Aggregator;
pub use auth::{Authenticator, Principal, StaticTokens};
pub use bus::{Bus, EventName, Observer};
pub use config::{
    AggregationConfig, AuthConfig, BroadcastConfig, Config, ConfigError, GatewayConfig,
    ServerConfig, StorageConfig, TokenConfig,
};
pub use error::AppError;
pub use gateway::Gateway;
pub use state::AppState;
