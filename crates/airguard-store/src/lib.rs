//! Local persistence for airguard devices, readings and summaries.
//!
//! This crate provides SQLite-based storage and is the one place where the
//! "at most one connected device per owner" rule is enforced atomically.
//!
//! # Features
//!
//! - Device registration, update, enable/disable and deletion with promotion
//! - Raw readings with windowed averages
//! - Hourly and daily summaries
//! - Query builders with time range and pagination
//!
//! # Example
//!
//! ```
//! use airguard_store::{NewDevice, Store};
//!
//! let mut store = Store::open_in_memory()?;
//! let device = store.register_device(&NewDevice {
//!     name: "greenhouse".into(),
//!     owner: "alice".into(),
//!     ..Default::default()
//! })?;
//! assert!(device.is_connected);
//! # Ok::<(), airguard_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{
    DeletedDevice, DevicePatch, NewDevice, NewReading, NewSummary, StoredDevice, StoredReading,
    StoredSummary,
};
pub use queries::{ReadingQuery, SummaryQuery};
pub use store::{ReadingAverages, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/airguard/data.db`
/// - macOS: `~/Library/Application Support/airguard/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\airguard\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("airguard")
        .join("data.db")
}
