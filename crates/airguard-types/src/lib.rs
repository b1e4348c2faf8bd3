//! Shared types for the airguard device gateway.
//!
//! This crate holds the values that the store, the HTTP service and the
//! device firmware all agree on:
//!
//! - [`OperationDuration`], the fixed set of relay hold times
//! - [`AirQuality`] and its classification rule
//! - [`SummaryKind`], the hourly/daily rollup windows
//! - [`Role`] of an authenticated account
//! - the gateway wire messages in [`messages`] (with the `serde` feature)
//!
//! # Example
//!
//! ```
//! use airguard_types::{AirQuality, OperationDuration, SummaryKind};
//!
//! let duration: OperationDuration = "30min".parse().unwrap();
//! assert_eq!(duration.as_duration().as_secs(), 1800);
//! assert_eq!(SummaryKind::Hourly.window().as_secs(), 3600);
//! assert_eq!(AirQuality::classify(22.0, 45.0), AirQuality::Good);
//! ```

pub mod error;
#[cfg(feature = "serde")]
pub mod messages;
pub mod types;

pub use error::{ParseError, ParseResult};
#[cfg(feature = "serde")]
pub use messages::{CredentialDelivery, GatewayMessage, RelayCommand};
pub use types::{AirQuality, OperationDuration, Role, SummaryKind};
