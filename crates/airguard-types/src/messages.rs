//! Messages the server pushes to the device over its gateway session.
//!
//! Two frames exist, both JSON text:
//!
//! - credential delivery: `{"type":"userToken","token":"..."}`
//! - relay command: `{"relayState":true,"operationDuration":"30min"}`
//!
//! The relay command carries no `type` field; the device tells the two apart
//! by the keys present.

use serde::{Deserialize, Serialize};

use crate::types::OperationDuration;

/// Tag value of a credential delivery frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialKind {
    #[serde(rename = "userToken")]
    UserToken,
}

/// Hands the bearer token of a freshly authenticated account to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDelivery {
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    pub token: String,
}

impl CredentialDelivery {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::UserToken,
            token: token.into(),
        }
    }
}

/// Instructs the device to hold its relay in a state for a bounded time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayCommand {
    pub relay_state: bool,
    #[serde(default)]
    pub operation_duration: OperationDuration,
}

impl RelayCommand {
    /// Build a command, falling back to the default duration when none is given.
    pub fn new(relay_state: bool, operation_duration: Option<OperationDuration>) -> Self {
        Self {
            relay_state,
            operation_duration: operation_duration.unwrap_or_default(),
        }
    }
}

/// Any frame the server may send to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GatewayMessage {
    Credential(CredentialDelivery),
    Relay(RelayCommand),
}

impl GatewayMessage {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayMessage::Credential(_) => "credential",
            GatewayMessage::Relay(_) => "relay",
        }
    }

    /// Encode the frame as the JSON text sent on the session.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<CredentialDelivery> for GatewayMessage {
    fn from(msg: CredentialDelivery) -> Self {
        GatewayMessage::Credential(msg)
    }
}

impl From<RelayCommand> for GatewayMessage {
    fn from(msg: RelayCommand) -> Self {
        GatewayMessage::Relay(msg)
    }
}
