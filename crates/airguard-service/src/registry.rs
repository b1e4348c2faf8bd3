//! Device registry operations.
//!
//! The store makes every connected-flag change atomic. This layer adds
//! input validation, role checks and the follow-up side effects: relay
//! commands to the gateway and `deviceUpdated` events on the bus.

use airguard_store::{DeletedDevice, DevicePatch, NewDevice, StoredDevice};
use airguard_types::OperationDuration;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::Principal;
use crate::bus::EventName;
use crate::error::AppError;
use crate::state::AppState;

/// Longest accepted device name, in characters.
pub const MAX_NAME_LENGTH: usize = 64;

/// Body of `POST /api/device`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDevice {
    pub name: String,
    #[serde(default)]
    pub relay_state: bool,
    #[serde(default)]
    pub operation_duration: Option<OperationDuration>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Body of `PATCH /api/device/{id}/enable-disable`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetConnected {
    pub is_connected: bool,
}

/// Check a device id is a well-formed UUID.
pub fn parse_device_id(id: &str) -> Result<String, AppError> {
    Uuid::parse_str(id)
        .map(|uuid| uuid.to_string())
        .map_err(|_| AppError::Validation("Invalid Id format, try again".into()))
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Device name cannot be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::Validation(format!(
            "Device name is too long (maximum {} characters)",
            MAX_NAME_LENGTH
        )));
    }
    Ok(name.to_string())
}

/// Register a device as the caller's connected device.
pub async fn register_device(
    state: &AppState,
    principal: &Principal,
    request: RegisterDevice,
) -> Result<StoredDevice, AppError> {
    let new = NewDevice {
        name: validate_name(&request.name)?,
        owner: principal.account.clone(),
        relay_state: request.relay_state,
        operation_duration: request.operation_duration.unwrap_or_default(),
        location: request.location,
    };

    let device = state.store.lock().await.register_device(&new)?;
    Ok(device)
}

/// All devices for admins, the caller's own devices otherwise.
pub async fn list_devices(
    state: &AppState,
    principal: &Principal,
) -> Result<Vec<StoredDevice>, AppError> {
    let owner = (!principal.is_admin()).then_some(principal.account.as_str());
    let devices = state.store.lock().await.list_devices(owner)?;
    Ok(devices)
}

pub async fn get_device(state: &AppState, id: &str) -> Result<StoredDevice, AppError> {
    let id = parse_device_id(id)?;
    state
        .store
        .lock()
        .await
        .get_device(&id)?
        .ok_or_else(|| AppError::NotFound("Device not found".into()))
}

/// Apply a patch to one of the caller's devices.
///
/// A patch carrying `relayState` is forwarded to the gateway as a relay
/// command, with the patch's duration or the default. Every successful
/// update is published as `deviceUpdated`.
pub async fn update_device(
    state: &AppState,
    principal: &Principal,
    id: &str,
    mut patch: DevicePatch,
) -> Result<StoredDevice, AppError> {
    let id = parse_device_id(id)?;
    if let Some(ref name) = patch.name {
        patch.name = Some(validate_name(name)?);
    }

    let device = state
        .store
        .lock()
        .await
        .update_device(&principal.account, &id, &patch)?;

    if let Some(relay_state) = patch.relay_state {
        state
            .gateway
            .send_command(relay_state, patch.operation_duration);
    }
    state.bus.publish(EventName::DeviceUpdated, &device);

    Ok(device)
}

/// Enable or disable any device. Admin only.
pub async fn admin_set_connected(
    state: &AppState,
    principal: &Principal,
    id: &str,
    is_connected: bool,
) -> Result<StoredDevice, AppError> {
    if !principal.is_admin() {
        return Err(AppError::Forbidden("Admin access required".into()));
    }
    let id = parse_device_id(id)?;

    let device = state.store.lock().await.set_connected(&id, is_connected)?;
    info!(
        "{} set device {} connected={}",
        principal.account, device.id, is_connected
    );

    state.bus.publish(EventName::DeviceUpdated, &device);
    Ok(device)
}

/// Delete one of the caller's devices.
///
/// A device promoted to connected as a result is published as `deviceUpdated`.
pub async fn delete_device(
    state: &AppState,
    principal: &Principal,
    id: &str,
) -> Result<DeletedDevice, AppError> {
    let id = parse_device_id(id)?;
    let deleted = state
        .store
        .lock()
        .await
        .delete_device(&principal.account, &id)?;

    if let Some(ref promoted) = deleted.promoted {
        state.bus.publish(EventName::DeviceUpdated, promoted);
    }
    Ok(deleted)
}
