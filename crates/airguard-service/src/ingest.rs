//! Sensor reading ingestion.

use airguard_store::{NewReading, ReadingQuery, StoredReading};
use airguard_types::AirQuality;
use serde::Deserialize;
use tracing::debug;

use crate::auth::Principal;
use crate::bus::EventName;
use crate::error::AppError;
use crate::state::AppState;

/// Body of `POST /api/sensorData`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingInput {
    pub temperature: f64,
    pub humidity: f64,
    pub tvoc: f64,
    pub air_quality_status: AirQuality,
}

impl ReadingInput {
    fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("tvoc", self.tvoc),
        ] {
            if !value.is_finite() {
                return Err(AppError::Validation(format!("{} must be a finite number", field)));
            }
        }
        Ok(())
    }
}

/// Store a reading against the caller's connected device and publish it.
pub async fn ingest_reading(
    state: &AppState,
    principal: &Principal,
    input: ReadingInput,
) -> Result<StoredReading, AppError> {
    input.validate()?;

    let reading = {
        let store = state.store.lock().await;
        let device = store
            .connected_device(&principal.account)?
            .ok_or(AppError::NoConnectedDevice)?;
        store.insert_reading(
            &device.id,
            &NewReading::new(
                input.temperature,
                input.humidity,
                input.tvoc,
                input.air_quality_status,
            ),
        )?
    };

    debug!("Stored reading {} for device {}", reading.id, reading.device_id);
    state.bus.publish(EventName::NewSensorData, &reading);
    Ok(reading)
}

/// Every reading, newest first.
pub async fn list_readings(state: &AppState) -> Result<Vec<StoredReading>, AppError> {
    let readings = state
        .store
        .lock()
        .await
        .query_readings(&ReadingQuery::new())?;
    Ok(readings)
}

/// The newest reading of the caller's connected device.
pub async fn latest_reading(
    state: &AppState,
    principal: &Principal,
) -> Result<StoredReading, AppError> {
    let store = state.store.lock().await;
    let device = store
        .connected_device(&principal.account)?
        .ok_or(AppError::NoConnectedDevice)?;

    store
        .get_latest_reading(&device.id)?
        .ok_or_else(|| AppError::NotFound("No data found for the connected device".into()))
}
