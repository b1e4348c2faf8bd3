//! Hourly and daily averages.
//!
//! [`compute_average`] rolls the readings of one device over a trailing
//! window into a summary and classifies it. [`Aggregator`] runs that on a
//! schedule for every device that reported during the window.

use std::sync::Arc;
use std::time::Duration;

use airguard_store::{NewSummary, StoredSummary, SummaryQuery};
use airguard_types::{AirQuality, SummaryKind};
use futures::future::join_all;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};

use crate::auth::Principal;
use crate::bus::EventName;
use crate::config::{MAX_AGGREGATION_INTERVAL, MIN_AGGREGATION_INTERVAL};
use crate::error::AppError;
use crate::registry::parse_device_id;
use crate::state::AppState;

/// Body of `POST /api/average`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryInput {
    #[serde(rename = "type")]
    pub kind: SummaryKind,
    pub avg_temperature: f64,
    pub avg_humidity: f64,
    #[serde(rename = "avgTVOC")]
    pub avg_tvoc: f64,
    pub air_quality_status: AirQuality,
}

/// Average the device's readings over the trailing window of `kind`.
///
/// The window ends now. Fails with [`AppError::NoData`] when it is empty,
/// in which case nothing is stored.
pub async fn compute_average(
    state: &AppState,
    device_id: &str,
    kind: SummaryKind,
) -> Result<StoredSummary, AppError> {
    let until = OffsetDateTime::now_utc();
    let since = until - kind.window();

    let summary = {
        let store = state.store.lock().await;
        if store.get_device(device_id)?.is_none() {
            return Err(AppError::NotFound("Device not found".into()));
        }

        let averages = store
            .reading_averages(device_id, since, until)?
            .ok_or(AppError::NoData(kind.as_str()))?;

        store.insert_summary(
            device_id,
            &NewSummary {
                kind,
                avg_temperature: averages.temperature,
                avg_humidity: averages.humidity,
                avg_tvoc: averages.tvoc,
                air_quality: AirQuality::classify(averages.temperature, averages.humidity),
            },
        )?
    };

    debug!(
        "Stored {} summary for {}: {:.2}C {:.2}% {}",
        kind, device_id, summary.avg_temperature, summary.avg_humidity, summary.air_quality
    );
    state.bus.publish(EventName::NewAvgData, &summary);
    Ok(summary)
}

/// `POST /api/average/{deviceId}/compute` entry point.
pub async fn compute_average_for(
    state: &AppState,
    device_id: &str,
    kind: SummaryKind,
) -> Result<StoredSummary, AppError> {
    let device_id = parse_device_id(device_id)?;
    compute_average(state, &device_id, kind).await
}

/// Store a caller-supplied summary against the caller's connected device.
pub async fn create_summary_direct(
    state: &AppState,
    principal: &Principal,
    input: SummaryInput,
) -> Result<StoredSummary, AppError> {
    let summary = {
        let store = state.store.lock().await;
        let device = store
            .connected_device(&principal.account)?
            .ok_or(AppError::NoConnectedDevice)?;
        store.insert_summary(
            &device.id,
            &NewSummary {
                kind: input.kind,
                avg_temperature: input.avg_temperature,
                avg_humidity: input.avg_humidity,
                avg_tvoc: input.avg_tvoc,
                air_quality: input.air_quality_status,
            },
        )?
    };

    state.bus.publish(EventName::NewAvgData, &summary);
    Ok(summary)
}

/// Summaries of the caller's connected device, newest first.
pub async fn list_summaries(
    state: &AppState,
    principal: &Principal,
    kind: Option<SummaryKind>,
) -> Result<Vec<StoredSummary>, AppError> {
    let store = state.store.lock().await;
    let device = store
        .connected_device(&principal.account)?
        .ok_or(AppError::NoConnectedDevice)?;

    let mut query = SummaryQuery::new().device(&device.id);
    if let Some(kind) = kind {
        query = query.kind(kind);
    }

    let summaries = store.query_summaries(&query)?;
    if summaries.is_empty() {
        return Err(AppError::NotFound(
            "No averages found for the connected device".into(),
        ));
    }
    Ok(summaries)
}

/// Background scheduler for hourly and daily rollups.
pub struct Aggregator {
    state: Arc<AppState>,
}

impl Aggregator {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Spawn the hourly and daily loops. Returns immediately.
    pub async fn start(&self) {
        let (hourly, daily) = {
            let config = self.state.config.read().await;
            (
                config.aggregation.hourly_interval_secs,
                config.aggregation.daily_interval_secs,
            )
        };

        info!(
            "Starting aggregator (hourly every {}s, daily every {}s)",
            hourly, daily
        );

        for (kind, secs) in [(SummaryKind::Hourly, hourly), (SummaryKind::Daily, daily)] {
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                run_schedule(state, kind, schedule_period(secs)).await;
            });
        }
    }
}

/// Interval for a configured period, kept inside the accepted bounds so the
/// first deadline cannot overflow.
fn schedule_period(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(MIN_AGGREGATION_INTERVAL, MAX_AGGREGATION_INTERVAL))
}

async fn run_schedule(state: Arc<AppState>, kind: SummaryKind, period: Duration) {
    // First rollup after one full period
    let mut timer = interval_at(Instant::now() + period, period);

    loop {
        timer.tick().await;
        let stored = run_once(&state, kind).await;
        debug!("{} rollup stored {} summaries", kind, stored);
    }
}

/// Compute `kind` summaries for every device with readings in the window.
///
/// Each device runs in its own task; one failing device does not affect
/// the others. Returns the number of summaries stored.
pub async fn run_once(state: &Arc<AppState>, kind: SummaryKind) -> usize {
    let since = OffsetDateTime::now_utc() - kind.window();
    let devices = match state.store.lock().await.devices_with_readings_since(since) {
        Ok(devices) => devices,
        Err(e) => {
            error!("Failed to list devices for {} rollup: {}", kind, e);
            return 0;
        }
    };

    let tasks = devices.into_iter().map(|device_id| {
        let state = Arc::clone(state);
        tokio::spawn(async move {
            match compute_average(&state, &device_id, kind).await {
                Ok(_) => true,
                Err(AppError::NoData(_)) => {
                    debug!("No {} data for {}", kind, device_id);
                    false
                }
                Err(e) => {
                    warn!("Failed to compute {} average for {}: {}", kind, device_id, e);
                    false
                }
            }
        })
    });

    join_all(tasks)
        .await
        .into_iter()
        .filter(|result| matches!(result, Ok(true)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChannelObserver;
    use crate::config::Config;
    use airguard_store::{NewDevice, NewReading, Store};
    use airguard_types::Role;

    fn state() -> Arc<AppState> {
        AppState::new(Store::open_in_memory().unwrap(), Config::default())
    }

    async fn device(state: &AppState, name: &str, owner: &str) -> String {
        state
            .store
            .lock()
            .await
            .register_device(&NewDevice {
                name: name.into(),
                owner: owner.into(),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    async fn reading(state: &AppState, device_id: &str, t: f64, h: f64, v: f64, age: time::Duration) {
        state
            .store
            .lock()
            .await
            .insert_reading(
                device_id,
                &NewReading::new(t, h, v, AirQuality::Bad).at(OffsetDateTime::now_utc() - age),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_hourly_average_of_sample_window() {
        let state = state();
        let id = device(&state, "porch", "alice").await;
        let age = time::Duration::minutes(5);
        reading(&state, &id, 30.0, 50.0, 10.0, age).await;
        reading(&state, &id, 32.0, 55.0, 12.0, age).await;
        reading(&state, &id, 28.0, 70.0, 9.0, age).await;

        let (observer, mut events) = ChannelObserver::channel(4);
        state.bus.attach(Arc::new(observer));

        let summary = compute_average(&state, &id, SummaryKind::Hourly).await.unwrap();
        assert_eq!(summary.kind, SummaryKind::Hourly);
        assert!((summary.avg_temperature - 30.0).abs() < 1e-9);
        assert!((summary.avg_humidity - 58.333_333).abs() < 1e-3);
        assert!((summary.avg_tvoc - 31.0 / 3.0).abs() < 1e-9);
        // Reported statuses are ignored; the means decide
        assert_eq!(summary.air_quality, AirQuality::Good);

        let event: serde_json::Value =
            serde_json::from_str(&events.recv().await.unwrap()).unwrap();
        assert_eq!(event["event"], "newAvgData");
        assert_eq!(event["data"]["type"], "hourly");
    }

    #[tokio::test]
    async fn test_window_excludes_old_readings() {
        let state = state();
        let id = device(&state, "porch", "alice").await;
        reading(&state, &id, 40.0, 50.0, 1.0, time::Duration::hours(3)).await;
        reading(&state, &id, 20.0, 75.0, 1.0, time::Duration::minutes(1)).await;

        // Only the recent reading: 20C, 75%
        let hourly = compute_average(&state, &id, SummaryKind::Hourly).await.unwrap();
        assert!((hourly.avg_temperature - 20.0).abs() < 1e-9);
        assert_eq!(hourly.air_quality, AirQuality::Fair);

        // Both readings: 30C is not above 30, 62.5% is above 60
        let daily = compute_average(&state, &id, SummaryKind::Daily).await.unwrap();
        assert!((daily.avg_temperature - 30.0).abs() < 1e-9);
        assert!((daily.avg_humidity - 62.5).abs() < 1e-9);
        assert_eq!(daily.air_quality, AirQuality::Fair);
    }

    #[tokio::test]
    async fn test_daily_means_at_thresholds_are_good() {
        let state = state();
        let id = device(&state, "porch", "alice").await;
        reading(&state, &id, 40.0, 50.0, 1.0, time::Duration::hours(3)).await;
        reading(&state, &id, 20.0, 65.0, 1.0, time::Duration::minutes(1)).await;

        // Means 30C and 57.5%: neither exceeds its threshold
        let daily = compute_average(&state, &id, SummaryKind::Daily).await.unwrap();
        assert!((daily.avg_humidity - 57.5).abs() < 1e-9);
        assert_eq!(daily.air_quality, AirQuality::Good);
    }

    #[tokio::test]
    async fn test_empty_window_is_no_data() {
        let state = state();
        let id = device(&state, "porch", "alice").await;
        reading(&state, &id, 20.0, 40.0, 1.0, time::Duration::hours(2)).await;

        let err = compute_average(&state, &id, SummaryKind::Hourly).await.unwrap_err();
        assert!(matches!(err, AppError::NoData("hourly")));
        assert_eq!(state.store.lock().await.count_summaries(None).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_compute_for_unknown_or_malformed_device() {
        let state = state();
        assert!(matches!(
            compute_average_for(&state, "nope", SummaryKind::Hourly).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            compute_average_for(&state, &uuid::Uuid::new_v4().to_string(), SummaryKind::Daily)
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_run_once_covers_active_devices_only() {
        let state = state();
        let active = device(&state, "a", "alice").await;
        let other = device(&state, "b", "bob").await;
        let stale = device(&state, "c", "carol").await;
        reading(&state, &active, 20.0, 40.0, 1.0, time::Duration::minutes(2)).await;
        reading(&state, &other, 35.0, 40.0, 1.0, time::Duration::minutes(2)).await;
        reading(&state, &stale, 20.0, 40.0, 1.0, time::Duration::hours(5)).await;

        assert_eq!(run_once(&state, SummaryKind::Hourly).await, 2);
        assert_eq!(run_once(&state, SummaryKind::Daily).await, 3);

        let store = state.store.lock().await;
        assert_eq!(store.count_summaries(Some(&stale)).unwrap(), 1);
        let bad = store
            .query_summaries(&SummaryQuery::new().device(&other).kind(SummaryKind::Hourly))
            .unwrap();
        assert_eq!(bad[0].air_quality, AirQuality::Bad);
    }

    #[tokio::test]
    async fn test_direct_summary_and_listing() {
        let state = state();
        let alice = Principal::new("alice", Role::User);
        let input = |kind| SummaryInput {
            kind,
            avg_temperature: 25.0,
            avg_humidity: 50.0,
            avg_tvoc: 4.0,
            air_quality_status: AirQuality::Fair,
        };

        assert!(matches!(
            create_summary_direct(&state, &alice, input(SummaryKind::Hourly)).await,
            Err(AppError::NoConnectedDevice)
        ));
        assert!(matches!(
            list_summaries(&state, &alice, None).await,
            Err(AppError::NoConnectedDevice)
        ));

        let id = device(&state, "porch", "alice").await;
        assert!(matches!(
            list_summaries(&state, &alice, None).await,
            Err(AppError::NotFound(_))
        ));

        let stored = create_summary_direct(&state, &alice, input(SummaryKind::Daily))
            .await
            .unwrap();
        // Stored verbatim, no reclassification
        assert_eq!(stored.air_quality, AirQuality::Fair);
        assert_eq!(stored.device_id, id);
        create_summary_direct(&state, &alice, input(SummaryKind::Hourly))
            .await
            .unwrap();

        assert_eq!(list_summaries(&state, &alice, None).await.unwrap().len(), 2);
        let daily = list_summaries(&state, &alice, Some(SummaryKind::Daily))
            .await
            .unwrap();
        assert_eq!(daily.len(), 1);
    }

    #[test]
    fn test_schedule_period_is_bounded() {
        assert_eq!(schedule_period(3600), Duration::from_secs(3600));
        assert_eq!(schedule_period(0), Duration::from_secs(MIN_AGGREGATION_INTERVAL));
        assert_eq!(
            schedule_period(u64::MAX),
            Duration::from_secs(MAX_AGGREGATION_INTERVAL)
        );
        // The bounded period is safe to add to a deadline
        assert!(Instant::now().checked_add(schedule_period(u64::MAX)).is_some());
    }

    #[test]
    fn test_summary_input_deserializes() {
        let input: SummaryInput = serde_json::from_str(
            r#"{"type":"hourly","avgTemperature":21,"avgHumidity":40,"avgTVOC":2,"airQualityStatus":"Good"}"#,
        )
        .unwrap();
        assert_eq!(input.kind, SummaryKind::Hourly);
        assert_eq!(input.avg_tvoc, 2.0);
    }
}
