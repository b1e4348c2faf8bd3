//! REST API endpoints for the airguard service.
//!
//! Every route except `/api/health` requires a bearer token, resolved by the
//! [`Authenticated`] extractor. Handlers are thin: they parse the request,
//! call into [`registry`](crate::registry), [`ingest`](crate::ingest) or
//! [`aggregator`](crate::aggregator), and wrap the result in [`ApiResponse`].
//!
//! ## Error Handling
//!
//! Failures are [`AppError`] values and share the `{success, message}`
//! envelope. Store errors without a domain meaning return HTTP 500.
//!
//! # Example
//!
//! ```ignore
//! use airguard_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use airguard_store::DevicePatch;
use airguard_types::SummaryKind;
use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;

use crate::aggregator::{self, SummaryInput};
use crate::auth::{self, Authenticated};
use crate::error::AppError;
use crate::ingest::{self, ReadingInput};
use crate::registry::{self, RegisterDevice, SetConnected};
use crate::state::AppState;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/login", post(auth::login))
        // Device registry
        .route("/api/device", post(register_device).get(list_devices))
        .route(
            "/api/device/{id}",
            get(get_device).put(update_device).delete(delete_device),
        )
        .route("/api/device/{id}/enable-disable", patch(set_connected))
        // Readings
        .route("/api/sensorData", post(post_reading).get(list_readings))
        .route("/api/sensorData/latest", get(latest_reading))
        // Summaries
        .route("/api/average", post(post_summary).get(list_summaries))
        .route("/api/average/{device_id}/compute", post(compute_summary))
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    #[serde(skip)]
    status: StatusCode,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// `200 OK` carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            success: true,
            message: None,
            data: Some(data),
        }
    }

    /// `201 Created` carrying `data`.
    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl ApiResponse<()> {
    /// `200 OK` with only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// JSON body extractor whose rejections use the error envelope.
///
/// A malformed body or a missing or mistyped field is a 400.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Query string extractor whose rejections use the error envelope.
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Whether a device gateway session is attached.
    pub device_attached: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        device_attached: state.gateway.is_attached(),
    })
}

async fn register_device(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    ApiJson(request): ApiJson<RegisterDevice>,
) -> Result<impl IntoResponse, AppError> {
    let device = registry::register_device(&state, &auth.principal, request).await?;
    Ok(ApiResponse::created(device).with_message("Device added"))
}

async fn list_devices(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
) -> Result<impl IntoResponse, AppError> {
    let devices = registry::list_devices(&state, &auth.principal).await?;
    Ok(ApiResponse::ok(devices))
}

async fn get_device(
    State(state): State<Arc<AppState>>,
    _auth: Authenticated,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let device = registry::get_device(&state, &id).await?;
    Ok(ApiResponse::ok(device))
}

async fn update_device(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<DevicePatch>,
) -> Result<impl IntoResponse, AppError> {
    let device = registry::update_device(&state, &auth.principal, &id, patch).await?;
    Ok(ApiResponse::ok(device).with_message("Device updated"))
}

async fn delete_device(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    registry::delete_device(&state, &auth.principal, &id).await?;
    Ok(ApiResponse::message("Device deleted successfully"))
}

async fn set_connected(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<SetConnected>,
) -> Result<impl IntoResponse, AppError> {
    let device =
        registry::admin_set_connected(&state, &auth.principal, &id, request.is_connected).await?;
    let message = if device.is_connected {
        "Device enabled"
    } else {
        "Device disabled"
    };
    Ok(ApiResponse::ok(device).with_message(message))
}

async fn post_reading(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    ApiJson(input): ApiJson<ReadingInput>,
) -> Result<impl IntoResponse, AppError> {
    let reading = ingest::ingest_reading(&state, &auth.principal, input).await?;
    Ok(ApiResponse::created(reading).with_message("Sensor data saved successfully"))
}

async fn list_readings(
    State(state): State<Arc<AppState>>,
    _auth: Authenticated,
) -> Result<impl IntoResponse, AppError> {
    let readings = ingest::list_readings(&state).await?;
    Ok(ApiResponse::ok(readings))
}

async fn latest_reading(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
) -> Result<impl IntoResponse, AppError> {
    let reading = ingest::latest_reading(&state, &auth.principal).await?;
    Ok(ApiResponse::ok(reading))
}

/// `?type=hourly|daily`.
#[derive(Debug, Default, Deserialize)]
pub struct KindQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl KindQuery {
    fn parse(&self) -> Result<Option<SummaryKind>, AppError> {
        self.kind
            .as_deref()
            .map(|kind| {
                kind.parse::<SummaryKind>()
                    .map_err(|e| AppError::Validation(e.to_string()))
            })
            .transpose()
    }
}

async fn post_summary(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    ApiJson(input): ApiJson<SummaryInput>,
) -> Result<impl IntoResponse, AppError> {
    let summary = aggregator::create_summary_direct(&state, &auth.principal, input).await?;
    Ok(ApiResponse::created(summary).with_message("Average Stored"))
}

async fn list_summaries(
    State(state): State<Arc<AppState>>,
    auth: Authenticated,
    ApiQuery(query): ApiQuery<KindQuery>,
) -> Result<impl IntoResponse, AppError> {
    let kind = query.parse()?;
    let summaries = aggregator::list_summaries(&state, &auth.principal, kind).await?;
    Ok(ApiResponse::ok(summaries))
}

async fn compute_summary(
    State(state): State<Arc<AppState>>,
    _auth: Authenticated,
    Path(device_id): Path<String>,
    ApiQuery(query): ApiQuery<KindQuery>,
) -> Result<impl IntoResponse, AppError> {
    let kind = query
        .parse()?
        .ok_or_else(|| AppError::Validation("Query parameter 'type' is required".into()))?;
    let summary = aggregator::compute_average_for(&state, &device_id, kind).await?;
    Ok(ApiResponse::created(summary).with_message("Average Stored"))
}
