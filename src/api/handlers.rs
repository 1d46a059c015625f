use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use utoipa::OpenApi;

use super::{
    dto::{
        CreateUserRequest, DeleteDeviceRequest, DeviceMeasurementsResponse, EmailQuery,
        HealthResponse, IngestResponse, MeasurementDto, RegisterDeviceRequest,
        UserMeasurementsResponse,
    },
    errors::AppError,
    payload::IngestPayload,
    AppState,
};
use crate::{
    ingest::{Backend, Channel, DualWriteResult, WriteOutcome},
    registry::{CreateUserOutcome, DeleteDeviceOutcome, NewUser, RegisterDeviceOutcome},
};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Accept one reading from a gateway and write it to both stores.
///
/// A failure in one store does not fail the request; the per-store outcome
/// is reported in `status`.
#[utoipa::path(
    post,
    path = "/api/esp32/data",
    request_body(
        content = Object,
        description = "JSON object or form fields: child_id, optional gateway_id and timestamp, \
                       and the six readings (nested under sensor_data or flattened)"
    ),
    responses(
        (status = 200, description = "Reading processed by both stores", body = IngestResponse),
        (status = 400, description = "Empty body or invalid reading"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "ingest"
)]
pub async fn ingest_data(
    State(state): State<AppState>,
    payload: IngestPayload,
) -> Result<Json<IngestResponse>, AppError> {
    let event = payload.into_event().map_err(AppError::bad_request)?;
    let status = state
        .ingest
        .ingest(&event)
        .await
        .map_err(AppError::bad_request)?;

    Ok(Json(IngestResponse {
        message: "data processed".into(),
        status,
    }))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = CreateUserOutcome),
        (status = 200, description = "A user with this email already exists", body = CreateUserOutcome),
        (status = 400, description = "Missing field"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "registry"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = NewUser {
        first_name: required(req.first_name, "first_name")?,
        last_name: required(req.last_name, "last_name")?,
        email: required(req.email, "email")?,
    };

    let outcome = state.registry.create_user(&user).await?;
    let status = match outcome {
        CreateUserOutcome::Created { .. } => StatusCode::CREATED,
        CreateUserOutcome::Exists { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// Attach a gateway to an existing user.
#[utoipa::path(
    post,
    path = "/api/esp32/register",
    request_body = RegisterDeviceRequest,
    responses(
        (status = 201, description = "Gateway registered", body = RegisterDeviceOutcome),
        (status = 200, description = "Gateway already registered", body = RegisterDeviceOutcome),
        (status = 400, description = "Missing field"),
        (status = 404, description = "No user with this email", body = RegisterDeviceOutcome),
        (status = 500, description = "Internal server error"),
    ),
    tag = "registry"
)]
pub async fn register_device(
    State(state): State<AppState>,
    Json(req): Json<RegisterDeviceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let gateway_id = required(req.gateway_id, "gateway_id")?;
    let email = required(req.email, "email")?;

    let outcome = state.registry.register_device(&gateway_id, &email).await?;
    let status = match outcome {
        RegisterDeviceOutcome::Registered { .. } => StatusCode::CREATED,
        RegisterDeviceOutcome::Exists { .. } => StatusCode::OK,
        RegisterDeviceOutcome::UserNotFound => StatusCode::NOT_FOUND,
    };
    Ok((status, Json(outcome)))
}

#[utoipa::path(
    delete,
    path = "/api/devices",
    request_body = DeleteDeviceRequest,
    responses(
        (status = 200, description = "Device deleted", body = DeleteDeviceOutcome),
        (status = 400, description = "Missing field"),
        (status = 404, description = "No such device for this user", body = DeleteDeviceOutcome),
        (status = 500, description = "Internal server error"),
    ),
    tag = "registry"
)]
pub async fn delete_device(
    State(state): State<AppState>,
    Json(req): Json<DeleteDeviceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device_id = req
        .device_id
        .ok_or_else(|| AppError::bad_request("device_id is required"))?;
    let email = required(req.email, "email")?;

    let outcome = state.registry.delete_device(device_id, &email).await?;
    let status = match outcome {
        DeleteDeviceOutcome::Deleted { .. } => StatusCode::OK,
        DeleteDeviceOutcome::NotFound => StatusCode::NOT_FOUND,
    };
    Ok((status, Json(outcome)))
}

/// Readings relayed by one registered gateway, newest first.
#[utoipa::path(
    get,
    path = "/api/measurements/{device_id}",
    params(
        ("device_id" = i64, Path, description = "Registered device id"),
    ),
    responses(
        (status = 200, description = "Device measurements", body = DeviceMeasurementsResponse),
        (status = 404, description = "Unknown device"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "measurements"
)]
pub async fn device_measurements(
    State(state): State<AppState>,
    Path(device_id): Path<i64>,
) -> Result<Json<DeviceMeasurementsResponse>, AppError> {
    let rows = state
        .registry
        .measurements_for_device(device_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("device {device_id} not found")))?;

    Ok(Json(DeviceMeasurementsResponse {
        device_id,
        measurements: rows.into_iter().map(MeasurementDto::from).collect(),
    }))
}

/// Readings relayed by every gateway the user owns, newest first.
#[utoipa::path(
    get,
    path = "/api/measurements",
    params(EmailQuery),
    responses(
        (status = 200, description = "User measurements", body = UserMeasurementsResponse),
        (status = 400, description = "Missing email"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "measurements"
)]
pub async fn user_measurements(
    State(state): State<AppState>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<UserMeasurementsResponse>, AppError> {
    let email = required(query.email, "email")?;
    let rows = state.registry.measurements_for_user(&email).await?;

    Ok(Json(UserMeasurementsResponse {
        email,
        measurements: rows.into_iter().map(MeasurementDto::from).collect(),
    }))
}

/// Prometheus text exposition of the process metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Prometheus metrics", body = String, content_type = "text/plain"),
    ),
    tag = "system"
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render(),
    )
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_owned()),
        _ => Err(AppError::bad_request(format!("{field} is required"))),
    }
}

// ---------------------------------------------------------------------------
// OpenAPI document (served from api/mod.rs, written by bin/generate_openapi)
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        ingest_data,
        create_user,
        register_device,
        delete_device,
        device_measurements,
        user_measurements,
        metrics,
        health,
    ),
    components(schemas(
        IngestResponse,
        DualWriteResult,
        WriteOutcome,
        Backend,
        Channel,
        CreateUserRequest,
        RegisterDeviceRequest,
        DeleteDeviceRequest,
        CreateUserOutcome,
        RegisterDeviceOutcome,
        DeleteDeviceOutcome,
        MeasurementDto,
        DeviceMeasurementsResponse,
        UserMeasurementsResponse,
        HealthResponse,
    )),
    tags(
        (name = "ingest", description = "Sensor reading ingestion"),
        (name = "registry", description = "Users and gateway devices"),
        (name = "measurements", description = "Stored readings"),
        (name = "system", description = "Health and metrics"),
    ),
    info(
        title = "Edge Ingest Service API",
        version = "0.1.0",
        description = "Dual-write ingestion of ESP32 sensor readings into Postgres and InfluxDB"
    )
)]
pub struct ApiDoc;
