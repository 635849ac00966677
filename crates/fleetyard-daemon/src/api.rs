//! REST API handlers

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use fleetyard_core::{
    DeviceInput, DeviceTypeInput, FirmwareInput, FleetError, FleetResult, GroupInput,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::state::AppState;

/// A [`FleetError`] rendered as a status code and `{"error": "..."}` body
#[derive(Debug)]
pub struct ApiError(FleetError);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FleetError::NotFound { .. } => StatusCode::NOT_FOUND,
            FleetError::Conflict(_) => StatusCode::CONFLICT,
            FleetError::Validation(_) => StatusCode::BAD_REQUEST,
            FleetError::Internal(_) => {
                error!(error = %self.0, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Unwrap a JSON body, reporting malformed or missing payloads as validation errors
fn body<T: DeserializeOwned>(payload: Result<Json<T>, JsonRejection>) -> FleetResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| FleetError::validation(rejection.body_text()))
}

fn created<T: Serialize>(location: String, value: T) -> Response {
    (StatusCode::CREATED, [(header::LOCATION, location)], Json(value)).into_response()
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

pub async fn list_groups(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.groups.list().await?))
}

/// Group forest with children nested under their parents
pub async fn group_tree(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let snapshot = state.store.snapshot().await?;
    Ok(Json(snapshot.group_tree()))
}

pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.groups.get(id).await?))
}

pub async fn group_parent_candidates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.groups.parent_candidates(id).await?))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GroupInput>, JsonRejection>,
) -> ApiResult<Response> {
    let group = state.store.groups.create(body(payload)?).await?;
    info!(group = group.group_id, name = %group.name, "Group created");
    Ok(created(format!("/api/groups/{}", group.group_id), group))
}

pub async fn update_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<GroupInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let group = state.store.groups.update(id, body(payload)?).await?;
    info!(group = id, "Group updated");
    Ok(Json(group))
}

pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.store.groups.delete(id).await?;
    info!(group = id, "Group deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Device types
// ---------------------------------------------------------------------------

pub async fn list_device_types(
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.device_types.list().await?))
}

pub async fn get_device_type(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.device_types.get(id).await?))
}

pub async fn create_device_type(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeviceTypeInput>, JsonRejection>,
) -> ApiResult<Response> {
    let device_type = state.store.device_types.create(body(payload)?).await?;
    info!(device_type = device_type.device_type_id, name = %device_type.name, "Device type created");
    Ok(created(
        format!("/api/devicetypes/{}", device_type.device_type_id),
        device_type,
    ))
}

pub async fn update_device_type(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<DeviceTypeInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let device_type = state.store.device_types.update(id, body(payload)?).await?;
    info!(device_type = id, "Device type updated");
    Ok(Json(device_type))
}

/// Refused with 409 while any device references the type
pub async fn delete_device_type(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.store.device_types.delete(id).await?;
    info!(device_type = id, "Device type deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn device_type_devices(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.device_types.devices(id).await?))
}

pub async fn device_type_firmware(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.device_types.firmware(id).await?))
}

// ---------------------------------------------------------------------------
// Firmware
// ---------------------------------------------------------------------------

pub async fn list_firmware(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.firmware.list().await?))
}

pub async fn get_firmware(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.firmware.get(id).await?))
}

pub async fn create_firmware(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FirmwareInput>, JsonRejection>,
) -> ApiResult<Response> {
    let firmware = state.store.firmware.create(body(payload)?).await?;
    info!(
        firmware = firmware.firmware_id,
        device_type = firmware.device_type_id,
        version = %firmware.version,
        "Firmware created"
    );
    Ok(created(
        format!("/api/firmwares/{}", firmware.firmware_id),
        firmware,
    ))
}

pub async fn update_firmware(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<FirmwareInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let firmware = state.store.firmware.update(id, body(payload)?).await?;
    info!(firmware = id, version = %firmware.version, "Firmware updated");
    Ok(Json(firmware))
}

pub async fn delete_firmware(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.store.firmware.delete(id).await?;
    info!(firmware = id, "Firmware deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

pub async fn list_devices(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.devices.list().await?))
}

pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.devices.get(id).await?))
}

pub async fn create_device(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeviceInput>, JsonRejection>,
) -> ApiResult<Response> {
    let input = body(payload)?.validate()?;
    let device = state.store.devices.create(input).await?;
    info!(device = device.device_id, serial = %device.serial_number, "Device created");
    Ok(created(format!("/api/devices/{}", device.device_id), device))
}

pub async fn update_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<DeviceInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let input = body(payload)?.validate()?;
    let device = state.store.devices.update(id, input).await?;
    info!(device = id, "Device updated");
    Ok(Json(device))
}

pub async fn delete_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.store.devices.delete(id).await?;
    info!(device = id, "Device deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Body is a bare firmware id, e.g. `7`
pub async fn assign_firmware(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    payload: Result<Json<i64>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let firmware_id = body(payload)
        .map_err(|_| FleetError::validation("firmware id is required as the request body"))?;
    Ok(Json(state.store.devices.assign_firmware(id, firmware_id).await?))
}

pub async fn firmware_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.devices.firmware_history(id).await?))
}

// ---------------------------------------------------------------------------
// UI views
// ---------------------------------------------------------------------------

/// Group tree and resolved device cards, read fresh for this request
pub async fn overview(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let snapshot = state.store.snapshot().await?;
    Ok(Json(snapshot.overview()))
}

#[derive(Deserialize)]
pub struct GroupOptionsQuery {
    /// Group being edited; it and its descendants are left out
    exclude: Option<i64>,
}

pub async fn group_options(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GroupOptionsQuery>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = state.store.snapshot().await?;
    Ok(Json(snapshot.group_options(query.exclude)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareOptionsQuery {
    device_type_id: i64,
}

pub async fn firmware_options(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FirmwareOptionsQuery>,
) -> ApiResult<impl IntoResponse> {
    let snapshot = state.store.snapshot().await?;
    Ok(Json(snapshot.firmware_options(query.device_type_id)))
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
