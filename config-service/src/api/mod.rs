//! # REST API for the Config Service
//!
//! Thin HTTP adapter over [`DeviceDirectory`](crate::directory::DeviceDirectory).
//! Each handler decodes its inputs, runs one directory operation under the
//! retry policy and maps the outcome to a response.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check (no authentication)
//! - `POST /:model` - Create a device, returns its identity
//! - `GET /:model/:serial` - Fetch a device's configuration
//! - `PUT /:model/:serial` - Replace a device's configuration
//! - `GET /address/:model/:serial` - Fetch a device's address
//! - `PUT /address/:model/:serial` - Set a device's address
//!
//! Everything except `/health` requires `Authorization: Bearer <token>`.

pub mod auth;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use shared::{
    AddressPayload, Configuration, DeviceIdentity, DeviceModel, DirectoryError, ErrorResponse,
    MessageResponse, TOKEN_SEPARATOR,
};

use crate::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let directory_routes = Router::new()
        .route("/:model", post(create_device))
        .route("/:model/:serial", get(get_configuration).put(put_configuration))
        .route("/address/:model/:serial", get(get_address).put(put_address))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_bearer,
        ));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .merge(directory_routes)
        .layer(DefaultBodyLimit::max(state.config.api.max_body_size))
        .layer(TraceLayer::new_for_http());

    if state.config.api.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router.with_state(state)
}

// =============================================================================
// REQUEST DECODING
// =============================================================================

/// Build the identity named by two decoded path segments
///
/// A separator decoded out of `%2F` is rejected here; joining first would
/// let the token trimming in [`DeviceIdentity::parse`] swallow it.
fn identity_from_path(model: &str, serial: &str) -> Result<DeviceIdentity, ApiError> {
    let token = format!("{model}{TOKEN_SEPARATOR}{serial}");
    if model.contains(TOKEN_SEPARATOR) || serial.contains(TOKEN_SEPARATOR) {
        return Err(DirectoryError::MalformedIdentity {
            token,
            reason: "path segments must not contain a separator".into(),
        }
        .into());
    }
    Ok(DeviceIdentity::parse(&token)?)
}

fn json_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::BadRequest("Invalid JSON body".into()))
}

fn configuration_body(body: &Bytes) -> Result<Configuration, ApiError> {
    Ok(Configuration::from_json(json_body(body)?)?)
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": shared::VERSION,
    }))
}

/// Create a device of `model` with the configuration in the body
///
/// # Response (201)
/// ```json
/// { "model": "IchibuV1", "serialNumber": "67890-12345" }
/// ```
async fn create_device(
    State(state): State<Arc<AppState>>,
    Path(model): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<DeviceIdentity>), ApiError> {
    let model: DeviceModel = model.parse()?;
    let config = configuration_body(&body)?;

    info!(model = %model, phidget_id = config.phidget_id, load_cell_id = config.load_cell_id, "Device creation request received");

    let identity = state
        .retry
        .run("create_device", || state.directory.create_device(model, &config))
        .await?;

    Ok((StatusCode::CREATED, Json(identity)))
}

/// Configuration of a device, durations as `{secs, nanos}`
async fn get_configuration(
    State(state): State<Arc<AppState>>,
    Path((model, serial)): Path<(String, String)>,
) -> Result<Json<Configuration>, ApiError> {
    let identity = identity_from_path(&model, &serial)?;

    let config = state
        .retry
        .run("get_configuration", || state.directory.get_configuration(&identity))
        .await?;

    Ok(Json(config))
}

/// Replace the configuration of a device
async fn put_configuration(
    State(state): State<Arc<AppState>>,
    Path((model, serial)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let identity = identity_from_path(&model, &serial)?;
    let config = configuration_body(&body)?;

    state
        .retry
        .run("put_configuration", || state.directory.put_configuration(&identity, &config))
        .await?;

    Ok(Json(MessageResponse {
        message: format!("Config for {identity} updated successfully."),
    }))
}

/// Address of a device
async fn get_address(
    State(state): State<Arc<AppState>>,
    Path((model, serial)): Path<(String, String)>,
) -> Result<Json<AddressPayload>, ApiError> {
    let identity = identity_from_path(&model, &serial)?;

    let address = state
        .retry
        .run("get_address", || state.directory.get_address(&identity))
        .await?;

    Ok(Json(AddressPayload { address }))
}

/// Set the address of a device
async fn put_address(
    State(state): State<Arc<AppState>>,
    Path((model, serial)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ApiError> {
    let identity = identity_from_path(&model, &serial)?;
    let AddressPayload { address } = json_body(&body)?;

    state
        .retry
        .run("put_address", || state.directory.put_address(&identity, &address))
        .await?;

    Ok(Json(MessageResponse {
        message: "Successfully updated address.".into(),
    }))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::MalformedIdentity { .. }
            | DirectoryError::UnknownModel(_)
            | DirectoryError::SchemaValidation { .. } => ApiError::BadRequest(err.to_string()),

            DirectoryError::NotFound(_)
            | DirectoryError::AddressNotSet(_) => ApiError::NotFound(err.to_string()),

            DirectoryError::WriteConflict(_) => ApiError::Conflict(err.to_string()),

            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => {
                warn!(error = %msg, "Request abandoned after repeated write conflicts");
                (StatusCode::CONFLICT, msg)
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
