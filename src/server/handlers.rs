use axum::{Json, extract::State};
use tracing::info;

use super::AppState;
use super::dto::{
    ApiError, CaptureResponse, HealthResponse, PrimeResponse, SERVICE_NAME, ServiceInfo,
};

pub async fn index(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        config_path: state
            .config_path
            .as_deref()
            .map(|p| p.display().to_string()),
        session_timeout_seconds: state.settings.request_timeout.as_secs_f64(),
        auth_enabled: state.auth_enabled(),
    })
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let report = state.devices.health().await?;
    Ok(Json(report.into()))
}

pub async fn prime(State(state): State<AppState>) -> Result<Json<PrimeResponse>, ApiError> {
    let _guard = state.exclusive().await;
    let devices = state.devices.discover().await?;

    let session = state.session();
    let outcomes = session.prime(&devices).await;
    let response = PrimeResponse::from_outcomes(session.id(), &outcomes);
    info!(
        session_id = %response.session_id,
        count = response.count,
        primed = response.primed_devices,
        "Prime request complete"
    );
    Ok(Json(response))
}

pub async fn capture(State(state): State<AppState>) -> Result<Json<CaptureResponse>, ApiError> {
    let _guard = state.exclusive().await;
    let devices = state.devices.discover().await?;

    let session = state.session();
    let outcomes = session.capture(&devices).await;
    let response = CaptureResponse::from_outcomes(session.id(), &outcomes, true);
    info!(
        session_id = %response.session_id,
        count = response.count,
        captured = response.captured,
        "Capture request complete"
    );
    Ok(Json(response))
}
