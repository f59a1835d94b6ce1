//! Response bodies shared by the HTTP API and the CLI.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::device::{Device, DeviceHealth, HealthReport, HealthStatus};
use crate::error::{DeviceError, McError};
use crate::image_ops::CapturedImage;
use crate::session::{DeviceOutcome, PrimeReport};

/// Name reported in every response.
pub const SERVICE_NAME: &str = "mcam";

/// `GET /`
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub config_path: Option<String>,
    pub session_timeout_seconds: f64,
    pub auth_enabled: bool,
}

/// `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub service: &'static str,
    pub status: HealthStatus,
    pub devices: Vec<DeviceHealth>,
}

impl From<HealthReport> for HealthResponse {
    fn from(report: HealthReport) -> Self {
        Self {
            service: SERVICE_NAME,
            status: report.status,
            devices: report.devices,
        }
    }
}

/// A per-device failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

impl From<&DeviceError> for ErrorBody {
    fn from(err: &DeviceError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One device in a `POST /prime` response.
#[derive(Debug, Clone, Serialize)]
pub struct PrimeEntry {
    pub device_id: String,
    pub serial: String,
    pub position: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// `POST /prime`
#[derive(Debug, Clone, Serialize)]
pub struct PrimeResponse {
    pub service: &'static str,
    pub session_id: Uuid,
    pub count: usize,
    pub primed_devices: usize,
    pub devices: Vec<PrimeEntry>,
}

impl PrimeResponse {
    pub fn from_outcomes(session_id: Uuid, outcomes: &[DeviceOutcome<PrimeReport>]) -> Self {
        let devices: Vec<PrimeEntry> = outcomes
            .iter()
            .map(|outcome| {
                let (device_id, serial, position) = identity(&outcome.device);
                PrimeEntry {
                    device_id,
                    serial,
                    position,
                    ok: outcome.is_ok(),
                    replaced: outcome.result.as_ref().ok().map(|r| r.replaced),
                    error: outcome.result.as_ref().err().map(ErrorBody::from),
                }
            })
            .collect();
        Self {
            service: SERVICE_NAME,
            session_id,
            count: devices.len(),
            primed_devices: devices.iter().filter(|d| d.ok).count(),
            devices,
        }
    }
}

/// One device in a `POST /capture` response.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureEntry {
    pub device_id: String,
    pub serial: String,
    pub position: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// `POST /capture`
#[derive(Debug, Clone, Serialize)]
pub struct CaptureResponse {
    pub service: &'static str,
    pub session_id: Uuid,
    pub count: usize,
    pub captured: usize,
    pub devices: Vec<CaptureEntry>,
}

impl CaptureResponse {
    /// Build the response; `include_images` controls whether base64
    /// payloads are embedded.
    pub fn from_outcomes(
        session_id: Uuid,
        outcomes: &[DeviceOutcome<CapturedImage>],
        include_images: bool,
    ) -> Self {
        let devices: Vec<CaptureEntry> = outcomes
            .iter()
            .map(|outcome| {
                let (device_id, serial, position) = identity(&outcome.device);
                let mut entry = CaptureEntry {
                    device_id,
                    serial,
                    position,
                    ok: outcome.is_ok(),
                    image_base64: None,
                    format: None,
                    width: None,
                    height: None,
                    sha256: None,
                    size_bytes: None,
                    error: None,
                };
                match &outcome.result {
                    Ok(image) => {
                        entry.image_base64 = include_images.then(|| image.to_base64());
                        entry.format = Some(image.format.clone());
                        entry.width = Some(image.width);
                        entry.height = Some(image.height);
                        entry.sha256 = Some(image.sha256.clone());
                        entry.size_bytes = Some(image.size_bytes());
                    }
                    Err(err) => entry.error = Some(ErrorBody::from(err)),
                }
                entry
            })
            .collect();
        Self {
            service: SERVICE_NAME,
            session_id,
            count: devices.len(),
            captured: devices.iter().filter(|d| d.ok).count(),
            devices,
        }
    }
}

fn identity(device: &Device) -> (String, String, String) {
    (
        device.identifier.clone(),
        device.serial.clone(),
        device.position.label.clone(),
    )
}

/// Request-level failure rendered as JSON.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "service": SERVICE_NAME,
            "error": {
                "kind": self.kind,
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<McError> for ApiError {
    fn from(err: McError) -> Self {
        let status = match &err {
            McError::Discovery(_) => StatusCode::BAD_GATEWAY,
            McError::Authentication => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: err.code(),
            message: err.to_string(),
        }
    }
}
