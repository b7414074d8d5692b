//! Request and response bodies for the HTTP surface

use crate::geofence::Polygon;
use crate::stream_monitor::MonitorStatus;
use serde::{Deserialize, Serialize};

/// `POST /save_polygon` body.
///
/// Fields are optional so a missing one is reported as a validation error
/// instead of a JSON rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavePolygonRequest {
    pub video_name: Option<String>,
    pub polygons: Option<Vec<Polygon>>,
}

/// `GET /get_polygon/{videoId}` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonsResponse {
    pub polygons: Vec<Polygon>,
}

/// `POST /detect_intrusion` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectIntrusionResponse {
    pub alert: bool,
}

/// Plain acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub detector_connected: bool,
    pub geofence_backend: String,
    pub monitors: usize,
    pub monitors_running: usize,
}

/// `GET /api/monitors` response
#[derive(Debug, Clone, Serialize)]
pub struct MonitorsResponse {
    pub video_dir: String,
    pub monitors: Vec<MonitorStatus>,
}

/// `POST /api/monitors/rescan` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescanResponse {
    pub started: usize,
    pub total: usize,
}
