//! API Routes

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use crate::alert_sink::AlertSource;
use crate::error::{Error, Result};
use crate::geofence::{self, validate_video_id};
use crate::models::{
    DetectIntrusionResponse, MessageResponse, MonitorsResponse, PolygonsResponse, RescanResponse,
    SavePolygonRequest,
};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Geofences
        .route("/get_polygon/:video_id", get(get_polygon))
        .route("/save_polygon", post(save_polygon))
        .route("/delete_polygon/:video_id", delete(delete_polygon))
        // Detection
        .route(
            "/detect_intrusion",
            post(detect_intrusion).layer(upload_limit),
        )
        // Media
        .route("/video_feed/:video_id", get(video_feed))
        // Alerts
        .route("/api/alerts/:video_id", get(latest_alert))
        .route("/api/alerts/:video_id/frame.jpg", get(latest_alert_frame))
        // Monitors
        .route("/api/monitors", get(list_monitors))
        .route("/api/monitors/rescan", post(rescan_monitors))
        .with_state(state)
}

// ========================================
// Geofence Handlers
// ========================================

async fn get_polygon(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<PolygonsResponse>> {
    validate_video_id(&video_id)?;
    let polygons = state.geofences.get(&video_id).await?;
    Ok(Json(PolygonsResponse { polygons }))
}

async fn save_polygon(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SavePolygonRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let Json(req) = payload.map_err(|e| Error::Validation(e.body_text()))?;

    let video_id = req
        .video_name
        .ok_or_else(|| Error::Validation("video_name is required".to_string()))?;
    let polygons = req
        .polygons
        .ok_or_else(|| Error::Validation("polygons is required".to_string()))?;

    validate_video_id(&video_id)?;
    if polygons.is_empty() {
        return Err(Error::Validation(
            "polygons must contain at least one polygon; use delete_polygon to clear".to_string(),
        ));
    }
    for polygon in &polygons {
        polygon.validate()?;
    }

    let count = polygons.len();
    state.geofences.save(&video_id, polygons).await?;

    tracing::info!(video_id = %video_id, polygons = count, "Geofence saved");
    Ok(Json(MessageResponse::new("Polygons saved successfully")))
}

async fn delete_polygon(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    validate_video_id(&video_id)?;
    state.geofences.delete(&video_id).await?;

    tracing::info!(video_id = %video_id, "Geofence deleted");
    Ok(Json(MessageResponse::new("Polygons deleted successfully")))
}

// ========================================
// Detection Handlers
// ========================================

async fn detect_intrusion(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectIntrusionResponse>> {
    let mut multipart = multipart.map_err(|e| upload_error(e.status(), e.body_text()))?;

    let mut image: Option<Vec<u8>> = None;
    let mut video_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e.status(), e.body_text()))?
    {
        match field.name() {
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| upload_error(e.status(), e.body_text()))?;
                image = Some(bytes.to_vec());
            }
            Some("video_name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| upload_error(e.status(), e.body_text()))?;
                video_name = Some(text);
            }
            _ => {}
        }
    }

    let image = image
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| Error::Validation("image is required".to_string()))?;
    let video_id = video_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Validation("video_name is required".to_string()))?;
    validate_video_id(&video_id)?;

    let polygons = state.geofences.get(&video_id).await?;
    if polygons.is_empty() {
        return Err(Error::NotFound(format!("no geofence for {}", video_id)));
    }

    image::guess_format(&image)
        .map_err(|_| Error::Validation("image is not a recognised format".to_string()))?;

    let subjects = state.detector.detect_subjects(&image).await?;
    let intruder = subjects
        .iter()
        .find(|s| geofence::contains(s.reference_point, &polygons));

    let Some(subject) = intruder else {
        tracing::debug!(
            video_id = %video_id,
            subjects = subjects.len(),
            "No intrusion in submitted frame"
        );
        return Ok(Json(DetectIntrusionResponse { alert: false }));
    };

    state
        .alerts
        .raise(&video_id, subject.reference_point, &image, AlertSource::OnDemand)
        .await?;
    Ok(Json(DetectIntrusionResponse { alert: true }))
}

/// Multipart failures are client errors; over-limit bodies are 413
fn upload_error(status: StatusCode, message: String) -> Error {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(message)
    } else {
        Error::Validation(message)
    }
}

// ========================================
// Media Handlers
// ========================================

async fn video_feed(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    state.media.serve(&video_id, range).await
}

// ========================================
// Alert Handlers
// ========================================

async fn latest_alert(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<impl IntoResponse> {
    validate_video_id(&video_id)?;
    match state.alerts.latest(&video_id).await? {
        Some(alert) => Ok(Json(alert)),
        None => Err(Error::NotFound(format!("no alert for {}", video_id))),
    }
}

async fn latest_alert_frame(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<impl IntoResponse> {
    validate_video_id(&video_id)?;
    match state.alerts.latest_frame(&video_id).await? {
        Some(bytes) => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            ],
            bytes,
        )),
        None => Err(Error::NotFound(format!("no alert frame for {}", video_id))),
    }
}

// ========================================
// Monitor Handlers
// ========================================

async fn list_monitors(State(state): State<AppState>) -> impl IntoResponse {
    Json(MonitorsResponse {
        video_dir: state.supervisor.video_dir().display().to_string(),
        monitors: state.supervisor.statuses().await,
    })
}

async fn rescan_monitors(State(state): State<AppState>) -> Result<Json<RescanResponse>> {
    let started = state.supervisor.rescan().await?;
    let total = state.supervisor.unit_count().await;
    Ok(Json(RescanResponse { started, total }))
}
