//! AlertSink - Intrusion Alert Persistence
//!
//! ## Responsibilities
//!
//! - Persist the triggering frame, one slot per video id (latest wins)
//! - Persist the alert record next to it as JSON
//! - Serve the latest alert record / frame back to the API
//!
//! Files: `<alert_dir>/<video_id>_alert.jpg` and `<video_id>_alert.json`.
//! Deduplication across frames is the caller's job, see [`latch`].

pub mod latch;

pub use latch::{AlertLatch, AlertPolicy, LatchState};

use crate::error::{Error, Result};
use crate::geofence::{validate_video_id, Point};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Which path raised the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    /// Continuous stream monitor
    Monitor,
    /// Client-submitted frame
    OnDemand,
}

/// Alert record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: Uuid,
    pub video_id: String,
    pub point: Point,
    pub timestamp: DateTime<Utc>,
    pub frame_path: PathBuf,
    pub source: AlertSource,
}

/// AlertSink instance
pub struct AlertSink {
    alert_dir: PathBuf,
}

impl AlertSink {
    /// Create sink, making `alert_dir` if needed
    pub async fn new(alert_dir: impl Into<PathBuf>) -> Result<Self> {
        let alert_dir = alert_dir.into();
        fs::create_dir_all(&alert_dir).await?;
        Ok(Self { alert_dir })
    }

    pub fn alert_dir(&self) -> &Path {
        &self.alert_dir
    }

    /// Path of the frame slot for a video id
    pub fn frame_path(&self, video_id: &str) -> PathBuf {
        self.alert_dir.join(format!("{}_alert.jpg", video_id))
    }

    fn record_path(&self, video_id: &str) -> PathBuf {
        self.alert_dir.join(format!("{}_alert.json", video_id))
    }

    /// Persist frame + record, overwriting the previous alert for this id
    pub async fn raise(
        &self,
        video_id: &str,
        point: Point,
        frame: &[u8],
        source: AlertSource,
    ) -> Result<Alert> {
        validate_video_id(video_id)?;
        let jpeg = to_jpeg(frame)?;

        let frame_path = self.frame_path(video_id);
        let alert = Alert {
            alert_id: Uuid::new_v4(),
            video_id: video_id.to_string(),
            point,
            timestamp: Utc::now(),
            frame_path: frame_path.clone(),
            source,
        };

        self.write_atomic(&frame_path, &jpeg).await?;
        self.write_atomic(&self.record_path(video_id), &serde_json::to_vec_pretty(&alert)?)
            .await?;

        tracing::warn!(
            video_id = %video_id,
            x = point.x,
            y = point.y,
            source = ?source,
            alert_id = %alert.alert_id,
            "Intrusion alert raised"
        );
        Ok(alert)
    }

    /// Latest alert record for a video id
    pub async fn latest(&self, video_id: &str) -> Result<Option<Alert>> {
        validate_video_id(video_id)?;
        let path = self.record_path(video_id);
        match fs::read(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("read {}: {}", path.display(), e))),
        }
    }

    /// Latest alert frame bytes for a video id
    pub async fn latest_frame(&self, video_id: &str) -> Result<Option<Vec<u8>>> {
        validate_video_id(video_id)?;
        match fs::read(self.frame_path(video_id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(e.to_string())),
        }
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<()> {
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        fs::write(&tmp, data)
            .await
            .map_err(|e| Error::Storage(format!("write {}: {}", tmp.display(), e)))?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(Error::Storage(format!("replace {}: {}", path.display(), e)));
        }
        Ok(())
    }
}

/// Pass JPEG through untouched, re-encode any other supported format
pub fn to_jpeg(image_bytes: &[u8]) -> Result<Vec<u8>> {
    match image::guess_format(image_bytes) {
        Ok(ImageFormat::Jpeg) => Ok(image_bytes.to_vec()),
        Ok(_) => {
            let decoded = image::load_from_memory(image_bytes)
                .map_err(|e| Error::Encoding(format!("decode failed: {}", e)))?;
            let mut out = Vec::new();
            image::DynamicImage::ImageRgb8(decoded.to_rgb8())
                .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
                .map_err(|e| Error::Encoding(format!("jpeg encode failed: {}", e)))?;
            Ok(out)
        }
        Err(e) => Err(Error::Encoding(format!("unrecognized image: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[tokio::test]
    async fn test_raise_writes_frame_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AlertSink::new(dir.path()).await.unwrap();

        let alert = sink
            .raise("yard.mp4", Point::new(12.0, 34.0), &png_bytes(), AlertSource::OnDemand)
            .await
            .unwrap();

        let frame = std::fs::read(dir.path().join("yard.mp4_alert.jpg")).unwrap();
        assert_eq!(image::guess_format(&frame).unwrap(), ImageFormat::Jpeg);

        let latest = sink.latest("yard.mp4").await.unwrap().unwrap();
        assert_eq!(latest, alert);
        assert_eq!(latest.point, Point::new(12.0, 34.0));
    }

    #[tokio::test]
    async fn test_later_alert_overwrites_slot() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AlertSink::new(dir.path()).await.unwrap();

        let first = sink
            .raise("cam", Point::new(1.0, 1.0), &png_bytes(), AlertSource::Monitor)
            .await
            .unwrap();
        let second = sink
            .raise("cam", Point::new(2.0, 2.0), &png_bytes(), AlertSource::Monitor)
            .await
            .unwrap();
        assert_ne!(first.alert_id, second.alert_id);

        let latest = sink.latest("cam").await.unwrap().unwrap();
        assert_eq!(latest.alert_id, second.alert_id);

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 2);
    }

    #[tokio::test]
    async fn test_latest_missing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = AlertSink::new(dir.path()).await.unwrap();
        assert!(sink.latest("none").await.unwrap().is_none());
        assert!(sink.latest_frame("none").await.unwrap().is_none());
    }

    #[test]
    fn test_to_jpeg_rejects_garbage() {
        assert!(matches!(to_jpeg(b"not an image"), Err(Error::Encoding(_))));
    }
}
