//! Application state
//!
//! Holds the configuration and every shared component

use crate::alert_sink::{AlertPolicy, AlertSink};
use crate::detection_adapter::{DetectionAdapter, DetectionCapability};
use crate::error::Result;
use crate::geofence_store::{GeofenceBackend, GeofenceStore};
use crate::media_server::RangeMediaServer;
use crate::monitor_supervisor::{MonitorSupervisor, SupervisorConfig, DEFAULT_VIDEO_EXTENSIONS};
use crate::stream_monitor::{FrameSource, MonitorConfig, MonitorDeps};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default frame upload limit in MiB
pub const DEFAULT_MAX_UPLOAD_MB: usize = 32;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Video library (monitored sources and video_feed assets)
    pub video_dir: PathBuf,
    /// Alert frames and records
    pub alert_frame_dir: PathBuf,
    /// Geofence documents (file backend)
    pub polygon_data_dir: PathBuf,
    pub geofence_backend: GeofenceBackend,
    /// Database URL (mysql backend)
    pub database_url: Option<String>,
    /// Detection service URL
    pub detector_url: String,
    pub detector_timeout: Duration,
    /// Detection class treated as a subject
    pub subject_class: String,
    pub min_confidence: f32,
    /// Seconds of video between sampled frames
    pub sample_interval_secs: f64,
    pub monitor_idle_delay: Duration,
    /// Monitored file extensions, lowercase
    pub video_extensions: Vec<String>,
    pub alert_policy: AlertPolicy,
    /// Start monitors at boot
    pub monitor_enabled: bool,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Request body limit for frame uploads
    pub max_upload_bytes: usize,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = key, value = %raw, "Invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 5000),
            video_dir: std::env::var("VIDEO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./video_library")),
            alert_frame_dir: std::env::var("ALERT_FRAME_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./alert_frames")),
            polygon_data_dir: std::env::var("POLYGON_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./polygon_data")),
            geofence_backend: env_or("GEOFENCE_BACKEND", GeofenceBackend::File),
            database_url: std::env::var("DATABASE_URL").ok(),
            detector_url: std::env::var("DETECTOR_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            detector_timeout: Duration::from_secs(env_or("DETECTOR_TIMEOUT_SEC", 10)),
            subject_class: std::env::var("SUBJECT_CLASS").unwrap_or_else(|_| "person".to_string()),
            min_confidence: env_or("DETECTION_MIN_CONFIDENCE", 0.25),
            sample_interval_secs: env_or("SAMPLE_INTERVAL_SEC", 3.0),
            monitor_idle_delay: Duration::from_millis(env_or("MONITOR_IDLE_DELAY_MS", 10)),
            video_extensions: std::env::var("VIDEO_EXTENSIONS")
                .map(|raw| parse_extensions(&raw))
                .unwrap_or_else(|_| {
                    DEFAULT_VIDEO_EXTENSIONS
                        .iter()
                        .map(|e| e.to_string())
                        .collect()
                }),
            alert_policy: env_or("ALERT_POLICY", AlertPolicy::Episode),
            monitor_enabled: env_or("MONITOR_ENABLED", true),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            max_upload_bytes: env_or("MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB) * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            sample_interval_secs: self.sample_interval_secs,
            idle_delay: self.monitor_idle_delay,
            alert_policy: self.alert_policy,
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            video_dir: self.video_dir.clone(),
            extensions: self.video_extensions.clone(),
            monitor: self.monitor_config(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// GeofenceStore (selected backend)
    pub geofences: Arc<dyn GeofenceStore>,
    /// DetectionAdapter (subject filter over the detector)
    pub detector: DetectionAdapter,
    /// AlertSink (alert frames + records)
    pub alerts: Arc<AlertSink>,
    /// MonitorSupervisor (continuous monitoring)
    pub supervisor: Arc<MonitorSupervisor>,
    /// RangeMediaServer (video_feed)
    pub media: Arc<RangeMediaServer>,
}

impl AppState {
    /// Wire every component from already-built collaborators.
    /// Monitors are not started here.
    pub async fn build(
        config: AppConfig,
        geofences: Arc<dyn GeofenceStore>,
        capability: Arc<dyn DetectionCapability>,
        source: Arc<dyn FrameSource>,
    ) -> Result<Self> {
        let detector = DetectionAdapter::new(
            capability,
            config.subject_class.clone(),
            config.min_confidence,
        );
        let alerts = Arc::new(AlertSink::new(config.alert_frame_dir.clone()).await?);

        let deps = MonitorDeps {
            source,
            geofences: geofences.clone(),
            detector: detector.clone(),
            alerts: alerts.clone(),
        };
        let supervisor = Arc::new(MonitorSupervisor::new(deps, config.supervisor_config()));
        let media = Arc::new(RangeMediaServer::new(config.video_dir.clone()));

        Ok(Self {
            config,
            geofences,
            detector,
            alerts,
            supervisor,
            media,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extensions() {
        assert_eq!(
            parse_extensions("MP4, .avi,,mkv "),
            vec!["mp4".to_string(), "avi".to_string(), "mkv".to_string()]
        );
    }

    #[test]
    fn test_monitor_config_follows_app_config() {
        let mut config = AppConfig::default();
        config.sample_interval_secs = 1.5;
        config.monitor_idle_delay = Duration::ZERO;
        config.alert_policy = AlertPolicy::EverySample;

        let monitor = config.supervisor_config().monitor;
        assert_eq!(monitor.sample_interval_secs, 1.5);
        assert!(monitor.idle_delay.is_zero());
        assert_eq!(monitor.alert_policy, AlertPolicy::EverySample);
    }
}
