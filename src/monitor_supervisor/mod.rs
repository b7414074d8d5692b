//! MonitorSupervisor - Owns the Set of Running Stream Monitors
//!
//! ## Responsibilities
//!
//! - Discover monitorable videos in the library (extension allow-list)
//! - Spawn one StreamMonitor task per video
//! - Expose live status for diagnostics
//! - Stop every unit on shutdown and await their handles
//!
//! Units that reach `Stopped` are kept for diagnostics and never restarted.

use crate::error::{Error, Result};
use crate::geofence::validate_video_id;
use crate::stream_monitor::{MonitorConfig, MonitorDeps, MonitorStatus, StreamMonitor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Default video extension allow-list
pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub video_dir: PathBuf,
    /// Lowercase extensions without the dot
    pub extensions: Vec<String>,
    pub monitor: MonitorConfig,
}

impl SupervisorConfig {
    pub fn new(video_dir: impl Into<PathBuf>) -> Self {
        Self {
            video_dir: video_dir.into(),
            extensions: DEFAULT_VIDEO_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            monitor: MonitorConfig::default(),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .map(|e| self.extensions.iter().any(|allowed| *allowed == e))
            .unwrap_or(false)
    }
}

struct MonitorHandle {
    status: Arc<RwLock<MonitorStatus>>,
    task: Option<JoinHandle<()>>,
}

/// MonitorSupervisor instance
pub struct MonitorSupervisor {
    deps: MonitorDeps,
    config: SupervisorConfig,
    units: Mutex<HashMap<String, MonitorHandle>>,
    shutdown_tx: watch::Sender<bool>,
}

impl MonitorSupervisor {
    pub fn new(deps: MonitorDeps, config: SupervisorConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            deps,
            config,
            units: Mutex::new(HashMap::new()),
            shutdown_tx,
        }
    }

    pub fn video_dir(&self) -> &Path {
        &self.config.video_dir
    }

    /// List monitorable videos as (video id, path), sorted by id
    pub async fn discover(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut entries = match tokio::fs::read_dir(&self.config.video_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    video_dir = %self.config.video_dir.display(),
                    "Video directory does not exist, nothing to monitor"
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() || !self.config.accepts(&path) {
                continue;
            }
            let Some(video_id) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!(path = %path.display(), "Skipping non UTF-8 file name");
                continue;
            };
            if validate_video_id(&video_id).is_err() {
                continue;
            }
            found.push((video_id, path));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    /// Start monitors for every discovered video without one.
    /// Returns the number of units started.
    pub async fn start(&self) -> Result<usize> {
        if *self.shutdown_tx.borrow() {
            return Err(Error::Internal("supervisor is shut down".to_string()));
        }

        let sources = self.discover().await?;
        let mut units = self.units.lock().await;
        let mut started = 0;

        for (video_id, path) in sources {
            if units.contains_key(&video_id) {
                continue;
            }

            let monitor = StreamMonitor::new(
                video_id.clone(),
                path,
                self.deps.clone(),
                self.config.monitor.clone(),
            );
            let status = monitor.status_handle();
            let task = tokio::spawn(monitor.run(self.shutdown_tx.subscribe()));

            units.insert(
                video_id,
                MonitorHandle {
                    status,
                    task: Some(task),
                },
            );
            started += 1;
        }

        tracing::info!(
            started = started,
            total = units.len(),
            video_dir = %self.config.video_dir.display(),
            "Monitor units started"
        );
        Ok(started)
    }

    /// Pick up videos added since the last scan
    pub async fn rescan(&self) -> Result<usize> {
        self.start().await
    }

    /// Status snapshot of every known unit, sorted by video id
    pub async fn statuses(&self) -> Vec<MonitorStatus> {
        let units = self.units.lock().await;
        let mut statuses = Vec::with_capacity(units.len());
        for handle in units.values() {
            statuses.push(handle.status.read().await.clone());
        }
        statuses.sort_by(|a, b| a.video_id.cmp(&b.video_id));
        statuses
    }

    pub async fn unit_count(&self) -> usize {
        self.units.lock().await.len()
    }

    /// Number of units whose task has not finished
    pub async fn running_count(&self) -> usize {
        self.units
            .lock()
            .await
            .values()
            .filter(|h| h.task.as_ref().is_some_and(|t| !t.is_finished()))
            .count()
    }

    /// Signal every unit to stop and wait for them
    pub async fn shutdown(&self) {
        tracing::info!("Stopping monitor units");
        self.shutdown_tx.send_replace(true);

        let handles: Vec<(String, JoinHandle<()>)> = {
            let mut units = self.units.lock().await;
            units
                .iter_mut()
                .filter_map(|(id, h)| h.task.take().map(|t| (id.clone(), t)))
                .collect()
        };

        for (video_id, task) in handles {
            if let Err(e) = task.await {
                tracing::error!(video_id = %video_id, error = %e, "Monitor task panicked");
            }
        }
        tracing::info!("All monitor units stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_sink::AlertSink;
    use crate::detection_adapter::{BBox, DetectionAdapter, DetectionCapability};
    use crate::geofence_store::MemoryGeofenceStore;
    use crate::stream_monitor::{FrameSource, FrameStream, MonitorState, VideoFrame};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Source that never opens, counting attempts
    #[derive(Default)]
    struct MissingSource {
        opens: AtomicUsize,
    }

    #[async_trait]
    impl FrameSource for MissingSource {
        async fn open(&self, video_id: &str, _path: &Path) -> Result<Box<dyn FrameStream>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Err(Error::SourceUnavailable {
                video_id: video_id.to_string(),
                message: "undecodable".into(),
            })
        }
    }

    /// Source that loops a single frame forever
    struct LoopingSource;

    struct LoopingStream;

    #[async_trait]
    impl FrameStream for LoopingStream {
        fn native_fps(&self) -> f64 {
            25.0
        }

        async fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
            Ok(Some(VideoFrame::new(1, 1, vec![0, 0, 0])))
        }

        async fn rewind(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl FrameSource for LoopingSource {
        async fn open(&self, _video_id: &str, _path: &Path) -> Result<Box<dyn FrameStream>> {
            Ok(Box::new(LoopingStream))
        }
    }

    struct NoDetections;

    #[async_trait]
    impl DetectionCapability for NoDetections {
        async fn detect(&self, _image: &[u8]) -> Result<Vec<BBox>> {
            Ok(Vec::new())
        }
    }

    async fn supervisor(
        video_dir: &Path,
        alert_dir: &Path,
        source: Arc<dyn FrameSource>,
    ) -> MonitorSupervisor {
        let deps = MonitorDeps {
            source,
            geofences: Arc::new(MemoryGeofenceStore::new()),
            detector: DetectionAdapter::new(Arc::new(NoDetections), "person", 0.25),
            alerts: Arc::new(AlertSink::new(alert_dir).await.unwrap()),
        };
        let mut config = SupervisorConfig::new(video_dir);
        config.monitor.idle_delay = Duration::from_millis(1);
        MonitorSupervisor::new(deps, config)
    }

    async fn wait_until_stopped(sup: &MonitorSupervisor) {
        for _ in 0..200 {
            if sup.running_count().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("units did not stop");
    }

    #[tokio::test]
    async fn test_discover_filters_by_extension() {
        let videos = tempfile::tempdir().unwrap();
        let alerts = tempfile::tempdir().unwrap();
        std::fs::write(videos.path().join("lobby.mp4"), b"x").unwrap();
        std::fs::write(videos.path().join("dock.AVI"), b"x").unwrap();
        std::fs::write(videos.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(videos.path().join("nested.mp4")).unwrap();

        let sup = supervisor(videos.path(), alerts.path(), Arc::new(LoopingSource)).await;
        let ids: Vec<String> = sup.discover().await.unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["dock.AVI".to_string(), "lobby.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_video_dir_is_empty() {
        let alerts = tempfile::tempdir().unwrap();
        let sup = supervisor(
            Path::new("/nonexistent/zonewatch/videos"),
            alerts.path(),
            Arc::new(LoopingSource),
        )
        .await;
        assert!(sup.discover().await.unwrap().is_empty());
        assert_eq!(sup.start().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stopped_units_are_not_restarted() {
        let videos = tempfile::tempdir().unwrap();
        let alerts = tempfile::tempdir().unwrap();
        std::fs::write(videos.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(videos.path().join("b.mp4"), b"x").unwrap();

        let source = Arc::new(MissingSource::default());
        let sup = supervisor(videos.path(), alerts.path(), source.clone()).await;

        assert_eq!(sup.start().await.unwrap(), 2);
        wait_until_stopped(&sup).await;

        let statuses = sup.statuses().await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| s.state == MonitorState::Stopped));

        assert_eq!(sup.rescan().await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(source.opens.load(Ordering::SeqCst), 2);

        std::fs::write(videos.path().join("c.mov"), b"x").unwrap();
        assert_eq!(sup.rescan().await.unwrap(), 1);
        assert_eq!(sup.unit_count().await, 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_units() {
        let videos = tempfile::tempdir().unwrap();
        let alerts = tempfile::tempdir().unwrap();
        std::fs::write(videos.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(videos.path().join("b.mkv"), b"x").unwrap();

        let sup = supervisor(videos.path(), alerts.path(), Arc::new(LoopingSource)).await;
        assert_eq!(sup.start().await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sup.running_count().await, 2);

        tokio::time::timeout(Duration::from_secs(5), sup.shutdown())
            .await
            .unwrap();
        assert_eq!(sup.running_count().await, 0);
        assert!(sup
            .statuses()
            .await
            .iter()
            .all(|s| s.state == MonitorState::Stopped));
        assert!(sup.start().await.is_err());
    }
}
