//! StreamMonitor - Continuous Zone-Intrusion Monitoring of One Video
//!
//! ## Responsibilities
//!
//! - Open the video source and derive the sampling interval from its fps
//! - Read frames in order; run detection only on every Nth frame
//! - Check subjects against the current geofence snapshot
//! - Raise alerts through the episode latch
//! - Loop the source forever, rewinding at end-of-stream
//!
//! ## State machine
//!
//! ```text
//! Opening -> Sampling -> (AlertCheck) -> Sampling -> ... -> EndOfStream -> Sampling
//!    |                                                         |
//!    +--------------------------> Stopped <--------------------+
//! ```
//!
//! Per-frame failures (geofence read, encode, detection, alert write) skip
//! the frame. Source open failure, a source that yields no frames and a
//! malformed stored geofence stop the unit for good.

pub mod ffmpeg;
pub mod frame_source;

pub use ffmpeg::FfmpegFrameSource;
pub use frame_source::{sampling_interval, FrameSource, FrameStream, VideoFrame};

use crate::alert_sink::{AlertLatch, AlertPolicy, AlertSink, AlertSource, LatchState};
use crate::detection_adapter::DetectionAdapter;
use crate::error::{Error, Result};
use crate::geofence;
use crate::geofence_store::GeofenceStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// Default seconds of video between detection calls
pub const DEFAULT_SAMPLE_INTERVAL_SECS: f64 = 3.0;

/// Monitor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Opening,
    Sampling,
    EndOfStream,
    Stopped,
}

/// Monitor tuning
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Seconds of video between sampled frames
    pub sample_interval_secs: f64,
    /// Pause between loop iterations
    pub idle_delay: Duration,
    pub alert_policy: AlertPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
            idle_delay: Duration::from_millis(10),
            alert_policy: AlertPolicy::Episode,
        }
    }
}

/// Shared collaborators, built once at startup
#[derive(Clone)]
pub struct MonitorDeps {
    pub source: Arc<dyn FrameSource>,
    pub geofences: Arc<dyn GeofenceStore>,
    pub detector: DetectionAdapter,
    pub alerts: Arc<AlertSink>,
}

/// Diagnostics snapshot published by a monitor
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub video_id: String,
    pub path: PathBuf,
    pub state: MonitorState,
    pub native_fps: Option<f64>,
    pub sampling_interval: Option<u64>,
    pub frames_read: u64,
    pub frames_sampled: u64,
    pub detection_calls: u64,
    pub alerts_raised: u64,
    pub passes: u64,
    pub in_episode: bool,
    pub last_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_alert_at: Option<DateTime<Utc>>,
}

impl MonitorStatus {
    fn new(video_id: &str, path: PathBuf) -> Self {
        Self {
            video_id: video_id.to_string(),
            path,
            state: MonitorState::Opening,
            native_fps: None,
            sampling_interval: None,
            frames_read: 0,
            frames_sampled: 0,
            detection_calls: 0,
            alerts_raised: 0,
            passes: 0,
            in_episode: false,
            last_error: None,
            started_at: Utc::now(),
            last_alert_at: None,
        }
    }
}

/// One monitoring unit
pub struct StreamMonitor {
    video_id: String,
    path: PathBuf,
    deps: MonitorDeps,
    config: MonitorConfig,
    state: MonitorState,
    stream: Option<Box<dyn FrameStream>>,
    /// Index of the next frame within the current pass
    position: u64,
    frames_this_pass: u64,
    interval: u64,
    latch: AlertLatch,
    stats: MonitorStatus,
    status: Arc<RwLock<MonitorStatus>>,
}

impl StreamMonitor {
    pub fn new(
        video_id: impl Into<String>,
        path: impl Into<PathBuf>,
        deps: MonitorDeps,
        config: MonitorConfig,
    ) -> Self {
        let video_id = video_id.into();
        let path = path.into();
        let stats = MonitorStatus::new(&video_id, path.clone());
        Self {
            latch: AlertLatch::new(config.alert_policy),
            status: Arc::new(RwLock::new(stats.clone())),
            video_id,
            path,
            deps,
            config,
            state: MonitorState::Opening,
            stream: None,
            position: 0,
            frames_this_pass: 0,
            interval: 1,
            stats,
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// Frames between detection calls, valid once the source is open
    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Live status shared with the supervisor
    pub fn status_handle(&self) -> Arc<RwLock<MonitorStatus>> {
        self.status.clone()
    }

    /// Run until the unit stops or shutdown is signalled
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            video_id = %self.video_id,
            path = %self.path.display(),
            "Stream monitor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.step().await == MonitorState::Stopped {
                break;
            }

            if self.config.idle_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.idle_delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        self.stream = None;
        self.transition(MonitorState::Stopped);
        self.publish().await;
        tracing::info!(
            video_id = %self.video_id,
            frames_read = self.stats.frames_read,
            alerts_raised = self.stats.alerts_raised,
            "Stream monitor stopped"
        );
    }

    /// Advance the state machine by one transition
    pub async fn step(&mut self) -> MonitorState {
        match self.state {
            MonitorState::Opening => self.open().await,
            MonitorState::Sampling => self.sample().await,
            MonitorState::EndOfStream => self.restart().await,
            MonitorState::Stopped => {}
        }
        self.publish().await;
        self.state
    }

    async fn open(&mut self) {
        match self.deps.source.open(&self.video_id, &self.path).await {
            Ok(stream) => {
                let fps = stream.native_fps();
                self.interval = sampling_interval(fps, self.config.sample_interval_secs);
                self.stats.native_fps = Some(fps);
                self.stats.sampling_interval = Some(self.interval);
                self.stream = Some(stream);
                self.position = 0;
                self.frames_this_pass = 0;

                tracing::info!(
                    video_id = %self.video_id,
                    fps = fps,
                    interval_frames = self.interval,
                    "Sampling every {} frames",
                    self.interval
                );
                self.transition(MonitorState::Sampling);
            }
            Err(e) => self.fail(e),
        }
    }

    async fn sample(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            self.transition(MonitorState::Opening);
            return;
        };

        let frame = match stream.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.transition(MonitorState::EndOfStream);
                return;
            }
            Err(e) => {
                tracing::warn!(
                    video_id = %self.video_id,
                    error = %e,
                    "Frame read failed, restarting source"
                );
                self.stats.last_error = Some(e.to_string());
                self.transition(MonitorState::EndOfStream);
                return;
            }
        };

        let index = self.position;
        self.position += 1;
        self.frames_this_pass += 1;
        self.stats.frames_read += 1;

        if index % self.interval != 0 {
            return;
        }

        self.stats.frames_sampled += 1;
        if let Err(e) = self.alert_check(index, &frame).await {
            self.fail(e);
        }
    }

    /// Geofence + detection check for one sampled frame.
    /// Only errors that must stop the unit are returned.
    async fn alert_check(&mut self, index: u64, frame: &VideoFrame) -> Result<()> {
        let polygons = match self.deps.geofences.get(&self.video_id).await {
            Ok(polygons) => polygons,
            Err(e @ Error::MalformedGeofence { .. }) => return Err(e),
            Err(e) => {
                self.skip(index, "geofence read", &e);
                return Ok(());
            }
        };

        if polygons.is_empty() {
            self.observe(false);
            return Ok(());
        }

        let jpeg = match frame.encode_jpeg() {
            Ok(jpeg) => jpeg,
            Err(e) => {
                self.skip(index, "frame encode", &e);
                return Ok(());
            }
        };

        self.stats.detection_calls += 1;
        let subjects = match self.deps.detector.detect_subjects(&jpeg).await {
            Ok(subjects) => subjects,
            Err(e) => {
                self.skip(index, "detection", &e);
                return Ok(());
            }
        };

        let intruder = subjects
            .iter()
            .find(|s| geofence::contains(s.reference_point, &polygons))
            .map(|s| s.reference_point);

        tracing::trace!(
            video_id = %self.video_id,
            frame = index,
            subjects = subjects.len(),
            intruding = intruder.is_some(),
            "Frame checked"
        );

        if !self.observe(intruder.is_some()) {
            return Ok(());
        }
        let Some(point) = intruder else {
            return Ok(());
        };

        match self
            .deps
            .alerts
            .raise(&self.video_id, point, &jpeg, AlertSource::Monitor)
            .await
        {
            Ok(alert) => {
                self.stats.alerts_raised += 1;
                self.stats.last_alert_at = Some(alert.timestamp);
            }
            Err(e) => {
                // nothing persisted, let the next in-zone sample retry
                self.latch.reset();
                self.stats.in_episode = false;
                self.skip(index, "alert write", &e);
            }
        }
        Ok(())
    }

    /// Feed the latch, logging episode boundaries
    fn observe(&mut self, intruding: bool) -> bool {
        let before = self.latch.state();
        let raise = self.latch.observe(intruding);
        let after = self.latch.state();

        if before != after {
            match after {
                LatchState::Alerting => {
                    tracing::info!(video_id = %self.video_id, "Intrusion episode started")
                }
                LatchState::Clear => {
                    tracing::info!(video_id = %self.video_id, "Intrusion episode ended")
                }
            }
        }
        self.stats.in_episode = after == LatchState::Alerting;
        raise
    }

    async fn restart(&mut self) {
        if self.frames_this_pass == 0 {
            self.fail(Error::SourceUnavailable {
                video_id: self.video_id.clone(),
                message: "source yielded no frames".to_string(),
            });
            return;
        }

        self.stats.passes += 1;
        let rewound = match self.stream.as_mut() {
            Some(stream) => stream.rewind().await,
            None => Err(Error::Internal("no open stream".to_string())),
        };

        match rewound {
            Ok(()) => {
                tracing::debug!(
                    video_id = %self.video_id,
                    pass = self.stats.passes,
                    "End of stream, rewound to start"
                );
                self.position = 0;
                self.frames_this_pass = 0;
                self.transition(MonitorState::Sampling);
            }
            Err(e) => {
                tracing::warn!(
                    video_id = %self.video_id,
                    error = %e,
                    "Rewind failed, reopening source"
                );
                self.stream = None;
                self.transition(MonitorState::Opening);
            }
        }
    }

    fn skip(&mut self, index: u64, stage: &str, error: &Error) {
        tracing::warn!(
            video_id = %self.video_id,
            frame = index,
            stage = stage,
            error = %error,
            "Sampled frame skipped"
        );
        self.stats.last_error = Some(format!("{}: {}", stage, error));
    }

    fn fail(&mut self, error: Error) {
        tracing::error!(
            video_id = %self.video_id,
            error = %error,
            "Stream monitor stopping"
        );
        self.stats.last_error = Some(error.to_string());
        self.stream = None;
        self.transition(MonitorState::Stopped);
    }

    fn transition(&mut self, next: MonitorState) {
        if self.state != next {
            tracing::debug!(
                video_id = %self.video_id,
                from = ?self.state,
                to = ?next,
                "Monitor state change"
            );
        }
        self.state = next;
        self.stats.state = next;
    }

    async fn publish(&mut self) {
        let snapshot = self.stats.clone();
        *self.status.write().await = snapshot;
    }
}
