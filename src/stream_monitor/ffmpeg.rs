//! FFmpeg-backed frame source
//!
//! `ffprobe` reports dimensions and frame rate; `ffmpeg` decodes to raw
//! rgb24 on stdout, one `width * height * 3` chunk per frame. The decoder
//! process is spawned with `kill_on_drop(true)` so a dropped stream never
//! leaves an orphaned ffmpeg behind.

use super::frame_source::{FrameSource, FrameStream, VideoFrame, DEFAULT_FPS};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};

/// ffprobe JSON output
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// Video stream properties
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Opens videos through the ffmpeg CLI
#[derive(Debug, Clone)]
pub struct FfmpegFrameSource {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegFrameSource {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    async fn probe(&self, video_id: &str, path: &Path) -> Result<StreamInfo> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v", "error",
                "-select_streams", "v:0",
                "-show_entries", "stream=width,height,avg_frame_rate,r_frame_rate",
                "-of", "json",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| unavailable(video_id, format!("ffprobe spawn failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unavailable(video_id, format!("ffprobe failed: {}", stderr.trim())));
        }

        parse_probe(&output.stdout).map_err(|msg| unavailable(video_id, msg))
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn open(&self, video_id: &str, path: &Path) -> Result<Box<dyn FrameStream>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(unavailable(
                video_id,
                format!("{} does not exist", path.display()),
            ));
        }

        let info = self.probe(video_id, path).await?;
        tracing::info!(
            video_id = %video_id,
            width = info.width,
            height = info.height,
            fps = info.fps,
            "Video source opened"
        );

        let mut stream = FfmpegFrameStream {
            video_id: video_id.to_string(),
            ffmpeg_path: self.ffmpeg_path.clone(),
            path: path.to_path_buf(),
            info,
            decoder: None,
        };
        stream.spawn_decoder()?;
        Ok(Box::new(stream))
    }
}

struct Decoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
}

/// Running ffmpeg decode of one file
pub struct FfmpegFrameStream {
    video_id: String,
    ffmpeg_path: String,
    path: PathBuf,
    info: StreamInfo,
    decoder: Option<Decoder>,
}

impl FfmpegFrameStream {
    fn frame_len(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }

    fn spawn_decoder(&mut self) -> Result<()> {
        let mut child = Command::new(&self.ffmpeg_path)
            .args(["-loglevel", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| unavailable(&self.video_id, format!("ffmpeg spawn failed: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| unavailable(&self.video_id, "ffmpeg stdout not captured".into()))?;

        self.decoder = Some(Decoder {
            child,
            stdout: BufReader::with_capacity(self.frame_len().max(8192), stdout),
        });
        Ok(())
    }

    async fn stop_decoder(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            let _ = decoder.child.start_kill();
            let _ = decoder.child.wait().await;
        }
    }
}

#[async_trait]
impl FrameStream for FfmpegFrameStream {
    fn native_fps(&self) -> f64 {
        self.info.fps
    }

    async fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let len = self.frame_len();
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; len];
        match decoder.stdout.read_exact(&mut buf).await {
            Ok(_) => Ok(Some(VideoFrame::new(self.info.width, self.info.height, buf))),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.stop_decoder().await;
                Ok(None)
            }
            Err(e) => {
                self.stop_decoder().await;
                Err(unavailable(&self.video_id, format!("decoder read failed: {}", e)))
            }
        }
    }

    async fn rewind(&mut self) -> Result<()> {
        self.stop_decoder().await;
        self.spawn_decoder()
    }
}

fn unavailable(video_id: &str, message: String) -> Error {
    Error::SourceUnavailable {
        video_id: video_id.to_string(),
        message,
    }
}

/// Parse ffprobe JSON into stream properties
fn parse_probe(raw: &[u8]) -> std::result::Result<StreamInfo, String> {
    let probe: ProbeOutput =
        serde_json::from_slice(raw).map_err(|e| format!("ffprobe output unreadable: {}", e))?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("video stream has no dimensions".to_string()),
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(DEFAULT_FPS);

    Ok(StreamInfo { width, height, fps })
}

/// Parse `"30000/1001"` or `"25"`; zero or invalid rates give `None`
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
