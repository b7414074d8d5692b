//! Frame source abstraction
//!
//! A [`FrameSource`] opens a video by path and hands back a [`FrameStream`]
//! that yields decoded frames in order until end-of-stream.

use crate::error::{Error, Result};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Fallback when the container reports no usable frame rate
pub const DEFAULT_FPS: f64 = 25.0;

/// Decoded RGB24 frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    /// Encode as JPEG for the detector and alert storage
    pub fn encode_jpeg(&self) -> Result<Vec<u8>> {
        let img = RgbImage::from_raw(self.width, self.height, self.rgb.clone()).ok_or_else(
            || {
                Error::Encoding(format!(
                    "frame buffer of {} bytes does not fit {}x{} rgb24",
                    self.rgb.len(),
                    self.width,
                    self.height
                ))
            },
        )?;

        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
            .map_err(|e| Error::Encoding(format!("jpeg encode failed: {}", e)))?;
        Ok(out)
    }
}

/// Opened video
#[async_trait]
pub trait FrameStream: Send {
    /// Native frame rate reported by the container
    fn native_fps(&self) -> f64;

    /// Next frame, `None` at end-of-stream
    async fn next_frame(&mut self) -> Result<Option<VideoFrame>>;

    /// Seek back to the first frame
    async fn rewind(&mut self) -> Result<()>;
}

/// Video opener
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn open(&self, video_id: &str, path: &Path) -> Result<Box<dyn FrameStream>>;
}

/// Frames between detection calls: `round(fps * seconds)`, at least 1
pub fn sampling_interval(native_fps: f64, sample_secs: f64) -> u64 {
    let fps = if native_fps.is_finite() && native_fps > 0.0 {
        native_fps
    } else {
        DEFAULT_FPS
    };
    let frames = (fps * sample_secs).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as u64
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_interval() {
        assert_eq!(sampling_interval(30.0, 3.0), 90);
        assert_eq!(sampling_interval(29.97, 3.0), 90);
        assert_eq!(sampling_interval(25.0, 0.5), 13);
        assert_eq!(sampling_interval(10.0, 0.01), 1);
        assert_eq!(sampling_interval(0.0, 3.0), 75);
        assert_eq!(sampling_interval(f64::NAN, 1.0), 25);
    }

    #[test]
    fn test_encode_jpeg() {
        let frame = VideoFrame::new(2, 2, vec![128; 12]);
        let jpeg = frame.encode_jpeg().unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_encode_jpeg_size_mismatch() {
        let frame = VideoFrame::new(4, 4, vec![0; 10]);
        assert!(matches!(frame.encode_jpeg(), Err(Error::Encoding(_))));
    }
}
