//! RangeMediaServer - Byte-Range Video Serving
//!
//! ## Responsibilities
//!
//! - Resolve a video id to a file in the video library
//! - Serve full content (200) or a single byte range (206)
//! - Fall back to full content on malformed Range headers
//!
//! Only `bytes=<start>-[<end>]` is honoured. Suffix ranges and multi-range
//! requests are treated as malformed. An end past the file is clamped; a
//! start past the file is 416.

use crate::error::{Error, Result};
use crate::geofence::validate_video_id;
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Content type sent for every asset
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Parse a Range header against an asset of `size` bytes.
///
/// Returns `Ok(None)` when the header is malformed (serve full content),
/// `Ok(Some((start, end)))` with an inclusive end, or
/// `Err(RangeNotSatisfiable)` when start lies beyond the asset.
pub fn parse_range(header: &str, size: u64) -> Result<Option<(u64, u64)>> {
    let Some(ranges) = header.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    if ranges.contains(',') {
        return Ok(None);
    }
    let Some((start, end)) = ranges.split_once('-') else {
        return Ok(None);
    };

    let Ok(start) = start.trim().parse::<u64>() else {
        return Ok(None);
    };
    let end = match end.trim() {
        "" => None,
        raw => match raw.parse::<u64>() {
            Ok(end) => Some(end),
            Err(_) => return Ok(None),
        },
    };

    if let Some(end) = end {
        if end < start {
            return Ok(None);
        }
    }
    if start >= size {
        return Err(Error::RangeNotSatisfiable { size });
    }

    let last = size - 1;
    Ok(Some((start, end.map_or(last, |e| e.min(last)))))
}

/// Streaming response for one asset
pub struct MediaResponse {
    pub size: u64,
    /// Inclusive byte range, `None` for full content
    pub range: Option<(u64, u64)>,
    body: Body,
}

impl MediaResponse {
    pub fn status(&self) -> StatusCode {
        match self.range {
            Some(_) => StatusCode::PARTIAL_CONTENT,
            None => StatusCode::OK,
        }
    }

    pub fn content_length(&self) -> u64 {
        match self.range {
            Some((start, end)) => end - start + 1,
            None => self.size,
        }
    }
}

impl IntoResponse for MediaResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        let content_length = self.content_length();

        let mut response = Response::new(self.body);
        *response.status_mut() = status;

        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(VIDEO_CONTENT_TYPE),
        );
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
        if let Some((start, end)) = self.range {
            let value = format!("bytes {}-{}/{}", start, end, self.size);
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}

/// RangeMediaServer instance
pub struct RangeMediaServer {
    video_dir: PathBuf,
}

impl RangeMediaServer {
    pub fn new(video_dir: impl Into<PathBuf>) -> Self {
        Self {
            video_dir: video_dir.into(),
        }
    }

    pub fn video_dir(&self) -> &Path {
        &self.video_dir
    }

    /// Library path for a video id; unusable ids are reported as missing
    pub fn asset_path(&self, video_id: &str) -> Result<PathBuf> {
        validate_video_id(video_id)
            .map_err(|_| Error::NotFound(format!("video {}", video_id)))?;
        Ok(self.video_dir.join(video_id))
    }

    /// Serve a video, honouring an optional Range header
    pub async fn serve(&self, video_id: &str, range: Option<&str>) -> Result<MediaResponse> {
        let path = self.asset_path(video_id)?;

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("video {}", video_id)));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(Error::NotFound(format!("video {}", video_id)));
        }
        let size = metadata.len();

        let range = match range {
            Some(header) => {
                let parsed = parse_range(header, size)?;
                if parsed.is_none() {
                    tracing::debug!(
                        video_id = %video_id,
                        range = %header,
                        "Malformed Range header, serving full content"
                    );
                }
                parsed
            }
            None => None,
        };

        let body = match range {
            Some((start, end)) => {
                file.seek(SeekFrom::Start(start)).await?;
                Body::from_stream(ReaderStream::new(file.take(end - start + 1)))
            }
            None => Body::from_stream(ReaderStream::new(file)),
        };

        tracing::debug!(
            video_id = %video_id,
            size = size,
            range = ?range,
            "Serving video"
        );

        Ok(MediaResponse { size, range, body })
    }
}
