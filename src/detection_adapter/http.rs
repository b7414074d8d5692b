//! HTTP detection capability
//!
//! Posts the frame as multipart part `image` to `{base_url}/v1/detect` and
//! reads back `{ "detections": [BBox, ...] }`.

use super::{BBox, DetectionCapability};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Detection server response
#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<BBox>,
}

/// Remote detection server client
pub struct HttpDetectionCapability {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDetectionCapability {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl DetectionCapability for HttpDetectionCapability {
    async fn detect(&self, image: &[u8]) -> Result<Vec<BBox>> {
        let url = format!("{}/v1/detect", self.base_url);

        let part = Part::bytes(image.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| Error::Detection(format!("multipart build failed: {}", e)))?;
        let form = Form::new().part("image", part);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Detection(format!("detector unreachable: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Detection(format!(
                "detector returned {} - {}",
                status, body
            )));
        }

        let parsed: DetectResponse = resp
            .json()
            .await
            .map_err(|e| Error::Detection(format!("bad detector response: {}", e)))?;
        Ok(parsed.detections)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let cap = HttpDetectionCapability::new("http://detector:9000/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(cap.base_url(), "http://detector:9000");
    }

    #[test]
    fn test_response_parsing() {
        let parsed: DetectResponse = serde_json::from_str(
            r#"{"detections":[{"x1":1,"y1":2,"x2":3,"y2":4,"label":"person","conf":0.8}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].label, "person");

        let empty: DetectResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.detections.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_detector_is_detection_error() {
        let cap = HttpDetectionCapability::new("http://127.0.0.1:1", Duration::from_millis(500))
            .unwrap();
        let err = cap.detect(b"jpeg").await.unwrap_err();
        assert!(matches!(err, Error::Detection(_)));
        assert!(!cap.health_check().await);
    }
}
