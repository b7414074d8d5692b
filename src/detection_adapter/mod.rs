//! DetectionAdapter - Subject Extraction from the Detection Capability
//!
//! ## Responsibilities
//!
//! - Call the opaque detection capability once per frame
//! - Keep only the subject class (default "person") above a confidence floor
//! - Reduce each bounding box to its centroid reference point
//!
//! No retries: a capability failure surfaces as `Error::Detection` and the
//! caller decides whether to skip the frame or fail the request.

mod http;

pub use http::HttpDetectionCapability;

use crate::error::Result;
use crate::geofence::Point;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bounding box returned by the detection capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub label: String,
    /// Missing confidence counts as certain
    #[serde(default = "default_conf")]
    pub conf: f32,
}

fn default_conf() -> f32 {
    1.0
}

impl BBox {
    pub fn centroid(&self) -> Point {
        Point::new(
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }
}

/// Detected subject with its reference point
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedSubject {
    pub label: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub reference_point: Point,
}

/// Opaque detector: encoded image in, labelled boxes out
#[async_trait]
pub trait DetectionCapability: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<Vec<BBox>>;

    /// Whether the capability is reachable
    async fn health_check(&self) -> bool {
        true
    }
}

/// Adapter turning raw detections into subjects of one class
#[derive(Clone)]
pub struct DetectionAdapter {
    capability: Arc<dyn DetectionCapability>,
    subject_class: String,
    min_confidence: f32,
}

impl DetectionAdapter {
    pub fn new(
        capability: Arc<dyn DetectionCapability>,
        subject_class: impl Into<String>,
        min_confidence: f32,
    ) -> Self {
        Self {
            capability,
            subject_class: subject_class.into(),
            min_confidence,
        }
    }

    pub fn subject_class(&self) -> &str {
        &self.subject_class
    }

    /// Detect subjects of the configured class in an encoded image
    pub async fn detect_subjects(&self, image: &[u8]) -> Result<Vec<DetectedSubject>> {
        let boxes = self.capability.detect(image).await?;
        let total = boxes.len();

        let subjects: Vec<DetectedSubject> = boxes
            .into_iter()
            .filter(|b| b.label.eq_ignore_ascii_case(&self.subject_class))
            .filter(|b| b.conf >= self.min_confidence)
            .map(|bbox| DetectedSubject {
                label: bbox.label.clone(),
                confidence: bbox.conf,
                reference_point: bbox.centroid(),
                bbox,
            })
            .collect();

        tracing::trace!(
            total = total,
            subjects = subjects.len(),
            class = %self.subject_class,
            "Detections filtered"
        );
        Ok(subjects)
    }

    pub async fn health_check(&self) -> bool {
        self.capability.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Fixed(Vec<BBox>);

    #[async_trait]
    impl DetectionCapability for Fixed {
        async fn detect(&self, _image: &[u8]) -> Result<Vec<BBox>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl DetectionCapability for Failing {
        async fn detect(&self, _image: &[u8]) -> Result<Vec<BBox>> {
            Err(Error::Detection("model crashed".into()))
        }
    }

    fn bbox(label: &str, x1: f32, y1: f32, x2: f32, y2: f32, conf: f32) -> BBox {
        BBox {
            x1,
            y1,
            x2,
            y2,
            label: label.to_string(),
            conf,
        }
    }

    #[tokio::test]
    async fn test_filters_class_and_computes_centroid() {
        let adapter = DetectionAdapter::new(
            Arc::new(Fixed(vec![
                bbox("person", 10.0, 20.0, 30.0, 60.0, 0.9),
                bbox("car", 0.0, 0.0, 100.0, 100.0, 0.99),
                bbox("Person", 0.0, 0.0, 5.0, 5.0, 0.5),
            ])),
            "person",
            0.25,
        );

        let subjects = adapter.detect_subjects(b"jpeg").await.unwrap();
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].reference_point, Point::new(20.0, 40.0));
        assert_eq!(subjects[1].reference_point, Point::new(2.5, 2.5));
    }

    #[tokio::test]
    async fn test_drops_low_confidence() {
        let adapter = DetectionAdapter::new(
            Arc::new(Fixed(vec![bbox("person", 0.0, 0.0, 2.0, 2.0, 0.1)])),
            "person",
            0.25,
        );
        assert!(adapter.detect_subjects(b"jpeg").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capability_error_propagates() {
        let adapter = DetectionAdapter::new(Arc::new(Failing), "person", 0.0);
        let err = adapter.detect_subjects(b"jpeg").await.unwrap_err();
        assert!(matches!(err, Error::Detection(_)));
    }

    #[test]
    fn test_bbox_conf_defaults_to_one() {
        let b: BBox =
            serde_json::from_str(r#"{"x1":0,"y1":0,"x2":4,"y2":2,"label":"person"}"#).unwrap();
        assert_eq!(b.conf, 1.0);
        assert_eq!(b.centroid(), Point::new(2.0, 1.0));
    }
}
