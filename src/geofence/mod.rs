//! Geofence - Forbidden Zone Model
//!
//! ## Responsibilities
//!
//! - Point / Polygon value types shared by store, monitor and API
//! - Persisted document shape (`{ video_name, polygons: [{ points }] }`)
//! - Video id validation for ids used as storage keys
//!
//! Polygons are taken as drawn: vertex order defines the edges and
//! self-intersection is never checked.

mod evaluator;

pub use evaluator::{contains, point_in_polygon};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Minimum vertex count of a polygon
pub const MIN_POLYGON_POINTS: usize = 3;

/// 2-D point in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Ordered vertex ring; the last point connects back to the first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Check vertex count and coordinate finiteness
    pub fn validate(&self) -> Result<()> {
        if self.points.len() < MIN_POLYGON_POINTS {
            return Err(Error::Validation(format!(
                "polygon needs at least {} points, got {}",
                MIN_POLYGON_POINTS,
                self.points.len()
            )));
        }
        if self.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::Validation(
                "polygon coordinates must be finite numbers".to_string(),
            ));
        }
        Ok(())
    }
}

impl From<Vec<(f64, f64)>> for Polygon {
    fn from(points: Vec<(f64, f64)>) -> Self {
        Self::new(points.into_iter().map(|(x, y)| Point::new(x, y)).collect())
    }
}

/// Persisted geofence document (one per video id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceDocument {
    pub video_name: String,
    pub polygons: Vec<PolygonDocument>,
}

/// Polygon wrapped in a map, as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonDocument {
    pub points: Vec<Point>,
}

impl GeofenceDocument {
    pub fn new(video_id: &str, polygons: &[Polygon]) -> Self {
        Self {
            video_name: video_id.to_string(),
            polygons: polygons
                .iter()
                .map(|p| PolygonDocument {
                    points: p.points.clone(),
                })
                .collect(),
        }
    }

    pub fn into_polygons(self) -> Vec<Polygon> {
        self.polygons
            .into_iter()
            .map(|p| Polygon::new(p.points))
            .collect()
    }

    /// Decode a stored document, mapping failures to `MalformedGeofence`
    pub fn decode(video_id: &str, raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::MalformedGeofence {
            video_id: video_id.to_string(),
            message: e.to_string(),
        })
    }
}

/// Reject ids that cannot safely name a file
pub fn validate_video_id(video_id: &str) -> Result<()> {
    if video_id.is_empty()
        || video_id == "."
        || video_id == ".."
        || video_id.contains(['/', '\\', '\0'])
    {
        return Err(Error::Validation(format!("invalid video id: {:?}", video_id)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_serializes_as_point_list() {
        let poly = Polygon::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let json = serde_json::to_string(&poly).unwrap();
        assert_eq!(
            json,
            r#"[{"x":0.0,"y":0.0},{"x":10.0,"y":0.0},{"x":10.0,"y":10.0}]"#
        );
    }

    #[test]
    fn test_polygon_validate() {
        assert!(Polygon::from(vec![(0.0, 0.0), (1.0, 1.0)]).validate().is_err());
        assert!(Polygon::from(vec![(0.0, 0.0), (1.0, 0.0), (f64::NAN, 1.0)])
            .validate()
            .is_err());
        assert!(Polygon::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_document_shape() {
        let doc = GeofenceDocument::new(
            "lobby.mp4",
            &[Polygon::from(vec![(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)])],
        );
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["video_name"], "lobby.mp4");
        assert_eq!(value["polygons"][0]["points"][1]["x"], 3.0);
    }

    #[test]
    fn test_decode_malformed() {
        let err = GeofenceDocument::decode("cam", "{not json").unwrap_err();
        assert!(matches!(err, Error::MalformedGeofence { .. }));
    }

    #[test]
    fn test_validate_video_id() {
        assert!(validate_video_id("lobby.mp4").is_ok());
        assert!(validate_video_id("").is_err());
        assert!(validate_video_id("..").is_err());
        assert!(validate_video_id("../etc/passwd").is_err());
        assert!(validate_video_id("a\\b").is_err());
    }
}
