//! Point-in-polygon evaluation
//!
//! Even-odd ray casting per polygon, short-circuiting on the first hit.
//! Points lying on an edge or vertex are classified as outside.

use super::{Point, Polygon, MIN_POLYGON_POINTS};

/// Tolerance for the on-edge test, in pixels
const EDGE_EPSILON: f64 = 1e-9;

/// True iff `point` lies strictly inside at least one polygon
pub fn contains(point: Point, polygons: &[Polygon]) -> bool {
    polygons.iter().any(|poly| point_in_polygon(point, poly))
}

/// Strict containment test for a single polygon
pub fn point_in_polygon(point: Point, polygon: &Polygon) -> bool {
    let pts = &polygon.points;
    if pts.len() < MIN_POLYGON_POINTS {
        return false;
    }

    let mut inside = false;
    let mut j = pts.len() - 1;
    for i in 0..pts.len() {
        let (a, b) = (pts[i], pts[j]);

        if on_segment(point, a, b) {
            return false;
        }

        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EDGE_EPSILON {
        return false;
    }
    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}
