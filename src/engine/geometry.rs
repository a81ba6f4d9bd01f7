//! Containment tests for zone shapes.
//!
//! Circles use the haversine great-circle distance on a spherical earth.
//! Polygons use an even-odd ray cast on (latitude, longitude) treated as a
//! flat plane, which is accurate for site-scale zones (under ~1 km across).
//! Very large zones or zones near the poles will be misclassified near
//! their edges.
//!
//! Points on a boundary are always inside.

use crate::error::{EngineError, EngineResult};
use crate::model::zone::{LatLng, ZoneShape};

/// Mean earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Tolerance in degrees for "on the edge" (about 0.1 mm).
const EDGE_EPSILON: f64 = 1e-9;

pub fn contains(shape: &ZoneShape, point: LatLng) -> bool {
    match shape {
        ZoneShape::Circle {
            center,
            radius_meters,
        } => haversine_distance(*center, point) <= *radius_meters,
        ZoneShape::Polygon { vertices } => polygon_contains(vertices, point),
    }
}

/// Great-circle distance between two coordinates, in meters.
pub fn haversine_distance(a: LatLng, b: LatLng) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

fn polygon_contains(vertices: &[LatLng], point: LatLng) -> bool {
    if vertices.len() < 3 {
        return false;
    }

    let (px, py) = (point.longitude, point.latitude);
    let mut inside = false;
    let mut j = vertices.len() - 1;

    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].longitude, vertices[i].latitude);
        let (xj, yj) = (vertices[j].longitude, vertices[j].latitude);

        if on_segment((xj, yj), (xi, yi), (px, py)) {
            return true;
        }

        if (yi > py) != (yj > py) {
            let x_cross = xi + (py - yi) * (xj - xi) / (yj - yi);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

fn on_segment(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> bool {
    let length = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
    if cross(a, b, p).abs() > EDGE_EPSILON * length {
        return false;
    }
    p.0 >= a.0.min(b.0) - EDGE_EPSILON
        && p.0 <= a.0.max(b.0) + EDGE_EPSILON
        && p.1 >= a.1.min(b.1) - EDGE_EPSILON
        && p.1 <= a.1.max(b.1) + EDGE_EPSILON
}

/// Rejects coordinates that are not finite or out of range.
pub fn validate_point(point: LatLng) -> EngineResult<()> {
    if !point.latitude.is_finite() || !point.longitude.is_finite() {
        return Err(EngineError::validation("coordinates must be finite numbers"));
    }
    if !(-90.0..=90.0).contains(&point.latitude) {
        return Err(EngineError::validation(format!(
            "latitude {} is outside [-90, 90]",
            point.latitude
        )));
    }
    if !(-180.0..=180.0).contains(&point.longitude) {
        return Err(EngineError::validation(format!(
            "longitude {} is outside [-180, 180]",
            point.longitude
        )));
    }
    Ok(())
}

/// Checks the shape invariants once, before a zone is stored.
///
/// A polygon given with its first vertex repeated at the end is normalized
/// to the open ring.
pub fn validate_shape(shape: ZoneShape) -> EngineResult<ZoneShape> {
    match shape {
        ZoneShape::Circle {
            center,
            radius_meters,
        } => {
            validate_point(center)?;
            if !radius_meters.is_finite() || radius_meters <= 0.0 {
                return Err(EngineError::validation("radius_meters must be greater than 0"));
            }
            Ok(ZoneShape::Circle {
                center,
                radius_meters,
            })
        }
        ZoneShape::Polygon { mut vertices } => {
            for v in &vertices {
                validate_point(*v)?;
            }
            if vertices.len() > 3 && vertices.first() == vertices.last() {
                vertices.pop();
            }
            if vertices.len() < 3 {
                return Err(EngineError::validation("a polygon needs at least 3 vertices"));
            }
            validate_ring(&vertices)?;
            Ok(ZoneShape::Polygon { vertices })
        }
    }
}

fn validate_ring(vertices: &[LatLng]) -> EngineResult<()> {
    let n = vertices.len();
    let pts: Vec<(f64, f64)> = vertices.iter().map(|v| (v.longitude, v.latitude)).collect();

    for i in 0..n {
        if pts[i] == pts[(i + 1) % n] {
            return Err(EngineError::validation(format!(
                "polygon repeats vertex {} consecutively",
                i
            )));
        }
    }

    // shoelace
    let twice_area: f64 = (0..n)
        .map(|i| {
            let (a, b) = (pts[i], pts[(i + 1) % n]);
            a.0 * b.1 - b.0 * a.1
        })
        .sum();
    if twice_area.abs() <= EDGE_EPSILON * EDGE_EPSILON {
        return Err(EngineError::validation("polygon has zero area"));
    }

    for i in 0..n {
        let (a1, a2) = (pts[i], pts[(i + 1) % n]);
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            let (b1, b2) = (pts[j], pts[(j + 1) % n]);
            if adjacent {
                // neighbours share a vertex; they may only overlap if they fold back
                let shared = if j == i + 1 { a2 } else { a1 };
                let (other_a, other_b) = if j == i + 1 { (a1, b2) } else { (a2, b1) };
                if cross(shared, other_a, other_b).abs() <= EDGE_EPSILON
                    && (on_segment(shared, other_a, other_b) || on_segment(shared, other_b, other_a))
                {
                    return Err(EngineError::validation(format!(
                        "polygon edges {} and {} overlap",
                        i, j
                    )));
                }
                continue;
            }
            if segments_intersect(a1, a2, b1, b2) {
                return Err(EngineError::validation(format!(
                    "polygon edges {} and {} intersect",
                    i, j
                )));
            }
        }
    }
    Ok(())
}

fn segments_intersect(p1: (f64, f64), p2: (f64, f64), q1: (f64, f64), q2: (f64, f64)) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    on_segment(q1, q2, p1) || on_segment(q1, q2, p2) || on_segment(p1, p2, q1) || on_segment(p1, p2, q2)
}
