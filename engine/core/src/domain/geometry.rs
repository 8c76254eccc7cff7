// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Geometry Value Objects
//!
//! `Coordinate` is a WGS84-style latitude/longitude/altitude triple. `Polygon`
//! is an implicitly closed ring of coordinates with a planar point-in-polygon
//! test. Altitude is carried for completeness but never participates in
//! containment.
//!
//! ## Containment Rule
//!
//! [`Polygon::contains`] casts a ray along the longitude axis and counts edge
//! crossings; odd parity means inside. Boundary behaviour is half-open and
//! deterministic: points on an edge of minimal latitude count as inside, points
//! on an edge of maximal latitude count as outside. Self-intersecting rings are
//! evaluated with the same parity rule (even-odd fill).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// Planar coordinate at sea level.
    pub fn flat(latitude: f64, longitude: f64) -> Self {
        Self::new(latitude, longitude, 0.0)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.latitude, self.longitude, self.altitude)
    }
}

/// Ordered ring of coordinates. The last vertex connects back to the first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    vertices: Vec<Coordinate>,
}

impl Polygon {
    pub fn new(vertices: Vec<Coordinate>) -> Self {
        Self { vertices }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Whether the ring has enough vertices to enclose an area.
    pub fn is_closed_ring(&self) -> bool {
        self.vertices.len() >= 3
    }

    /// Even-odd ray casting along the longitude axis.
    ///
    /// Rings with fewer than three vertices never contain anything: every edge
    /// of a two-point ring is visited twice, so crossings cancel out.
    pub fn contains(&self, point: &Coordinate) -> bool {
        let n = self.vertices.len();
        if n == 0 {
            return false;
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let vi = &self.vertices[i];
            let vj = &self.vertices[j];

            let straddles = (vi.longitude > point.longitude) != (vj.longitude > point.longitude);
            if straddles {
                // straddles guarantees vj.longitude != vi.longitude
                let crossing_latitude = (vj.latitude - vi.latitude) * (point.longitude - vi.longitude)
                    / (vj.longitude - vi.longitude)
                    + vi.latitude;
                if point.latitude < crossing_latitude {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

impl From<Vec<Coordinate>> for Polygon {
    fn from(vertices: Vec<Coordinate>) -> Self {
        Self::new(vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(vec![
            Coordinate::flat(0.0, 0.0),
            Coordinate::flat(0.0, 2.0),
            Coordinate::flat(2.0, 2.0),
            Coordinate::flat(2.0, 0.0),
        ])
    }

    #[test]
    fn test_square_contains_center() {
        assert!(square().contains(&Coordinate::flat(1.0, 1.0)));
    }

    #[test]
    fn test_square_excludes_outside_points() {
        let polygon = square();
        assert!(!polygon.contains(&Coordinate::flat(3.0, 3.0)));
        assert!(!polygon.contains(&Coordinate::flat(-1.0, 1.0)));
        assert!(!polygon.contains(&Coordinate::flat(1.0, -0.5)));
        assert!(!polygon.contains(&Coordinate::flat(1.0, 2.5)));
    }

    #[test]
    fn test_altitude_is_ignored() {
        assert!(square().contains(&Coordinate::new(1.0, 1.0, 8848.0)));
        assert!(square().contains(&Coordinate::new(1.0, 1.0, -400.0)));
    }

    #[test]
    fn test_boundary_is_half_open_and_deterministic() {
        let polygon = square();

        // minimal-latitude edge and its corner are inside
        assert!(polygon.contains(&Coordinate::flat(0.0, 1.0)));
        assert!(polygon.contains(&Coordinate::flat(0.0, 0.0)));

        // maximal-latitude edge and the far corner are outside
        assert!(!polygon.contains(&Coordinate::flat(2.0, 1.0)));
        assert!(!polygon.contains(&Coordinate::flat(2.0, 2.0)));

        for _ in 0..3 {
            assert!(polygon.contains(&Coordinate::flat(0.0, 1.0)));
            assert!(!polygon.contains(&Coordinate::flat(2.0, 1.0)));
        }
    }

    #[test]
    fn test_degenerate_rings_contain_nothing() {
        let origin = Coordinate::flat(0.0, 0.0);
        assert!(!Polygon::default().contains(&origin));
        assert!(!Polygon::new(vec![Coordinate::flat(0.0, 0.0)]).contains(&origin));

        let segment = Polygon::new(vec![Coordinate::flat(-1.0, -1.0), Coordinate::flat(1.0, 1.0)]);
        assert!(!segment.contains(&origin));
        assert!(!segment.is_closed_ring());
    }

    #[test]
    fn test_self_intersecting_ring_uses_even_odd_rule() {
        // bow-tie whose diagonals cross at (1, 1)
        let bowtie = Polygon::new(vec![
            Coordinate::flat(0.0, 0.0),
            Coordinate::flat(2.0, 2.0),
            Coordinate::flat(0.0, 2.0),
            Coordinate::flat(2.0, 0.0),
        ]);

        assert!(bowtie.contains(&Coordinate::flat(1.0, 0.5)));
        assert!(bowtie.contains(&Coordinate::flat(1.0, 1.5)));
        assert!(!bowtie.contains(&Coordinate::flat(0.2, 1.0)));
    }

    #[test]
    fn test_concave_ring() {
        // U shape opening towards higher latitude
        let u_shape = Polygon::new(vec![
            Coordinate::flat(0.0, 0.0),
            Coordinate::flat(0.0, 3.0),
            Coordinate::flat(3.0, 3.0),
            Coordinate::flat(3.0, 2.0),
            Coordinate::flat(1.0, 2.0),
            Coordinate::flat(1.0, 1.0),
            Coordinate::flat(3.0, 1.0),
            Coordinate::flat(3.0, 0.0),
        ]);

        assert!(u_shape.contains(&Coordinate::flat(0.5, 1.5)));
        assert!(u_shape.contains(&Coordinate::flat(2.0, 0.5)));
        assert!(u_shape.contains(&Coordinate::flat(2.0, 2.5)));
        assert!(!u_shape.contains(&Coordinate::flat(2.0, 1.5)));
    }
}
