//! Route geometries.
//!
//! A geometry is a decoded polyline plus the summary the routing service
//! reports for it. When the service is unavailable a straight-line
//! geometry stands in, flagged through [`GeometrySource`] so renderers can
//! tell the two apart.

use serde::{Deserialize, Serialize};

use crate::model::Coordinate;

/// A polyline representing a route geometry as decoded coordinates.
///
/// Stores latitude/longitude points directly for internal processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

impl Polyline {
    /// Creates a new Polyline from decoded `(latitude, longitude)` points.
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Builds a polyline through the given coordinates, in order.
    pub fn through(coordinates: &[Coordinate]) -> Self {
        Self::new(coordinates.iter().map(Coordinate::lat_lng).collect())
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Where a geometry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometrySource {
    /// Road-accurate path from the routing service.
    Road,
    /// Straight segments between the input coordinates.
    StraightLine,
}

/// Path geometry plus distance/duration summary for one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry {
    pub polyline: Polyline,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    /// Indices into `polyline` where the requested stops fall.
    pub way_points: Vec<usize>,
    pub source: GeometrySource,
}

impl RouteGeometry {
    /// Fallback geometry: straight segments through `coordinates` in order,
    /// zero distance and duration, way points at the first and last index.
    pub fn straight_line(coordinates: &[Coordinate]) -> Self {
        let way_points = match coordinates.len() {
            0 => Vec::new(),
            n => vec![0, n - 1],
        };

        Self {
            polyline: Polyline::through(coordinates),
            distance_meters: 0.0,
            duration_seconds: 0.0,
            way_points,
            source: GeometrySource::StraightLine,
        }
    }

    pub fn is_road_accurate(&self) -> bool {
        self.source == GeometrySource::Road
    }
}
