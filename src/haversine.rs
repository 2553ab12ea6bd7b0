//! Great-circle distances between coordinates.
//!
//! Everything that compares positions (pickup assignment, both route
//! sequencers) goes through [`distance_meters`], either directly or via a
//! precomputed [`HaversineMatrix`].

use crate::model::Coordinate;
use crate::traits::DistanceMatrixProvider;

/// Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two coordinates in meters.
///
/// Symmetric and zero for identical points.
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    haversine_m(a.lat_lng(), b.lat_lng())
}

fn haversine_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lng1) = from;
    let (lat2, lng2) = to;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Pairwise haversine distance matrix in meters.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaversineMatrix;

impl DistanceMatrixProvider for HaversineMatrix {
    fn matrix_for(&self, locations: &[Coordinate]) -> Vec<Vec<f64>> {
        let n = locations.len();
        let mut matrix = vec![vec![0.0; n]; n];

        for (i, from) in locations.iter().enumerate() {
            for (j, to) in locations.iter().enumerate().skip(i + 1) {
                let meters = distance_meters(from, to);
                matrix[i][j] = meters;
                matrix[j][i] = meters;
            }
        }

        matrix
    }
}
