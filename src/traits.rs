//! Seams between the optimizer and its collaborators.
//!
//! Geocoding and road routing are external services; sequencing strategies
//! are interchangeable. Each is a trait so callers (and tests) can plug in
//! their own implementation.

use crate::error::{RoutingUnavailable, SequencingError};
use crate::model::Coordinate;
use crate::polyline::RouteGeometry;
use crate::solver::SequencedRoute;

/// Resolves a free-form address to a coordinate.
pub trait Geocoder: Send + Sync {
    /// `None` when the address cannot be resolved (or the service is down).
    fn resolve(&self, address: &str) -> Option<Coordinate>;
}

/// Road-routing service used for geometry and multi-stop ordering.
///
/// Both calls are best effort; every failure converges to
/// [`RoutingUnavailable`].
pub trait RoutingGateway: Send + Sync {
    /// Road geometry visiting `coordinates` in the given order.
    fn fetch_road_geometry(
        &self,
        coordinates: &[Coordinate],
    ) -> Result<RouteGeometry, RoutingUnavailable>;

    /// Visiting order for `stops` (indices into `stops`), for a vehicle that
    /// starts at the first stop and finishes at `end`.
    fn optimize_order(
        &self,
        stops: &[Coordinate],
        end: &Coordinate,
    ) -> Result<Vec<usize>, RoutingUnavailable>;
}

/// Orders a set of waypoints ahead of a fixed end point.
pub trait RouteStrategy: Send + Sync {
    /// Stable name, embedded in cache keys.
    fn name(&self) -> &str;

    fn sequence(
        &self,
        waypoints: &[Coordinate],
        end: &Coordinate,
    ) -> Result<SequencedRoute, SequencingError>;
}

/// Provides a distance matrix (meters) for a set of locations.
///
/// The matrix is indexed by the provided location order.
pub trait DistanceMatrixProvider {
    fn matrix_for(&self, locations: &[Coordinate]) -> Vec<Vec<f64>>;
}
