//! Nearest-pickup assignment.
//!
//! Scans every pickup point on every route and keeps the closest one that
//! is within range and still has a free seat. The scan never changes
//! occupancy; reserving the seat is the caller's job (see
//! [`crate::occupancy::OccupancyLedger`]).

use tracing::debug;

use crate::error::AssignmentError;
use crate::haversine::distance_meters;
use crate::model::{AssignmentResult, Coordinate, PickupPoint, Route};

/// Default search radius around the employee.
pub const DEFAULT_MAX_DISTANCE_M: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct PickupAssignmentEngine {
    max_distance_m: f64,
}

impl Default for PickupAssignmentEngine {
    fn default() -> Self {
        Self {
            max_distance_m: DEFAULT_MAX_DISTANCE_M,
        }
    }
}

impl PickupAssignmentEngine {
    pub fn new(max_distance_m: f64) -> Self {
        Self { max_distance_m }
    }

    /// Nearest qualifying pickup point for `point`.
    ///
    /// A candidate qualifies when it is at most `max_distance_m` away and
    /// `current_occupancy < max_capacity`. Exact ties keep the first
    /// candidate seen. A NaN distance never qualifies, so a non-finite
    /// `point` is always `NotFound`.
    pub fn assign<'a>(
        &self,
        point: &Coordinate,
        candidates: impl IntoIterator<Item = (&'a Route, &'a PickupPoint)>,
    ) -> Result<AssignmentResult, AssignmentError> {
        let mut best: Option<(f64, &Route, &PickupPoint)> = None;
        let mut scanned = 0usize;

        for (route, pickup) in candidates {
            scanned += 1;
            if !pickup.has_capacity() {
                continue;
            }

            let distance = distance_meters(point, &pickup.location);
            if distance.is_nan() || distance > self.max_distance_m {
                continue;
            }

            if best.is_none_or(|(best_distance, _, _)| distance < best_distance) {
                best = Some((distance, route, pickup));
            }
        }

        let Some((distance, route, pickup)) = best else {
            debug!(scanned, max_distance_m = self.max_distance_m, "no pickup point qualifies");
            return Err(AssignmentError::NotFound);
        };

        debug!(
            route = %route.id,
            pickup_point = %pickup.id,
            distance_m = distance,
            "pickup point assigned"
        );
        Ok(AssignmentResult {
            route_id: route.id.clone(),
            pickup_point_id: pickup.id.clone(),
            distance_meters: distance,
            pickup_location: pickup.location.clone(),
        })
    }
}

/// Every `(route, pickup)` pair of a catalog, in route then pickup order.
pub fn catalog_candidates(routes: &[Route]) -> impl Iterator<Item = (&Route, &PickupPoint)> {
    routes
        .iter()
        .flat_map(|route| route.pickup_points.iter().map(move |pickup| (route, pickup)))
}
