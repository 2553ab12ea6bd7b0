//! Route sequencing: ordering a route's pickups ahead of its end point.
//!
//! Strategies share one output shape, [`SequencedRoute`], so the optimizer
//! can swap them through configuration. This module holds the shared leg
//! arithmetic, the greedy nearest-neighbor strategy and the strategy that
//! defers to the routing service's optimization endpoint. The genetic
//! strategy lives in [`crate::genetic`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::SequencingError;
use crate::haversine::HaversineMatrix;
use crate::model::Coordinate;
use crate::traits::{DistanceMatrixProvider, RouteStrategy, RoutingGateway};

/// Average shuttle speed used for time estimates.
pub const AVERAGE_SPEED_KMH: f64 = 30.0;

/// Flat fuel cost per kilometer used for cost estimates.
pub const FUEL_COST_PER_KM: f64 = 0.12;

/// A proposed visiting order. Not committed until the optimizer applies it.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedRoute {
    /// Indices into the input waypoints, a permutation of `0..n`.
    pub order: Vec<usize>,
    /// Sum of consecutive legs plus the final leg to the end point.
    pub total_distance_meters: f64,
    pub estimated_time_minutes: f64,
    pub estimated_fuel_cost: f64,
}

impl SequencedRoute {
    pub fn new(order: Vec<usize>, total_distance_meters: f64) -> Self {
        let km = total_distance_meters / 1000.0;
        Self {
            order,
            total_distance_meters,
            estimated_time_minutes: km / AVERAGE_SPEED_KMH * 60.0,
            estimated_fuel_cost: km * FUEL_COST_PER_KM,
        }
    }

    /// Waypoints rearranged into the proposed order.
    pub fn apply<T: Clone>(&self, waypoints: &[T]) -> Vec<T> {
        self.order.iter().map(|&index| waypoints[index].clone()).collect()
    }
}

/// Distance matrix over `waypoints` followed by `end` (index `waypoints.len()`).
pub(crate) struct LegMatrix {
    matrix: Vec<Vec<f64>>,
    end: usize,
}

impl LegMatrix {
    pub(crate) fn build(
        waypoints: &[Coordinate],
        end: &Coordinate,
    ) -> Result<Self, SequencingError> {
        validate_coordinates(waypoints, end)?;

        let mut locations = Vec::with_capacity(waypoints.len() + 1);
        locations.extend_from_slice(waypoints);
        locations.push(end.clone());

        Ok(Self {
            matrix: HaversineMatrix.matrix_for(&locations),
            end: waypoints.len(),
        })
    }

    pub(crate) fn leg(&self, from: usize, to: usize) -> f64 {
        self.matrix[from][to]
    }

    pub(crate) fn waypoint_count(&self) -> usize {
        self.end
    }

    /// Consecutive legs of `order` plus the final leg to the end point.
    pub(crate) fn tour_distance(&self, order: &[usize]) -> f64 {
        let Some(&last) = order.last() else {
            return 0.0;
        };
        let legs: f64 = order.windows(2).map(|pair| self.leg(pair[0], pair[1])).sum();
        legs + self.leg(last, self.end)
    }
}

fn validate_coordinates(waypoints: &[Coordinate], end: &Coordinate) -> Result<(), SequencingError> {
    if let Some(index) = waypoints.iter().position(|waypoint| !waypoint.is_finite()) {
        return Err(SequencingError::InvalidCoordinate { index: Some(index) });
    }
    if !end.is_finite() {
        return Err(SequencingError::InvalidCoordinate { index: None });
    }
    Ok(())
}

/// True when `order` visits each of `0..n` exactly once.
pub fn is_permutation(order: &[usize], n: usize) -> bool {
    if order.len() != n {
        return false;
    }
    let mut seen = vec![false; n];
    for &index in order {
        match seen.get_mut(index) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

// ============================================================================
// Nearest Neighbor
// ============================================================================

/// Greedy ordering: start at the first waypoint, always move to the closest
/// unvisited one, finish at the end point. Deterministic, O(n²).
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbor;

impl NearestNeighbor {
    pub const NAME: &'static str = "nearest-neighbor";

    pub(crate) fn order(legs: &LegMatrix) -> Vec<usize> {
        let n = legs.waypoint_count();
        if n == 0 {
            return Vec::new();
        }

        let mut visited = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let mut current = 0;
        visited[0] = true;
        order.push(0);

        while order.len() < n {
            let mut nearest: Option<(usize, f64)> = None;
            for candidate in (0..n).filter(|&candidate| !visited[candidate]) {
                let distance = legs.leg(current, candidate);
                if nearest.is_none_or(|(_, best)| distance < best) {
                    nearest = Some((candidate, distance));
                }
            }

            let Some((next, _)) = nearest else { break };
            visited[next] = true;
            order.push(next);
            current = next;
        }

        order
    }
}

impl RouteStrategy for NearestNeighbor {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn sequence(
        &self,
        waypoints: &[Coordinate],
        end: &Coordinate,
    ) -> Result<SequencedRoute, SequencingError> {
        let legs = LegMatrix::build(waypoints, end)?;
        let order = Self::order(&legs);
        let distance = legs.tour_distance(&order);
        debug!(
            waypoints = waypoints.len(),
            distance_m = distance,
            "nearest-neighbor sequence"
        );
        Ok(SequencedRoute::new(order, distance))
    }
}

// ============================================================================
// Routing service optimization
// ============================================================================

/// Asks the routing service's optimization endpoint for the order and falls
/// back to [`NearestNeighbor`] whenever it is unavailable.
pub struct ExternalOptimizerStrategy {
    gateway: Arc<dyn RoutingGateway>,
}

impl ExternalOptimizerStrategy {
    pub const NAME: &'static str = "external-optimizer";

    pub fn new(gateway: Arc<dyn RoutingGateway>) -> Self {
        Self { gateway }
    }
}

impl RouteStrategy for ExternalOptimizerStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn sequence(
        &self,
        waypoints: &[Coordinate],
        end: &Coordinate,
    ) -> Result<SequencedRoute, SequencingError> {
        let legs = LegMatrix::build(waypoints, end)?;
        if waypoints.len() < 2 {
            let order = NearestNeighbor::order(&legs);
            let distance = legs.tour_distance(&order);
            return Ok(SequencedRoute::new(order, distance));
        }

        let order = match self.gateway.optimize_order(waypoints, end) {
            Ok(order) if is_permutation(&order, waypoints.len()) => order,
            Ok(_) => {
                warn!("routing service returned an incomplete stop order, using nearest neighbor");
                NearestNeighbor::order(&legs)
            }
            Err(err) => {
                warn!(error = %err, "routing optimization unavailable, using nearest neighbor");
                NearestNeighbor::order(&legs)
            }
        };

        let distance = legs.tour_distance(&order);
        Ok(SequencedRoute::new(order, distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutingUnavailable;
    use crate::polyline::RouteGeometry;

    fn line(lngs: &[f64]) -> Vec<Coordinate> {
        lngs.iter().map(|&lng| Coordinate::new(0.0, lng)).collect()
    }

    #[test]
    fn test_nearest_neighbor_greedy_order() {
        // Starting at 0.0, the closest is 0.1, then 0.3, then 0.9.
        let waypoints = line(&[0.0, 0.9, 0.1, 0.3]);
        let end = Coordinate::new(0.0, 1.0);

        let route = NearestNeighbor.sequence(&waypoints, &end).unwrap();

        assert_eq!(route.order, vec![0, 2, 3, 1]);
        assert!(is_permutation(&route.order, waypoints.len()));
    }

    #[test]
    fn test_nearest_neighbor_includes_final_leg() {
        let waypoints = line(&[0.0]);
        let end = Coordinate::new(0.0, 0.01);

        let route = NearestNeighbor.sequence(&waypoints, &end).unwrap();

        let expected = crate::haversine::distance_meters(&waypoints[0], &end);
        assert_eq!(route.order, vec![0]);
        assert!((route.total_distance_meters - expected).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_neighbor_empty() {
        let route = NearestNeighbor.sequence(&[], &Coordinate::new(0.0, 0.0)).unwrap();
        assert!(route.order.is_empty());
        assert_eq!(route.total_distance_meters, 0.0);
    }

    #[test]
    fn test_rejects_non_finite_coordinates() {
        let waypoints = vec![Coordinate::new(0.0, 0.0), Coordinate::new(f64::NAN, 0.0)];
        let err = NearestNeighbor.sequence(&waypoints, &Coordinate::new(0.0, 1.0)).unwrap_err();
        assert_eq!(err, SequencingError::InvalidCoordinate { index: Some(1) });

        let err = NearestNeighbor
            .sequence(&waypoints[..1], &Coordinate::new(f64::INFINITY, 1.0))
            .unwrap_err();
        assert_eq!(err, SequencingError::InvalidCoordinate { index: None });
    }

    #[test]
    fn test_estimates_are_linear_in_distance() {
        let route = SequencedRoute::new(vec![], 15_000.0);
        assert!((route.estimated_time_minutes - 30.0).abs() < 1e-9);
        assert!((route.estimated_fuel_cost - 1.8).abs() < 1e-9);
    }

    #[test]
    fn test_is_permutation() {
        assert!(is_permutation(&[2, 0, 1], 3));
        assert!(!is_permutation(&[0, 0, 1], 3));
        assert!(!is_permutation(&[0, 1], 3));
        assert!(!is_permutation(&[0, 1, 3], 3));
    }

    struct FixedGateway(Result<Vec<usize>, RoutingUnavailable>);

    impl RoutingGateway for FixedGateway {
        fn fetch_road_geometry(
            &self,
            _coordinates: &[Coordinate],
        ) -> Result<RouteGeometry, RoutingUnavailable> {
            Err(RoutingUnavailable::MissingCredentials)
        }

        fn optimize_order(
            &self,
            _stops: &[Coordinate],
            _end: &Coordinate,
        ) -> Result<Vec<usize>, RoutingUnavailable> {
            self.0.clone()
        }
    }

    fn external(result: Result<Vec<usize>, RoutingUnavailable>) -> ExternalOptimizerStrategy {
        ExternalOptimizerStrategy::new(Arc::new(FixedGateway(result)))
    }

    #[test]
    fn test_external_optimizer_uses_service_order() {
        let strategy = external(Ok(vec![2, 1, 0]));
        let route = strategy
            .sequence(&line(&[0.0, 0.1, 0.2]), &Coordinate::new(0.0, 1.0))
            .unwrap();
        assert_eq!(route.order, vec![2, 1, 0]);
    }

    #[test]
    fn test_external_optimizer_falls_back() {
        let waypoints = line(&[0.0, 0.9, 0.1]);
        let end = Coordinate::new(0.0, 1.0);

        let unavailable = external(Err(RoutingUnavailable::Status { status: 503 }));
        assert_eq!(unavailable.sequence(&waypoints, &end).unwrap().order, vec![0, 2, 1]);

        let bogus = external(Ok(vec![0, 0, 1]));
        assert_eq!(bogus.sequence(&waypoints, &end).unwrap().order, vec![0, 2, 1]);
    }
}
