//! Test fixtures for pickup-router.
//!
//! Provides:
//! - Real Las Vegas / Henderson locations (from OpenStreetMap)
//! - Builders for routes, pickup points and employees
//! - Recording doubles for the routing gateway and the geocoder

pub mod las_vegas_locations;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pickup_router::error::RoutingUnavailable;
use pickup_router::haversine::{EARTH_RADIUS_M, distance_meters};
use pickup_router::model::{Coordinate, Employee, PickupPoint, Route};
use pickup_router::optimizer::{OptimizerConfig, RouteOptimizer};
use pickup_router::polyline::{GeometrySource, Polyline, RouteGeometry};
use pickup_router::traits::{Geocoder, RoutingGateway};

pub use las_vegas_locations::*;

// ============================================================================
// Geometry helpers
// ============================================================================

pub const ORIGIN: (f64, f64) = (36.0, -115.0);

/// Road distance reported by [`StubGateway`] per meter of straight line.
pub const ROAD_FACTOR: f64 = 1.3;

/// A coordinate `meters` due north of [`ORIGIN`] (negative goes south).
pub fn north(meters: f64) -> Coordinate {
    let degrees = meters / (EARTH_RADIUS_M * std::f64::consts::PI / 180.0);
    Coordinate::new(ORIGIN.0 + degrees, ORIGIN.1)
}

/// Haversine length of the path through `coordinates` in order.
pub fn path_length(coordinates: &[Coordinate]) -> f64 {
    coordinates
        .windows(2)
        .map(|pair| distance_meters(&pair[0], &pair[1]))
        .sum()
}

// ============================================================================
// Builders
// ============================================================================

pub fn pickup(id: &str, location: Coordinate, capacity: u32) -> PickupPoint {
    PickupPoint::new(id, format!("Stop {id}"), location, capacity)
}

/// Route with the given pickups, starting 5 km south of the origin and
/// ending 5 km north of it.
pub fn route(id: &str, pickups: Vec<PickupPoint>) -> Route {
    let mut route = Route::new(id, format!("Route {id}"), north(-5000.0), north(5000.0));
    route.pickup_points = pickups;
    route
}

/// Route from one Las Vegas depot through the given locations to another.
pub fn vegas_route(id: &str, start: &Location, stops: &[Location], end: &Location) -> Route {
    let mut route = Route::new(id, format!("Route {id}"), start.coordinate(), end.coordinate());
    route.pickup_points = stops
        .iter()
        .enumerate()
        .map(|(index, stop)| {
            PickupPoint::new(format!("{id}-p{index}"), stop.name, stop.coordinate(), 12)
        })
        .collect();
    route
}

pub fn employee_at(id: &str, location: Coordinate) -> Employee {
    Employee::new(id, format!("Employee {id}"), "").located_at(location)
}

pub fn employee_with_address(id: &str, address: &str) -> Employee {
    Employee::new(id, format!("Employee {id}"), address)
}

pub fn optimizer(
    config: OptimizerConfig,
    gateway: Arc<StubGateway>,
    geocoder: Arc<StubGeocoder>,
) -> RouteOptimizer {
    RouteOptimizer::new(config, gateway, geocoder)
}

/// Default configuration and an empty address book.
pub fn default_optimizer(gateway: Arc<StubGateway>) -> RouteOptimizer {
    optimizer(OptimizerConfig::default(), gateway, StubGeocoder::empty())
}

// ============================================================================
// Doubles
// ============================================================================

/// Routing gateway that answers from the input coordinates and counts
/// calls. When unavailable every call fails with HTTP 503.
pub struct StubGateway {
    available: bool,
    geometry_calls: AtomicUsize,
    optimization_calls: AtomicUsize,
}

impl StubGateway {
    pub fn available() -> Arc<Self> {
        Arc::new(Self {
            available: true,
            geometry_calls: AtomicUsize::new(0),
            optimization_calls: AtomicUsize::new(0),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            available: false,
            geometry_calls: AtomicUsize::new(0),
            optimization_calls: AtomicUsize::new(0),
        })
    }

    pub fn geometry_calls(&self) -> usize {
        self.geometry_calls.load(Ordering::SeqCst)
    }

    pub fn optimization_calls(&self) -> usize {
        self.optimization_calls.load(Ordering::SeqCst)
    }
}

impl RoutingGateway for StubGateway {
    fn fetch_road_geometry(
        &self,
        coordinates: &[Coordinate],
    ) -> Result<RouteGeometry, RoutingUnavailable> {
        self.geometry_calls.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(RoutingUnavailable::Status { status: 503 });
        }

        let distance = path_length(coordinates);
        Ok(RouteGeometry {
            polyline: Polyline::through(coordinates),
            distance_meters: distance * ROAD_FACTOR,
            duration_seconds: distance / 8.0,
            way_points: (0..coordinates.len()).collect(),
            source: GeometrySource::Road,
        })
    }

    /// Visits stops in reverse input order, keeping the first one first.
    fn optimize_order(
        &self,
        stops: &[Coordinate],
        _end: &Coordinate,
    ) -> Result<Vec<usize>, RoutingUnavailable> {
        self.optimization_calls.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(RoutingUnavailable::Status { status: 503 });
        }
        let mut order = vec![0];
        order.extend((1..stops.len()).rev());
        Ok(order)
    }
}

/// Geocoder backed by a fixed address book.
#[derive(Default)]
pub struct StubGeocoder {
    known: HashMap<String, Coordinate>,
    calls: AtomicUsize,
}

impl StubGeocoder {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(entries: &[(&str, Coordinate)]) -> Arc<Self> {
        Arc::new(Self {
            known: entries
                .iter()
                .map(|(address, coordinate)| (address.to_string(), coordinate.clone()))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Geocoder for StubGeocoder {
    fn resolve(&self, address: &str) -> Option<Coordinate> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.known.get(address).cloned()
    }
}
