//! Route catalog, employee assignment and per-route optimization.
//!
//! [`RouteOptimizer`] owns the catalog loaded by `initialize_routes` and
//! wires the assignment engine, the sequencing strategy, the routing
//! gateway and the caches together. Collaborators and caches are injected
//! at construction; nothing here is global.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::assignment::{DEFAULT_MAX_DISTANCE_M, PickupAssignmentEngine, catalog_candidates};
use crate::cache::{CacheConfig, ExpiringCache};
use crate::cache_key::{self, CacheKey};
use crate::error::{AssignmentError, CacheKeyError, CatalogError, SequencingError};
use crate::genetic::{GeneticOptions, GeneticStrategy};
use crate::model::{
    AssignmentResult, Coordinate, Employee, PickupPoint, PickupPointId, Route, RouteId,
};
use crate::occupancy::OccupancyLedger;
use crate::polyline::RouteGeometry;
use crate::solver::{
    ExternalOptimizerStrategy, NearestNeighbor, SequencedRoute, is_permutation,
};
use crate::traits::{Geocoder, RouteStrategy, RoutingGateway};

/// Built-in sequencing strategies selectable through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencingStrategy {
    #[default]
    NearestNeighbor,
    Genetic,
    /// Routing service optimization endpoint, nearest neighbor as fallback.
    External,
}

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub strategy: SequencingStrategy,
    pub genetic: GeneticOptions,
    pub max_assignment_distance_m: f64,
    /// Lifetime of memoized optimizations with road geometry.
    pub optimization_ttl: Duration,
    /// Lifetime of memoized optimizations that fell back to straight lines,
    /// so an outage is retried sooner.
    pub fallback_ttl: Duration,
    pub geocode_ttl: Duration,
    pub cache: CacheConfig,
    /// How often `assign_and_reserve` retries after losing a seat race.
    pub reservation_attempts: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            strategy: SequencingStrategy::NearestNeighbor,
            genetic: GeneticOptions::default(),
            max_assignment_distance_m: DEFAULT_MAX_DISTANCE_M,
            optimization_ttl: Duration::from_secs(30 * 60),
            fallback_ttl: Duration::from_secs(60),
            geocode_ttl: Duration::from_secs(24 * 60 * 60),
            cache: CacheConfig::default(),
            reservation_attempts: 3,
        }
    }
}

/// Memoized outcome of optimizing one route.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedRoute {
    pub pickup_order: Vec<PickupPointId>,
    pub sequence: SequencedRoute,
    pub geometry: RouteGeometry,
}

pub type OptimizationCache = ExpiringCache<CacheKey, OptimizedRoute>;
pub type GeocodeCache = ExpiringCache<CacheKey, Coordinate>;

#[derive(Default)]
struct Catalog {
    routes: Vec<Route>,
    /// Pickup id → (route index, pickup index).
    pickup_index: HashMap<PickupPointId, (usize, usize)>,
    ledger: Arc<OccupancyLedger>,
}

impl Catalog {
    fn build(mut routes: Vec<Route>) -> Self {
        for route in &mut routes {
            drop_repeated_pickups(route);
        }

        let mut pickup_index = HashMap::new();
        for (route_idx, route) in routes.iter().enumerate() {
            for (pickup_idx, pickup) in route.pickup_points.iter().enumerate() {
                if pickup_index.contains_key(&pickup.id) {
                    warn!(
                        pickup_point = %pickup.id,
                        route = %route.id,
                        "pickup point id already used by another route, ignored in index"
                    );
                    continue;
                }
                pickup_index.insert(pickup.id.clone(), (route_idx, pickup_idx));
            }
        }

        let ledger = OccupancyLedger::from_pickups(
            pickup_index
                .values()
                .map(|&(route_idx, pickup_idx)| &routes[route_idx].pickup_points[pickup_idx]),
        );

        Self {
            routes,
            pickup_index,
            ledger: Arc::new(ledger),
        }
    }

    fn reindex(&mut self) {
        self.pickup_index.clear();
        for (route_idx, route) in self.routes.iter().enumerate() {
            for (pickup_idx, pickup) in route.pickup_points.iter().enumerate() {
                self.pickup_index.entry(pickup.id.clone()).or_insert((route_idx, pickup_idx));
            }
        }
    }

    /// Routes with occupancy taken from the ledger.
    fn live_routes(&self) -> Vec<Route> {
        self.routes.iter().map(|route| with_live_occupancy(route, &self.ledger)).collect()
    }
}

/// Keeps the first pickup for each id; a route visits a point once.
fn drop_repeated_pickups(route: &mut Route) {
    let mut seen = HashSet::new();
    let before = route.pickup_points.len();
    route.pickup_points.retain(|pickup| seen.insert(pickup.id.clone()));

    let dropped = before - route.pickup_points.len();
    if dropped > 0 {
        warn!(route = %route.id, dropped, "repeated pickup point ids dropped from route");
    }
}

fn with_live_occupancy(route: &Route, ledger: &OccupancyLedger) -> Route {
    let mut route = route.clone();
    for pickup in &mut route.pickup_points {
        if let Some(occupancy) = ledger.occupancy(&pickup.id) {
            pickup.current_occupancy = occupancy;
        }
    }
    route
}

pub struct RouteOptimizer {
    config: OptimizerConfig,
    engine: PickupAssignmentEngine,
    strategy: Box<dyn RouteStrategy>,
    gateway: Arc<dyn RoutingGateway>,
    geocoder: Arc<dyn Geocoder>,
    optimization_cache: Arc<OptimizationCache>,
    geocode_cache: Arc<GeocodeCache>,
    catalog: RwLock<Catalog>,
}

impl RouteOptimizer {
    pub fn new(
        config: OptimizerConfig,
        gateway: Arc<dyn RoutingGateway>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        let strategy = build_strategy(&config, &gateway);
        let optimization_cache = Arc::new(ExpiringCache::new(config.cache.clone()));
        let geocode_cache = Arc::new(ExpiringCache::new(config.cache.clone()));

        Self {
            engine: PickupAssignmentEngine::new(config.max_assignment_distance_m),
            config,
            strategy,
            gateway,
            geocoder,
            optimization_cache,
            geocode_cache,
            catalog: RwLock::new(Catalog::default()),
        }
    }

    /// Shares caches created elsewhere (e.g. one per process).
    pub fn with_caches(
        mut self,
        optimization_cache: Arc<OptimizationCache>,
        geocode_cache: Arc<GeocodeCache>,
    ) -> Self {
        self.optimization_cache = optimization_cache;
        self.geocode_cache = geocode_cache;
        self
    }

    /// Replaces the configured sequencing strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn RouteStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn optimization_cache(&self) -> &Arc<OptimizationCache> {
        &self.optimization_cache
    }

    pub fn geocode_cache(&self) -> &Arc<GeocodeCache> {
        &self.geocode_cache
    }

    fn read_catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_catalog(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    /// Replaces the catalog wholesale and drops memoized optimizations.
    pub fn initialize_routes(&self, routes: Vec<Route>) {
        let catalog = Catalog::build(routes);
        info!(
            routes = catalog.routes.len(),
            pickup_points = catalog.pickup_index.len(),
            "route catalog initialized"
        );
        *self.write_catalog() = catalog;
        self.optimization_cache
            .invalidate_prefix(&CacheKey::domain_prefix(cache_key::ROUTE_OPTIMIZATION));
    }

    pub fn routes(&self) -> Vec<Route> {
        self.read_catalog().live_routes()
    }

    pub fn route_by_id(&self, id: &RouteId) -> Result<Route, CatalogError> {
        let catalog = self.read_catalog();
        catalog
            .routes
            .iter()
            .find(|route| &route.id == id)
            .map(|route| with_live_occupancy(route, &catalog.ledger))
            .ok_or_else(|| CatalogError::RouteNotFound(id.clone()))
    }

    pub fn pickup_point_by_id(&self, id: &PickupPointId) -> Result<PickupPoint, CatalogError> {
        let catalog = self.read_catalog();
        let &(route_idx, pickup_idx) = catalog
            .pickup_index
            .get(id)
            .ok_or_else(|| CatalogError::PickupPointNotFound(id.clone()))?;

        let mut pickup = catalog.routes[route_idx].pickup_points[pickup_idx].clone();
        if let Some(occupancy) = catalog.ledger.occupancy(id) {
            pickup.current_occupancy = occupancy;
        }
        Ok(pickup)
    }

    // ========================================================================
    // Assignment
    // ========================================================================

    /// Nearest pickup point with a free seat within range of the employee.
    /// Does not reserve the seat.
    pub fn assign_employee_to_route(
        &self,
        employee: &Employee,
    ) -> Result<AssignmentResult, AssignmentError> {
        let point = self.locate(employee)?;
        let routes = self.read_catalog().live_routes();
        self.engine.assign(&point, catalog_candidates(&routes))
    }

    /// Assigns and takes the seat in one step. When another caller takes
    /// the last seat first, the search runs again without that point.
    pub fn assign_and_reserve(
        &self,
        employee: &Employee,
    ) -> Result<AssignmentResult, AssignmentError> {
        let point = self.locate(employee)?;
        let mut last_error = AssignmentError::NotFound;

        for attempt in 0..self.config.reservation_attempts.max(1) {
            let (routes, ledger) = {
                let catalog = self.read_catalog();
                (catalog.live_routes(), Arc::clone(&catalog.ledger))
            };
            let result = self.engine.assign(&point, catalog_candidates(&routes))?;

            match ledger.try_reserve(&result.pickup_point_id) {
                Ok(_) => return Ok(result),
                Err(err) => {
                    debug!(
                        employee = %employee.id,
                        attempt,
                        error = %err,
                        "lost seat race, retrying"
                    );
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }

    /// Frees a seat taken by [`assign_and_reserve`](Self::assign_and_reserve).
    pub fn release_seat(&self, id: &PickupPointId) -> Result<u32, CatalogError> {
        let ledger = Arc::clone(&self.read_catalog().ledger);
        ledger.release(id)
    }

    fn locate(&self, employee: &Employee) -> Result<Coordinate, AssignmentError> {
        if let Some(location) = &employee.location {
            return Ok(location.clone());
        }

        let address = employee.address.trim();
        let failure = || AssignmentError::GeocodeFailure {
            address: employee.address.clone(),
        };
        if address.is_empty() {
            return Err(failure());
        }

        let resolve = || self.geocoder.resolve(address).ok_or_else(failure);
        match geocode_key(address) {
            Ok(key) => self
                .geocode_cache
                .try_get_or_set(key, Some(self.config.geocode_ttl), resolve),
            Err(_) => resolve(),
        }
    }

    // ========================================================================
    // Optimization
    // ========================================================================

    /// Re-sequences every route in parallel and attaches geometry.
    ///
    /// A route whose sequencing fails keeps its previous order and geometry;
    /// the call always returns the full route list.
    pub fn optimize_routes(&self) -> Vec<Route> {
        let routes = self.read_catalog().routes.clone();

        let outcomes: Vec<(RouteId, Option<OptimizedRoute>)> = routes
            .par_iter()
            .map(|route| match self.optimize_route(route) {
                Ok(optimized) => (route.id.clone(), Some(optimized)),
                Err(err) => {
                    warn!(
                        route = %route.id,
                        error = %err,
                        "route optimization failed, keeping previous sequence"
                    );
                    (route.id.clone(), None)
                }
            })
            .collect();

        let failed = outcomes.iter().filter(|(_, outcome)| outcome.is_none()).count();
        let mut catalog = self.write_catalog();
        for (id, outcome) in outcomes {
            let Some(optimized) = outcome else { continue };
            if let Some(route) = catalog.routes.iter_mut().find(|route| route.id == id) {
                apply_optimization(route, optimized);
            }
        }
        catalog.reindex();
        info!(
            routes = catalog.routes.len(),
            failed,
            strategy = self.strategy.name(),
            "routes optimized"
        );

        catalog.live_routes()
    }

    /// Sequence + geometry for one route, memoized by route, strategy,
    /// coordinates and pickup ids.
    pub fn optimize_route(&self, route: &Route) -> Result<OptimizedRoute, SequencingError> {
        let key = match optimization_key(route, self.strategy.name()) {
            Ok(key) => key,
            Err(err) => {
                debug!(route = %route.id, error = %err, "route not cacheable");
                return self.compute_optimization(route);
            }
        };

        if let Some(cached) = self.optimization_cache.get(&key) {
            debug!(route = %route.id, "optimization cache hit");
            return Ok(cached);
        }

        let optimized = self.compute_optimization(route)?;
        let ttl = if optimized.geometry.is_road_accurate() {
            self.config.optimization_ttl
        } else {
            self.config.fallback_ttl
        };
        self.optimization_cache.set_with_ttl(key, optimized.clone(), ttl);
        Ok(optimized)
    }

    fn compute_optimization(&self, route: &Route) -> Result<OptimizedRoute, SequencingError> {
        let waypoints: Vec<Coordinate> = route
            .pickup_points
            .iter()
            .map(|pickup| pickup.location.clone())
            .collect();
        let sequence = self.strategy.sequence(&waypoints, &route.end_point)?;
        if !is_permutation(&sequence.order, waypoints.len()) {
            return Err(SequencingError::InvalidOrder {
                strategy: self.strategy.name().to_string(),
            });
        }

        let ordered = sequence.apply(&route.pickup_points);
        let mut path = Vec::with_capacity(ordered.len() + 2);
        path.push(route.start_point.clone());
        path.extend(ordered.iter().map(|pickup| pickup.location.clone()));
        path.push(route.end_point.clone());

        let geometry = match self.gateway.fetch_road_geometry(&path) {
            Ok(geometry) => geometry,
            Err(err) => {
                warn!(
                    route = %route.id,
                    error = %err,
                    "routing unavailable, using straight-line geometry"
                );
                RouteGeometry::straight_line(&path)
            }
        };

        Ok(OptimizedRoute {
            pickup_order: ordered.into_iter().map(|pickup| pickup.id).collect(),
            sequence,
            geometry,
        })
    }
}

fn build_strategy(
    config: &OptimizerConfig,
    gateway: &Arc<dyn RoutingGateway>,
) -> Box<dyn RouteStrategy> {
    match config.strategy {
        SequencingStrategy::NearestNeighbor => Box::new(NearestNeighbor),
        SequencingStrategy::Genetic => Box::new(GeneticStrategy::new(config.genetic.clone())),
        SequencingStrategy::External => {
            Box::new(ExternalOptimizerStrategy::new(Arc::clone(gateway)))
        }
    }
}

/// Reorders the route's pickups to the optimized order and attaches the
/// geometry. Leaves the route alone if the pickup set has changed.
fn apply_optimization(route: &mut Route, optimized: OptimizedRoute) {
    let reordered: Option<Vec<PickupPoint>> = {
        let mut by_id: HashMap<&PickupPointId, &PickupPoint> =
            route.pickup_points.iter().map(|pickup| (&pickup.id, pickup)).collect();
        let reordered: Option<Vec<PickupPoint>> = optimized
            .pickup_order
            .iter()
            .map(|id| by_id.remove(id).cloned())
            .collect();
        reordered.filter(|_| by_id.is_empty())
    };

    match reordered {
        Some(pickups) => {
            route.pickup_points = pickups;
            route.route_geometry = Some(optimized.geometry);
        }
        _ => warn!(route = %route.id, "pickup set changed during optimization, result discarded"),
    }
}

/// `route-optimization:{route}:{strategy}:{fingerprint}:{pickup ids, sorted}`.
///
/// Pickups are taken in id order so the key names the pickup set, not the
/// current order; re-running after the order was applied hits the same
/// entry. The fingerprint covers every coordinate, so moving a pickup or
/// an end point misses.
pub fn optimization_key(route: &Route, strategy: &str) -> Result<CacheKey, CacheKeyError> {
    let mut pickups: Vec<&PickupPoint> = route.pickup_points.iter().collect();
    pickups.sort_unstable_by(|a, b| a.id.cmp(&b.id));

    let key = CacheKey::new(cache_key::ROUTE_OPTIMIZATION)?
        .push(route.id.as_str())?
        .push(strategy)?
        .push(coordinate_fingerprint(route, &pickups))?;
    pickups
        .into_iter()
        .try_fold(key, |key, pickup| key.push(pickup.id.as_str()))
}

/// Hex hash of the exact start, end and pickup coordinate bits.
fn coordinate_fingerprint(route: &Route, pickups: &[&PickupPoint]) -> String {
    let mut hasher = DefaultHasher::new();
    let locations = pickups.iter().map(|pickup| &pickup.location);
    for coordinate in [&route.start_point, &route.end_point].into_iter().chain(locations) {
        coordinate.latitude.to_bits().hash(&mut hasher);
        coordinate.longitude.to_bits().hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

fn geocode_key(address: &str) -> Result<CacheKey, CacheKeyError> {
    CacheKey::new(cache_key::GEOCODE)?.push(cache_key::normalize_segment(address))
}
