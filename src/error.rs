//! Error types for assignment, sequencing, routing and catalog lookups.
//!
//! Every variant is a recoverable outcome. Only `AssignmentError` and
//! `CatalogError` reach callers of the optimizer; routing and sequencing
//! failures are absorbed per route.

use thiserror::Error;

use crate::model::{PickupPointId, RouteId};

/// Why an employee could not be placed on a pickup point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignmentError {
    /// The employee's address could not be resolved to a coordinate.
    #[error("could not geocode address `{address}`")]
    GeocodeFailure { address: String },
    /// Every pickup point is out of range or full.
    #[error("no pickup point available nearby")]
    NotFound,
    /// The chosen pickup point filled up before a seat could be reserved.
    #[error("pickup point {0} has no free seats")]
    CapacityExhausted(PickupPointId),
}

/// Why the external routing service produced no usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingUnavailable {
    #[error("routing service credentials are not configured")]
    MissingCredentials,
    #[error("at least two coordinates are required, got {0}")]
    TooFewCoordinates(usize),
    #[error("routing service transport failure: {0}")]
    Transport(String),
    #[error("routing service returned HTTP {status}")]
    Status { status: u16 },
    #[error("routing service response was malformed: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for RoutingUnavailable {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => RoutingUnavailable::Status {
                status: status.as_u16(),
            },
            None if err.is_decode() => RoutingUnavailable::MalformedResponse(err.to_string()),
            None => RoutingUnavailable::Transport(err.to_string()),
        }
    }
}

/// Why a visiting order could not be produced for a route.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequencingError {
    /// Waypoint at `index` (or the end point when `index` is `None`) has a
    /// non-finite latitude or longitude.
    #[error("coordinate {index:?} is not a finite lat/lng pair")]
    InvalidCoordinate { index: Option<usize> },
    /// A strategy returned an order that is not a permutation of its input.
    #[error("strategy `{strategy}` returned an invalid visiting order")]
    InvalidOrder { strategy: String },
}

/// Catalog lookups that found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("route {0} not found")]
    RouteNotFound(RouteId),
    #[error("pickup point {0} not found")]
    PickupPointNotFound(PickupPointId),
}

/// Validation errors for [`crate::cache_key::CacheKey`] segments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheKeyError {
    #[error("cache key segment must not be empty")]
    EmptySegment,
    #[error("cache key segment `{0}` contains a reserved character")]
    ReservedCharacter(String),
}
