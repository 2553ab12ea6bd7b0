//! Domain records shared by the assignment and optimization engines.
//!
//! These mirror what the personnel and transport stores hand us. The core
//! only reads them; persistence lives elsewhere.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::polyline::RouteGeometry;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a transport route.
    RouteId
);
string_id!(
    /// Identifier of a pickup point, unique across all routes.
    PickupPointId
);
string_id!(
    /// Identifier of an employee record.
    EmployeeId
);

/// A geographic position with a descriptive address.
///
/// Two coordinates are equal when their latitude/longitude pair is equal;
/// the address never takes part in comparisons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: String,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            address: String::new(),
        }
    }

    pub fn with_address(latitude: f64, longitude: f64, address: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            address: address.into(),
        }
    }

    /// `(lat, lng)` pair.
    pub fn lat_lng(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// `[lng, lat]` pair, the order routing services expect.
    pub fn lng_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    pub fn is_finite(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

/// A capacity-limited stop on a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupPoint {
    pub id: PickupPointId,
    pub name: String,
    pub location: Coordinate,
    pub current_occupancy: u32,
    pub max_capacity: u32,
}

impl PickupPoint {
    pub fn new(
        id: impl Into<PickupPointId>,
        name: impl Into<String>,
        location: Coordinate,
        max_capacity: u32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location,
            current_occupancy: 0,
            max_capacity,
        }
    }

    pub fn with_occupancy(mut self, occupancy: u32) -> Self {
        self.current_occupancy = occupancy;
        self
    }

    /// True while at least one seat is still open.
    pub fn has_capacity(&self) -> bool {
        self.current_occupancy < self.max_capacity
    }
}

/// A route from a start point through ordered pickups to a fixed end point.
///
/// `pickup_points` order is the currently assigned visiting sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub name: String,
    pub start_point: Coordinate,
    pub pickup_points: Vec<PickupPoint>,
    pub end_point: Coordinate,
    #[serde(default)]
    pub route_geometry: Option<RouteGeometry>,
}

impl Route {
    pub fn new(
        id: impl Into<RouteId>,
        name: impl Into<String>,
        start_point: Coordinate,
        end_point: Coordinate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            start_point,
            pickup_points: Vec::new(),
            end_point,
            route_geometry: None,
        }
    }

    pub fn with_pickup(mut self, pickup: PickupPoint) -> Self {
        self.pickup_points.push(pickup);
        self
    }

    /// Start point, pickups in order, then end point.
    pub fn path(&self) -> Vec<Coordinate> {
        let mut path = Vec::with_capacity(self.pickup_points.len() + 2);
        path.push(self.start_point.clone());
        path.extend(self.pickup_points.iter().map(|pickup| pickup.location.clone()));
        path.push(self.end_point.clone());
        path
    }
}

/// Outcome of a successful pickup assignment. Not persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub route_id: RouteId,
    pub pickup_point_id: PickupPointId,
    pub distance_meters: f64,
    pub pickup_location: Coordinate,
}

/// The slice of a personnel record this crate reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub full_name: String,
    pub address: String,
    #[serde(default)]
    pub location: Option<Coordinate>,
}

impl Employee {
    pub fn new(
        id: impl Into<EmployeeId>,
        full_name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            full_name: full_name.into(),
            address: address.into(),
            location: None,
        }
    }

    pub fn located_at(mut self, location: Coordinate) -> Self {
        self.location = Some(location);
        self
    }
}
