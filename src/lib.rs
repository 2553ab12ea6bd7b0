//! pickup-router core
//!
//! Assigns employees to capacity-limited pickup points and orders each
//! route's pickups, with road geometry from an external routing service
//! and an expiring cache in front of the expensive calls.

pub mod assignment;
pub mod cache;
pub mod cache_key;
pub mod error;
pub mod genetic;
pub mod haversine;
pub mod model;
pub mod occupancy;
pub mod optimizer;
pub mod ors;
pub mod polyline;
pub mod solver;
pub mod traits;
