//! Seat bookkeeping for pickup points.
//!
//! The ledger is the only place occupancy changes. Reservations are a
//! compare-and-increment on an atomic counter, so two concurrent callers
//! can never both take the last free seat.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use crate::error::{AssignmentError, CatalogError};
use crate::model::{PickupPoint, PickupPointId};

#[derive(Debug)]
struct Seats {
    occupied: AtomicU32,
    capacity: u32,
}

/// Per-pickup-point occupancy counters seeded from the catalog.
#[derive(Debug, Default)]
pub struct OccupancyLedger {
    seats: HashMap<PickupPointId, Seats>,
}

impl OccupancyLedger {
    pub fn from_pickups<'a>(pickups: impl IntoIterator<Item = &'a PickupPoint>) -> Self {
        let seats = pickups
            .into_iter()
            .map(|pickup| {
                let seats = Seats {
                    occupied: AtomicU32::new(pickup.current_occupancy.min(pickup.max_capacity)),
                    capacity: pickup.max_capacity,
                };
                (pickup.id.clone(), seats)
            })
            .collect();
        Self { seats }
    }

    /// Current occupancy, `None` for unknown points.
    pub fn occupancy(&self, id: &PickupPointId) -> Option<u32> {
        self.seats.get(id).map(|seats| seats.occupied.load(Ordering::Acquire))
    }

    /// Takes one seat. Fails when the point is full or unknown.
    pub fn try_reserve(&self, id: &PickupPointId) -> Result<u32, AssignmentError> {
        let seats = self
            .seats
            .get(id)
            .ok_or_else(|| AssignmentError::CapacityExhausted(id.clone()))?;

        let reserved = seats
            .occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |occupied| {
                (occupied < seats.capacity).then_some(occupied + 1)
            })
            .map_err(|_| AssignmentError::CapacityExhausted(id.clone()))?;

        debug!(
            pickup_point = %id,
            occupancy = reserved + 1,
            capacity = seats.capacity,
            "reserved seat"
        );
        Ok(reserved + 1)
    }

    /// Gives one seat back. Never drops below zero.
    pub fn release(&self, id: &PickupPointId) -> Result<u32, CatalogError> {
        let seats = self
            .seats
            .get(id)
            .ok_or_else(|| CatalogError::PickupPointNotFound(id.clone()))?;

        let previous = seats
            .occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |occupied| {
                Some(occupied.saturating_sub(1))
            })
            .unwrap_or_else(|occupied| occupied);
        Ok(previous.saturating_sub(1))
    }
}
