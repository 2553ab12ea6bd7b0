//! Real Las Vegas / Henderson locations for realistic test fixtures.
//!
//! Coordinates sourced from OpenStreetMap. Grouped the way a shuttle
//! operator would: depots first, then pickup clusters by neighborhood.

use pickup_router::model::Coordinate;

/// A named location with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::with_address(self.lat, self.lng, self.name)
    }
}

// ============================================================================
// Depots (route start / end points)
// ============================================================================

pub const DEPOTS: &[Location] = &[
    Location::new("Wynn Las Vegas", 36.1263781, -115.1658180),
    Location::new("MGM Grand", 36.1023654, -115.1688720),
    Location::new("Longhorn Casino", 36.1070664, -115.0591256),
];

// ============================================================================
// Pickup clusters
// ============================================================================

pub const STRIP_PICKUPS: &[Location] = &[
    Location::new("Hard Rock Cafe", 36.1041592, -115.1722166),
    Location::new("Brooklyn Bowl", 36.1175388, -115.1695094),
    Location::new("Gordon Ramsay BurGR", 36.1107195, -115.1720818),
    Location::new("Spago by Wolfgang Puck", 36.1139368, -115.1741462),
    Location::new("Grand Lux Cafe", 36.1216416, -115.1685024),
    Location::new("Bacchanal Buffet", 36.1159581, -115.1762929),
    Location::new("Il Fornaio", 36.1024474, -115.1740110),
    Location::new("Charlie Palmer Steak", 36.0910624, -115.1743364),
];

pub const SOUTH_PICKUPS: &[Location] = &[
    Location::new("Buffalo Wild Wings South", 36.0543044, -115.1714860),
    Location::new("Bootlegger Bistro", 36.0492047, -115.1715744),
    Location::new("Denny's South", 36.0591086, -115.1717250),
    Location::new("kabuki Japanese", 36.0675472, -115.1779391),
    Location::new("Mikos Izakaya", 36.0429503, -115.1527627),
    Location::new("Budget Suites South", 36.0366259, -115.1713361),
];

pub const EAST_PICKUPS: &[Location] = &[
    Location::new("Pei Wei Town Square", 36.0810469, -115.1472694),
    Location::new("Hello Tokyo", 36.1161627, -115.0902096),
    Location::new("Original Lindo Michoacan", 36.1294005, -115.1135106),
    Location::new("Tomo Sushi", 36.0992464, -115.1142123),
    Location::new("Sushi Twister", 36.1007300, -115.0526259),
    Location::new("Roma Pizza", 36.1012461, -115.0753039),
    Location::new("Green Valley Ranch Area", 36.0308, -115.0825),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_in_vegas_area() {
        let all = DEPOTS.iter().chain(STRIP_PICKUPS).chain(SOUTH_PICKUPS).chain(EAST_PICKUPS);
        for loc in all {
            assert!(loc.lat > 35.9 && loc.lat < 36.3, "{} lat out of range: {}", loc.name, loc.lat);
            assert!(
                loc.lng > -115.4 && loc.lng < -114.8,
                "{} lng out of range: {}",
                loc.name,
                loc.lng
            );
        }
    }
}
