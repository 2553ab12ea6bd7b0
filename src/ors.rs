//! OpenRouteService HTTP adapter.
//!
//! Implements [`RoutingGateway`] (directions + optimization) and
//! [`Geocoder`] over a blocking reqwest client with a bounded timeout.
//! Responses are decoded into private DTOs and validated here; nothing
//! downstream sees raw JSON.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RoutingUnavailable;
use crate::model::Coordinate;
use crate::polyline::{GeometrySource, Polyline, RouteGeometry};
use crate::traits::{Geocoder, RoutingGateway};

#[derive(Debug, Clone)]
pub struct OrsConfig {
    pub base_url: String,
    pub profile: String,
    /// Routing preference sent with directions requests.
    pub preference: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for OrsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openrouteservice.org".to_string(),
            profile: "driving-car".to_string(),
            preference: "recommended".to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl OrsConfig {
    /// Defaults overridden by `ORS_API_KEY`, `ORS_BASE_URL`, `ORS_PROFILE`
    /// and `ORS_TIMEOUT_SECS` when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup("ORS_BASE_URL").unwrap_or(defaults.base_url),
            profile: lookup("ORS_PROFILE").unwrap_or(defaults.profile),
            preference: defaults.preference,
            api_key: lookup("ORS_API_KEY").filter(|key| !key.trim().is_empty()),
            timeout_secs: lookup("ORS_TIMEOUT_SECS")
                .and_then(|value| value.parse().ok())
                .unwrap_or(defaults.timeout_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrsClient {
    config: OrsConfig,
    client: reqwest::blocking::Client,
}

impl OrsClient {
    pub fn new(config: OrsConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OrsConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str, RoutingUnavailable> {
        self.config.api_key.as_deref().ok_or(RoutingUnavailable::MissingCredentials)
    }

    fn post_json<B: Serialize>(&self, url: &str, body: &B) -> Result<Vec<u8>, RoutingUnavailable> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, api_key)
            .json(body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(RoutingUnavailable::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }

    fn geocode(&self, address: &str) -> Result<Coordinate, RoutingUnavailable> {
        let api_key = self.api_key()?;
        let url = format!("{}/geocode/search", self.config.base_url);
        let response = self
            .client
            .get(url)
            .query(&[("api_key", api_key), ("text", address), ("size", "1")])
            .send()?
            .error_for_status()?;

        parse_geocode(&response.bytes()?, address)
    }
}

impl RoutingGateway for OrsClient {
    fn fetch_road_geometry(
        &self,
        coordinates: &[Coordinate],
    ) -> Result<RouteGeometry, RoutingUnavailable> {
        if coordinates.len() < 2 {
            return Err(RoutingUnavailable::TooFewCoordinates(coordinates.len()));
        }

        let url = format!(
            "{}/v2/directions/{}/geojson",
            self.config.base_url, self.config.profile
        );
        let request = DirectionsRequest {
            coordinates: coordinates.iter().map(Coordinate::lng_lat).collect(),
            preference: &self.config.preference,
            instructions: false,
        };

        let body = self.post_json(&url, &request)?;
        let geometry = parse_directions(&body)?;
        debug!(
            points = geometry.polyline.len(),
            distance_m = geometry.distance_meters,
            "fetched road geometry"
        );
        Ok(geometry)
    }

    fn optimize_order(
        &self,
        stops: &[Coordinate],
        end: &Coordinate,
    ) -> Result<Vec<usize>, RoutingUnavailable> {
        let Some(start) = stops.first() else {
            return Err(RoutingUnavailable::TooFewCoordinates(0));
        };

        let url = format!("{}/optimization", self.config.base_url);
        let request = OptimizationRequest {
            jobs: stops
                .iter()
                .enumerate()
                .map(|(index, stop)| JobDto {
                    id: index + 1,
                    location: stop.lng_lat(),
                })
                .collect(),
            vehicles: vec![VehicleDto {
                id: 1,
                profile: &self.config.profile,
                start: start.lng_lat(),
                end: end.lng_lat(),
            }],
        };

        let body = self.post_json(&url, &request)?;
        parse_optimization(&body, stops.len())
    }
}

impl Geocoder for OrsClient {
    fn resolve(&self, address: &str) -> Option<Coordinate> {
        match self.geocode(address) {
            Ok(coordinate) => Some(coordinate),
            Err(err) => {
                warn!(address, error = %err, "geocoding failed");
                None
            }
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct DirectionsRequest<'a> {
    coordinates: Vec<[f64; 2]>,
    preference: &'a str,
    instructions: bool,
}

#[derive(Debug, Serialize)]
struct OptimizationRequest<'a> {
    jobs: Vec<JobDto>,
    vehicles: Vec<VehicleDto<'a>>,
}

#[derive(Debug, Serialize)]
struct JobDto {
    id: usize,
    location: [f64; 2],
}

#[derive(Debug, Serialize)]
struct VehicleDto<'a> {
    id: usize,
    profile: &'a str,
    start: [f64; 2],
    end: [f64; 2],
}

#[derive(Debug, Deserialize)]
struct FeatureCollectionDto {
    #[serde(default)]
    features: Vec<FeatureDto>,
}

#[derive(Debug, Deserialize)]
struct FeatureDto {
    geometry: Option<GeometryDto>,
    #[serde(default)]
    properties: PropertiesDto,
}

#[derive(Debug, Deserialize)]
struct GeometryDto {
    #[serde(default)]
    coordinates: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct PropertiesDto {
    #[serde(default)]
    summary: SummaryDto,
    #[serde(default)]
    way_points: Vec<usize>,
    label: Option<String>,
}

// ORS omits zero-valued summary fields.
#[derive(Debug, Default, Deserialize)]
struct SummaryDto {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct OptimizationResponseDto {
    #[serde(default)]
    routes: Vec<OptimizedRouteDto>,
}

#[derive(Debug, Deserialize)]
struct OptimizedRouteDto {
    #[serde(default)]
    steps: Vec<StepDto>,
}

#[derive(Debug, Deserialize)]
struct StepDto {
    #[serde(rename = "type")]
    kind: String,
    job: Option<usize>,
}

fn malformed(message: impl Into<String>) -> RoutingUnavailable {
    RoutingUnavailable::MalformedResponse(message.into())
}

fn decode<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, RoutingUnavailable> {
    serde_json::from_slice(body).map_err(|err| malformed(format!("invalid JSON payload: {err}")))
}

/// `[lng, lat(, elevation)]` → `(lat, lng)`.
fn position(value: &serde_json::Value) -> Option<(f64, f64)> {
    let pair = value.as_array()?;
    let lng = pair.first()?.as_f64()?;
    let lat = pair.get(1)?.as_f64()?;
    Some((lat, lng))
}

fn parse_directions(body: &[u8]) -> Result<RouteGeometry, RoutingUnavailable> {
    let response: FeatureCollectionDto = decode(body)?;
    let feature = response
        .features
        .into_iter()
        .next()
        .ok_or_else(|| malformed("response has no route feature"))?;
    let geometry = feature.geometry.ok_or_else(|| malformed("route feature has no geometry"))?;

    let positions = geometry
        .coordinates
        .as_array()
        .ok_or_else(|| malformed("geometry coordinates are not a list"))?;
    let points = positions
        .iter()
        .map(position)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| malformed("geometry contains an invalid position"))?;
    if points.is_empty() {
        return Err(malformed("geometry has no positions"));
    }

    let summary = feature.properties.summary;
    Ok(RouteGeometry {
        polyline: Polyline::new(points),
        distance_meters: summary.distance,
        duration_seconds: summary.duration,
        way_points: feature.properties.way_points,
        source: GeometrySource::Road,
    })
}

/// Job ids are 1-based stop indices; the result is 0-based.
fn parse_optimization(body: &[u8], stop_count: usize) -> Result<Vec<usize>, RoutingUnavailable> {
    let response: OptimizationResponseDto = decode(body)?;
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| malformed("optimization returned no route"))?;

    let order: Vec<usize> = route
        .steps
        .iter()
        .filter(|step| step.kind == "job")
        .filter_map(|step| step.job)
        .filter(|job| (1..=stop_count).contains(job))
        .map(|job| job - 1)
        .collect();

    if order.len() != stop_count {
        return Err(malformed(format!(
            "optimization scheduled {} of {} stops",
            order.len(),
            stop_count
        )));
    }
    Ok(order)
}

fn parse_geocode(body: &[u8], address: &str) -> Result<Coordinate, RoutingUnavailable> {
    let response: FeatureCollectionDto = decode(body)?;
    let feature = response
        .features
        .into_iter()
        .next()
        .ok_or_else(|| malformed("no geocoding match"))?;
    let (latitude, longitude) = feature
        .geometry
        .as_ref()
        .and_then(|geometry| position(&geometry.coordinates))
        .ok_or_else(|| malformed("geocoding match has no point"))?;

    let label = feature.properties.label.unwrap_or_else(|| address.to_string());
    Ok(Coordinate::with_address(latitude, longitude, label))
}
