//! Geospatial index contract.
//!
//! Dealer locations live in a geo-indexed table owned by an external
//! fleet-management process; this core only issues radius-bounded
//! nearest-neighbor queries against it. The in-memory implementation does a
//! linear haversine scan, which is plenty for tests and local runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::AppError;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A dealer's location entry in the geo table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealerPoint {
    pub dealer_code: String,
    pub dealer_name: String,
    pub postal_code: String,
    pub oem: String,
    pub point: GeoPoint,
}

/// One radius-query hit, annotated with its distance from the query center.
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusMatch {
    pub dealer: DealerPoint,
    pub distance_m: f64,
}

/// Radius-bounded nearest-neighbor search with attribute filtering.
#[async_trait]
pub trait GeoIndex: Send + Sync {
    /// All dealers for `oem` within `radius_m` of `center`, ordered by
    /// ascending distance. An empty result is a valid outcome.
    async fn query_radius(
        &self,
        center: GeoPoint,
        radius_m: f64,
        oem: &str,
    ) -> Result<Vec<RadiusMatch>, AppError>;
}

/// Great-circle distance in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// In-memory [`GeoIndex`] backed by a flat dealer list.
pub struct MemoryGeoIndex {
    dealers: RwLock<Vec<DealerPoint>>,
}

impl MemoryGeoIndex {
    pub fn new() -> Self {
        Self {
            dealers: RwLock::new(Vec::new()),
        }
    }

    pub async fn insert(&self, dealer: DealerPoint) {
        self.dealers.write().await.push(dealer);
    }
}

impl Default for MemoryGeoIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeoIndex for MemoryGeoIndex {
    async fn query_radius(
        &self,
        center: GeoPoint,
        radius_m: f64,
        oem: &str,
    ) -> Result<Vec<RadiusMatch>, AppError> {
        let dealers = self.dealers.read().await;
        let mut matches: Vec<RadiusMatch> = dealers
            .iter()
            .filter(|d| d.oem == oem)
            .map(|d| RadiusMatch {
                dealer: d.clone(),
                distance_m: haversine_m(center, d.point),
            })
            .filter(|m| m.distance_m <= radius_m)
            .collect();
        matches.sort_by(|a, b| {
            a.distance_m
                .partial_cmp(&b.distance_m)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(matches)
    }
}
