//! Nearest-dealer resolution and dealer profile lookup.
//!
//! Dealer records are owned by an external fleet-management process; this
//! component only reads them, through the geo index for proximity and through
//! the dealer table keyed by (dealerCode, oem) for profiles.

use std::sync::Arc;

use crate::errors::{AppError, ResultExt};
use crate::geo::{GeoIndex, GeoPoint};
use crate::models::{DealerProfile, DealerSummary};
use crate::store::KeyedStore;

/// Search radius for nearest-dealer resolution. Fixed by product: a lead with
/// no dealer inside 50 km goes unassigned.
const DEALER_SEARCH_RADIUS_M: f64 = 50_000.0;

pub struct GeoDealerFinder {
    geo: Arc<dyn GeoIndex>,
    dealer_store: Arc<dyn KeyedStore>,
}

impl GeoDealerFinder {
    pub fn new(geo: Arc<dyn GeoIndex>, dealer_store: Arc<dyn KeyedStore>) -> Self {
        Self { geo, dealer_store }
    }

    /// The single nearest dealer of `oem` within 50 km of (lat, lon),
    /// reshaped into a denormalized summary. `None` means no dealer in
    /// range, a valid outcome distinct from a query failure.
    pub async fn find_nearest_dealer(
        &self,
        oem: &str,
        lat: f64,
        lon: f64,
    ) -> Result<Option<DealerSummary>, AppError> {
        let matches = self
            .geo
            .query_radius(GeoPoint { lat, lon }, DEALER_SEARCH_RADIUS_M, oem)
            .await
            .context("querying nearest dealer")?;

        let Some(nearest) = matches.into_iter().next() else {
            tracing::info!(oem, lat, lon, "no dealer within range");
            return Ok(None);
        };

        tracing::debug!(
            oem,
            dealer_code = %nearest.dealer.dealer_code,
            distance_m = nearest.distance_m,
            "resolved nearest dealer"
        );
        Ok(Some(DealerSummary {
            id: nearest.dealer.dealer_code,
            name: nearest.dealer.dealer_name,
            postal_code: nearest.dealer.postal_code,
        }))
    }

    /// Dealer profile keyed by (dealerCode, oem). `None` for an empty dealer
    /// code or no match.
    pub async fn fetch_dealer_profile(
        &self,
        dealer_code: &str,
        oem: &str,
    ) -> Result<Option<DealerProfile>, AppError> {
        if dealer_code.is_empty() {
            return Ok(None);
        }
        let record = self
            .dealer_store
            .get(dealer_code, oem)
            .await
            .context("fetching dealer profile")?;
        record.as_ref().map(DealerProfile::from_record).transpose()
    }
}
