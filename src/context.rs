//! Application context: every component wired once at startup.
//!
//! Replaces the module-level singleton session of earlier incarnations with
//! an explicit object constructed from configuration plus store/geo handles,
//! with a fail-fast startup probe and explicit teardown.

use std::sync::Arc;

use crate::config::Config;
use crate::credentials::CredentialRegistry;
use crate::dealers::GeoDealerFinder;
use crate::geo::GeoIndex;
use crate::ledger::LeadLedger;
use crate::oem::OemMetadataStore;
use crate::store::KeyedStore;
use crate::validation::ContactValidator;

/// Probe value for the startup self-test; resolves to the "unknown" sentinel
/// on a healthy store.
const STARTUP_PROBE_KEY: &str = "startup-probe";

pub struct AppContext {
    pub config: Config,
    pub oem_config: Arc<OemMetadataStore>,
    pub ledger: LeadLedger,
    pub credentials: CredentialRegistry,
    pub dealers: GeoDealerFinder,
    pub validator: ContactValidator,
}

impl AppContext {
    /// Wires all components and verifies the keyed store is reachable.
    /// Fails fast: a partially initialized process must not serve traffic.
    pub async fn init(
        config: Config,
        store: Arc<dyn KeyedStore>,
        dealer_store: Arc<dyn KeyedStore>,
        geo: Arc<dyn GeoIndex>,
    ) -> anyhow::Result<Self> {
        let oem_config = Arc::new(OemMetadataStore::new(store.clone()));
        let credentials = CredentialRegistry::new(store.clone());
        let ledger = LeadLedger::new(store, oem_config.clone(), &config);
        let dealers = GeoDealerFinder::new(geo, dealer_store);
        let validator = ContactValidator::new(&config);

        let probe_owner = credentials
            .resolve_key_owner(STARTUP_PROBE_KEY)
            .await
            .map_err(|e| anyhow::anyhow!("keyed store unreachable at startup: {}", e))?;
        tracing::info!(probe_owner = %probe_owner, "startup probe succeeded");

        Ok(Self {
            config,
            oem_config,
            ledger,
            credentials,
            dealers,
            validator,
        })
    }

    /// Explicit teardown. Store and geo handles close when their last owner
    /// drops; this exists so shutdown is a visible event, not an implicit one.
    pub fn shutdown(self) {
        tracing::info!("lead intake context shut down");
    }
}
