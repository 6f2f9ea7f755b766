//! CRUD over per-OEM configuration.

use std::sync::Arc;

use crate::errors::{AppError, ResultExt};
use crate::models::{OemMetadata, OemSettings, OEM_METADATA_SK};
use crate::store::{KeyedStore, Precondition};

/// Bounded retries for the read-modify-write loop when a concurrent writer
/// wins the version race.
const RMW_ATTEMPTS: usize = 3;

pub struct OemMetadataStore {
    store: Arc<dyn KeyedStore>,
}

impl OemMetadataStore {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    pub async fn create_oem(
        &self,
        oem: &str,
        make_model: bool,
        threshold: f64,
    ) -> Result<(), AppError> {
        let metadata = OemMetadata {
            oem: oem.to_string(),
            settings: OemSettings { make_model },
            threshold,
        };
        self.store
            .put(metadata.to_record()?)
            .await
            .context("creating OEM metadata")?;
        tracing::info!(oem, make_model, threshold, "created OEM");
        Ok(())
    }

    pub async fn delete_oem(&self, oem: &str) -> Result<(), AppError> {
        self.store
            .delete(&OemMetadata::pk(oem), OEM_METADATA_SK)
            .await
            .context("deleting OEM metadata")?;
        tracing::info!(oem, "deleted OEM");
        Ok(())
    }

    /// `None` denotes an unconfigured OEM; that is a valid outcome, not an
    /// error.
    pub async fn fetch_oem(&self, oem: &str) -> Result<Option<OemMetadata>, AppError> {
        let record = self
            .store
            .get(&OemMetadata::pk(oem), OEM_METADATA_SK)
            .await
            .context("fetching OEM metadata")?;
        record.as_ref().map(OemMetadata::from_record).transpose()
    }

    pub async fn set_make_model_filter(&self, oem: &str, enabled: bool) -> Result<(), AppError> {
        self.read_modify_write(oem, |metadata| metadata.settings.make_model = enabled)
            .await?;
        tracing::info!(oem, enabled, "set make/model filter");
        Ok(())
    }

    /// Fails with a structured configuration error when the OEM does not
    /// exist; never creates one implicitly.
    pub async fn set_threshold(&self, oem: &str, threshold: f64) -> Result<(), AppError> {
        self.read_modify_write(oem, |metadata| metadata.threshold = threshold)
            .await?;
        tracing::info!(oem, threshold, "set conversion threshold");
        Ok(())
    }

    /// Optimistic read-modify-write: fetch, mutate in place, rewrite the whole
    /// record predicated on the version read. Retries a bounded number of
    /// times when an interleaved writer invalidates the version.
    async fn read_modify_write(
        &self,
        oem: &str,
        mutate: impl Fn(&mut OemMetadata),
    ) -> Result<(), AppError> {
        let pk = OemMetadata::pk(oem);
        let mut last_err = None;
        for attempt in 0..RMW_ATTEMPTS {
            let record = self
                .store
                .get(&pk, OEM_METADATA_SK)
                .await
                .context("reading OEM metadata")?
                .ok_or_else(|| AppError::Configuration(format!("OEM {} not found", oem)))?;

            let mut metadata = OemMetadata::from_record(&record)?;
            mutate(&mut metadata);

            match self
                .store
                .put_if(metadata.to_record()?, Precondition::VersionIs(record.version))
                .await
            {
                Ok(()) => return Ok(()),
                Err(AppError::PreconditionFailed(msg)) => {
                    tracing::warn!(
                        oem,
                        attempt,
                        "OEM metadata version race, retrying: {}",
                        msg
                    );
                    last_err = Some(AppError::PreconditionFailed(msg));
                }
                Err(e) => return Err(e).context("rewriting OEM metadata"),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            AppError::PreconditionFailed(format!("OEM {} update kept losing the version race", oem))
        }))
    }
}
