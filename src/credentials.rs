//! Per-provider API credential issue and verification.
//!
//! One CredentialRecord per active key: pk=username, sk=apiKey, gsipk=apiKey.
//! The gsi makes the reverse lookup (key → owner) a single index query.

use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::store::{KeyedStore, Precondition, Record, StoreIndex};

/// Sentinel owner for a key nobody holds. A defined value, not an error: it
/// feeds audit logs and the startup self-test probe.
pub const UNKNOWN_OWNER: &str = "unknown";

pub struct CredentialRegistry {
    store: Arc<dyn KeyedStore>,
}

impl CredentialRegistry {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// One-shot auto-registration: issues a key only if the username has never
    /// held one. Re-issuance goes through [`reset_credential`] explicitly.
    ///
    /// The username partition cannot carry a single-item write condition under
    /// the preserved key shape (sk is the key itself), so after writing we
    /// read the partition back. The registration is lost when the issued key
    /// is no longer in the partition (a concurrent reset revoked it), or when
    /// another registration also landed and this one's sort key is not the
    /// lexicographic minimum; a loser deletes its own write and reports
    /// failure. Exactly one key survives, and a returned key is live at the
    /// time of the read-back.
    ///
    /// [`reset_credential`]: CredentialRegistry::reset_credential
    pub async fn register_provider(&self, username: &str) -> Result<Option<String>, AppError> {
        let existing = self
            .store
            .query(StoreIndex::Primary, username, None)
            .await
            .context("checking existing credentials")?;
        if !existing.is_empty() {
            tracing::warn!(username, "registration refused: provider already registered");
            return Ok(None);
        }

        let key = self.reset_credential(username).await?;

        let after = self
            .store
            .query(StoreIndex::Primary, username, None)
            .await
            .context("verifying registration")?;
        if !after.iter().any(|r| r.sk == key) {
            tracing::warn!(username, "issued key revoked mid-registration, backing off");
            return Ok(None);
        }
        if after.len() > 1 {
            let min_sk = after
                .iter()
                .map(|r| r.sk.as_str())
                .min()
                .unwrap_or_default()
                .to_string();
            if key != min_sk {
                tracing::warn!(username, "lost registration race, backing off");
                self.store
                    .delete(username, &key)
                    .await
                    .context("backing off lost registration")?;
                return Ok(None);
            }
        }

        tracing::info!(username, "registered provider");
        Ok(Some(key))
    }

    /// Revokes every existing key for the username and issues a fresh one.
    /// Post-condition: at most one active key for the username.
    pub async fn reset_credential(&self, username: &str) -> Result<String, AppError> {
        let existing = self
            .store
            .query(StoreIndex::Primary, username, None)
            .await
            .context("listing credentials to revoke")?;
        for record in &existing {
            self.store
                .delete(&record.pk, &record.sk)
                .await
                .context("revoking credential")?;
        }
        if !existing.is_empty() {
            tracing::info!(username, revoked = existing.len(), "revoked prior keys");
        }

        let key = Uuid::new_v4().to_string();
        let mut record = Record::new(username, key.clone());
        record.gsipk = Some(key.clone());
        // Fresh UUIDv4 sort key; NotExists only guards against the
        // astronomically unlikely collision.
        self.store
            .put_if(record, Precondition::NotExists)
            .await
            .context("writing new credential")?;
        tracing::info!(username, "issued new API key");
        Ok(key)
    }

    pub async fn verify_api_key(&self, key: &str) -> Result<bool, AppError> {
        let records = self
            .store
            .query(StoreIndex::Gsi, key, None)
            .await
            .context("verifying API key")?;
        Ok(!records.is_empty())
    }

    /// Reverse lookup: the username holding `key`, or [`UNKNOWN_OWNER`].
    pub async fn resolve_key_owner(&self, key: &str) -> Result<String, AppError> {
        let records = self
            .store
            .query(StoreIndex::Gsi, key, None)
            .await
            .context("resolving API key owner")?;
        Ok(records
            .first()
            .map(|r| r.pk.clone())
            .unwrap_or_else(|| UNKNOWN_OWNER.to_string()))
    }
}
