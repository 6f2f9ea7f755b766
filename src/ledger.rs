//! Lead dedup detection, lifecycle tracking, and OEM-lead queueing.
//!
//! The per-(oem, date) work queue is implicit in the gsi: every accepted lead
//! lands under gsipk=`{oem}#{date}` with the Accepted sort key, and the
//! accepted-unsent prefix scan is the queue-pop candidate set.

use chrono::{Duration, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    CustomerLeadRecord, DuplicateCheck, LeadState, NewOemLead, OemLeadRecord, API_CALL_PK_PREFIX,
};
use crate::oem::OemMetadataStore;
use crate::store::{KeyedStore, Precondition, Record, StoreIndex};

/// Deduplication fingerprint of a raw provider payload.
pub fn lead_fingerprint(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct LeadLedger {
    store: Arc<dyn KeyedStore>,
    oem_config: Arc<OemMetadataStore>,
    lead_record_ttl: Duration,
    oem_record_ttl: Duration,
}

impl LeadLedger {
    pub fn new(store: Arc<dyn KeyedStore>, oem_config: Arc<OemMetadataStore>, config: &Config) -> Self {
        Self {
            store,
            oem_config,
            lead_record_ttl: Duration::days(config.lead_record_ttl_days),
            oem_record_ttl: Duration::days(config.oem_record_ttl_days),
        }
    }

    /// Caches the outcome of answering a provider submission, so a replayed
    /// call is answered identically without re-processing side effects.
    /// Unconditional overwrite: last write wins.
    pub async fn insert_api_call_record(
        &self,
        lead_hash: &str,
        provider: &str,
        response: &str,
    ) -> Result<(), AppError> {
        let mut record = Record::new(format!("{}{}", API_CALL_PK_PREFIX, lead_hash), provider);
        record.set_attr("response", json!(response));
        record.ttl = Some(Utc::now() + self.lead_record_ttl);
        self.store
            .put(record)
            .await
            .context("inserting API call record")?;
        tracing::debug!(lead_hash, provider, "cached provider call outcome");
        Ok(())
    }

    /// Point lookup of a prior provider call. Absence means no duplicate.
    pub async fn check_duplicate_api_call(
        &self,
        lead_hash: &str,
        provider: &str,
    ) -> Result<DuplicateCheck, AppError> {
        let record = self
            .store
            .get(&format!("{}{}", API_CALL_PK_PREFIX, lead_hash), provider)
            .await
            .context("checking duplicate API call")?;
        match record {
            Some(record) => {
                tracing::warn!(lead_hash, provider, "duplicate API call");
                Ok(DuplicateCheck {
                    is_duplicate: true,
                    response: record.attr_str("response").map(String::from),
                })
            }
            None => {
                tracing::debug!(lead_hash, provider, "no duplicate API call");
                Ok(DuplicateCheck {
                    is_duplicate: false,
                    response: None,
                })
            }
        }
    }

    /// Records an accepted lead, state Accepted, at the head of the implicit
    /// per-(oem, date) queue.
    pub async fn insert_oem_lead(&self, lead: NewOemLead) -> Result<(), AppError> {
        let lead = OemLeadRecord {
            uuid: lead.uuid,
            make: lead.make,
            model: lead.model,
            date: lead.date,
            email: lead.email,
            phone: lead.phone,
            last_name: lead.last_name,
            timestamp: lead.timestamp,
            state: LeadState::Accepted,
            conversion: 0,
            make_model_filter_status: lead.make_model_filter_status,
            lead_hash: lead.lead_hash,
            dealer: lead.dealer,
            provider: lead.provider,
            postalcode: lead.postalcode,
            oem_responded: false,
        };
        let mut record = lead.to_record()?;
        record.ttl = Some(Utc::now() + self.oem_record_ttl);
        self.store
            .put(record)
            .await
            .context("inserting OEM lead")?;
        tracing::info!(uuid = %lead.uuid, make = %lead.make, model = %lead.model, "accepted OEM lead");
        Ok(())
    }

    /// Writes the customer-identity anchor for one submission. Multiple
    /// submissions from the same customer accumulate records.
    pub async fn insert_customer_lead(&self, customer: CustomerLeadRecord) -> Result<(), AppError> {
        let mut record = customer.to_record()?;
        record.ttl = Some(Utc::now() + self.oem_record_ttl);
        self.store
            .put(record)
            .await
            .context("inserting customer lead")?;
        tracing::debug!(uuid = %customer.uuid, "inserted customer lead anchor");
        Ok(())
    }

    /// All leads awaiting dealer notification for an OEM/day: the queue-pop
    /// candidate set for downstream notification.
    pub async fn query_accepted_unsent(
        &self,
        oem: &str,
        date: &str,
    ) -> Result<Vec<OemLeadRecord>, AppError> {
        let records = self
            .store
            .query(
                StoreIndex::Gsi,
                &format!("{}#{}", oem, date),
                Some(LeadState::Accepted.sort_key()),
            )
            .await
            .context("querying accepted unsent leads")?;
        records.iter().map(OemLeadRecord::from_record).collect()
    }

    /// Accepted → Sent. `Ok(false)` when no such record exists. Calling this
    /// on a record that already left Accepted is a usage error and fails with
    /// [`AppError::InvalidTransition`] rather than masking the bug.
    pub async fn mark_sent(&self, uuid: &str, oem: &str) -> Result<bool, AppError> {
        let Some(record) = self.lookup_lead(uuid, oem).await? else {
            tracing::warn!(uuid, oem, "mark_sent: no such lead");
            return Ok(false);
        };
        let mut lead = OemLeadRecord::from_record(&record)?;
        if lead.state != LeadState::Accepted {
            return Err(AppError::InvalidTransition(format!(
                "lead {}#{} is {:?}, only Accepted leads can be marked sent",
                oem, uuid, lead.state
            )));
        }

        lead.state = LeadState::Sent;
        let mut updated = lead.to_record()?;
        updated.ttl = record.ttl;
        self.store
            .put_if(updated, Precondition::VersionIs(record.version))
            .await
            .context("marking lead sent")?;
        tracing::info!(uuid, oem, "lead sent to OEM");
        Ok(true)
    }

    /// Sent → Converted / NotConverted (terminal). `None` when the record is
    /// absent. Skipping Sent, or settling an already-settled lead, is an
    /// invalid transition.
    pub async fn update_conversion(
        &self,
        uuid: &str,
        oem: &str,
        converted: bool,
    ) -> Result<Option<OemLeadRecord>, AppError> {
        let Some(record) = self.lookup_lead(uuid, oem).await? else {
            tracing::warn!(uuid, oem, "update_conversion: no such lead");
            return Ok(None);
        };
        let mut lead = OemLeadRecord::from_record(&record)?;
        if lead.state != LeadState::Sent {
            return Err(AppError::InvalidTransition(format!(
                "lead {}#{} is {:?}, only Sent leads can settle conversion",
                oem, uuid, lead.state
            )));
        }

        lead.oem_responded = true;
        lead.conversion = u8::from(converted);
        lead.state = if converted {
            LeadState::Converted
        } else {
            LeadState::NotConverted
        };
        let mut updated = lead.to_record()?;
        updated.ttl = record.ttl;
        self.store
            .put_if(updated, Precondition::VersionIs(record.version))
            .await
            .context("updating lead conversion")?;
        tracing::info!(uuid, oem, converted, "lead conversion settled");
        Ok(Some(lead))
    }

    /// Union of the email-index and phone+lastName-index candidate sets, each
    /// candidate independently evaluated through [`lead_exists`], returning on
    /// the first hit. Duplicate detection is the designed business outcome,
    /// never an error.
    ///
    /// [`lead_exists`]: LeadLedger::lead_exists
    pub async fn check_duplicate_lead(
        &self,
        email: &str,
        phone: &str,
        last_name: &str,
        make: &str,
        model: &str,
    ) -> Result<bool, AppError> {
        let mut candidates = Vec::new();
        if !email.is_empty() {
            candidates.extend(
                self.store
                    .query(StoreIndex::Gsi, email, None)
                    .await
                    .context("querying leads by email")?,
            );
        }
        if !phone.is_empty() || !last_name.is_empty() {
            candidates.extend(
                self.store
                    .query(StoreIndex::Gsi1, &format!("{}#{}", phone, last_name), None)
                    .await
                    .context("querying leads by phone and last name")?,
            );
        }

        for candidate in &candidates {
            if self.lead_exists(&candidate.pk, make, model).await? {
                tracing::info!(make, model, "duplicate lead detected");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether a prior OEM lead exists for this customer id under the current
    /// dedup policy. The make/model filter is re-read per call: toggling it
    /// changes future decisions only. An unconfigured OEM defaults to the
    /// filter being disabled.
    pub async fn lead_exists(&self, uuid: &str, make: &str, model: &str) -> Result<bool, AppError> {
        let filter_enabled = self
            .oem_config
            .fetch_oem(make)
            .await?
            .map(|m| m.settings.make_model)
            .unwrap_or(false);

        if filter_enabled {
            // Exact (make, model) point match required.
            let record = self
                .store
                .get(&format!("{}#{}", make, uuid), &format!("{}#{}", make, model))
                .await
                .context("checking lead by make and model")?;
            Ok(record.is_some())
        } else {
            // Any model under this make counts.
            let records = self
                .store
                .query(StoreIndex::Primary, &format!("{}#{}", make, uuid), None)
                .await
                .context("checking lead by make")?;
            Ok(!records.is_empty())
        }
    }

    async fn lookup_lead(&self, uuid: &str, oem: &str) -> Result<Option<Record>, AppError> {
        let records = self
            .store
            .query(StoreIndex::Primary, &format!("{}#{}", oem, uuid), None)
            .await
            .context("looking up OEM lead")?;
        Ok(records.into_iter().next())
    }
}
