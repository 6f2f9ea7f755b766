//! Domain types stored in the wide table.
//!
//! Key shapes are a wire contract shared with other services writing to the
//! same table; they must be preserved byte-for-byte. Entity payloads
//! round-trip between typed structs and record attributes via serde.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AppError;
use crate::store::Record;

/// Sort key of every customer identity record.
pub const CUSTOMER_LEAD_SK: &str = "CUSTOMER_LEAD";
/// Sort key of every OEM configuration record.
pub const OEM_METADATA_SK: &str = "METADATA";
/// Partition prefix of provider idempotency records.
pub const API_CALL_PK_PREFIX: &str = "LEAD#";
/// Partition prefix of OEM configuration records.
pub const OEM_PK_PREFIX: &str = "OEM#";

/// Lifecycle of an OEM lead.
///
/// Stored as an explicit tagged attribute; the gsisk sort key is *derived*
/// from it (see [`LeadState::sort_key`]) so prefix scans keep working without
/// the application ever string-parsing state. Transitions are strictly
/// forward: Accepted → Sent → {Converted, NotConverted}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadState {
    /// Accepted from the provider, not yet sent to the OEM.
    Accepted,
    /// Sent to the OEM, awaiting conversion outcome.
    Sent,
    /// Terminal: the OEM reported a conversion.
    Converted,
    /// Terminal: the OEM reported no conversion.
    NotConverted,
}

impl LeadState {
    /// The gsisk value encoding this state. "0#0" sorts before every "1#…"
    /// value, which is what makes the accepted-unsent prefix scan a queue.
    ///
    /// Sent and NotConverted intentionally share "1#0": the sort key only has
    /// to distinguish unsent from sent-or-settled for range queries; the
    /// `state` attribute carries the full story.
    pub fn sort_key(self) -> &'static str {
        match self {
            LeadState::Accepted => "0#0",
            LeadState::Sent => "1#0",
            LeadState::Converted => "1#1",
            LeadState::NotConverted => "1#0",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LeadState::Converted | LeadState::NotConverted)
    }
}

/// Caller-supplied fields of a new OEM lead submission.
#[derive(Debug, Clone)]
pub struct NewOemLead {
    pub uuid: String,
    pub make: String,
    pub model: String,
    pub date: String,
    pub email: String,
    pub phone: String,
    pub last_name: String,
    pub timestamp: String,
    pub make_model_filter_status: bool,
    pub lead_hash: String,
    pub dealer: String,
    pub provider: String,
    pub postalcode: String,
}

/// One lead's journey through acceptance → dealer notification → conversion.
///
/// pk=`{make}#{uuid}`, sk=`{make}#{model}`, gsipk=`{make}#{date}`,
/// gsisk derived from `state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OemLeadRecord {
    pub uuid: String,
    pub make: String,
    pub model: String,
    pub date: String,
    pub email: String,
    pub phone: String,
    pub last_name: String,
    pub timestamp: String,
    pub state: LeadState,
    pub conversion: u8,
    pub make_model_filter_status: bool,
    pub lead_hash: String,
    pub dealer: String,
    #[serde(rename = "3pl")]
    pub provider: String,
    pub postalcode: String,
    pub oem_responded: bool,
}

impl OemLeadRecord {
    pub fn pk(&self) -> String {
        format!("{}#{}", self.make, self.uuid)
    }

    pub fn sk(&self) -> String {
        format!("{}#{}", self.make, self.model)
    }

    pub fn to_record(&self) -> Result<Record, AppError> {
        let mut record = Record::new(self.pk(), self.sk());
        record.gsipk = Some(format!("{}#{}", self.make, self.date));
        record.gsisk = Some(self.state.sort_key().to_string());
        record.attrs = to_attr_map(self)?;
        Ok(record)
    }

    pub fn from_record(record: &Record) -> Result<Self, AppError> {
        from_attr_map(&record.attrs)
    }
}

/// Customer-identity anchor used to find prior leads by email or phone.
///
/// One record per submission; a customer who submits repeatedly accumulates
/// records. pk=uuid, sk="CUSTOMER_LEAD", gsipk=email,
/// gsipk1=`{phone}#{lastName}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerLeadRecord {
    pub uuid: String,
    pub email: String,
    pub phone: String,
    pub last_name: String,
    pub oem: String,
    pub make: String,
    pub model: String,
}

impl CustomerLeadRecord {
    pub fn to_record(&self) -> Result<Record, AppError> {
        let mut record = Record::new(self.uuid.clone(), CUSTOMER_LEAD_SK);
        record.gsipk = Some(self.email.clone());
        record.gsisk = Some(self.uuid.clone());
        record.gsipk1 = Some(format!("{}#{}", self.phone, self.last_name));
        record.gsisk1 = Some(self.uuid.clone());
        record.attrs = to_attr_map(self)?;
        Ok(record)
    }

    pub fn from_record(record: &Record) -> Result<Self, AppError> {
        from_attr_map(&record.attrs)
    }
}

/// Per-OEM dedup configuration, nested the way the table stores it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OemSettings {
    pub make_model: bool,
}

/// OEM-level configuration: dedup filter mode and conversion threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OemMetadata {
    pub oem: String,
    pub settings: OemSettings,
    pub threshold: f64,
}

impl OemMetadata {
    pub fn pk(oem: &str) -> String {
        format!("{}{}", OEM_PK_PREFIX, oem)
    }

    pub fn to_record(&self) -> Result<Record, AppError> {
        let mut record = Record::new(Self::pk(&self.oem), OEM_METADATA_SK);
        record.attrs = to_attr_map(self)?;
        Ok(record)
    }

    pub fn from_record(record: &Record) -> Result<Self, AppError> {
        from_attr_map(&record.attrs)
    }
}

/// Outcome of the provider idempotency check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    /// The previously cached response, verbatim, when `is_duplicate`.
    pub response: Option<String>,
}

/// Denormalized nearest-dealer answer handed to lead routing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DealerSummary {
    pub id: String,
    pub name: String,
    pub postal_code: String,
}

/// Dealer profile as the fleet-management process stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealerProfile {
    #[serde(rename = "dealerZip")]
    pub postal_code: String,
    #[serde(rename = "Rating")]
    pub rating: f64,
    #[serde(rename = "Recommended")]
    pub recommended: bool,
    #[serde(rename = "LifeTimeReviews")]
    pub lifetime_reviews: u64,
}

impl DealerProfile {
    pub fn from_record(record: &Record) -> Result<Self, AppError> {
        from_attr_map(&record.attrs)
    }
}

pub(crate) fn to_attr_map<T: Serialize>(value: &T) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AppError::Storage(format!(
            "entity did not serialize to a map: {}",
            other
        ))),
        Err(e) => Err(AppError::Storage(format!("serialize entity: {}", e))),
    }
}

pub(crate) fn from_attr_map<T: DeserializeOwned>(attrs: &Map<String, Value>) -> Result<T, AppError> {
    serde_json::from_value(Value::Object(attrs.clone()))
        .map_err(|e| AppError::Storage(format!("deserialize entity: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lead() -> OemLeadRecord {
        OemLeadRecord {
            uuid: "u1".to_string(),
            make: "toyota".to_string(),
            model: "corolla".to_string(),
            date: "2024-05-01".to_string(),
            email: "jane@example.com".to_string(),
            phone: "4155551234".to_string(),
            last_name: "Doe".to_string(),
            timestamp: "2024-05-01T12:00:00Z".to_string(),
            state: LeadState::Accepted,
            conversion: 0,
            make_model_filter_status: false,
            lead_hash: "abc123".to_string(),
            dealer: "D42".to_string(),
            provider: "acme-leads".to_string(),
            postalcode: "94103".to_string(),
            oem_responded: false,
        }
    }

    #[test]
    fn oem_lead_key_shapes_match_wire_contract() {
        let lead = sample_lead();
        let record = lead.to_record().unwrap();
        assert_eq!(record.pk, "toyota#u1");
        assert_eq!(record.sk, "toyota#corolla");
        assert_eq!(record.gsipk.as_deref(), Some("toyota#2024-05-01"));
        assert_eq!(record.gsisk.as_deref(), Some("0#0"));
        // Provider is stored under its historical attribute name.
        assert_eq!(record.attr_str("3pl"), Some("acme-leads"));
    }

    #[test]
    fn oem_lead_round_trips_through_record() {
        let lead = sample_lead();
        let record = lead.to_record().unwrap();
        let back = OemLeadRecord::from_record(&record).unwrap();
        assert_eq!(back, lead);
    }

    #[test]
    fn sort_keys_follow_lifecycle_encoding() {
        assert_eq!(LeadState::Accepted.sort_key(), "0#0");
        assert_eq!(LeadState::Sent.sort_key(), "1#0");
        assert_eq!(LeadState::Converted.sort_key(), "1#1");
        assert_eq!(LeadState::NotConverted.sort_key(), "1#0");
        assert!(!LeadState::Accepted.is_terminal());
        assert!(!LeadState::Sent.is_terminal());
        assert!(LeadState::Converted.is_terminal());
        assert!(LeadState::NotConverted.is_terminal());
    }

    #[test]
    fn customer_lead_indexes_email_and_phone_last_name() {
        let customer = CustomerLeadRecord {
            uuid: "u1".to_string(),
            email: "jane@example.com".to_string(),
            phone: "4155551234".to_string(),
            last_name: "Doe".to_string(),
            oem: "toyota".to_string(),
            make: "toyota".to_string(),
            model: "corolla".to_string(),
        };
        let record = customer.to_record().unwrap();
        assert_eq!(record.pk, "u1");
        assert_eq!(record.sk, CUSTOMER_LEAD_SK);
        assert_eq!(record.gsipk.as_deref(), Some("jane@example.com"));
        assert_eq!(record.gsipk1.as_deref(), Some("4155551234#Doe"));
    }

    #[test]
    fn oem_metadata_round_trips() {
        let metadata = OemMetadata {
            oem: "toyota".to_string(),
            settings: OemSettings { make_model: true },
            threshold: 0.4,
        };
        let record = metadata.to_record().unwrap();
        assert_eq!(record.pk, "OEM#toyota");
        assert_eq!(record.sk, OEM_METADATA_SK);
        let back = OemMetadata::from_record(&record).unwrap();
        assert_eq!(back, metadata);
    }
}
