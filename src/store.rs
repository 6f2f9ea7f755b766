//! Keyed-store contract.
//!
//! Every durable entity lives in one wide table addressed by a composite
//! primary key (pk, sk) plus two secondary indexes (gsi: gsipk/gsisk and
//! gsi1: gsipk1/gsisk1). The production backend is an external collaborator;
//! this module specifies the contract it must satisfy and ships an in-memory
//! implementation used by tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::errors::AppError;

/// Which index a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreIndex {
    /// Primary key: partition pk, sort sk.
    Primary,
    /// First secondary index: partition gsipk, sort gsisk.
    Gsi,
    /// Second secondary index: partition gsipk1, sort gsisk1.
    Gsi1,
}

/// Write precondition for conditional puts.
///
/// Multi-step sequences (check-then-insert, read-modify-write) are not atomic
/// on their own; callers close the gap by predicating the final write on what
/// they observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional overwrite (last-write-wins).
    None,
    /// The (pk, sk) item must not exist yet.
    NotExists,
    /// The stored item's version must equal the version the caller read.
    VersionIs(u64),
}

/// One item in the wide table.
///
/// `version` is assigned by the store on every successful write and is only
/// meaningful as an argument to [`Precondition::VersionIs`]. `attrs` carries
/// the entity payload; typed domain structs round-trip through it via serde.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub pk: String,
    pub sk: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsipk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsisk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsipk1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsisk1: Option<String>,
    /// Expiry timestamp; the record is invisible to reads past this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl Record {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
            gsipk: None,
            gsisk: None,
            gsipk1: None,
            gsisk1: None,
            ttl: None,
            version: 0,
            attrs: Map::new(),
        }
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(|v| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: Value) {
        self.attrs.insert(name.into(), value);
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl.map(|t| t <= now).unwrap_or(false)
    }
}

/// Contract of the wide key-value table.
///
/// Assumed durable, linearizable per key, and available; replication and
/// consistency internals are the backend's concern. Query results are ordered
/// by the queried index's sort key.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Record>, AppError>;

    /// Unconditional overwrite.
    async fn put(&self, record: Record) -> Result<(), AppError>;

    /// Conditional write; fails with [`AppError::PreconditionFailed`] when the
    /// predicate does not hold.
    async fn put_if(&self, record: Record, precondition: Precondition) -> Result<(), AppError>;

    /// Deleting an absent item is not an error.
    async fn delete(&self, pk: &str, sk: &str) -> Result<(), AppError>;

    /// Range query: all live records whose partition key on `index` equals
    /// `partition`, optionally narrowed to sort keys starting with
    /// `sort_prefix`, ordered ascending by sort key.
    async fn query(
        &self,
        index: StoreIndex,
        partition: &str,
        sort_prefix: Option<&str>,
    ) -> Result<Vec<Record>, AppError>;
}

/// In-memory [`KeyedStore`] for tests and local runs.
pub struct MemoryStore {
    items: RwLock<BTreeMap<(String, String), Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn index_keys<'a>(record: &'a Record, index: StoreIndex) -> (Option<&'a str>, Option<&'a str>) {
    match index {
        StoreIndex::Primary => (Some(record.pk.as_str()), Some(record.sk.as_str())),
        StoreIndex::Gsi => (record.gsipk.as_deref(), record.gsisk.as_deref()),
        StoreIndex::Gsi1 => (record.gsipk1.as_deref(), record.gsisk1.as_deref()),
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn get(&self, pk: &str, sk: &str) -> Result<Option<Record>, AppError> {
        let now = Utc::now();
        let items = self.items.read().await;
        Ok(items
            .get(&(pk.to_string(), sk.to_string()))
            .filter(|r| !r.is_expired(now))
            .cloned())
    }

    async fn put(&self, record: Record) -> Result<(), AppError> {
        self.put_if(record, Precondition::None).await
    }

    async fn put_if(&self, mut record: Record, precondition: Precondition) -> Result<(), AppError> {
        let now = Utc::now();
        let mut items = self.items.write().await;
        let key = (record.pk.clone(), record.sk.clone());
        let existing = items.get(&key).filter(|r| !r.is_expired(now));

        match precondition {
            Precondition::None => {}
            Precondition::NotExists => {
                if existing.is_some() {
                    return Err(AppError::PreconditionFailed(format!(
                        "item already exists: ({}, {})",
                        record.pk, record.sk
                    )));
                }
            }
            Precondition::VersionIs(expected) => {
                let current = existing.map(|r| r.version).unwrap_or(0);
                if current != expected {
                    return Err(AppError::PreconditionFailed(format!(
                        "version mismatch for ({}, {}): expected {}, found {}",
                        record.pk, record.sk, expected, current
                    )));
                }
            }
        }

        record.version = existing.map(|r| r.version + 1).unwrap_or(1);
        items.insert(key, record);
        Ok(())
    }

    async fn delete(&self, pk: &str, sk: &str) -> Result<(), AppError> {
        let mut items = self.items.write().await;
        items.remove(&(pk.to_string(), sk.to_string()));
        Ok(())
    }

    async fn query(
        &self,
        index: StoreIndex,
        partition: &str,
        sort_prefix: Option<&str>,
    ) -> Result<Vec<Record>, AppError> {
        let now = Utc::now();
        let items = self.items.read().await;
        let mut matched: Vec<Record> = items
            .values()
            .filter(|r| !r.is_expired(now))
            .filter(|r| {
                let (p, s) = index_keys(r, index);
                p == Some(partition)
                    && sort_prefix
                        .map(|prefix| s.map(|s| s.starts_with(prefix)).unwrap_or(false))
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            let sort_of = |r: &Record| index_keys(r, index).1.unwrap_or("").to_string();
            (sort_of(a), a.pk.clone()).cmp(&(sort_of(b), b.pk.clone()))
        });
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        let mut record = Record::new("LEAD#abc", "provider-x");
        record.set_attr("response", json!("ACCEPTED"));
        store.put(record).await.unwrap();

        let fetched = store.get("LEAD#abc", "provider-x").await.unwrap().unwrap();
        assert_eq!(fetched.attr_str("response"), Some("ACCEPTED"));
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn expired_records_are_invisible() {
        let store = MemoryStore::new();
        let mut record = Record::new("LEAD#old", "provider-x");
        record.ttl = Some(Utc::now() - Duration::days(1));
        store.put(record).await.unwrap();

        assert!(store.get("LEAD#old", "provider-x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn not_exists_precondition_rejects_overwrite() {
        let store = MemoryStore::new();
        store
            .put_if(Record::new("acme", "key-1"), Precondition::NotExists)
            .await
            .unwrap();

        let err = store
            .put_if(Record::new("acme", "key-1"), Precondition::NotExists)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn version_precondition_detects_interleaved_writer() {
        let store = MemoryStore::new();
        store.put(Record::new("OEM#toyota", "METADATA")).await.unwrap();
        let read = store.get("OEM#toyota", "METADATA").await.unwrap().unwrap();

        // Another writer sneaks in between read and conditional write.
        store.put(Record::new("OEM#toyota", "METADATA")).await.unwrap();

        let err = store
            .put_if(
                Record::new("OEM#toyota", "METADATA"),
                Precondition::VersionIs(read.version),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn query_filters_by_partition_and_prefix_in_sort_order() {
        let store = MemoryStore::new();
        for (uuid, gsisk) in [("u1", "0#0"), ("u2", "1#0"), ("u3", "0#0")] {
            let mut record = Record::new(format!("toyota#{}", uuid), "toyota#corolla");
            record.gsipk = Some("toyota#2024-05-01".to_string());
            record.gsisk = Some(gsisk.to_string());
            store.put(record).await.unwrap();
        }

        let unsent = store
            .query(StoreIndex::Gsi, "toyota#2024-05-01", Some("0#0"))
            .await
            .unwrap();
        assert_eq!(unsent.len(), 2);
        assert!(unsent.iter().all(|r| r.gsisk.as_deref() == Some("0#0")));

        let all = store
            .query(StoreIndex::Gsi, "toyota#2024-05-01", None)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }
}
