/// Component tests for the lead ledger against the in-memory keyed store.
use std::sync::Arc;

use lead_intake_core::config::Config;
use lead_intake_core::errors::AppError;
use lead_intake_core::ledger::LeadLedger;
use lead_intake_core::models::{CustomerLeadRecord, LeadState, NewOemLead};
use lead_intake_core::oem::OemMetadataStore;
use lead_intake_core::store::MemoryStore;

fn test_config() -> Config {
    Config {
        validation_service_url: "https://verify.example.com/service".to_string(),
        validation_request_key: "test_key".to_string(),
        email_verify_method: "EmailVerify".to_string(),
        phone_verify_method: "PhoneVerify".to_string(),
        validation_timeout_ms: 500,
        validation_max_attempts: 1,
        lead_record_ttl_days: 30,
        oem_record_ttl_days: 365,
    }
}

fn build_ledger() -> (LeadLedger, Arc<OemMetadataStore>) {
    let store = Arc::new(MemoryStore::new());
    let oem_config = Arc::new(OemMetadataStore::new(store.clone()));
    let ledger = LeadLedger::new(store, oem_config.clone(), &test_config());
    (ledger, oem_config)
}

fn sample_lead(uuid: &str, make: &str, model: &str) -> NewOemLead {
    NewOemLead {
        uuid: uuid.to_string(),
        make: make.to_string(),
        model: model.to_string(),
        date: "2024-05-01".to_string(),
        email: "jane@example.com".to_string(),
        phone: "4155551234".to_string(),
        last_name: "Doe".to_string(),
        timestamp: "2024-05-01T12:00:00Z".to_string(),
        make_model_filter_status: false,
        lead_hash: "hash-1".to_string(),
        dealer: "D42".to_string(),
        provider: "acme-leads".to_string(),
        postalcode: "94103".to_string(),
    }
}

fn sample_customer(uuid: &str, email: &str, phone: &str, last_name: &str) -> CustomerLeadRecord {
    CustomerLeadRecord {
        uuid: uuid.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        last_name: last_name.to_string(),
        oem: "toyota".to_string(),
        make: "toyota".to_string(),
        model: "corolla".to_string(),
    }
}

#[tokio::test]
async fn replayed_provider_call_is_answered_verbatim() {
    let (ledger, _) = build_ledger();

    let check = ledger
        .check_duplicate_api_call("h1", "acme-leads")
        .await
        .unwrap();
    assert!(!check.is_duplicate);
    assert_eq!(check.response, None);

    ledger
        .insert_api_call_record("h1", "acme-leads", "ACCEPTED:lead-123")
        .await
        .unwrap();

    let check = ledger
        .check_duplicate_api_call("h1", "acme-leads")
        .await
        .unwrap();
    assert!(check.is_duplicate);
    assert_eq!(check.response.as_deref(), Some("ACCEPTED:lead-123"));

    // Same hash from a different provider is not a duplicate.
    let other = ledger
        .check_duplicate_api_call("h1", "other-provider")
        .await
        .unwrap();
    assert!(!other.is_duplicate);
}

#[tokio::test]
async fn lifecycle_runs_accepted_sent_converted() {
    let (ledger, _) = build_ledger();
    ledger
        .insert_oem_lead(sample_lead("u1", "toyota", "corolla"))
        .await
        .unwrap();

    let unsent = ledger.query_accepted_unsent("toyota", "2024-05-01").await.unwrap();
    assert_eq!(unsent.len(), 1);
    assert_eq!(unsent[0].state, LeadState::Accepted);

    assert!(ledger.mark_sent("u1", "toyota").await.unwrap());

    // Sent leads drop out of the accepted-unsent queue.
    let unsent = ledger.query_accepted_unsent("toyota", "2024-05-01").await.unwrap();
    assert!(unsent.is_empty());

    let settled = ledger
        .update_conversion("u1", "toyota", true)
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(settled.state, LeadState::Converted);
    assert_eq!(settled.conversion, 1);
    assert!(settled.oem_responded);
}

#[tokio::test]
async fn not_converted_outcome_is_terminal() {
    let (ledger, _) = build_ledger();
    ledger
        .insert_oem_lead(sample_lead("u1", "toyota", "corolla"))
        .await
        .unwrap();
    assert!(ledger.mark_sent("u1", "toyota").await.unwrap());

    let settled = ledger
        .update_conversion("u1", "toyota", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.state, LeadState::NotConverted);
    assert_eq!(settled.conversion, 0);

    // Terminal: a second settlement is a usage error.
    let err = ledger.update_conversion("u1", "toyota", true).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

#[tokio::test]
async fn transitions_cannot_reorder_or_skip_sent() {
    let (ledger, _) = build_ledger();
    ledger
        .insert_oem_lead(sample_lead("u1", "toyota", "corolla"))
        .await
        .unwrap();

    // Settling an Accepted lead skips Sent.
    let err = ledger.update_conversion("u1", "toyota", true).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    assert!(ledger.mark_sent("u1", "toyota").await.unwrap());

    // Marking sent twice is a usage error, not an idempotent no-op.
    let err = ledger.mark_sent("u1", "toyota").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

#[tokio::test]
async fn missing_records_are_a_business_outcome() {
    let (ledger, _) = build_ledger();
    assert!(!ledger.mark_sent("ghost", "toyota").await.unwrap());
    assert!(ledger
        .update_conversion("ghost", "toyota", true)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn make_model_filter_requires_exact_model_match() {
    let (ledger, oem_config) = build_ledger();
    oem_config.create_oem("toyota", true, 0.4).await.unwrap();

    ledger
        .insert_customer_lead(sample_customer("u1", "jane@example.com", "4155551234", "Doe"))
        .await
        .unwrap();
    ledger
        .insert_oem_lead(sample_lead("u1", "toyota", "corolla"))
        .await
        .unwrap();

    // Filter enabled: a different model is NOT a duplicate.
    let duplicate = ledger
        .check_duplicate_lead("jane@example.com", "4155551234", "Doe", "toyota", "camry")
        .await
        .unwrap();
    assert!(!duplicate);

    // Same model is.
    let duplicate = ledger
        .check_duplicate_lead("jane@example.com", "4155551234", "Doe", "toyota", "corolla")
        .await
        .unwrap();
    assert!(duplicate);

    // Filter disabled: any model under the make counts.
    oem_config.set_make_model_filter("toyota", false).await.unwrap();
    let duplicate = ledger
        .check_duplicate_lead("jane@example.com", "4155551234", "Doe", "toyota", "camry")
        .await
        .unwrap();
    assert!(duplicate);
}

#[tokio::test]
async fn unconfigured_oem_defaults_to_filter_disabled() {
    let (ledger, _) = build_ledger();
    ledger
        .insert_customer_lead(sample_customer("u1", "jane@example.com", "4155551234", "Doe"))
        .await
        .unwrap();
    ledger
        .insert_oem_lead(sample_lead("u1", "toyota", "corolla"))
        .await
        .unwrap();

    let duplicate = ledger
        .check_duplicate_lead("jane@example.com", "4155551234", "Doe", "toyota", "camry")
        .await
        .unwrap();
    assert!(duplicate);
}

#[tokio::test]
async fn phone_and_last_name_find_the_candidate_when_email_differs() {
    let (ledger, _) = build_ledger();
    ledger
        .insert_customer_lead(sample_customer("u1", "jane@example.com", "4155551234", "Doe"))
        .await
        .unwrap();
    ledger
        .insert_oem_lead(sample_lead("u1", "toyota", "corolla"))
        .await
        .unwrap();

    let duplicate = ledger
        .check_duplicate_lead("other@example.com", "4155551234", "Doe", "toyota", "camry")
        .await
        .unwrap();
    assert!(duplicate);

    // Neither index matches: not a duplicate.
    let duplicate = ledger
        .check_duplicate_lead("other@example.com", "0000000000", "Poe", "toyota", "camry")
        .await
        .unwrap();
    assert!(!duplicate);
}
