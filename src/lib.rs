//! Lead Intake Core Library
//!
//! Core of an automotive lead-distribution platform's intake backend:
//! deduplication of provider submissions, lead lifecycle tracking, provider
//! credential management, nearest-dealer resolution, and concurrent contact
//! validation, all encoded onto one wide key-value table with two secondary
//! indexes.
//!
//! # Modules
//!
//! - `circuit_breaker`: Circuit breaker guarding the validation service.
//! - `config`: Configuration management.
//! - `context`: Application context wiring and startup probe.
//! - `credentials`: Per-provider API key registry.
//! - `dealers`: Nearest-dealer resolution and profiles.
//! - `errors`: Error handling types.
//! - `geo`: Geospatial index contract.
//! - `ledger`: Lead dedup, lifecycle, and queueing.
//! - `models`: Stored entity types and key shapes.
//! - `obs`: Observability and logging.
//! - `oem`: Per-OEM configuration store.
//! - `store`: Keyed-store contract.
//! - `validation`: Concurrent contact validation.

pub mod circuit_breaker;
pub mod config;
pub mod context;
pub mod credentials;
pub mod dealers;
pub mod errors;
pub mod geo;
pub mod ledger;
pub mod models;
pub mod obs;
pub mod oem;
pub mod store;
pub mod validation;
