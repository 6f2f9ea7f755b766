//! Concurrent external validation of email and phone contact data.
//!
//! Both channel calls launch together and both reach completion before the
//! combined result is produced; a timeout or failure on one channel never
//! corrupts the other's result. Any service failure, timeout, or malformed
//! response downgrades to "not valid" for that channel: a false negative
//! degrades experience but must never abort the submission path.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

use failsafe::CircuitBreaker;

use crate::circuit_breaker::{create_validation_circuit_breaker, ValidationBreaker};
use crate::config::Config;
use crate::errors::AppError;

/// Base delay before the first retry; doubles per attempt.
const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(250);

pub struct ContactValidator {
    client: reqwest::Client,
    service_url: String,
    request_key: String,
    email_method: String,
    phone_method: String,
    call_timeout: Duration,
    max_attempts: u32,
    breaker: ValidationBreaker,
}

impl ContactValidator {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            service_url: config.validation_service_url.clone(),
            request_key: config.validation_request_key.clone(),
            email_method: config.email_verify_method.clone(),
            phone_method: config.phone_verify_method.clone(),
            call_timeout: Duration::from_millis(config.validation_timeout_ms),
            max_attempts: config.validation_max_attempts,
            breaker: create_validation_circuit_breaker(),
        }
    }

    /// Validates both channels concurrently and combines with OR: a
    /// submission passes with either signal confirmed. The OR here is a
    /// confirmed product policy; flipping to AND is this one expression.
    pub async fn verify_contact(&self, email: &str, phone: &str) -> bool {
        let (email_valid, phone_valid) =
            tokio::join!(self.validate_email(email), self.validate_phone(phone));
        email_valid || phone_valid
    }

    async fn validate_email(&self, email: &str) -> bool {
        if email.is_empty() {
            tracing::debug!("empty email, skipping validation call");
            return false;
        }
        if !is_plausible_email(email) {
            tracing::warn!(email, "implausible email format, skipping validation call");
            return false;
        }
        self.validate_channel("EmailAddress", &self.email_method, email, parse_email_response)
            .await
    }

    async fn validate_phone(&self, phone: &str) -> bool {
        if phone.is_empty() {
            tracing::debug!("empty phone, skipping validation call");
            return false;
        }
        self.validate_channel("PhoneNumber", &self.phone_method, phone, parse_phone_response)
            .await
    }

    /// One channel's outbound call with bounded timeout and retry. Transport
    /// errors and timeouts retry with exponential backoff; a parsed response,
    /// however malformed, is terminal for the channel.
    async fn validate_channel(
        &self,
        param: &str,
        method: &str,
        value: &str,
        parse: fn(&Value) -> bool,
    ) -> bool {
        if !self.breaker.is_call_permitted() {
            tracing::warn!(method, "validation circuit open, reporting not valid");
            return false;
        }

        let url = match reqwest::Url::parse_with_params(
            &self.service_url,
            &[
                ("Method", method),
                ("RequestKey", self.request_key.as_str()),
                (param, value),
                ("OutputFormat", "json"),
            ],
        ) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(method, "failed to build validation URL: {}", e);
                return false;
            }
        };

        let mut backoff = RETRY_BACKOFF_BASE;
        for attempt in 1..=self.max_attempts {
            match self.attempt(url.clone()).await {
                Ok(body) => {
                    self.record_outcome(true);
                    return parse(&body);
                }
                Err(e) => {
                    self.record_outcome(false);
                    tracing::warn!(
                        method,
                        attempt,
                        max_attempts = self.max_attempts,
                        "validation call failed: {}",
                        e
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        false
    }

    async fn attempt(&self, url: reqwest::Url) -> Result<Value, AppError> {
        let fut = async {
            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(AppError::ExternalApi(format!(
                    "validation service returned status {}",
                    response.status()
                )));
            }
            let body: Value = response.json().await?;
            Ok(body)
        };
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| {
                AppError::ExternalApi(format!(
                    "validation call timed out after {:?}",
                    self.call_timeout
                ))
            })?
    }

    fn record_outcome(&self, ok: bool) {
        let outcome: Result<(), &str> = if ok { Ok(()) } else { Err("validation call failed") };
        let _: Result<(), failsafe::Error<&str>> = self.breaker.call(|| outcome);
    }
}

/// Email valid iff `DtResponse.Result[0].StatusCode` is "0" or "1".
/// Anything unrecognized is "not valid", never a fatal error.
fn parse_email_response(body: &Value) -> bool {
    match result_field(body, "StatusCode").and_then(Value::as_str) {
        Some(code @ ("0" | "1")) => {
            tracing::info!(code, "valid email received");
            true
        }
        other => {
            tracing::debug!(?other, "email not valid or response unrecognized");
            false
        }
    }
}

/// Phone valid iff `DtResponse.Result[0].IsValid` is "True".
fn parse_phone_response(body: &Value) -> bool {
    match result_field(body, "IsValid").and_then(Value::as_str) {
        Some("True") => {
            tracing::info!("valid phone number received");
            true
        }
        other => {
            tracing::debug!(?other, "phone not valid or response unrecognized");
            false
        }
    }
}

fn result_field<'a>(body: &'a Value, field: &str) -> Option<&'a Value> {
    body.get("DtResponse")?.get("Result")?.get(0)?.get(field)
}

/// Cheap local sanity check that spares the service an obviously hopeless
/// email. RFC 5322 simplified.
fn is_plausible_email(email: &str) -> bool {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .unwrap()
    });
    regex.is_match(email)
}
