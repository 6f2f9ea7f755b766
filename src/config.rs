use serde::Deserialize;

/// Default retention for provider idempotency records, in days.
const DEFAULT_LEAD_RECORD_TTL_DAYS: i64 = 30;
/// Default retention for OEM lead and customer identity records, in days.
const DEFAULT_OEM_RECORD_TTL_DAYS: i64 = 365;
/// Default per-call timeout for the contact-validation service.
const DEFAULT_VALIDATION_TIMEOUT_MS: u64 = 3_000;
/// Default attempt budget per validation call (first try + retries).
const DEFAULT_VALIDATION_MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub validation_service_url: String,
    pub validation_request_key: String,
    pub email_verify_method: String,
    pub phone_verify_method: String,
    pub validation_timeout_ms: u64,
    pub validation_max_attempts: u32,
    pub lead_record_ttl_days: i64,
    pub oem_record_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            validation_service_url: std::env::var("VALIDATION_SERVICE_URL")
                .map_err(|_| {
                    anyhow::anyhow!("VALIDATION_SERVICE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("VALIDATION_SERVICE_URL cannot be empty");
                    }
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!(
                            "VALIDATION_SERVICE_URL must start with http:// or https://"
                        );
                    }
                    Ok(url)
                })?,
            validation_request_key: std::env::var("VALIDATION_REQUEST_KEY")
                .map_err(|_| {
                    anyhow::anyhow!("VALIDATION_REQUEST_KEY environment variable required")
                })
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("VALIDATION_REQUEST_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            email_verify_method: std::env::var("EMAIL_VERIFY_METHOD")
                .unwrap_or_else(|_| "EmailVerify".to_string()),
            phone_verify_method: std::env::var("PHONE_VERIFY_METHOD")
                .unwrap_or_else(|_| "PhoneVerify".to_string()),
            validation_timeout_ms: std::env::var("VALIDATION_TIMEOUT_MS")
                .unwrap_or_else(|_| DEFAULT_VALIDATION_TIMEOUT_MS.to_string())
                .parse()
                .map_err(|_| {
                    anyhow::anyhow!("VALIDATION_TIMEOUT_MS must be a number of milliseconds")
                })
                .and_then(|ms: u64| {
                    if ms == 0 {
                        anyhow::bail!("VALIDATION_TIMEOUT_MS must be greater than zero");
                    }
                    Ok(ms)
                })?,
            validation_max_attempts: std::env::var("VALIDATION_MAX_ATTEMPTS")
                .unwrap_or_else(|_| DEFAULT_VALIDATION_MAX_ATTEMPTS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("VALIDATION_MAX_ATTEMPTS must be a number"))
                .and_then(|n: u32| {
                    if n == 0 {
                        anyhow::bail!("VALIDATION_MAX_ATTEMPTS must be at least 1");
                    }
                    Ok(n)
                })?,
            lead_record_ttl_days: std::env::var("LEAD_RECORD_TTL_DAYS")
                .unwrap_or_else(|_| DEFAULT_LEAD_RECORD_TTL_DAYS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("LEAD_RECORD_TTL_DAYS must be a number of days"))?,
            oem_record_ttl_days: std::env::var("OEM_RECORD_TTL_DAYS")
                .unwrap_or_else(|_| DEFAULT_OEM_RECORD_TTL_DAYS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("OEM_RECORD_TTL_DAYS must be a number of days"))?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Validation service URL: {}", config.validation_service_url);
        tracing::debug!(
            "Validation timeout: {}ms, max attempts: {}",
            config.validation_timeout_ms,
            config.validation_max_attempts
        );
        tracing::debug!(
            "Record TTLs: lead {}d, oem {}d",
            config.lead_record_ttl_days,
            config.oem_record_ttl_days
        );

        Ok(config)
    }
}
