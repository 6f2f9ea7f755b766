use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Concrete breaker type guarding the contact-validation service, named so it
/// can live in a struct field.
pub type ValidationBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates a circuit breaker for contact-validation calls to prevent an
/// unresponsive external service from being hammered on every submission.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, requests pass through.
/// - **OPEN**: Too many failures, requests fail fast.
/// - **HALF_OPEN**: Testing if service recovered.
pub fn create_validation_circuit_breaker() -> ValidationBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
