pub mod bitfinex;
pub mod coinbase;
pub mod gate;
pub mod kraken;
pub mod kucoin;

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::venue::adapter::ExchangeError;

/// Inputs to a signing strategy. Signers are pure functions of these plus the
/// credentials they were constructed with; the nonce is produced outside so
/// the same inputs always yield the same signature.
#[derive(Debug, Clone, Copy)]
pub struct SignInput<'a> {
    pub method: &'a str,
    pub path: &'a str,
    /// Encoded query string without the leading `?`, empty when absent.
    pub query: &'a str,
    pub body: &'a str,
    /// Millisecond or second stamp, per the venue's convention.
    pub nonce: &'a str,
}

/// Per-exchange authentication-header construction.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, input: &SignInput<'_>) -> Result<Vec<(&'static str, String)>, ExchangeError>;
}

/// Monotonically non-decreasing time source for nonces and signed timestamps.
/// Millisecond stamps are strictly increasing within one instance's lifetime;
/// exchanges reject stale or repeated nonces.
pub struct MonotonicNonce {
    last_millis: AtomicI64,
}

impl MonotonicNonce {
    pub fn new() -> Self {
        Self {
            last_millis: AtomicI64::new(0),
        }
    }

    pub fn next_millis(&self) -> i64 {
        let wall = Utc::now().timestamp_millis();
        let mut prev = self.last_millis.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self.last_millis.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }

    /// Second-resolution stamp derived from the millisecond counter, so the
    /// two never run backwards relative to each other.
    pub fn next_seconds(&self) -> i64 {
        self.next_millis() / 1000
    }
}

impl Default for MonotonicNonce {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn require_credential(value: &str, what: &str) -> Result<String, ExchangeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ExchangeError::Configuration(format!("missing {what}")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_strictly_increasing() {
        let nonce = MonotonicNonce::new();
        let mut prev = nonce.next_millis();
        for _ in 0..1000 {
            let next = nonce.next_millis();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn seconds_never_run_backwards() {
        let nonce = MonotonicNonce::new();
        let mut prev = nonce.next_seconds();
        for _ in 0..100 {
            let next = nonce.next_seconds();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn missing_credential_is_a_configuration_error() {
        assert!(require_credential("  ", "api_key").is_err());
        assert_eq!(require_credential(" k ", "api_key").unwrap(), "k");
    }
}
