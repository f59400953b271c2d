//! Generic order-fill polling loop. Adapters supply a probe that fetches and
//! parses the native order record; this engine owns the termination rules:
//! numeric fill confirmation, venue-specific terminal status, or deadline.
//! A transient probe failure is "no new information": the loop keeps going
//! until the deadline, trading completeness for bounded latency.

use rust_decimal::Decimal;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::venue::adapter::ExchangeError;

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub max_wait: Duration,
    pub poll_interval: Duration,
    /// Return as soon as filled > 0 and avg_price > 0, even if the venue
    /// still reports the order open. This is the historical behavior; set
    /// false to poll until a terminal status or the deadline.
    pub return_on_partial: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            return_on_partial: true,
        }
    }
}

/// Whether the numeric fields of a [`FillOutcome`] were actually parsed from
/// the order record. `Unknown` means the record had none of the expected
/// fields and zeros are placeholders, not observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillConfidence {
    Exact,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct FillOutcome {
    /// Base-asset quantity filled so far, zero if unknown.
    pub filled: Decimal,
    /// Average fill price, zero if unknown.
    pub avg_price: Decimal,
    /// Venue-native status string, empty if never observed.
    pub status: String,
    pub confidence: FillConfidence,
    /// Last order record fetched, for audit.
    pub order: Value,
}

impl FillOutcome {
    pub(crate) fn unobserved() -> Self {
        Self {
            filled: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            status: String::new(),
            confidence: FillConfidence::Unknown,
            order: Value::Null,
        }
    }
}

/// Case-insensitive containment match against a venue's terminal set.
/// Containment rather than equality because some venues embed the state in a
/// longer string ("EXECUTED @ 43000.0(0.5)").
pub(crate) fn is_terminal_status(status: &str, terminal: &[&str]) -> bool {
    if status.is_empty() {
        return false;
    }
    let status = status.to_ascii_lowercase();
    terminal.iter().any(|t| status.contains(t))
}

/// Polls `probe` until a terminal outcome or the deadline. With
/// `max_wait = 0` the probe still runs exactly once. Always returns within
/// `max_wait + poll_interval` of being called.
pub(crate) async fn poll_for_fill<F, Fut>(
    opts: &PollOptions,
    terminal: &[&str],
    mut probe: F,
) -> FillOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<FillOutcome, ExchangeError>>,
{
    let deadline = Instant::now() + opts.max_wait;
    let mut last = FillOutcome::unobserved();

    loop {
        match probe().await {
            Ok(snapshot) => last = snapshot,
            Err(err) => {
                tracing::debug!(error = %err, "order poll failed; treating as no new information");
            }
        }

        if opts.return_on_partial
            && last.filled > Decimal::ZERO
            && last.avg_price > Decimal::ZERO
        {
            return last;
        }
        if is_terminal_status(&last.status, terminal) {
            return last;
        }
        if Instant::now() >= deadline {
            return last;
        }
        sleep(opts.poll_interval).await;
    }
}
