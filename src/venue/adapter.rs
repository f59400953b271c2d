use async_trait::async_trait;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use crate::fill::{FillOutcome, PollOptions};
use crate::model::{
    LimitOrderRequest, MarketOrderRequest, OrderRef, OrderResult, VenueCapabilities,
};

/// Remote error bodies are truncated before they reach logs or callers.
pub(crate) const REMOTE_BODY_LIMIT: usize = 500;

#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Missing/malformed credentials or an unsupported exchange/market
    /// combination. Raised at construction time, never mid-flight.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Invalid side, non-positive size/price, unsupported signal. Raised
    /// before any network access.
    #[error("validation error: {0}")]
    Validation(String),
    /// HTTP status >= 400, or an exchange-embedded error field in an
    /// otherwise-200 response. Never retried automatically.
    #[error("{exchange} remote error (HTTP {status}): {body}")]
    Remote {
        exchange: &'static str,
        status: u16,
        body: String,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl ExchangeError {
    pub(crate) fn remote(exchange: &'static str, status: u16, body: &str) -> Self {
        ExchangeError::Remote {
            exchange,
            status,
            body: body.chars().take(REMOTE_BODY_LIMIT).collect(),
        }
    }
}

/// One exchange's implementation of the uniform order-lifecycle contract.
/// Every write operation performs exactly one network call; a failed submit
/// surfaces as an error and is never silently resubmitted.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Capability/variant tag the dispatcher keys on.
    fn capabilities(&self) -> VenueCapabilities;

    /// Credential-free health probe against a public endpoint.
    async fn ping(&self) -> bool;

    async fn place_market_order(
        &self,
        order: MarketOrderRequest,
    ) -> Result<OrderResult, ExchangeError>;

    async fn place_limit_order(
        &self,
        order: LimitOrderRequest,
    ) -> Result<OrderResult, ExchangeError>;

    /// Cancels by whichever identifiers the venue accepts; at least one is
    /// required.
    async fn cancel_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError>;

    /// Fetches the venue-native order record, untouched.
    async fn get_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError>;

    /// Polls `get_order` until the order fills, reaches a terminal status,
    /// or the deadline passes. See [`crate::fill`] for the termination rules.
    async fn wait_for_fill(
        &self,
        order: OrderRef<'_>,
        opts: PollOptions,
    ) -> Result<FillOutcome, ExchangeError>;
}

pub(crate) fn check_size(quantity: Decimal) -> Result<(), ExchangeError> {
    if quantity <= Decimal::ZERO {
        return Err(ExchangeError::Validation(format!(
            "invalid size: {quantity}"
        )));
    }
    Ok(())
}

pub(crate) fn check_price(price: Decimal) -> Result<(), ExchangeError> {
    if price <= Decimal::ZERO {
        return Err(ExchangeError::Validation(format!("invalid price: {price}")));
    }
    Ok(())
}

/// Best-effort decimal out of a JSON field that may be a string or a number.
pub(crate) fn decimal_from(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str_exact(s.trim()).ok(),
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        _ => None,
    }
}

/// Extracts an order id that may arrive as a string or an integer.
pub(crate) fn id_from(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Digits-only prefix of a client order id, for venues whose client ids are
/// numeric (Bitfinex `cid`, Kraken `userref`).
pub(crate) fn numeric_client_id(client_order_id: &str, max_digits: usize) -> Option<i64> {
    let digits: String = client_order_id
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(max_digits)
        .collect();
    let id = digits.parse::<i64>().ok()?;
    (id > 0).then_some(id)
}
