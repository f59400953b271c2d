use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::venue::adapter::ExchangeError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    #[serde(rename = "buy")]
    Buy,
    #[serde(rename = "sell")]
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(ExchangeError::Validation(format!("invalid side: {other}"))),
        }
    }
}

/// Long/short tag for exchanges that track both directions on one instrument.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PositionSide {
    #[serde(rename = "long")]
    Long,
    #[serde(rename = "short")]
    Short,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MarketKind {
    #[serde(rename = "spot")]
    Spot,
    #[serde(rename = "swap")]
    Swap,
}

impl MarketKind {
    /// Normalizes the market-type strings accepted at the boundary.
    /// "futures", "future", "perp" and "perpetual" all collapse to swap;
    /// an empty string defaults to swap.
    pub fn parse(market_type: &str) -> Result<Self, ExchangeError> {
        match market_type.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(MarketKind::Spot),
            "" | "swap" | "futures" | "future" | "perp" | "perpetual" => Ok(MarketKind::Swap),
            other => Err(ExchangeError::Configuration(format!(
                "unsupported market_type: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::Spot => "spot",
            MarketKind::Swap => "swap",
        }
    }
}

/// How a venue expresses order size on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    /// Base-asset quantity, sent as given.
    Base,
    /// Base-asset quantity with the sign carrying the side (positive buy, negative sell).
    SignedBase,
    /// Integer contract count derived from cached contract metadata.
    Contracts,
}

/// Capability tag declared by every adapter. The dispatcher keys its behavior
/// on this, never on the adapter's concrete type.
#[derive(Debug, Clone, Copy)]
pub struct VenueCapabilities {
    pub market: MarketKind,
    pub size_mode: SizeMode,
    pub reduce_only: bool,
    pub position_side: bool,
    pub post_only: bool,
    pub cancel_by_client_id: bool,
    pub query_by_client_id: bool,
}

/// Identifies an order by exchange id, client id, or both.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderRef<'a> {
    pub order_id: Option<&'a str>,
    pub client_order_id: Option<&'a str>,
}

impl<'a> OrderRef<'a> {
    pub fn by_id(order_id: &'a str) -> Self {
        Self {
            order_id: Some(order_id),
            client_order_id: None,
        }
    }

    pub fn by_client_id(client_order_id: &'a str) -> Self {
        Self {
            order_id: None,
            client_order_id: Some(client_order_id),
        }
    }

    pub(crate) fn require_any(&self, exchange: &str) -> Result<(), ExchangeError> {
        if self.order_id.is_none() && self.client_order_id.is_none() {
            return Err(ExchangeError::Validation(format!(
                "{exchange} requires order_id or client_order_id"
            )));
        }
        Ok(())
    }
}

/// Extra per-venue parameters supplied by the dispatcher. Adapters read the
/// fields their venue understands and ignore the rest.
#[derive(Debug, Clone, Default)]
pub struct OrderExtras {
    pub margin_mode: Option<String>,
    pub margin_coin: Option<String>,
    pub product_type: Option<String>,
    pub recv_window_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MarketOrderRequest {
    pub symbol: String,
    pub side: Side,
    /// Base-asset quantity unless `quote_funds` is set.
    pub quantity: Decimal,
    pub reduce_only: bool,
    pub position_side: Option<PositionSide>,
    /// Treat `quantity` as quote-asset funds on market buys (KuCoin spot).
    pub quote_funds: bool,
    pub client_order_id: Option<String>,
    pub extras: OrderExtras,
}

impl MarketOrderRequest {
    pub fn new(symbol: impl Into<String>, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            reduce_only: false,
            position_side: None,
            quote_funds: false,
            client_order_id: None,
            extras: OrderExtras::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LimitOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub reduce_only: bool,
    pub post_only: bool,
    pub client_order_id: Option<String>,
    pub extras: OrderExtras,
}

impl LimitOrderRequest {
    pub fn new(symbol: impl Into<String>, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price,
            reduce_only: false,
            post_only: false,
            client_order_id: None,
            extras: OrderExtras::default(),
        }
    }
}

/// Acknowledgement of a submitted order. `filled` and `avg_price` stay zero
/// until the venue reports execution progress; `raw` keeps the untouched
/// response payload for audit.
#[derive(Debug, Clone, Serialize)]
pub struct OrderResult {
    pub exchange: &'static str,
    pub order_id: String,
    pub filled: Decimal,
    pub avg_price: Decimal,
    pub raw: Value,
}

impl OrderResult {
    pub fn acknowledged(exchange: &'static str, order_id: String, raw: Value) -> Self {
        Self {
            exchange,
            order_id,
            filled: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            raw,
        }
    }
}
