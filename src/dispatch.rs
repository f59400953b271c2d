//! Translates an abstract strategy signal into an order call on an adapter.
//! Behavior is keyed on the adapter's declared capabilities, never on its
//! concrete type.

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::debug;

use crate::model::{
    MarketKind, MarketOrderRequest, LimitOrderRequest, OrderExtras, OrderResult, PositionSide,
    Side,
};
use crate::venue::adapter::{ExchangeAdapter, ExchangeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSignal {
    OpenLong,
    AddLong,
    OpenShort,
    AddShort,
    CloseLong,
    ReduceLong,
    CloseShort,
    ReduceShort,
}

impl FromStr for TradeSignal {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open_long" => Ok(Self::OpenLong),
            "add_long" => Ok(Self::AddLong),
            "open_short" => Ok(Self::OpenShort),
            "add_short" => Ok(Self::AddShort),
            "close_long" => Ok(Self::CloseLong),
            "reduce_long" => Ok(Self::ReduceLong),
            "close_short" => Ok(Self::CloseShort),
            "reduce_short" => Ok(Self::ReduceShort),
            other => Err(ExchangeError::Validation(format!(
                "unsupported signal_type: {other}"
            ))),
        }
    }
}

/// (side, position side, reduce-only) derived from a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalIntent {
    pub side: Side,
    pub position_side: PositionSide,
    pub reduce_only: bool,
}

impl TradeSignal {
    /// Total over every signal: opens/adds keep reduce-only off, closes and
    /// reduces flip the side and set it.
    pub fn intent(self) -> SignalIntent {
        match self {
            Self::OpenLong | Self::AddLong => SignalIntent {
                side: Side::Buy,
                position_side: PositionSide::Long,
                reduce_only: false,
            },
            Self::OpenShort | Self::AddShort => SignalIntent {
                side: Side::Sell,
                position_side: PositionSide::Short,
                reduce_only: false,
            },
            Self::CloseLong | Self::ReduceLong => SignalIntent {
                side: Side::Sell,
                position_side: PositionSide::Long,
                reduce_only: true,
            },
            Self::CloseShort | Self::ReduceShort => SignalIntent {
                side: Side::Buy,
                position_side: PositionSide::Short,
                reduce_only: true,
            },
        }
    }

    /// True for any signal that touches the short side of the book.
    pub fn is_short_side(self) -> bool {
        self.intent().position_side == PositionSide::Short
    }
}

/// Per-call dispatch parameters with their documented defaults.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Margin mode for venues that take one per order. Default "cross".
    pub margin_mode: String,
    /// Settlement coin for margined venues. Default "USDT".
    pub margin_coin: String,
    /// Product family for venues that scope orders by it. Default
    /// "USDT-FUTURES".
    pub product_type: String,
    /// Request validity window in milliseconds. Default 5000.
    pub recv_window_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            margin_mode: "cross".into(),
            margin_coin: "USDT".into(),
            product_type: "USDT-FUTURES".into(),
            recv_window_ms: 5000,
        }
    }
}

impl DispatchConfig {
    fn extras(&self) -> OrderExtras {
        OrderExtras {
            margin_mode: Some(self.margin_mode.clone()),
            margin_coin: Some(self.margin_coin.clone()),
            product_type: Some(self.product_type.clone()),
            recv_window_ms: Some(self.recv_window_ms),
        }
    }
}

/// Places one order for `signal` on `adapter`: a market order, or a limit
/// order when `limit_price` is given. Validation happens entirely before any
/// network access; a spot market type rejects short-side signals outright.
pub async fn execute_signal(
    adapter: &dyn ExchangeAdapter,
    signal: TradeSignal,
    symbol: &str,
    amount: Decimal,
    market_type: &str,
    config: &DispatchConfig,
    limit_price: Option<Decimal>,
    client_order_id: Option<String>,
) -> Result<OrderResult, ExchangeError> {
    if amount <= Decimal::ZERO {
        return Err(ExchangeError::Validation(format!(
            "invalid amount: {amount}"
        )));
    }

    let market = MarketKind::parse(market_type).map_err(|_| {
        ExchangeError::Validation(format!("unsupported market_type: {market_type}"))
    })?;
    // No borrowing support: spot cannot open, add to, or close a short.
    if market == MarketKind::Spot && signal.is_short_side() {
        return Err(ExchangeError::Validation(
            "spot market does not support short signals".into(),
        ));
    }

    let caps = adapter.capabilities();
    if caps.market != market {
        return Err(ExchangeError::Validation(format!(
            "{} serves the {} market, not {}",
            adapter.name(),
            caps.market.as_str(),
            market.as_str()
        )));
    }

    let intent = signal.intent();
    let reduce_only = if intent.reduce_only && !caps.reduce_only {
        // Venues without the flag express a close as a plain opposite-side
        // order.
        debug!(
            exchange = adapter.name(),
            "venue has no reduce-only flag; submitting a plain {} order",
            intent.side
        );
        false
    } else {
        intent.reduce_only
    };
    let position_side = caps.position_side.then_some(intent.position_side);

    debug!(
        exchange = adapter.name(),
        signal = ?signal,
        symbol,
        %amount,
        side = %intent.side,
        reduce_only,
        "dispatching signal"
    );

    match limit_price {
        Some(price) => {
            let mut request = LimitOrderRequest::new(symbol, intent.side, amount, price);
            request.reduce_only = reduce_only;
            request.client_order_id = client_order_id;
            request.extras = config.extras();
            adapter.place_limit_order(request).await
        }
        None => {
            let mut request = MarketOrderRequest::new(symbol, intent.side, amount);
            request.reduce_only = reduce_only;
            request.position_side = position_side;
            request.client_order_id = client_order_id;
            request.extras = config.extras();
            adapter.place_market_order(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_mapping_is_exhaustive_and_total() {
        let expected = [
            ("open_long", Side::Buy, PositionSide::Long, false),
            ("add_long", Side::Buy, PositionSide::Long, false),
            ("open_short", Side::Sell, PositionSide::Short, false),
            ("add_short", Side::Sell, PositionSide::Short, false),
            ("close_long", Side::Sell, PositionSide::Long, true),
            ("reduce_long", Side::Sell, PositionSide::Long, true),
            ("close_short", Side::Buy, PositionSide::Short, true),
            ("reduce_short", Side::Buy, PositionSide::Short, true),
        ];
        for (name, side, position_side, reduce_only) in expected {
            let intent = name.parse::<TradeSignal>().unwrap().intent();
            assert_eq!(intent.side, side, "{name}");
            assert_eq!(intent.position_side, position_side, "{name}");
            assert_eq!(intent.reduce_only, reduce_only, "{name}");
        }
    }

    #[test]
    fn unknown_signals_are_rejected() {
        for bad in ["hold", "close", "", "long", "open_long_now"] {
            assert!(matches!(
                bad.parse::<TradeSignal>(),
                Err(ExchangeError::Validation(_))
            ));
        }
    }

    #[test]
    fn signal_parsing_trims_and_lowercases() {
        assert_eq!(
            " OPEN_LONG ".parse::<TradeSignal>().unwrap(),
            TradeSignal::OpenLong
        );
    }

    #[test]
    fn dispatch_defaults_are_documented_values() {
        let config = DispatchConfig::default();
        assert_eq!(config.margin_mode, "cross");
        assert_eq!(config.margin_coin, "USDT");
        assert_eq!(config.product_type, "USDT-FUTURES");
        assert_eq!(config.recv_window_ms, 5000);
    }
}
