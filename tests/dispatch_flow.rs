use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Mutex;

use venue_gateway::dispatch::{execute_signal, DispatchConfig, TradeSignal};
use venue_gateway::fill::{FillConfidence, FillOutcome, PollOptions};
use venue_gateway::model::{
    LimitOrderRequest, MarketKind, MarketOrderRequest, OrderRef, OrderResult, PositionSide, Side,
    SizeMode, VenueCapabilities,
};
use venue_gateway::venue::adapter::{ExchangeAdapter, ExchangeError};

struct MockAdapter {
    caps: VenueCapabilities,
    market_calls: Mutex<Vec<MarketOrderRequest>>,
    limit_calls: Mutex<Vec<LimitOrderRequest>>,
}

impl MockAdapter {
    fn new(caps: VenueCapabilities) -> Self {
        Self {
            caps,
            market_calls: Mutex::new(Vec::new()),
            limit_calls: Mutex::new(Vec::new()),
        }
    }

    fn swap_caps() -> VenueCapabilities {
        VenueCapabilities {
            market: MarketKind::Swap,
            size_mode: SizeMode::Base,
            reduce_only: true,
            position_side: true,
            post_only: false,
            cancel_by_client_id: true,
            query_by_client_id: true,
        }
    }

    fn spot_caps() -> VenueCapabilities {
        VenueCapabilities {
            market: MarketKind::Spot,
            size_mode: SizeMode::Base,
            reduce_only: false,
            position_side: false,
            post_only: false,
            cancel_by_client_id: false,
            query_by_client_id: false,
        }
    }

    fn last_market_call(&self) -> MarketOrderRequest {
        self.market_calls.lock().unwrap().last().cloned().expect("no market order placed")
    }
}

#[async_trait]
impl ExchangeAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> VenueCapabilities {
        self.caps
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn place_market_order(
        &self,
        order: MarketOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        self.market_calls.lock().unwrap().push(order);
        Ok(OrderResult::acknowledged("mock", "m-1".into(), Value::Null))
    }

    async fn place_limit_order(
        &self,
        order: LimitOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        self.limit_calls.lock().unwrap().push(order);
        Ok(OrderResult::acknowledged("mock", "l-1".into(), Value::Null))
    }

    async fn cancel_order(&self, _order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        Ok(Value::Null)
    }

    async fn get_order(&self, _order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        Ok(Value::Null)
    }

    async fn wait_for_fill(
        &self,
        _order: OrderRef<'_>,
        _opts: PollOptions,
    ) -> Result<FillOutcome, ExchangeError> {
        Ok(FillOutcome {
            filled: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            status: String::new(),
            confidence: FillConfidence::Unknown,
            order: Value::Null,
        })
    }
}

#[tokio::test]
async fn close_long_on_swap_sells_reduce_only_with_long_position_side() {
    let adapter = MockAdapter::new(MockAdapter::swap_caps());
    let result = execute_signal(
        &adapter,
        "close_long".parse().unwrap(),
        "BTC/USDT",
        dec!(0.5),
        "swap",
        &DispatchConfig::default(),
        None,
        Some("cid-1".into()),
    )
    .await
    .unwrap();
    assert_eq!(result.order_id, "m-1");

    let placed = adapter.last_market_call();
    assert_eq!(placed.side, Side::Sell);
    assert_eq!(placed.quantity, dec!(0.5));
    assert!(placed.reduce_only);
    assert_eq!(placed.position_side, Some(PositionSide::Long));
    assert_eq!(placed.client_order_id.as_deref(), Some("cid-1"));
    assert_eq!(placed.extras.margin_coin.as_deref(), Some("USDT"));
    assert_eq!(placed.extras.margin_mode.as_deref(), Some("cross"));
}

#[tokio::test]
async fn every_short_signal_is_rejected_on_spot() {
    let adapter = MockAdapter::new(MockAdapter::spot_caps());
    for signal in ["open_short", "add_short", "close_short", "reduce_short"] {
        let err = execute_signal(
            &adapter,
            signal.parse().unwrap(),
            "BTC/USDT",
            dec!(1),
            "spot",
            &DispatchConfig::default(),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)), "{signal}");
    }
    assert!(adapter.market_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn market_type_mismatch_with_adapter_capability_is_rejected() {
    let adapter = MockAdapter::new(MockAdapter::swap_caps());
    let err = execute_signal(
        &adapter,
        TradeSignal::OpenLong,
        "BTC/USDT",
        dec!(1),
        "spot",
        &DispatchConfig::default(),
        None,
        None,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ExchangeError::Validation(_)));
}

#[tokio::test]
async fn futures_aliases_normalize_to_swap() {
    let adapter = MockAdapter::new(MockAdapter::swap_caps());
    for market_type in ["futures", "future", "perp", "perpetual"] {
        execute_signal(
            &adapter,
            TradeSignal::OpenLong,
            "BTC/USDT",
            dec!(1),
            market_type,
            &DispatchConfig::default(),
            None,
            None,
        )
        .await
        .unwrap();
    }
    assert_eq!(adapter.market_calls.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn limit_price_routes_to_limit_placement() {
    let adapter = MockAdapter::new(MockAdapter::swap_caps());
    execute_signal(
        &adapter,
        TradeSignal::OpenLong,
        "BTC/USDT",
        dec!(0.25),
        "swap",
        &DispatchConfig::default(),
        Some(dec!(40000)),
        None,
    )
    .await
    .unwrap();

    let placed = adapter.limit_calls.lock().unwrap().last().cloned().unwrap();
    assert_eq!(placed.price, dec!(40000));
    assert_eq!(placed.side, Side::Buy);
    assert!(adapter.market_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reduce_only_downgrades_when_the_venue_lacks_the_flag() {
    let mut caps = MockAdapter::swap_caps();
    caps.reduce_only = false;
    caps.position_side = false;
    let adapter = MockAdapter::new(caps);

    execute_signal(
        &adapter,
        TradeSignal::CloseLong,
        "BTC/USDT",
        dec!(1),
        "swap",
        &DispatchConfig::default(),
        None,
        None,
    )
    .await
    .unwrap();

    let placed = adapter.last_market_call();
    // Still a sell, but without the unsupported flag or position tag.
    assert_eq!(placed.side, Side::Sell);
    assert!(!placed.reduce_only);
    assert_eq!(placed.position_side, None);
}

#[tokio::test]
async fn non_positive_amount_never_reaches_the_adapter() {
    let adapter = MockAdapter::new(MockAdapter::swap_caps());
    for amount in [Decimal::ZERO, dec!(-0.5)] {
        let err = execute_signal(
            &adapter,
            TradeSignal::OpenLong,
            "BTC/USDT",
            amount,
            "swap",
            &DispatchConfig::default(),
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
    }
    assert!(adapter.market_calls.lock().unwrap().is_empty());
}
