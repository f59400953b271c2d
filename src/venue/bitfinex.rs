use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::fill::{poll_for_fill, FillConfidence, FillOutcome, PollOptions};
use crate::model::{
    LimitOrderRequest, MarketKind, MarketOrderRequest, OrderRef, OrderResult, Side, SizeMode,
    VenueCapabilities,
};
use crate::signing::bitfinex::BitfinexSigner;
use crate::signing::{MonotonicNonce, RequestSigner, SignInput};
use crate::symbols::{to_bitfinex_perp, to_bitfinex_spot};
use crate::transport::{HttpRequest, HttpTransport, Method, ReqwestTransport};
use crate::venue::adapter::{
    check_price, check_size, decimal_from, id_from, numeric_client_id, ExchangeAdapter,
    ExchangeError,
};

pub const DEFAULT_BASE_URL: &str = "https://api.bitfinex.com";

/// Statuses like "EXECUTED @ 43000.0(0.5)" or "CANCELED" mark the order done.
const TERMINAL_STATUSES: &[&str] = &["executed", "canceled"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitfinexVariant {
    /// EXCHANGE MARKET / EXCHANGE LIMIT order types, tBASEQUOTE tickers.
    Spot,
    /// MARKET / LIMIT order types, tBASEF0:QUOTEF0 perpetual tickers.
    Derivatives,
}

pub struct BitfinexAdapter {
    signer: BitfinexSigner,
    base_url: String,
    variant: BitfinexVariant,
    transport: Arc<dyn HttpTransport>,
    nonce: MonotonicNonce,
}

impl BitfinexAdapter {
    pub fn new(
        api_key: &str,
        secret_key: &str,
        base_url: &str,
        variant: BitfinexVariant,
    ) -> Result<Self, ExchangeError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(api_key, secret_key, base_url, variant, transport)
    }

    pub fn with_transport(
        api_key: &str,
        secret_key: &str,
        base_url: &str,
        variant: BitfinexVariant,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ExchangeError> {
        Ok(Self {
            signer: BitfinexSigner::new(api_key, secret_key)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            variant,
            transport,
            nonce: MonotonicNonce::new(),
        })
    }

    fn native_symbol(&self, symbol: &str) -> String {
        match self.variant {
            BitfinexVariant::Spot => to_bitfinex_spot(symbol),
            BitfinexVariant::Derivatives => to_bitfinex_perp(symbol),
        }
    }

    fn order_type(&self, limit: bool) -> &'static str {
        match (self.variant, limit) {
            (BitfinexVariant::Spot, false) => "EXCHANGE MARKET",
            (BitfinexVariant::Spot, true) => "EXCHANGE LIMIT",
            (BitfinexVariant::Derivatives, false) => "MARKET",
            (BitfinexVariant::Derivatives, true) => "LIMIT",
        }
    }

    /// The v2 API expresses the side through the sign of the amount.
    fn signed_amount(side: Side, quantity: Decimal) -> Decimal {
        match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        }
    }

    async fn signed_request(
        &self,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ExchangeError> {
        let nonce = self.nonce.next_millis().to_string();
        let body_str = body.as_ref().map(Value::to_string).unwrap_or_default();
        let mut headers = self.signer.sign(&SignInput {
            method: "POST",
            path,
            query: "",
            body: &body_str,
            nonce: &nonce,
        })?;
        headers.push(("Content-Type", "application/json".to_string()));

        let response = self
            .transport
            .send(HttpRequest {
                method: Method::Post,
                url: format!("{}/v2{}", self.base_url, path),
                headers: headers
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
                body: (!body_str.is_empty()).then_some(body_str),
            })
            .await?;

        if response.status >= 400 {
            return Err(ExchangeError::remote("bitfinex", response.status, &response.text));
        }
        Ok(response.body)
    }

    async fn submit_order(&self, body: Value) -> Result<OrderResult, ExchangeError> {
        let raw = self.signed_request("/auth/w/order/submit", Some(body)).await?;
        // Response shape: [mts, type, msg_id, [[order fields, ...]], ...]
        let order_id = raw
            .get(3)
            .and_then(|v| v.get(0))
            .and_then(|v| v.get(0))
            .map(id_from)
            .unwrap_or_default();
        Ok(OrderResult::acknowledged("bitfinex", order_id, raw))
    }

    fn order_body(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
        client_order_id: Option<&str>,
    ) -> Value {
        let mut body = Map::new();
        body.insert(
            "type".to_string(),
            Value::String(self.order_type(price.is_some()).to_string()),
        );
        body.insert("symbol".to_string(), Value::String(self.native_symbol(symbol)));
        body.insert(
            "amount".to_string(),
            Value::String(Self::signed_amount(side, quantity).to_string()),
        );
        if let Some(px) = price {
            body.insert("price".to_string(), Value::String(px.to_string()));
        }
        // Bitfinex cid is numeric; keep the digits of the caller's id.
        if let Some(cid) = client_order_id.and_then(|id| numeric_client_id(id, 18)) {
            body.insert("cid".to_string(), json!(cid));
        }
        Value::Object(body)
    }

    fn parse_fill(record: &Value) -> FillOutcome {
        // The record is a flat field array, sometimes nested one level deep.
        let fields = match record.get(0) {
            Some(first) if first.is_array() => first,
            _ => record,
        };
        let status = fields
            .get(13)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let remaining = fields.get(6).and_then(decimal_from);
        let original = fields.get(7).and_then(decimal_from);
        let avg_price = fields.get(14).and_then(decimal_from);

        match (original, remaining) {
            (Some(original), Some(remaining)) => FillOutcome {
                filled: (original - remaining).abs(),
                avg_price: avg_price.unwrap_or(Decimal::ZERO),
                status,
                confidence: FillConfidence::Exact,
                order: record.clone(),
            },
            _ => FillOutcome {
                filled: Decimal::ZERO,
                avg_price: Decimal::ZERO,
                status,
                confidence: FillConfidence::Unknown,
                order: record.clone(),
            },
        }
    }

    fn order_id_as_int(order: &OrderRef<'_>) -> Result<i64, ExchangeError> {
        let id = order.order_id.ok_or_else(|| {
            ExchangeError::Validation("bitfinex requires an exchange order_id".into())
        })?;
        id.parse::<i64>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| ExchangeError::Validation(format!("bitfinex invalid order_id: {id}")))
    }

    /// Private read used to validate credentials.
    pub async fn get_wallets(&self) -> Result<Value, ExchangeError> {
        self.signed_request("/auth/r/wallets", Some(json!({}))).await
    }

    pub async fn get_positions(&self) -> Result<Value, ExchangeError> {
        self.signed_request("/auth/r/positions", Some(json!({}))).await
    }
}

#[async_trait]
impl ExchangeAdapter for BitfinexAdapter {
    fn name(&self) -> &'static str {
        "bitfinex"
    }

    fn capabilities(&self) -> VenueCapabilities {
        VenueCapabilities {
            market: match self.variant {
                BitfinexVariant::Spot => MarketKind::Spot,
                BitfinexVariant::Derivatives => MarketKind::Swap,
            },
            size_mode: SizeMode::SignedBase,
            reduce_only: false,
            position_side: false,
            post_only: false,
            cancel_by_client_id: false,
            query_by_client_id: false,
        }
    }

    async fn ping(&self) -> bool {
        let request = HttpRequest {
            method: Method::Get,
            url: format!("{}/v2/platform/status", self.base_url),
            headers: Vec::new(),
            body: None,
        };
        match self.transport.send(request).await {
            Ok(resp) => resp.status < 400 && resp.body.get(0).and_then(Value::as_i64) == Some(1),
            Err(_) => false,
        }
    }

    async fn place_market_order(
        &self,
        order: MarketOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        let body = self.order_body(
            &order.symbol,
            order.side,
            order.quantity,
            None,
            order.client_order_id.as_deref(),
        );
        self.submit_order(body).await
    }

    async fn place_limit_order(
        &self,
        order: LimitOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        check_price(order.price)?;
        let body = self.order_body(
            &order.symbol,
            order.side,
            order.quantity,
            Some(order.price),
            order.client_order_id.as_deref(),
        );
        self.submit_order(body).await
    }

    async fn cancel_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let id = Self::order_id_as_int(&order)?;
        self.signed_request("/auth/w/order/cancel", Some(json!({ "id": id })))
            .await
    }

    async fn get_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let id = Self::order_id_as_int(&order)?;
        self.signed_request(&format!("/auth/r/order/{id}"), None).await
    }

    async fn wait_for_fill(
        &self,
        order: OrderRef<'_>,
        opts: PollOptions,
    ) -> Result<FillOutcome, ExchangeError> {
        Self::order_id_as_int(&order)?;
        let outcome = poll_for_fill(&opts, TERMINAL_STATUSES, || async move {
            let record = self.get_order(order).await?;
            Ok(Self::parse_fill(&record))
        })
        .await;
        Ok(outcome)
    }
}
