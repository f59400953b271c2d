use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::contracts::{base_to_contracts, ContractCache, ContractMetadata};
use crate::fill::{poll_for_fill, FillConfidence, FillOutcome, PollOptions};
use crate::model::{
    LimitOrderRequest, MarketKind, MarketOrderRequest, OrderRef, OrderResult, SizeMode,
    VenueCapabilities,
};
use crate::signing::kucoin::KucoinSigner;
use crate::signing::{MonotonicNonce, RequestSigner, SignInput};
use crate::symbols::{to_kucoin_futures, to_kucoin_spot};
use crate::transport::{HttpRequest, HttpTransport, Method, ReqwestTransport};
use crate::venue::adapter::{check_price, check_size, decimal_from, ExchangeAdapter, ExchangeError};

pub const DEFAULT_SPOT_BASE_URL: &str = "https://api.kucoin.com";
pub const DEFAULT_FUTURES_BASE_URL: &str = "https://api-futures.kucoin.com";

const SPOT_TERMINAL_STATUSES: &[&str] = &["done"];
const FUTURES_TERMINAL_STATUSES: &[&str] = &["done", "canceled", "cancelled", "filled"];

const OK_CODE: &str = "200000";

/// Shared KC-API request plumbing; the spot and futures APIs differ only in
/// base URL, endpoints, and instrument format.
struct KucoinRest {
    exchange: &'static str,
    signer: KucoinSigner,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    nonce: MonotonicNonce,
}

impl KucoinRest {
    fn new(
        exchange: &'static str,
        api_key: &str,
        secret_key: &str,
        passphrase: &str,
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ExchangeError> {
        Ok(Self {
            exchange,
            signer: KucoinSigner::new(api_key, secret_key, passphrase)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            nonce: MonotonicNonce::new(),
        })
    }

    async fn signed(
        &self,
        method: Method,
        path: &str,
        query: Vec<(&str, String)>,
        body: Option<Value>,
    ) -> Result<Value, ExchangeError> {
        let timestamp = self.nonce.next_millis().to_string();
        let body_str = body.as_ref().map(Value::to_string).unwrap_or_default();
        let query_string = if query.is_empty() {
            String::new()
        } else {
            let mut sorted = query;
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            serde_urlencoded::to_string(&sorted)
                .map_err(|e| ExchangeError::Parse(format!("urlencode error: {e}")))?
        };

        let mut headers = self.signer.sign(&SignInput {
            method: method.as_str(),
            path,
            query: &query_string,
            body: &body_str,
            nonce: &timestamp,
        })?;
        headers.push(("Content-Type", "application/json".to_string()));

        let url = if query_string.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query_string)
        };

        let response = self
            .transport
            .send(HttpRequest {
                method,
                url,
                headers: headers
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
                body: (!body_str.is_empty()).then_some(body_str),
            })
            .await?;

        if response.status >= 400 {
            return Err(ExchangeError::remote(self.exchange, response.status, &response.text));
        }
        // Errors also arrive as a non-200000 code inside an HTTP 200.
        if let Some(code) = response.body.get("code").and_then(Value::as_str) {
            if code != OK_CODE {
                return Err(ExchangeError::remote(self.exchange, response.status, &response.text));
            }
        }
        Ok(response.body)
    }

    async fn public(&self, path: &str) -> Result<Value, ExchangeError> {
        let response = self
            .transport
            .send(HttpRequest {
                method: Method::Get,
                url: format!("{}{}", self.base_url, path),
                headers: Vec::new(),
                body: None,
            })
            .await?;
        if response.status >= 400 {
            return Err(ExchangeError::remote(self.exchange, response.status, &response.text));
        }
        Ok(response.body)
    }

    async fn ping(&self) -> bool {
        match self.public("/api/v1/timestamp").await {
            Ok(body) => matches!(
                body.get("code").and_then(Value::as_str),
                Some(OK_CODE) | None
            ),
            Err(_) => false,
        }
    }
}

fn client_oid(provided: Option<&str>) -> String {
    provided
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn order_id_from(raw: &Value) -> String {
    match raw.get("data") {
        Some(Value::Object(data)) => data
            .get("orderId")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(Value::String(id)) => id.clone(),
        _ => String::new(),
    }
}

pub struct KucoinSpotAdapter {
    rest: KucoinRest,
}

impl KucoinSpotAdapter {
    pub fn new(
        api_key: &str,
        secret_key: &str,
        passphrase: &str,
        base_url: &str,
    ) -> Result<Self, ExchangeError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(api_key, secret_key, passphrase, base_url, transport)
    }

    pub fn with_transport(
        api_key: &str,
        secret_key: &str,
        passphrase: &str,
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ExchangeError> {
        Ok(Self {
            rest: KucoinRest::new("kucoin", api_key, secret_key, passphrase, base_url, transport)?,
        })
    }

    fn parse_fill(record: &Value) -> FillOutcome {
        let data = record.get("data").cloned().unwrap_or(Value::Null);
        let filled = data.get("dealSize").and_then(decimal_from);
        let deal_funds = data.get("dealFunds").and_then(decimal_from);
        // No status enum on this endpoint: termination is inferred from
        // isActive, surfaced as open/done for the polling engine.
        let status = match data.get("isActive").and_then(Value::as_bool) {
            Some(true) => "open".to_string(),
            Some(false) => "done".to_string(),
            None => String::new(),
        };

        match filled {
            Some(filled) => {
                let avg_price = match deal_funds {
                    Some(funds) if filled > Decimal::ZERO && funds > Decimal::ZERO => {
                        funds / filled
                    }
                    _ => Decimal::ZERO,
                };
                FillOutcome {
                    filled,
                    avg_price,
                    status,
                    confidence: FillConfidence::Exact,
                    order: record.clone(),
                }
            }
            None => FillOutcome {
                filled: Decimal::ZERO,
                avg_price: Decimal::ZERO,
                status,
                confidence: FillConfidence::Unknown,
                order: record.clone(),
            },
        }
    }

    /// Private read used to validate credentials.
    pub async fn get_accounts(&self) -> Result<Value, ExchangeError> {
        self.rest
            .signed(Method::Get, "/api/v1/accounts", Vec::new(), None)
            .await
    }

    pub async fn get_fills(&self, order_id: &str) -> Result<Value, ExchangeError> {
        self.rest
            .signed(
                Method::Get,
                "/api/v1/fills",
                vec![("orderId", order_id.to_string())],
                None,
            )
            .await
    }
}

#[async_trait]
impl ExchangeAdapter for KucoinSpotAdapter {
    fn name(&self) -> &'static str {
        "kucoin"
    }

    fn capabilities(&self) -> VenueCapabilities {
        VenueCapabilities {
            market: MarketKind::Spot,
            size_mode: SizeMode::Base,
            reduce_only: false,
            position_side: false,
            post_only: false,
            cancel_by_client_id: true,
            query_by_client_id: true,
        }
    }

    async fn ping(&self) -> bool {
        self.rest.ping().await
    }

    async fn place_market_order(
        &self,
        order: MarketOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        let mut body = Map::new();
        body.insert(
            "clientOid".to_string(),
            Value::String(client_oid(order.client_order_id.as_deref())),
        );
        body.insert("side".to_string(), Value::String(order.side.as_str().into()));
        body.insert(
            "symbol".to_string(),
            Value::String(to_kucoin_spot(&order.symbol)),
        );
        body.insert("type".to_string(), Value::String("market".into()));
        // Market buys may be quote-denominated; sells always use base size.
        let field = if order.side == crate::model::Side::Buy && order.quote_funds {
            "funds"
        } else {
            "size"
        };
        body.insert(field.to_string(), Value::String(order.quantity.to_string()));

        let raw = self
            .rest
            .signed(Method::Post, "/api/v1/orders", Vec::new(), Some(Value::Object(body)))
            .await?;
        let order_id = order_id_from(&raw);
        Ok(OrderResult::acknowledged("kucoin", order_id, raw))
    }

    async fn place_limit_order(
        &self,
        order: LimitOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        check_price(order.price)?;
        let body = json!({
            "clientOid": client_oid(order.client_order_id.as_deref()),
            "side": order.side.as_str(),
            "symbol": to_kucoin_spot(&order.symbol),
            "type": "limit",
            "price": order.price.to_string(),
            "size": order.quantity.to_string(),
            "timeInForce": "GTC",
        });
        let raw = self
            .rest
            .signed(Method::Post, "/api/v1/orders", Vec::new(), Some(body))
            .await?;
        let order_id = order_id_from(&raw);
        Ok(OrderResult::acknowledged("kucoin", order_id, raw))
    }

    async fn cancel_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        if let Some(id) = order.order_id {
            return self
                .rest
                .signed(Method::Delete, &format!("/api/v1/orders/{id}"), Vec::new(), None)
                .await;
        }
        if let Some(cid) = order.client_order_id {
            return self
                .rest
                .signed(
                    Method::Delete,
                    &format!("/api/v1/order/client-order/{cid}"),
                    Vec::new(),
                    None,
                )
                .await;
        }
        Err(ExchangeError::Validation(
            "kucoin cancel_order requires order_id or client_order_id".into(),
        ))
    }

    async fn get_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        if let Some(id) = order.order_id {
            return self
                .rest
                .signed(Method::Get, &format!("/api/v1/orders/{id}"), Vec::new(), None)
                .await;
        }
        if let Some(cid) = order.client_order_id {
            return self
                .rest
                .signed(
                    Method::Get,
                    &format!("/api/v1/order/client-order/{cid}"),
                    Vec::new(),
                    None,
                )
                .await;
        }
        Err(ExchangeError::Validation(
            "kucoin get_order requires order_id or client_order_id".into(),
        ))
    }

    async fn wait_for_fill(
        &self,
        order: OrderRef<'_>,
        opts: PollOptions,
    ) -> Result<FillOutcome, ExchangeError> {
        order.require_any("kucoin")?;
        let outcome = poll_for_fill(&opts, SPOT_TERMINAL_STATUSES, || async move {
            let record = self.get_order(order).await?;
            Ok(Self::parse_fill(&record))
        })
        .await;
        Ok(outcome)
    }
}

/// KuCoin USDT-perpetual adapter. Order size is an integer contract count
/// derived from the instrument's multiplier, fetched on miss and cached with
/// a TTL.
pub struct KucoinFuturesAdapter {
    rest: KucoinRest,
    contracts: ContractCache,
}

impl KucoinFuturesAdapter {
    pub fn new(
        api_key: &str,
        secret_key: &str,
        passphrase: &str,
        base_url: &str,
    ) -> Result<Self, ExchangeError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(api_key, secret_key, passphrase, base_url, transport)
    }

    pub fn with_transport(
        api_key: &str,
        secret_key: &str,
        passphrase: &str,
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ExchangeError> {
        Ok(Self {
            rest: KucoinRest::new(
                "kucoinfutures",
                api_key,
                secret_key,
                passphrase,
                base_url,
                transport,
            )?,
            contracts: ContractCache::new(),
        })
    }

    /// Multiplier for one contract of `instrument`, cache-first. An
    /// unavailable or unusable multiplier degrades to 1.
    async fn contract_multiplier(&self, instrument: &str) -> Decimal {
        if let Some(meta) = self.contracts.get(instrument) {
            return meta.multiplier;
        }
        let multiplier = match self.rest.public("/api/v1/contracts/active").await {
            Ok(raw) => raw
                .get("data")
                .and_then(Value::as_array)
                .and_then(|contracts| {
                    contracts.iter().find(|c| {
                        c.get("symbol").and_then(Value::as_str).unwrap_or_default()
                            == instrument
                    })
                })
                .and_then(|c| {
                    c.get("multiplier")
                        .and_then(decimal_from)
                        .or_else(|| c.get("lotSize").and_then(decimal_from))
                })
                .filter(|m| *m > Decimal::ZERO),
            Err(err) => {
                tracing::debug!(error = %err, instrument, "contract metadata fetch failed");
                None
            }
        };
        let multiplier = multiplier.unwrap_or(Decimal::ONE);
        self.contracts
            .store(instrument, ContractMetadata { multiplier });
        multiplier
    }

    fn parse_fill(record: &Value, multiplier: Decimal) -> FillOutcome {
        let data = record.get("data").cloned().unwrap_or(Value::Null);
        let status = data
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        // dealSize is in contracts; dealValue in quote currency.
        let deal_contracts = data.get("dealSize").and_then(decimal_from);
        let deal_value = data.get("dealValue").and_then(decimal_from);

        match deal_contracts {
            Some(contracts) => {
                let filled = contracts.abs() * multiplier;
                let avg_price = match deal_value {
                    Some(value) if filled > Decimal::ZERO && value > Decimal::ZERO => {
                        value / filled
                    }
                    _ => Decimal::ZERO,
                };
                FillOutcome {
                    filled,
                    avg_price,
                    status,
                    confidence: FillConfidence::Exact,
                    order: record.clone(),
                }
            }
            None => FillOutcome {
                filled: Decimal::ZERO,
                avg_price: Decimal::ZERO,
                status,
                confidence: FillConfidence::Unknown,
                order: record.clone(),
            },
        }
    }

    /// Best-effort leverage change; failures are reported, never fatal.
    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> bool {
        let body = json!({
            "symbol": to_kucoin_futures(symbol),
            "leverage": leverage.max(1).to_string(),
        });
        match self
            .rest
            .signed(Method::Post, "/api/v1/position/leverage", Vec::new(), Some(body))
            .await
        {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, symbol, "kucoinfutures set_leverage failed");
                false
            }
        }
    }

    /// Private read used to validate credentials.
    pub async fn get_accounts(&self) -> Result<Value, ExchangeError> {
        self.rest
            .signed(
                Method::Get,
                "/api/v1/account-overview",
                vec![("currency", "USDT".to_string())],
                None,
            )
            .await
    }

    pub async fn get_positions(&self) -> Result<Value, ExchangeError> {
        self.rest
            .signed(Method::Get, "/api/v1/positions", Vec::new(), None)
            .await
    }
}

#[async_trait]
impl ExchangeAdapter for KucoinFuturesAdapter {
    fn name(&self) -> &'static str {
        "kucoinfutures"
    }

    fn capabilities(&self) -> VenueCapabilities {
        VenueCapabilities {
            market: MarketKind::Swap,
            size_mode: SizeMode::Contracts,
            reduce_only: true,
            position_side: false,
            post_only: true,
            cancel_by_client_id: true,
            query_by_client_id: true,
        }
    }

    async fn ping(&self) -> bool {
        self.rest.ping().await
    }

    async fn place_market_order(
        &self,
        order: MarketOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        let instrument = to_kucoin_futures(&order.symbol);
        let multiplier = self.contract_multiplier(&instrument).await;
        let contracts = base_to_contracts(order.quantity, multiplier)?;

        let mut body = Map::new();
        body.insert(
            "clientOid".to_string(),
            Value::String(client_oid(order.client_order_id.as_deref())),
        );
        body.insert("side".to_string(), Value::String(order.side.as_str().into()));
        body.insert("symbol".to_string(), Value::String(instrument));
        body.insert("type".to_string(), Value::String("market".into()));
        body.insert("size".to_string(), json!(contracts));
        if order.reduce_only {
            body.insert("reduceOnly".to_string(), Value::Bool(true));
        }

        let raw = self
            .rest
            .signed(Method::Post, "/api/v1/orders", Vec::new(), Some(Value::Object(body)))
            .await?;
        let order_id = order_id_from(&raw);
        Ok(OrderResult::acknowledged("kucoinfutures", order_id, raw))
    }

    async fn place_limit_order(
        &self,
        order: LimitOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        check_price(order.price)?;
        let instrument = to_kucoin_futures(&order.symbol);
        let multiplier = self.contract_multiplier(&instrument).await;
        let contracts = base_to_contracts(order.quantity, multiplier)?;

        let mut body = Map::new();
        body.insert(
            "clientOid".to_string(),
            Value::String(client_oid(order.client_order_id.as_deref())),
        );
        body.insert("side".to_string(), Value::String(order.side.as_str().into()));
        body.insert("symbol".to_string(), Value::String(instrument));
        body.insert("type".to_string(), Value::String("limit".into()));
        body.insert("price".to_string(), Value::String(order.price.to_string()));
        body.insert("size".to_string(), json!(contracts));
        if order.reduce_only {
            body.insert("reduceOnly".to_string(), Value::Bool(true));
        }
        if order.post_only {
            body.insert("postOnly".to_string(), Value::Bool(true));
        }

        let raw = self
            .rest
            .signed(Method::Post, "/api/v1/orders", Vec::new(), Some(Value::Object(body)))
            .await?;
        let order_id = order_id_from(&raw);
        Ok(OrderResult::acknowledged("kucoinfutures", order_id, raw))
    }

    async fn cancel_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        if let Some(id) = order.order_id {
            return self
                .rest
                .signed(Method::Delete, &format!("/api/v1/orders/{id}"), Vec::new(), None)
                .await;
        }
        if let Some(cid) = order.client_order_id {
            return self
                .rest
                .signed(
                    Method::Delete,
                    &format!("/api/v1/orders/client-order/{cid}"),
                    Vec::new(),
                    None,
                )
                .await;
        }
        Err(ExchangeError::Validation(
            "kucoinfutures cancel_order requires order_id or client_order_id".into(),
        ))
    }

    async fn get_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        if let Some(id) = order.order_id {
            return self
                .rest
                .signed(Method::Get, &format!("/api/v1/orders/{id}"), Vec::new(), None)
                .await;
        }
        if let Some(cid) = order.client_order_id {
            return self
                .rest
                .signed(
                    Method::Get,
                    "/api/v1/orders/byClientOid",
                    vec![("clientOid", cid.to_string())],
                    None,
                )
                .await;
        }
        Err(ExchangeError::Validation(
            "kucoinfutures get_order requires order_id or client_order_id".into(),
        ))
    }

    async fn wait_for_fill(
        &self,
        order: OrderRef<'_>,
        opts: PollOptions,
    ) -> Result<FillOutcome, ExchangeError> {
        order.require_any("kucoinfutures")?;
        let outcome = poll_for_fill(&opts, FUTURES_TERMINAL_STATUSES, || async move {
            let record = self.get_order(order).await?;
            // Fills come back in contracts; convert using the multiplier of
            // the instrument named in the record itself.
            let instrument = record
                .pointer("/data/symbol")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let multiplier = if instrument.is_empty() {
                Decimal::ONE
            } else {
                self.contract_multiplier(&instrument).await
            };
            Ok(Self::parse_fill(&record, multiplier))
        })
        .await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Side;
    use crate::transport::testing::MockTransport;
    use rust_decimal_macros::dec;

    fn spot(transport: Arc<MockTransport>) -> KucoinSpotAdapter {
        KucoinSpotAdapter::with_transport("key", "secret", "pass", DEFAULT_SPOT_BASE_URL, transport)
            .unwrap()
    }

    fn futures(transport: Arc<MockTransport>) -> KucoinFuturesAdapter {
        KucoinFuturesAdapter::with_transport(
            "key",
            "secret",
            "pass",
            DEFAULT_FUTURES_BASE_URL,
            transport,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn spot_market_buy_uses_funds_when_quote_denominated() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"code": "200000", "data": {"orderId": "ku-1"}}));
        let ku = spot(transport.clone());

        let mut req = MarketOrderRequest::new("BTC/USDT", Side::Buy, dec!(100));
        req.quote_funds = true;
        let result = ku.place_market_order(req).await.unwrap();
        assert_eq!(result.order_id, "ku-1");

        let body: Value =
            serde_json::from_str(transport.last_request().body.as_deref().unwrap()).unwrap();
        assert_eq!(body["funds"], "100");
        assert!(body.get("size").is_none());
        assert_eq!(body["symbol"], "BTC-USDT");
    }

    #[tokio::test]
    async fn spot_market_sell_always_uses_base_size() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"code": "200000", "data": {"orderId": "ku-2"}}));
        let ku = spot(transport.clone());

        let mut req = MarketOrderRequest::new("BTC/USDT", Side::Sell, dec!(0.5));
        req.quote_funds = true;
        ku.place_market_order(req).await.unwrap();

        let body: Value =
            serde_json::from_str(transport.last_request().body.as_deref().unwrap()).unwrap();
        assert_eq!(body["size"], "0.5");
        assert!(body.get("funds").is_none());
    }

    #[tokio::test]
    async fn non_success_code_in_http_200_is_a_remote_error() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"code": "400100", "msg": "Invalid order size"}));
        let ku = spot(transport);

        let err = ku
            .place_market_order(MarketOrderRequest::new("BTC/USDT", Side::Sell, dec!(1)))
            .await
            .unwrap_err();
        match err {
            ExchangeError::Remote { exchange, body, .. } => {
                assert_eq!(exchange, "kucoin");
                assert!(body.contains("Invalid order size"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn futures_size_is_floored_contract_count() {
        let transport = Arc::new(MockTransport::new());
        // First call fetches contract metadata, second submits the order.
        transport.push_json(
            200,
            json!({"code": "200000", "data": [
                {"symbol": "XBTUSDTM", "multiplier": "0.001"},
                {"symbol": "ETHUSDTM", "multiplier": "0.01"},
            ]}),
        );
        transport.push_json(200, json!({"code": "200000", "data": {"orderId": "kf-1"}}));
        let ku = futures(transport.clone());

        ku.place_market_order(MarketOrderRequest::new("BTC/USDT", Side::Buy, dec!(0.0047)))
            .await
            .unwrap();

        let body: Value =
            serde_json::from_str(transport.last_request().body.as_deref().unwrap()).unwrap();
        // 0.0047 / 0.001 floors to 4 contracts.
        assert_eq!(body["size"], 4);
        assert_eq!(body["symbol"], "XBTUSDTM");
    }

    #[tokio::test]
    async fn futures_contract_metadata_is_cached_across_orders() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            200,
            json!({"code": "200000", "data": [{"symbol": "XBTUSDTM", "multiplier": "0.001"}]}),
        );
        transport.push_json(200, json!({"code": "200000", "data": {"orderId": "a"}}));
        transport.push_json(200, json!({"code": "200000", "data": {"orderId": "b"}}));
        let ku = futures(transport.clone());

        ku.place_market_order(MarketOrderRequest::new("BTC/USDT", Side::Buy, dec!(0.01)))
            .await
            .unwrap();
        ku.place_market_order(MarketOrderRequest::new("BTC/USDT", Side::Buy, dec!(0.02)))
            .await
            .unwrap();

        // Three requests total: one metadata fetch, two order submissions.
        assert_eq!(transport.requests.lock().len(), 3);
    }

    #[tokio::test]
    async fn futures_dust_size_is_rejected_not_zeroed() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            200,
            json!({"code": "200000", "data": [{"symbol": "XBTUSDTM", "multiplier": "0.001"}]}),
        );
        let ku = futures(transport.clone());

        let err = ku
            .place_market_order(MarketOrderRequest::new("BTC/USDT", Side::Buy, dec!(0.0004)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Validation(_)));
        // Metadata fetch happened, but no order was submitted.
        assert_eq!(transport.requests.lock().len(), 1);
    }

    #[test]
    fn spot_fill_synthesizes_status_from_is_active() {
        let record = json!({"code": "200000", "data": {
            "isActive": false, "dealSize": "0.5", "dealFunds": "21500"
        }});
        let outcome = KucoinSpotAdapter::parse_fill(&record);
        assert_eq!(outcome.status, "done");
        assert_eq!(outcome.filled, dec!(0.5));
        assert_eq!(outcome.avg_price, dec!(43000));
    }

    #[test]
    fn futures_fill_scales_contracts_by_multiplier() {
        let record = json!({"code": "200000", "data": {
            "status": "done", "dealSize": "40", "dealValue": "1720", "symbol": "XBTUSDTM"
        }});
        let outcome = KucoinFuturesAdapter::parse_fill(&record, dec!(0.001));
        // 40 contracts x 0.001 = 0.04 base; 1720 / 0.04 = 43000.
        assert_eq!(outcome.filled, dec!(0.04));
        assert_eq!(outcome.avg_price, dec!(43000));
        assert_eq!(outcome.confidence, FillConfidence::Exact);
    }
}
