use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::contracts::{base_to_contracts, ContractCache, ContractMetadata};
use crate::fill::{poll_for_fill, FillConfidence, FillOutcome, PollOptions};
use crate::model::{
    LimitOrderRequest, MarketKind, MarketOrderRequest, OrderRef, OrderResult, Side, SizeMode,
    VenueCapabilities,
};
use crate::signing::gate::GateSigner;
use crate::signing::{MonotonicNonce, RequestSigner, SignInput};
use crate::symbols::to_gate_pair;
use crate::transport::{HttpRequest, HttpTransport, Method, ReqwestTransport};
use crate::venue::adapter::{check_price, check_size, decimal_from, id_from, ExchangeAdapter, ExchangeError};

pub const DEFAULT_BASE_URL: &str = "https://api.gateio.ws";

const SPOT_TERMINAL_STATUSES: &[&str] = &["closed", "cancelled", "canceled"];
const FUTURES_TERMINAL_STATUSES: &[&str] = &["finished", "cancelled", "canceled"];

/// Shared apiv4 request plumbing for the spot and USDT-futures surfaces.
struct GateRest {
    exchange: &'static str,
    signer: GateSigner,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    nonce: MonotonicNonce,
}

impl GateRest {
    fn new(
        exchange: &'static str,
        api_key: &str,
        secret_key: &str,
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ExchangeError> {
        Ok(Self {
            exchange,
            signer: GateSigner::new(api_key, secret_key)?,
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
        let timestamp = self.nonce.next_seconds().to_string();
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
}

pub struct GateSpotAdapter {
    rest: GateRest,
}

impl GateSpotAdapter {
    pub fn new(api_key: &str, secret_key: &str, base_url: &str) -> Result<Self, ExchangeError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(api_key, secret_key, base_url, transport)
    }

    pub fn with_transport(
        api_key: &str,
        secret_key: &str,
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ExchangeError> {
        Ok(Self {
            rest: GateRest::new("gate", api_key, secret_key, base_url, transport)?,
        })
    }

    fn order_body(
        symbol: &str,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
        client_order_id: Option<&str>,
    ) -> Value {
        let mut body = Map::new();
        body.insert(
            "currency_pair".to_string(),
            Value::String(to_gate_pair(symbol)),
        );
        body.insert("side".to_string(), Value::String(side.as_str().into()));
        if let Some(px) = price {
            body.insert("type".to_string(), Value::String("limit".into()));
            body.insert("price".to_string(), Value::String(px.to_string()));
            body.insert("time_in_force".to_string(), Value::String("gtc".into()));
        } else {
            body.insert("type".to_string(), Value::String("market".into()));
        }
        body.insert("amount".to_string(), Value::String(quantity.to_string()));
        if let Some(cid) = client_order_id {
            body.insert("text".to_string(), Value::String(cid.to_string()));
        }
        Value::Object(body)
    }

    fn parse_fill(record: &Value) -> FillOutcome {
        let status = record
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let filled = record.get("filled_amount").and_then(decimal_from);
        let filled_total = record.get("filled_total").and_then(decimal_from);

        match filled {
            Some(filled) => {
                let avg_price = match filled_total {
                    Some(total) if filled > Decimal::ZERO && total > Decimal::ZERO => {
                        total / filled
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
            .signed(Method::Get, "/api/v4/spot/accounts", Vec::new(), None)
            .await
    }
}

#[async_trait]
impl ExchangeAdapter for GateSpotAdapter {
    fn name(&self) -> &'static str {
        "gate"
    }

    fn capabilities(&self) -> VenueCapabilities {
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

    async fn ping(&self) -> bool {
        self.rest.public("/api/v4/spot/time").await.is_ok()
    }

    async fn place_market_order(
        &self,
        order: MarketOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        let body = Self::order_body(
            &order.symbol,
            order.side,
            order.quantity,
            None,
            order.client_order_id.as_deref(),
        );
        let raw = self
            .rest
            .signed(Method::Post, "/api/v4/spot/orders", Vec::new(), Some(body))
            .await?;
        let order_id = raw.get("id").map(id_from).unwrap_or_default();
        Ok(OrderResult::acknowledged("gate", order_id, raw))
    }

    async fn place_limit_order(
        &self,
        order: LimitOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        check_price(order.price)?;
        let body = Self::order_body(
            &order.symbol,
            order.side,
            order.quantity,
            Some(order.price),
            order.client_order_id.as_deref(),
        );
        let raw = self
            .rest
            .signed(Method::Post, "/api/v4/spot/orders", Vec::new(), Some(body))
            .await?;
        let order_id = raw.get("id").map(id_from).unwrap_or_default();
        Ok(OrderResult::acknowledged("gate", order_id, raw))
    }

    async fn cancel_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let id = order.order_id.ok_or_else(|| {
            ExchangeError::Validation("gate spot cancel_order requires order_id".into())
        })?;
        self.rest
            .signed(Method::Delete, &format!("/api/v4/spot/orders/{id}"), Vec::new(), None)
            .await
    }

    async fn get_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let id = order.order_id.ok_or_else(|| {
            ExchangeError::Validation("gate spot get_order requires order_id".into())
        })?;
        self.rest
            .signed(Method::Get, &format!("/api/v4/spot/orders/{id}"), Vec::new(), None)
            .await
    }

    async fn wait_for_fill(
        &self,
        order: OrderRef<'_>,
        opts: PollOptions,
    ) -> Result<FillOutcome, ExchangeError> {
        if order.order_id.is_none() {
            return Err(ExchangeError::Validation(
                "gate spot wait_for_fill requires order_id".into(),
            ));
        }
        let outcome = poll_for_fill(&opts, SPOT_TERMINAL_STATUSES, || async move {
            let record = self.get_order(order).await?;
            Ok(Self::parse_fill(&record))
        })
        .await;
        Ok(outcome)
    }
}

/// Gate USDT-futures adapter. Size is a signed integer contract count: the
/// sign carries the side, and the count comes from flooring base quantity by
/// the contract's quanto multiplier (cached with a TTL).
pub struct GateFuturesAdapter {
    rest: GateRest,
    contracts: ContractCache,
}

impl GateFuturesAdapter {
    pub fn new(api_key: &str, secret_key: &str, base_url: &str) -> Result<Self, ExchangeError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(api_key, secret_key, base_url, transport)
    }

    pub fn with_transport(
        api_key: &str,
        secret_key: &str,
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ExchangeError> {
        Ok(Self {
            rest: GateRest::new("gatefutures", api_key, secret_key, base_url, transport)?,
            contracts: ContractCache::new(),
        })
    }

    /// Quanto multiplier for one contract, cache-first; degrades to 1 when
    /// the metadata is unavailable or unusable.
    async fn contract_multiplier(&self, contract: &str) -> Decimal {
        if let Some(meta) = self.contracts.get(contract) {
            return meta.multiplier;
        }
        let path = format!("/api/v4/futures/usdt/contracts/{contract}");
        let multiplier = match self.rest.public(&path).await {
            Ok(raw) => raw
                .get("quanto_multiplier")
                .and_then(decimal_from)
                .or_else(|| raw.get("contract_size").and_then(decimal_from))
                .filter(|m| *m > Decimal::ZERO),
            Err(err) => {
                tracing::debug!(error = %err, contract, "contract metadata fetch failed");
                None
            }
        };
        let multiplier = multiplier.unwrap_or(Decimal::ONE);
        self.contracts
            .store(contract, ContractMetadata { multiplier });
        multiplier
    }

    fn signed_contracts(side: Side, contracts: i64) -> i64 {
        match side {
            Side::Buy => contracts,
            Side::Sell => -contracts,
        }
    }

    fn parse_fill(record: &Value, multiplier: Decimal) -> FillOutcome {
        let status = record
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        // filled_size is in contracts, sign carrying the side.
        let filled_contracts = record
            .get("filled_size")
            .or_else(|| record.get("filledSize"))
            .and_then(decimal_from);
        let avg_price = record
            .get("fill_price")
            .or_else(|| record.get("fillPrice"))
            .or_else(|| record.get("price"))
            .and_then(decimal_from)
            .unwrap_or(Decimal::ZERO);

        match filled_contracts {
            Some(contracts) => FillOutcome {
                filled: contracts.abs() * multiplier,
                avg_price,
                status,
                confidence: FillConfidence::Exact,
                order: record.clone(),
            },
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
        let contract = to_gate_pair(symbol);
        let path = format!("/api/v4/futures/usdt/positions/{contract}/leverage");
        let body = json!({ "leverage": leverage.max(1).to_string() });
        match self.rest.signed(Method::Post, &path, Vec::new(), Some(body)).await {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, contract, "gatefutures set_leverage failed");
                false
            }
        }
    }

    /// Private read used to validate credentials.
    pub async fn get_accounts(&self) -> Result<Value, ExchangeError> {
        self.rest
            .signed(Method::Get, "/api/v4/futures/usdt/accounts", Vec::new(), None)
            .await
    }

    pub async fn get_positions(&self) -> Result<Value, ExchangeError> {
        self.rest
            .signed(Method::Get, "/api/v4/futures/usdt/positions", Vec::new(), None)
            .await
    }
}

#[async_trait]
impl ExchangeAdapter for GateFuturesAdapter {
    fn name(&self) -> &'static str {
        "gatefutures"
    }

    fn capabilities(&self) -> VenueCapabilities {
        VenueCapabilities {
            market: MarketKind::Swap,
            size_mode: SizeMode::Contracts,
            reduce_only: true,
            position_side: false,
            post_only: false,
            cancel_by_client_id: false,
            query_by_client_id: false,
        }
    }

    async fn ping(&self) -> bool {
        self.rest.public("/api/v4/futures/usdt/time").await.is_ok()
    }

    async fn place_market_order(
        &self,
        order: MarketOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        let contract = to_gate_pair(&order.symbol);
        let multiplier = self.contract_multiplier(&contract).await;
        let contracts = base_to_contracts(order.quantity, multiplier)?;

        let mut body = Map::new();
        body.insert("contract".to_string(), Value::String(contract));
        body.insert(
            "size".to_string(),
            json!(Self::signed_contracts(order.side, contracts)),
        );
        // Market orders are price 0 with immediate-or-cancel.
        body.insert("price".to_string(), Value::String("0".into()));
        body.insert("tif".to_string(), Value::String("ioc".into()));
        if order.reduce_only {
            body.insert("reduce_only".to_string(), Value::Bool(true));
        }
        if let Some(cid) = order.client_order_id.as_deref() {
            body.insert("text".to_string(), Value::String(cid.to_string()));
        }

        let raw = self
            .rest
            .signed(
                Method::Post,
                "/api/v4/futures/usdt/orders",
                Vec::new(),
                Some(Value::Object(body)),
            )
            .await?;
        let order_id = raw.get("id").map(id_from).unwrap_or_default();
        Ok(OrderResult::acknowledged("gatefutures", order_id, raw))
    }

    async fn place_limit_order(
        &self,
        order: LimitOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        check_price(order.price)?;
        let contract = to_gate_pair(&order.symbol);
        let multiplier = self.contract_multiplier(&contract).await;
        let contracts = base_to_contracts(order.quantity, multiplier)?;

        let mut body = Map::new();
        body.insert("contract".to_string(), Value::String(contract));
        body.insert(
            "size".to_string(),
            json!(Self::signed_contracts(order.side, contracts)),
        );
        body.insert("price".to_string(), Value::String(order.price.to_string()));
        body.insert("tif".to_string(), Value::String("gtc".into()));
        if order.reduce_only {
            body.insert("reduce_only".to_string(), Value::Bool(true));
        }
        if let Some(cid) = order.client_order_id.as_deref() {
            body.insert("text".to_string(), Value::String(cid.to_string()));
        }

        let raw = self
            .rest
            .signed(
                Method::Post,
                "/api/v4/futures/usdt/orders",
                Vec::new(),
                Some(Value::Object(body)),
            )
            .await?;
        let order_id = raw.get("id").map(id_from).unwrap_or_default();
        Ok(OrderResult::acknowledged("gatefutures", order_id, raw))
    }

    async fn cancel_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let id = order.order_id.ok_or_else(|| {
            ExchangeError::Validation("gate futures cancel_order requires order_id".into())
        })?;
        self.rest
            .signed(
                Method::Delete,
                &format!("/api/v4/futures/usdt/orders/{id}"),
                Vec::new(),
                None,
            )
            .await
    }

    async fn get_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let id = order.order_id.ok_or_else(|| {
            ExchangeError::Validation("gate futures get_order requires order_id".into())
        })?;
        self.rest
            .signed(
                Method::Get,
                &format!("/api/v4/futures/usdt/orders/{id}"),
                Vec::new(),
                None,
            )
            .await
    }

    async fn wait_for_fill(
        &self,
        order: OrderRef<'_>,
        opts: PollOptions,
    ) -> Result<FillOutcome, ExchangeError> {
        if order.order_id.is_none() {
            return Err(ExchangeError::Validation(
                "gate futures wait_for_fill requires order_id".into(),
            ));
        }
        let outcome = poll_for_fill(&opts, FUTURES_TERMINAL_STATUSES, || async move {
            let record = self.get_order(order).await?;
            // The record names its own contract; use it for the multiplier.
            let contract = record
                .get("contract")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let multiplier = if contract.is_empty() {
                Decimal::ONE
            } else {
                self.contract_multiplier(&contract).await
            };
            Ok(Self::parse_fill(&record, multiplier))
        })
        .await;
        Ok(outcome)
    }
}
