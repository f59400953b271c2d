use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

use crate::fill::{poll_for_fill, FillConfidence, FillOutcome, PollOptions};
use crate::model::{
    LimitOrderRequest, MarketKind, MarketOrderRequest, OrderRef, OrderResult, SizeMode,
    VenueCapabilities,
};
use crate::signing::kraken::KrakenSigner;
use crate::signing::{MonotonicNonce, RequestSigner, SignInput};
use crate::symbols::to_kraken_pair;
use crate::transport::{HttpRequest, HttpTransport, Method, ReqwestTransport};
use crate::venue::adapter::{
    check_price, check_size, decimal_from, numeric_client_id, ExchangeAdapter, ExchangeError,
};

pub const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

const TERMINAL_STATUSES: &[&str] = &["closed", "canceled", "cancelled", "expired"];

/// Kraken spot adapter. Private endpoints are form-encoded POSTs carrying the
/// nonce inside the body; errors come back inside an HTTP-200 envelope.
pub struct KrakenAdapter {
    signer: KrakenSigner,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    nonce: MonotonicNonce,
}

impl KrakenAdapter {
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
            signer: KrakenSigner::new(api_key, secret_key)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            nonce: MonotonicNonce::new(),
        })
    }

    async fn private_request(
        &self,
        path: &str,
        params: Vec<(&str, String)>,
    ) -> Result<Value, ExchangeError> {
        let nonce = self.nonce.next_millis().to_string();
        let mut body_params = params;
        body_params.push(("nonce", nonce.clone()));
        let postdata = serde_urlencoded::to_string(&body_params)
            .map_err(|e| ExchangeError::Parse(format!("urlencode error: {e}")))?;

        let mut headers = self.signer.sign(&SignInput {
            method: "POST",
            path,
            query: "",
            body: &postdata,
            nonce: &nonce,
        })?;
        headers.push(("Content-Type", "application/x-www-form-urlencoded".to_string()));

        let response = self
            .transport
            .send(HttpRequest {
                method: Method::Post,
                url: format!("{}{}", self.base_url, path),
                headers: headers
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
                body: Some(postdata),
            })
            .await?;

        if response.status >= 400 {
            return Err(ExchangeError::remote("kraken", response.status, &response.text));
        }

        // Kraken always answers 200; failures live in the "error" array.
        if let Some(errors) = response.body.get("error").and_then(Value::as_array) {
            if !errors.is_empty() {
                let joined = errors
                    .iter()
                    .map(|v| v.as_str().unwrap_or_default())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ExchangeError::remote("kraken", response.status, &joined));
            }
        }
        Ok(response.body)
    }

    fn add_order_params(
        symbol: &str,
        side: &str,
        ordertype: &str,
        volume: Decimal,
        price: Option<Decimal>,
        client_order_id: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("pair", to_kraken_pair(symbol)),
            ("type", side.to_string()),
            ("ordertype", ordertype.to_string()),
            ("volume", volume.to_string()),
        ];
        if let Some(px) = price {
            params.push(("price", px.to_string()));
        }
        // Kraken userref is a signed 32-bit integer; keep a short digits-only
        // projection of the caller's id.
        if let Some(userref) = client_order_id.and_then(|id| numeric_client_id(id, 9)) {
            params.push(("userref", userref.to_string()));
        }
        params
    }

    fn txid_from(raw: &Value) -> String {
        raw.pointer("/result/txid/0")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn parse_fill(record: &Value) -> FillOutcome {
        let status = record
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let filled = record.get("vol_exec").and_then(decimal_from);
        let cost = record.get("cost").and_then(decimal_from);

        match filled {
            Some(filled) => {
                // Kraken reports quote-currency cost; avg = cost / filled.
                let avg_price = match cost {
                    Some(cost) if filled > Decimal::ZERO && cost > Decimal::ZERO => cost / filled,
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

    /// Private balance read used to validate credentials.
    pub async fn get_balance(&self) -> Result<Value, ExchangeError> {
        self.private_request("/0/private/Balance", Vec::new()).await
    }
}

#[async_trait]
impl ExchangeAdapter for KrakenAdapter {
    fn name(&self) -> &'static str {
        "kraken"
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
        let request = HttpRequest {
            method: Method::Get,
            url: format!("{}/0/public/Time", self.base_url),
            headers: Vec::new(),
            body: None,
        };
        match self.transport.send(request).await {
            Ok(resp) => {
                resp.status < 400
                    && resp
                        .body
                        .get("error")
                        .and_then(Value::as_array)
                        .map(Vec::is_empty)
                        .unwrap_or(true)
            }
            Err(_) => false,
        }
    }

    async fn place_market_order(
        &self,
        order: MarketOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        let params = Self::add_order_params(
            &order.symbol,
            order.side.as_str(),
            "market",
            order.quantity,
            None,
            order.client_order_id.as_deref(),
        );
        let raw = self.private_request("/0/private/AddOrder", params).await?;
        let txid = Self::txid_from(&raw);
        Ok(OrderResult::acknowledged("kraken", txid, raw))
    }

    async fn place_limit_order(
        &self,
        order: LimitOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        check_price(order.price)?;
        let params = Self::add_order_params(
            &order.symbol,
            order.side.as_str(),
            "limit",
            order.quantity,
            Some(order.price),
            order.client_order_id.as_deref(),
        );
        let raw = self.private_request("/0/private/AddOrder", params).await?;
        let txid = Self::txid_from(&raw);
        Ok(OrderResult::acknowledged("kraken", txid, raw))
    }

    async fn cancel_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let txid = order.order_id.ok_or_else(|| {
            ExchangeError::Validation("kraken cancel_order requires order_id".into())
        })?;
        self.private_request("/0/private/CancelOrder", vec![("txid", txid.to_string())])
            .await
    }

    async fn get_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let txid = order.order_id.ok_or_else(|| {
            ExchangeError::Validation("kraken get_order requires order_id".into())
        })?;
        let raw = self
            .private_request("/0/private/QueryOrders", vec![("txid", txid.to_string())])
            .await?;
        // The record sits under result keyed by its own txid.
        Ok(raw
            .pointer(&format!("/result/{txid}"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn wait_for_fill(
        &self,
        order: OrderRef<'_>,
        opts: PollOptions,
    ) -> Result<FillOutcome, ExchangeError> {
        if order.order_id.is_none() {
            return Err(ExchangeError::Validation(
                "kraken wait_for_fill requires order_id".into(),
            ));
        }
        let outcome = poll_for_fill(&opts, TERMINAL_STATUSES, || async move {
            let record = self.get_order(order).await?;
            Ok(Self::parse_fill(&record))
        })
        .await;
        Ok(outcome)
    }
}
