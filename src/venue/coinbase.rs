use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::fill::{poll_for_fill, FillConfidence, FillOutcome, PollOptions};
use crate::model::{
    LimitOrderRequest, MarketKind, MarketOrderRequest, OrderRef, OrderResult, SizeMode,
    VenueCapabilities,
};
use crate::signing::coinbase::CoinbaseSigner;
use crate::signing::{MonotonicNonce, RequestSigner, SignInput};
use crate::symbols::to_coinbase_product;
use crate::transport::{HttpRequest, HttpTransport, Method, ReqwestTransport};
use crate::venue::adapter::{check_price, check_size, decimal_from, ExchangeAdapter, ExchangeError};

pub const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";

const TERMINAL_STATUSES: &[&str] = &["done", "rejected", "canceled", "cancelled"];

/// Coinbase Exchange (legacy) spot adapter. No derivatives surface exists on
/// this API; the factory rejects swap requests for it.
pub struct CoinbaseAdapter {
    signer: CoinbaseSigner,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    nonce: MonotonicNonce,
}

impl CoinbaseAdapter {
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
            signer: CoinbaseSigner::new(api_key, secret_key, passphrase)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            nonce: MonotonicNonce::new(),
        })
    }

    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ExchangeError> {
        let timestamp = self.nonce.next_seconds().to_string();
        let body_str = body.as_ref().map(Value::to_string).unwrap_or_default();
        let mut headers = self.signer.sign(&SignInput {
            method: method.as_str(),
            path,
            query: "",
            body: &body_str,
            nonce: &timestamp,
        })?;
        headers.push(("Content-Type", "application/json".to_string()));

        let response = self
            .transport
            .send(HttpRequest {
                method,
                url: format!("{}{}", self.base_url, path),
                headers: headers
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value.to_string()))
                    .collect(),
                body: (!body_str.is_empty()).then_some(body_str),
            })
            .await?;

        if response.status >= 400 {
            return Err(ExchangeError::remote(
                "coinbaseexchange",
                response.status,
                &response.text,
            ));
        }
        Ok(response.body)
    }

    fn order_path(order: &OrderRef<'_>) -> Result<String, ExchangeError> {
        if let Some(id) = order.order_id {
            return Ok(format!("/orders/{id}"));
        }
        if let Some(cid) = order.client_order_id {
            return Ok(format!("/orders/client:{cid}"));
        }
        Err(ExchangeError::Validation(
            "coinbaseexchange requires order_id or client_order_id".into(),
        ))
    }

    fn order_body(
        symbol: &str,
        side: &str,
        quantity: Decimal,
        price: Option<Decimal>,
        client_order_id: Option<&str>,
    ) -> Value {
        let mut body = Map::new();
        body.insert(
            "product_id".to_string(),
            Value::String(to_coinbase_product(symbol)),
        );
        body.insert("side".to_string(), Value::String(side.to_string()));
        if let Some(px) = price {
            body.insert("type".to_string(), Value::String("limit".into()));
            body.insert("price".to_string(), Value::String(px.to_string()));
            body.insert("time_in_force".to_string(), Value::String("GTC".into()));
        } else {
            body.insert("type".to_string(), Value::String("market".into()));
        }
        body.insert("size".to_string(), Value::String(quantity.to_string()));
        if let Some(cid) = client_order_id {
            body.insert("client_oid".to_string(), Value::String(cid.to_string()));
        }
        Value::Object(body)
    }

    fn extract_order_id(raw: &Value) -> String {
        for key in ["id", "order_id", "client_oid"] {
            if let Some(id) = raw.get(key).and_then(Value::as_str) {
                if !id.is_empty() {
                    return id.to_string();
                }
            }
        }
        String::new()
    }

    fn parse_fill(record: &Value) -> FillOutcome {
        let status = record
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let filled = record.get("filled_size").and_then(decimal_from);
        let executed_value = record.get("executed_value").and_then(decimal_from);

        match filled {
            Some(filled) => {
                let avg_price = match executed_value {
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

    /// Private read used to validate credentials.
    pub async fn get_accounts(&self) -> Result<Value, ExchangeError> {
        self.signed_request(Method::Get, "/accounts", None).await
    }
}

#[async_trait]
impl ExchangeAdapter for CoinbaseAdapter {
    fn name(&self) -> &'static str {
        "coinbaseexchange"
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
        let request = HttpRequest {
            method: Method::Get,
            url: format!("{}/time", self.base_url),
            headers: Vec::new(),
            body: None,
        };
        matches!(self.transport.send(request).await, Ok(resp) if resp.status < 400)
    }

    async fn place_market_order(
        &self,
        order: MarketOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        let body = Self::order_body(
            &order.symbol,
            order.side.as_str(),
            order.quantity,
            None,
            order.client_order_id.as_deref(),
        );
        let raw = self.signed_request(Method::Post, "/orders", Some(body)).await?;
        let order_id = Self::extract_order_id(&raw);
        Ok(OrderResult::acknowledged("coinbaseexchange", order_id, raw))
    }

    async fn place_limit_order(
        &self,
        order: LimitOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        check_price(order.price)?;
        let body = Self::order_body(
            &order.symbol,
            order.side.as_str(),
            order.quantity,
            Some(order.price),
            order.client_order_id.as_deref(),
        );
        let raw = self.signed_request(Method::Post, "/orders", Some(body)).await?;
        let order_id = Self::extract_order_id(&raw);
        Ok(OrderResult::acknowledged("coinbaseexchange", order_id, raw))
    }

    async fn cancel_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let path = Self::order_path(&order)?;
        self.signed_request(Method::Delete, &path, None).await
    }

    async fn get_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let path = Self::order_path(&order)?;
        self.signed_request(Method::Get, &path, None).await
    }

    async fn wait_for_fill(
        &self,
        order: OrderRef<'_>,
        opts: PollOptions,
    ) -> Result<FillOutcome, ExchangeError> {
        order.require_any("coinbaseexchange")?;
        let outcome = poll_for_fill(&opts, TERMINAL_STATUSES, || async move {
            let record = self.get_order(order).await?;
            Ok(Self::parse_fill(&record))
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
    use serde_json::json;

    const SECRET_B64: &str = "Y29pbmJhc2UtcmF3LXNlY3JldC0wMTIzNDU2Nzg5YWI=";

    fn adapter(transport: Arc<MockTransport>) -> CoinbaseAdapter {
        CoinbaseAdapter::with_transport("key", SECRET_B64, "pass", DEFAULT_BASE_URL, transport)
            .unwrap()
    }

    #[tokio::test]
    async fn market_order_sends_base_size_and_auth_headers() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"id": "ord-1", "status": "pending"}));
        let cb = adapter(transport.clone());

        let result = cb
            .place_market_order(MarketOrderRequest::new("BTC/USDT", Side::Buy, dec!(0.5)))
            .await
            .unwrap();
        assert_eq!(result.order_id, "ord-1");
        assert_eq!(result.filled, Decimal::ZERO);

        let sent = transport.last_request();
        let body: Value = serde_json::from_str(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["product_id"], "BTC-USDT");
        assert_eq!(body["size"], "0.5");
        assert_eq!(body["type"], "market");
        let names: Vec<&str> = sent.headers.iter().map(|(n, _)| n.as_str()).collect();
        for required in ["CB-ACCESS-KEY", "CB-ACCESS-SIGN", "CB-ACCESS-TIMESTAMP", "CB-ACCESS-PASSPHRASE"] {
            assert!(names.contains(&required), "missing header {required}");
        }
    }

    #[tokio::test]
    async fn remote_error_carries_status_and_body() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(400, json!({"message": "Insufficient funds"}));
        let cb = adapter(transport);

        let err = cb
            .place_market_order(MarketOrderRequest::new("BTC/USDT", Side::Buy, dec!(1)))
            .await
            .unwrap_err();
        match err {
            ExchangeError::Remote { exchange, status, body } => {
                assert_eq!(exchange, "coinbaseexchange");
                assert_eq!(status, 400);
                assert!(body.contains("Insufficient funds"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wait_for_fill_derives_avg_price_from_executed_value() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            200,
            json!({"status": "open", "filled_size": "0", "executed_value": "0"}),
        );
        transport.push_json(
            200,
            json!({"status": "done", "filled_size": "0.5", "executed_value": "21500"}),
        );
        let cb = adapter(transport);

        let opts = PollOptions {
            max_wait: std::time::Duration::from_secs(5),
            poll_interval: std::time::Duration::from_millis(1),
            return_on_partial: true,
        };
        let outcome = cb
            .wait_for_fill(OrderRef::by_id("ord-1"), opts)
            .await
            .unwrap();
        assert_eq!(outcome.filled, dec!(0.5));
        assert_eq!(outcome.avg_price, dec!(43000));
        assert_eq!(outcome.confidence, FillConfidence::Exact);
    }

    #[tokio::test]
    async fn cancel_by_client_id_uses_the_client_path() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!("ord-1"));
        let cb = adapter(transport.clone());

        cb.cancel_order(OrderRef::by_client_id("my-oid")).await.unwrap();
        assert!(transport.last_request().url.ends_with("/orders/client:my-oid"));
    }
}
