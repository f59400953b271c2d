use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

use crate::fill::{poll_for_fill, FillConfidence, FillOutcome, PollOptions};
use crate::model::{
    LimitOrderRequest, MarketKind, MarketOrderRequest, OrderRef, OrderResult, SizeMode,
    VenueCapabilities,
};
use crate::signing::kraken::KrakenFuturesSigner;
use crate::signing::{MonotonicNonce, RequestSigner, SignInput};
use crate::symbols::to_kraken_futures;
use crate::transport::{HttpRequest, HttpTransport, Method, ReqwestTransport};
use crate::venue::adapter::{check_price, check_size, decimal_from, ExchangeAdapter, ExchangeError};

pub const DEFAULT_BASE_URL: &str = "https://futures.kraken.com";

const TERMINAL_STATUSES: &[&str] = &["filled", "cancelled", "canceled", "rejected"];

/// Kraken Futures adapter (the former CryptoFacilities API, distinct from
/// Kraken spot). Order size is already contract-denominated on this venue and
/// is sent as given; there is no metadata-derived conversion.
pub struct KrakenFuturesAdapter {
    signer: KrakenFuturesSigner,
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    nonce: MonotonicNonce,
}

impl KrakenFuturesAdapter {
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
            signer: KrakenFuturesSigner::new(api_key, secret_key)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            nonce: MonotonicNonce::new(),
        })
    }

    async fn signed_request(
        &self,
        method: Method,
        path: &str,
        params: Vec<(&str, String)>,
    ) -> Result<Value, ExchangeError> {
        let nonce = self.nonce.next_millis().to_string();
        let postdata = if params.is_empty() {
            String::new()
        } else {
            serde_urlencoded::to_string(&params)
                .map_err(|e| ExchangeError::Parse(format!("urlencode error: {e}")))?
        };

        let mut headers = self.signer.sign(&SignInput {
            method: method.as_str(),
            path,
            query: "",
            body: &postdata,
            nonce: &nonce,
        })?;
        headers.push(("Content-Type", "application/x-www-form-urlencoded".to_string()));

        // POSTs carry the form body; GETs carry the same string as the query.
        let (url, body) = match method {
            Method::Get if !postdata.is_empty() => {
                (format!("{}{}?{}", self.base_url, path, postdata), None)
            }
            _ => (
                format!("{}{}", self.base_url, path),
                (!postdata.is_empty()).then_some(postdata),
            ),
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
                body,
            })
            .await?;

        if response.status >= 400 {
            return Err(ExchangeError::remote("krakenfutures", response.status, &response.text));
        }

        // The envelope reports failures as result == "error" or an errors list.
        let is_error = response.body.get("result").and_then(Value::as_str) == Some("error")
            || response
                .body
                .get("errors")
                .and_then(Value::as_array)
                .map(|errors| !errors.is_empty())
                .unwrap_or(false);
        if is_error {
            return Err(ExchangeError::remote("krakenfutures", response.status, &response.text));
        }
        Ok(response.body)
    }

    fn order_params(order: &OrderRef<'_>) -> Result<Vec<(&'static str, String)>, ExchangeError> {
        if let Some(id) = order.order_id {
            return Ok(vec![("order_id", id.to_string())]);
        }
        if let Some(cid) = order.client_order_id {
            return Ok(vec![("cliOrdId", cid.to_string())]);
        }
        Err(ExchangeError::Validation(
            "krakenfutures requires order_id or client_order_id".into(),
        ))
    }

    fn extract_order_id(raw: &Value) -> String {
        raw.pointer("/sendStatus/order_id")
            .or_else(|| raw.get("order_id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    fn parse_fill(record: &Value) -> FillOutcome {
        // Field spellings vary between endpoint versions.
        let status = record
            .get("status")
            .or_else(|| record.get("orderStatus"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let filled = record
            .get("filledSize")
            .or_else(|| record.get("filled_size"))
            .and_then(decimal_from);
        let avg_price = record
            .get("avgFillPrice")
            .or_else(|| record.get("avg_fill_price"))
            .and_then(decimal_from);

        match filled {
            Some(filled) => FillOutcome {
                filled,
                avg_price: avg_price.unwrap_or(Decimal::ZERO),
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

    /// Private read used to validate credentials.
    pub async fn get_accounts(&self) -> Result<Value, ExchangeError> {
        self.signed_request(Method::Get, "/derivatives/api/v3/accounts", Vec::new())
            .await
    }

    pub async fn get_open_positions(&self) -> Result<Value, ExchangeError> {
        self.signed_request(Method::Get, "/derivatives/api/v3/openpositions", Vec::new())
            .await
    }
}

#[async_trait]
impl ExchangeAdapter for KrakenFuturesAdapter {
    fn name(&self) -> &'static str {
        "krakenfutures"
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
        let request = HttpRequest {
            method: Method::Get,
            url: format!("{}/derivatives/api/v3/tickers", self.base_url),
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
        let mut params = vec![
            ("orderType", "mkt".to_string()),
            ("symbol", to_kraken_futures(&order.symbol)),
            ("side", order.side.as_str().to_string()),
            ("size", order.quantity.to_string()),
        ];
        if order.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        if let Some(cid) = order.client_order_id.as_deref() {
            params.push(("cliOrdId", cid.chars().take(32).collect()));
        }
        let raw = self
            .signed_request(Method::Post, "/derivatives/api/v3/sendorder", params)
            .await?;
        let order_id = Self::extract_order_id(&raw);
        Ok(OrderResult::acknowledged("krakenfutures", order_id, raw))
    }

    async fn place_limit_order(
        &self,
        order: LimitOrderRequest,
    ) -> Result<OrderResult, ExchangeError> {
        check_size(order.quantity)?;
        check_price(order.price)?;
        let mut params = vec![
            ("orderType", "lmt".to_string()),
            ("symbol", to_kraken_futures(&order.symbol)),
            ("side", order.side.as_str().to_string()),
            ("size", order.quantity.to_string()),
            ("limitPrice", order.price.to_string()),
        ];
        if order.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        if order.post_only {
            params.push(("postOnly", "true".to_string()));
        }
        if let Some(cid) = order.client_order_id.as_deref() {
            params.push(("cliOrdId", cid.chars().take(32).collect()));
        }
        let raw = self
            .signed_request(Method::Post, "/derivatives/api/v3/sendorder", params)
            .await?;
        let order_id = Self::extract_order_id(&raw);
        Ok(OrderResult::acknowledged("krakenfutures", order_id, raw))
    }

    async fn cancel_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let params = Self::order_params(&order)?;
        self.signed_request(Method::Post, "/derivatives/api/v3/cancelorder", params)
            .await
    }

    async fn get_order(&self, order: OrderRef<'_>) -> Result<Value, ExchangeError> {
        let params = Self::order_params(&order)?;
        self.signed_request(Method::Get, "/derivatives/api/v3/order", params)
            .await
    }

    async fn wait_for_fill(
        &self,
        order: OrderRef<'_>,
        opts: PollOptions,
    ) -> Result<FillOutcome, ExchangeError> {
        order.require_any("krakenfutures")?;
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

    fn adapter(transport: Arc<MockTransport>) -> KrakenFuturesAdapter {
        KrakenFuturesAdapter::with_transport("key", "secret", DEFAULT_BASE_URL, transport).unwrap()
    }

    #[tokio::test]
    async fn market_order_sends_contract_size_and_reduce_only() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            200,
            json!({"result": "success", "sendStatus": {"order_id": "kf-1"}}),
        );
        let kf = adapter(transport.clone());

        let mut req = MarketOrderRequest::new("BTC/USDT", Side::Sell, dec!(3));
        req.reduce_only = true;
        let result = kf.place_market_order(req).await.unwrap();
        assert_eq!(result.order_id, "kf-1");

        let body = transport.last_request().body.unwrap();
        assert!(body.contains("symbol=PF_XBTUSD"));
        assert!(body.contains("orderType=mkt"));
        assert!(body.contains("size=3"));
        assert!(body.contains("reduceOnly=true"));
    }

    #[tokio::test]
    async fn error_envelope_is_a_remote_error() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(
            200,
            json!({"result": "error", "error": "invalidArgument"}),
        );
        let kf = adapter(transport);

        let err = kf
            .place_market_order(MarketOrderRequest::new("BTC/USDT", Side::Buy, dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Remote { exchange: "krakenfutures", .. }));
    }

    #[tokio::test]
    async fn get_order_by_client_id_goes_through_the_query_string() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"result": "success", "status": "untouched"}));
        let kf = adapter(transport.clone());

        kf.get_order(OrderRef::by_client_id("my-order")).await.unwrap();
        let sent = transport.last_request();
        assert!(sent.url.contains("cliOrdId=my-order"));
        assert!(sent.body.is_none());
    }

    #[test]
    fn fill_parsing_accepts_both_field_spellings() {
        let camel = json!({"status": "filled", "filledSize": "3", "avgFillPrice": "43000"});
        let snake = json!({"orderStatus": "filled", "filled_size": 3.0, "avg_fill_price": 43000.0});
        for record in [camel, snake] {
            let outcome = KrakenFuturesAdapter::parse_fill(&record);
            assert_eq!(outcome.filled, dec!(3));
            assert_eq!(outcome.avg_price, dec!(43000));
            assert_eq!(outcome.confidence, FillConfidence::Exact);
        }
    }

    #[tokio::test]
    async fn client_order_id_truncates_to_32_chars() {
        let transport = Arc::new(MockTransport::new());
        transport.push_json(200, json!({"result": "success", "sendStatus": {}}));
        let kf = adapter(transport.clone());

        let mut req = MarketOrderRequest::new("BTC/USDT", Side::Buy, dec!(1));
        req.client_order_id = Some("c".repeat(50));
        kf.place_market_order(req).await.unwrap();

        let body = transport.last_request().body.unwrap();
        let sent_cid = body
            .split('&')
            .find_map(|kv| kv.strip_prefix("cliOrdId="))
            .unwrap()
            .to_string();
        assert_eq!(sent_cid.len(), 32);
    }
}
