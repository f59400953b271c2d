use std::sync::Arc;

use url::Url;

use crate::config::ExchangeConfig;
use crate::model::MarketKind;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::venue::adapter::{ExchangeAdapter, ExchangeError};
use crate::venue::bitfinex::{BitfinexAdapter, BitfinexVariant};
use crate::venue::coinbase::CoinbaseAdapter;
use crate::venue::gate::{GateFuturesAdapter, GateSpotAdapter};
use crate::venue::kraken::KrakenAdapter;
use crate::venue::kraken_futures::KrakenFuturesAdapter;
use crate::venue::kucoin::{KucoinFuturesAdapter, KucoinSpotAdapter};
use crate::venue::{bitfinex, coinbase, gate, kraken, kraken_futures, kucoin};

/// Builds the adapter for an (exchange, market-type) pair. Unknown exchange
/// ids, missing credentials, malformed base URLs, and unsupported market
/// combinations all fail here with a configuration error, before any
/// network access.
pub fn create_adapter(
    exchange_id: &str,
    market_type: &str,
    config: &ExchangeConfig,
) -> Result<Arc<dyn ExchangeAdapter>, ExchangeError> {
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
    create_adapter_with_transport(exchange_id, market_type, config, transport)
}

/// Same construction with the transport injected; the seam tests use.
pub fn create_adapter_with_transport(
    exchange_id: &str,
    market_type: &str,
    config: &ExchangeConfig,
    transport: Arc<dyn HttpTransport>,
) -> Result<Arc<dyn ExchangeAdapter>, ExchangeError> {
    let id = exchange_id.trim().to_ascii_lowercase();
    // A per-call market type wins over the configured default.
    let market = if market_type.trim().is_empty() {
        MarketKind::parse(config.market_type.as_deref().unwrap_or_default())?
    } else {
        MarketKind::parse(market_type)?
    };

    let base_url = |default: &str| -> Result<String, ExchangeError> {
        checked_url(config.base_url.as_deref().unwrap_or(default))
    };
    let futures_url = |default: &str| -> Result<String, ExchangeError> {
        checked_url(config.futures_base_url.as_deref().unwrap_or(default))
    };

    match id.as_str() {
        "bitfinex" => {
            let url = base_url(bitfinex::DEFAULT_BASE_URL)?;
            let variant = match market {
                MarketKind::Spot => BitfinexVariant::Spot,
                MarketKind::Swap => BitfinexVariant::Derivatives,
            };
            Ok(Arc::new(BitfinexAdapter::with_transport(
                config.api_key(),
                config.secret_key(),
                &url,
                variant,
                transport,
            )?))
        }
        "coinbaseexchange" | "coinbase_exchange" | "coinbase" => {
            if market != MarketKind::Spot {
                return Err(ExchangeError::Configuration(
                    "coinbaseexchange only supports the spot market type".into(),
                ));
            }
            let url = base_url(coinbase::DEFAULT_BASE_URL)?;
            Ok(Arc::new(CoinbaseAdapter::with_transport(
                config.api_key(),
                config.secret_key(),
                config.passphrase(),
                &url,
                transport,
            )?))
        }
        "kraken" => match market {
            MarketKind::Spot => {
                let url = base_url(kraken::DEFAULT_BASE_URL)?;
                Ok(Arc::new(KrakenAdapter::with_transport(
                    config.api_key(),
                    config.secret_key(),
                    &url,
                    transport,
                )?))
            }
            MarketKind::Swap => {
                let url = futures_url(kraken_futures::DEFAULT_BASE_URL)?;
                Ok(Arc::new(KrakenFuturesAdapter::with_transport(
                    config.api_key(),
                    config.secret_key(),
                    &url,
                    transport,
                )?))
            }
        },
        "kucoin" => match market {
            MarketKind::Spot => {
                let url = base_url(kucoin::DEFAULT_SPOT_BASE_URL)?;
                Ok(Arc::new(KucoinSpotAdapter::with_transport(
                    config.api_key(),
                    config.secret_key(),
                    config.passphrase(),
                    &url,
                    transport,
                )?))
            }
            MarketKind::Swap => {
                let url = futures_url(kucoin::DEFAULT_FUTURES_BASE_URL)?;
                Ok(Arc::new(KucoinFuturesAdapter::with_transport(
                    config.api_key(),
                    config.secret_key(),
                    config.passphrase(),
                    &url,
                    transport,
                )?))
            }
        },
        "gate" | "gateio" => {
            let url = base_url(gate::DEFAULT_BASE_URL)?;
            match market {
                MarketKind::Spot => Ok(Arc::new(GateSpotAdapter::with_transport(
                    config.api_key(),
                    config.secret_key(),
                    &url,
                    transport,
                )?)),
                MarketKind::Swap => Ok(Arc::new(GateFuturesAdapter::with_transport(
                    config.api_key(),
                    config.secret_key(),
                    &url,
                    transport,
                )?)),
            }
        }
        other => Err(ExchangeError::Configuration(format!(
            "unsupported exchange_id: {other}"
        ))),
    }
}

fn checked_url(raw: &str) -> Result<String, ExchangeError> {
    Url::parse(raw)
        .map_err(|e| ExchangeError::Configuration(format!("invalid base_url {raw:?}: {e}")))?;
    Ok(raw.trim_end_matches('/').to_string())
}
