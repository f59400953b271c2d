//! Per-venue instrument naming. Strategies speak in "BASE/QUOTE"; every
//! exchange wants its own spelling of that pair.

/// Splits an abstract symbol into (base, quote), both uppercased.
/// Accepts `/`, `-` or `_` as the separator; a bare string comes back with an
/// empty quote and the per-venue mappers pass it through untouched.
pub fn split_pair(symbol: &str) -> (String, String) {
    let s = symbol.trim().to_ascii_uppercase();
    for sep in ['/', '-', '_'] {
        if let Some((base, quote)) = s.split_once(sep) {
            return (base.to_string(), quote.to_string());
        }
    }
    (s, String::new())
}

/// Bitfinex spot ticker, e.g. "BTC/USDT" -> "tBTCUST" (Bitfinex lists USDT
/// as UST).
pub fn to_bitfinex_spot(symbol: &str) -> String {
    let (base, quote) = split_pair(symbol);
    if quote.is_empty() {
        return base;
    }
    let quote = if quote == "USDT" { "UST".to_string() } else { quote };
    format!("t{base}{quote}")
}

/// Bitfinex perpetual ticker, e.g. "BTC/USDT" -> "tBTCF0:USTF0".
pub fn to_bitfinex_perp(symbol: &str) -> String {
    let (base, quote) = split_pair(symbol);
    if quote.is_empty() {
        return base;
    }
    let quote = if quote == "USDT" { "UST".to_string() } else { quote };
    format!("t{base}F0:{quote}F0")
}

/// Coinbase product id, e.g. "BTC/USDT" -> "BTC-USDT".
pub fn to_coinbase_product(symbol: &str) -> String {
    let (base, quote) = split_pair(symbol);
    if quote.is_empty() {
        return base;
    }
    format!("{base}-{quote}")
}

/// Kraken spot pair, e.g. "BTC/USDT" -> "XBTUSDT" (Kraken calls BTC XBT).
pub fn to_kraken_pair(symbol: &str) -> String {
    let (base, quote) = split_pair(symbol);
    let base = if base == "BTC" { "XBT".to_string() } else { base };
    format!("{base}{quote}")
}

/// Kraken Futures instrument, e.g. "BTC/USDT" -> "PF_XBTUSD".
/// Already-native instruments (PF_*/PI_*) pass through unchanged.
pub fn to_kraken_futures(symbol: &str) -> String {
    let s = symbol.trim().to_ascii_uppercase();
    if s.starts_with("PF_") || s.starts_with("PI_") {
        return s;
    }
    let (base, quote) = split_pair(&s);
    let base = if base == "BTC" { "XBT".to_string() } else { base };
    let quote = if quote == "USDT" { "USD".to_string() } else { quote };
    format!("PF_{base}{quote}")
}

/// KuCoin spot symbol, e.g. "BTC/USDT" -> "BTC-USDT".
pub fn to_kucoin_spot(symbol: &str) -> String {
    let (base, quote) = split_pair(symbol);
    if quote.is_empty() {
        return base;
    }
    format!("{base}-{quote}")
}

/// KuCoin futures instrument, e.g. "BTC/USDT" -> "XBTUSDTM".
pub fn to_kucoin_futures(symbol: &str) -> String {
    let (base, quote) = split_pair(symbol);
    let base = if base == "BTC" { "XBT".to_string() } else { base };
    format!("{base}{quote}M")
}

/// Gate currency pair, e.g. "BTC/USDT" -> "BTC_USDT". The same spelling names
/// the USDT-futures contract.
pub fn to_gate_pair(symbol: &str) -> String {
    let (base, quote) = split_pair(symbol);
    if quote.is_empty() {
        return base;
    }
    format!("{base}_{quote}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_accepts_common_separators() {
        assert_eq!(split_pair("BTC/USDT"), ("BTC".into(), "USDT".into()));
        assert_eq!(split_pair("eth-usd"), ("ETH".into(), "USD".into()));
        assert_eq!(split_pair("SOL_USDT"), ("SOL".into(), "USDT".into()));
        assert_eq!(split_pair("PEPE"), ("PEPE".into(), "".into()));
    }

    #[test]
    fn bitfinex_spellings() {
        assert_eq!(to_bitfinex_spot("BTC/USDT"), "tBTCUST");
        assert_eq!(to_bitfinex_spot("ETH/USD"), "tETHUSD");
        assert_eq!(to_bitfinex_perp("BTC/USDT"), "tBTCF0:USTF0");
    }

    #[test]
    fn kraken_spellings() {
        assert_eq!(to_kraken_pair("BTC/USDT"), "XBTUSDT");
        assert_eq!(to_kraken_pair("ETH/USD"), "ETHUSD");
        assert_eq!(to_kraken_futures("BTC/USDT"), "PF_XBTUSD");
        assert_eq!(to_kraken_futures("pf_ethusd"), "PF_ETHUSD");
    }

    #[test]
    fn kucoin_and_gate_spellings() {
        assert_eq!(to_kucoin_spot("BTC/USDT"), "BTC-USDT");
        assert_eq!(to_kucoin_futures("BTC/USDT"), "XBTUSDTM");
        assert_eq!(to_gate_pair("BTC/USDT"), "BTC_USDT");
        assert_eq!(to_coinbase_product("BTC/USDT"), "BTC-USDT");
    }
}
