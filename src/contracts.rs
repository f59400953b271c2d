//! Contract-metadata cache for venues that denominate order size in
//! contracts. Entries live for a fixed TTL; staleness triggers a re-fetch by
//! the caller, never an error. Values are immutable once fetched, so
//! concurrent refreshes are idempotent and last-writer-wins.

use parking_lot::RwLock;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::venue::adapter::ExchangeError;

pub const DEFAULT_CONTRACT_TTL: Duration = Duration::from_secs(300);

/// Per-instrument contract metadata: how much base asset one contract
/// represents.
#[derive(Debug, Clone, Copy)]
pub struct ContractMetadata {
    pub multiplier: Decimal,
}

struct CacheSlot {
    fetched_at: Instant,
    meta: ContractMetadata,
}

pub struct ContractCache {
    ttl: Duration,
    slots: RwLock<HashMap<String, CacheSlot>>,
}

impl ContractCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CONTRACT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached metadata, or `None` when missing or expired.
    pub fn get(&self, instrument: &str) -> Option<ContractMetadata> {
        let slots = self.slots.read();
        let slot = slots.get(instrument)?;
        if slot.fetched_at.elapsed() > self.ttl {
            return None;
        }
        Some(slot.meta)
    }

    pub fn store(&self, instrument: &str, meta: ContractMetadata) {
        self.slots.write().insert(
            instrument.to_string(),
            CacheSlot {
                fetched_at: Instant::now(),
                meta,
            },
        );
    }
}

impl Default for ContractCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a base-asset quantity into a whole contract count by flooring
/// `base / multiplier`; under-fill is preferred to over-fill. A result of
/// zero (or less) means the request is too small to express and is an input
/// error, not a silent no-op order.
pub fn base_to_contracts(base: Decimal, multiplier: Decimal) -> Result<i64, ExchangeError> {
    // An unusable multiplier degrades to 1: one contract per base unit.
    let multiplier = if multiplier > Decimal::ZERO {
        multiplier
    } else {
        Decimal::ONE
    };
    let contracts = (base / multiplier).floor();
    let count = contracts.to_i64().unwrap_or(0);
    if count <= 0 {
        return Err(ExchangeError::Validation(format!(
            "size {base} converts to {count} contracts (multiplier {multiplier})"
        )));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn floors_never_rounds() {
        // 0.0047 / 0.001 = 4.7 -> 4 contracts, not 5.
        assert_eq!(base_to_contracts(dec!(0.0047), dec!(0.001)).unwrap(), 4);
        assert_eq!(base_to_contracts(dec!(0.005), dec!(0.001)).unwrap(), 5);
        assert_eq!(base_to_contracts(dec!(2.9999), dec!(1)).unwrap(), 2);
    }

    #[test]
    fn floor_bound_holds() {
        let cases = [
            (dec!(0.0047), dec!(0.001)),
            (dec!(1.5), dec!(0.1)),
            (dec!(100), dec!(7)),
            (dec!(0.31), dec!(0.01)),
        ];
        for (base, mult) in cases {
            let n = Decimal::from(base_to_contracts(base, mult).unwrap());
            let exact = base / mult;
            assert!(n <= exact && exact < n + Decimal::ONE);
        }
    }

    #[test]
    fn too_small_size_is_a_validation_error() {
        assert!(matches!(
            base_to_contracts(dec!(0.0004), dec!(0.001)),
            Err(ExchangeError::Validation(_))
        ));
        assert!(base_to_contracts(Decimal::ZERO, dec!(0.001)).is_err());
    }

    #[test]
    fn non_positive_multiplier_degrades_to_one() {
        assert_eq!(base_to_contracts(dec!(3.7), Decimal::ZERO).unwrap(), 3);
    }

    #[test]
    fn cache_expires_after_ttl() {
        let cache = ContractCache::with_ttl(Duration::from_millis(0));
        cache.store(
            "XBTUSDTM",
            ContractMetadata {
                multiplier: dec!(0.001),
            },
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("XBTUSDTM").is_none());
    }

    #[test]
    fn cache_hit_within_ttl() {
        let cache = ContractCache::new();
        cache.store(
            "BTC_USDT",
            ContractMetadata {
                multiplier: dec!(0.0001),
            },
        );
        let meta = cache.get("BTC_USDT").unwrap();
        assert_eq!(meta.multiplier, dec!(0.0001));
        assert!(cache.get("ETH_USDT").is_none());
    }
}
