pub mod adapter;
pub mod bitfinex;
pub mod coinbase;
pub mod factory;
pub mod gate;
pub mod kraken;
pub mod kraken_futures;
pub mod kucoin;
