pub mod config;
pub mod contracts;
pub mod dispatch;
pub mod fill;
pub mod logging;
pub mod model;
pub mod signing;
pub mod symbols;
pub mod transport;
pub mod venue;
