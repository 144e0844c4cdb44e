//! Data models decoded from Ubisoft services responses.

pub mod market;

pub use market::{MarketSnapshot, PriceStats};
