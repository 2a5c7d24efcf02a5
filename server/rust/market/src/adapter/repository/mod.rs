pub mod market_in_memory;
#[cfg(feature = "postgres")]
pub mod market_postgres;

pub use market_in_memory::{MarketDatabase, MarketDatabaseExt, MarketKey, MarketRow, MarketSession};
