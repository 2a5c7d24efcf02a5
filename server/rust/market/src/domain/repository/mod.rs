pub mod market_repository;

pub use market_repository::MarketRepository;
