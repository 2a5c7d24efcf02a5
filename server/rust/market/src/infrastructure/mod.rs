pub mod config;
pub mod database;
pub mod notifier;
pub mod startup;
pub mod ton_gateway;
