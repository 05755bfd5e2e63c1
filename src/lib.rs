pub mod balance_ledger;
pub mod configure;
pub mod engine;
pub mod logging;
pub mod matching_engine;
pub mod memory_store;
pub mod models;
pub mod order_book;
pub mod order_registry;
pub mod redis_store;
pub mod snapshot_service;
pub mod store;
