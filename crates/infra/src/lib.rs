//! Infrastructure layer: SQLite storage, the stock mutation engine, queries, config.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod locks;
pub mod query;
pub mod store;

mod integration_tests;

pub use config::{ConfigError, StoreConfig};
pub use engine::{MutationError, StockEngine, StockUpdate};
pub use query::{AuditReport, Discrepancy, QueryError, StockQuery};
pub use store::{InMemoryStockStore, SqliteStockStore, StockStore, StoreError};
