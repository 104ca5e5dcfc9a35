//! Inventory domain module.
//!
//! This crate contains business rules for stock keeping, implemented purely as
//! deterministic domain logic (no IO, no storage, no clocks).

pub mod category;
pub mod item;
pub mod ledger;
pub mod stock;

pub use category::{Category, validate_category_name};
pub use item::{CategoryChoice, Item, ItemSummary, NewItem};
pub use ledger::{ActorDisplay, HistoryEntry, LedgerEntry, next_recorded_at};
pub use stock::{StockChange, StockDelta, plan_delta, plan_target};
