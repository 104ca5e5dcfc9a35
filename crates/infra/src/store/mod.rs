//! Persistence boundary for the item catalog and the stock ledger.
//!
//! The store owns two pieces of state that must always agree: the
//! denormalized `current_stock` counter on each item and the append-only
//! ledger of stock deltas. The only write path touching either is
//! [`StockStore::commit_change`], which updates the counter with a
//! compare-and-swap and appends the ledger entry in the same transaction.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStockStore;
pub use sqlite::SqliteStockStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{ActorId, CategoryId, ItemId};
use stockledger_inventory::{
    Category, CategoryChoice, HistoryEntry, Item, ItemSummary, LedgerEntry, NewItem, StockChange,
};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors
/// (validation, insufficient stock).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("database busy: {0}")]
    Busy(String),

    #[error("failed to decode stored row: {0}")]
    Decode(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error("unknown category {0}")]
    UnknownCategory(CategoryId),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The counter kept changing underneath the engine.
    #[error("stock counter for item {item_id} still contended after {attempts} attempts")]
    Contention { item_id: ItemId, attempts: u32 },
}

/// Stock counter as read before a mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockSnapshot {
    pub on_hand: i64,
    /// Timestamp of the item's latest ledger entry, if any.
    pub last_recorded_at: Option<DateTime<Utc>>,
}

/// A planned change waiting to be committed.
///
/// `change.previous` is the counter value the change was planned against; the
/// store only commits if the counter still holds that value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub item_id: ItemId,
    pub actor_id: ActorId,
    pub change: StockChange,
    /// Proposed timestamp. The store clamps it past the item's latest stored
    /// entry, and the committed entry carries the final value.
    pub recorded_at: DateTime<Utc>,
}

/// Result of a compare-and-swap commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Counter updated and ledger entry appended.
    Committed(LedgerEntry),
    /// The counter no longer matched; nothing was written.
    Conflict { found: Option<i64> },
}

/// Catalog row to insert. Items always start at stock 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDraft {
    pub name: String,
    pub category: CategoryChoice,
    pub minimum_stock: i64,
}

impl From<&NewItem> for ItemDraft {
    fn from(cmd: &NewItem) -> Self {
        Self {
            name: cmd.name.clone(),
            category: cmd.category.clone(),
            minimum_stock: cmd.minimum_stock,
        }
    }
}

/// Counter vs ledger totals for one item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotal {
    pub item_id: ItemId,
    pub current_stock: i64,
    pub ledger_sum: i64,
    pub entries: u64,
}

/// Catalog + ledger persistence.
///
/// Implementations must:
/// - apply `commit_change` atomically (counter write and ledger append both
///   happen, or neither does)
/// - only commit when the stored counter equals `change.previous`
/// - assign ledger ids monotonically and never reuse them
/// - keep each item's ledger timestamps strictly increasing
/// - never update or delete ledger entries
#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    async fn insert_category(&self, name: &str) -> Result<Category, StoreError>;

    async fn categories(&self) -> Result<Vec<Category>, StoreError>;

    /// Register a username in the actor directory.
    async fn insert_actor(&self, username: &str) -> Result<ActorId, StoreError>;

    /// Insert an item at stock 0, creating or resolving its category in the
    /// same transaction.
    async fn insert_item(&self, draft: &ItemDraft) -> Result<Item, StoreError>;

    async fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError>;

    /// All items ordered by id, joined with their category names.
    async fn items(&self) -> Result<Vec<ItemSummary>, StoreError>;

    async fn stock_snapshot(&self, item_id: ItemId) -> Result<Option<StockSnapshot>, StoreError>;

    /// Compare-and-swap the counter and append the ledger entry.
    async fn commit_change(&self, pending: &PendingChange) -> Result<CommitOutcome, StoreError>;

    /// Ledger entries for one item, most recent first.
    async fn history(&self, item_id: ItemId) -> Result<Vec<HistoryEntry>, StoreError>;

    async fn ledger_totals(&self) -> Result<Vec<LedgerTotal>, StoreError>;
}

#[async_trait::async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn insert_category(&self, name: &str) -> Result<Category, StoreError> {
        (**self).insert_category(name).await
    }

    async fn categories(&self) -> Result<Vec<Category>, StoreError> {
        (**self).categories().await
    }

    async fn insert_actor(&self, username: &str) -> Result<ActorId, StoreError> {
        (**self).insert_actor(username).await
    }

    async fn insert_item(&self, draft: &ItemDraft) -> Result<Item, StoreError> {
        (**self).insert_item(draft).await
    }

    async fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).item(item_id).await
    }

    async fn items(&self) -> Result<Vec<ItemSummary>, StoreError> {
        (**self).items().await
    }

    async fn stock_snapshot(&self, item_id: ItemId) -> Result<Option<StockSnapshot>, StoreError> {
        (**self).stock_snapshot(item_id).await
    }

    async fn commit_change(&self, pending: &PendingChange) -> Result<CommitOutcome, StoreError> {
        (**self).commit_change(pending).await
    }

    async fn history(&self, item_id: ItemId) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).history(item_id).await
    }

    async fn ledger_totals(&self) -> Result<Vec<LedgerTotal>, StoreError> {
        (**self).ledger_totals().await
    }
}
