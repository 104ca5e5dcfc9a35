//! Stock mutation engine.
//!
//! The **only** write path for stock counters and the ledger. Every change,
//! including an item's initial stock and "set absolute stock" requests, goes
//! through [`StockEngine::apply_delta`] so the counter always equals the sum
//! of the item's ledger deltas.
//!
//! ## Mutation Flow
//!
//! ```text
//! apply_delta(item, actor, delta)
//!   ↓
//! 1. Reject zero deltas
//!   ↓
//! 2. Take the per-item lock (serializes callers in this process)
//!   ↓
//! 3. Read the counter (ItemNotFound if absent)
//!   ↓
//! 4. Plan the change against that read (InsufficientStock if it would go
//!    negative; for a target, the difference from the current stock)
//!   ↓
//! 5. Commit: compare-and-swap the counter + append the ledger entry, one transaction
//!   ↓
//! 6. On a lost CAS (another process wrote the item), go back to 3
//! ```
//!
//! Any failure before or during step 5 leaves both the counter and the ledger
//! untouched, so a caller may safely retry after a `Storage` error.

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use stockledger_core::{ActorId, DomainError, ItemId};
use stockledger_inventory::{
    Item, LedgerEntry, StockDelta, next_recorded_at, plan_delta, plan_target,
};

use crate::config::StoreConfig;
use crate::locks::ItemLocks;
use crate::store::{CommitOutcome, PendingChange, StockSnapshot, StockStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// The referenced item does not exist.
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    /// The change would drive stock below zero. Nothing was written.
    #[error("insufficient stock for item {item_id}: {on_hand} on hand, delta {delta}")]
    InsufficientStock {
        item_id: ItemId,
        on_hand: i64,
        delta: i64,
    },

    /// A zero delta was requested.
    #[error("delta cannot be zero")]
    InvalidDelta,

    #[error("validation failed: {0}")]
    Validation(String),

    /// Persistence failed; the whole mutation was rolled back.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    /// `create_item` stored the item but could not record its initial stock.
    /// The item exists with zero stock and an empty ledger; retry the stock
    /// with `apply_delta` on `item.id` rather than creating the item again.
    #[error("item {} created but its initial stock was not recorded: {source}", .item.id)]
    InitialStockNotRecorded {
        item: Box<Item>,
        source: Box<MutationError>,
    },
}

impl From<DomainError> for MutationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::ZeroDelta => MutationError::InvalidDelta,
            DomainError::Validation(msg) => MutationError::Validation(msg),
            DomainError::InvalidId(msg) => MutationError::Validation(msg),
            // Planning errors carry no item; the engine maps them with the item in scope.
            DomainError::InsufficientStock { .. } => MutationError::Validation(value.to_string()),
        }
    }
}

/// Result of a successful stock operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockUpdate {
    pub new_stock: i64,
    /// `false` when the request was a no-op (nothing recorded).
    pub changed: bool,
    pub entry: Option<LedgerEntry>,
}

impl StockUpdate {
    fn committed(new_stock: i64, entry: LedgerEntry) -> Self {
        Self {
            new_stock,
            changed: true,
            entry: Some(entry),
        }
    }

    fn unchanged(stock: i64) -> Self {
        Self {
            new_stock: stock,
            changed: false,
            entry: None,
        }
    }
}

/// What a mutation asks for, resolved against each fresh snapshot.
#[derive(Debug, Copy, Clone)]
enum Request {
    Delta(StockDelta),
    Target(i64),
}

impl Request {
    /// `None` when the stock already satisfies the request.
    fn delta_from(self, on_hand: i64) -> Result<Option<StockDelta>, DomainError> {
        match self {
            Request::Delta(delta) => Ok(Some(delta)),
            Request::Target(target) => plan_target(on_hand, target),
        }
    }
}

/// The stock mutation engine.
///
/// Generic over the store so tests run against `InMemoryStockStore` and
/// production against `SqliteStockStore`. The store is passed in explicitly;
/// there is no ambient connection.
#[derive(Debug)]
pub struct StockEngine<S> {
    store: S,
    locks: ItemLocks,
    max_cas_retries: u32,
}

impl<S> StockEngine<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, &StoreConfig::default())
    }

    pub fn with_config(store: S, config: &StoreConfig) -> Self {
        Self {
            store,
            locks: ItemLocks::new(),
            max_cas_retries: config.max_cas_retries.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S> StockEngine<S>
where
    S: StockStore,
{
    /// Apply a signed stock change and record it in the ledger, atomically.
    #[instrument(skip(self), fields(item_id = %item_id, actor_id = %actor_id))]
    pub async fn apply_delta(
        &self,
        item_id: ItemId,
        actor_id: ActorId,
        delta: i64,
    ) -> Result<StockUpdate, MutationError> {
        let delta = StockDelta::new(delta)?;
        let _guard = self.locks.lock(item_id).await;
        self.apply_locked(item_id, actor_id, Request::Delta(delta))
            .await
    }

    /// Move the stock to `target` by recording the difference as a delta.
    ///
    /// Returns `changed = false` (and records nothing) if the stock already
    /// equals `target`. The difference is recomputed after every lost
    /// compare-and-swap, so the call always ends at `target` or fails.
    #[instrument(skip(self), fields(item_id = %item_id, actor_id = %actor_id))]
    pub async fn set_absolute_stock(
        &self,
        item_id: ItemId,
        actor_id: ActorId,
        target: i64,
    ) -> Result<StockUpdate, MutationError> {
        let _guard = self.locks.lock(item_id).await;
        self.apply_locked(item_id, actor_id, Request::Target(target))
            .await
    }

    async fn snapshot(&self, item_id: ItemId) -> Result<StockSnapshot, MutationError> {
        self.store
            .stock_snapshot(item_id)
            .await?
            .ok_or(MutationError::ItemNotFound(item_id))
    }

    /// Read-plan-commit loop. Caller must hold the item's lock.
    async fn apply_locked(
        &self,
        item_id: ItemId,
        actor_id: ActorId,
        request: Request,
    ) -> Result<StockUpdate, MutationError> {
        for attempt in 1..=self.max_cas_retries {
            let snapshot = self.snapshot(item_id).await?;

            let delta = match request.delta_from(snapshot.on_hand)? {
                Some(delta) => delta,
                None => {
                    info!(stock = snapshot.on_hand, "stock already at target, nothing recorded");
                    return Ok(StockUpdate::unchanged(snapshot.on_hand));
                }
            };

            let change = plan_delta(snapshot.on_hand, delta).map_err(|err| match err {
                DomainError::InsufficientStock { on_hand, delta } => {
                    warn!(on_hand, delta, "stock change rejected: insufficient stock");
                    MutationError::InsufficientStock {
                        item_id,
                        on_hand,
                        delta,
                    }
                }
                other => other.into(),
            })?;

            let pending = PendingChange {
                item_id,
                actor_id,
                change,
                recorded_at: next_recorded_at(Utc::now(), snapshot.last_recorded_at),
            };

            match self.store.commit_change(&pending).await? {
                CommitOutcome::Committed(entry) => {
                    info!(
                        entry_id = %entry.id,
                        delta = %delta,
                        new_stock = change.new_stock,
                        "stock change committed"
                    );
                    return Ok(StockUpdate::committed(change.new_stock, entry));
                }
                CommitOutcome::Conflict { found: None } => {
                    return Err(MutationError::ItemNotFound(item_id));
                }
                CommitOutcome::Conflict { found: Some(found) } => {
                    warn!(
                        attempt,
                        expected = change.previous,
                        found,
                        "stock counter moved underneath mutation, retrying"
                    );
                }
            }
        }

        Err(StoreError::Contention {
            item_id,
            attempts: self.max_cas_retries,
        }
        .into())
    }
}
