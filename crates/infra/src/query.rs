//! Read-side queries over the catalog and the ledger.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use stockledger_core::ItemId;
use stockledger_inventory::{Category, HistoryEntry, Item, ItemSummary};

use crate::store::{LedgerTotal, StockStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// An item whose counter does not match the sum of its ledger deltas.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub item_id: ItemId,
    pub current_stock: i64,
    pub ledger_sum: i64,
}

/// Result of reconciling every counter against its ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub items_checked: usize,
    pub entries_checked: u64,
    pub discrepancies: Vec<Discrepancy>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }

    fn from_totals(totals: &[LedgerTotal]) -> Self {
        Self {
            items_checked: totals.len(),
            entries_checked: totals.iter().map(|t| t.entries).sum(),
            discrepancies: totals
                .iter()
                .filter(|t| t.current_stock != t.ledger_sum)
                .map(|t| Discrepancy {
                    item_id: t.item_id,
                    current_stock: t.current_stock,
                    ledger_sum: t.ledger_sum,
                })
                .collect(),
        }
    }
}

/// Read-only access to stock, items and history.
#[derive(Debug, Clone)]
pub struct StockQuery<S> {
    store: S,
}

impl<S> StockQuery<S>
where
    S: StockStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn current_stock(&self, item_id: ItemId) -> Result<i64, QueryError> {
        Ok(self.item(item_id).await?.current_stock)
    }

    pub async fn item(&self, item_id: ItemId) -> Result<Item, QueryError> {
        self.store
            .item(item_id)
            .await?
            .ok_or(QueryError::ItemNotFound(item_id))
    }

    /// Ledger entries for an item, newest first.
    ///
    /// Never fails for lack of entries: an item with no ledger, or an id that
    /// names no item, yields an empty list. Use [`StockQuery::item`] to tell
    /// the two apart.
    #[instrument(skip(self), fields(item_id = %item_id), err)]
    pub async fn history(&self, item_id: ItemId) -> Result<Vec<HistoryEntry>, QueryError> {
        let entries = self.store.history(item_id).await?;
        debug!(entries = entries.len(), "history loaded");
        Ok(entries)
    }

    pub async fn list_items(&self) -> Result<Vec<ItemSummary>, QueryError> {
        Ok(self.store.items().await?)
    }

    /// Items strictly below their minimum stock.
    pub async fn low_stock_items(&self) -> Result<Vec<ItemSummary>, QueryError> {
        let mut items = self.store.items().await?;
        items.retain(|summary| summary.item.is_below_minimum());
        debug!(count = items.len(), "low stock items");
        Ok(items)
    }

    pub async fn categories(&self) -> Result<Vec<Category>, QueryError> {
        Ok(self.store.categories().await?)
    }

    /// Reconcile every item's counter against the sum of its ledger deltas.
    #[instrument(skip(self), err)]
    pub async fn audit(&self) -> Result<AuditReport, QueryError> {
        let totals = self.store.ledger_totals().await?;
        let report = AuditReport::from_totals(&totals);

        for d in &report.discrepancies {
            warn!(
                item_id = %d.item_id,
                current_stock = d.current_stock,
                ledger_sum = d.ledger_sum,
                "stock counter disagrees with ledger"
            );
        }
        info!(
            items_checked = report.items_checked,
            entries_checked = report.entries_checked,
            discrepancies = report.discrepancies.len(),
            "ledger audit finished"
        );
        Ok(report)
    }
}
