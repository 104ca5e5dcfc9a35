use std::collections::BTreeMap;
use std::sync::RwLock;

use stockledger_core::{ActorId, CategoryId, ItemId, LedgerEntryId};
use stockledger_inventory::{
    ActorDisplay, Category, CategoryChoice, HistoryEntry, Item, ItemSummary, LedgerEntry,
    next_recorded_at,
};

use super::{
    CommitOutcome, ItemDraft, LedgerTotal, PendingChange, StockSnapshot, StockStore, StoreError,
};

#[derive(Debug, Default)]
struct State {
    categories: BTreeMap<CategoryId, Category>,
    actors: BTreeMap<ActorId, String>,
    items: BTreeMap<ItemId, Item>,
    ledger: Vec<LedgerEntry>,
    next_category: i64,
    next_actor: i64,
    next_item: i64,
    next_entry: i64,
}

impl State {
    fn insert_category(&mut self, name: &str) -> Category {
        self.next_category += 1;
        let category = Category {
            id: CategoryId::new(self.next_category),
            name: name.to_string(),
        };
        self.categories.insert(category.id, category.clone());
        category
    }

    fn find_category(&self, name: &str) -> Option<&Category> {
        self.categories.values().find(|c| c.name == name)
    }

    fn entries_for(&self, item_id: ItemId) -> impl Iterator<Item = &LedgerEntry> {
        self.ledger.iter().filter(move |e| e.item_id == item_id)
    }
}

/// In-memory catalog + ledger.
///
/// Intended for tests/dev. A single lock guards all state, so every
/// operation is trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    state: RwLock<State>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl StockStore for InMemoryStockStore {
    async fn insert_category(&self, name: &str) -> Result<Category, StoreError> {
        Ok(self.write()?.insert_category(name))
    }

    async fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let state = self.read()?;
        let mut categories: Vec<Category> = state.categories.values().cloned().collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(categories)
    }

    async fn insert_actor(&self, username: &str) -> Result<ActorId, StoreError> {
        let mut state = self.write()?;
        if state.actors.values().any(|u| u == username) {
            return Err(StoreError::Duplicate(format!("username '{username}' is taken")));
        }
        state.next_actor += 1;
        let id = ActorId::new(state.next_actor);
        state.actors.insert(id, username.to_string());
        Ok(id)
    }

    async fn insert_item(&self, draft: &ItemDraft) -> Result<Item, StoreError> {
        let mut state = self.write()?;

        let category_id = match &draft.category {
            CategoryChoice::None => None,
            CategoryChoice::Existing(id) => {
                if !state.categories.contains_key(id) {
                    return Err(StoreError::UnknownCategory(*id));
                }
                Some(*id)
            }
            CategoryChoice::New(name) => {
                let existing = state.find_category(name).map(|c| c.id);
                Some(existing.unwrap_or_else(|| state.insert_category(name).id))
            }
        };

        state.next_item += 1;
        let item = Item {
            id: ItemId::new(state.next_item),
            name: draft.name.clone(),
            category_id,
            current_stock: 0,
            minimum_stock: draft.minimum_stock,
        };
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.read()?.items.get(&item_id).cloned())
    }

    async fn items(&self) -> Result<Vec<ItemSummary>, StoreError> {
        let state = self.read()?;
        Ok(state
            .items
            .values()
            .map(|item| ItemSummary {
                item: item.clone(),
                category_name: item
                    .category_id
                    .and_then(|id| state.categories.get(&id))
                    .map(|c| c.name.clone()),
            })
            .collect())
    }

    async fn stock_snapshot(&self, item_id: ItemId) -> Result<Option<StockSnapshot>, StoreError> {
        let state = self.read()?;
        Ok(state.items.get(&item_id).map(|item| StockSnapshot {
            on_hand: item.current_stock,
            last_recorded_at: state.entries_for(item_id).map(|e| e.recorded_at).max(),
        }))
    }

    async fn commit_change(&self, pending: &PendingChange) -> Result<CommitOutcome, StoreError> {
        let mut state = self.write()?;

        let Some(item) = state.items.get_mut(&pending.item_id) else {
            return Ok(CommitOutcome::Conflict { found: None });
        };
        if item.current_stock != pending.change.previous {
            return Ok(CommitOutcome::Conflict {
                found: Some(item.current_stock),
            });
        }
        item.current_stock = pending.change.new_stock;

        let last = state.entries_for(pending.item_id).map(|e| e.recorded_at).max();
        state.next_entry += 1;
        let entry = LedgerEntry {
            id: LedgerEntryId::new(state.next_entry),
            item_id: pending.item_id,
            recorded_at: next_recorded_at(pending.recorded_at, last),
            actor_id: pending.actor_id,
            delta: pending.change.delta,
        };
        state.ledger.push(entry.clone());
        Ok(CommitOutcome::Committed(entry))
    }

    async fn history(&self, item_id: ItemId) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self.read()?;
        let mut rows: Vec<HistoryEntry> = state
            .entries_for(item_id)
            .map(|e| HistoryEntry {
                entry_id: e.id,
                recorded_at: e.recorded_at,
                delta: e.delta,
                actor_id: e.actor_id,
                actor: ActorDisplay::from_username(state.actors.get(&e.actor_id).cloned()),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.recorded_at
                .cmp(&a.recorded_at)
                .then(b.entry_id.cmp(&a.entry_id))
        });
        Ok(rows)
    }

    async fn ledger_totals(&self) -> Result<Vec<LedgerTotal>, StoreError> {
        let state = self.read()?;
        Ok(state
            .items
            .values()
            .map(|item| {
                let (sum, count) = state
                    .entries_for(item.id)
                    .fold((0i64, 0u64), |(s, c), e| (s + e.delta.get(), c + 1));
                LedgerTotal {
                    item_id: item.id,
                    current_stock: item.current_stock,
                    ledger_sum: sum,
                    entries: count,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use stockledger_inventory::{StockDelta, plan_delta};

    use super::*;

    async fn item(store: &InMemoryStockStore) -> ItemId {
        store
            .insert_item(&ItemDraft {
                name: "Tea".to_string(),
                category: CategoryChoice::None,
                minimum_stock: 0,
            })
            .await
            .unwrap()
            .id
    }

    fn pending(
        item_id: ItemId,
        previous: i64,
        delta: i64,
        recorded_at: DateTime<Utc>,
    ) -> PendingChange {
        PendingChange {
            item_id,
            actor_id: ActorId::new(1),
            change: plan_delta(previous, StockDelta::new(delta).unwrap()).unwrap(),
            recorded_at,
        }
    }

    #[tokio::test]
    async fn stale_counter_is_a_conflict() {
        let store = InMemoryStockStore::new();
        let item_id = item(&store).await;

        let outcome = store.commit_change(&pending(item_id, 3, 1, Utc::now())).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict { found: Some(0) });
        assert!(store.history(item_id).await.unwrap().is_empty());

        let missing = store
            .commit_change(&pending(ItemId::new(77), 0, 1, Utc::now()))
            .await
            .unwrap();
        assert_eq!(missing, CommitOutcome::Conflict { found: None });
    }

    #[tokio::test]
    async fn stale_timestamps_are_clamped_past_the_latest_entry() {
        let store = InMemoryStockStore::new();
        let item_id = item(&store).await;
        let latest = Utc::now();

        store.commit_change(&pending(item_id, 0, 4, latest)).await.unwrap();
        let outcome = store
            .commit_change(&pending(item_id, 4, -1, latest - Duration::seconds(30)))
            .await
            .unwrap();
        let CommitOutcome::Committed(entry) = outcome else {
            panic!("expected a committed change");
        };

        assert!(entry.recorded_at > latest);
        let history = store.history(item_id).await.unwrap();
        assert_eq!(history[0].entry_id, entry.id);
        assert!(history[0].recorded_at > history[1].recorded_at);
    }
}
