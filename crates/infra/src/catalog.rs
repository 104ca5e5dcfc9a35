//! Catalog writes: categories, actors and items.
//!
//! None of these touch stock directly. An item's initial stock is recorded
//! through [`StockEngine::apply_delta`] like any other change.

use tracing::{info, instrument, warn};

use stockledger_core::ActorId;
use stockledger_inventory::{Category, Item, NewItem, validate_category_name};

use crate::engine::{MutationError, StockEngine};
use crate::store::{ItemDraft, StockStore, StoreError};

impl<S> StockEngine<S>
where
    S: StockStore,
{
    #[instrument(skip(self))]
    pub async fn create_category(&self, name: &str) -> Result<Category, MutationError> {
        let name = validate_category_name(name)?;
        let category = self.store().insert_category(&name).await?;
        info!(category_id = %category.id, "category created");
        Ok(category)
    }

    /// Register a user who can appear as the actor of ledger entries.
    #[instrument(skip(self))]
    pub async fn register_actor(&self, username: &str) -> Result<ActorId, MutationError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(MutationError::Validation("username cannot be empty".to_string()));
        }
        let actor_id = self
            .store()
            .insert_actor(username)
            .await
            .map_err(|err| match err {
                StoreError::Duplicate(msg) => MutationError::Validation(msg),
                other => other.into(),
            })?;
        info!(actor_id = %actor_id, "actor registered");
        Ok(actor_id)
    }

    /// Create an item with zero stock, then record `initial_stock` (if any)
    /// as a ledger entry attributed to `actor_id`.
    ///
    /// The two steps are separate transactions. If the second fails the item
    /// still exists (zero stock, empty ledger) and the error is
    /// [`MutationError::InitialStockNotRecorded`] carrying it.
    #[instrument(skip(self, command), fields(actor_id = %actor_id, name = %command.name))]
    pub async fn create_item(
        &self,
        actor_id: ActorId,
        command: NewItem,
    ) -> Result<Item, MutationError> {
        let command = command.validated()?;

        let mut item = self
            .store()
            .insert_item(&ItemDraft::from(&command))
            .await
            .map_err(|err| match err {
                StoreError::UnknownCategory(id) => {
                    MutationError::Validation(format!("category {id} does not exist"))
                }
                other => other.into(),
            })?;
        info!(item_id = %item.id, "item created");

        if command.initial_stock > 0 {
            match self.apply_delta(item.id, actor_id, command.initial_stock).await {
                Ok(update) => item.current_stock = update.new_stock,
                Err(source) => {
                    warn!(item_id = %item.id, error = %source, "initial stock not recorded");
                    return Err(MutationError::InitialStockNotRecorded {
                        item: Box::new(item),
                        source: Box::new(source),
                    });
                }
            }
        }

        Ok(item)
    }
}
