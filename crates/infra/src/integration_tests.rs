//! Integration tests for the full stock pipeline on a real SQLite file.
//!
//! Tests: StockEngine → SqliteStockStore → StockQuery
//!
//! Verifies:
//! - Stock counters always equal the sum of their ledger deltas
//! - Concurrent writers (including separate pools) never oversell
//! - A failed ledger write leaves the counter untouched
//! - History resolves actor names and survives a reopen

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use stockledger_core::{ActorId, ItemId};
    use stockledger_inventory::{ActorDisplay, CategoryChoice, NewItem};

    use crate::config::StoreConfig;
    use crate::engine::{MutationError, StockEngine};
    use crate::query::StockQuery;
    use crate::store::{SqliteStockStore, StockStore, StoreError};

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            database_url: format!("sqlite://{}", dir.path().join("stock.db").display()),
            max_cas_retries: 64,
            ..StoreConfig::default()
        }
    }

    async fn setup() -> (
        TempDir,
        StockEngine<SqliteStockStore>,
        StockQuery<SqliteStockStore>,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let store = SqliteStockStore::connect(&config).await.unwrap();
        (
            dir,
            StockEngine::with_config(store.clone(), &config),
            StockQuery::new(store),
        )
    }

    async fn seeded_item(engine: &StockEngine<SqliteStockStore>, stock: i64) -> ItemId {
        engine
            .create_item(ActorId::new(1), NewItem::new("Arabica 1kg").with_initial_stock(stock))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn worked_example_end_to_end() {
        let (_dir, engine, query) = setup().await;
        let clerk = engine.register_actor("clerk").await.unwrap();
        let item = seeded_item(&engine, 10).await;

        assert!(matches!(
            engine.apply_delta(item, clerk, -15).await,
            Err(MutationError::InsufficientStock { on_hand: 10, delta: -15, .. })
        ));
        assert_eq!(engine.apply_delta(item, clerk, -10).await.unwrap().new_stock, 0);
        assert!(matches!(
            engine.apply_delta(item, clerk, -1).await,
            Err(MutationError::InsufficientStock { on_hand: 0, delta: -1, .. })
        ));

        assert_eq!(query.current_stock(item).await.unwrap(), 0);
        let history = query.history(item).await.unwrap();
        let deltas: Vec<i64> = history.iter().map(|h| h.delta.get()).collect();
        assert_eq!(deltas, vec![-10, 10]);
        assert_eq!(history[0].actor, ActorDisplay::Known("clerk".to_string()));
        assert!(query.audit().await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn unknown_actor_displays_as_unknown() {
        let (_dir, engine, query) = setup().await;
        let item = seeded_item(&engine, 1).await;
        engine.apply_delta(item, ActorId::new(4242), 2).await.unwrap();

        let history = query.history(item).await.unwrap();
        assert_eq!(history[0].actor_id, ActorId::new(4242));
        assert_eq!(history[0].actor.to_string(), "unknown");
    }

    #[tokio::test]
    async fn concurrent_tasks_never_oversell() {
        let (_dir, engine, query) = setup().await;
        let item = seeded_item(&engine, 10).await;
        let engine = Arc::new(engine);

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.apply_delta(item, ActorId::new(i), -1).await })
            })
            .collect();

        let mut succeeded = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(MutationError::InsufficientStock { .. }) => {}
                Err(other) => panic!("unexpected error {other:?}"),
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(query.current_stock(item).await.unwrap(), 0);
        assert_eq!(query.history(item).await.unwrap().len(), 11);
        assert!(query.audit().await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn separate_pools_on_one_file_stay_consistent() {
        let (dir, engine_a, query) = setup().await;
        let item = seeded_item(&engine_a, 0).await;

        // A second pool with its own lock registry, like a second process.
        let config = test_config(&dir);
        let engine_b = StockEngine::with_config(
            SqliteStockStore::connect(&config).await.unwrap(),
            &config,
        );

        let engine_a = Arc::new(engine_a);
        let engine_b = Arc::new(engine_b);
        let mut tasks = Vec::new();
        for _ in 0..15 {
            let a = engine_a.clone();
            tasks.push(tokio::spawn(async move { a.apply_delta(item, ActorId::new(1), 2).await }));
            let b = engine_b.clone();
            tasks.push(tokio::spawn(async move { b.apply_delta(item, ActorId::new(2), 3).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(query.current_stock(item).await.unwrap(), 15 * 5);
        assert_eq!(query.history(item).await.unwrap().len(), 30);
        assert!(query.audit().await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn failed_ledger_write_rolls_back_counter() {
        let (_dir, engine, query) = setup().await;
        let item = seeded_item(&engine, 5).await;

        sqlx::query(
            "CREATE TRIGGER reject_ledger_writes BEFORE INSERT ON ledger_entries
             BEGIN SELECT RAISE(ABORT, 'ledger offline'); END",
        )
        .execute(engine.store().pool())
        .await
        .unwrap();

        let err = engine.apply_delta(item, ActorId::new(1), -2).await.unwrap_err();
        assert!(matches!(err, MutationError::Storage(StoreError::Database(_))), "{err:?}");
        assert_eq!(query.current_stock(item).await.unwrap(), 5);
        assert_eq!(query.history(item).await.unwrap().len(), 1);
        assert!(query.audit().await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn set_absolute_stock_records_difference() {
        let (_dir, engine, query) = setup().await;
        let item = seeded_item(&engine, 7).await;

        let noop = engine.set_absolute_stock(item, ActorId::new(1), 7).await.unwrap();
        assert!(!noop.changed);

        let update = engine.set_absolute_stock(item, ActorId::new(1), 3).await.unwrap();
        assert!(update.changed);
        assert_eq!(update.entry.unwrap().delta.get(), -4);

        assert_eq!(query.current_stock(item).await.unwrap(), 3);
        assert_eq!(query.history(item).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn catalog_and_low_stock() {
        let (_dir, engine, query) = setup().await;
        let actor = ActorId::new(1);
        let dairy = engine.create_category("Dairy").await.unwrap();

        engine
            .create_item(
                actor,
                NewItem::new("Whole milk")
                    .with_category(CategoryChoice::Existing(dairy.id))
                    .with_initial_stock(2)
                    .with_minimum_stock(6),
            )
            .await
            .unwrap();
        let butter = engine
            .create_item(
                actor,
                NewItem::new("Butter")
                    .with_category(CategoryChoice::New("Dairy".to_string()))
                    .with_initial_stock(6)
                    .with_minimum_stock(6),
            )
            .await
            .unwrap();
        assert_eq!(butter.category_id, Some(dairy.id));
        assert_eq!(query.categories().await.unwrap(), vec![dairy]);

        let low = query.low_stock_items().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].item.name, "Whole milk");
        assert_eq!(low[0].category_name.as_deref(), Some("Dairy"));
        assert_eq!(query.list_items().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let (dir, engine, _) = setup().await;
        let item = seeded_item(&engine, 3).await;
        engine.apply_delta(item, ActorId::new(1), 4).await.unwrap();
        let before = engine.store().history(item).await.unwrap();
        engine.store().close().await;

        let reopened = SqliteStockStore::connect(&test_config(&dir)).await.unwrap();
        let query = StockQuery::new(reopened);
        assert_eq!(query.current_stock(item).await.unwrap(), 7);
        assert_eq!(query.history(item).await.unwrap(), before);
    }
}
