//! SQLite-backed catalog + ledger store.
//!
//! ## Atomicity
//!
//! `commit_change` runs inside one transaction whose **first statement is the
//! counter write**:
//!
//! ```text
//! UPDATE items SET current_stock = :new WHERE item_id = :id AND current_stock = :previous
//! INSERT INTO ledger_entries (...) RETURNING entry_id
//! COMMIT
//! ```
//!
//! Starting with the write takes SQLite's write lock up front, so concurrent
//! writers queue on `busy_timeout` instead of deadlocking on a read-to-write
//! lock upgrade. A zero-row update means the counter moved since it was read
//! (or the item vanished) and the transaction is rolled back untouched.
//!
//! ## Error Mapping
//!
//! | SQLx Error | SQLite condition | StoreError |
//! |------------|------------------|------------|
//! | Database (unique violation) | `SQLITE_CONSTRAINT_UNIQUE` | `Duplicate` |
//! | Database (busy/locked) | `SQLITE_BUSY`, `SQLITE_LOCKED` | `Busy` |
//! | Database (other) | any other | `Database` |
//! | PoolClosed / PoolTimedOut | N/A | `Unavailable` |
//! | ColumnDecode / Decode / ColumnNotFound | N/A | `Decode` |
//! | Other | N/A | `Database` |
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text with microsecond
//! precision, so lexical order equals chronological order.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;

use stockledger_core::{ActorId, CategoryId, ItemId, LedgerEntryId};
use stockledger_inventory::{
    ActorDisplay, Category, CategoryChoice, HistoryEntry, Item, ItemSummary, LedgerEntry,
    StockDelta, next_recorded_at,
};

use crate::config::StoreConfig;

use super::{
    CommitOutcome, ItemDraft, LedgerTotal, PendingChange, StockSnapshot, StockStore, StoreError,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        category_id INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS actors (
        actor_id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        item_id       INTEGER PRIMARY KEY AUTOINCREMENT,
        name          TEXT NOT NULL CHECK (length(trim(name)) > 0),
        category_id   INTEGER NULL REFERENCES categories (category_id),
        current_stock INTEGER NOT NULL DEFAULT 0 CHECK (current_stock >= 0),
        minimum_stock INTEGER NOT NULL DEFAULT 0
    )
    "#,
    // actor_id is a weak reference: no foreign key.
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        entry_id    INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id     INTEGER NOT NULL REFERENCES items (item_id),
        recorded_at TEXT NOT NULL,
        actor_id    INTEGER NOT NULL,
        delta       INTEGER NOT NULL CHECK (delta <> 0)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS ledger_entries_item_recorded
        ON ledger_entries (item_id, recorded_at)
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS ledger_entries_no_update
    BEFORE UPDATE ON ledger_entries
    BEGIN
        SELECT RAISE(ABORT, 'ledger entries are append-only');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS ledger_entries_no_delete
    BEFORE DELETE ON ledger_entries
    BEGIN
        SELECT RAISE(ABORT, 'ledger entries are append-only');
    END
    "#,
];

/// SQLite catalog + ledger store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStockStore {
    pool: SqlitePool,
}

impl SqliteStockStore {
    /// Open (creating if missing) the database named by `config` and apply the schema.
    #[instrument(skip(config), fields(database_url = %config.database_url), err)]
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| map_sqlx_error("parse_database_url", e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database, mostly for tests.
    ///
    /// Every SQLite connection to `:memory:` opens a fresh database, so the
    /// pool is pinned to a single connection that never expires.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| map_sqlx_error("parse_database_url", e))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, applying the schema.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'static, Sqlite>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

async fn insert_category_tx(
    tx: &mut Transaction<'_, Sqlite>,
    name: &str,
) -> Result<CategoryId, StoreError> {
    let id: i64 = sqlx::query_scalar("INSERT INTO categories (name) VALUES (?1) RETURNING category_id")
        .bind(name)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_category", e))?;
    Ok(CategoryId::new(id))
}

/// Resolve the category for a new item inside the item's transaction.
///
/// A new category name that already exists is reused rather than duplicated.
async fn resolve_category_tx(
    tx: &mut Transaction<'_, Sqlite>,
    choice: &CategoryChoice,
) -> Result<Option<CategoryId>, StoreError> {
    match choice {
        CategoryChoice::None => Ok(None),
        CategoryChoice::Existing(id) => {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT category_id FROM categories WHERE category_id = ?1")
                    .bind(id.get())
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("resolve_category", e))?;
            found
                .map(|_| Some(*id))
                .ok_or(StoreError::UnknownCategory(*id))
        }
        CategoryChoice::New(name) => {
            let existing: Option<i64> = sqlx::query_scalar(
                "SELECT category_id FROM categories WHERE name = ?1 ORDER BY category_id LIMIT 1",
            )
            .bind(name)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("resolve_category", e))?;

            match existing {
                Some(id) => Ok(Some(CategoryId::new(id))),
                None => insert_category_tx(tx, name).await.map(Some),
            }
        }
    }
}

#[async_trait::async_trait]
impl StockStore for SqliteStockStore {
    #[instrument(skip(self), err)]
    async fn insert_category(&self, name: &str) -> Result<Category, StoreError> {
        let mut tx = self.begin("insert_category").await?;
        let id = insert_category_tx(&mut tx, name).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Category {
            id,
            name: name.to_string(),
        })
    }

    async fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query("SELECT category_id, name FROM categories ORDER BY name, category_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("categories", e))?;

        rows.iter()
            .map(|row| {
                Ok(Category {
                    id: CategoryId::new(row.try_get("category_id").map_err(decode_error)?),
                    name: row.try_get("name").map_err(decode_error)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn insert_actor(&self, username: &str) -> Result<ActorId, StoreError> {
        let id: i64 = sqlx::query_scalar("INSERT INTO actors (username) VALUES (?1) RETURNING actor_id")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match map_sqlx_error("insert_actor", e) {
                StoreError::Duplicate(_) => {
                    StoreError::Duplicate(format!("username '{username}' is taken"))
                }
                other => other,
            })?;
        Ok(ActorId::new(id))
    }

    #[instrument(skip(self, draft), fields(name = %draft.name), err)]
    async fn insert_item(&self, draft: &ItemDraft) -> Result<Item, StoreError> {
        let mut tx = self.begin("insert_item").await?;

        // An early return drops `tx`, which rolls the transaction back.
        let category_id = resolve_category_tx(&mut tx, &draft.category).await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO items (name, category_id, current_stock, minimum_stock)
            VALUES (?1, ?2, 0, ?3)
            RETURNING item_id
            "#,
        )
        .bind(&draft.name)
        .bind(category_id.map(CategoryId::get))
        .bind(draft.minimum_stock)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Item {
            id: ItemId::new(id),
            name: draft.name.clone(),
            category_id,
            current_stock: 0,
            minimum_stock: draft.minimum_stock,
        })
    }

    async fn item(&self, item_id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT item_id, name, category_id, current_stock, minimum_stock
            FROM items
            WHERE item_id = ?1
            "#,
        )
        .bind(item_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("item", e))?;

        row.map(|row| ItemRow::from_row(&row).map(Item::from).map_err(decode_error))
            .transpose()
    }

    async fn items(&self) -> Result<Vec<ItemSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                i.item_id,
                i.name,
                i.category_id,
                i.current_stock,
                i.minimum_stock,
                c.name AS category_name
            FROM items i
            LEFT JOIN categories c ON c.category_id = i.category_id
            ORDER BY i.item_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("items", e))?;

        rows.iter()
            .map(|row| {
                let item = ItemRow::from_row(row).map_err(decode_error)?;
                Ok(ItemSummary {
                    item: item.into(),
                    category_name: row.try_get("category_name").map_err(decode_error)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn stock_snapshot(&self, item_id: ItemId) -> Result<Option<StockSnapshot>, StoreError> {
        // One statement, so the counter and the latest timestamp come from the
        // same read snapshot.
        let row = sqlx::query(
            r#"
            SELECT
                i.current_stock,
                (SELECT MAX(l.recorded_at) FROM ledger_entries l WHERE l.item_id = i.item_id)
                    AS last_recorded_at
            FROM items i
            WHERE i.item_id = ?1
            "#,
        )
        .bind(item_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stock_snapshot", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let on_hand: i64 = row.try_get("current_stock").map_err(decode_error)?;
        let last: Option<String> = row.try_get("last_recorded_at").map_err(decode_error)?;

        Ok(Some(StockSnapshot {
            on_hand,
            last_recorded_at: last.as_deref().map(decode_timestamp).transpose()?,
        }))
    }

    #[instrument(
        skip(self, pending),
        fields(
            item_id = %pending.item_id,
            actor_id = %pending.actor_id,
            delta = pending.change.delta.get(),
            previous = pending.change.previous
        ),
        err
    )]
    async fn commit_change(&self, pending: &PendingChange) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.begin("commit_change").await?;

        let updated = sqlx::query(
            "UPDATE items SET current_stock = ?1 WHERE item_id = ?2 AND current_stock = ?3",
        )
        .bind(pending.change.new_stock)
        .bind(pending.item_id.get())
        .bind(pending.change.previous)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_stock", e))?;

        if updated.rows_affected() == 0 {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT current_stock FROM items WHERE item_id = ?1")
                    .bind(pending.item_id.get())
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("reread_stock", e))?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(CommitOutcome::Conflict { found });
        }

        // The counter may have moved away and back since the snapshot, with
        // entries recorded in between; clamp against what is stored now.
        let last: Option<String> =
            sqlx::query_scalar("SELECT MAX(recorded_at) FROM ledger_entries WHERE item_id = ?1")
                .bind(pending.item_id.get())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("latest_recorded_at", e))?;
        let last = last.as_deref().map(decode_timestamp).transpose()?;
        let recorded_at = next_recorded_at(pending.recorded_at, last);

        let entry_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO ledger_entries (item_id, recorded_at, actor_id, delta)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING entry_id
            "#,
        )
        .bind(pending.item_id.get())
        .bind(encode_timestamp(recorded_at))
        .bind(pending.actor_id.get())
        .bind(pending.change.delta.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append_ledger_entry", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CommitOutcome::Committed(LedgerEntry {
            id: LedgerEntryId::new(entry_id),
            item_id: pending.item_id,
            recorded_at,
            actor_id: pending.actor_id,
            delta: pending.change.delta,
        }))
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    async fn history(&self, item_id: ItemId) -> Result<Vec<HistoryEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                l.entry_id,
                l.recorded_at,
                l.delta,
                l.actor_id,
                a.username
            FROM ledger_entries l
            LEFT JOIN actors a ON a.actor_id = l.actor_id
            WHERE l.item_id = ?1
            ORDER BY l.recorded_at DESC, l.entry_id DESC
            "#,
        )
        .bind(item_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("history", e))?;

        rows.iter()
            .map(|row| {
                HistoryRow::from_row(row)
                    .map_err(decode_error)
                    .and_then(HistoryEntry::try_from)
            })
            .collect()
    }

    async fn ledger_totals(&self) -> Result<Vec<LedgerTotal>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                i.item_id,
                i.current_stock,
                COALESCE(SUM(l.delta), 0) AS ledger_sum,
                COUNT(l.entry_id) AS entries
            FROM items i
            LEFT JOIN ledger_entries l ON l.item_id = i.item_id
            GROUP BY i.item_id, i.current_stock
            ORDER BY i.item_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ledger_totals", e))?;

        rows.iter()
            .map(|row| {
                let entries: i64 = row.try_get("entries").map_err(decode_error)?;
                Ok(LedgerTotal {
                    item_id: ItemId::new(row.try_get("item_id").map_err(decode_error)?),
                    current_stock: row.try_get("current_stock").map_err(decode_error)?,
                    ledger_sum: row.try_get("ledger_sum").map_err(decode_error)?,
                    entries: u64::try_from(entries).unwrap_or_default(),
                })
            })
            .collect()
    }
}

fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("invalid ledger timestamp '{raw}': {e}")))
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            if db_err.is_unique_violation() {
                return StoreError::Duplicate(msg);
            }

            // Extended result codes keep the primary code in the low byte.
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            match primary {
                // SQLITE_BUSY, SQLITE_LOCKED
                Some(5) | Some(6) => StoreError::Busy(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("timed out acquiring a connection in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Decode(format!("in {}: {}", operation, err))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

// SQLx row types

#[derive(Debug)]
struct ItemRow {
    item_id: i64,
    name: String,
    category_id: Option<i64>,
    current_stock: i64,
    minimum_stock: i64,
}

impl<'r> FromRow<'r, SqliteRow> for ItemRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            item_id: row.try_get("item_id")?,
            name: row.try_get("name")?,
            category_id: row.try_get("category_id")?,
            current_stock: row.try_get("current_stock")?,
            minimum_stock: row.try_get("minimum_stock")?,
        })
    }
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: ItemId::new(row.item_id),
            name: row.name,
            category_id: row.category_id.map(CategoryId::new),
            current_stock: row.current_stock,
            minimum_stock: row.minimum_stock,
        }
    }
}

#[derive(Debug)]
struct HistoryRow {
    entry_id: i64,
    recorded_at: String,
    delta: i64,
    actor_id: i64,
    username: Option<String>,
}

impl<'r> FromRow<'r, SqliteRow> for HistoryRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(HistoryRow {
            entry_id: row.try_get("entry_id")?,
            recorded_at: row.try_get("recorded_at")?,
            delta: row.try_get("delta")?,
            actor_id: row.try_get("actor_id")?,
            username: row.try_get("username")?,
        })
    }
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let delta = StockDelta::new(row.delta).map_err(|e| {
            StoreError::Decode(format!("ledger entry {} has invalid delta: {e}", row.entry_id))
        })?;

        Ok(HistoryEntry {
            entry_id: LedgerEntryId::new(row.entry_id),
            recorded_at: decode_timestamp(&row.recorded_at)?,
            delta,
            actor_id: ActorId::new(row.actor_id),
            actor: ActorDisplay::from_username(row.username),
        })
    }
}
