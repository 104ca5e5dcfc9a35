//! Ledger audit: checks that every item's stock counter equals the sum of its
//! ledger deltas in the configured database.
//!
//! Exit codes: `0` consistent, `1` discrepancies found, `2` could not run.

use std::process::ExitCode;

use tracing::{error, info};

use stockledger_infra::{SqliteStockStore, StockQuery, StoreConfig};

#[tokio::main]
async fn main() -> ExitCode {
    stockledger_observability::init();

    let config = match StoreConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    let store = match SqliteStockStore::connect(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, database_url = %config.database_url, "failed to open database");
            return ExitCode::from(2);
        }
    };

    let outcome = StockQuery::new(store.clone()).audit().await;
    store.close().await;

    match outcome {
        Ok(report) if report.is_consistent() => {
            info!(items_checked = report.items_checked, "ledger consistent");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            error!(
                discrepancies = report.discrepancies.len(),
                "ledger inconsistent"
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "audit failed");
            ExitCode::from(2)
        }
    }
}
