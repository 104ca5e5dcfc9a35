//! Ledger records: the append-only audit trail of stock changes.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ActorId, ItemId, LedgerEntryId};

use crate::stock::StockDelta;

/// One committed stock change. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub item_id: ItemId,
    pub recorded_at: DateTime<Utc>,
    pub actor_id: ActorId,
    pub delta: StockDelta,
}

/// Best-effort display of the actor behind a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorDisplay {
    Known(String),
    /// The actor reference no longer resolves.
    Unknown,
}

impl ActorDisplay {
    pub fn from_username(username: Option<String>) -> Self {
        username.map_or(ActorDisplay::Unknown, ActorDisplay::Known)
    }
}

impl core::fmt::Display for ActorDisplay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ActorDisplay::Known(name) => f.write_str(name),
            ActorDisplay::Unknown => f.write_str("unknown"),
        }
    }
}

/// History row handed to the presentation layer (most recent first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entry_id: LedgerEntryId,
    pub recorded_at: DateTime<Utc>,
    pub delta: StockDelta,
    pub actor_id: ActorId,
    pub actor: ActorDisplay,
}

/// Timestamp for the next ledger entry of an item.
///
/// Timestamps are kept at microsecond precision (what the store persists) and
/// strictly increase per item, even when the wall clock stalls or steps back.
pub fn next_recorded_at(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    match last {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    }
}
