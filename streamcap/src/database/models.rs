//! Database row models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One tracked broadcast source.
///
/// Invariant maintained by the write paths: `pid` is only ever non-null
/// while `follow` is non-null and `block_date` is null.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TargetRecord {
    pub name: String,
    pub site: String,
    pub follow: Option<String>,
    pub block_date: Option<String>,
    pub domain: Option<String>,
    pub pid: Option<i64>,
    pub recorded: i64,
    pub followers: Option<i64>,
    pub viewers: Option<i64>,
    pub most_viewers: i64,
    pub last_broadcast: Option<String>,
    pub last_capture: Option<String>,
    pub first_seen: Option<String>,
    pub notes: Option<String>,
}

impl TargetRecord {
    pub fn is_followed(&self) -> bool {
        self.follow.is_some()
    }

    pub fn is_blocked(&self) -> bool {
        self.block_date.is_some()
    }

    pub fn is_capturing(&self) -> bool {
        self.pid.is_some()
    }
}

/// Follow/block/domain snapshot read during capture draining.
#[derive(Debug, Clone, FromRow)]
pub struct CaptureStatus {
    pub follow: Option<String>,
    pub block_date: Option<String>,
    pub domain: Option<String>,
}

impl CaptureStatus {
    pub fn followed(&self) -> bool {
        self.follow.is_some()
    }

    pub fn blocked(&self) -> bool {
        self.block_date.is_some()
    }
}

/// One room row from a listing scan: (name, followers, viewers).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomRow {
    pub name: String,
    pub followers: i64,
    pub viewers: i64,
}

/// Listing row for the console `cap` / `offline` tables.
#[derive(Debug, Clone, FromRow)]
pub struct ListingRow {
    pub name: String,
    pub sort_value: Option<String>,
    pub recorded: i64,
}
