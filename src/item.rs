use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::selection::{CategorySelection, LocationSelection};

/// Per-owner cap on concurrently tracked items, admission-controlled before
/// the item flow starts and enforced again by the store.
pub const MAX_ITEMS_PER_OWNER: usize = 10;

/// Item-name length bounds, inclusive.
pub const ITEM_NAME_MIN: usize = 3;
pub const ITEM_NAME_MAX: usize = 64;

pub fn valid_item_name(name: &str) -> bool {
    let len = name.chars().count();
    (ITEM_NAME_MIN..=ITEM_NAME_MAX).contains(&len)
}

/// A saved search. Immutable once created except for the poll watermark;
/// "editing" is removal plus re-creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: Uuid,
    /// Opaque recipient identifier from the messaging channel.
    pub owner_id: i64,
    pub name: String,
    /// Normalized, non-empty, in insertion order.
    pub categories: Vec<CategorySelection>,
    pub locations: Vec<LocationSelection>,
    /// Compiled search URL.
    pub link: String,
    pub created_at: DateTime<Utc>,
    /// Publish time of the newest listing already notified about.
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl TrackedItem {
    pub fn new(
        owner_id: i64,
        name: String,
        categories: Vec<CategorySelection>,
        locations: Vec<LocationSelection>,
        link: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            categories,
            locations,
            link,
            created_at: Utc::now(),
            last_seen_at: None,
        }
    }

    /// Only listings published strictly after this instant are new.
    pub fn watermark(&self) -> DateTime<Utc> {
        self.last_seen_at.unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_name_bounds() {
        assert!(!valid_item_name("ab"));
        assert!(valid_item_name("abc"));
        assert!(valid_item_name(&"x".repeat(64)));
        assert!(!valid_item_name(&"x".repeat(65)));
        // multi-byte characters count as characters, not bytes
        assert!(valid_item_name("äää"));
    }

    #[test]
    fn test_watermark_falls_back_to_created_at() {
        let item = TrackedItem::new(1, "bike".into(), vec![], vec![], "x".into());
        assert_eq!(item.watermark(), item.created_at);
    }
}
