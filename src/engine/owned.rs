//! Entitlement ledger — confirmed purchases. Keyed like the cart, but
//! append-only per item id: an owned item only leaves through `clear`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::cart::{dedupe_by_id, CourseItem};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedItem {
    #[serde(flatten)]
    pub item: CourseItem,
    /// Milliseconds since the Unix epoch when the purchase landed.
    pub purchased_at: u64,
}

impl OwnedItem {
    pub fn id(&self) -> &str {
        &self.item.id
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnedLedger {
    items: Vec<OwnedItem>,
}

impl OwnedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<OwnedItem>) -> Self {
        Self {
            items: dedupe_by_id(items, OwnedItem::id),
        }
    }

    pub fn items(&self) -> &[OwnedItem] {
        &self.items
    }

    /// Record purchased items, skipping ids already owned (including
    /// repeats within the batch) and items that fail validation.
    /// Returns the ids that were added.
    pub fn add_purchased(
        &mut self,
        items: impl IntoIterator<Item = CourseItem>,
        purchased_at: u64,
    ) -> Vec<String> {
        let mut added = Vec::new();
        for item in items {
            if let Err(e) = item.validate() {
                warn!(error = %e, "skipping invalid purchased item");
                continue;
            }
            if self.is_owned(&item.id) {
                continue;
            }
            added.push(item.id.clone());
            self.items.push(OwnedItem { item, purchased_at });
        }
        added
    }

    pub fn is_owned(&self, id: &str) -> bool {
        self.items.iter().any(|owned| owned.id() == id)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlapping_batches_add_only_new_ids() {
        let mut owned = OwnedLedger::new();
        let first = owned.add_purchased([CourseItem::new("x", 5.0)], 100);
        assert_eq!(first, vec!["x"]);
        let second = owned.add_purchased([CourseItem::new("x", 5.0), CourseItem::new("y", 7.0)], 200);
        assert_eq!(second, vec!["y"]);

        assert_eq!(owned.len(), 2);
        assert_eq!(owned.items()[0].purchased_at, 100);
        assert_eq!(owned.items()[1].purchased_at, 200);
        assert!(owned.is_owned("x"));
        assert!(owned.is_owned("y"));
    }

    #[test]
    fn duplicates_within_a_batch_land_once() {
        let mut owned = OwnedLedger::new();
        let added = owned.add_purchased([CourseItem::new("x", 1.0), CourseItem::new("x", 1.0)], 1);
        assert_eq!(added, vec!["x"]);
        assert_eq!(owned.len(), 1);
    }

    #[test]
    fn invalid_items_are_skipped() {
        let mut owned = OwnedLedger::new();
        let added = owned.add_purchased([CourseItem::new("bad", -1.0), CourseItem::new("ok", 0.0)], 1);
        assert_eq!(added, vec!["ok"]);
    }

    #[test]
    fn clear_resets_ownership() {
        let mut owned = OwnedLedger::new();
        owned.add_purchased([CourseItem::new("x", 1.0)], 1);
        owned.clear();
        assert!(!owned.is_owned("x"));
        assert!(owned.is_empty());
    }

    #[test]
    fn serializes_purchased_at_beside_item_fields() {
        let owned = OwnedItem {
            item: CourseItem::new("x", 2.0).with_detail("title", "X"),
            purchased_at: 42,
        };
        let json = serde_json::to_value(&owned).unwrap();
        assert_eq!(json, json!({"id": "x", "price": 2.0, "title": "X", "purchasedAt": 42}));
        let back: OwnedItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, owned);
    }
}
