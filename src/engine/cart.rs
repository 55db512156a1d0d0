//! Entitlement cart — the selectable items a user intends to buy.
//!
//! Items are unique by id. Adding an item twice is a no-op, removing an
//! absent item is a no-op, and the total is always recomputed from the
//! items, never stored.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use crate::error::{EngineError, Result};

/// A purchasable item as supplied by the content listing. Only `id` and
/// `price` mean anything to the engine; everything else rides along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseItem {
    pub id: String,
    pub price: f64,
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

impl CourseItem {
    pub fn new(id: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            price,
            details: serde_json::Map::new(),
        }
    }

    pub fn with_detail(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.details.insert(field.to_string(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidItem("item id is empty".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(EngineError::InvalidItem(format!(
                "item {} has invalid price {}",
                self.id, self.price
            )));
        }
        Ok(())
    }
}

/// Keep the first occurrence of each id.
pub(crate) fn dedupe_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    let total = items.len();
    let kept: Vec<T> = items
        .into_iter()
        .filter(|item| seen.insert(id(item).to_string()))
        .collect();
    if kept.len() < total {
        warn!(dropped = total - kept.len(), "dropped duplicate stored items");
    }
    kept
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    items: Vec<CourseItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cart from stored items, dropping invalid entries and duplicate ids.
    pub fn from_items(items: Vec<CourseItem>) -> Self {
        let valid = items
            .into_iter()
            .filter(|item| match item.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "dropping invalid stored cart item");
                    false
                }
            })
            .collect();
        Self {
            items: dedupe_by_id(valid, |item| item.id.as_str()),
        }
    }

    pub fn items(&self) -> &[CourseItem] {
        &self.items
    }

    /// Append an item unless its id is already present. Returns whether it was added.
    pub fn add_item(&mut self, item: CourseItem) -> Result<bool> {
        item.validate()?;
        if self.contains(&item.id) {
            return Ok(false);
        }
        self.items.push(item);
        Ok(true)
    }

    /// Remove the item with `id`. Returns whether anything was removed.
    pub fn remove_item(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn total(&self) -> f64 {
        self.items.iter().map(|item| item.price).sum()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| item.id == id)
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
    fn add_same_id_twice_keeps_one() {
        let mut cart = Cart::new();
        assert!(cart.add_item(CourseItem::new("a", 10.0)).unwrap());
        assert!(!cart.add_item(CourseItem::new("a", 10.0)).unwrap());
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.total(), 10.0);
    }

    #[test]
    fn remove_updates_total_and_contains() {
        let mut cart = Cart::new();
        cart.add_item(CourseItem::new("a", 10.0)).unwrap();
        cart.add_item(CourseItem::new("b", 5.0)).unwrap();
        assert!(cart.remove_item("a"));
        assert_eq!(cart.total(), 5.0);
        assert!(!cart.contains("a"));
        assert!(cart.contains("b"));
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut cart = Cart::new();
        cart.add_item(CourseItem::new("a", 1.0)).unwrap();
        assert!(!cart.remove_item("zzz"));
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn clear_empties_cart() {
        let mut cart = Cart::new();
        cart.add_item(CourseItem::new("a", 1.0)).unwrap();
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total(), 0.0);
    }

    #[test]
    fn rejects_invalid_items() {
        let mut cart = Cart::new();
        assert!(cart.add_item(CourseItem::new("", 1.0)).is_err());
        assert!(cart.add_item(CourseItem::new("neg", -1.0)).is_err());
        assert!(cart.add_item(CourseItem::new("nan", f64::NAN)).is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn details_ride_along_through_json() {
        let item = CourseItem::new("rust-101", 49.5).with_detail("title", "Intro to Rust");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json, json!({"id": "rust-101", "price": 49.5, "title": "Intro to Rust"}));
        let back: CourseItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn from_items_drops_duplicates_and_invalid() {
        let cart = Cart::from_items(vec![
            CourseItem::new("a", 1.0),
            CourseItem::new("b", -2.0),
            CourseItem::new("a", 9.0),
            CourseItem::new("c", 3.0),
        ]);
        let ids: Vec<&str> = cart.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(cart.total(), 4.0);
    }
}
