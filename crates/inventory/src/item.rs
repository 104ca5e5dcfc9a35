use serde::{Deserialize, Serialize};

use stockledger_core::{CategoryId, DomainError, DomainResult, ItemId};

use crate::category::validate_category_name;

/// Catalog item with its denormalized stock counter.
///
/// `current_stock` is only ever changed by the stock mutation engine and is
/// always equal to the sum of the item's ledger deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category_id: Option<CategoryId>,
    pub current_stock: i64,
    pub minimum_stock: i64,
}

impl Item {
    /// Stock has fallen below the alerting threshold.
    pub fn is_below_minimum(&self) -> bool {
        self.current_stock < self.minimum_stock
    }
}

/// Listing row: an item joined with its category name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item: Item,
    pub category_name: Option<String>,
}

/// How a new item picks its category.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CategoryChoice {
    #[default]
    None,
    Existing(CategoryId),
    /// Create a category with this name as part of item creation.
    New(String),
}

/// Command: create a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    pub category: CategoryChoice,
    pub initial_stock: i64,
    pub minimum_stock: i64,
}

impl NewItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: CategoryChoice::None,
            initial_stock: 0,
            minimum_stock: 0,
        }
    }

    pub fn with_category(mut self, category: CategoryChoice) -> Self {
        self.category = category;
        self
    }

    pub fn with_initial_stock(mut self, initial_stock: i64) -> Self {
        self.initial_stock = initial_stock;
        self
    }

    pub fn with_minimum_stock(mut self, minimum_stock: i64) -> Self {
        self.minimum_stock = minimum_stock;
        self
    }

    /// Validate and normalize the command before anything is written.
    ///
    /// Negative initial stock is rejected: initial stock is applied as an
    /// ordinary positive delta from zero.
    pub fn validated(self) -> DomainResult<Self> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if self.initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }
        if self.minimum_stock < 0 {
            return Err(DomainError::validation("minimum stock cannot be negative"));
        }
        let category = match self.category {
            CategoryChoice::New(category) => CategoryChoice::New(validate_category_name(&category)?),
            other => other,
        };

        Ok(Self {
            name: name.to_string(),
            category,
            initial_stock: self.initial_stock,
            minimum_stock: self.minimum_stock,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_trims_names() {
        let cmd = NewItem::new("  Espresso beans ")
            .with_category(CategoryChoice::New(" Coffee ".to_string()))
            .validated()
            .unwrap();
        assert_eq!(cmd.name, "Espresso beans");
        assert_eq!(cmd.category, CategoryChoice::New("Coffee".to_string()));
    }

    #[test]
    fn rejects_empty_name() {
        let err = NewItem::new("   ").validated().unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty name"),
        }
    }

    #[test]
    fn rejects_negative_initial_stock() {
        let err = NewItem::new("Milk").with_initial_stock(-1).validated().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("initial stock")));
    }

    #[test]
    fn rejects_negative_minimum_stock() {
        assert!(NewItem::new("Milk").with_minimum_stock(-2).validated().is_err());
    }

    #[test]
    fn rejects_blank_new_category() {
        let err = NewItem::new("Milk")
            .with_category(CategoryChoice::New("  ".to_string()))
            .validated()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn below_minimum_is_strict() {
        let mut item = Item {
            id: ItemId::new(1),
            name: "Cups".to_string(),
            category_id: None,
            current_stock: 5,
            minimum_stock: 5,
        };
        assert!(!item.is_below_minimum());
        item.current_stock = 4;
        assert!(item.is_below_minimum());
    }
}
