use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::domain::money::Money;

// ============================================================================
// Bag Value Objects
// ============================================================================

pub const FOOD_CATEGORY: &str = "food";
pub const PLATE_ITEM_NAME: &str = "plate";

/// Catalogue entry with its remaining stock, in portions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub price: Money,
    pub portions: u32,
}

impl FoodItem {
    pub fn new(name: impl Into<String>, category: impl Into<String>, price: Money, portions: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            price,
            portions,
        }
    }

    pub fn is_plate(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case(PLATE_ITEM_NAME)
    }

    /// Plates are not stock-tracked.
    pub fn can_order_portions(&self, requested: u32) -> bool {
        self.is_plate() || self.portions >= requested
    }
}

/// One line in a bag. Price and plate fee are snapshots taken when the item
/// was bagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BagItem {
    pub id: Uuid,
    pub food_item_id: Option<Uuid>,
    pub name: String,
    pub category: String,
    pub unit_price: Money,
    pub portions: u32,
    pub plates: u32,
    pub plate_fee: Money,
}

impl BagItem {
    pub fn food(item: &FoodItem, portions: u32, plates: u32, plate_fee: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            food_item_id: Some(item.id),
            name: item.name.clone(),
            category: item.category.clone(),
            unit_price: item.price,
            portions,
            plates,
            plate_fee,
        }
    }

    /// Item with no catalogue entry (drinks, extras).
    pub fn other(name: impl Into<String>, category: impl Into<String>, unit_price: Money, portions: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            food_item_id: None,
            name: name.into(),
            category: category.into(),
            unit_price,
            portions,
            plates: 0,
            plate_fee: Money::ZERO,
        }
    }

    pub fn is_food_category(&self) -> bool {
        self.category.trim().eq_ignore_ascii_case(FOOD_CATEGORY)
    }

    pub fn is_plate_item(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case(PLATE_ITEM_NAME)
    }

    pub fn food_cost(&self) -> Money {
        self.unit_price.times(self.portions)
    }

    pub fn plate_cost(&self) -> Money {
        if self.is_food_category() && !self.is_plate_item() {
            self.plate_fee.times(self.plates)
        } else {
            Money::ZERO
        }
    }

    pub fn subtotal(&self) -> Money {
        self.food_cost() + self.plate_cost()
    }

    /// Stock to reserve for this line, if it draws on a catalogue item.
    pub fn stock_demand(&self) -> Option<(Uuid, u32)> {
        if self.is_plate_item() {
            return None;
        }
        self.food_item_id.map(|id| (id, self.portions))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bag {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub items: Vec<BagItem>,
    pub created_at: DateTime<Utc>,
}

impl Bag {
    pub fn new(owner_id: Uuid, name: impl Into<String>, items: Vec<BagItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            items,
            created_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> Money {
        self.items.iter().map(BagItem::subtotal).sum()
    }

    pub fn has_food_items(&self) -> bool {
        self.items.iter().any(BagItem::is_food_category)
    }

    /// A bag holding food must have at least one food line with plates.
    pub fn satisfies_plate_requirement(&self) -> bool {
        !self.has_food_items()
            || self.items.iter().any(|item| item.is_food_category() && item.plates > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jollof() -> FoodItem {
        FoodItem::new("Jollof Rice", "Food", Money::from_major(1_500), 20)
    }

    #[test]
    fn test_subtotal_includes_plate_cost_for_food() {
        let item = BagItem::food(&jollof(), 2, 1, Money::from_major(200));
        assert_eq!(item.food_cost(), Money::from_major(3_000));
        assert_eq!(item.plate_cost(), Money::from_major(200));
        assert_eq!(item.subtotal(), Money::from_major(3_200));
    }

    #[test]
    fn test_plate_item_has_no_plate_cost_or_stock_demand() {
        let plate = FoodItem::new("Plate", "food", Money::from_major(100), 0);
        let item = BagItem::food(&plate, 1, 3, Money::from_major(200));
        assert_eq!(item.plate_cost(), Money::ZERO);
        assert!(item.stock_demand().is_none());
        assert!(plate.can_order_portions(5));
    }

    #[test]
    fn test_plate_requirement() {
        let owner = Uuid::new_v4();
        let drinks = Bag::new(owner, "Drinks", vec![BagItem::other("Zobo", "drinks", Money::from_major(300), 2)]);
        assert!(drinks.satisfies_plate_requirement());

        let no_plates = Bag::new(owner, "Lunch", vec![BagItem::food(&jollof(), 1, 0, Money::from_major(200))]);
        assert!(!no_plates.satisfies_plate_requirement());

        let with_plates = Bag::new(owner, "Lunch", vec![BagItem::food(&jollof(), 1, 1, Money::from_major(200))]);
        assert!(with_plates.satisfies_plate_requirement());
    }

    #[test]
    fn test_stock_check() {
        let item = jollof();
        assert!(item.can_order_portions(20));
        assert!(!item.can_order_portions(21));
    }
}
