//! Catalog item as seen by the inventory store.
//!
//! Name, price, photo and category belong to the catalog; only `quantity`
//! is changed here, and only downwards through an order decrement.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub quantity: i64,
}

impl Item {
    pub fn new(id: i64, name: impl Into<String>, price: Decimal, quantity: i64) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            quantity,
        }
    }

    pub fn has_stock_for(&self, quantity: i64) -> bool {
        self.quantity >= quantity
    }
}
