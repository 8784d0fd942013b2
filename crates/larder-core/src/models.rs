//! Typed business entities extracted from storefront HTML.
//!
//! All of these are immutable value objects created per extraction call.
//! Prices are non-negative decimal amounts in a single currency. Absent
//! optional data is `None`, never a sentinel zero — the one deliberate
//! exception is the price-parse fallback documented in the extraction
//! engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A storefront product, from a detail page or a listing card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    /// Strike-through price before discount, when shown.
    pub original_price: Option<Decimal>,
    /// Derived from `original_price` vs `price`, never scraped directly.
    pub discount_pct: Option<u32>,
    /// Sales unit, e.g. "500 g" or "1 pc".
    pub unit: Option<String>,
    /// Price per reference unit, e.g. per kilogram.
    pub unit_price: Option<Decimal>,
    pub tags: Vec<String>,
    /// Optimistic default: in stock unless an explicit negative marker
    /// appears in the markup.
    pub in_stock: bool,
    pub description: Option<String>,
    /// Nutrition facts per 100 g, keyed by label.
    pub nutrition: Option<BTreeMap<String, String>>,
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// The cart as rendered by the cart page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartSummary {
    pub items: Vec<CartItem>,
    pub total_items: u32,
    pub total_price: Decimal,
    pub delivery_fee: Option<Decimal>,
    pub final_total: Decimal,
    pub currency: String,
}

/// Order lifecycle as the storefront presents it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Processing,
    Delivering,
    Delivered,
    Cancelled,
    /// Marker text the status table does not recognise.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub total: Decimal,
    pub delivery_address: Option<DeliveryAddress>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub id: Option<String>,
    pub name: Option<String>,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub phone: Option<String>,
    pub is_default: bool,
}

/// A bookable delivery window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySlot {
    pub id: String,
    pub day: String,
    pub window: String,
    pub price: Option<Decimal>,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupPoint {
    pub id: String,
    pub name: String,
    pub address: String,
    pub opening_hours: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn product_serializes_without_absent_fields_as_nulls() {
        let product = Product {
            id: "123".into(),
            name: "Oat milk".into(),
            price: Decimal::new(5790, 2),
            original_price: None,
            discount_pct: None,
            unit: Some("1 l".into()),
            unit_price: None,
            tags: vec!["vegan".into()],
            in_stock: true,
            description: None,
            nutrition: None,
        };
        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["price"], "57.90");
        assert!(json["original_price"].is_null());
    }

    #[test]
    fn order_status_round_trips_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Delivering).unwrap();
        assert_eq!(json, "\"delivering\"");
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderStatus::Delivering);
    }
}
