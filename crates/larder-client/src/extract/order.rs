//! Order history and order detail extraction.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use larder_core::models::{CartItem, Order, OrderStatus};
use rust_decimal::Decimal;
use scraper::{ElementRef, Html};

use super::delivery::parse_address;
use super::numeric::{parse_price, parse_quantity, try_parse_price};
use super::strategy::{FieldSpec, Strategy, all_matches, any, first_match, numeric_like, resolve};

const ORDER_BLOCK: &str = "[data-order-id], .order, article.order-card";

const ORDER_ID: FieldSpec = FieldSpec {
    name: "order.id",
    strategies: &[
        Strategy::Attr {
            selector: "[data-order-id]",
            attr: "data-order-id",
        },
        Strategy::AttrPattern {
            selector: "a[href*='order']",
            attr: "href",
            pattern: r"/orders?/([A-Za-z0-9-]+)",
        },
    ],
    validate: any,
};

const ORDER_NUMBER: FieldSpec = FieldSpec {
    name: "order.number",
    strategies: &[
        Strategy::Text {
            selector: ".order-number",
        },
        Strategy::TextPattern {
            selector: ".order-header, h2",
            pattern: r"#\s*([A-Za-z0-9-]+)",
        },
    ],
    validate: any,
};

const ORDER_STATUS: FieldSpec = FieldSpec {
    name: "order.status",
    strategies: &[
        Strategy::Attr {
            selector: "[data-order-status]",
            attr: "data-order-status",
        },
        Strategy::Text {
            selector: ".order-status",
        },
        Strategy::Text { selector: ".status" },
    ],
    validate: any,
};

const ORDER_SUBTOTAL: FieldSpec = FieldSpec {
    name: "order.subtotal",
    strategies: &[
        Strategy::Text {
            selector: ".order-subtotal",
        },
        Strategy::Text {
            selector: ".subtotal",
        },
    ],
    validate: numeric_like,
};

const ORDER_DELIVERY_FEE: FieldSpec = FieldSpec {
    name: "order.delivery_fee",
    strategies: &[
        Strategy::Text {
            selector: ".delivery-fee",
        },
        Strategy::Text {
            selector: ".shipping-fee",
        },
    ],
    validate: numeric_like,
};

const ORDER_TOTAL: FieldSpec = FieldSpec {
    name: "order.total",
    strategies: &[
        Strategy::Text {
            selector: ".order-total",
        },
        Strategy::Text { selector: ".total" },
    ],
    validate: numeric_like,
};

const ORDER_CREATED: FieldSpec = FieldSpec {
    name: "order.created_at",
    strategies: &[
        Strategy::Attr {
            selector: "time.order-date, .order-date time",
            attr: "datetime",
        },
        Strategy::Text {
            selector: ".order-date",
        },
    ],
    validate: any,
};

const ORDER_UPDATED: FieldSpec = FieldSpec {
    name: "order.updated_at",
    strategies: &[
        Strategy::Attr {
            selector: "time.order-updated, .order-updated time",
            attr: "datetime",
        },
        Strategy::Text {
            selector: ".order-updated",
        },
    ],
    validate: any,
};

const ORDER_ITEM: &str = ".order-items .item, .order-item-row";

/// Status marker table, checked in order against the lowercased text.
const STATUS_MARKERS: &[(&str, OrderStatus)] = &[
    ("delivered", OrderStatus::Delivered),
    ("delivering", OrderStatus::Delivering),
    ("on the way", OrderStatus::Delivering),
    ("in transit", OrderStatus::Delivering),
    ("cancel", OrderStatus::Cancelled),
    ("storno", OrderStatus::Cancelled),
    ("process", OrderStatus::Processing),
    ("prepar", OrderStatus::Processing),
    ("created", OrderStatus::Created),
    ("received", OrderStatus::Created),
    ("placed", OrderStatus::Created),
];

/// Extract one order from a detail page.
pub fn order_detail(html: &str) -> Option<Order> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();
    let scope = first_match(root, ORDER_BLOCK).unwrap_or(root);
    parse_order(scope)
}

/// Extract the order history list; malformed blocks are skipped.
pub fn order_list(html: &str) -> Vec<Order> {
    let doc = Html::parse_document(html);
    let blocks = all_matches(doc.root_element(), ORDER_BLOCK);
    let mut orders = Vec::with_capacity(blocks.len());
    for (index, block) in blocks.into_iter().enumerate() {
        match parse_order(block) {
            Some(order) => orders.push(order),
            None => tracing::debug!(index, "Skipping malformed order block"),
        }
    }
    orders
}

fn parse_order(scope: ElementRef<'_>) -> Option<Order> {
    let id = resolve(scope, &ORDER_ID)?;
    let order_number = resolve(scope, &ORDER_NUMBER).unwrap_or_else(|| id.clone());
    let status = resolve(scope, &ORDER_STATUS)
        .map(|raw| map_status(&raw))
        .unwrap_or(OrderStatus::Unknown);

    let subtotal = parse_price(&resolve(scope, &ORDER_SUBTOTAL).unwrap_or_default());
    let delivery_fee = parse_price(&resolve(scope, &ORDER_DELIVERY_FEE).unwrap_or_default());
    let total = resolve(scope, &ORDER_TOTAL)
        .and_then(|raw| try_parse_price(&raw))
        .unwrap_or(subtotal + delivery_fee);

    Some(Order {
        id,
        order_number,
        status,
        items: order_items(scope),
        subtotal,
        delivery_fee,
        total,
        delivery_address: first_match(scope, ".delivery-address, .order-address")
            .and_then(parse_address),
        created_at: resolve(scope, &ORDER_CREATED).and_then(|raw| parse_timestamp(&raw)),
        updated_at: resolve(scope, &ORDER_UPDATED).and_then(|raw| parse_timestamp(&raw)),
    })
}

fn order_items(scope: ElementRef<'_>) -> Vec<CartItem> {
    let mut items = Vec::new();
    for row in all_matches(scope, ORDER_ITEM) {
        let Some(product_id) = resolve(
            row,
            &FieldSpec {
                name: "order_item.product_id",
                strategies: &[
                    Strategy::Attr {
                        selector: "[data-product-id]",
                        attr: "data-product-id",
                    },
                    Strategy::AttrPattern {
                        selector: "a[href]",
                        attr: "href",
                        pattern: r"/(\d+)-[^/]*/?$",
                    },
                ],
                validate: any,
            },
        ) else {
            continue;
        };
        let Some(name) = resolve(
            row,
            &FieldSpec {
                name: "order_item.name",
                strategies: &[
                    Strategy::Text {
                        selector: ".item-name",
                    },
                    Strategy::Text { selector: "a" },
                ],
                validate: any,
            },
        ) else {
            continue;
        };
        let quantity = parse_quantity(
            &resolve(
                row,
                &FieldSpec {
                    name: "order_item.quantity",
                    strategies: &[
                        Strategy::Attr {
                            selector: "[data-quantity]",
                            attr: "data-quantity",
                        },
                        Strategy::Text {
                            selector: ".quantity",
                        },
                    ],
                    validate: numeric_like,
                },
            )
            .unwrap_or_default(),
        )
        .max(1);
        let unit_price = parse_price(
            &resolve(
                row,
                &FieldSpec {
                    name: "order_item.unit_price",
                    strategies: &[
                        Strategy::Text {
                            selector: ".item-price",
                        },
                        Strategy::Text {
                            selector: ".unit-price",
                        },
                    ],
                    validate: numeric_like,
                },
            )
            .unwrap_or_default(),
        );
        items.push(CartItem {
            product_id,
            name,
            quantity,
            unit_price,
            line_total: unit_price * Decimal::from(quantity),
        });
    }
    items
}

fn map_status(raw: &str) -> OrderStatus {
    let lowered = raw.to_lowercase();
    for (marker, status) in STATUS_MARKERS {
        if lowered.contains(marker) {
            return *status;
        }
    }
    tracing::debug!(raw = %raw, "Unrecognised order status marker");
    OrderStatus::Unknown
}

/// Timestamps come as machine `datetime` attributes or localized text.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M", "%d.%m.%Y %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%d.%m.%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}
