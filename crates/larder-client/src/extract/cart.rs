//! Cart page extraction.

use larder_core::models::{CartItem, CartSummary};
use rust_decimal::Decimal;
use scraper::{ElementRef, Html};

use super::numeric::{parse_price, parse_quantity, try_parse_price};
use super::strategy::{FieldSpec, Strategy, all_matches, any, first_match, numeric_like, resolve};

const CART_CONTAINER: &str = "[data-cart], #cart, .cart";

const CART_ITEM: &str = "[data-cart-item], .cart-item, tr.cart-row";

const ITEM_PRODUCT_ID: FieldSpec = FieldSpec {
    name: "cart_item.product_id",
    strategies: &[
        Strategy::Attr {
            selector: "[data-product-id]",
            attr: "data-product-id",
        },
        Strategy::Attr {
            selector: "input[name='productId']",
            attr: "value",
        },
    ],
    validate: any,
};

const ITEM_NAME: FieldSpec = FieldSpec {
    name: "cart_item.name",
    strategies: &[
        Strategy::Text {
            selector: ".item-name",
        },
        Strategy::Text { selector: ".name" },
        Strategy::Text { selector: "a" },
    ],
    validate: any,
};

const ITEM_QUANTITY: FieldSpec = FieldSpec {
    name: "cart_item.quantity",
    strategies: &[
        Strategy::Attr {
            selector: "input[name='quantity']",
            attr: "value",
        },
        Strategy::Attr {
            selector: "[data-quantity]",
            attr: "data-quantity",
        },
        Strategy::Text {
            selector: ".quantity",
        },
    ],
    validate: numeric_like,
};

const ITEM_UNIT_PRICE: FieldSpec = FieldSpec {
    name: "cart_item.unit_price",
    strategies: &[
        Strategy::Text {
            selector: ".item-price",
        },
        Strategy::Text {
            selector: ".unit-price",
        },
    ],
    validate: numeric_like,
};

const ITEM_LINE_TOTAL: FieldSpec = FieldSpec {
    name: "cart_item.line_total",
    strategies: &[
        Strategy::Text {
            selector: ".line-total",
        },
        Strategy::Text {
            selector: ".item-total",
        },
    ],
    validate: numeric_like,
};

const CART_TOTAL: FieldSpec = FieldSpec {
    name: "cart.total",
    strategies: &[
        Strategy::Attr {
            selector: "[data-cart-total]",
            attr: "data-cart-total",
        },
        Strategy::Text {
            selector: ".cart-total",
        },
        Strategy::Text {
            selector: ".subtotal",
        },
    ],
    validate: numeric_like,
};

const DELIVERY_FEE: FieldSpec = FieldSpec {
    name: "cart.delivery_fee",
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

const FINAL_TOTAL: FieldSpec = FieldSpec {
    name: "cart.final_total",
    strategies: &[
        Strategy::Text {
            selector: ".final-total",
        },
        Strategy::Text {
            selector: ".grand-total",
        },
    ],
    validate: numeric_like,
};

/// Currency markers in rendered totals, checked in order.
const CURRENCY_MARKERS: &[(&str, &str)] = &[
    ("Kč", "CZK"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("$", "USD"),
    ("zł", "PLN"),
];

const DEFAULT_CURRENCY: &str = "CZK";

/// Extract the cart. `None` when the page has no recognisable cart
/// container at all; an empty cart is a valid, empty summary.
pub fn cart_summary(html: &str) -> Option<CartSummary> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();
    let cart = first_match(root, CART_CONTAINER)?;

    let mut items = Vec::new();
    for (index, row) in all_matches(cart, CART_ITEM).into_iter().enumerate() {
        match parse_item(row) {
            Some(item) => items.push(item),
            None => tracing::debug!(index, "Skipping malformed cart row"),
        }
    }

    let total_price = parse_price(&resolve(cart, &CART_TOTAL).unwrap_or_default());
    let delivery_fee = resolve(cart, &DELIVERY_FEE).and_then(|raw| try_parse_price(&raw));
    let final_total = resolve(cart, &FINAL_TOTAL)
        .and_then(|raw| try_parse_price(&raw))
        .unwrap_or(total_price + delivery_fee.unwrap_or(Decimal::ZERO));

    let total_items = items.iter().map(|i| i.quantity).sum();

    Some(CartSummary {
        currency: detect_currency(cart),
        items,
        total_items,
        total_price,
        delivery_fee,
        final_total,
    })
}

fn parse_item(row: ElementRef<'_>) -> Option<CartItem> {
    let product_id = resolve(row, &ITEM_PRODUCT_ID)?;
    let name = resolve(row, &ITEM_NAME)?;
    let quantity = parse_quantity(&resolve(row, &ITEM_QUANTITY).unwrap_or_default()).max(1);
    let unit_price = parse_price(&resolve(row, &ITEM_UNIT_PRICE).unwrap_or_default());
    let line_total = resolve(row, &ITEM_LINE_TOTAL)
        .and_then(|raw| try_parse_price(&raw))
        .unwrap_or(unit_price * Decimal::from(quantity));

    Some(CartItem {
        product_id,
        name,
        quantity,
        unit_price,
        line_total,
    })
}

fn detect_currency(cart: ElementRef<'_>) -> String {
    let hay = resolve(
        cart,
        &FieldSpec {
            name: "cart.currency_probe",
            strategies: &[
                Strategy::Text {
                    selector: ".final-total",
                },
                Strategy::Text {
                    selector: ".cart-total",
                },
            ],
            validate: any,
        },
    )
    .unwrap_or_default();
    for (marker, code) in CURRENCY_MARKERS {
        if hay.contains(marker) {
            return (*code).to_string();
        }
    }
    DEFAULT_CURRENCY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    const CART_PAGE: &str = r#"
        <div id="cart">
            <div class="cart-item" data-product-id="11">
                <span class="item-name">Oat Milk</span>
                <input name="quantity" value="2">
                <span class="item-price">57,90 Kč</span>
                <span class="line-total">115,80 Kč</span>
            </div>
            <div class="cart-item" data-product-id="12">
                <span class="item-name">Rye Bread</span>
                <input name="quantity" value="1">
                <span class="item-price">42,00 Kč</span>
                <span class="line-total">42,00 Kč</span>
            </div>
            <div class="cart-total">157,80 Kč</div>
            <div class="delivery-fee">49,00 Kč</div>
            <div class="final-total">206,80 Kč</div>
        </div>"#;

    #[test]
    fn full_cart_extraction() {
        let cart = cart_summary(CART_PAGE).unwrap();
        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.items[0].product_id, "11");
        assert_eq!(cart.items[0].quantity, 2);
        assert_eq!(cart.items[0].line_total, dec("115.80"));
        assert_eq!(cart.total_items, 3);
        assert_eq!(cart.total_price, dec("157.80"));
        assert_eq!(cart.delivery_fee, Some(dec("49.00")));
        assert_eq!(cart.final_total, dec("206.80"));
        assert_eq!(cart.currency, "CZK");
    }

    #[test]
    fn page_without_cart_container_is_none() {
        assert!(cart_summary("<html><body><h1>404</h1></body></html>").is_none());
    }

    #[test]
    fn empty_cart_is_a_valid_summary() {
        let cart = cart_summary(r#"<div class="cart"><p>Your cart is empty</p></div>"#).unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(cart.total_items, 0);
        assert_eq!(cart.total_price, Decimal::ZERO);
        assert_eq!(cart.delivery_fee, None);
    }

    #[test]
    fn malformed_row_is_skipped() {
        let html = r#"
            <div class="cart">
                <div class="cart-item" data-product-id="1">
                    <span class="item-name">A</span>
                    <span class="item-price">10,00</span>
                </div>
                <div class="cart-item"><span class="item-price">5,00</span></div>
                <div class="cart-total">10,00</div>
            </div>"#;
        let cart = cart_summary(html).unwrap();
        assert_eq!(cart.items.len(), 1);
    }

    #[test]
    fn line_total_falls_back_to_computed() {
        let html = r#"
            <div class="cart">
                <div class="cart-item" data-product-id="1">
                    <span class="item-name">A</span>
                    <input name="quantity" value="3">
                    <span class="item-price">10,50</span>
                </div>
            </div>"#;
        let cart = cart_summary(html).unwrap();
        assert_eq!(cart.items[0].line_total, dec("31.50"));
    }

    #[test]
    fn missing_delivery_fee_is_absent_not_zero() {
        let html = r#"
            <div class="cart">
                <div class="cart-total">10,00 €</div>
                <div class="final-total">10,00 €</div>
            </div>"#;
        let cart = cart_summary(html).unwrap();
        assert_eq!(cart.delivery_fee, None);
        assert_eq!(cart.currency, "EUR");
    }
}
