//! Product extraction: detail pages and listing cards.
//!
//! Identity fields (id, name) missing after every strategy fail the whole
//! entity. Enrichment fields (description, unit, tags, nutrition) degrade
//! to absent. Availability defaults to in-stock unless an explicit
//! negative marker is found — on this storefront the absence of a
//! positive signal means nothing.

use std::collections::BTreeMap;

use larder_core::models::Product;
use scraper::{ElementRef, Html};

use super::numeric::{discount_pct, parse_price, try_parse_price};
use super::strategy::{
    FieldSpec, Strategy, all_matches, any, collapse_ws, first_match, numeric_like, resolve,
    text_of,
};

const PRODUCT_ID: FieldSpec = FieldSpec {
    name: "product.id",
    strategies: &[
        Strategy::Attr {
            selector: "[data-product-id]",
            attr: "data-product-id",
        },
        Strategy::Attr {
            selector: "input[name='productId']",
            attr: "value",
        },
        Strategy::AttrPattern {
            selector: "link[rel='canonical']",
            attr: "href",
            pattern: r"/(\d+)-[^/]*/?$",
        },
        Strategy::AttrPattern {
            selector: "a[href]",
            attr: "href",
            pattern: r"/(\d+)-[^/]*/?$",
        },
    ],
    validate: numeric_like,
};

const PRODUCT_NAME: FieldSpec = FieldSpec {
    name: "product.name",
    strategies: &[
        Strategy::Attr {
            selector: "[data-product-name]",
            attr: "data-product-name",
        },
        Strategy::Text {
            selector: "h1.product-name",
        },
        Strategy::Text {
            selector: ".product-name",
        },
        Strategy::Text {
            selector: "h1[itemprop='name'], [itemprop='name']",
        },
    ],
    validate: any,
};

const PRODUCT_PRICE: FieldSpec = FieldSpec {
    name: "product.price",
    strategies: &[
        Strategy::Attr {
            selector: "[data-price]",
            attr: "data-price",
        },
        Strategy::Attr {
            selector: "meta[itemprop='price']",
            attr: "content",
        },
        Strategy::Text {
            selector: ".price-current",
        },
        Strategy::Text { selector: ".price" },
    ],
    validate: numeric_like,
};

const PRODUCT_ORIGINAL_PRICE: FieldSpec = FieldSpec {
    name: "product.original_price",
    strategies: &[
        Strategy::Attr {
            selector: "[data-original-price]",
            attr: "data-original-price",
        },
        Strategy::Text {
            selector: ".price-original",
        },
        Strategy::Text {
            selector: "del, s.price",
        },
    ],
    validate: numeric_like,
};

const PRODUCT_UNIT: FieldSpec = FieldSpec {
    name: "product.unit",
    strategies: &[
        Strategy::Attr {
            selector: "[data-unit]",
            attr: "data-unit",
        },
        Strategy::Text {
            selector: ".product-unit",
        },
        Strategy::Text { selector: ".unit" },
    ],
    validate: any,
};

const PRODUCT_UNIT_PRICE: FieldSpec = FieldSpec {
    name: "product.unit_price",
    strategies: &[
        Strategy::Attr {
            selector: "[data-unit-price]",
            attr: "data-unit-price",
        },
        Strategy::Text {
            selector: ".price-per-unit",
        },
        Strategy::Text {
            selector: ".unit-price",
        },
    ],
    validate: numeric_like,
};

const PRODUCT_DESCRIPTION: FieldSpec = FieldSpec {
    name: "product.description",
    strategies: &[
        Strategy::Text {
            selector: ".product-description",
        },
        Strategy::Text {
            selector: "[itemprop='description']",
        },
        Strategy::Text {
            selector: "#description",
        },
    ],
    validate: any,
};

/// Markers that explicitly say "you cannot buy this right now".
const UNAVAILABLE_SELECTORS: &[&str] = &[
    "[data-availability='out-of-stock']",
    ".sold-out",
    ".out-of-stock",
    ".unavailable",
];

const UNAVAILABLE_PHRASES: &[&str] = &["sold out", "unavailable", "out of stock", "not available"];

const TAG_SELECTOR: &str = ".product-tags .tag, .product-tag, [data-tag]";

const LIST_ITEM_SELECTORS: &[&str] = &[
    "[data-product-id]",
    "article.product-card",
    ".product-card",
    ".product-item",
    "li.product",
];

const NUTRITION_ROW_SELECTOR: &str = ".nutrition-table tr, table.nutrition tr";

/// Extract a single product from a detail page. `None` when the identity
/// fields cannot be recovered.
pub fn product_detail(html: &str) -> Option<Product> {
    let doc = Html::parse_document(html);
    parse_product(doc.root_element())
}

/// Extract every recognisable product from a category/search page. A
/// malformed card is skipped; the result is however many parsed.
pub fn product_list(html: &str) -> Vec<Product> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    for selector in LIST_ITEM_SELECTORS {
        let cards = all_matches(root, selector);
        if cards.is_empty() {
            continue;
        }
        let mut products = Vec::with_capacity(cards.len());
        for (index, card) in cards.iter().enumerate() {
            match parse_product(*card) {
                Some(product) => products.push(product),
                None => {
                    tracing::debug!(index, selector, "Skipping malformed listing card");
                }
            }
        }
        if !products.is_empty() {
            return products;
        }
    }
    Vec::new()
}

fn parse_product(scope: ElementRef<'_>) -> Option<Product> {
    // Identity fields: miss here fails the whole entity.
    let id = resolve(scope, &PRODUCT_ID)?;
    let name = resolve(scope, &PRODUCT_NAME)?;

    let price = parse_price(&resolve(scope, &PRODUCT_PRICE).unwrap_or_default());
    let original_price =
        resolve(scope, &PRODUCT_ORIGINAL_PRICE).and_then(|raw| try_parse_price(&raw));
    let discount = original_price.and_then(|orig| discount_pct(orig, price));

    Some(Product {
        id,
        name,
        price,
        original_price,
        discount_pct: discount,
        unit: resolve(scope, &PRODUCT_UNIT),
        unit_price: resolve(scope, &PRODUCT_UNIT_PRICE).and_then(|raw| try_parse_price(&raw)),
        tags: tags(scope),
        in_stock: in_stock(scope),
        description: resolve(scope, &PRODUCT_DESCRIPTION),
        nutrition: nutrition(scope),
    })
}

fn tags(scope: ElementRef<'_>) -> Vec<String> {
    let mut tags: Vec<String> = all_matches(scope, TAG_SELECTOR)
        .into_iter()
        .map(|el| collapse_ws(&text_of(el)))
        .filter(|t| !t.is_empty())
        .collect();
    tags.sort();
    tags.dedup();
    tags
}

/// Optimistic availability: only an explicit negative marker flips this.
fn in_stock(scope: ElementRef<'_>) -> bool {
    for selector in UNAVAILABLE_SELECTORS {
        if first_match(scope, selector).is_some() {
            return false;
        }
    }
    if let Some(el) = first_match(scope, ".availability, [data-availability]") {
        let text = collapse_ws(&text_of(el)).to_lowercase();
        if UNAVAILABLE_PHRASES.iter().any(|p| text.contains(p)) {
            return false;
        }
    }
    true
}

fn nutrition(scope: ElementRef<'_>) -> Option<BTreeMap<String, String>> {
    let mut facts = BTreeMap::new();
    for row in all_matches(scope, NUTRITION_ROW_SELECTOR) {
        let cells = all_matches(row, "th, td");
        if cells.len() >= 2 {
            let key = collapse_ws(&text_of(cells[0]));
            let value = collapse_ws(&text_of(cells[1]));
            if !key.is_empty() && !value.is_empty() {
                facts.insert(key, value);
            }
        }
    }
    if facts.is_empty() { None } else { Some(facts) }
}
