//! Delivery address, delivery slot, and pickup point extraction.

use larder_core::models::{DeliveryAddress, DeliverySlot, PickupPoint};
use scraper::{ElementRef, Html};

use super::numeric::try_parse_price;
use super::strategy::{FieldSpec, Strategy, all_matches, any, first_match, resolve};

const ADDRESS_BLOCK: &str = "[data-address-id], .address-card, .delivery-address";

const ADDRESS_STREET: FieldSpec = FieldSpec {
    name: "address.street",
    strategies: &[
        Strategy::Text { selector: ".street" },
        Strategy::Text {
            selector: ".address-line1",
        },
    ],
    validate: any,
};

const ADDRESS_CITY: FieldSpec = FieldSpec {
    name: "address.city",
    strategies: &[
        Strategy::Text { selector: ".city" },
        Strategy::Text {
            selector: ".address-city",
        },
    ],
    validate: any,
};

const ADDRESS_POSTAL: FieldSpec = FieldSpec {
    name: "address.postal_code",
    strategies: &[
        Strategy::Text {
            selector: ".postal-code",
        },
        Strategy::Text { selector: ".zip" },
        Strategy::TextPattern {
            selector: ".city, .address-city",
            pattern: r"(\d{3}\s?\d{2})",
        },
    ],
    validate: any,
};

const ADDRESS_NAME: FieldSpec = FieldSpec {
    name: "address.name",
    strategies: &[
        Strategy::Text {
            selector: ".recipient",
        },
        Strategy::Text {
            selector: ".address-name",
        },
    ],
    validate: any,
};

const ADDRESS_PHONE: FieldSpec = FieldSpec {
    name: "address.phone",
    strategies: &[
        Strategy::Text { selector: ".phone" },
        Strategy::Attr {
            selector: "a[href^='tel:']",
            attr: "href",
        },
    ],
    validate: any,
};

const SLOT_BLOCK: &str = "[data-slot-id], .delivery-slot, .slot";

const SLOT_DAY: FieldSpec = FieldSpec {
    name: "slot.day",
    strategies: &[
        Strategy::Attr {
            selector: "[data-day]",
            attr: "data-day",
        },
        Strategy::Text {
            selector: ".slot-day",
        },
        Strategy::Text { selector: ".day" },
    ],
    validate: any,
};

const SLOT_WINDOW: FieldSpec = FieldSpec {
    name: "slot.window",
    strategies: &[
        Strategy::Text {
            selector: ".slot-window",
        },
        Strategy::Text {
            selector: ".time-window",
        },
        Strategy::TextPattern {
            selector: ".slot-label",
            pattern: r"(\d{1,2}:\d{2}\s*[-–]\s*\d{1,2}:\d{2})",
        },
    ],
    validate: any,
};

const SLOT_PRICE: FieldSpec = FieldSpec {
    name: "slot.price",
    strategies: &[
        Strategy::Text {
            selector: ".slot-price",
        },
        Strategy::Attr {
            selector: "[data-slot-price]",
            attr: "data-slot-price",
        },
    ],
    validate: any,
};

const PICKUP_BLOCK: &str = "[data-pickup-id], .pickup-point";

/// Full slots are marked, free ones are not — same optimistic default as
/// product availability.
const SLOT_FULL_SELECTORS: &[&str] = &[".slot-full", ".disabled", "[data-full='true']"];

/// Parse one address block. Street and city are identity fields.
pub fn parse_address(scope: ElementRef<'_>) -> Option<DeliveryAddress> {
    let street = resolve(scope, &ADDRESS_STREET)?;
    let city = resolve(scope, &ADDRESS_CITY)?;
    Some(DeliveryAddress {
        id: scope.value().attr("data-address-id").map(str::to_string),
        name: resolve(scope, &ADDRESS_NAME),
        street,
        city,
        postal_code: resolve(scope, &ADDRESS_POSTAL).unwrap_or_default(),
        phone: resolve(scope, &ADDRESS_PHONE)
            .map(|p| p.trim_start_matches("tel:").to_string()),
        is_default: first_match(scope, ".default, [data-default='true']").is_some(),
    })
}

/// Extract the saved addresses from the account page.
pub fn address_list(html: &str) -> Vec<DeliveryAddress> {
    let doc = Html::parse_document(html);
    let mut addresses = Vec::new();
    for (index, block) in all_matches(doc.root_element(), ADDRESS_BLOCK)
        .into_iter()
        .enumerate()
    {
        match parse_address(block) {
            Some(address) => addresses.push(address),
            None => tracing::debug!(index, "Skipping malformed address block"),
        }
    }
    addresses
}

/// Extract bookable delivery slots from the slot picker page.
pub fn slot_list(html: &str) -> Vec<DeliverySlot> {
    let doc = Html::parse_document(html);
    let mut slots = Vec::new();
    for (index, block) in all_matches(doc.root_element(), SLOT_BLOCK)
        .into_iter()
        .enumerate()
    {
        match parse_slot(block) {
            Some(slot) => slots.push(slot),
            None => tracing::debug!(index, "Skipping malformed slot block"),
        }
    }
    slots
}

fn parse_slot(scope: ElementRef<'_>) -> Option<DeliverySlot> {
    let id = scope
        .value()
        .attr("data-slot-id")
        .map(str::to_string)
        .or_else(|| {
            first_match(scope, "input[name='slotId']")
                .and_then(|el| el.value().attr("value").map(str::to_string))
        })?;
    let day = resolve(scope, &SLOT_DAY)?;
    let window = resolve(scope, &SLOT_WINDOW)?;
    let full = SLOT_FULL_SELECTORS
        .iter()
        .any(|sel| first_match(scope, sel).is_some());
    Some(DeliverySlot {
        id,
        day,
        window,
        price: resolve(scope, &SLOT_PRICE).and_then(|raw| try_parse_price(&raw)),
        available: !full,
    })
}

/// Extract pickup points from the pickup selection page.
pub fn pickup_list(html: &str) -> Vec<PickupPoint> {
    let doc = Html::parse_document(html);
    let mut points = Vec::new();
    for (index, block) in all_matches(doc.root_element(), PICKUP_BLOCK)
        .into_iter()
        .enumerate()
    {
        let id = block.value().attr("data-pickup-id").map(str::to_string);
        let name = resolve(
            block,
            &FieldSpec {
                name: "pickup.name",
                strategies: &[
                    Strategy::Text {
                        selector: ".pickup-name",
                    },
                    Strategy::Text { selector: "h3" },
                ],
                validate: any,
            },
        );
        let address = resolve(
            block,
            &FieldSpec {
                name: "pickup.address",
                strategies: &[
                    Strategy::Text {
                        selector: ".pickup-address",
                    },
                    Strategy::Text {
                        selector: ".address",
                    },
                ],
                validate: any,
            },
        );
        match (id, name, address) {
            (Some(id), Some(name), Some(address)) => points.push(PickupPoint {
                id,
                name,
                address,
                opening_hours: resolve(
                    block,
                    &FieldSpec {
                        name: "pickup.opening_hours",
                        strategies: &[Strategy::Text {
                            selector: ".opening-hours",
                        }],
                        validate: any,
                    },
                ),
            }),
            _ => tracing::debug!(index, "Skipping malformed pickup point block"),
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_extraction_with_defaults() {
        let html = r#"
            <div class="address-card" data-address-id="a1">
                <span class="recipient">Alice</span>
                <span class="street">Main St 5</span>
                <span class="city">Prague 110 00</span>
                <a href="tel:+420123456789">call</a>
                <span class="default">Default</span>
            </div>
            <div class="address-card" data-address-id="a2">
                <span class="street">Side St 7</span>
                <span class="city">Brno</span>
            </div>"#;
        let addresses = address_list(html);
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[0].id.as_deref(), Some("a1"));
        assert_eq!(addresses[0].postal_code, "110 00");
        assert_eq!(addresses[0].phone.as_deref(), Some("+420123456789"));
        assert!(addresses[0].is_default);
        assert!(!addresses[1].is_default);
        assert_eq!(addresses[1].postal_code, "");
    }

    #[test]
    fn address_without_street_is_skipped() {
        let html = r#"<div class="address-card"><span class="city">Prague</span></div>"#;
        assert!(address_list(html).is_empty());
    }

    #[test]
    fn slot_extraction_and_availability() {
        let html = r#"
            <div class="delivery-slot" data-slot-id="s1" data-day="2024-03-02">
                <span class="slot-window">10:00 - 12:00</span>
                <span class="slot-price">29,00 Kč</span>
            </div>
            <div class="delivery-slot" data-slot-id="s2" data-day="2024-03-02">
                <span class="slot-window">12:00 - 14:00</span>
                <span class="slot-full">Full</span>
            </div>"#;
        let slots = slot_list(html);
        assert_eq!(slots.len(), 2);
        assert!(slots[0].available);
        assert_eq!(slots[0].price, Some("29.00".parse().unwrap()));
        assert!(!slots[1].available);
        assert_eq!(slots[1].price, None);
    }

    #[test]
    fn pickup_points() {
        let html = r#"
            <div class="pickup-point" data-pickup-id="p1">
                <h3>Store Center</h3>
                <span class="pickup-address">Main Square 1</span>
                <span class="opening-hours">8-20</span>
            </div>
            <div class="pickup-point"><h3>Nameless</h3></div>"#;
        let points = pickup_list(html);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "p1");
        assert_eq!(points[0].opening_hours.as_deref(), Some("8-20"));
    }
}
