//! HTML extraction: ordered per-field strategy chains over served pages.
//!
//! Every entity field carries a fallback chain of selectors and
//! patterns, tried in order until one yields a usable value. The site
//! being unversioned, markup drift is the normal case: a chain absorbs
//! it by falling through to older or more generic shapes.

pub mod cart;
pub mod delivery;
pub mod forms;
pub mod numeric;
pub mod order;
pub mod product;
pub mod strategy;

pub use cart::cart_summary;
pub use delivery::{address_list, pickup_list, slot_list};
pub use forms::HtmlFormFinder;
pub use order::{order_detail, order_list};
pub use product::{product_detail, product_list};
