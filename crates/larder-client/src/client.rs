//! The storefront client facade.
//!
//! Wires the session store, rate-limited transport, extraction engine,
//! entity caches, and dual-path mutator into one handle the route layer
//! can hold. All methods return typed entities or mutation outcomes;
//! HTTP status mapping is the caller's business.

use std::time::Duration;

use larder_core::cache::{CART_TTL, EntityCache, LISTING_TTL, ORDER_TTL, PRODUCT_TTL, SLOT_TTL};
use larder_core::error::AppError;
use larder_core::models::{
    CartSummary, DeliveryAddress, DeliverySlot, Order, PickupPoint, Product,
};
use larder_core::mutate::{DualPathMutator, MutationOutcome, MutationPlan};
use larder_core::rate_limit::{RateLimitConfig, RateLimitedTransport};
use larder_core::session::{SessionConfig, SessionInfo, SessionStore};
use larder_core::transport::{FormFinder, FormIntent, HttpRequest, HttpResponse, Transport};
use serde_json::json;
use url::Url;

use crate::extract;
use crate::extract::forms::HtmlFormFinder;
use crate::transport::ReqwestTransport;

/// Where the storefront lives and how hard we may hit it. Paths are
/// site conventions, not a published API, so every one is overridable.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: String,
    pub login_path: String,
    pub logout_path: String,
    pub cart_path: String,
    pub checkout_path: String,
    pub addresses_path: String,
    pub orders_path: String,
    pub slots_path: String,
    pub pickup_path: String,
    /// Prefix for the structured mutation endpoints tried first.
    pub api_prefix: String,
    pub requests_per_minute: u32,
    pub session_timeout: Duration,
    pub user_agent: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://shop.example.com".to_string(),
            login_path: "/login".to_string(),
            logout_path: "/logout".to_string(),
            cart_path: "/cart".to_string(),
            checkout_path: "/checkout".to_string(),
            addresses_path: "/account/addresses".to_string(),
            orders_path: "/account/orders".to_string(),
            slots_path: "/delivery/slots".to_string(),
            pickup_path: "/pickup-points".to_string(),
            api_prefix: "/api".to_string(),
            requests_per_minute: 60,
            session_timeout: Duration::from_secs(30 * 60),
            user_agent: "Larder/0.1".to_string(),
        }
    }
}

impl SiteConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Absolute URL for a site path (or pass an absolute URL through).
    fn url(&self, path: &str) -> Result<String, AppError> {
        let base = Url::parse(&self.base_url).map_err(|e| AppError::InvalidUrl(e.to_string()))?;
        let joined = base
            .join(path)
            .map_err(|e| AppError::InvalidUrl(format!("cannot resolve '{path}': {e}")))?;
        Ok(joined.to_string())
    }

    fn api_url(&self, endpoint: &str) -> Result<String, AppError> {
        self.url(&format!(
            "{}/{}",
            self.api_prefix.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        ))
    }
}

/// One handle per storefront account, cheap to clone.
#[derive(Clone)]
pub struct StorefrontClient<T: Transport> {
    config: SiteConfig,
    transport: RateLimitedTransport<T>,
    session: SessionStore,
    forms: HtmlFormFinder,
    mutator: DualPathMutator<RateLimitedTransport<T>, HtmlFormFinder>,
    products: EntityCache<Product>,
    listings: EntityCache<Vec<Product>>,
    cart: EntityCache<CartSummary>,
    order_details: EntityCache<Order>,
    order_history: EntityCache<Vec<Order>>,
    slots: EntityCache<Vec<DeliverySlot>>,
}

const CART_KEY: &str = "cart";
const ORDERS_KEY: &str = "orders";
const SLOTS_KEY: &str = "slots";

impl StorefrontClient<ReqwestTransport> {
    /// Client over a real HTTP transport.
    pub fn connect(config: SiteConfig) -> Result<Self, AppError> {
        let transport = ReqwestTransport::new(&config.user_agent)?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> StorefrontClient<T> {
    /// Client over an injected transport. Tests use this with mocks.
    pub fn with_transport(inner: T, config: SiteConfig) -> Self {
        let session = SessionStore::new(SessionConfig {
            timeout: config.session_timeout,
        });
        let transport = RateLimitedTransport::new(
            inner,
            RateLimitConfig::new(config.requests_per_minute),
            session.clone(),
        );
        let forms = HtmlFormFinder::new();
        let mutator = DualPathMutator::new(transport.clone(), forms.clone());
        Self {
            config,
            transport,
            session,
            forms,
            mutator,
            products: EntityCache::new(1024, PRODUCT_TTL),
            listings: EntityCache::new(128, LISTING_TTL),
            cart: EntityCache::new(4, CART_TTL),
            order_details: EntityCache::new(256, ORDER_TTL),
            order_history: EntityCache::new(4, ORDER_TTL),
            slots: EntityCache::new(16, SLOT_TTL),
        }
    }

    /// Session handle for status reporting and renewal checks.
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub async fn session_info(&self) -> SessionInfo {
        self.session.session_info().await
    }

    pub async fn needs_renewal(&self) -> bool {
        self.session.needs_renewal().await
    }

    /// Requests left in the current rate-limit window.
    pub async fn remaining_requests(&self) -> u32 {
        self.transport.limiter().remaining().await
    }

    // -----------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------

    /// Log in through the site's form. The site never confirms a login
    /// directly; success is inferred from landing off the login page or
    /// from a session-identifying cookie, whichever comes first.
    ///
    /// Returns `Ok(false)` for rejected credentials; errors are reserved
    /// for transport and discovery failures.
    pub async fn login(&self, email: &str, password: &str) -> Result<bool, AppError> {
        let login_url = self.config.url(&self.config.login_path)?;
        let page = self.fetch(&login_url).await?;

        let form = self.forms.discover(&page.body, FormIntent::Login)?;
        let action = resolve_form_action(&page.final_url, &form.action)?;

        let mut fields = form.fields;
        fields.push(("email".to_string(), email.to_string()));
        fields.push(("password".to_string(), password.to_string()));

        let response = self
            .transport
            .execute(HttpRequest::post_form(action, fields))
            .await?;

        let moved_off_login = !response.final_url.contains(&self.config.login_path);
        let has_cookie = self.session.has_session_cookie().await;
        let success = response.is_success() && (moved_off_login || has_cookie);

        if success {
            let session_id =
                session_id_from(&response.set_cookies).unwrap_or_else(|| "opaque".to_string());
            self.session
                .set_authenticated(&session_id, None, Some(email))
                .await;
        } else {
            tracing::warn!(
                status = response.status,
                final_url = %response.final_url,
                "Login not accepted"
            );
        }
        Ok(success)
    }

    /// Best-effort logout request, then drop all local session state.
    pub async fn logout(&self) -> Result<(), AppError> {
        let logout_url = self.config.url(&self.config.logout_path)?;
        if let Err(e) = self.transport.execute(HttpRequest::get(logout_url)).await {
            tracing::debug!(error = %e, "Logout request failed, clearing locally");
        }
        self.session.clear_session().await;
        self.cart.invalidate(CART_KEY).await;
        Ok(())
    }

    async fn ensure_authenticated(&self) -> Result<(), AppError> {
        if self.session.is_valid().await {
            Ok(())
        } else {
            Err(AppError::AuthenticationRequired)
        }
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    /// Product detail by site path (e.g. `/42-whole-milk`). Cached.
    /// `None` means the page fetched fine but no product could be read
    /// out of it.
    pub async fn product(&self, path: &str) -> Result<Option<Product>, AppError> {
        if let Some(hit) = self.products.get(path).await {
            return Ok(Some(hit));
        }
        let page = self.fetch_path(path).await?;
        let product = extract::product_detail(&page.body);
        if let Some(ref product) = product {
            self.products.insert(path, product.clone()).await;
        }
        Ok(product)
    }

    /// Products on a category or search page. Cached per path; partial
    /// extraction degrades to fewer products, never an error.
    pub async fn products_in(&self, category_path: &str) -> Result<Vec<Product>, AppError> {
        if let Some(hit) = self.listings.get(category_path).await {
            return Ok(hit);
        }
        let page = self.fetch_path(category_path).await?;
        let products = extract::product_list(&page.body);
        self.listings.insert(category_path, products.clone()).await;
        Ok(products)
    }

    /// The current cart. Requires a valid session; cached briefly and
    /// invalidated by every cart mutation.
    pub async fn cart(&self) -> Result<Option<CartSummary>, AppError> {
        self.ensure_authenticated().await?;
        if let Some(hit) = self.cart.get(CART_KEY).await {
            return Ok(Some(hit));
        }
        let page = self.fetch_path(&self.config.cart_path).await?;
        let summary = extract::cart_summary(&page.body);
        if let Some(ref summary) = summary {
            self.cart.insert(CART_KEY, summary.clone()).await;
        }
        Ok(summary)
    }

    pub async fn addresses(&self) -> Result<Vec<DeliveryAddress>, AppError> {
        self.ensure_authenticated().await?;
        let page = self.fetch_path(&self.config.addresses_path).await?;
        Ok(extract::address_list(&page.body))
    }

    /// Order history. Cached; placing an order invalidates it.
    pub async fn orders(&self) -> Result<Vec<Order>, AppError> {
        self.ensure_authenticated().await?;
        if let Some(hit) = self.order_history.get(ORDERS_KEY).await {
            return Ok(hit);
        }
        let page = self.fetch_path(&self.config.orders_path).await?;
        let orders = extract::order_list(&page.body);
        self.order_history.insert(ORDERS_KEY, orders.clone()).await;
        Ok(orders)
    }

    /// One order by site path. Cached.
    pub async fn order(&self, path: &str) -> Result<Option<Order>, AppError> {
        self.ensure_authenticated().await?;
        if let Some(hit) = self.order_details.get(path).await {
            return Ok(Some(hit));
        }
        let page = self.fetch_path(path).await?;
        let order = extract::order_detail(&page.body);
        if let Some(ref order) = order {
            self.order_details.insert(path, order.clone()).await;
        }
        Ok(order)
    }

    pub async fn delivery_slots(&self) -> Result<Vec<DeliverySlot>, AppError> {
        self.ensure_authenticated().await?;
        if let Some(hit) = self.slots.get(SLOTS_KEY).await {
            return Ok(hit);
        }
        let page = self.fetch_path(&self.config.slots_path).await?;
        let slots = extract::slot_list(&page.body);
        self.slots.insert(SLOTS_KEY, slots.clone()).await;
        Ok(slots)
    }

    pub async fn pickup_points(&self) -> Result<Vec<PickupPoint>, AppError> {
        let page = self.fetch_path(&self.config.pickup_path).await?;
        Ok(extract::pickup_list(&page.body))
    }

    // -----------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------

    pub async fn add_to_cart(
        &self,
        product_id: &str,
        quantity: u32,
    ) -> Result<MutationOutcome, AppError> {
        self.ensure_authenticated().await?;
        let plan = MutationPlan {
            name: "add_to_cart".to_string(),
            api: HttpRequest::post_json(
                self.config.api_url("cart/add")?,
                json!({ "productId": product_id, "quantity": quantity }),
            ),
            success_pointer: "/success".to_string(),
            form_page: self.config.url(&self.config.cart_path)?,
            form_intent: FormIntent::AddToCart,
            overlay: vec![
                ("productId".to_string(), product_id.to_string()),
                ("quantity".to_string(), quantity.to_string()),
            ],
        };
        self.run_cart_mutation(plan).await
    }

    pub async fn update_cart_item(
        &self,
        product_id: &str,
        quantity: u32,
    ) -> Result<MutationOutcome, AppError> {
        self.ensure_authenticated().await?;
        let plan = MutationPlan {
            name: "update_cart".to_string(),
            api: HttpRequest::post_json(
                self.config.api_url("cart/update")?,
                json!({ "productId": product_id, "quantity": quantity }),
            ),
            success_pointer: "/success".to_string(),
            form_page: self.config.url(&self.config.cart_path)?,
            form_intent: FormIntent::UpdateCart,
            overlay: vec![
                ("productId".to_string(), product_id.to_string()),
                ("quantity".to_string(), quantity.to_string()),
            ],
        };
        self.run_cart_mutation(plan).await
    }

    pub async fn remove_from_cart(&self, product_id: &str) -> Result<MutationOutcome, AppError> {
        self.ensure_authenticated().await?;
        let plan = MutationPlan {
            name: "remove_from_cart".to_string(),
            api: HttpRequest::post_json(
                self.config.api_url("cart/remove")?,
                json!({ "productId": product_id }),
            ),
            success_pointer: "/success".to_string(),
            form_page: self.config.url(&self.config.cart_path)?,
            form_intent: FormIntent::RemoveFromCart,
            overlay: vec![("productId".to_string(), product_id.to_string())],
        };
        self.run_cart_mutation(plan).await
    }

    pub async fn select_delivery_slot(&self, slot_id: &str) -> Result<MutationOutcome, AppError> {
        self.ensure_authenticated().await?;
        let plan = MutationPlan {
            name: "select_slot".to_string(),
            api: HttpRequest::post_json(
                self.config.api_url("delivery/slot")?,
                json!({ "slotId": slot_id }),
            ),
            success_pointer: "/success".to_string(),
            form_page: self.config.url(&self.config.slots_path)?,
            form_intent: FormIntent::SelectSlot,
            overlay: vec![("slotId".to_string(), slot_id.to_string())],
        };
        let outcome = self.mutator.execute(&plan).await?;
        if outcome.succeeded {
            self.slots.invalidate(SLOTS_KEY).await;
        }
        Ok(outcome)
    }

    /// Submit the checkout. Empties the cart and appends to the order
    /// history on the server, so both caches go stale on success.
    pub async fn checkout(&self) -> Result<MutationOutcome, AppError> {
        self.ensure_authenticated().await?;
        let plan = MutationPlan {
            name: "checkout".to_string(),
            api: HttpRequest::post_json(self.config.api_url("checkout")?, json!({})),
            success_pointer: "/success".to_string(),
            form_page: self.config.url(&self.config.checkout_path)?,
            form_intent: FormIntent::Checkout,
            overlay: Vec::new(),
        };
        let outcome = self.mutator.execute(&plan).await?;
        if outcome.succeeded {
            self.cart.invalidate(CART_KEY).await;
            self.order_history.invalidate(ORDERS_KEY).await;
            self.slots.invalidate(SLOTS_KEY).await;
        }
        Ok(outcome)
    }

    pub async fn save_address(
        &self,
        address: &DeliveryAddress,
    ) -> Result<MutationOutcome, AppError> {
        self.ensure_authenticated().await?;
        let mut overlay = vec![
            ("street".to_string(), address.street.clone()),
            ("city".to_string(), address.city.clone()),
            ("postalCode".to_string(), address.postal_code.clone()),
        ];
        if let Some(ref name) = address.name {
            overlay.push(("name".to_string(), name.clone()));
        }
        if let Some(ref phone) = address.phone {
            overlay.push(("phone".to_string(), phone.clone()));
        }
        let plan = MutationPlan {
            name: "save_address".to_string(),
            api: HttpRequest::post_json(
                self.config.api_url("account/address")?,
                json!({
                    "street": address.street,
                    "city": address.city,
                    "postalCode": address.postal_code,
                    "name": address.name,
                    "phone": address.phone,
                }),
            ),
            success_pointer: "/success".to_string(),
            form_page: self.config.url(&self.config.addresses_path)?,
            form_intent: FormIntent::SaveAddress,
            overlay,
        };
        self.mutator.execute(&plan).await
    }

    async fn run_cart_mutation(&self, plan: MutationPlan) -> Result<MutationOutcome, AppError> {
        let outcome = self.mutator.execute(&plan).await?;
        if outcome.succeeded {
            // The cached cart is stale the moment a mutation lands.
            self.cart.invalidate(CART_KEY).await;
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------

    async fn fetch_path(&self, path: &str) -> Result<HttpResponse, AppError> {
        let url = self.config.url(path)?;
        self.fetch(&url).await
    }

    async fn fetch(&self, url: &str) -> Result<HttpResponse, AppError> {
        let response = self.transport.execute(HttpRequest::get(url)).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(AppError::HttpStatus {
                status: response.status,
                body: truncate(&response.body, 256),
            })
        }
    }
}

fn resolve_form_action(page_url: &str, action: &str) -> Result<String, AppError> {
    let base = Url::parse(page_url).map_err(|e| AppError::InvalidUrl(e.to_string()))?;
    if action.is_empty() {
        return Ok(base.to_string());
    }
    base.join(action)
        .map(|u| u.to_string())
        .map_err(|e| AppError::InvalidUrl(format!("cannot resolve action '{action}': {e}")))
}

/// First `Set-Cookie` value that looks like a session identifier.
fn session_id_from(set_cookies: &[String]) -> Option<String> {
    for header in set_cookies {
        if let Some((name, value)) = header.split(';').next().and_then(|p| p.split_once('=')) {
            let name = name.trim().to_ascii_lowercase();
            if name.contains("session") || name.contains("sid") {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

fn truncate(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        body.to_string()
    } else {
        let mut end = limit;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body[..end].to_string()
    }
}
