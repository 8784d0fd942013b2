pub mod cache;
pub mod cookies;
pub mod error;
pub mod models;
pub mod mutate;
pub mod rate_limit;
pub mod session;
pub mod testutil;
pub mod transport;

pub use cache::EntityCache;
pub use error::AppError;
pub use models::{CartSummary, DeliveryAddress, DeliverySlot, Order, PickupPoint, Product};
pub use mutate::{DualPathMutator, MutationOutcome, MutationPlan};
pub use rate_limit::{RateLimitConfig, RateLimitedTransport};
pub use session::{SessionConfig, SessionInfo, SessionStore};
pub use transport::{FormFinder, FormIntent, HttpRequest, HttpResponse, Transport};
