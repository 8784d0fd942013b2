pub mod client;
pub mod extract;
pub mod transport;

pub use client::{SiteConfig, StorefrontClient};
pub use extract::HtmlFormFinder;
pub use transport::ReqwestTransport;
