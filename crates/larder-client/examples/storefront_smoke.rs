/// Smoke-test for `StorefrontClient` over the real transport.
///
/// Points the client at a storefront and extracts the products from one
/// listing page.
///
/// Run with:
///   cargo run --example storefront_smoke -- https://shop.example.com /category
use larder_client::{SiteConfig, StorefrontClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let mut args = std::env::args().skip(1);
    let base = args
        .next()
        .unwrap_or_else(|| "https://shop.example.com".to_string());
    let path = args.next().unwrap_or_else(|| "/".to_string());

    let client = StorefrontClient::connect(SiteConfig::default().with_base_url(&base))?;

    println!("Fetching {base}{path} …");
    let products = client.products_in(&path).await?;
    println!("{} products extracted", products.len());
    for product in products.iter().take(10) {
        println!("  [{}] {} {}", product.id, product.name, product.price);
    }
    println!(
        "{} requests left in this rate-limit window",
        client.remaining_requests().await
    );
    Ok(())
}
