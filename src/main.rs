use cma_comps::config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (also reads .env, so RUST_LOG there applies)
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cma_comps=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        listing_site = %config.scrape.listing_site_url,
        headless = config.browser.headless,
        "Starting CMA comps API on {}",
        config.server_addr
    );

    cma_comps::run(config).await?;

    Ok(())
}
