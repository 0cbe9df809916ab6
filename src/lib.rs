pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod scraper;

use std::sync::Arc;
use tokio::net::TcpListener;

use browser::{BrowserLauncher, ChromeLauncher};
use config::Config;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub launcher: Arc<dyn BrowserLauncher>,
}

impl AppState {
    /// State backed by a real Chrome launcher.
    pub fn new(config: Config) -> Self {
        let launcher = Arc::new(ChromeLauncher::new(
            config.browser.clone(),
            config.scrape.navigation_timeout,
        ));
        Self {
            config: Arc::new(config),
            launcher,
        }
    }
}

/// Binds the configured address and serves until the process exits.
pub async fn run(config: Config) -> std::io::Result<()> {
    let server_addr = config.server_addr;
    let app = api::routes::create_router(AppState::new(config));

    let listener = TcpListener::bind(server_addr).await?;
    tracing::info!("✅ Server is listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}
