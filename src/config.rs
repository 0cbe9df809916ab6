use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};

pub const DEFAULT_LISTING_SITE_URL: &str = "https://www.zillow.com";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub scrape: ScrapeSettings,
    pub browser: BrowserSettings,
}

/// What to scrape and how long to wait for it.
#[derive(Clone, Debug)]
pub struct ScrapeSettings {
    pub listing_site_url: String,
    pub navigation_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct BrowserSettings {
    pub headless: bool,
    pub sandbox: bool,
    pub chrome_path: Option<PathBuf>,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            listing_site_url: DEFAULT_LISTING_SITE_URL.to_string(),
            navigation_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            chrome_path: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port.parse::<u16>().map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let listing_site_url = env::var("LISTING_SITE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_LISTING_SITE_URL.to_string());
        url::Url::parse(&listing_site_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid LISTING_SITE_URL: {}", e)))?;

        let timeout_secs = match env::var("NAVIGATION_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|e| AppError::ConfigError(format!("Invalid NAVIGATION_TIMEOUT_SECS: {}", e)))?,
            Err(_) => 60,
        };

        let browser = BrowserSettings {
            headless: env_flag("BROWSER_HEADLESS", true)?,
            sandbox: env_flag("BROWSER_SANDBOX", false)?,
            chrome_path: env::var("CHROME_PATH").ok().map(PathBuf::from),
        };

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            scrape: ScrapeSettings {
                listing_site_url,
                navigation_timeout: Duration::from_secs(timeout_secs),
            },
            browser,
        })
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => parse_flag(&raw)
            .ok_or_else(|| AppError::ConfigError(format!("Invalid {}: {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
