use crate::browser::{BrowserLauncher, ScopedSession};
use crate::config::ScrapeSettings;
use crate::error::Result;
use crate::extract::{extract_listings, Listing};

/// Validated search parameters, already rendered as URL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub zip: String,
    pub bedrooms: String,
    pub bathrooms: String,
}

impl SearchQuery {
    /// Rental search URL on the listing site. Values are interpolated as-is.
    pub fn search_url(&self, listing_site_url: &str) -> String {
        format!(
            "{}/homes/for_rent/{}/?beds={}&baths={}",
            listing_site_url.trim_end_matches('/'),
            self.zip,
            self.bedrooms,
            self.bathrooms
        )
    }
}

/// Renders the search results page in a fresh browser and returns up to five
/// comps in page order.
///
/// Blocking: call from a blocking worker. The browser is closed before this
/// returns, on success and on every error.
#[tracing::instrument(skip_all, fields(zip = %query.zip))]
pub fn scrape_comps(
    launcher: &dyn BrowserLauncher,
    settings: &ScrapeSettings,
    query: &SearchQuery,
) -> Result<Vec<Listing>> {
    let url = query.search_url(&settings.listing_site_url);

    let mut session = ScopedSession::launch(launcher)?;
    session.open_page()?;

    tracing::info!("🔗 Navigating to: {}", url);
    session.navigate(&url, settings.navigation_timeout)?;

    let page = session.rendered()?;
    session.close();

    let comps = extract_listings(&page.html, &page.url);
    tracing::info!(count = comps.len(), "Extracted comps");
    Ok(comps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserSession, RenderedPage};
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Copy, PartialEq)]
    enum FailAt {
        Nowhere,
        Launch,
        Navigate,
        Content,
    }

    #[derive(Clone)]
    struct FakeLauncher {
        html: String,
        fail_at: FailAt,
        launches: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        visited: Arc<Mutex<Vec<String>>>,
    }

    impl FakeLauncher {
        fn new(html: &str, fail_at: FailAt) -> Self {
            Self {
                html: html.to_string(),
                fail_at,
                launches: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
                visited: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    struct FakeSession {
        launcher: FakeLauncher,
        url: Option<String>,
    }

    impl BrowserLauncher for FakeLauncher {
        fn launch(&self) -> Result<Box<dyn BrowserSession>> {
            if self.fail_at == FailAt::Launch {
                return Err(AppError::LaunchError("chrome not found".into()));
            }
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeSession {
                launcher: self.clone(),
                url: None,
            }))
        }
    }

    impl BrowserSession for FakeSession {
        fn open_page(&mut self) -> Result<()> {
            Ok(())
        }

        fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
            self.launcher.visited.lock().unwrap().push(url.to_string());
            if self.launcher.fail_at == FailAt::Navigate {
                return Err(AppError::NavigationTimeout(timeout));
            }
            self.url = Some(url.to_string());
            Ok(())
        }

        fn rendered(&self) -> Result<RenderedPage> {
            if self.launcher.fail_at == FailAt::Content {
                return Err(AppError::ExtractionError("target closed".into()));
            }
            Ok(RenderedPage {
                url: self.url.clone().unwrap_or_default(),
                html: self.launcher.html.clone(),
            })
        }

        fn close(&mut self) -> Result<()> {
            self.launcher.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn query() -> SearchQuery {
        SearchQuery {
            zip: "94110".into(),
            bedrooms: "2".into(),
            bathrooms: "1".into(),
        }
    }

    fn cards(n: usize) -> String {
        (0..n)
            .map(|i| format!(r#"<div data-testid="property-card"><a href="/homedetails/{i}/">{i}</a></div>"#))
            .collect()
    }

    #[test]
    fn builds_search_url() {
        assert_eq!(
            query().search_url("https://www.zillow.com/"),
            "https://www.zillow.com/homes/for_rent/94110/?beds=2&baths=1"
        );
    }

    #[test]
    fn interpolates_values_verbatim() {
        let query = SearchQuery {
            zip: "941 10".into(),
            bedrooms: "2&x=1".into(),
            bathrooms: "1.5".into(),
        };
        assert_eq!(
            query.search_url("http://localhost:8080"),
            "http://localhost:8080/homes/for_rent/941 10/?beds=2&x=1&baths=1.5"
        );
    }

    #[test]
    fn returns_comps_and_closes_browser() {
        let launcher = FakeLauncher::new(&cards(7), FailAt::Nowhere);
        let comps = scrape_comps(&launcher, &ScrapeSettings::default(), &query()).unwrap();

        assert_eq!(comps.len(), 5);
        assert_eq!(comps[0].link, "https://www.zillow.com/homedetails/0/");
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.closes.load(Ordering::SeqCst), 1);
        assert_eq!(
            *launcher.visited.lock().unwrap(),
            vec!["https://www.zillow.com/homes/for_rent/94110/?beds=2&baths=1".to_string()]
        );
    }

    #[test]
    fn empty_page_is_success() {
        let launcher = FakeLauncher::new("<html><body></body></html>", FailAt::Nowhere);
        let comps = scrape_comps(&launcher, &ScrapeSettings::default(), &query()).unwrap();

        assert!(comps.is_empty());
        assert_eq!(launcher.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn launch_failure_opens_nothing() {
        let launcher = FakeLauncher::new(&cards(3), FailAt::Launch);
        let result = scrape_comps(&launcher, &ScrapeSettings::default(), &query());

        assert!(matches!(result, Err(AppError::LaunchError(_))));
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 0);
        assert_eq!(launcher.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn navigation_timeout_still_closes_browser() {
        let launcher = FakeLauncher::new(&cards(3), FailAt::Navigate);
        let result = scrape_comps(&launcher, &ScrapeSettings::default(), &query());

        assert!(matches!(result, Err(AppError::NavigationTimeout(_))));
        assert_eq!(launcher.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn content_failure_returns_no_partial_results() {
        let launcher = FakeLauncher::new(&cards(3), FailAt::Content);
        let result = scrape_comps(&launcher, &ScrapeSettings::default(), &query());

        assert!(matches!(result, Err(AppError::ExtractionError(_))));
        assert_eq!(launcher.closes.load(Ordering::SeqCst), 1);
    }
}
