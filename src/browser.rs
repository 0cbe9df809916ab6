//! Headless browser sessions.
//!
//! The scraper only talks to [`BrowserLauncher`] and [`BrowserSession`];
//! [`ChromeLauncher`] is the production backend on top of `headless_chrome`.
//! Every session is wrapped in a [`ScopedSession`] so the browser process is
//! closed on every exit path.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::config::BrowserSettings;
use crate::error::{AppError, Result};

/// How long the page must stay unchanged before it counts as idle.
pub const IDLE_WINDOW: Duration = Duration::from_millis(500);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Extra time Chrome's connection may sit silent beyond the navigation timeout.
const IDLE_BROWSER_MARGIN: Duration = Duration::from_secs(30);

/// Flags passed when Chrome runs without its sandbox (containers, PaaS hosts).
const UNSANDBOXED_ARGS: [&str; 5] = [
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-zygote",
    "--single-process",
];

/// Final state of a loaded page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
}

pub trait BrowserLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

pub trait BrowserSession: Send {
    fn open_page(&mut self) -> Result<()>;

    /// Loads `url` and waits for network quiescence, failing with
    /// [`AppError::NavigationTimeout`] once `timeout` has elapsed.
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    fn rendered(&self) -> Result<RenderedPage>;

    /// Must be safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Owns a launched session and closes it when dropped.
pub struct ScopedSession {
    inner: Option<Box<dyn BrowserSession>>,
}

impl ScopedSession {
    pub fn launch(launcher: &dyn BrowserLauncher) -> Result<Self> {
        let inner = launcher.launch()?;
        Ok(Self { inner: Some(inner) })
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut session) = self.inner.take() {
            if let Err(e) = session.close() {
                tracing::warn!(error = %e, "Failed to close browser session");
            } else {
                tracing::debug!("Browser session closed");
            }
        }
    }

    fn session(&mut self) -> Result<&mut Box<dyn BrowserSession>> {
        self.inner
            .as_mut()
            .ok_or_else(|| AppError::ExtractionError("browser session already closed".to_string()))
    }

    pub fn open_page(&mut self) -> Result<()> {
        self.session()?.open_page()
    }

    pub fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.session()?.navigate(url, timeout)
    }

    pub fn rendered(&mut self) -> Result<RenderedPage> {
        self.session()?.rendered()
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Tracks a page "signature" (ready state plus resource count) across polls
/// and reports idle once it has held steady for the idle window.
#[derive(Debug)]
pub struct IdleTracker {
    window: Duration,
    last: Option<(String, Instant)>,
}

impl IdleTracker {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// Records an observation. Returns true when the page is idle.
    pub fn observe(&mut self, signature: &str, ready: bool, now: Instant) -> bool {
        match &self.last {
            Some((previous, since)) if previous == signature => {
                ready && now.duration_since(*since) >= self.window
            }
            _ => {
                self.last = Some((signature.to_string(), now));
                false
            }
        }
    }
}

pub struct ChromeLauncher {
    settings: BrowserSettings,
    navigation_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(settings: BrowserSettings, navigation_timeout: Duration) -> Self {
        Self {
            settings,
            navigation_timeout,
        }
    }

    fn launch_options(&self) -> Result<LaunchOptions<'static>> {
        let args: Vec<&'static OsStr> = if self.settings.sandbox {
            Vec::new()
        } else {
            UNSANDBOXED_ARGS.iter().map(|arg| OsStr::new(*arg)).collect()
        };

        LaunchOptions::default_builder()
            .headless(self.settings.headless)
            .sandbox(self.settings.sandbox)
            .path(self.settings.chrome_path.clone())
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(self.navigation_timeout + IDLE_BROWSER_MARGIN)
            .args(args)
            .build()
            .map_err(|e| AppError::LaunchError(e.to_string()))
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let options = self.launch_options()?;
        tracing::debug!(headless = self.settings.headless, sandbox = self.settings.sandbox, "Launching Chrome");
        let browser = Browser::new(options).map_err(|e| AppError::LaunchError(e.to_string()))?;

        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            tab: None,
        }))
    }
}

struct ChromeSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

const PAGE_SIGNATURE_JS: &str =
    "document.readyState + ':' + performance.getEntriesByType('resource').length";

// Runs before any page script. The default resource timing buffer holds 250
// entries, after which the count stops moving and the page looks idle.
const PAGE_PRELUDE_JS: &str = "performance.setResourceTimingBufferSize(1000000);";

/// Parsed result of [`PAGE_SIGNATURE_JS`].
#[derive(Debug, PartialEq, Eq)]
pub struct PageSignature {
    pub ready: bool,
    pub resources: u64,
}

impl PageSignature {
    pub fn parse(raw: &str) -> Option<Self> {
        let (state, count) = raw.split_once(':')?;
        Some(Self {
            ready: state == "complete",
            resources: count.trim().parse().ok()?,
        })
    }
}

impl ChromeSession {
    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab
            .as_ref()
            .ok_or_else(|| AppError::NavigationError("no page open".to_string()))
    }

    fn wait_for_network_idle(tab: &Tab, deadline: Instant, timeout: Duration) -> Result<()> {
        let mut tracker = IdleTracker::new(IDLE_WINDOW);
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(AppError::NavigationTimeout(timeout));
            }

            let signature = tab
                .evaluate(PAGE_SIGNATURE_JS, false)
                .map_err(|e| AppError::NavigationError(e.to_string()))?
                .value
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            let ready = PageSignature::parse(&signature).is_some_and(|parsed| parsed.ready);

            if tracker.observe(&signature, ready, now) {
                return Ok(());
            }
            std::thread::sleep(IDLE_POLL_INTERVAL);
        }
    }
}

impl BrowserSession for ChromeSession {
    fn open_page(&mut self) -> Result<()> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| AppError::LaunchError("browser already closed".to_string()))?;
        let tab = browser.new_tab().map_err(|e| AppError::LaunchError(e.to_string()))?;
        tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
            source: PAGE_PRELUDE_JS.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })
        .map_err(|e| AppError::LaunchError(e.to_string()))?;
        self.tab = Some(tab);
        Ok(())
    }

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let tab = self.tab()?;
        let deadline = Instant::now() + timeout;
        tab.set_default_timeout(timeout);

        tab.navigate_to(url)
            .map_err(|e| AppError::NavigationError(e.to_string()))?;
        tab.wait_until_navigated().map_err(|e| {
            if Instant::now() >= deadline {
                AppError::NavigationTimeout(timeout)
            } else {
                AppError::NavigationError(e.to_string())
            }
        })?;

        Self::wait_for_network_idle(tab, deadline, timeout)
    }

    fn rendered(&self) -> Result<RenderedPage> {
        let tab = self.tab()?;
        let html = tab
            .get_content()
            .map_err(|e| AppError::ExtractionError(e.to_string()))?;
        Ok(RenderedPage {
            url: tab.get_url(),
            html,
        })
    }

    fn close(&mut self) -> Result<()> {
        let tab_result = match self.tab.take() {
            Some(tab) => tab.close(false).map(|_| ()),
            None => Ok(()),
        };
        // Dropping the Browser kills the Chrome process.
        self.browser.take();
        tab_result.map_err(|e| AppError::ExtractionError(format!("closing tab: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn idle_after_steady_window() {
        let start = Instant::now();
        let mut tracker = IdleTracker::new(IDLE_WINDOW);

        assert!(!tracker.observe("complete:10", true, start));
        assert!(!tracker.observe("complete:10", true, start + Duration::from_millis(200)));
        assert!(tracker.observe("complete:10", true, start + Duration::from_millis(500)));
    }

    #[test]
    fn new_resources_restart_the_window() {
        let start = Instant::now();
        let mut tracker = IdleTracker::new(IDLE_WINDOW);

        tracker.observe("complete:10", true, start);
        assert!(!tracker.observe("complete:12", true, start + Duration::from_millis(400)));
        assert!(!tracker.observe("complete:12", true, start + Duration::from_millis(800)));
        assert!(tracker.observe("complete:12", true, start + Duration::from_millis(900)));
    }

    #[test]
    fn never_idle_while_loading() {
        let start = Instant::now();
        let mut tracker = IdleTracker::new(IDLE_WINDOW);

        tracker.observe("interactive:3", false, start);
        assert!(!tracker.observe("interactive:3", false, start + Duration::from_secs(5)));
    }

    struct CountingSession {
        closes: Arc<AtomicUsize>,
    }

    impl BrowserSession for CountingSession {
        fn open_page(&mut self) -> Result<()> {
            Ok(())
        }

        fn navigate(&mut self, _url: &str, timeout: Duration) -> Result<()> {
            Err(AppError::NavigationTimeout(timeout))
        }

        fn rendered(&self) -> Result<RenderedPage> {
            Err(AppError::ExtractionError("unused".into()))
        }

        fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingLauncher {
        closes: Arc<AtomicUsize>,
    }

    impl BrowserLauncher for CountingLauncher {
        fn launch(&self) -> Result<Box<dyn BrowserSession>> {
            Ok(Box::new(CountingSession {
                closes: self.closes.clone(),
            }))
        }
    }

    #[test]
    fn explicit_close_happens_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let launcher = CountingLauncher { closes: closes.clone() };

        let session = ScopedSession::launch(&launcher).unwrap();
        session.close();

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_closes_on_error_path() {
        let closes = Arc::new(AtomicUsize::new(0));
        let launcher = CountingLauncher { closes: closes.clone() };

        let result = (|| -> Result<()> {
            let mut session = ScopedSession::launch(&launcher)?;
            session.open_page()?;
            session.navigate("https://example.com", Duration::from_secs(1))?;
            Ok(())
        })();

        assert!(matches!(result, Err(AppError::NavigationTimeout(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn launch_options_outlast_navigation_timeout() {
        let timeout = Duration::from_secs(60);
        let launcher = ChromeLauncher::new(BrowserSettings::default(), timeout);
        let options = launcher.launch_options().unwrap();

        assert!(options.idle_browser_timeout > timeout);
        assert!(!options.sandbox);
        assert_eq!(options.args.len(), UNSANDBOXED_ARGS.len());
    }

    #[test]
    fn parses_page_signature() {
        assert_eq!(
            PageSignature::parse("complete:312"),
            Some(PageSignature { ready: true, resources: 312 })
        );
        assert_eq!(
            PageSignature::parse("loading:4"),
            Some(PageSignature { ready: false, resources: 4 })
        );
        assert_eq!(PageSignature::parse("complete"), None);
    }

    #[test]
    fn prelude_lifts_resource_buffer_cap() {
        assert!(PAGE_PRELUDE_JS.contains("setResourceTimingBufferSize"));
    }

    #[test]
    fn resource_growth_past_250_keeps_page_busy() {
        let start = Instant::now();
        let mut tracker = IdleTracker::new(IDLE_WINDOW);

        tracker.observe("complete:250", true, start);
        assert!(!tracker.observe("complete:251", true, start + Duration::from_millis(500)));
        assert!(!tracker.observe("complete:290", true, start + Duration::from_millis(900)));
        assert!(tracker.observe("complete:290", true, start + Duration::from_millis(1400)));
    }
}
