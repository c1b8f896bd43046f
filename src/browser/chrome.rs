use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tokio::sync::Semaphore;

use crate::browser::{PageRenderer, RenderError, RenderResult, RenderSlot, RenderedPage};

/// Chromium exits on its own after this long without any CDP traffic.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

/// A single headless Chromium process shared by all renders, with the number
/// of simultaneously open tabs limited by a [`Semaphore`].
pub struct BrowserPool {
    browser: Arc<Browser>,
    semaphore: Arc<Semaphore>,
    navigation_timeout: Duration,
}

impl BrowserPool {
    /// Launches Chromium. `max_tabs` bounds concurrent renders and
    /// `navigation_timeout` is the budget shared by all blocking CDP calls of
    /// one render.
    pub fn launch(max_tabs: usize, navigation_timeout: Duration) -> RenderResult<Self> {
        // the Chrome sandbox does not work inside most containers
        let sandbox = std::env::var("IN_DOCKER").is_err();
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(sandbox)
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .build()
            .map_err(|e| RenderError::Launch(e.to_string()))?;
        let browser = Browser::new(options).map_err(|e| RenderError::Launch(e.to_string()))?;

        log::info!("Launched headless browser with {max_tabs} tab slots");

        Ok(Self {
            browser: Arc::new(browser),
            semaphore: Arc::new(Semaphore::new(max_tabs.max(1))),
            navigation_timeout,
        })
    }
}

/// An open tab. Dropping the lease closes the tab, including when the render
/// future is cancelled at its deadline, so a cancelled render leaves no tab
/// open. A blocking call still running on the closed tab ends within its
/// budget.
struct TabLease {
    tab: Arc<Tab>,
}

impl TabLease {
    fn open(browser: &Browser) -> RenderResult<Self> {
        let tab = browser
            .new_tab()
            .map_err(|e| RenderError::Tab(e.to_string()))?;
        Ok(Self { tab })
    }
}

impl Drop for TabLease {
    fn drop(&mut self) {
        let tab = self.tab.clone();
        let close = move || {
            if let Err(e) = tab.close(false) {
                log::warn!("Failed to close tab {}: {e}", tab.get_url());
            }
        };
        // closing is a blocking CDP call; keep it off the async workers
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(close);
            }
            Err(_) => close(),
        }
    }
}

/// Time left until `deadline`, or a timeout error once it has passed.
fn remaining(deadline: Instant, url: &str) -> RenderResult<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
        .ok_or_else(|| RenderError::Timeout {
            url: url.to_string(),
        })
}

/// Navigates `tab` to `url` and reads the rendered page. Every blocking call
/// draws on the same budget ending at `deadline`.
fn load(tab: &Tab, url: &str, deadline: Instant) -> RenderResult<RenderedPage> {
    tab.set_default_timeout(remaining(deadline, url)?);
    tab.navigate_to(url).map_err(|e| RenderError::Navigation {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    tab.set_default_timeout(remaining(deadline, url)?);
    tab.wait_until_navigated().map_err(|e| RenderError::Navigation {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    tab.set_default_timeout(remaining(deadline, url)?);
    let html = tab.get_content().map_err(|e| RenderError::Content {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    Ok(RenderedPage {
        url: url.to_string(),
        final_url: tab.get_url(),
        title: tab.get_title().ok().filter(|t| !t.trim().is_empty()),
        html,
    })
}

#[async_trait]
impl PageRenderer for BrowserPool {
    async fn reserve(&self) -> RenderResult<RenderSlot> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::PoolClosed)?;
        Ok(RenderSlot::new(permit))
    }

    /// The CDP calls block, so they run on the blocking pool while the tab
    /// lease stays with this future. The slot is held by the caller and the
    /// tab is closed as soon as this future completes or is dropped.
    async fn render(&self, _slot: &RenderSlot, url: &str) -> RenderResult<RenderedPage> {
        let deadline = Instant::now() + self.navigation_timeout;

        // If this future is dropped while the tab is opening, the finished
        // task's output is dropped too, which closes the tab.
        let browser = self.browser.clone();
        let lease = tokio::task::spawn_blocking(move || TabLease::open(&browser))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))??;

        let tab = lease.tab.clone();
        let target = url.to_string();
        log::debug!("Rendering {url}");
        let page = tokio::task::spawn_blocking(move || load(&tab, &target, deadline))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))?;

        drop(lease);
        page
    }
}
