mod session;

pub use session::{BrowserSession, ProfileLocks};

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use thirtyfour::prelude::*;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How a browser should be launched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Durable `--user-data-dir`. `None` launches a throwaway profile.
    pub profile_dir: Option<PathBuf>,
    pub headless: bool,
}

impl LaunchOptions {
    pub fn visible_with_profile(profile_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile_dir: Some(profile_dir.into()),
            headless: false,
        }
    }

    pub fn headless() -> Self {
        Self {
            profile_dir: None,
            headless: true,
        }
    }
}

/// The handful of page operations the scrapers need.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Checks for a matching element right now, without waiting.
    async fn has_element(&self, css: &str) -> Result<bool>;

    /// Polls until a matching element exists. `Ok(false)` means the timeout elapsed.
    async fn wait_for_element(&self, css: &str, timeout: Duration) -> Result<bool>;

    /// Waits for an input, types `text` into it and presses Enter.
    async fn fill_and_submit(&self, css: &str, text: &str, timeout: Duration) -> Result<()>;

    async fn source(&self) -> Result<String>;

    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserPage>>;
}

/// Launches Chrome through a running chromedriver.
pub struct WebDriverLauncher {
    webdriver_url: String,
}

impl WebDriverLauncher {
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserPage>> {
        let mut caps = DesiredCapabilities::chrome();
        if options.headless {
            caps.add_chrome_arg("--headless")?;
        }
        if let Some(dir) = &options.profile_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create browser profile dir {:?}", dir))?;
            let dir = dir.canonicalize().unwrap_or_else(|_| dir.clone());
            caps.add_chrome_arg(&format!("--user-data-dir={}", dir.display()))?;
        }
        caps.add_chrome_arg("--no-sandbox")?;
        caps.add_chrome_arg("--disable-dev-shm-usage")?;
        caps.add_chrome_arg("--window-size=1920,1080")?;
        caps.add_chrome_arg("--disable-blink-features=AutomationControlled")?;

        debug!(
            "Connecting to WebDriver at {} (headless: {}, profile: {:?})",
            self.webdriver_url, options.headless, options.profile_dir
        );

        let driver = WebDriver::new(&self.webdriver_url, caps)
            .await
            .context("Failed to connect to WebDriver")?;
        driver.set_page_load_timeout(Duration::from_secs(60)).await?;

        Ok(Box::new(WebDriverPage { driver }))
    }
}

/// Keystrokes for typing `text` and pressing Enter.
fn typed_then_enter(text: &str) -> String {
    format!("{}{}", text, Key::Enter)
}

pub struct WebDriverPage {
    driver: WebDriver,
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.driver
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))
    }

    async fn current_url(&self) -> Result<String> {
        let url = self.driver.current_url().await?;
        Ok(url.to_string())
    }

    async fn has_element(&self, css: &str) -> Result<bool> {
        let found = self.driver.find_all(By::Css(css)).await?;
        Ok(!found.is_empty())
    }

    async fn wait_for_element(&self, css: &str, timeout: Duration) -> Result<bool> {
        let exists = self
            .driver
            .query(By::Css(css))
            .wait(timeout, POLL_INTERVAL)
            .exists()
            .await?;
        Ok(exists)
    }

    async fn fill_and_submit(&self, css: &str, text: &str, timeout: Duration) -> Result<()> {
        let input = self
            .driver
            .query(By::Css(css))
            .wait(timeout, POLL_INTERVAL)
            .first()
            .await
            .with_context(|| format!("Could not find input {}", css))?;

        input.clear().await?;
        input.send_keys(typed_then_enter(text)).await?;
        Ok(())
    }

    async fn source(&self) -> Result<String> {
        let html = self.driver.source().await?;
        debug!("Received HTML source of {} bytes", html.len());
        Ok(html)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.driver.quit().await?;
        Ok(())
    }
}
