// Scripted stand-ins for the browser and the login prompt.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use marketplace_scraper::browser::{BrowserLauncher, BrowserPage, LaunchOptions, ProfileLocks};
use marketplace_scraper::marketplace::extractor::FacebookListingExtractor;
use marketplace_scraper::marketplace::login_gate::{LoginGate, LoginNotifier};
use marketplace_scraper::marketplace::site::{HOME_URL, LOGIN_POPUP_SELECTOR};
use marketplace_scraper::marketplace::{MarketplaceScraper, ScrapeTimings, ScraperSettings};

pub const SEARCH_PAGE: &str = include_str!("../fixtures/search_results.html");
pub const LOGIN_URL: &str = "https://www.facebook.com/login/device-based/regular/login/";

/// What the fake site does at each step.
#[derive(Clone)]
pub struct Script {
    /// Where the browser ends up after loading the marketplace home page.
    pub home_lands_on: String,
    pub popup_on_home: bool,
    pub popup_on_results: bool,
    /// Direct search URLs bounce back to the home page.
    pub search_url_ignored: bool,
    pub search_input_present: bool,
    pub listings_render: bool,
    pub html: String,
    pub fail_launch: bool,
    pub fail_source: bool,
    pub source_delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            home_lands_on: HOME_URL.to_string(),
            popup_on_home: false,
            popup_on_results: false,
            search_url_ignored: false,
            search_input_present: true,
            listings_render: true,
            html: SEARCH_PAGE.to_string(),
            fail_launch: false,
            fail_source: false,
            source_delay: Duration::ZERO,
        }
    }
}

/// Everything the fakes observed, in order.
#[derive(Default)]
pub struct Journal {
    pub events: Mutex<Vec<String>>,
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub open: AtomicUsize,
    pub max_open: AtomicUsize,
    pub last_options: Mutex<Option<LaunchOptions>>,
}

impl Journal {
    pub fn record(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.events().iter().position(|e| e.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

pub struct FakeLauncher {
    pub script: Script,
    pub journal: Arc<Journal>,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn BrowserPage>> {
        *self.journal.last_options.lock().unwrap() = Some(options.clone());
        if self.script.fail_launch {
            bail!("chromedriver is not running");
        }
        self.journal.launches.fetch_add(1, Ordering::SeqCst);
        let open = self.journal.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.max_open.fetch_max(open, Ordering::SeqCst);
        self.journal.record("launch");

        Ok(Box::new(FakePage {
            script: self.script.clone(),
            journal: self.journal.clone(),
            url: Mutex::new("about:blank".to_string()),
            searched: Mutex::new(false),
        }))
    }
}

pub struct FakePage {
    script: Script,
    journal: Arc<Journal>,
    url: Mutex<String>,
    searched: Mutex<bool>,
}

impl FakePage {
    fn on_results(&self) -> bool {
        *self.searched.lock().unwrap()
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.journal.record(format!("goto {}", url));
        let landed = if url == HOME_URL {
            self.script.home_lands_on.clone()
        } else if self.script.search_url_ignored {
            HOME_URL.to_string()
        } else {
            *self.searched.lock().unwrap() = true;
            url.to_string()
        };
        *self.url.lock().unwrap() = landed;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn has_element(&self, css: &str) -> Result<bool> {
        if css == LOGIN_POPUP_SELECTOR {
            let present = if self.on_results() {
                self.script.popup_on_results
            } else {
                self.script.popup_on_home
            };
            return Ok(present);
        }
        Ok(false)
    }

    async fn wait_for_element(&self, _css: &str, _timeout: Duration) -> Result<bool> {
        self.journal.record("wait listings");
        Ok(self.script.listings_render)
    }

    async fn fill_and_submit(&self, _css: &str, text: &str, _timeout: Duration) -> Result<()> {
        if !self.script.search_input_present {
            bail!("Could not find input");
        }
        self.journal.record(format!("search box {}", text));
        *self.searched.lock().unwrap() = true;
        Ok(())
    }

    async fn source(&self) -> Result<String> {
        if !self.script.source_delay.is_zero() {
            tokio::time::sleep(self.script.source_delay).await;
        }
        if self.script.fail_source {
            bail!("session deleted because of page crash");
        }
        self.journal.record("source");
        Ok(self.script.html.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.journal.closes.fetch_add(1, Ordering::SeqCst);
        self.journal.open.fetch_sub(1, Ordering::SeqCst);
        self.journal.record("close");
        Ok(())
    }
}

/// Confirms immediately and notes the gate in the journal.
pub struct RecordingNotifier {
    pub journal: Arc<Journal>,
    pub fail: bool,
}

#[async_trait]
impl LoginNotifier for RecordingNotifier {
    async fn await_login(&self, gate: LoginGate) -> Result<()> {
        self.journal.record(format!("login {:?}", gate));
        if self.fail {
            bail!("stdin closed before login was confirmed");
        }
        Ok(())
    }
}

pub struct Harness {
    pub journal: Arc<Journal>,
    pub scraper: MarketplaceScraper,
    pub launcher: Arc<FakeLauncher>,
    pub profiles: Arc<ProfileLocks>,
}

pub fn harness(script: Script) -> Harness {
    harness_with(script, false)
}

pub fn harness_with(script: Script, notifier_fails: bool) -> Harness {
    let journal = Arc::new(Journal::default());
    let launcher = Arc::new(FakeLauncher {
        script,
        journal: journal.clone(),
    });
    let profiles = Arc::new(ProfileLocks::new());
    let settings = ScraperSettings {
        profile_dir: "test_profile".into(),
        timings: ScrapeTimings::immediate(),
        ..ScraperSettings::default()
    };
    let scraper = MarketplaceScraper::new(
        launcher.clone(),
        profiles.clone(),
        Arc::new(RecordingNotifier {
            journal: journal.clone(),
            fail: notifier_fails,
        }),
        Arc::new(FacebookListingExtractor::new()),
        settings,
    );

    Harness {
        journal,
        scraper,
        launcher,
        profiles,
    }
}
