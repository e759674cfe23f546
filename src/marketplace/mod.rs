pub mod extractor;
pub mod login_gate;
pub mod site;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{BrowserLauncher, BrowserPage, LaunchOptions, ProfileLocks};
use crate::cities::{CityDirectory, UnsupportedCity};
use extractor::{ExtractionFailure, ListingExtractor, RawListing};
use login_gate::{detect_login_gate, LoginNotifier};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("No valid listings were scraped.")]
    NoListings,
    #[error("Timed out after {secs}s waiting for listings to appear")]
    ContentTimeout { secs: u64 },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Login checkpoint failed: {0}")]
    LoginAborted(String),
    #[error("Could not find {0} on the page")]
    MissingField(&'static str),
    #[error("Browser session failed: {0:#}")]
    Browser(#[from] anyhow::Error),
}

/// A validated search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub city: String,
    pub city_slug: String,
    pub query: String,
    pub max_price: u32,
}

impl SearchQuery {
    pub fn new(
        directory: &CityDirectory,
        city: &str,
        query: &str,
        max_price: u32,
    ) -> Result<Self, UnsupportedCity> {
        let city_slug = directory.resolve(city)?.to_string();
        Ok(Self {
            city: city.to_string(),
            city_slug,
            query: query.to_string(),
            max_price,
        })
    }

    pub fn target_url(&self, origin: &str) -> String {
        site::search_url(origin, &self.city_slug, &self.query, self.max_price)
    }
}

/// One marketplace listing as returned to API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub name: String,
    pub price: String,
    pub location: String,
    pub title: String,
    pub image: String,
    pub link: String,
}

impl TryFrom<RawListing> for ListingRecord {
    type Error = String;

    fn try_from(raw: RawListing) -> Result<Self, Self::Error> {
        Url::parse(&raw.image).map_err(|e| format!("invalid image url {:?}: {}", raw.image, e))?;
        Url::parse(&raw.post_url)
            .map_err(|e| format!("invalid post url {:?}: {}", raw.post_url, e))?;

        Ok(Self {
            name: raw.title.clone(),
            price: raw.price,
            location: raw.location,
            title: raw.title,
            image: raw.image,
            link: raw.post_url,
        })
    }
}

/// Fixed pauses and waits of the procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeTimings {
    pub home_settle: Duration,
    pub fallback_input_wait: Duration,
    pub fallback_settle: Duration,
    pub content_wait: Duration,
}

impl Default for ScrapeTimings {
    fn default() -> Self {
        Self {
            home_settle: Duration::from_secs(3),
            fallback_input_wait: Duration::from_secs(10),
            fallback_settle: Duration::from_secs(5),
            content_wait: Duration::from_secs(15),
        }
    }
}

impl ScrapeTimings {
    /// No settling pauses, used by tests against scripted pages.
    pub fn immediate() -> Self {
        Self {
            home_settle: Duration::ZERO,
            fallback_input_wait: Duration::ZERO,
            fallback_settle: Duration::ZERO,
            content_wait: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScrapeState {
    Navigating,
    AwaitingLogin,
    SearchReady,
    Extracting,
    Done,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeOutcome {
    pub listings: Vec<ListingRecord>,
    pub dropped: Vec<ExtractionFailure>,
    pub rejected: usize,
    pub states: Vec<ScrapeState>,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub profile_dir: PathBuf,
    pub headless: bool,
    pub origin: String,
    pub home_url: String,
    pub timings: ScrapeTimings,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from("browser_profile"),
            headless: false,
            origin: site::ORIGIN.to_string(),
            home_url: site::HOME_URL.to_string(),
            timings: ScrapeTimings::default(),
        }
    }
}

/// Drives one browser session through a marketplace search.
pub struct MarketplaceScraper {
    launcher: Arc<dyn BrowserLauncher>,
    profiles: Arc<ProfileLocks>,
    notifier: Arc<dyn LoginNotifier>,
    extractor: Arc<dyn ListingExtractor>,
    settings: ScraperSettings,
}

struct StateTrace(Vec<ScrapeState>);

impl StateTrace {
    fn enter(&mut self, state: ScrapeState) {
        debug!("Scrape state -> {:?}", state);
        self.0.push(state);
    }
}

impl MarketplaceScraper {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        profiles: Arc<ProfileLocks>,
        notifier: Arc<dyn LoginNotifier>,
        extractor: Arc<dyn ListingExtractor>,
        settings: ScraperSettings,
    ) -> Self {
        Self {
            launcher,
            profiles,
            notifier,
            extractor,
            settings,
        }
    }

    pub async fn crawl(&self, search: &SearchQuery) -> Result<ScrapeOutcome, ScrapeError> {
        let options = LaunchOptions {
            headless: self.settings.headless,
            ..LaunchOptions::visible_with_profile(self.settings.profile_dir.clone())
        };

        info!(
            "Crawling marketplace for {:?} in {} (max price {})",
            search.query, search.city, search.max_price
        );

        let session = self
            .profiles
            .acquire(self.launcher.as_ref(), &options)
            .await?;

        let mut trace = StateTrace(vec![ScrapeState::Navigating]);
        let result = self.run(session.page(), search, &mut trace).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session cleanly: {}", e);
        }

        match result {
            Ok((listings, dropped, rejected)) => {
                trace.enter(ScrapeState::Done);
                Ok(ScrapeOutcome {
                    listings,
                    dropped,
                    rejected,
                    states: trace.0,
                    scraped_at: Utc::now(),
                })
            }
            Err(e) => {
                trace.enter(ScrapeState::Failed);
                warn!("Crawl failed after states {:?}: {}", trace.0, e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        page: &dyn BrowserPage,
        search: &SearchQuery,
        trace: &mut StateTrace,
    ) -> Result<(Vec<ListingRecord>, Vec<ExtractionFailure>, usize), ScrapeError> {
        let timings = &self.settings.timings;

        info!("Going to Facebook Marketplace...");
        page.goto(&self.settings.home_url).await?;
        sleep(timings.home_settle).await;

        let url = page.current_url().await?;
        let popup = page.has_element(site::LOGIN_POPUP_SELECTOR).await?;
        if let Some(gate) = detect_login_gate(&url, popup) {
            self.wait_for_login(gate, trace).await?;
        }

        let target = search.target_url(&self.settings.origin);
        info!("Navigating to {}", target);
        page.goto(&target).await?;

        let landed = page.current_url().await?;
        if site::is_home(&landed, &self.settings.home_url) {
            info!("Fallback: performing search using the marketplace search box...");
            match page
                .fill_and_submit(
                    site::SEARCH_INPUT_SELECTOR,
                    &search.query,
                    timings.fallback_input_wait,
                )
                .await
            {
                Ok(()) => sleep(timings.fallback_settle).await,
                Err(e) => warn!("Search input not found: {:#}", e),
            }
        }

        let container = self.extractor.container_selector();
        if !page.wait_for_element(container, timings.content_wait).await? {
            return Err(ScrapeError::ContentTimeout {
                secs: timings.content_wait.as_secs(),
            });
        }
        trace.enter(ScrapeState::SearchReady);

        if page.has_element(site::LOGIN_POPUP_SELECTOR).await? {
            self.wait_for_login(login_gate::LoginGate::LoginPopup, trace)
                .await?;
            trace.enter(ScrapeState::SearchReady);
        }

        trace.enter(ScrapeState::Extracting);
        let html = page.source().await?;
        let (raw, dropped) = partition_extraction(self.extractor.extract(&html));
        for failure in &dropped {
            debug!("Dropped {}", failure);
        }
        info!(
            "Found {} listings ({} dropped as malformed)",
            raw.len() + dropped.len(),
            dropped.len()
        );

        let (listings, rejected) = assemble(raw);
        if listings.is_empty() {
            return Err(ScrapeError::NoListings);
        }

        verify_round_trip(&listings)?;
        Ok((listings, dropped, rejected))
    }

    async fn wait_for_login(
        &self,
        gate: login_gate::LoginGate,
        trace: &mut StateTrace,
    ) -> Result<(), ScrapeError> {
        trace.enter(ScrapeState::AwaitingLogin);
        self.notifier
            .await_login(gate)
            .await
            .map_err(|e| ScrapeError::LoginAborted(format!("{:#}", e)))?;
        trace.enter(ScrapeState::Navigating);
        Ok(())
    }
}

fn partition_extraction(
    results: Vec<Result<RawListing, ExtractionFailure>>,
) -> (Vec<RawListing>, Vec<ExtractionFailure>) {
    let mut ok = Vec::new();
    let mut failed = Vec::new();
    for result in results {
        match result {
            Ok(raw) => ok.push(raw),
            Err(failure) => failed.push(failure),
        }
    }
    (ok, failed)
}

/// Converts raw listings, dropping (and logging) any that fail validation.
pub fn assemble(raw: Vec<RawListing>) -> (Vec<ListingRecord>, usize) {
    let mut records = Vec::with_capacity(raw.len());
    let mut rejected = 0;
    for item in raw {
        match ListingRecord::try_from(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Error building result: {}", e);
                rejected += 1;
            }
        }
    }
    (records, rejected)
}

/// The batch must come back unchanged from a JSON round trip.
pub fn verify_round_trip(listings: &[ListingRecord]) -> Result<(), ScrapeError> {
    let json =
        serde_json::to_string(listings).map_err(|e| ScrapeError::Serialization(e.to_string()))?;
    let back: Vec<ListingRecord> =
        serde_json::from_str(&json).map_err(|e| ScrapeError::Serialization(e.to_string()))?;
    if back != listings {
        return Err(ScrapeError::Serialization(
            "listings changed during JSON round trip".to_string(),
        ));
    }
    Ok(())
}
