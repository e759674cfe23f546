mod render;

pub use render::{render_listings, OutputFormat};

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::cities::CityDirectory;
use crate::error::ErrorBody;
use crate::marketplace::ListingRecord;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Strips thousands separators ("1,000" -> 1000).
pub fn parse_max_price(text: &str) -> Result<u32> {
    let cleaned = text.replace(',', "");
    cleaned
        .trim()
        .parse()
        .with_context(|| format!("Max price must be a whole non-negative number, got {:?}", text))
}

/// Result of one crawl call against the API.
#[derive(Debug)]
pub struct CrawlResponse {
    pub status: StatusCode,
    pub listings: Vec<ListingRecord>,
}

/// HTTP client for a running marketplace API.
pub struct ViewerClient {
    http: Client,
    base_url: String,
    directory: CityDirectory,
}

impl ViewerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        // Crawls include manual login pauses, so there is no overall timeout.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .use_rustls_tls()
            .build()
            .context("Unable to construct reqwest client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            directory: CityDirectory::us(),
        })
    }

    pub fn crawl_url(&self, city: &str, query: &str, max_price: u32) -> String {
        format!(
            "{}/crawl_facebook_marketplace?city={}&query={}&max_price={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(city),
            urlencoding::encode(query),
            max_price
        )
    }

    pub async fn crawl(&self, city: &str, query: &str, max_price_text: &str) -> Result<CrawlResponse> {
        if !self.directory.contains(city) {
            let options: Vec<&str> = self.directory.names().collect();
            bail!("Unknown city {:?}. Choose one of: {}", city, options.join(", "));
        }
        let max_price = parse_max_price(max_price_text)?;

        let url = self.crawl_url(city, query, max_price);
        debug!("GET {}", url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Request failed")?;
        let status = resp.status();
        let body = resp.text().await.context("Failed to read response body")?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.detail)
                .unwrap_or(body);
            bail!("Server responded {}: {}", status, detail);
        }

        let listings: Vec<ListingRecord> =
            serde_json::from_str(&body).context("Could not parse response from server.")?;
        Ok(CrawlResponse { status, listings })
    }
}
