use std::sync::Arc;
use std::time::Duration;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::browser::{BrowserLauncher, LaunchOptions, ProfileLocks};
use crate::marketplace::ScrapeError;

pub const IP_INFO_URL: &str = "https://www.ipburger.com/";

/// Public address details of the machine running the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfo {
    pub ip_address: String,
    pub country: String,
    pub location: String,
    pub isp: String,
    pub hostname: String,
    #[serde(rename = "type")]
    pub ip_type: String,
    pub version: String,
}

/// Loads the IP lookup page headless and reads its labelled fields.
pub struct IpInfoProbe {
    launcher: Arc<dyn BrowserLauncher>,
    profiles: Arc<ProfileLocks>,
    settle: Duration,
}

impl IpInfoProbe {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, profiles: Arc<ProfileLocks>, settle: Duration) -> Self {
        Self {
            launcher,
            profiles,
            settle,
        }
    }

    pub async fn probe(&self) -> Result<IpInfo, ScrapeError> {
        let session = self
            .profiles
            .acquire(self.launcher.as_ref(), &LaunchOptions::headless())
            .await?;

        let html = async {
            session.page().goto(IP_INFO_URL).await?;
            sleep(self.settle).await;
            session.page().source().await
        }
        .await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session cleanly: {}", e);
        }

        let info = parse_ip_info(&html?)?;
        info!("Resolved public IP {} ({})", info.ip_address, info.country);
        Ok(info)
    }
}

pub fn parse_ip_info(html: &str) -> Result<IpInfo, ScrapeError> {
    let document = Html::parse_document(html);
    let field = |css: &'static str| -> Result<String, ScrapeError> {
        let selector = Selector::parse(css).map_err(|_| ScrapeError::MissingField(css))?;
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .ok_or(ScrapeError::MissingField(css))
    };

    Ok(IpInfo {
        ip_address: field("span#ipaddress1")?,
        country: field("strong#country_fullname")?,
        location: field("strong#location")?,
        isp: field("strong#isp")?,
        hostname: field("strong#hostname")?,
        ip_type: field("strong#ip_type")?,
        version: field("strong#version")?,
    })
}
