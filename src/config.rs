use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::marketplace::{ScrapeTimings, ScraperSettings};

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_PROFILE_DIR: &str = "browser_profile";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost",
    "http://localhost:8000",
    "http://localhost:3000",
];

/// How a scrape waiting at the login gate gets resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LoginPrompt {
    /// ENTER on the server's terminal.
    Console,
    /// `POST /login/resume` on the API.
    Http,
}

impl FromStr for LoginPrompt {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "console" | "stdin" => Ok(LoginPrompt::Console),
            "http" | "api" => Ok(LoginPrompt::Http),
            other => bail!("Unknown LOGIN_PROMPT value: {}", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub webdriver_url: String,
    pub profile_dir: PathBuf,
    pub headless: bool,
    pub login_prompt: LoginPrompt,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub timings: ScrapeTimings,
    pub ip_probe_settle: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            profile_dir: PathBuf::from(DEFAULT_PROFILE_DIR),
            headless: false,
            login_prompt: LoginPrompt::Console,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            timings: ScrapeTimings::default(),
            ip_probe_settle: Duration::from_secs(5),
        }
    }
}

impl AppConfig {
    /// Reads the process environment (call `dotenv` first to pick up `.env`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("WEBDRIVER_URL") {
            config.webdriver_url = url;
        }
        if let Some(dir) = get("BROWSER_PROFILE_DIR") {
            config.profile_dir = PathBuf::from(dir);
        }
        if let Some(value) = get("MARKETPLACE_HEADLESS") {
            config.headless = parse_bool(&value)
                .with_context(|| format!("MARKETPLACE_HEADLESS is not a boolean: {}", value))?;
        }
        if let Some(value) = get("LOGIN_PROMPT") {
            config.login_prompt = value.parse()?;
        }
        if let Some(host) = get("API_HOST") {
            config.host = host;
        }
        if let Some(port) = get("API_PORT") {
            config.port = port
                .trim()
                .parse()
                .with_context(|| format!("API_PORT is not a port number: {}", port))?;
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        let secs = |key: &str, default: Duration| -> Result<Duration> {
            match get(key) {
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{} must be a whole number of seconds: {}", key, value)),
                None => Ok(default),
            }
        };

        let defaults = ScrapeTimings::default();
        config.timings = ScrapeTimings {
            home_settle: secs("HOME_SETTLE_SECS", defaults.home_settle)?,
            fallback_input_wait: secs("FALLBACK_INPUT_WAIT_SECS", defaults.fallback_input_wait)?,
            fallback_settle: secs("FALLBACK_SETTLE_SECS", defaults.fallback_settle)?,
            content_wait: secs("CONTENT_WAIT_SECS", defaults.content_wait)?,
        };
        config.ip_probe_settle = secs("IP_PROBE_SETTLE_SECS", config.ip_probe_settle)?;

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn scraper_settings(&self) -> ScraperSettings {
        ScraperSettings {
            profile_dir: self.profile_dir.clone(),
            headless: self.headless,
            timings: self.timings,
            ..ScraperSettings::default()
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected true/false, got {}", other),
    }
}
