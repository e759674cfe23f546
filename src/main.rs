use std::io;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use marketplace_scraper::api_service::{run_api_server, AppState};
use marketplace_scraper::browser::{BrowserLauncher, ProfileLocks, WebDriverLauncher};
use marketplace_scraper::cities::CityDirectory;
use marketplace_scraper::config::{AppConfig, LoginPrompt};
use marketplace_scraper::ip_info::IpInfoProbe;
use marketplace_scraper::marketplace::extractor::FacebookListingExtractor;
use marketplace_scraper::marketplace::login_gate::{ChannelNotifier, ConsoleNotifier, LoginNotifier};
use marketplace_scraper::marketplace::{MarketplaceScraper, SearchQuery};
use marketplace_scraper::viewer::{render_listings, OutputFormat, ViewerClient, DEFAULT_API_URL};

#[derive(Parser)]
#[command(name = "marketplace-scraper")]
#[command(about = "Facebook Marketplace scraper API and viewer", long_about = None)]
struct Cli {
    /// Overrides WEBDRIVER_URL
    #[arg(long, global = true)]
    webdriver_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Where a login pause is confirmed
        #[arg(long, value_enum)]
        login_prompt: Option<LoginPrompt>,
    },

    /// Query a running API and print the listings
    View {
        #[arg(long)]
        city: String,

        #[arg(short, long)]
        query: String,

        /// Commas are ignored, e.g. "1,000"
        #[arg(long = "max-price")]
        max_price: String,

        #[arg(long, default_value = DEFAULT_API_URL)]
        api_url: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Scrape directly without the API, confirming logins on this terminal
    Crawl {
        #[arg(long)]
        city: String,

        #[arg(short, long)]
        query: String,

        #[arg(long = "max-price")]
        max_price: u32,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Print the public IP details seen by the browser
    IpInfo,
}

struct Services {
    scraper: Arc<MarketplaceScraper>,
    ip_probe: Arc<IpInfoProbe>,
}

fn build_services(config: &AppConfig, notifier: Arc<dyn LoginNotifier>) -> Services {
    let launcher: Arc<dyn BrowserLauncher> = Arc::new(WebDriverLauncher::new(&config.webdriver_url));
    let profiles = Arc::new(ProfileLocks::new());

    let scraper = MarketplaceScraper::new(
        launcher.clone(),
        profiles.clone(),
        notifier,
        Arc::new(FacebookListingExtractor::new()),
        config.scraper_settings(),
    );
    let ip_probe = IpInfoProbe::new(launcher, profiles, config.ip_probe_settle);

    Services {
        scraper: Arc::new(scraper),
        ip_probe: Arc::new(ip_probe),
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(url) = cli.webdriver_url {
        config.webdriver_url = url;
    }

    match cli.command {
        Commands::Serve {
            host,
            port,
            login_prompt,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(prompt) = login_prompt {
                config.login_prompt = prompt;
            }

            let (notifier, login) = match config.login_prompt {
                LoginPrompt::Console => (Arc::new(ConsoleNotifier::new()) as Arc<dyn LoginNotifier>, None),
                LoginPrompt::Http => {
                    let channel = Arc::new(ChannelNotifier::new());
                    (channel.clone() as Arc<dyn LoginNotifier>, Some(channel))
                }
            };

            let services = build_services(&config, notifier);
            let state = AppState {
                directory: Arc::new(CityDirectory::us()),
                scraper: services.scraper,
                ip_probe: services.ip_probe,
                login,
            };

            info!(
                "Using WebDriver at {} with profile {:?} (login prompt: {:?})",
                config.webdriver_url, config.profile_dir, config.login_prompt
            );
            run_api_server(&config.bind_addr(), state, config.cors_origins.clone()).await?;
        }

        Commands::View {
            city,
            query,
            max_price,
            api_url,
            format,
        } => {
            let client = ViewerClient::new(api_url)?;
            let response = client.crawl(&city, &query, &max_price).await?;
            if format == OutputFormat::Table {
                println!("Status code: {}", response.status.as_u16());
            }
            render_listings(&mut io::stdout().lock(), &response.listings, format)?;
        }

        Commands::Crawl {
            city,
            query,
            max_price,
            format,
        } => {
            let start_time = Instant::now();
            let directory = CityDirectory::us();
            let search = SearchQuery::new(&directory, &city, &query, max_price)?;

            let services = build_services(&config, Arc::new(ConsoleNotifier::new()));
            let outcome = services.scraper.crawl(&search).await?;

            info!(
                "Scraped {} listings at {} in {:.1}s ({} malformed, {} rejected)",
                outcome.listings.len(),
                outcome.scraped_at.to_rfc3339(),
                start_time.elapsed().as_secs_f64(),
                outcome.dropped.len(),
                outcome.rejected
            );
            for failure in &outcome.dropped {
                info!("  skipped {}", failure);
            }

            render_listings(&mut io::stdout().lock(), &outcome.listings, format)?;
        }

        Commands::IpInfo => {
            let services = build_services(&config, Arc::new(ConsoleNotifier::new()));
            let info = services.ip_probe.probe().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}
