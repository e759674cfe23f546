use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpResponse, HttpServer, Responder};
use anyhow::Result;
use serde::Deserialize;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::cities::CityDirectory;
use crate::error::ApiError;
use crate::ip_info::IpInfoProbe;
use crate::marketplace::login_gate::ChannelNotifier;
use crate::marketplace::{MarketplaceScraper, SearchQuery};

pub const WELCOME_MESSAGE: &str = "Welcome to the Facebook Marketplace scraper API. Use /crawl_facebook_marketplace?city=&query=&max_price= to search listings.";

#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<CityDirectory>,
    pub scraper: Arc<MarketplaceScraper>,
    pub ip_probe: Arc<IpInfoProbe>,
    /// Set when logins are confirmed over HTTP instead of the terminal.
    pub login: Option<Arc<ChannelNotifier>>,
}

#[derive(Debug, Deserialize)]
pub struct CrawlParams {
    pub city: String,
    pub query: String,
    pub max_price: u32,
}

async fn root() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({ "message": WELCOME_MESSAGE }))
}

async fn list_cities(state: web::Data<AppState>) -> impl Responder {
    let names: Vec<&str> = state.directory.names().collect();
    HttpResponse::Ok().json(names)
}

async fn crawl_handler(
    state: web::Data<AppState>,
    params: web::Query<CrawlParams>,
) -> Result<HttpResponse, ApiError> {
    let params = params.into_inner();
    let search = SearchQuery::new(&state.directory, &params.city, &params.query, params.max_price)?;

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("crawl", %request_id, city = %search.city);
    let outcome = state.scraper.crawl(&search).instrument(span).await?;

    info!(
        %request_id,
        "Returning {} listings ({} malformed, {} rejected)",
        outcome.listings.len(),
        outcome.dropped.len(),
        outcome.rejected
    );

    Ok(HttpResponse::Ok().json(outcome.listings))
}

async fn ip_info_handler(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let info = state.ip_probe.probe().await?;
    Ok(HttpResponse::Ok().json(info))
}

async fn login_status(state: web::Data<AppState>) -> impl Responder {
    let awaiting = state
        .login
        .as_ref()
        .map(|notifier| notifier.is_waiting())
        .unwrap_or(false);
    HttpResponse::Ok().json(serde_json::json!({ "awaiting_login": awaiting }))
}

async fn login_resume(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let notifier = state.login.as_ref().ok_or(ApiError::LoginResumeDisabled)?;
    if !notifier.resume() {
        return Err(ApiError::NotAwaitingLogin);
    }
    info!("Login confirmed over HTTP");
    Ok(HttpResponse::Ok().json(serde_json::json!({ "resumed": true })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root))
        .route("/cities", web::get().to(list_cities))
        .route("/crawl_facebook_marketplace", web::get().to(crawl_handler))
        .route("/return_ip_information", web::get().to(ip_info_handler))
        .route("/login/status", web::get().to(login_status))
        .route("/login/resume", web::post().to(login_resume));
}

pub fn cors(origins: &[String]) -> Cors {
    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST"])
        .allowed_header(header::CONTENT_TYPE)
        .supports_credentials()
}

pub async fn run_api_server(addr: &str, state: AppState, origins: Vec<String>) -> Result<()> {
    info!("Starting marketplace API on {}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors(&origins))
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind(addr)?
    .run()
    .await?;

    Ok(())
}
