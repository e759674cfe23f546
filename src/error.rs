use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cities::UnsupportedCity;
use crate::marketplace::ScrapeError;

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    UnsupportedCity(#[from] UnsupportedCity),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error("No crawl is waiting for a login")]
    NotAwaitingLogin,
    #[error("Login confirmation over HTTP is not enabled")]
    LoginResumeDisabled,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::UnsupportedCity(_) => StatusCode::NOT_FOUND,
            ApiError::Scrape(ScrapeError::NoListings) => StatusCode::NOT_FOUND,
            ApiError::Scrape(ScrapeError::ContentTimeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Scrape(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotAwaitingLogin => StatusCode::CONFLICT,
            ApiError::LoginResumeDisabled => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            detail: self.to_string(),
        })
    }
}
