pub mod api_service;
pub mod browser;
pub mod cities;
pub mod config;
pub mod error;
pub mod ip_info;
pub mod marketplace;
pub mod viewer;
